//! Raw route definitions.
//!
//! # Responsibilities
//! - Describe a route as data: id, destination, order, predicates, filters
//! - Parse the `Name=arg0,arg1` shorthand into named arguments
//! - Deserialize from either the shorthand string or the `{ name, args }` table
//!
//! # Design Decisions
//! - Definitions are plain values; a source produces fresh ones on every read
//! - Arguments keep declaration order so positional values can be renamed
//!   to factory hints later
//! - Positional values get synthetic `_genkey_N` keys

use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix of synthetic argument keys assigned to positional values.
pub const GENERATED_NAME_PREFIX: &str = "_genkey_";

pub fn generated_name(index: usize) -> String {
    format!("{}{}", GENERATED_NAME_PREFIX, index)
}

/// Ordered argument map (key → raw string value).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<(String, String)>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Positional arguments with generated keys.
    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (generated_name(i), v.into()))
                .collect(),
        )
    }

    /// Insert or replace, keeping the original position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}

impl Serialize for Args {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Args {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgsVisitor;

        impl<'de> Visitor<'de> for ArgsVisitor {
            type Value = Args;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of argument names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Args, A::Error> {
                let mut args = Args::new();
                while let Some((key, value)) = access.next_entry::<String, ArgValue>()? {
                    args.insert(key, value.0);
                }
                Ok(args)
            }
        }

        deserializer.deserialize_map(ArgsVisitor)
    }
}

/// Scalar argument value; numbers and booleans are accepted and kept as text.
struct ArgValue(String);

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Scalar {
            Text(String),
            Int(i64),
            Float(f64),
            Bool(bool),
        }

        Ok(ArgValue(match Scalar::deserialize(deserializer)? {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }))
    }
}

/// Split `Name=a, b ,c` into a name and positional args.
///
/// Without `=` (or with `=` first) the whole text is the name. Empty tokens
/// are dropped and the rest trimmed.
fn parse_shorthand(text: &str) -> (String, Args) {
    match text.find('=') {
        Some(idx) if idx > 0 => {
            let name = text[..idx].trim().to_string();
            let args = Args::positional(
                text[idx + 1..]
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty()),
            );
            (name, args)
        }
        _ => (text.trim().to_string(), Args::new()),
    }
}

/// Either accepted configuration form of a predicate or filter.
#[doc(hidden)]
#[derive(Deserialize)]
#[serde(untagged)]
pub enum DefinitionRepr {
    Shorthand(String),
    Full {
        name: String,
        #[serde(default)]
        args: Args,
    },
}

/// A predicate as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DefinitionRepr")]
pub struct PredicateDefinition {
    pub name: String,
    pub args: Args,
}

impl PredicateDefinition {
    pub fn new(name: impl Into<String>, args: Args) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl From<DefinitionRepr> for PredicateDefinition {
    fn from(repr: DefinitionRepr) -> Self {
        match repr {
            DefinitionRepr::Shorthand(text) => {
                let (name, args) = parse_shorthand(&text);
                Self { name, args }
            }
            DefinitionRepr::Full { name, args } => Self { name, args },
        }
    }
}

impl FromStr for PredicateDefinition {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DefinitionRepr::Shorthand(s.to_string()).into())
    }
}

/// A filter as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DefinitionRepr")]
pub struct FilterDefinition {
    pub name: String,
    pub args: Args,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, args: Args) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl From<DefinitionRepr> for FilterDefinition {
    fn from(repr: DefinitionRepr) -> Self {
        match repr {
            DefinitionRepr::Shorthand(text) => {
                let (name, args) = parse_shorthand(&text);
                Self { name, args }
            }
            DefinitionRepr::Full { name, args } => Self { name, args },
        }
    }
}

impl FromStr for FilterDefinition {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DefinitionRepr::Shorthand(s.to_string()).into())
    }
}

/// A route as written in configuration or saved through the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,

    /// Destination URI, e.g. `http://localhost:3000` or `lb://users`.
    pub uri: String,

    /// Lower sorts first.
    #[serde(default)]
    pub order: i32,

    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,

    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

impl RouteDefinition {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            order: 0,
            predicates: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn predicate(mut self, text: &str) -> Self {
        self.predicates.push(DefinitionRepr::Shorthand(text.to_string()).into());
        self
    }

    pub fn filter(mut self, text: &str) -> Self {
        self.filters.push(DefinitionRepr::Shorthand(text.to_string()).into());
        self
    }
}
