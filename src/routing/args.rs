//! Argument binding for predicate and filter factories.
//!
//! # Data Flow
//! ```text
//! Args { _genkey_0: "/foo/**" }        (raw, from a definition)
//!     → hint replacement (_genkey_N → argNames[N])
//!     → trim, evaluate #{...} expressions
//!     → strict validation (count + presence), unless the factory opts out
//!     → BoundArgs { pattern: "/foo/**" }
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::CompileError;
use crate::routing::definition::{Args, GENERATED_NAME_PREFIX};

/// Argument metadata a factory declares.
pub trait ArgumentHints {
    /// Names positional arguments are mapped onto, in order.
    fn arg_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether argument count and presence are checked against the hints.
    /// Variable-arity factories return false and check for themselves.
    fn validate_args(&self) -> bool {
        true
    }
}

/// Evaluates the body of a `#{...}` argument value.
pub trait ExpressionResolver: Send + Sync {
    fn evaluate(&self, expression: &str) -> Result<String, CompileError>;
}

/// Resolves expressions against a flat name → value table.
///
/// - `#{@name}` is a reference to a named component and yields `name`
/// - `#{'text'}` is a literal
/// - `#{name}` is looked up in the table
#[derive(Debug, Clone, Default)]
pub struct TableExpressionResolver {
    values: HashMap<String, String>,
}

impl TableExpressionResolver {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl ExpressionResolver for TableExpressionResolver {
    fn evaluate(&self, expression: &str) -> Result<String, CompileError> {
        let expression = expression.trim();
        if let Some(reference) = expression.strip_prefix('@') {
            return Ok(reference.trim().to_string());
        }
        if expression.len() >= 2 && expression.starts_with('\'') && expression.ends_with('\'') {
            return Ok(expression[1..expression.len() - 1].to_string());
        }
        self.values
            .get(expression)
            .cloned()
            .ok_or_else(|| CompileError::Expression(expression.to_string()))
    }
}

/// Arguments after binding; what a factory's `apply` receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundArgs(Vec<(String, String)>);

impl BoundArgs {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Fetch a required argument.
    pub fn require(&self, factory: &str, key: &str) -> Result<&str, CompileError> {
        self.get(key).ok_or_else(|| CompileError::MissingArgument {
            factory: factory.to_string(),
            argument: key.to_string(),
        })
    }

    /// Parse an optional argument.
    pub fn parse<T>(&self, factory: &str, key: &str) -> Result<Option<T>, CompileError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                CompileError::filter(factory, format!("argument '{}'='{}': {}", key, raw, e))
            }),
        }
    }

    /// Check a lower bound on the argument count.
    pub fn require_min(&self, factory: &str, min: usize) -> Result<(), CompileError> {
        if self.0.len() < min {
            return Err(CompileError::ArgumentMismatch {
                factory: factory.to_string(),
                expected: vec![format!("at least {}", min)],
                found: self.0.len(),
            });
        }
        Ok(())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for BoundArgs {
    fn from(pairs: [(&str, &str); N]) -> Self {
        BoundArgs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Bind raw definition arguments for one factory.
pub fn bind_args(
    factory: &str,
    hints: &dyn ArgumentHints,
    args: &Args,
    resolver: &dyn ExpressionResolver,
) -> Result<BoundArgs, CompileError> {
    let names = hints.arg_names();

    if !names.is_empty() && hints.validate_args() && args.len() != names.len() {
        return Err(CompileError::ArgumentMismatch {
            factory: factory.to_string(),
            expected: names.iter().map(|n| n.to_string()).collect(),
            found: args.len(),
        });
    }

    let mut bound = Vec::with_capacity(args.len());
    for (idx, (key, raw)) in args.iter().enumerate() {
        let key = match names.get(idx) {
            Some(hint) if key.starts_with(GENERATED_NAME_PREFIX) => hint.to_string(),
            _ => key.to_string(),
        };

        let trimmed = raw.trim();
        let value = match trimmed.strip_prefix("#{").and_then(|s| s.strip_suffix('}')) {
            Some(expression) => resolver.evaluate(expression)?,
            None => trimmed.to_string(),
        };

        bound.push((key, value));
    }
    let bound = BoundArgs(bound);

    if hints.validate_args() {
        if let Some(missing) = names.iter().find(|n| !bound.contains(n)) {
            return Err(CompileError::MissingArgument {
                factory: factory.to_string(),
                argument: missing.to_string(),
            });
        }
    }

    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hints(&'static [&'static str], bool);

    impl ArgumentHints for Hints {
        fn arg_names(&self) -> &'static [&'static str] {
            self.0
        }
        fn validate_args(&self) -> bool {
            self.1
        }
    }

    fn resolver() -> TableExpressionResolver {
        let mut values = HashMap::new();
        values.insert("rate".to_string(), "10".to_string());
        TableExpressionResolver::new(values)
    }

    #[test]
    fn test_generated_keys_replaced_by_hints() {
        let args = Args::positional(["X-Request-Foo", " Bar "]);
        let bound = bind_args("AddRequestHeader", &Hints(&["name", "value"], true), &args, &resolver())
            .unwrap();
        assert_eq!(bound.get("name"), Some("X-Request-Foo"));
        assert_eq!(bound.get("value"), Some("Bar"));
    }

    #[test]
    fn test_wrong_count_rejected() {
        let args = Args::positional(["only-one"]);
        let err = bind_args("AddRequestHeader", &Hints(&["name", "value"], true), &args, &resolver())
            .unwrap_err();
        assert!(matches!(err, CompileError::ArgumentMismatch { found: 1, .. }));
    }

    #[test]
    fn test_missing_named_argument_rejected() {
        let args = Args::new().with("name", "X-Foo").with("other", "1");
        let err = bind_args("AddRequestHeader", &Hints(&["name", "value"], true), &args, &resolver())
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingArgument { ref argument, .. } if argument == "value"));
    }

    #[test]
    fn test_opt_out_allows_partial_args() {
        let args = Args::positional(["foo"]);
        let bound = bind_args("Query", &Hints(&["param", "regexp"], false), &args, &resolver()).unwrap();
        assert_eq!(bound.get("param"), Some("foo"));
        assert!(!bound.contains("regexp"));
    }

    #[test]
    fn test_expressions_evaluated() {
        let args = Args::new()
            .with("replenishRate", "#{rate}")
            .with("keyResolver", " #{@principalNameKeyResolver} ");
        let bound = bind_args("RequestRateLimiter", &Hints(&[], false), &args, &resolver()).unwrap();
        assert_eq!(bound.get("replenishRate"), Some("10"));
        assert_eq!(bound.get("keyResolver"), Some("principalNameKeyResolver"));

        let args = Args::new().with("x", "#{unknown}");
        assert!(matches!(
            bind_args("Any", &Hints(&[], false), &args, &resolver()),
            Err(CompileError::Expression(_))
        ));
    }
}
