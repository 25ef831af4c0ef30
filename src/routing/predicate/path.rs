//! Path predicate and the path pattern it compiles.
//!
//! Pattern syntax (segments separated by `/`):
//! - literal text
//! - `?` one character, `*` zero or more characters within a segment
//! - `**` zero or more whole segments
//! - `{name}` one segment captured as `name`
//! - `{name:regex}` captured, constrained by `regex`
//! - `{*name}` the rest of the path (including its leading `/`)
//!
//! A trailing `/` on the request path is tolerated unless the pattern
//! itself ends with one.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use super::{RoutePredicate, RoutePredicateFactory, PATTERN_KEY};
use crate::error::CompileError;
use crate::filter::exchange::ServerExchange;
use crate::routing::args::{ArgumentHints, BoundArgs};

/// Compiled path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    variables: Vec<String>,
}

fn valid_variable(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let mut variables = Vec::new();
        let mut body = String::new();

        let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
        let trailing_slash = trimmed.ends_with('/') && !trimmed.is_empty();
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segments: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        for (idx, segment) in segments.iter().enumerate() {
            let last = idx + 1 == segments.len();

            if *segment == "**" {
                body.push_str("(?:/[^/]*)*");
                continue;
            }

            if let Some(name) = segment.strip_prefix("{*").and_then(|s| s.strip_suffix('}')) {
                if !last {
                    return Err(format!("'{{*{}}}' must be the last segment", name));
                }
                if !valid_variable(name) {
                    return Err(format!("invalid variable name '{}'", name));
                }
                body.push_str(&format!("(?P<{}>(?:/.*)?)", name));
                variables.push(name.to_string());
                continue;
            }

            body.push('/');
            body.push_str(&Self::segment_regex(segment, &mut variables)?);
        }

        let regex_source = if trailing_slash {
            format!("^{}/$", body)
        } else if body.is_empty() {
            "^/?$".to_string()
        } else {
            format!("^{}/?$", body)
        };

        let regex = Regex::new(&regex_source).map_err(|e| e.to_string())?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            variables,
        })
    }

    fn segment_regex(segment: &str, variables: &mut Vec<String>) -> Result<String, String> {
        let mut out = String::new();
        let mut chars = segment.char_indices();

        while let Some((start, c)) = chars.next() {
            match c {
                '{' => {
                    // Find the matching close brace; regex constraints may nest.
                    let mut depth = 1;
                    let mut end = None;
                    for (i, c) in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    end = Some(i);
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    let end = end.ok_or_else(|| format!("unclosed '{{' in '{}'", segment))?;
                    let inner = &segment[start + 1..end];
                    let (name, constraint) = match inner.split_once(':') {
                        Some((name, re)) => (name, re.to_string()),
                        None => (inner, "[^/]+".to_string()),
                    };
                    if !valid_variable(name) {
                        return Err(format!("invalid variable name '{}'", name));
                    }
                    out.push_str(&format!("(?P<{}>{})", name, constraint));
                    variables.push(name.to_string());
                }
                '*' => out.push_str("[^/]*"),
                '?' => out.push_str("[^/]"),
                other => out.push_str(&regex::escape(&other.to_string())),
            }
        }

        Ok(out)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match and return the captured template variables.
    pub fn match_and_extract(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.variables
                .iter()
                .map(|name| {
                    let value = captures.name(name).map(|m| m.as_str()).unwrap_or_default();
                    (name.clone(), value.to_string())
                })
                .collect(),
        )
    }
}

pub struct PathPredicateFactory;

impl ArgumentHints for PathPredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[PATTERN_KEY]
    }
}

impl RoutePredicateFactory for PathPredicateFactory {
    fn name(&self) -> &'static str {
        "Path"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let raw = args.require(self.name(), PATTERN_KEY)?;
        let pattern = PathPattern::parse(raw).map_err(|e| CompileError::predicate("Path", e))?;

        Ok(Arc::new(move |exchange: &mut ServerExchange| {
            let extracted = pattern.match_and_extract(exchange.request().path());
            tracing::trace!(
                pattern = pattern.as_str(),
                path = exchange.request().path(),
                matched = extracted.is_some(),
                "Path predicate"
            );
            match extracted {
                Some(variables) => {
                    exchange.attributes_mut().uri_template_variables = variables;
                    true
                }
                None => false,
            }
        }))
    }
}
