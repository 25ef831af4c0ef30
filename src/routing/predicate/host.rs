//! Host predicate: Ant-style matching with `.` as the separator.
//!
//! `*.example.org` matches `api.example.org`; `**.example.org` also matches
//! `example.org` and `a.b.example.org`. Matching is case-insensitive.

use std::sync::Arc;

use regex::Regex;

use super::{RoutePredicate, RoutePredicateFactory, PATTERN_KEY};
use crate::error::CompileError;
use crate::filter::exchange::ServerExchange;
use crate::routing::args::{ArgumentHints, BoundArgs};

#[derive(Debug, Clone)]
enum Token {
    /// `**`: zero or more labels.
    AnyLabels,
    Label(Regex),
}

/// Compiled host pattern.
#[derive(Debug, Clone)]
pub struct HostPattern {
    source: String,
    tokens: Vec<Token>,
    has_port: bool,
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let lowered = pattern.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return Err("empty host pattern".to_string());
        }

        let tokens = lowered
            .split('.')
            .map(|label| {
                if label == "**" {
                    return Ok(Token::AnyLabels);
                }
                let mut re = String::from("^");
                let mut rest = label;
                while let Some(c) = rest.chars().next() {
                    match c {
                        '*' => re.push_str(".*"),
                        '?' => re.push('.'),
                        '{' => {
                            let close = rest
                                .find('}')
                                .ok_or_else(|| format!("unclosed '{{' in '{}'", label))?;
                            re.push_str(".+");
                            rest = &rest[close + 1..];
                            continue;
                        }
                        other => re.push_str(&regex::escape(&other.to_string())),
                    }
                    rest = &rest[c.len_utf8()..];
                }
                re.push('$');
                Regex::new(&re).map(Token::Label).map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Self {
            source: pattern.to_string(),
            has_port: lowered.contains(':'),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let host = if self.has_port { host.as_str() } else { strip_port(&host) };
        let labels: Vec<&str> = host.split('.').collect();
        match_tokens(&self.tokens, &labels)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn match_tokens(tokens: &[Token], labels: &[&str]) -> bool {
    match tokens.split_first() {
        None => labels.is_empty(),
        Some((Token::AnyLabels, rest)) => {
            (0..=labels.len()).any(|skip| match_tokens(rest, &labels[skip..]))
        }
        Some((Token::Label(re), rest)) => match labels.split_first() {
            Some((label, remaining)) => re.is_match(label) && match_tokens(rest, remaining),
            None => false,
        },
    }
}

pub struct HostPredicateFactory;

impl ArgumentHints for HostPredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[PATTERN_KEY]
    }
}

impl RoutePredicateFactory for HostPredicateFactory {
    fn name(&self) -> &'static str {
        "Host"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let raw = args.require(self.name(), PATTERN_KEY)?;
        let pattern = HostPattern::parse(raw).map_err(|e| CompileError::predicate("Host", e))?;

        Ok(Arc::new(move |exchange: &mut ServerExchange| {
            exchange
                .request()
                .host()
                .map(|host| pattern.matches(host))
                .unwrap_or(false)
        }))
    }
}
