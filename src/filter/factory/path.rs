//! Filters that rewrite the outbound request path or query.
//!
//! Path rewrites record the pre-rewrite URL in the exchange's
//! original-URL list before replacing the request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use super::{GatewayFilterFactory, NAME_KEY, VALUE_KEY};
use crate::error::{CompileError, GatewayError};
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::routing::args::{ArgumentHints, BoundArgs};

fn encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Appends `name=value` to the query string.
pub struct AddRequestParameterFilterFactory;

impl ArgumentHints for AddRequestParameterFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[NAME_KEY, VALUE_KEY]
    }
}

struct AddRequestParameter {
    pair: String,
}

#[async_trait]
impl GatewayFilter for AddRequestParameter {
    fn name(&self) -> &str {
        "AddRequestParameter"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let query = match exchange.request().query() {
            Some(q) if !q.is_empty() => {
                let separator = if q.ends_with('&') { "" } else { "&" };
                format!("{}{}{}", q, separator, self.pair)
            }
            _ => self.pair.clone(),
        };
        let request = exchange.request().mutate().query(Some(query)).build()?;
        exchange.set_request(request);
        chain.filter(exchange).await
    }
}

impl GatewayFilterFactory for AddRequestParameterFilterFactory {
    fn name(&self) -> &'static str {
        "AddRequestParameter"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let name = args.require(self.name(), NAME_KEY)?;
        let value = args.require(self.name(), VALUE_KEY)?;
        Ok(Arc::new(AddRequestParameter {
            pair: format!("{}={}", encode(name), encode(value)),
        }))
    }
}

/// Prepends a literal prefix to the path.
pub struct PrefixPathFilterFactory;

impl PrefixPathFilterFactory {
    pub const PREFIX_KEY: &'static str = "prefix";
}

impl ArgumentHints for PrefixPathFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::PREFIX_KEY]
    }
}

struct PrefixPath {
    prefix: String,
}

#[async_trait]
impl GatewayFilter for PrefixPath {
    fn name(&self) -> &str {
        "PrefixPath"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        exchange.record_original_request_url();
        let path = format!("{}{}", self.prefix, exchange.request().path());
        let request = exchange.request().mutate().path(path).build()?;
        tracing::trace!(prefix = %self.prefix, uri = %request.uri(), "Prefixed path");
        exchange.set_request(request);
        chain.filter(exchange).await
    }
}

impl GatewayFilterFactory for PrefixPathFilterFactory {
    fn name(&self) -> &'static str {
        "PrefixPath"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        Ok(Arc::new(PrefixPath {
            prefix: args.require(self.name(), Self::PREFIX_KEY)?.to_string(),
        }))
    }
}

/// Regex substitution on the path. `$\` in the replacement stands for `$`,
/// so `/$\{segment}` can be written where `${..}` would be interpolated.
pub struct RewritePathFilterFactory;

impl RewritePathFilterFactory {
    pub const REGEXP_KEY: &'static str = "regexp";
    pub const REPLACEMENT_KEY: &'static str = "replacement";
}

impl ArgumentHints for RewritePathFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::REGEXP_KEY, Self::REPLACEMENT_KEY]
    }
}

struct RewritePath {
    regex: Regex,
    replacement: String,
}

impl RewritePath {
    fn rewrite(&self, path: &str) -> String {
        self.regex
            .replace_all(path, self.replacement.as_str())
            .into_owned()
    }
}

#[async_trait]
impl GatewayFilter for RewritePath {
    fn name(&self) -> &str {
        "RewritePath"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        exchange.record_original_request_url();
        let path = self.rewrite(exchange.request().path());
        let request = exchange.request().mutate().path(path).build()?;
        exchange.set_request(request);
        chain.filter(exchange).await
    }
}

impl GatewayFilterFactory for RewritePathFilterFactory {
    fn name(&self) -> &'static str {
        "RewritePath"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let raw = args.require(self.name(), Self::REGEXP_KEY)?;
        let regex = Regex::new(raw).map_err(|e| {
            CompileError::filter(self.name(), format!("invalid regexp '{}': {}", raw, e))
        })?;
        let replacement = args
            .require(self.name(), Self::REPLACEMENT_KEY)?
            .replace("$\\", "$");
        Ok(Arc::new(RewritePath { regex, replacement }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Variable(String),
}

/// URI template such as `/{segment}` or `/api/{id}/detail`.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    parts: Vec<TemplatePart>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(TemplatePart::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' in '{}'", template))?;
            let inner = &rest[open + 1..open + close];
            let name = inner.split(':').next().unwrap_or_default().trim();
            if name.is_empty() {
                return Err(format!("empty variable in '{}'", template));
            }
            parts.push(TemplatePart::Variable(name.to_string()));
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Literal(rest.to_string()));
        }
        Ok(Self { parts })
    }

    pub fn expand(&self, variables: &HashMap<String, String>) -> Result<String, String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Variable(name) => {
                    let value = variables
                        .get(name)
                        .ok_or_else(|| format!("no value for template variable '{}'", name))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Replaces the path with a template expanded from Path predicate captures.
pub struct SetPathFilterFactory;

impl SetPathFilterFactory {
    pub const TEMPLATE_KEY: &'static str = "template";
}

impl ArgumentHints for SetPathFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::TEMPLATE_KEY]
    }
}

struct SetPath {
    template: UriTemplate,
}

#[async_trait]
impl GatewayFilter for SetPath {
    fn name(&self) -> &str {
        "SetPath"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        exchange.record_original_request_url();
        let path = self
            .template
            .expand(&exchange.attributes().uri_template_variables)
            .map_err(GatewayError::Internal)?;
        let request = exchange.request().mutate().path(path).build()?;
        exchange.set_request(request);
        chain.filter(exchange).await
    }
}

impl GatewayFilterFactory for SetPathFilterFactory {
    fn name(&self) -> &'static str {
        "SetPath"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let raw = args.require(self.name(), Self::TEMPLATE_KEY)?;
        let template = UriTemplate::parse(raw).map_err(|e| CompileError::filter(self.name(), e))?;
        Ok(Arc::new(SetPath { template }))
    }
}
