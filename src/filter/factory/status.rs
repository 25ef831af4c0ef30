//! Filters that decide the response status: SetStatus and RedirectTo.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use url::Url;

use super::GatewayFilterFactory;
use crate::error::{CompileError, GatewayError};
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::routing::args::{ArgumentHints, BoundArgs};

pub const STATUS_KEY: &str = "status";
pub const URL_KEY: &str = "url";

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Parse `404` or a symbolic name such as `NOT_FOUND` / `Not Found`.
pub fn parse_status(raw: &str) -> Result<StatusCode, String> {
    let raw = raw.trim();
    if let Ok(code) = raw.parse::<u16>() {
        return StatusCode::from_u16(code).map_err(|e| format!("invalid status {}: {}", code, e));
    }
    let wanted = normalize(raw);
    (100..600)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|status| {
            status
                .canonical_reason()
                .map(|reason| normalize(reason) == wanted)
                .unwrap_or(false)
        })
        .ok_or_else(|| format!("unknown status '{}'", raw))
}

/// Sets the response status after the chain completes, unless committed.
pub struct SetStatusFilterFactory;

impl ArgumentHints for SetStatusFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[STATUS_KEY]
    }
}

struct SetStatus {
    status: StatusCode,
}

#[async_trait]
impl GatewayFilter for SetStatus {
    fn name(&self) -> &str {
        "SetStatus"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        chain.filter(exchange).await?;
        if !exchange.response().is_committed() {
            exchange.response_mut().set_status(self.status);
        }
        Ok(())
    }
}

impl GatewayFilterFactory for SetStatusFilterFactory {
    fn name(&self) -> &'static str {
        "SetStatus"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let status = parse_status(args.require(self.name(), STATUS_KEY)?)
            .map_err(|e| CompileError::filter(self.name(), e))?;
        Ok(Arc::new(SetStatus { status }))
    }
}

/// Answers with a 3xx and `Location`, without forwarding.
pub struct RedirectToFilterFactory;

impl ArgumentHints for RedirectToFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[STATUS_KEY, URL_KEY]
    }
}

struct RedirectTo {
    status: StatusCode,
    location: HeaderValue,
}

#[async_trait]
impl GatewayFilter for RedirectTo {
    fn name(&self) -> &str {
        "RedirectTo"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        _chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let response = exchange.response_mut();
        if !response.is_committed() {
            response.set_status(self.status);
            response
                .headers_mut()
                .insert(header::LOCATION, self.location.clone());
            response.set_complete();
        }
        Ok(())
    }
}

impl GatewayFilterFactory for RedirectToFilterFactory {
    fn name(&self) -> &'static str {
        "RedirectTo"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let raw_status = args.require(self.name(), STATUS_KEY)?;
        let status = parse_status(raw_status).map_err(|e| CompileError::filter(self.name(), e))?;
        if !status.is_redirection() {
            return Err(CompileError::filter(
                self.name(),
                format!("status must be a 3xx code, but was {}", raw_status),
            ));
        }

        let raw_url = args.require(self.name(), URL_KEY)?;
        Url::parse(raw_url)
            .map_err(|e| CompileError::filter(self.name(), format!("invalid url {}: {}", raw_url, e)))?;
        let location = HeaderValue::from_str(raw_url)
            .map_err(|e| CompileError::filter(self.name(), e.to_string()))?;

        Ok(Arc::new(RedirectTo { status, location }))
    }
}
