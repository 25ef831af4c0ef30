//! Predicates over the request line, query string and cookies.

use std::sync::Arc;

use regex::Regex;

use super::{RoutePredicate, RoutePredicateFactory};
use crate::error::CompileError;
use crate::filter::exchange::ServerExchange;
use crate::routing::args::{ArgumentHints, BoundArgs};

/// Compile a regex that must match the whole input.
fn full_match(predicate: &str, raw: &str) -> Result<Regex, CompileError> {
    Regex::new(&format!("^(?:{})$", raw))
        .map_err(|e| CompileError::predicate(predicate, format!("invalid regexp '{}': {}", raw, e)))
}

/// Matches the HTTP method token exactly, or against a regex such as `GET|HEAD`.
pub struct MethodPredicateFactory;

impl MethodPredicateFactory {
    pub const METHOD_KEY: &'static str = "method";
}

impl ArgumentHints for MethodPredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::METHOD_KEY]
    }
}

impl RoutePredicateFactory for MethodPredicateFactory {
    fn name(&self) -> &'static str {
        "Method"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let method = full_match(self.name(), args.require(self.name(), Self::METHOD_KEY)?)?;
        Ok(Arc::new(move |exchange: &mut ServerExchange| {
            method.is_match(exchange.request().method().as_str())
        }))
    }
}

/// Matches when a query parameter is present, optionally with a value
/// matching `regexp`.
pub struct QueryPredicateFactory;

impl QueryPredicateFactory {
    pub const PARAM_KEY: &'static str = "param";
    pub const REGEXP_KEY: &'static str = "regexp";
}

impl ArgumentHints for QueryPredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::PARAM_KEY, Self::REGEXP_KEY]
    }

    fn validate_args(&self) -> bool {
        false
    }
}

impl RoutePredicateFactory for QueryPredicateFactory {
    fn name(&self) -> &'static str {
        "Query"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        args.require_min(self.name(), 1)?;
        let param = args.require(self.name(), Self::PARAM_KEY)?.to_string();
        let regexp = match args.get(Self::REGEXP_KEY) {
            Some(raw) => Some(full_match(self.name(), raw)?),
            None => None,
        };

        Ok(Arc::new(move |exchange: &mut ServerExchange| {
            let params = exchange.request().query_params();
            let mut values = params.iter().filter(|(k, _)| *k == param).map(|(_, v)| v);
            match &regexp {
                None => values.next().is_some(),
                Some(re) => values.any(|v| re.is_match(v)),
            }
        }))
    }
}

/// Matches when the named cookie's value matches `regexp`.
pub struct CookiePredicateFactory;

impl CookiePredicateFactory {
    pub const NAME_KEY: &'static str = "name";
    pub const REGEXP_KEY: &'static str = "regexp";
}

impl ArgumentHints for CookiePredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::NAME_KEY, Self::REGEXP_KEY]
    }
}

impl RoutePredicateFactory for CookiePredicateFactory {
    fn name(&self) -> &'static str {
        "Cookie"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let name = args.require(self.name(), Self::NAME_KEY)?.to_string();
        let regexp = full_match(self.name(), args.require(self.name(), Self::REGEXP_KEY)?)?;

        Ok(Arc::new(move |exchange: &mut ServerExchange| {
            exchange
                .request()
                .cookies()
                .iter()
                .any(|(k, v)| *k == name && regexp.is_match(v))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::exchange::GatewayRequest;
    use crate::routing::predicate::tests::exchange;
    use axum::http::{header, HeaderMap, HeaderValue, Method};

    #[test]
    fn test_method_exact_and_alternatives() {
        let get = MethodPredicateFactory
            .apply(&BoundArgs::from([("method", "GET")]))
            .unwrap();
        assert!(get.test(&mut exchange(Method::GET, "/")));
        assert!(!get.test(&mut exchange(Method::POST, "/")));

        let either = MethodPredicateFactory
            .apply(&BoundArgs::from([("method", "GET|HEAD")]))
            .unwrap();
        assert!(either.test(&mut exchange(Method::HEAD, "/")));
        assert!(!either.test(&mut exchange(Method::DELETE, "/")));
    }

    #[test]
    fn test_query_presence_and_regexp() {
        let present = QueryPredicateFactory
            .apply(&BoundArgs::from([("param", "baz")]))
            .unwrap();
        assert!(present.test(&mut exchange(Method::GET, "/?baz=1")));
        assert!(present.test(&mut exchange(Method::GET, "/?baz")));
        assert!(!present.test(&mut exchange(Method::GET, "/?foo=1")));

        let regexp = QueryPredicateFactory
            .apply(&BoundArgs::from([("param", "foo"), ("regexp", "ba.")]))
            .unwrap();
        assert!(regexp.test(&mut exchange(Method::GET, "/?foo=zzz&foo=bar")));
        assert!(!regexp.test(&mut exchange(Method::GET, "/?foo=bart")));
    }

    #[test]
    fn test_query_requires_param() {
        assert!(QueryPredicateFactory.apply(&BoundArgs::default()).is_err());
    }

    #[test]
    fn test_cookie_regexp() {
        let predicate = CookiePredicateFactory
            .apply(&BoundArgs::from([("name", "chocolate"), ("regexp", "ch.p")]))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("chocolate=chip; other=x"));
        let mut ex = ServerExchange::new(GatewayRequest::new(Method::GET, "/".parse().unwrap(), headers));
        assert!(predicate.test(&mut ex));

        assert!(!predicate.test(&mut exchange(Method::GET, "/")));
    }
}
