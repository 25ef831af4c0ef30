//! Time-window predicates: Before, After, Between.
//!
//! Bounds are epoch milliseconds or RFC 3339 timestamps; a trailing
//! `[Zone/Id]` suffix is accepted and ignored (the offset is authoritative).

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use super::{RoutePredicate, RoutePredicateFactory};
use crate::error::CompileError;
use crate::filter::exchange::ServerExchange;
use crate::routing::args::{ArgumentHints, BoundArgs};

pub fn parse_datetime(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(millis)
            .map(|dt| dt.fixed_offset())
            .ok_or_else(|| format!("epoch millis {} out of range", millis));
    }
    let without_zone = match raw.find('[') {
        Some(idx) if raw.ends_with(']') => &raw[..idx],
        _ => raw,
    };
    DateTime::parse_from_rfc3339(without_zone).map_err(|e| format!("invalid datetime '{}': {}", raw, e))
}

fn datetime_arg(
    factory: &str,
    args: &BoundArgs,
    key: &str,
) -> Result<DateTime<FixedOffset>, CompileError> {
    parse_datetime(args.require(factory, key)?).map_err(|e| CompileError::predicate(factory, e))
}

pub struct AfterPredicateFactory;

impl AfterPredicateFactory {
    pub const DATETIME_KEY: &'static str = "datetime";
}

impl ArgumentHints for AfterPredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::DATETIME_KEY]
    }
}

impl RoutePredicateFactory for AfterPredicateFactory {
    fn name(&self) -> &'static str {
        "After"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let after = datetime_arg(self.name(), args, Self::DATETIME_KEY)?;
        Ok(Arc::new(move |_: &mut ServerExchange| Utc::now() > after))
    }
}

pub struct BeforePredicateFactory;

impl BeforePredicateFactory {
    pub const DATETIME_KEY: &'static str = "datetime";
}

impl ArgumentHints for BeforePredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::DATETIME_KEY]
    }
}

impl RoutePredicateFactory for BeforePredicateFactory {
    fn name(&self) -> &'static str {
        "Before"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let before = datetime_arg(self.name(), args, Self::DATETIME_KEY)?;
        Ok(Arc::new(move |_: &mut ServerExchange| Utc::now() < before))
    }
}

pub struct BetweenPredicateFactory;

impl BetweenPredicateFactory {
    pub const DATETIME1_KEY: &'static str = "datetime1";
    pub const DATETIME2_KEY: &'static str = "datetime2";
}

impl ArgumentHints for BetweenPredicateFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[Self::DATETIME1_KEY, Self::DATETIME2_KEY]
    }
}

impl RoutePredicateFactory for BetweenPredicateFactory {
    fn name(&self) -> &'static str {
        "Between"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let start = datetime_arg(self.name(), args, Self::DATETIME1_KEY)?;
        let end = datetime_arg(self.name(), args, Self::DATETIME2_KEY)?;
        if start >= end {
            return Err(CompileError::predicate(
                self.name(),
                format!("{} must be before {}", start, end),
            ));
        }
        Ok(Arc::new(move |_: &mut ServerExchange| {
            let now = Utc::now();
            now > start && now < end
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::predicate::tests::exchange;
    use axum::http::Method;
    use chrono::Duration;

    fn millis(offset: Duration) -> String {
        (Utc::now() + offset).timestamp_millis().to_string()
    }

    #[test]
    fn test_parse_formats() {
        let from_millis = parse_datetime("1500000000000").unwrap();
        let from_text = parse_datetime("2017-07-14T02:40:00Z").unwrap();
        assert_eq!(from_millis, from_text);

        let zoned = parse_datetime("2017-01-20T17:42:47.789-07:00[America/Denver]").unwrap();
        assert_eq!(zoned.offset().local_minus_utc(), -7 * 3600);

        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_before_and_after() {
        let past = millis(-Duration::hours(1));
        let future = millis(Duration::hours(1));
        let mut ex = exchange(Method::GET, "/");

        let after_past = AfterPredicateFactory
            .apply(&BoundArgs::from([("datetime", past.as_str())]))
            .unwrap();
        let before_past = BeforePredicateFactory
            .apply(&BoundArgs::from([("datetime", past.as_str())]))
            .unwrap();
        let before_future = BeforePredicateFactory
            .apply(&BoundArgs::from([("datetime", future.as_str())]))
            .unwrap();

        assert!(after_past.test(&mut ex));
        assert!(!before_past.test(&mut ex));
        assert!(before_future.test(&mut ex));
    }

    #[test]
    fn test_between_window() {
        let past = millis(-Duration::hours(1));
        let future = millis(Duration::hours(1));
        let mut ex = exchange(Method::GET, "/");

        let open = BetweenPredicateFactory
            .apply(&BoundArgs::from([("datetime1", past.as_str()), ("datetime2", future.as_str())]))
            .unwrap();
        assert!(open.test(&mut ex));
    }

    #[test]
    fn test_between_requires_ordered_bounds() {
        let past = millis(-Duration::hours(1));
        let future = millis(Duration::hours(1));

        let err = BetweenPredicateFactory
            .apply(&BoundArgs::from([("datetime1", future.as_str()), ("datetime2", past.as_str())]))
            .err()
            .unwrap();
        assert!(matches!(err, CompileError::InvalidPredicateConfig { .. }));
    }
}
