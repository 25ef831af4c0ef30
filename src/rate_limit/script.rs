//! The `request_rate_limiter` token-bucket script.
//!
//! Stores execute it atomically per bucket. Inputs travel the way a
//! scripting store expects them:
//!
//! ```text
//! keys: [request_rate_limiter.{id}.tokens, request_rate_limiter.{id}.timestamp]
//! args: [replenishRate, burstCapacity, now (epoch seconds), requested]
//! result: [allowed (0|1), tokens_left]
//! ```

use crate::rate_limit::StoreError;

/// Identifier stores dispatch on.
pub const REQUEST_RATE_LIMITER_SCRIPT: &str = "request_rate_limiter";

/// Tokens taken by one request.
pub const REQUESTED_TOKENS: i64 = 1;

/// Bucket keys for an id.
pub fn keys(id: &str) -> Vec<String> {
    let prefix = format!("request_rate_limiter.{{{}}}", id);
    vec![format!("{}.tokens", prefix), format!("{}.timestamp", prefix)]
}

/// Script arguments for one check.
pub fn args(replenish_rate: u32, burst_capacity: u32, now_secs: i64) -> Vec<String> {
    vec![
        replenish_rate.to_string(),
        burst_capacity.to_string(),
        now_secs.to_string(),
        REQUESTED_TOKENS.to_string(),
    ]
}

/// Persisted bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub tokens: i64,
    pub timestamp: i64,
}

/// Parsed script arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptArgs {
    pub rate: i64,
    pub capacity: i64,
    pub now: i64,
    pub requested: i64,
}

impl ScriptArgs {
    pub fn parse(args: &[String]) -> Result<Self, StoreError> {
        let value = |idx: usize, name: &str| -> Result<i64, StoreError> {
            let raw = args
                .get(idx)
                .ok_or_else(|| StoreError::InvalidArguments(format!("missing {}", name)))?;
            raw.trim()
                .parse::<i64>()
                .map_err(|e| StoreError::InvalidArguments(format!("{} '{}': {}", name, raw, e)))
        };

        let parsed = Self {
            rate: value(0, "rate")?,
            capacity: value(1, "capacity")?,
            now: value(2, "now")?,
            requested: value(3, "requested")?,
        };
        if parsed.rate <= 0 || parsed.capacity <= 0 {
            return Err(StoreError::InvalidArguments(format!(
                "rate and capacity must be positive, got {} and {}",
                parsed.rate, parsed.capacity
            )));
        }
        Ok(parsed)
    }

    /// Seconds to keep an untouched bucket: twice the time to refill it from empty.
    pub fn ttl_secs(&self) -> i64 {
        let fill_time = (self.capacity + self.rate - 1) / self.rate;
        (fill_time * 2).max(1)
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub allowed: bool,
    /// State to persist.
    pub bucket: Bucket,
}

impl Evaluation {
    /// Reply in the `[allowed, tokens_left]` shape.
    pub fn reply(&self) -> Vec<i64> {
        vec![i64::from(self.allowed), self.bucket.tokens]
    }
}

/// Refill the bucket for the time elapsed since it was last touched, then
/// take `requested` tokens if enough are available.
pub fn evaluate(previous: Option<Bucket>, args: &ScriptArgs) -> Evaluation {
    let previous = previous.unwrap_or(Bucket {
        tokens: args.capacity,
        timestamp: args.now,
    });

    let elapsed = (args.now - previous.timestamp).max(0);
    let filled = previous
        .tokens
        .saturating_add(elapsed.saturating_mul(args.rate))
        .min(args.capacity);

    let allowed = filled >= args.requested;
    let tokens = if allowed { filled - args.requested } else { filled };

    Evaluation {
        allowed,
        bucket: Bucket {
            tokens,
            timestamp: args.now,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_args(rate: i64, capacity: i64, now: i64) -> ScriptArgs {
        ScriptArgs {
            rate,
            capacity,
            now,
            requested: 1,
        }
    }

    #[test]
    fn test_new_bucket_starts_full() {
        let eval = evaluate(None, &script_args(1, 5, 100));
        assert!(eval.allowed);
        assert_eq!(eval.bucket, Bucket { tokens: 4, timestamp: 100 });
        assert_eq!(eval.reply(), vec![1, 4]);
    }

    #[test]
    fn test_empty_bucket_denies_without_going_negative() {
        let eval = evaluate(Some(Bucket { tokens: 0, timestamp: 100 }), &script_args(1, 5, 100));
        assert!(!eval.allowed);
        assert_eq!(eval.bucket.tokens, 0);
        assert_eq!(eval.reply(), vec![0, 0]);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let eval = evaluate(Some(Bucket { tokens: 0, timestamp: 0 }), &script_args(10, 5, 1_000));
        assert_eq!(eval.bucket.tokens, 4);
    }

    #[test]
    fn test_clock_going_backwards_refills_nothing() {
        let eval = evaluate(Some(Bucket { tokens: 0, timestamp: 200 }), &script_args(1, 5, 100));
        assert!(!eval.allowed);
        assert_eq!(eval.bucket.timestamp, 100);
    }

    #[test]
    fn test_keys_and_args_layout() {
        assert_eq!(
            keys("10.0.0.1"),
            vec![
                "request_rate_limiter.{10.0.0.1}.tokens".to_string(),
                "request_rate_limiter.{10.0.0.1}.timestamp".to_string(),
            ]
        );
        assert_eq!(args(1, 5, 42), vec!["1", "5", "42", "1"]);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(ScriptArgs::parse(&args(1, 5, 42)).is_ok());
        assert!(ScriptArgs::parse(&["1".to_string()]).is_err());
        assert!(ScriptArgs::parse(&["x".into(), "5".into(), "1".into(), "1".into()]).is_err());
        assert!(ScriptArgs::parse(&args(0, 5, 42)).is_err());
    }

    #[test]
    fn test_ttl_is_twice_fill_time() {
        assert_eq!(script_args(1, 5, 0).ttl_secs(), 10);
        assert_eq!(script_args(2, 5, 0).ttl_secs(), 6);
        assert_eq!(script_args(100, 5, 0).ttl_secs(), 2);
    }
}
