//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out backend calls surface as `GatewayError::Timeout` (504)

use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// Run `fut` with a deadline. `what` names the operation in the error.
pub async fn with_timeout<T, F>(duration: Duration, what: &str, fut: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(format!(
            "{} did not complete within {}ms",
            what,
            duration.as_millis()
        ))),
    }
}
