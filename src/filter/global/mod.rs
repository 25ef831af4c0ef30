//! Global filters: applied to every matched route.
//!
//! | Filter               | Order       | Role                                      |
//! |----------------------|-------------|-------------------------------------------|
//! | WriteResponse        | -1          | commit the response after unwinding       |
//! | RouteToRequestUrl    | 10000       | destination + request path → request URL  |
//! | LoadBalancerClient   | 10100       | `lb://group` → chosen backend instance    |
//! | HttpRouting          | last        | forward `http`/`https`                    |
//! | WebsocketRouting     | last        | relay `ws`/`wss` upgrades                 |

pub mod http_routing;
pub mod load_balancer;
pub mod route_to_url;
pub mod websocket_routing;
pub mod write_response;

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::TimeoutConfig;
use crate::filter::GatewayFilter;
use crate::load_balancer::BackendManager;

pub use http_routing::HttpRoutingFilter;
pub use load_balancer::LoadBalancerClientFilter;
pub use route_to_url::RouteToRequestUrlFilter;
pub use websocket_routing::WebsocketRoutingFilter;
pub use write_response::WriteResponseFilter;

/// The built-in global filters.
pub fn default_global_filters(
    timeouts: &TimeoutConfig,
    backends: Arc<ArcSwap<BackendManager>>,
) -> Vec<Arc<dyn GatewayFilter>> {
    vec![
        Arc::new(WriteResponseFilter),
        Arc::new(RouteToRequestUrlFilter),
        Arc::new(LoadBalancerClientFilter::new(backends)),
        Arc::new(HttpRoutingFilter::new(timeouts)),
        Arc::new(WebsocketRoutingFilter),
    ]
}
