//! Dispatcher: first matching route wins.
//!
//! # Design Decisions
//! - Scans one snapshot start to finish; a concurrent refresh never
//!   changes the table mid-scan
//! - No match is a normal outcome, not an error

use std::sync::Arc;

use crate::error::GatewayError;
use crate::filter::ServerExchange;
use crate::routing::route::Route;
use crate::routing::table::RouteTable;

#[derive(Debug, Clone)]
pub enum Dispatch {
    Matched(Arc<Route>),
    NoRoute,
}

#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    /// Find the route for this exchange and bind it.
    pub fn dispatch(&self, exchange: &mut ServerExchange) -> Result<Dispatch, GatewayError> {
        let snapshot = self.table.snapshot();
        for route in snapshot.routes() {
            if route.matches(exchange) {
                tracing::debug!(
                    route_id = route.id(),
                    generation = snapshot.generation(),
                    path = exchange.request().path(),
                    "Route matched"
                );
                exchange.bind_route(route.clone())?;
                return Ok(Dispatch::Matched(route.clone()));
            }
        }
        tracing::trace!(
            method = %exchange.request().method(),
            path = exchange.request().path(),
            "No route matched"
        );
        Ok(Dispatch::NoRoute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::predicate::tests::exchange;
    use crate::routing::table::tests::FixedLocator;
    use axum::http::Method;
    use url::Url;

    fn path_route(id: &str, order: i32, prefix: &'static str) -> Arc<Route> {
        Arc::new(Route::new(
            id,
            Url::parse("http://localhost:1").unwrap(),
            order,
            Arc::new(move |ex: &mut ServerExchange| ex.request().path().starts_with(prefix)),
            Vec::new(),
        ))
    }

    async fn dispatcher(routes: Vec<Arc<Route>>) -> (Arc<FixedLocator>, Arc<RouteTable>, Dispatcher) {
        let locator = Arc::new(FixedLocator::default());
        *locator.routes.lock().unwrap() = routes;
        let table = Arc::new(RouteTable::new(locator.clone()).await.unwrap());
        (locator, table.clone(), Dispatcher::new(table))
    }

    fn matched_id(dispatch: Dispatch) -> Option<String> {
        match dispatch {
            Dispatch::Matched(route) => Some(route.id().to_string()),
            Dispatch::NoRoute => None,
        }
    }

    #[tokio::test]
    async fn test_lowest_order_match_wins() {
        let (_, _, dispatcher) = dispatcher(vec![
            path_route("catch-all", 10, "/"),
            path_route("api", 1, "/api"),
        ])
        .await;

        let mut ex = exchange(Method::GET, "/api/users");
        assert_eq!(matched_id(dispatcher.dispatch(&mut ex).unwrap()).as_deref(), Some("api"));
        assert_eq!(ex.route().map(|r| r.id()), Some("api"));

        let mut ex = exchange(Method::GET, "/other");
        assert_eq!(matched_id(dispatcher.dispatch(&mut ex).unwrap()).as_deref(), Some("catch-all"));
    }

    #[tokio::test]
    async fn test_no_match_leaves_exchange_unbound() {
        let (_, _, dispatcher) = dispatcher(vec![path_route("api", 0, "/api")]).await;
        let mut ex = exchange(Method::GET, "/static/app.js");
        assert!(matches!(dispatcher.dispatch(&mut ex).unwrap(), Dispatch::NoRoute));
        assert!(ex.route().is_none());
    }

    #[tokio::test]
    async fn test_dispatching_twice_is_refused() {
        let (_, _, dispatcher) = dispatcher(vec![path_route("api", 0, "/api")]).await;
        let mut ex = exchange(Method::GET, "/api");
        dispatcher.dispatch(&mut ex).unwrap();
        assert!(matches!(
            dispatcher.dispatch(&mut ex),
            Err(GatewayError::RouteAlreadyBound { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_sees_refreshed_table() {
        let (locator, table, dispatcher) = dispatcher(vec![path_route("v1", 0, "/")]).await;
        *locator.routes.lock().unwrap() = vec![path_route("v2", 0, "/")];
        table.refresh().await.unwrap();

        let mut ex = exchange(Method::GET, "/");
        assert_eq!(matched_id(dispatcher.dispatch(&mut ex).unwrap()).as_deref(), Some("v2"));
    }
}
