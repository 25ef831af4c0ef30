//! Admin API.
//!
//! | Method | Path                              | Action                          |
//! |--------|-----------------------------------|---------------------------------|
//! | GET    | /admin/status                     | version, table generation       |
//! | GET    | /admin/routes                     | compiled routes in table order  |
//! | GET    | /admin/routes/{id}                | one compiled route              |
//! | GET    | /admin/routedefinitions           | cached definitions              |
//! | POST   | /admin/routedefinitions/{id}      | save a definition               |
//! | DELETE | /admin/routedefinitions/{id}      | delete a saved definition       |
//! | POST   | /admin/refresh                    | re-pull and recompile routes    |
//! | GET    | /admin/backends                   | `lb://` instances and load      |
//!
//! Every endpoint needs `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::Gateway;

pub fn setup_admin_router(gateway: Gateway) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/{id}", get(get_route))
        .route("/admin/routedefinitions", get(get_route_definitions))
        .route(
            "/admin/routedefinitions/{id}",
            post(save_route_definition).delete(delete_route_definition),
        )
        .route("/admin/refresh", post(refresh))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(gateway.clone(), admin_auth_middleware))
        .with_state(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::routing::RouteDefinition;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    async fn gateway() -> Gateway {
        let mut config = GatewayConfig::default();
        config.admin.api_key = KEY.to_string();
        config.routes.push(RouteDefinition::new("users", "http://localhost:3000").predicate("Path=/users/**"));
        Gateway::builder(config).build().await.unwrap()
    }

    fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", KEY));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let app = setup_admin_router(gateway().await);
        let response = app
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_lists_compiled_routes() {
        let app = setup_admin_router(gateway().await);
        let response = app.oneshot(request("GET", "/admin/routes", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body[0]["route_id"], "users");
        assert_eq!(body[0]["filters"][0], "[RemoveNonProxyHeaders, order = 1]");
    }

    #[tokio::test]
    async fn test_save_refresh_delete_cycle() {
        let gateway = gateway().await;
        let app = setup_admin_router(gateway.clone());

        let saved = app
            .clone()
            .oneshot(request(
                "POST",
                "/admin/routedefinitions/orders",
                Some(r#"{"id":"","uri":"http://localhost:3001","predicates":["Path=/orders/**"]}"#),
            ))
            .await
            .unwrap();
        assert_eq!(saved.status(), StatusCode::CREATED);

        let refreshed = app.clone().oneshot(request("POST", "/admin/refresh", None)).await.unwrap();
        assert_eq!(json(refreshed).await["generation"], 2);
        assert_eq!(gateway.table.snapshot().routes().len(), 2);

        let deleted = app
            .clone()
            .oneshot(request("DELETE", "/admin/routedefinitions/orders", None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let missing = app
            .oneshot(request("DELETE", "/admin/routedefinitions/orders", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_reported() {
        let gateway = gateway().await;
        gateway
            .repository
            .save(RouteDefinition::new("bad", "http://localhost").predicate("Nope=1"))
            .await;
        let app = setup_admin_router(gateway.clone());

        let response = app.oneshot(request("POST", "/admin/refresh", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(gateway.table.snapshot().generation(), 1);
    }
}
