use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::lifecycle::Gateway;
use crate::routing::{RefreshTrigger, Route, RouteDefinition};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub generation: u64,
    pub routes: usize,
    pub rate_limiter_buckets: usize,
}

#[derive(Serialize)]
pub struct RouteView {
    pub route_id: String,
    pub uri: String,
    pub order: i32,
    pub filters: Vec<String>,
}

impl From<&Route> for RouteView {
    fn from(route: &Route) -> Self {
        Self {
            route_id: route.id().to_string(),
            uri: route.uri().to_string(),
            order: route.order(),
            filters: route
                .filters()
                .iter()
                .map(|f| format!("[{}, order = {}]", f.name(), f.order()))
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub group: String,
    pub address: String,
    pub active_connections: usize,
    pub max_connections: usize,
}

#[derive(Serialize)]
pub struct RefreshResult {
    pub generation: u64,
}

fn error(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub async fn get_status(State(gateway): State<Gateway>) -> Json<SystemStatus> {
    let snapshot = gateway.table.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        generation: snapshot.generation(),
        routes: snapshot.routes().len(),
        rate_limiter_buckets: gateway.store.len(),
    })
}

pub async fn get_routes(State(gateway): State<Gateway>) -> Json<Vec<RouteView>> {
    let snapshot = gateway.table.snapshot();
    Json(snapshot.routes().iter().map(|r| RouteView::from(r.as_ref())).collect())
}

pub async fn get_route(State(gateway): State<Gateway>, Path(id): Path<String>) -> Response {
    let snapshot = gateway.table.snapshot();
    match snapshot.routes().iter().find(|r| r.id() == id) {
        Some(route) => Json(RouteView::from(route.as_ref())).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("route not found: {}", id)),
    }
}

pub async fn get_route_definitions(State(gateway): State<Gateway>) -> Json<Vec<RouteDefinition>> {
    Json(gateway.definitions.snapshot().as_ref().clone())
}

/// Save a definition. It is served after the next refresh.
pub async fn save_route_definition(
    State(gateway): State<Gateway>,
    Path(id): Path<String>,
    Json(mut definition): Json<RouteDefinition>,
) -> Response {
    if id.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "route id must not be empty".to_string());
    }
    definition.id = id;
    tracing::info!(route_id = %definition.id, uri = %definition.uri, "Saving route definition");
    gateway.repository.save(definition).await;
    StatusCode::CREATED.into_response()
}

pub async fn delete_route_definition(
    State(gateway): State<Gateway>,
    Path(id): Path<String>,
) -> Response {
    match gateway.repository.delete(&id).await {
        Ok(_) => {
            tracing::info!(route_id = %id, "Deleted route definition");
            StatusCode::OK.into_response()
        }
        Err(e) => error(StatusCode::NOT_FOUND, e.to_string()),
    }
}

pub async fn refresh(State(gateway): State<Gateway>) -> Response {
    match gateway.refresher.refresh(RefreshTrigger::Admin).await {
        Ok(generation) => Json(RefreshResult { generation }).into_response(),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_backends(State(gateway): State<Gateway>) -> Json<Vec<BackendStatus>> {
    let config = gateway.config.load();
    let backends = gateway.backends.load();
    Json(
        backends
            .all_backends()
            .iter()
            .map(|b| BackendStatus {
                name: b.name.clone(),
                group: config
                    .backends
                    .iter()
                    .find(|c| c.name == b.name)
                    .map(|c| c.group.clone())
                    .unwrap_or_default(),
                address: b.addr.to_string(),
                active_connections: b.active(),
                max_connections: b.max_connections,
            })
            .collect(),
    )
}
