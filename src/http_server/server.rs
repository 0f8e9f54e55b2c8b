//! # HTTP Server
//!
//! Management API over the registry and the routing resolver.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::cluster_routes::cluster_routes;
use super::config::HttpServerConfig;
use super::observability_routes::{health_routes, observability_routes};
use super::registry_routes::registry_routes;
use super::routing_routes::routing_routes;
use crate::observability::{log_event_with_fields, Event};
use crate::registry::Registry;
use crate::routing::{GatewaySelector, Resolver};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub resolver: Arc<Resolver>,
    pub selector: Arc<GatewaySelector>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            resolver: Arc::new(Resolver::new(registry.clone())),
            selector: Arc::new(GatewaySelector::new()),
            registry,
        }
    }
}

/// HTTP server for the control plane
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    pub fn build_router(config: &HttpServerConfig, state: AppState) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        // Static segments win over `/:class` inside /libreapi
        let libreapi = Router::new()
            .merge(cluster_routes())
            .merge(routing_routes())
            .merge(registry_routes());

        Router::new()
            .merge(health_routes())
            .nest("/libreapi", libreapi)
            .nest("/observability", observability_routes())
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address '{}': {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        log_event_with_fields(Event::Serving, &[("addr", &addr.to_string())]);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::ClusterConfig;
    use crate::observability::MetricsRegistry;
    use crate::store::MemoryStore;

    fn router() -> Router {
        let registry = Registry::open(
            Arc::new(MemoryStore::new()),
            ClusterConfig::standalone("node1"),
            Arc::new(MetricsRegistry::new()),
        )
        .unwrap();
        HttpServer::new(HttpServerConfig::default(), AppState::new(Arc::new(registry))).router()
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn netalias(name: &str) -> Value {
        json!({
            "name": name,
            "addresses": [
                {"member": "node1", "listen": "10.0.0.1", "advertise": "203.0.113.1"}
            ]
        })
    }

    #[test]
    fn test_server_socket_addr() {
        let registry = Registry::open(
            Arc::new(MemoryStore::new()),
            ClusterConfig::standalone("node1"),
            Arc::new(MetricsRegistry::new()),
        )
        .unwrap();
        let server = HttpServer::new(
            HttpServerConfig::with_port(9090),
            AppState::new(Arc::new(registry)),
        );
        assert_eq!(server.socket_addr(), "127.0.0.1:9090");
    }

    #[tokio::test]
    async fn test_health() {
        let router = router();
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_class_is_not_found() {
        let router = router();
        let (status, body) = call(&router, "GET", "/libreapi/trunk", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SBC_UNKNOWN_CLASS");
    }

    #[tokio::test]
    async fn test_create_get_list_delete() {
        let router = router();
        let (status, body) = call(&router, "POST", "/libreapi/netalias", Some(netalias("edge"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "edge");

        let (status, body) = call(&router, "GET", "/libreapi/netalias/edge", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "edge");
        assert_eq!(body["engaged_by"], json!([]));

        let (_, body) = call(&router, "GET", "/libreapi/netalias", None).await;
        assert_eq!(body["total"], 1);

        let (status, _) = call(&router, "DELETE", "/libreapi/netalias/edge", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&router, "GET", "/libreapi/netalias/edge", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SBC_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let router = router();
        call(&router, "POST", "/libreapi/netalias", Some(netalias("edge"))).await;
        let (status, body) = call(&router, "POST", "/libreapi/netalias", Some(netalias("edge"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "SBC_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_cluster_read_and_resync() {
        let router = router();
        let (status, body) = call(&router, "GET", "/libreapi/cluster", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["members"], json!(["node1"]));

        let (status, body) = call(&router, "POST", "/libreapi/cluster/resync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"], 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_table() {
        let router = router();
        let (status, body) = call(
            &router,
            "POST",
            "/libreapi/routing/resolve",
            Some(json!({"table": "main", "value": "123"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SBC_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_metrics_count_commits() {
        let router = router();
        call(&router, "POST", "/libreapi/netalias", Some(netalias("edge"))).await;
        let (status, body) = call(&router, "GET", "/observability/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mutations_committed"], 1);
    }
}
