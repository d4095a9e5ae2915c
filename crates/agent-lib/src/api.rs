//! HTTP status endpoint: health checks and Prometheus metrics

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use tracing::info;

use crate::health::{HealthRegistry, SubsystemStatus};

/// State shared with the status routes.
#[derive(Clone)]
pub struct StatusState {
    pub health: HealthRegistry,
}

async fn healthz(State(state): State<StatusState>) -> impl IntoResponse {
    let report = state.health.report();

    let status_code = match report.status {
        // Degraded still serves traffic.
        SubsystemStatus::Up | SubsystemStatus::Degraded => StatusCode::OK,
        SubsystemStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(report))
}

async fn readyz(State(state): State<StatusState>) -> impl IntoResponse {
    let readiness = state.health.readiness();

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Build the status router.
pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the status endpoint. Port 0 binds an ephemeral port.
pub async fn serve(port: u16, state: StatusState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "Status endpoint listening");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::subsystems;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> StatusState {
        let health = HealthRegistry::new();
        health.register(subsystems::NODE_MANAGER);
        health.register(subsystems::OBJECT_MANAGER);
        StatusState { health }
    }

    #[tokio::test]
    async fn healthz_returns_ok_when_up() {
        let state = test_state();
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["status"], "up");
    }

    #[tokio::test]
    async fn healthz_returns_503_when_down() {
        let state = test_state();
        state
            .health
            .set_down(subsystems::OBJECT_MANAGER, "store socket gone");
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readyz_tracks_the_readiness_flag() {
        let state = test_state();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.health.set_ready(true);
        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exposes_agent_families() {
        // Touch the metrics so the families exist in the default registry.
        let metrics = crate::observability::AgentMetrics::new();
        metrics.inc_heartbeats_sent();

        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("node_agent_heartbeats_sent_total"));
    }
}
