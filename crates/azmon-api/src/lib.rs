//! azmon-api: HTTP surface of the probe daemon.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/probe` | Run a probe described by the query string |
//! | GET | `/metrics` | Exporter self-telemetry (API quotas, request counters) |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use azmon_client::RateLimitRecorder;
use azmon_probe::ProbeServices;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<ProbeServices>,
    pub recorder: Arc<RateLimitRecorder>,
}

/// Build the complete router.
pub fn build_router(services: Arc<ProbeServices>, recorder: Arc<RateLimitRecorder>) -> Router {
    let state = ApiState { services, recorder };

    Router::new()
        .route("/probe", get(handlers::probe))
        .route("/metrics", get(handlers::self_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
