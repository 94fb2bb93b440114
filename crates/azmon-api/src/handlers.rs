//! HTTP handlers.

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use azmon_core::ProbeConfig;
use azmon_probe::exposition::{self, render};
use azmon_probe::{Probe, SCRAPE_TIMEOUT_HEADER, Sample};
use tracing::{Instrument, info_span, warn};

use crate::ApiState;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /probe
pub async fn probe(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let config = match ProbeConfig::from_query_pairs(pairs) {
        Ok(config) => config,
        Err(e) => {
            warn!(err = %e, "rejected probe request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let span = info_span!("probe", resource_type = %config.resource_type);
    let timeout_header = headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok());
    let probe = Probe::new(state.services.clone(), config, timeout_header);

    let mut samples: Vec<Sample> = Vec::new();
    probe.collect(&mut samples).instrument(span).await;

    (
        StatusCode::OK,
        [(CONTENT_TYPE, exposition::CONTENT_TYPE)],
        render(&samples),
    )
        .into_response()
}

/// GET /metrics
pub async fn self_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let mut body = String::new();
    body.push_str("# HELP azmon_build_info Build information of the running exporter.\n");
    body.push_str("# TYPE azmon_build_info gauge\n");
    body.push_str(&format!("azmon_build_info{{version=\"{BUILD_VERSION}\"}} 1\n"));
    body.push_str(&state.recorder.render_prometheus());

    (StatusCode::OK, [(CONTENT_TYPE, exposition::CONTENT_TYPE)], body)
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
