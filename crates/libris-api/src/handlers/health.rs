//! Health check handlers

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub database: bool,
}

/// Readiness probe - pings the persistence backend
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.users.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            false
        }
    };

    let response = ReadinessResponse {
        ready: database,
        checks: ReadinessChecks { database },
    };

    if database {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus-compatible metrics endpoint
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();

    let mut output = String::new();

    output.push_str("# HELP libris_uptime_seconds Time since server start\n");
    output.push_str("# TYPE libris_uptime_seconds gauge\n");
    let _ = writeln!(output, "libris_uptime_seconds {uptime}\n");

    output.push_str("# HELP libris_requests_total Total number of HTTP requests\n");
    output.push_str("# TYPE libris_requests_total counter\n");
    let _ = writeln!(output, "libris_requests_total {total_requests}\n");

    output.push_str("# HELP libris_revocation_aware Whether access tokens are checked against revocation cutoffs\n");
    output.push_str("# TYPE libris_revocation_aware gauge\n");
    let revocation_aware = matches!(
        state.gate.mode(),
        libris_core::RevocationMode::RevocationAware
    );
    let _ = writeln!(output, "libris_revocation_aware {}\n", u8::from(revocation_aware));

    output.push_str("# HELP libris_build_info Build information\n");
    output.push_str("# TYPE libris_build_info gauge\n");
    let _ = writeln!(
        output,
        "libris_build_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    );

    let metrics = state.metrics.read().await;
    let mut endpoints: Vec<_> = metrics.iter().collect();
    endpoints.sort_by(|a, b| a.0.cmp(b.0));

    output.push_str("# HELP libris_http_requests_total HTTP requests by endpoint and status\n");
    output.push_str("# TYPE libris_http_requests_total counter\n");
    for (endpoint, endpoint_metrics) in &endpoints {
        let mut statuses: Vec<_> = endpoint_metrics.status_counts.iter().collect();
        statuses.sort();
        for (status, count) in statuses {
            let _ = writeln!(
                output,
                "libris_http_requests_total{{endpoint=\"{endpoint}\",status=\"{status}\"}} {count}"
            );
        }
    }
    output.push('\n');

    output.push_str("# HELP libris_http_request_duration_seconds HTTP request latency\n");
    output.push_str("# TYPE libris_http_request_duration_seconds histogram\n");
    for (endpoint, endpoint_metrics) in &endpoints {
        if endpoint_metrics.latency_count == 0 {
            continue;
        }

        let buckets = &endpoint_metrics.latency_buckets;
        let mut cumulative = 0u64;
        for (le, count) in [
            ("0.01", buckets.under_10ms),
            ("0.05", buckets.ms_10_50),
            ("0.1", buckets.ms_50_100),
            ("0.5", buckets.ms_100_500),
            ("1.0", buckets.ms_500_1000),
            ("+Inf", buckets.over_1s),
        ] {
            cumulative += count;
            let _ = writeln!(
                output,
                "libris_http_request_duration_seconds_bucket{{endpoint=\"{endpoint}\",le=\"{le}\"}} {cumulative}"
            );
        }

        let total_sum_s = (endpoint_metrics.total_latency_us as f64) / 1_000_000.0;
        let _ = writeln!(
            output,
            "libris_http_request_duration_seconds_sum{{endpoint=\"{endpoint}\"}} {total_sum_s:.6}"
        );
        let _ = writeln!(
            output,
            "libris_http_request_duration_seconds_count{{endpoint=\"{endpoint}\"}} {}",
            endpoint_metrics.latency_count
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}
