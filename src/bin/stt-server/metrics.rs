use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts as PromOpts,
    Registry, TextEncoder,
};

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    /// Wall time a request spent blocked in [`crate::pool::DecoderStatePool::acquire`] (C6).
    pool_wait_seconds: Histogram,
    /// Seconds of audio (post-resample, at 16 kHz) processed per request (C7).
    audio_seconds_processed: Histogram,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn build_metrics() -> Result<Metrics> {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        PromOpts::new(
            "stt_engine_http_requests_total",
            "Total HTTP requests served by stt-server.",
        ),
        &["status"],
    )
    .context("invalid definition for stt_engine_http_requests_total")?;

    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "stt_engine_http_request_duration_seconds",
            "HTTP request latency in seconds.",
        ),
        &["status"],
    )
    .context("invalid definition for stt_engine_http_request_duration_seconds")?;

    let http_in_flight_requests = IntGauge::new(
        "stt_engine_http_in_flight_requests",
        "Current number of in-flight HTTP requests.",
    )
    .context("invalid definition for stt_engine_http_in_flight_requests")?;

    let pool_wait_seconds = Histogram::with_opts(HistogramOpts::new(
        "stt_engine_pool_wait_seconds",
        "Time spent waiting to acquire a decoder state from the pool (C6).",
    ))
    .context("invalid definition for stt_engine_pool_wait_seconds")?;

    let audio_seconds_processed = Histogram::with_opts(HistogramOpts::new(
        "stt_engine_audio_seconds_processed",
        "Seconds of 16kHz audio processed per transcription request.",
    ))
    .context("invalid definition for stt_engine_audio_seconds_processed")?;

    registry
        .register(Box::new(http_requests_total.clone()))
        .context("failed to register stt_engine_http_requests_total")?;
    registry
        .register(Box::new(http_request_duration_seconds.clone()))
        .context("failed to register stt_engine_http_request_duration_seconds")?;
    registry
        .register(Box::new(http_in_flight_requests.clone()))
        .context("failed to register stt_engine_http_in_flight_requests")?;
    registry
        .register(Box::new(pool_wait_seconds.clone()))
        .context("failed to register stt_engine_pool_wait_seconds")?;
    registry
        .register(Box::new(audio_seconds_processed.clone()))
        .context("failed to register stt_engine_audio_seconds_processed")?;

    Ok(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        http_in_flight_requests,
        pool_wait_seconds,
        audio_seconds_processed,
    })
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

pub fn init() -> Result<()> {
    if metrics().is_some() {
        return Ok(());
    }

    let built = build_metrics()?;
    let _ = METRICS.set(built);
    Ok(())
}

/// Record how long a request waited to acquire a decoder state (C6). No-op if metrics are
/// disabled or not yet initialized.
pub fn observe_pool_wait(seconds: f64) {
    if let Some(metrics) = metrics() {
        metrics.pool_wait_seconds.observe(seconds);
    }
}

/// [`stt_engine::MetricsSink`] implementation feeding the pool-wait histogram above. Handed to
/// `Engine::new_with_metrics` so the library doesn't need to know `prometheus` exists.
pub struct PoolWaitSink;

impl stt_engine::MetricsSink for PoolWaitSink {
    fn observe_pool_wait(&self, seconds: f64) {
        observe_pool_wait(seconds);
    }
}

/// Record the duration, in seconds, of audio processed by one request (C7).
pub fn observe_audio_seconds(seconds: f64) {
    if let Some(metrics) = metrics() {
        metrics.audio_seconds_processed.observe(seconds);
    }
}

pub async fn prometheus_metrics() -> Response {
    if metrics().is_none()
        && let Err(err) = init()
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to initialize metrics: {err:#}"),
        )
            .into_response();
    }

    let Some(metrics) = metrics() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "metrics not initialized").into_response();
    };

    let families = metrics.registry.gather();
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&families, &mut buf).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )],
        buf,
    )
        .into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or_else(|| req.uri().path())
        .to_owned();

    if route == "/metrics" || route == "/health" {
        return next.run(req).await;
    }

    let Some(metrics) = metrics() else {
        return next.run(req).await;
    };

    let start = Instant::now();

    metrics.http_in_flight_requests.inc();
    let response = next.run(req).await;
    metrics.http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    metrics
        .http_requests_total
        .with_label_values(&[&status])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[&status])
        .observe(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_registers_metrics() {
        init().unwrap();
        init().unwrap();

        metrics()
            .unwrap()
            .http_requests_total
            .with_label_values(&["200"])
            .inc();
        metrics()
            .unwrap()
            .http_request_duration_seconds
            .with_label_values(&["200"])
            .observe(0.001);
        metrics().unwrap().http_in_flight_requests.inc();
        observe_pool_wait(0.01);
        observe_audio_seconds(2.5);

        let families = metrics().unwrap().registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.name()).collect();
        assert!(names.contains(&"stt_engine_http_requests_total"));
        assert!(names.contains(&"stt_engine_http_request_duration_seconds"));
        assert!(names.contains(&"stt_engine_http_in_flight_requests"));
        assert!(names.contains(&"stt_engine_pool_wait_seconds"));
        assert!(names.contains(&"stt_engine_audio_seconds_processed"));
    }

    #[tokio::test]
    async fn prometheus_metrics_returns_text_format() -> anyhow::Result<()> {
        init().unwrap();
        metrics()
            .unwrap()
            .http_requests_total
            .with_label_values(&["200"])
            .inc();
        metrics()
            .unwrap()
            .http_request_duration_seconds
            .with_label_values(&["200"])
            .observe(0.001);

        let resp = prometheus_metrics().await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::CONTENT_TYPE)
                .expect("content-type header")
                .to_str()?,
            "text/plain; version=0.0.4; charset=utf-8"
        );

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        let text = std::str::from_utf8(&bytes)?;
        assert!(text.contains("stt_engine_http_requests_total"));
        Ok(())
    }
}
