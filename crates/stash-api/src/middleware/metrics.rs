//! Metrics tracking middleware
//!
//! Tracks request latency, counts, and status codes for Prometheus metrics

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

const LABELS: &[&str] = &["method", "endpoint", "status"];

/// Prometheus collectors for HTTP traffic
pub struct HttpMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
}

impl HttpMetrics {
    /// Create collectors in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("stash".to_string()), None)?;

        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by endpoint and status"),
            LABELS,
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5]),
            LABELS,
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
        })
    }

    /// Record one finished request
    pub fn observe(&self, method: &str, endpoint: &str, status: u16, seconds: f64) {
        let status = status.to_string();
        let labels = [method, endpoint, status.as_str()];
        self.requests_total.with_label_values(&labels).inc();
        self.request_duration
            .with_label_values(&labels)
            .observe(seconds);
    }

    /// Render all collectors in the text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Metrics tracking middleware
///
/// Records:
/// - Request count per route, method and status
/// - Request latency distribution
///
/// Requests are labelled by the matched route template, so the number of
/// series is bounded by the route table.
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = method_label(request.method());
    let endpoint = endpoint_label(request.extensions().get::<MatchedPath>());

    let response = next.run(request).await;

    state.metrics.observe(
        method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Label for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Route template for the endpoint label, e.g. `/items/:id`
fn endpoint_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string())
}

/// Standard methods by name; extension methods share one label
fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::TRACE => "TRACE",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_label_without_route() {
        assert_eq!(endpoint_label(None), UNMATCHED_ENDPOINT);
    }

    #[test]
    fn test_method_label() {
        assert_eq!(method_label(&Method::GET), "GET");
        assert_eq!(method_label(&Method::DELETE), "DELETE");

        let custom = Method::from_bytes(b"PURGE").unwrap();
        assert_eq!(method_label(&custom), "OTHER");
    }

    #[test]
    fn test_observe_and_render() {
        let metrics = HttpMetrics::new().unwrap();
        metrics.observe("GET", "/items/:id", 200, 0.002);
        metrics.observe("GET", "/items/:id", 200, 0.004);

        let text = metrics.render().unwrap();
        assert!(text.contains("stash_http_requests_total"));
        assert!(text.contains(r#"endpoint="/items/:id""#));
        assert!(text.contains("stash_http_request_duration_seconds_bucket"));
    }
}
