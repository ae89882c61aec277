use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rmq_client::Deadline;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::collector::CollectorRegistry;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const SCRAPE_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";
const COLLECT_PARAM: &str = "collect[]";

pub(crate) struct AppState {
    pub(crate) registry: CollectorRegistry,
    pub(crate) handle: PrometheusHandle,
    pub(crate) metrics_path: String,
    pub(crate) scrape_timeout: Duration,
    // None when concurrent scrapes are unlimited
    pub(crate) scrape_limit: Option<Semaphore>,
}

impl AppState {
    pub(crate) fn new(
        registry: CollectorRegistry,
        handle: PrometheusHandle,
        metrics_path: String,
        scrape_timeout: Duration,
        max_requests: usize,
    ) -> Self {
        AppState {
            registry,
            handle,
            metrics_path,
            scrape_timeout,
            scrape_limit: (max_requests > 0).then(|| Semaphore::new(max_requests)),
        }
    }
}

// Endpoints
// - GET  /                 landing page linking the metrics path
// - GET  <metrics_path>    runs one scrape and renders its samples followed by the
//                          process-wide series; `collect[]` restricts the collectors run
pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(landing_page))
        .route(&metrics_path, get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn landing_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>RocketMQ Exporter</title></head>\n<body>\n<h1>RocketMQ Exporter</h1>\n<p><a href=\"{}\">Metrics</a></p>\n</body>\n</html>\n",
        state.metrics_path
    ))
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let _permit = match &state.scrape_limit {
        Some(limit) => match limit.try_acquire() {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("rejecting scrape, too many concurrent requests");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "too many concurrent scrape requests\n",
                )
                    .into_response();
            }
        },
        None => None,
    };

    let filters: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == COLLECT_PARAM)
        .map(|(_, value)| value)
        .collect();

    let selected = match state.registry.select(&filters) {
        Ok(selected) => selected,
        Err(err) => {
            debug!(error = %err, "rejecting scrape with invalid collector filter");
            return (StatusCode::BAD_REQUEST, format!("{}\n", err)).into_response();
        }
    };

    let deadline = Deadline::after(scrape_budget(&headers, state.scrape_timeout));
    let mut body = state.registry.scrape(&selected, &deadline).await;
    body.push_str(&state.handle.render());

    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

// Prometheus announces its own scrape timeout; never run past it
fn scrape_budget(headers: &HeaderMap, configured: Duration) -> Duration {
    headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| configured.min(Duration::from_secs_f64(secs)))
        .unwrap_or(configured)
}
