use std::sync::Arc;

use axum::{routing, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use resource_cache::CacheConnector;
use resource_common::metrics;
use resource_pool::PoolConnector;

use crate::resources::Resources;

pub fn app<P, C>(resources: Arc<Resources<P, C>>, metrics: Option<PrometheusHandle>) -> Router
where
    P: PoolConnector,
    C: CacheConnector,
{
    Router::new()
        .route("/", routing::get(index))
        .route(
            "/_readiness",
            routing::get(move || std::future::ready(resources.readiness())),
        )
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .layer(axum::middleware::from_fn(metrics::track_metrics))
}

pub async fn index() -> &'static str {
    "resource service"
}
