use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::cell::ResourceState;

/// Readiness of the process, combined from the state of each managed resource.
///
/// The process is ready only when at least one resource is registered and every
/// registered resource is `Ready`.
#[derive(Default, Debug)]
pub struct ReadinessStatus {
    pub ready: bool,
    /// Current state of each resource, for display
    pub components: BTreeMap<&'static str, ResourceState>,
}

impl ReadinessStatus {
    pub fn from_states<I>(states: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, ResourceState)>,
    {
        let components: BTreeMap<_, _> = states.into_iter().collect();
        let ready = !components.is_empty()
            && components
                .values()
                .all(|state| *state == ResourceState::Ready);

        match ready {
            true => info!("readiness check ok"),
            false => warn!("readiness check failed: {:?}", components),
        }

        Self { ready, components }
    }
}

impl IntoResponse for ReadinessStatus {
    /// Computes the axum status code based on the overall readiness,
    /// and prints each component state in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.ready {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_not_ready() {
        assert!(!ReadinessStatus::from_states([]).ready);
    }

    #[test]
    fn every_component_must_be_ready() {
        let status = ReadinessStatus::from_states([
            ("postgres", ResourceState::Ready),
            ("redis", ResourceState::Initializing),
        ]);
        assert!(!status.ready);
        assert_eq!(
            status.components.get("redis"),
            Some(&ResourceState::Initializing)
        );

        let status = ReadinessStatus::from_states([
            ("postgres", ResourceState::Ready),
            ("redis", ResourceState::Ready),
        ]);
        assert!(status.ready);
    }

    #[test]
    fn into_response() {
        let nok = ReadinessStatus::default().into_response();
        assert_eq!(nok.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let ok = ReadinessStatus::from_states([("postgres", ResourceState::Ready)]).into_response();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
