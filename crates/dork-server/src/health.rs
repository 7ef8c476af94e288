//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Number of live sessions.
    pub active_sessions: usize,
    /// Number of pulse runs currently executing.
    pub active_runs: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(start_time: Instant, active_sessions: usize, active_runs: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions,
        active_runs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, 0);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn counters_are_tracked() {
        let resp = health_check(Instant::now(), 3, 1);
        assert_eq!(resp.active_sessions, 3);
        assert_eq!(resp.active_runs, 1);
    }

    #[test]
    fn serialization_shape() {
        let resp = health_check(Instant::now(), 1, 0);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_number());
    }
}
