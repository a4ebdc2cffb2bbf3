use axum::{http::StatusCode, Json};

use crate::models::ServiceStatus;

/// Liveness of this service. Says nothing about the simulator.
pub fn status() -> ServiceStatus {
    ServiceStatus::running()
}

pub async fn status_handler() -> (StatusCode, Json<ServiceStatus>) {
    (StatusCode::OK, Json(status()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_constant() {
        assert_eq!(status(), status());
        assert_eq!(status(), ServiceStatus::running());
    }

    #[tokio::test]
    async fn test_status_handler_returns_ok() {
        let (code, Json(body)) = status_handler().await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.service, "simulation");
        assert_eq!(body.status, "running");
    }
}
