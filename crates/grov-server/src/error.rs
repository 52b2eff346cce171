// SPDX-License-Identifier: Apache-2.0
//! Maps `grov_core::ProxyError` onto the client-facing HTTP response as a
//! small, stable JSON envelope.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use grov_core::ProxyError;
use serde_json::json;

pub struct ApiError(pub ProxyError);

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "type": self.0.error_type(),
                "message": self.0.client_message(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn no_adapter_maps_to_404_response() {
        let resp = ApiError(ProxyError::NoAdapter("/v1/unknown".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_timeout_maps_to_504_response() {
        let resp = ApiError(ProxyError::UpstreamTimeout).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
