// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error kinds and their client-facing propagation policy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed client body: {0}")]
    MalformedBody(String),
    #[error("no adapter for path {0}")]
    NoAdapter(String),
    #[error("upstream request timed out")]
    UpstreamTimeout,
    #[error("upstream returned an error")]
    UpstreamError,
}

impl ProxyError {
    /// The HTTP status the client should see.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::MalformedBody(_) => 400,
            ProxyError::NoAdapter(_) => 404,
            ProxyError::UpstreamTimeout => 504,
            ProxyError::UpstreamError => 502,
        }
    }

    /// The stable `type` string carried in the proxy-generated error body.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::MalformedBody(_) => "invalid_request_error",
            ProxyError::NoAdapter(_) => "not_found_error",
            ProxyError::UpstreamTimeout | ProxyError::UpstreamError => "proxy_error",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            ProxyError::UpstreamTimeout => "Gateway timeout".to_string(),
            ProxyError::UpstreamError => "Upstream request failed".to_string(),
            ProxyError::MalformedBody(m) => m.clone(),
            ProxyError::NoAdapter(p) => format!("no adapter for path {p}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_timeout_maps_to_504_proxy_error() {
        let e = ProxyError::UpstreamTimeout;
        assert_eq!(e.status_code(), 504);
        assert_eq!(e.error_type(), "proxy_error");
        assert_eq!(e.client_message(), "Gateway timeout");
    }

    #[test]
    fn no_adapter_maps_to_404() {
        let e = ProxyError::NoAdapter("/v1/unknown".into());
        assert_eq!(e.status_code(), 404);
    }
}
