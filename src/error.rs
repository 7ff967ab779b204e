/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Tool call buffer exceeded {limit} bytes")]
    ToolCallOverflow { limit: usize },
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code and wire-shape selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 | 403 => ErrorCategory::Authentication,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) | GatewayError::UnsupportedModel(_) => {
                ErrorCategory::InvalidRequest
            }
            GatewayError::Auth(_) => ErrorCategory::Authentication,
            GatewayError::Config(_)
            | GatewayError::Transport(_)
            | GatewayError::ToolCallOverflow { .. }
            | GatewayError::Internal(_) => ErrorCategory::ServerError,
            GatewayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        if let GatewayError::Upstream { status, .. } = self {
            // Pass the upstream status through where it is a valid code;
            // anything unmappable degrades to 502.
            return http::StatusCode::from_u16(*status).unwrap_or(http::StatusCode::BAD_GATEWAY);
        }
        match self.category() {
            ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
            ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
            ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::ServerError | ErrorCategory::Unknown => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

/// Render an error as an OpenAI-style JSON body, returning (`status_code`, body).
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": openai_error_type(err.category()),
            "param": null,
        }
    });
    (status, body)
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use axum::response::IntoResponse as _;
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_400() {
        let err = GatewayError::InvalidRequest("bad".into());
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_model_is_a_client_error() {
        let err = GatewayError::UnsupportedModel("nope-1".into());
        assert_eq!(err.category(), ErrorCategory::InvalidRequest);
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_status_passes_through() {
        let err = GatewayError::Upstream {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.status_code(), http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.category(), ErrorCategory::RateLimit);
    }

    #[test]
    fn format_error_is_openai_shaped() {
        let err = GatewayError::Auth("missing token".into());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing token"));
    }

    #[test]
    fn overflow_is_a_server_error() {
        let err = GatewayError::ToolCallOverflow { limit: 1024 };
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
