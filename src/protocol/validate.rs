use crate::error::GatewayError;

use super::ChatRequest;

const ALLOWED_ROLES: [&str; 4] = ["system", "user", "assistant", "tool"];

/// Validate a parsed chat request before any upstream connection is opened.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] naming the offending field.
pub fn validate_request(request: &ChatRequest) -> Result<(), GatewayError> {
    if request.messages.is_empty() {
        return Err(invalid("field 'messages' must have at least 1 items"));
    }

    for (index, message) in request.messages.iter().enumerate() {
        if !ALLOWED_ROLES.contains(&message.role.as_str()) {
            return Err(invalid(&format!(
                "field 'messages[{index}].role' must be one of: system user assistant tool"
            )));
        }
    }

    if let Some(temperature) = request.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid("field 'temperature' must be >= 0 and <= 2"));
        }
    }

    if let Some(top_p) = request.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(invalid("field 'top_p' must be >= 0 and <= 1"));
        }
    }

    if let Some(max_tokens) = request.max_tokens {
        if max_tokens == 0 {
            return Err(invalid("field 'max_tokens' must be > 0"));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> GatewayError {
    GatewayError::InvalidRequest(format!("validation failed: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> ChatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accepts_minimal_request() {
        let req = request(r#"{"model":"m","messages":[{"role":"user","content":"hi"}]}"#);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn rejects_empty_messages() {
        let req = request(r#"{"model":"m","messages":[]}"#);
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("messages"));
    }

    #[test]
    fn rejects_unknown_role() {
        let req = request(r#"{"model":"m","messages":[{"role":"robot","content":"hi"}]}"#);
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let req = request(
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}],"temperature":2.5}"#,
        );
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let req = request(
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}],"max_tokens":0}"#,
        );
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn accepts_boundary_sampling_values() {
        let req = request(
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}],
                "temperature":0.0,"top_p":1.0,"max_tokens":1}"#,
        );
        assert!(validate_request(&req).is_ok());
    }
}
