//! Request signature for the zai upstream.
//!
//! The upstream expects a double HMAC-SHA256 over a canonical parameter
//! string, the base64 of the last user message, and a 5-minute time window:
//! the window index keys the first MAC, whose hex digest keys the second.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_SECRET: &str = "key-@@@@)))()((9))-xxxx&&&%%%%%";
const WINDOW_MILLIS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct SignatureParams<'a> {
    pub request_id: &'a str,
    pub timestamp_millis: i64,
    pub user_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub signature: String,
    pub timestamp: i64,
}

/// Sign one outbound chat request.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] when a required parameter is empty.
pub fn sign_request(
    params: &SignatureParams<'_>,
    last_user_message: &str,
) -> Result<Signature, GatewayError> {
    if params.request_id.is_empty() || params.user_id.is_empty() {
        return Err(GatewayError::Internal(
            "signature requires requestId and user_id".into(),
        ));
    }

    let timestamp = params.timestamp_millis;
    let canonical = format!(
        "requestId,{},timestamp,{},user_id,{}",
        params.request_id, timestamp, params.user_id
    );
    let encoded_message = BASE64.encode(last_user_message.as_bytes());
    let payload = format!("{canonical}|{encoded_message}|{timestamp}");

    let window = timestamp / WINDOW_MILLIS;
    let secret =
        std::env::var("ZAI_SECRET_KEY").unwrap_or_else(|_| DEFAULT_SECRET.to_string());

    let window_key = hex::encode(hmac_sha256(secret.as_bytes(), window.to_string().as_bytes()));
    let digest = hmac_sha256(window_key.as_bytes(), payload.as_bytes());

    Ok(Signature {
        signature: hex::encode(digest),
        timestamp,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail here.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
