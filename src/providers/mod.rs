pub mod qwen;
pub mod zai;

pub use qwen::QwenClient;
pub use zai::ZaiClient;

use crate::error::GatewayError;

/// Which upstream adapter serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Zai,
    Qwen,
}

impl ProviderKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Zai => "zai",
            ProviderKind::Qwen => "qwen",
        }
    }
}

/// Select the adapter whose model predicate matches.
///
/// qwen claims its two fixed models; zai claims its known models plus any
/// identifier outside the qwen-style `coder-`/`vision-` namespaces.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedModel`] when no adapter matches.
pub fn route_model(model: &str) -> Result<ProviderKind, GatewayError> {
    if qwen::supports_model(model) {
        return Ok(ProviderKind::Qwen);
    }
    if zai::supports_model(model) {
        return Ok(ProviderKind::Zai);
    }
    Err(GatewayError::UnsupportedModel(model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glm_models_route_to_zai() {
        assert_eq!(route_model("GLM-4-6-API-V1").unwrap(), ProviderKind::Zai);
        assert_eq!(route_model("GLM-4-Flash").unwrap(), ProviderKind::Zai);
    }

    #[test]
    fn qwen_models_route_to_qwen() {
        assert_eq!(route_model("coder-model").unwrap(), ProviderKind::Qwen);
        assert_eq!(route_model("vision-model").unwrap(), ProviderKind::Qwen);
    }

    #[test]
    fn unknown_models_fall_through_to_zai() {
        assert_eq!(route_model("some-new-model").unwrap(), ProviderKind::Zai);
    }

    #[test]
    fn qwen_namespace_without_match_is_unsupported() {
        assert!(matches!(
            route_model("coder-unknown"),
            Err(GatewayError::UnsupportedModel(_))
        ));
        assert!(matches!(
            route_model("vision-pro"),
            Err(GatewayError::UnsupportedModel(_))
        ));
    }
}
