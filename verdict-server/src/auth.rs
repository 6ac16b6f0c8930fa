//! API-key authentication for the eval API.
//!
//! Checked against the `x-api-key` request header. When no key is
//! configured, auth is disabled (open mode, useful for local dev).

/// Shared-secret validator for the `x-api-key` header.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    api_key: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// Validate a presented key. `None` means the header was absent.
    pub fn validate(&self, presented: Option<&str>) -> bool {
        match &self.api_key {
            None => true, // open mode: no auth required
            Some(expected) => presented == Some(expected.as_str()),
        }
    }

    /// Whether the server is in open mode (no auth required).
    pub fn is_open_mode(&self) -> bool {
        self.api_key.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_open_mode_accepts_anything() {
        let auth = ApiKeyAuth::new(None);
        assert!(auth.is_open_mode());
        assert!(auth.validate(None));
        assert!(auth.validate(Some("whatever")));
    }

    #[test]
    fn test_auth_validates_matching_key() {
        let auth = ApiKeyAuth::new(Some("secret-key".into()));
        assert!(!auth.is_open_mode());
        assert!(auth.validate(Some("secret-key")));
    }

    #[test]
    fn test_auth_rejects_missing_or_wrong_key() {
        let auth = ApiKeyAuth::new(Some("secret-key".into()));
        assert!(!auth.validate(None));
        assert!(!auth.validate(Some("wrong")));
        assert!(!auth.validate(Some("")));
    }
}
