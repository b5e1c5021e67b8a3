//! Origin validation for the WebSocket surface (spec §4.H).
//!
//! Grounded in the teacher's `OriginValidator`: an explicit allowlist,
//! `*.domain.com` wildcard entries, and a localhost bypass for local
//! development. Differs only in logging through `tracing` instead of
//! `eprintln!`, matching the rest of this crate.

pub struct OriginValidator {
    allowed_origins: Vec<String>,
    allow_localhost: bool,
}

impl OriginValidator {
    pub fn new(allowed_origins: Vec<String>, allow_localhost: bool) -> Self {
        Self {
            allowed_origins,
            allow_localhost,
        }
    }

    pub fn check(&self, origin: &str) -> bool {
        if self.allow_localhost
            && (origin.contains("localhost")
                || origin.contains("127.0.0.1")
                || origin.contains("0.0.0.0"))
        {
            return true;
        }

        if self.allowed_origins.iter().any(|a| a == origin) {
            return true;
        }

        for allowed in &self.allowed_origins {
            if let Some(domain) = allowed.strip_prefix("*.") {
                if origin.ends_with(domain) {
                    return true;
                }
            }
        }

        tracing::warn!(origin, "rejected WebSocket origin");
        false
    }
}

impl Default for OriginValidator {
    fn default() -> Self {
        Self::new(Vec::new(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_always_allowed() {
        let validator = OriginValidator::default();
        assert!(validator.check("http://localhost:8080"));
        assert!(validator.check("http://127.0.0.1:3000"));
    }

    #[test]
    fn explicit_origin_allowed() {
        let validator = OriginValidator::new(vec!["https://app.example.com".to_string()], false);
        assert!(validator.check("https://app.example.com"));
        assert!(!validator.check("https://evil.example.com"));
    }

    #[test]
    fn wildcard_domain_allowed() {
        let validator = OriginValidator::new(vec!["*.example.com".to_string()], false);
        assert!(validator.check("https://app.example.com"));
        assert!(validator.check("https://admin.example.com"));
        assert!(!validator.check("https://example.org"));
    }

    #[test]
    fn unknown_origin_rejected_when_localhost_disabled() {
        let validator = OriginValidator::new(Vec::new(), false);
        assert!(!validator.check("http://localhost:8080"));
    }
}
