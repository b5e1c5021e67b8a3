//! Access Gate (spec §4.B) — service-wide authentication guarding every
//! other endpoint when an access password is configured.
//!
//! Token construction mirrors the HMAC-SHA256 challenge/response in
//! `auth.rs` (itself following Neovim issue #4443): here the "nonce" is
//! a JSON payload carrying an absolute expiry, and the "response" is an
//! HMAC over that payload using a server-resident secret, so a token is
//! `base64(payload) + "." + hex(hmac(payload))`. Verification recomputes
//! the HMAC and compares in constant time via `hmac::Mac::verify_slice`,
//! exactly as `verify_hmac` does.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenPayload {
    expires_at: u64,
}

pub struct AccessGate {
    access_password: Option<String>,
    token_secret: String,
    token_ttl: Duration,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CheckResult {
    pub required: bool,
    pub verified: bool,
}

impl AccessGate {
    pub fn new(access_password: Option<String>, token_secret: String) -> Self {
        Self {
            access_password,
            token_secret,
            token_ttl: DEFAULT_TTL,
        }
    }

    /// Reports whether authentication is configured and whether the
    /// presented cookie value is a currently-valid token.
    pub fn check(&self, cookie: Option<&str>) -> CheckResult {
        let required = self.access_password.is_some();
        if !required {
            return CheckResult {
                required: false,
                verified: true,
            };
        }
        let verified = cookie.map(|t| self.verify_token(t)).unwrap_or(false);
        CheckResult { required, verified }
    }

    /// Accepts either the raw configured password or its SHA-256 hex
    /// digest (the client may pre-hash so the plaintext password never
    /// transits if they choose not to send it). Returns a fresh token
    /// when the caller asked to be remembered.
    pub fn verify(&self, presented: &str, remember: bool) -> Option<Option<String>> {
        let password = self.access_password.as_deref()?;
        let matches = presented == password || presented == sha256_hex(password);
        if !matches {
            return None;
        }
        Some(remember.then(|| self.mint_token()))
    }

    /// When no access password is configured, every gate short-circuits
    /// to allow (spec §4.B).
    pub fn is_open(&self) -> bool {
        self.access_password.is_none()
    }

    fn mint_token(&self) -> String {
        let expires_at = now_secs() + self.token_ttl.as_secs();
        let payload = TokenPayload { expires_at };
        let payload_json = serde_json::to_vec(&payload).expect("TokenPayload always serializes");
        let payload_b64 =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &payload_json);

        let mut mac = HmacSha256::new_from_slice(self.token_secret.as_bytes())
            .expect("HMAC can take a key of any size");
        mac.update(payload_b64.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        format!("{payload_b64}.{signature}")
    }

    fn verify_token(&self, token: &str) -> bool {
        let Some((payload_b64, signature_hex)) = token.split_once('.') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };

        let mut mac = match HmacSha256::new_from_slice(self.token_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload_b64.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return false;
        }

        let Ok(payload_json) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload_b64)
        else {
            return false;
        };
        let Ok(payload) = serde_json::from_slice::<TokenPayload>(&payload_json) else {
            return false;
        };

        payload.expires_at > now_secs()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_gate_always_verified() {
        let gate = AccessGate::new(None, "secret".to_string());
        let result = gate.check(None);
        assert!(!result.required);
        assert!(result.verified);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let gate = AccessGate::new(Some("correct".to_string()), "secret".to_string());
        assert!(gate.verify("wrong", true).is_none());
    }

    #[test]
    fn correct_password_mints_token_when_remembered() {
        let gate = AccessGate::new(Some("correct".to_string()), "secret".to_string());
        let token = gate.verify("correct", true).unwrap();
        assert!(token.is_some());
    }

    #[test]
    fn prehashed_password_is_accepted() {
        let gate = AccessGate::new(Some("correct".to_string()), "secret".to_string());
        let hashed = sha256_hex("correct");
        assert!(gate.verify(&hashed, false).is_some());
    }

    #[test]
    fn verify_then_check_round_trips_to_verified() {
        let gate = AccessGate::new(Some("correct".to_string()), "secret".to_string());
        let token = gate.verify("correct", true).unwrap().unwrap();

        let result = gate.check(Some(&token));
        assert!(result.required);
        assert!(result.verified);
    }

    #[test]
    fn clearing_cookie_yields_unverified() {
        let gate = AccessGate::new(Some("correct".to_string()), "secret".to_string());
        let result = gate.check(None);
        assert!(result.required);
        assert!(!result.verified);
    }

    #[test]
    fn tampered_token_fails_verification() {
        let gate = AccessGate::new(Some("correct".to_string()), "secret".to_string());
        let token = gate.verify("correct", true).unwrap().unwrap();
        let mut tampered = token.clone();
        tampered.push('x');

        assert!(!gate.check(Some(&tampered)).verified);
    }

    #[test]
    fn token_from_different_secret_is_rejected() {
        let gate_a = AccessGate::new(Some("correct".to_string()), "secret-a".to_string());
        let gate_b = AccessGate::new(Some("correct".to_string()), "secret-b".to_string());

        let token = gate_a.verify("correct", true).unwrap().unwrap();
        assert!(!gate_b.check(Some(&token)).verified);
    }
}
