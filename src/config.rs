//! Configuration, read once at startup from the environment.
//!
//! Shape follows `config.rs` in the teacher (`ServerConfig`/`SessionConfig`
//! split), sourced from environment variables per spec §6 instead of a
//! TOML file, since the broker has no other on-disk state besides the
//! credential vault.

use std::path::PathBuf;

/// Server configuration assembled once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub access_password: Option<String>,
    pub token_secret: String,
    /// Whether the process believes it's behind TLS/production, gating the
    /// `Secure` cookie flag.
    pub secure_cookies: bool,
    pub credentials_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let access_password = std::env::var("ACCESS_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty());

        let token_secret = std::env::var("TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!(
                    "TOKEN_SECRET not set; generating a random secret for this process \
                     (all issued tokens become invalid on restart)"
                );
                generate_random_secret()
            });

        let secure_cookies = std::env::var("NODE_ENV")
            .or_else(|_| std::env::var("BROKER_ENV"))
            .map(|v| v == "production")
            .unwrap_or(false);

        let credentials_path = std::env::var("BROKER_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_credentials_path());

        Self {
            bind: std::env::var("BROKER_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("BROKER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            access_password,
            token_secret,
            secure_cookies,
            credentials_path,
        }
    }
}

fn default_credentials_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ssh-web-broker")
        .join("credentials.enc")
}

fn generate_random_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_credentials_path_has_expected_file_name() {
        let path = default_credentials_path();
        assert_eq!(path.file_name().unwrap(), "credentials.enc");
    }

    #[test]
    fn generated_secret_is_unique_and_hex() {
        let a = generate_random_secret();
        let b = generate_random_secret();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
