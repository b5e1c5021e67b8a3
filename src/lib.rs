//! Browser-accessible SSH/SFTP gateway: a backend session broker that
//! terminates HTTP/WebSocket and brokers outbound SSH sessions on a
//! caller's behalf.
//!
//! Module layout mirrors the components this broker is built from: a
//! [`vault`] for encrypted-at-rest credentials, an [`access`] gate
//! guarding the whole surface, a [`registry`] of live SSH sessions, a
//! [`shell`] bridge binding WebSockets to shells, an [`sftp`] router for
//! file operations, and a [`monitor`] probe for host telemetry. [`api`]
//! and [`ws`] wire these onto axum.

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod security;
pub mod session;
pub mod sftp;
pub mod shell;
pub mod vault;
pub mod ws;

use std::sync::Arc;

use crate::access::AccessGate;
use crate::config::Config;
use crate::monitor::MonitorProbe;
use crate::registry::SessionRegistry;
use crate::security::OriginValidator;
use crate::shell::ShellBridge;
use crate::vault::Vault;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vault: Arc<Vault>,
    pub access_gate: Arc<AccessGate>,
    pub registry: Arc<SessionRegistry>,
    pub shell_bridge: Arc<ShellBridge>,
    pub monitor: Arc<MonitorProbe>,
    pub origin_validator: Arc<OriginValidator>,
}

impl AppState {
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let vault = Arc::new(Vault::open(
            config.credentials_path.clone(),
            &config.token_secret,
        )?);
        let access_gate = Arc::new(AccessGate::new(
            config.access_password.clone(),
            config.token_secret.clone(),
        ));
        let registry = SessionRegistry::new();
        let shell_bridge = ShellBridge::new(registry.clone());
        let monitor = Arc::new(MonitorProbe::new());
        let origin_validator = Arc::new(OriginValidator::default());

        Ok(Self {
            config: Arc::new(config),
            vault,
            access_gate,
            registry,
            shell_bridge,
            monitor,
            origin_validator,
        })
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
