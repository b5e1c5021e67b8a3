//! Shell Bridge (spec §4.F) — binds a WebSocket connection to a
//! session's interactive shell, lazily creating it on first bind and
//! tolerating a brief disconnect/reconnect without losing output.
//!
//! The per-session state lives behind one `tokio::sync::Mutex`, which
//! does double duty: it buys the "at most one creation attempt in
//! flight" dedup for free (concurrent binders simply queue on the lock
//! and find the shell already created when their turn comes), the same
//! trick the session actor in [`crate::session`] uses for SFTP
//! serialization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::registry::SessionRegistry;
use crate::session::{ShellEvent, SessionId, SshSession};

const CREATE_MAX_ATTEMPTS: u32 = 5;
const CREATE_RETRY_BASE: Duration = Duration::from_millis(500);
const REBIND_GRACE: Duration = Duration::from_secs(5);

/// A frame handed to whichever task is forwarding bytes to the bound
/// WebSocket.
#[derive(Debug, Clone)]
pub enum ShellFrame {
    Output(Vec<u8>),
    Closed,
}

struct BridgeInner {
    shell_ready: bool,
    bound_tx: Option<mpsc::UnboundedSender<ShellFrame>>,
    /// Output produced while nothing was bound; flushed to the next
    /// binder and then cleared.
    buffer: Vec<u8>,
    grace_handle: Option<tokio::task::JoinHandle<()>>,
}

impl BridgeInner {
    fn new() -> Self {
        Self {
            shell_ready: false,
            bound_tx: None,
            buffer: Vec::new(),
            grace_handle: None,
        }
    }
}

pub struct ShellBridge {
    registry: Arc<SessionRegistry>,
    states: Mutex<HashMap<SessionId, Arc<Mutex<BridgeInner>>>>,
}

impl ShellBridge {
    pub fn new(registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            states: Mutex::new(HashMap::new()),
        })
    }

    async fn state_for(&self, session_id: &SessionId) -> Arc<Mutex<BridgeInner>> {
        let mut states = self.states.lock().await;
        states
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(BridgeInner::new())))
            .clone()
    }

    /// Binds `client_tx` to the session's shell, creating the shell if
    /// this is the first bind, and flushing any buffered early output.
    /// Cancels a pending grace-period teardown if the caller reconnected
    /// in time.
    pub async fn bind(
        self: &Arc<Self>,
        session: &Arc<SshSession>,
        cols: u16,
        rows: u16,
        client_tx: mpsc::UnboundedSender<ShellFrame>,
    ) -> Result<(), String> {
        let state = self.state_for(&session.id).await;
        let mut inner = state.lock().await;

        if let Some(handle) = inner.grace_handle.take() {
            handle.abort();
        }

        if !inner.shell_ready {
            self.create_with_retry(session, cols, rows, &state, &mut inner)
                .await?;
        }

        if !inner.buffer.is_empty() {
            let buffered = std::mem::take(&mut inner.buffer);
            let _ = client_tx.send(ShellFrame::Output(buffered));
        }
        inner.bound_tx = Some(client_tx);
        Ok(())
    }

    /// Detaches the currently bound client. If nobody rebinds within the
    /// grace window the underlying session is torn down.
    pub async fn unbind(self: &Arc<Self>, session_id: &SessionId) {
        let state = self.state_for(session_id).await;
        let mut inner = state.lock().await;
        inner.bound_tx = None;

        let registry = self.registry.clone();
        let bridge_states = self.states.clone();
        let id = session_id.clone();
        let state_for_task = state.clone();
        inner.grace_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(REBIND_GRACE).await;
            let rebound = state_for_task.lock().await.bound_tx.is_some();
            if !rebound {
                registry.disconnect(&id).await;
                bridge_states.lock().await.remove(&id);
            }
        }));
    }

    pub async fn send_input(&self, session: &SshSession, data: Vec<u8>) -> bool {
        session.send_input(data).await
    }

    pub async fn resize(&self, session: &SshSession, cols: u16, rows: u16) {
        session.resize(cols, rows).await;
    }

    async fn create_with_retry(
        self: &Arc<Self>,
        session: &Arc<SshSession>,
        cols: u16,
        rows: u16,
        state: &Arc<Mutex<BridgeInner>>,
        inner: &mut BridgeInner,
    ) -> Result<(), String> {
        let mut last_err = String::new();
        for attempt in 1..=CREATE_MAX_ATTEMPTS {
            match session.create_shell(cols, rows).await {
                Ok(()) => {
                    inner.shell_ready = true;
                    self.spawn_forwarder(session, state.clone());
                    return Ok(());
                }
                Err(e) => {
                    last_err = e;
                    if attempt < CREATE_MAX_ATTEMPTS {
                        tokio::time::sleep(CREATE_RETRY_BASE * attempt).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// Spawned exactly once per session, for its whole lifetime: drains
    /// the session's shell-output channel and routes bytes to whichever
    /// client is currently bound, buffering when nobody is.
    fn spawn_forwarder(self: &Arc<Self>, session: &Arc<SshSession>, state: Arc<Mutex<BridgeInner>>) {
        let Some(mut output_rx) = session.take_shell_output() else {
            return;
        };
        tokio::spawn(async move {
            while let Some(event) = output_rx.recv().await {
                let mut inner = state.lock().await;
                match event {
                    ShellEvent::Output(bytes) => {
                        if let Some(tx) = inner.bound_tx.as_ref() {
                            if tx.send(ShellFrame::Output(bytes)).is_err() {
                                inner.bound_tx = None;
                            }
                        } else {
                            inner.buffer.extend_from_slice(&bytes);
                        }
                    }
                    ShellEvent::Closed => {
                        if let Some(tx) = inner.bound_tx.take() {
                            let _ = tx.send(ShellFrame::Closed);
                        }
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AuthConfig, ConnectRequest};

    #[tokio::test]
    async fn bind_against_unreachable_session_returns_error() {
        let registry = SessionRegistry::new();
        let session = registry
            .connect(ConnectRequest {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "nobody".to_string(),
                auth: AuthConfig::Password("x".to_string()),
            })
            .await;
        let bridge = ShellBridge::new(registry);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = bridge.bind(&session, 80, 24, tx).await;
        assert!(result.is_err());
    }
}
