//! SSH Session (spec §4.D) — one outbound SSH connection, owning an
//! optional shell channel and optional SFTP subsystem.
//!
//! Grounded in the single-thread-owns-the-channel pattern from the SSH
//! session managers in the retrieval pack (non-blocking `ssh2` session,
//! a command channel draining writes/resizes, periodic keepalive): one
//! dedicated OS thread per session owns the `ssh2::Session` for its
//! entire lifetime and executes every shell/SFTP operation serially,
//! which is what gives us both the single-shell invariant (§4.D) and
//! SFTP serialization (§4.E) for free — concurrent callers just queue
//! commands onto the same thread.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssh2::Session as Ssh2Session;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub type SessionId = String;

pub fn generate_session_id() -> SessionId {
    Uuid::new_v4().to_string()
}

/// Authentication material, consumed by the connect handshake and never
/// retained afterwards (spec §3: "secrets never retained past the
/// successful handshake").
#[derive(Clone)]
pub enum AuthConfig {
    Password(String),
    Key {
        private_key: String,
        passphrase: Option<String>,
    },
}

impl AuthConfig {
    pub fn kind(&self) -> AuthType {
        match self {
            Self::Password(_) => AuthType::Password,
            Self::Key { .. } => AuthType::Key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Password,
    Key,
}

pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error(_) => "error",
        }
    }
}

/// Registry-visible metadata for a session. Shared between the registry
/// and the session's background actor so the actor can flip status on
/// keepalive failure without round-tripping through the registry.
pub struct SessionMeta {
    pub id: SessionId,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    pub status: SessionStatus,
    pub created_at: Instant,
    pub last_activity_at: Instant,
}

impl SessionMeta {
    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }
}

pub const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(10);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
pub const KEEPALIVE_MAX_MISSES: u32 = 3;
pub const IDLE_EVICTION_AGE: Duration = Duration::from_secs(30 * 60);

/// A directory/file entry as reported by SFTP (spec §4.E).
#[derive(Debug, Clone, Serialize)]
pub struct SftpEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time in milliseconds since epoch.
    #[serde(rename = "modifiedTime")]
    pub mtime: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Distinct SFTP failure kinds so the HTTP surface can map them to
/// different status codes per spec §4.E / §7.
#[derive(Debug, Clone)]
pub enum SftpFailure {
    NotInitialized(String),
    Io(String),
}

pub enum SftpOp {
    List(String),
    Read(String),
    Write(String, Vec<u8>),
    CreateFile(String),
    CreateDirectory(String),
    Stat(String),
    Exists(String),
    Rename(String, String),
    DeleteFile(String),
    DeleteDirectory(String),
}

pub enum SftpOpResult {
    Entries(Vec<SftpEntry>),
    Bytes(Vec<u8>),
    Entry(SftpEntry),
    Exists(bool),
    Unit,
}

pub(crate) enum ActorCommand {
    CreateShell {
        cols: u16,
        rows: u16,
        reply: oneshot::Sender<Result<(), String>>,
    },
    ShellInput {
        data: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    ShellResize {
        cols: u16,
        rows: u16,
        reply: oneshot::Sender<()>,
    },
    Sftp {
        op: SftpOp,
        reply: oneshot::Sender<Result<SftpOpResult, SftpFailure>>,
    },
    /// Runs a one-off command over its own channel (spec §4.G: the
    /// Monitoring Probe issues short command batches over SSH rather
    /// than against the interactive shell).
    Exec {
        command: String,
        reply: oneshot::Sender<Result<String, String>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Events pushed from the session actor to whoever subscribed via
/// [`SshSession::take_shell_output`].
pub enum ShellEvent {
    Output(Vec<u8>),
    Closed,
}

/// A live outbound SSH connection. Cheap to clone (an `Arc` internally);
/// all mutable state lives on the dedicated actor thread or behind the
/// shared [`SessionMeta`].
pub struct SshSession {
    pub id: SessionId,
    pub meta: Arc<StdMutex<SessionMeta>>,
    cmd_tx: mpsc::UnboundedSender<ActorCommand>,
    shell_output_rx: StdMutex<Option<mpsc::UnboundedReceiver<ShellEvent>>>,
}

impl SshSession {
    /// Dial out, authenticate, and start the background actor. Returns
    /// once the handshake has either succeeded or failed/timed out (10s
    /// deadline per spec §4.C); the actor keeps running afterwards.
    pub async fn connect(id: SessionId, req: ConnectRequest) -> Self {
        let meta = Arc::new(StdMutex::new(SessionMeta {
            id: id.clone(),
            host: req.host.clone(),
            port: req.port,
            username: req.username.clone(),
            auth_type: req.auth.kind(),
            status: SessionStatus::Connecting,
            created_at: Instant::now(),
            last_activity_at: Instant::now(),
        }));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (connect_tx, connect_rx) = oneshot::channel();

        let actor_meta = meta.clone();
        std::thread::spawn(move || {
            run_actor(req, cmd_rx, output_tx, connect_tx, actor_meta);
        });

        match tokio::time::timeout(HANDSHAKE_DEADLINE, connect_rx).await {
            Ok(Ok(Ok(()))) => {
                meta.lock().unwrap().status = SessionStatus::Connected;
            }
            Ok(Ok(Err(e))) => {
                meta.lock().unwrap().status = SessionStatus::Error(e);
            }
            Ok(Err(_)) | Err(_) => {
                meta.lock().unwrap().status =
                    SessionStatus::Error("connect timed out".to_string());
            }
        }

        Self {
            id,
            meta,
            cmd_tx,
            shell_output_rx: StdMutex::new(Some(output_rx)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.meta.lock().unwrap().status.clone()
    }

    pub fn touch(&self) {
        self.meta.lock().unwrap().touch();
    }

    pub fn last_activity_age(&self) -> Duration {
        self.meta.lock().unwrap().last_activity_at.elapsed()
    }

    /// Takes the shell-output receiver; can only be called once (the
    /// Shell Bridge owns it for the session's lifetime).
    pub fn take_shell_output(&self) -> Option<mpsc::UnboundedReceiver<ShellEvent>> {
        self.shell_output_rx.lock().unwrap().take()
    }

    pub async fn create_shell(&self, cols: u16, rows: u16) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ActorCommand::CreateShell { cols, rows, reply })
            .is_err()
        {
            return Err("session actor is gone".to_string());
        }
        rx.await.unwrap_or_else(|_| Err("session actor is gone".to_string()))
    }

    /// Fails softly (`false`) rather than propagating an error, per
    /// spec §4.D.
    pub async fn send_input(&self, data: Vec<u8>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ActorCommand::ShellInput { data, reply })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// No-op when no shell exists, per spec §4.D.
    pub async fn resize(&self, cols: u16, rows: u16) {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ActorCommand::ShellResize { cols, rows, reply })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub async fn sftp(&self, op: SftpOp) -> Result<SftpOpResult, SftpFailure> {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(ActorCommand::Sftp { op, reply }).is_err() {
            return Err(SftpFailure::Io("session actor is gone".to_string()));
        }
        rx.await
            .unwrap_or_else(|_| Err(SftpFailure::Io("session actor is gone".to_string())))
    }

    /// Runs `command` over a fresh SSH channel and returns its combined
    /// stdout, for the Monitoring Probe (spec §4.G). Never panics; a
    /// failing or missing remote command simply yields `Err`, which the
    /// probe treats as "this data source produced nothing".
    pub async fn exec(&self, command: impl Into<String>) -> Result<String, String> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ActorCommand::Exec {
                command: command.into(),
                reply,
            })
            .is_err()
        {
            return Err("session actor is gone".to_string());
        }
        rx.await.unwrap_or_else(|_| Err("session actor is gone".to_string()))
    }

    /// Closes shell (if any), SFTP (if any), then the transport, in that
    /// order, swallowing errors from each step (spec §4.D).
    pub async fn disconnect(&self) {
        self.meta.lock().unwrap().status = SessionStatus::Disconnected;
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(ActorCommand::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

fn run_actor(
    req: ConnectRequest,
    mut cmd_rx: mpsc::UnboundedReceiver<ActorCommand>,
    output_tx: mpsc::UnboundedSender<ShellEvent>,
    connect_reply: oneshot::Sender<Result<(), String>>,
    meta: Arc<StdMutex<SessionMeta>>,
) {
    let mut session = match connect_blocking(&req) {
        Ok(s) => {
            // If nobody is listening anymore, the caller's 10s deadline
            // already elapsed and marked this session `error`. Tear down
            // immediately rather than leaving a live actor reachable
            // through a registry entry that looks dead from the outside.
            if connect_reply.send(Ok(())).is_err() {
                let _ = s.disconnect(None, "connect deadline exceeded", None);
                return;
            }
            s
        }
        Err(e) => {
            let _ = connect_reply.send(Err(e.to_string()));
            return;
        }
    };

    session.set_blocking(false);
    let mut shell: Option<ssh2::Channel> = None;
    let mut sftp: Option<ssh2::Sftp> = None;
    let mut last_keepalive = Instant::now();
    let mut missed_keepalives: u32 = 0;
    let mut read_buf = [0u8; 16 * 1024];

    'outer: loop {
        // Drain a bounded batch of commands so a burst of input doesn't
        // starve shell-output forwarding.
        for _ in 0..64 {
            match cmd_rx.try_recv() {
                Ok(ActorCommand::CreateShell { cols, rows, reply }) => {
                    if shell.is_some() {
                        let _ = reply.send(Ok(()));
                    } else {
                        session.set_blocking(true);
                        let result = open_shell(&session, cols, rows);
                        session.set_blocking(false);
                        match result {
                            Ok(channel) => {
                                shell = Some(channel);
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e.to_string()));
                            }
                        }
                    }
                }
                Ok(ActorCommand::ShellInput { data, reply }) => {
                    let ok = if let Some(ch) = shell.as_mut() {
                        session.set_blocking(true);
                        let r = ch.write_all(&data).and_then(|()| ch.flush()).is_ok();
                        session.set_blocking(false);
                        r
                    } else {
                        false
                    };
                    let _ = reply.send(ok);
                }
                Ok(ActorCommand::ShellResize { cols, rows, reply }) => {
                    if let Some(ch) = shell.as_mut() {
                        session.set_blocking(true);
                        let _ = ch.request_pty_size(u32::from(cols), u32::from(rows), None, None);
                        session.set_blocking(false);
                    }
                    let _ = reply.send(());
                }
                Ok(ActorCommand::Sftp { op, reply }) => {
                    session.set_blocking(true);
                    let result = run_sftp_op(&session, &mut sftp, op);
                    session.set_blocking(false);
                    let _ = reply.send(result);
                }
                Ok(ActorCommand::Exec { command, reply }) => {
                    session.set_blocking(true);
                    let result = run_exec(&session, &command);
                    session.set_blocking(false);
                    let _ = reply.send(result);
                }
                Ok(ActorCommand::Disconnect { reply }) => {
                    if let Some(mut ch) = shell.take() {
                        session.set_blocking(true);
                        let _ = ch.close();
                        session.set_blocking(false);
                    }
                    drop(sftp.take());
                    let _ = session.disconnect(None, "bye", None);
                    let _ = reply.send(());
                    let _ = output_tx.send(ShellEvent::Closed);
                    break 'outer;
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => break 'outer,
            }
        }

        // Pump shell output.
        if let Some(ch) = shell.as_mut() {
            match ch.read(&mut read_buf) {
                Ok(0) => {
                    if ch.eof() {
                        shell = None;
                        let _ = output_tx.send(ShellEvent::Closed);
                    }
                }
                Ok(n) => {
                    let _ = output_tx.send(ShellEvent::Output(read_buf[..n].to_vec()));
                }
                Err(e) if would_block(&e) => {}
                Err(_) => {
                    shell = None;
                    let _ = output_tx.send(ShellEvent::Closed);
                }
            }
        }

        // Keepalive, per spec §4.C / §5: probe every 10s, drop after 3
        // consecutive misses.
        if last_keepalive.elapsed() >= KEEPALIVE_INTERVAL {
            session.set_blocking(true);
            match session.keepalive_send() {
                Ok(_) => missed_keepalives = 0,
                Err(_) => missed_keepalives += 1,
            }
            session.set_blocking(false);
            last_keepalive = Instant::now();

            if missed_keepalives >= KEEPALIVE_MAX_MISSES {
                meta.lock().unwrap().status =
                    SessionStatus::Error("keepalive timeout".to_string());
                let _ = output_tx.send(ShellEvent::Closed);
                break 'outer;
            }
        }

        std::thread::sleep(Duration::from_millis(15));
    }
}

fn would_block(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

fn connect_blocking(req: &ConnectRequest) -> Result<Ssh2Session> {
    let addr = format!("{}:{}", req.host, req.port);
    // `TcpStream::connect` has no deadline of its own; a firewalled host
    // that silently drops packets would block this thread indefinitely
    // rather than respecting the 10s handshake deadline. Resolve first,
    // then connect with an explicit bound.
    let socket_addr = addr
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {addr}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no addresses resolved for {addr}"))?;
    let tcp = TcpStream::connect_timeout(&socket_addr, HANDSHAKE_DEADLINE)
        .with_context(|| format!("TCP connect to {addr} failed"))?;
    tcp.set_nodelay(true).ok();

    let mut session = Ssh2Session::new().context("failed to create SSH session")?;
    session.set_tcp_stream(tcp);
    session.set_timeout(
        u32::try_from(HANDSHAKE_DEADLINE.as_millis()).unwrap_or(u32::MAX),
    );
    session.handshake().context("SSH handshake failed")?;

    match &req.auth {
        AuthConfig::Password(password) => {
            session
                .userauth_password(&req.username, password)
                .context("password authentication failed")?;
        }
        AuthConfig::Key {
            private_key,
            passphrase,
        } => {
            session
                .userauth_pubkey_memory(&req.username, None, private_key, passphrase.as_deref())
                .context("key authentication failed")?;
        }
    }

    if !session.authenticated() {
        anyhow::bail!("authentication failed");
    }

    session.set_keepalive(true, u16::try_from(KEEPALIVE_INTERVAL.as_secs()).unwrap_or(10));
    Ok(session)
}

fn open_shell(session: &Ssh2Session, cols: u16, rows: u16) -> Result<ssh2::Channel> {
    let mut channel = session.channel_session().context("failed to open channel")?;
    channel
        .request_pty(
            "xterm-256color",
            None,
            Some((u32::from(cols), u32::from(rows), 0, 0)),
        )
        .context("failed to request PTY")?;
    channel.shell().context("failed to start shell")?;
    Ok(channel)
}

/// Runs `command` to completion over its own exec channel (distinct from
/// the interactive shell channel) and returns its stdout. Treated as
/// failed if the channel can't be opened, exec rejected, or the command
/// exits non-zero having produced nothing on stdout — tolerant of
/// commands that are merely missing or exit nonzero while still writing
/// useful output (e.g. `grep` with no matches).
fn run_exec(session: &Ssh2Session, command: &str) -> Result<String, String> {
    let mut channel = session
        .channel_session()
        .map_err(|e| format!("failed to open exec channel: {e}"))?;
    channel
        .exec(command)
        .map_err(|e| format!("exec rejected: {e}"))?;

    let mut output = String::new();
    let _ = channel.read_to_string(&mut output);
    let _ = channel.wait_close();

    let exit_status = channel.exit_status().unwrap_or(-1);
    if exit_status != 0 && output.trim().is_empty() {
        return Err(format!("command exited with status {exit_status}"));
    }
    Ok(output)
}

fn run_sftp_op(
    session: &Ssh2Session,
    sftp: &mut Option<ssh2::Sftp>,
    op: SftpOp,
) -> Result<SftpOpResult, SftpFailure> {
    if sftp.is_none() {
        match session.sftp() {
            Ok(s) => *sftp = Some(s),
            Err(e) => return Err(SftpFailure::NotInitialized(e.to_string())),
        }
    }
    let sftp = sftp.as_ref().expect("just initialized above");

    let io_err = |e: ssh2::Error| SftpFailure::Io(e.to_string());

    match op {
        SftpOp::List(path) => {
            let entries = sftp.readdir(std::path::Path::new(&path)).map_err(io_err)?;
            let mut out = Vec::with_capacity(entries.len());
            for (entry_path, stat) in entries {
                let name = entry_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                out.push(to_sftp_entry(&entry_path.to_string_lossy(), &name, &stat));
            }
            Ok(SftpOpResult::Entries(out))
        }
        SftpOp::Read(path) => {
            let mut file = sftp.open(std::path::Path::new(&path)).map_err(io_err)?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| SftpFailure::Io(e.to_string()))?;
            Ok(SftpOpResult::Bytes(buf))
        }
        SftpOp::Write(path, data) => {
            let mut file = sftp
                .open_mode(
                    std::path::Path::new(&path),
                    ssh2::OpenFlags::WRITE | ssh2::OpenFlags::CREATE | ssh2::OpenFlags::TRUNCATE,
                    0o644,
                    ssh2::OpenType::File,
                )
                .map_err(io_err)?;
            file.write_all(&data)
                .map_err(|e| SftpFailure::Io(e.to_string()))?;
            Ok(SftpOpResult::Unit)
        }
        SftpOp::CreateFile(path) => {
            sftp.open_mode(
                std::path::Path::new(&path),
                ssh2::OpenFlags::WRITE | ssh2::OpenFlags::CREATE,
                0o644,
                ssh2::OpenType::File,
            )
            .map_err(io_err)?;
            Ok(SftpOpResult::Unit)
        }
        SftpOp::CreateDirectory(path) => {
            sftp.mkdir(std::path::Path::new(&path), 0o755)
                .map_err(io_err)?;
            Ok(SftpOpResult::Unit)
        }
        SftpOp::Stat(path) => {
            let stat = sftp.stat(std::path::Path::new(&path)).map_err(io_err)?;
            let name = std::path::Path::new(&path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&path)
                .to_string();
            Ok(SftpOpResult::Entry(to_sftp_entry(&path, &name, &stat)))
        }
        SftpOp::Exists(path) => Ok(SftpOpResult::Exists(
            sftp.stat(std::path::Path::new(&path)).is_ok(),
        )),
        SftpOp::Rename(src, dst) => {
            sftp.rename(
                std::path::Path::new(&src),
                std::path::Path::new(&dst),
                None,
            )
            .map_err(io_err)?;
            Ok(SftpOpResult::Unit)
        }
        SftpOp::DeleteFile(path) => {
            sftp.unlink(std::path::Path::new(&path)).map_err(io_err)?;
            Ok(SftpOpResult::Unit)
        }
        SftpOp::DeleteDirectory(path) => {
            delete_directory_recursive(sftp, &path).map_err(io_err)?;
            Ok(SftpOpResult::Unit)
        }
    }
}

fn delete_directory_recursive(sftp: &ssh2::Sftp, path: &str) -> Result<(), ssh2::Error> {
    let entries = sftp.readdir(std::path::Path::new(path))?;
    for (entry_path, stat) in entries {
        if stat.is_dir() {
            delete_directory_recursive(sftp, &entry_path.to_string_lossy())?;
        } else {
            sftp.unlink(&entry_path)?;
        }
    }
    sftp.rmdir(std::path::Path::new(path))
}

fn to_sftp_entry(path: &str, name: &str, stat: &ssh2::FileStat) -> SftpEntry {
    let kind = if stat.is_dir() {
        EntryKind::Directory
    } else if stat.file_type().is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };
    let mtime_ms = stat
        .mtime
        .map(|secs| i64::try_from(secs).unwrap_or(0) * 1000)
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| i64::try_from(d.as_millis()).unwrap_or(0))
                .unwrap_or(0)
        });

    SftpEntry {
        name: name.to_string(),
        path: path.to_string(),
        kind,
        size: stat.size.unwrap_or(0),
        mtime: mtime_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_labels() {
        assert_eq!(SessionStatus::Connecting.as_str(), "connecting");
        assert_eq!(SessionStatus::Connected.as_str(), "connected");
        assert_eq!(SessionStatus::Disconnected.as_str(), "disconnected");
        assert_eq!(SessionStatus::Error("x".into()).as_str(), "error");
    }

    #[tokio::test]
    async fn connect_to_unreachable_host_becomes_error_status() {
        let id = generate_session_id();
        // Port 1 is reserved and reliably refuses connections immediately.
        let req = ConnectRequest {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "nobody".to_string(),
            auth: AuthConfig::Password("x".to_string()),
        };
        let session = SshSession::connect(id, req).await;
        assert!(matches!(session.status(), SessionStatus::Error(_)));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
