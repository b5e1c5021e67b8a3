//! SFTP Router (spec §4.E) — translates filesystem requests against a
//! session's remote SFTP subsystem.
//!
//! Path handling is pure string construction: every path arrives from
//! the client as an absolute remote path and is handed to `ssh2::Sftp`
//! unmodified, mirroring `vfs_handlers.rs`'s tree walk in the teacher
//! (no local path resolution, no `Path::canonicalize`). Looking a
//! session up lives here rather than in [`crate::session`] so "session
//! not found" and "SFTP not initialized" stay distinct failure kinds,
//! as spec §4.E requires.

use crate::error::{BrokerError, BrokerResult};
use crate::registry::SessionRegistry;
use crate::session::{SftpEntry, SftpOp, SftpOpResult};

pub struct SftpRouter<'a> {
    registry: &'a SessionRegistry,
}

impl<'a> SftpRouter<'a> {
    pub fn new(registry: &'a SessionRegistry) -> Self {
        Self { registry }
    }

    pub async fn list(&self, session_id: &str, path: &str) -> BrokerResult<Vec<SftpEntry>> {
        match self.run(session_id, SftpOp::List(path.to_string())).await? {
            SftpOpResult::Entries(entries) => Ok(entries),
            _ => unreachable!("List always yields Entries"),
        }
    }

    pub async fn read(&self, session_id: &str, path: &str) -> BrokerResult<Vec<u8>> {
        match self.run(session_id, SftpOp::Read(path.to_string())).await? {
            SftpOpResult::Bytes(bytes) => Ok(bytes),
            _ => unreachable!("Read always yields Bytes"),
        }
    }

    pub async fn write(&self, session_id: &str, path: &str, data: Vec<u8>) -> BrokerResult<()> {
        self.run(session_id, SftpOp::Write(path.to_string(), data))
            .await?;
        Ok(())
    }

    pub async fn create_file(&self, session_id: &str, path: &str) -> BrokerResult<()> {
        self.run(session_id, SftpOp::CreateFile(path.to_string()))
            .await?;
        Ok(())
    }

    pub async fn create_directory(&self, session_id: &str, path: &str) -> BrokerResult<()> {
        self.run(session_id, SftpOp::CreateDirectory(path.to_string()))
            .await?;
        Ok(())
    }

    pub async fn stat(&self, session_id: &str, path: &str) -> BrokerResult<SftpEntry> {
        match self.run(session_id, SftpOp::Stat(path.to_string())).await? {
            SftpOpResult::Entry(entry) => Ok(entry),
            _ => unreachable!("Stat always yields Entry"),
        }
    }

    pub async fn exists(&self, session_id: &str, path: &str) -> BrokerResult<bool> {
        match self.run(session_id, SftpOp::Exists(path.to_string())).await? {
            SftpOpResult::Exists(exists) => Ok(exists),
            _ => unreachable!("Exists always yields Exists"),
        }
    }

    pub async fn rename(&self, session_id: &str, from: &str, to: &str) -> BrokerResult<()> {
        self.run(
            session_id,
            SftpOp::Rename(from.to_string(), to.to_string()),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_file(&self, session_id: &str, path: &str) -> BrokerResult<()> {
        self.run(session_id, SftpOp::DeleteFile(path.to_string()))
            .await?;
        Ok(())
    }

    pub async fn delete_directory(&self, session_id: &str, path: &str) -> BrokerResult<()> {
        self.run(session_id, SftpOp::DeleteDirectory(path.to_string()))
            .await?;
        Ok(())
    }

    async fn run(&self, session_id: &str, op: SftpOp) -> BrokerResult<SftpOpResult> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or(BrokerError::SessionNotFound)?;
        session.sftp(op).await.map_err(BrokerError::from)
    }
}
