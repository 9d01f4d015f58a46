//! Persistence for the VNC connection list.
//!
//! The list lives in a small JSON file. A missing file is seeded with one
//! default entry pointing at the configured default target, so a fresh
//! deployment always has something to connect to.

use crate::models::VncConnection;
use anyhow::{Context, Result};
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// A wrapper around the JSON file to provide a clear data access interface.
pub struct ConnectionStore {
    path: PathBuf,
    default_target: String,
    // Serializes read-modify-write cycles across concurrent handlers.
    lock: Mutex<()>,
}

impl ConnectionStore {
    pub fn new(path: PathBuf, default_target: String) -> Self {
        Self {
            path,
            default_target,
            lock: Mutex::new(()),
        }
    }

    /// Returns all connections, seeding the file on first use.
    pub async fn list(&self) -> Result<Vec<VncConnection>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Appends a connection and persists the list.
    pub async fn add(&self, connection: VncConnection) -> Result<VncConnection> {
        let _guard = self.lock.lock().await;
        let mut connections = self.load().await?;
        connections.push(connection.clone());
        self.save(&connections).await?;
        Ok(connection)
    }

    /// Replaces the connection at `index`. Returns `None` when the index is
    /// out of range.
    pub async fn update(
        &self,
        index: usize,
        connection: VncConnection,
    ) -> Result<Option<VncConnection>> {
        let _guard = self.lock.lock().await;
        let mut connections = self.load().await?;
        if index >= connections.len() {
            return Ok(None);
        }
        connections[index] = connection.clone();
        self.save(&connections).await?;
        Ok(Some(connection))
    }

    /// Removes the connection at `index`. Returns `false` when the index is
    /// out of range.
    pub async fn delete(&self, index: usize) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut connections = self.load().await?;
        if index >= connections.len() {
            return Ok(false);
        }
        connections.remove(index);
        self.save(&connections).await?;
        Ok(true)
    }

    async fn load(&self) -> Result<Vec<VncConnection>> {
        match fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("malformed connection list at {}", self.path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let seed = vec![VncConnection {
                    name: "Local server".to_string(),
                    url: self.default_target.clone(),
                    password: None,
                }];
                self.save(&seed).await?;
                Ok(seed)
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    async fn save(&self, connections: &[VncConnection]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec(connections)?;
        fs::write(&self.path, data)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
