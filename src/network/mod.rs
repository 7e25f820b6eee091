//! Network collaborator
//!
//! The wallet core never gossips by itself. Committed joints and private
//! payment chains go through a [`Network`]; the bundled [`OutboxNetwork`]
//! appends them to a JSON-lines file that a relay process drains.

pub mod message;

pub use message::{OutboundMessage, OutboxEntry, OUTBOX_VERSION};

use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

use crate::composer::{Joint, PrivateChain};
use crate::definition::Address;
use crate::storage::{append_json_line, StorageError};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Outbox error: {0}")]
    Outbox(#[from] StorageError),
    #[error("Network lock poisoned")]
    Poisoned,
}

/// Delivery of joints and private payloads
pub trait Network: Send + Sync {
    fn broadcast_joint(&self, joint: &Joint) -> Result<(), NetworkError>;

    fn send_private_payment(&self, to: &Address, chains: &[PrivateChain]) -> Result<(), NetworkError>;
}

/// Appends every delivery to `<path>` as one JSON line
#[derive(Debug)]
pub struct OutboxNetwork {
    path: PathBuf,
    private_endpoint: Option<String>,
    write_lock: Mutex<()>,
}

impl OutboxNetwork {
    pub fn new(path: impl Into<PathBuf>, private_endpoint: Option<String>) -> Self {
        Self {
            path: path.into(),
            private_endpoint,
            write_lock: Mutex::new(()),
        }
    }

    fn append(&self, message: OutboundMessage) -> Result<(), NetworkError> {
        let _write = self.write_lock.lock().map_err(|_| NetworkError::Poisoned)?;
        append_json_line(&self.path, &OutboxEntry::new(message))?;
        Ok(())
    }
}

impl Network for OutboxNetwork {
    fn broadcast_joint(&self, joint: &Joint) -> Result<(), NetworkError> {
        self.append(OutboundMessage::Joint { joint: joint.clone() })?;
        log::info!(
            "Queued joint {} for broadcast",
            joint.unit.unit.as_deref().unwrap_or("?")
        );
        Ok(())
    }

    fn send_private_payment(&self, to: &Address, chains: &[PrivateChain]) -> Result<(), NetworkError> {
        self.append(OutboundMessage::PrivatePayment {
            to: to.clone(),
            endpoint: self.private_endpoint.clone(),
            chains: chains.to_vec(),
        })?;
        log::info!("Queued {} private chain(s) for {}", chains.len(), to);
        Ok(())
    }
}

/// Keeps deliveries in memory
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    fn push(&self, message: OutboundMessage) -> Result<(), NetworkError> {
        self.sent
            .lock()
            .map_err(|_| NetworkError::Poisoned)?
            .push(message);
        Ok(())
    }
}

impl Network for RecordingNetwork {
    fn broadcast_joint(&self, joint: &Joint) -> Result<(), NetworkError> {
        self.push(OutboundMessage::Joint { joint: joint.clone() })
    }

    fn send_private_payment(&self, to: &Address, chains: &[PrivateChain]) -> Result<(), NetworkError> {
        self.push(OutboundMessage::PrivatePayment {
            to: to.clone(),
            endpoint: None,
            chains: chains.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Unit;
    use tempfile::tempdir;

    fn joint() -> Joint {
        let mut unit = Unit::new(Vec::new(), Vec::new());
        unit.unit = Some("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=".to_string());
        Joint { unit }
    }

    #[test]
    fn test_outbox_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let network = OutboxNetwork::new(&path, Some("wss://relay.example".to_string()));
        let to: Address = "LBFE3LOJHOH24Y4J54RR6GDM3KVL2PWJ".parse().unwrap();

        network.broadcast_joint(&joint()).unwrap();
        network.send_private_payment(&to, &[]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<OutboxEntry> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].message, OutboundMessage::Joint { .. }));
        match &entries[1].message {
            OutboundMessage::PrivatePayment { endpoint, .. } => {
                assert_eq!(endpoint.as_deref(), Some("wss://relay.example"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(text.contains("\"kind\":\"joint\""));
    }

    #[test]
    fn test_recording_network() {
        let network = RecordingNetwork::new();
        network.broadcast_joint(&joint()).unwrap();
        assert_eq!(network.sent().len(), 1);
    }
}
