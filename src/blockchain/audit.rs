use log::info;
use thiserror::Error;

use super::block::Block;
use super::crypto::Address;

/// Errors reported by an audit backend
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit backend unavailable: {0}")]
    Unavailable(String),
}

/// What caused a block to be mined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    Transfer { from: Address, to: Address, amount: u64 },
    Reward { to: Address },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Transfer { .. } => "send",
            AuditEvent::Reward { .. } => "reward",
        }
    }
}

/// Receives a copy of every committed block.
///
/// Implementations are best effort and never authoritative for ledger state:
/// the ledger logs their errors and carries on.
pub trait AuditSink: Send + Sync {
    fn record_block(&self, height: usize, block: &Block, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Audit sink that writes one log line per block
#[derive(Debug, Clone, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record_block(&self, height: usize, block: &Block, event: &AuditEvent) -> Result<(), AuditError> {
        match event {
            AuditEvent::Transfer { from, to, amount } => info!(
                "audit: {} block {} at height {}: {} -> {} amount {}",
                event.kind(),
                block.hash_hex(),
                height,
                from,
                to,
                amount
            ),
            AuditEvent::Reward { to } => info!(
                "audit: {} block {} at height {}: reward to {}",
                event.kind(),
                block.hash_hex(),
                height,
                to
            ),
        }
        Ok(())
    }
}
