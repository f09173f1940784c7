//! # Outbound Ports
//!
//! The ledger the registry program runs on.

use crate::domain::{Instruction, LedgerError, Pubkey};
use async_trait::async_trait;

/// A transaction: instructions executed atomically, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
    /// Native keys that signed the transaction.
    pub signers: Vec<Pubkey>,
}

impl Transaction {
    pub fn new(instructions: Vec<Instruction>, signers: Vec<Pubkey>) -> Self {
        Self {
            instructions,
            signers,
        }
    }

    pub fn is_signed_by(&self, key: &Pubkey) -> bool {
        self.signers.contains(key)
    }
}

/// Ledger RPC - outbound port.
///
/// Transport timeouts and retries belong to implementations. Rejections by
/// the registry program surface as [`LedgerError`] carrying the program's
/// error code.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Raw account data, `None` if no account exists at `address`.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Submit and confirm a transaction. Returns its signature string.
    async fn submit(&self, transaction: Transaction) -> Result<String, LedgerError>;
}
