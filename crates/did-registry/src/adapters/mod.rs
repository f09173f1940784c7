//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound ledger port.

mod in_memory_ledger;

pub use in_memory_ledger::InMemoryLedger;
