//! # did:sol Registry Test Suite
//!
//! End-to-end flows against the in-memory ledger, which re-validates every
//! submitted instruction the way the registry program does.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Codec and size-accounting benchmarks
//! └── src/integration/
//!     ├── fixtures.rs   # Keys, ledgers and services
//!     ├── resolution.rs # Resolve fallback, legacy migration
//!     ├── composition.rs# Size accounting, allocation, controllers
//!     ├── guards.rs     # Ownership guard and lockout
//!     └── cross_chain.rs# Eth-signed nonces and replay
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p did-tests
//! cargo test -p did-tests integration::cross_chain::
//! cargo bench -p did-tests
//! ```

#![allow(dead_code)]

pub mod integration;
