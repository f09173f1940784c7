//! # Integration Flows
//!
//! Each module drives `DidService` end to end against `InMemoryLedger`.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod composition;
#[cfg(test)]
mod cross_chain;
#[cfg(test)]
mod guards;
#[cfg(test)]
mod resolution;
