//! Vireo Masternode
//!
//! The masternode subsystem: collateral-backed service nodes, their
//! lifecycle state machine, the signed gossip protocols that keep the
//! network's view of them consistent, and the deterministic scoring
//! used for winner selection and payment fairness.
//!
//! Everything runs against an explicit [`context::Context`] rather than
//! process globals; the chain, spork flags and peer relay are reached
//! only through the traits and queues it carries.

pub mod broadcast;
pub mod chain;
pub mod collateral;
pub mod config;
pub mod context;
pub mod error;
pub mod masternode;
pub mod payments;
pub mod ping;
pub mod registry;
pub mod relay;
pub mod score;
pub mod spork;

#[cfg(test)]
mod testutil;


pub use broadcast::MasternodeBroadcast;
pub use context::Context;
pub use error::{MasternodeError, Rejection, Result};
pub use masternode::{Masternode, MasternodeState};
pub use ping::MasternodePing;
pub use registry::MasternodeRegistry;
