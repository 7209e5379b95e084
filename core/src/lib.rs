//! Vireo Core Library
//!
//! Chain-agnostic primitives shared across the node: 256-bit hashes,
//! transaction output references and standard script encodings.

pub mod constants;
pub mod hash;
pub mod outpoint;
pub mod script;

pub use constants::COIN;
pub use hash::Hash256;
pub use outpoint::{OutPoint, TxIn};
pub use script::Script;
