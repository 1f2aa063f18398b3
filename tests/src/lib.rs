//! # Unified Test Suite
//!
//! Cross-subsystem flows over the in-memory storage backend and the
//! scripted contract runtime: the full pipeline from raw base-chain
//! blocks through execution, commitment, hooks, and the API surface.

#[cfg(test)]
mod harness;

#[cfg(test)]
mod integration;
