//! # pushsync model
//!
//! Plain data types exchanged between the push orchestrator and its
//! collaborators.
//!
//! This crate provides:
//! - `Node` and `NodeSecurity` for peer identity and credentials
//! - `Channel` for the configured change groupings
//! - `OutgoingBatch` for a unit of changes extracted for one peer
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod channel;
mod node;

pub use batch::OutgoingBatch;
pub use channel::{Channel, ChannelMap};
pub use node::{Node, NodeSecurity};
