//! Shared types for the `edition` crates: errors, conversation messages,
//! streaming events, provider capabilities, trace events and configuration.

pub mod capability;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod trace;

pub use error::{Error, Result};
pub use message::{Message, Role};
