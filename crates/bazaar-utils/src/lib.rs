//! Shared helpers for the bazaar crates: filesystem operations, SHA-256 hashing, file
//! locking, path resolution and duration parsing.

pub mod error;
pub mod fs;
pub mod hash;
pub mod lock;
pub mod path;
pub mod time;
