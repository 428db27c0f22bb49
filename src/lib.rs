//! Spaces bridge — grounded conversations over remote knowledge spaces.

pub mod bridge;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod server;
pub mod spaces;

#[cfg(test)]
pub(crate) mod test_support;
