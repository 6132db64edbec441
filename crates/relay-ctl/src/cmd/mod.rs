//! CLI command modules.

pub mod chat;
pub mod checksum;
pub mod frame;
