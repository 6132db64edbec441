//! relay-core — pure types and algorithms for the StreamChat relay.
//! Nothing in this crate performs I/O; the networked pieces live in relay-services.

pub mod chat;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod wire;
pub mod window;

pub use chat::{ChatRequest, ChatRole, ChatTurn};
pub use checksum::{ChecksumError, Fingerprint};
pub use clock::{Clock, ManualClock, SystemClock};
pub use wire::{FrameError, WireFrame};
