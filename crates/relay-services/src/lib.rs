//! relay-services — the stateful and networked half of the relay:
//! checksum cache and resolver, usage gate, and the StreamChat dispatcher.

pub mod cache;
pub mod dispatch;
pub mod http;
pub mod resolver;
pub mod usage;

pub use cache::{ChecksumCache, CHECKSUM_TTL};
pub use dispatch::{CallContext, DispatchError, RequestDispatcher, STREAM_CHAT_PATH};
pub use resolver::{ChecksumResolver, ResolvedChecksum, SourceError, Tier};
pub use usage::{FixedAllowance, UsageMeter, Unmetered};
