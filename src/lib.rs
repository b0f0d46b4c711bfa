//! # async-agentx
//!
//! Async AgentX (RFC 2741) subagent library for Rust.
//!
//! A subagent connects to a master SNMP agent over a stream socket,
//! registers regions of the OID namespace, and answers GET, GETNEXT,
//! GETBULK and two-phase SET requests on the master's behalf. Each region
//! is backed by an [`Updater`] that periodically rebuilds an immutable
//! snapshot of its bindings, and optionally a [`SetHandler`] that
//! processes writes.
//!
//! ## Features
//!
//! - Bit-exact RFC 2741 codec for every PDU type, both byte orders
//! - Async-first session built on Tokio with automatic reconnect,
//!   exponential backoff and re-registration
//! - Lock-free reads: requests run against atomically published snapshots
//! - Full TestSet/CommitSet/UndoSet/CleanupSet transaction machine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_agentx::{BoxFuture, Endpoint, Result, Session, SnapshotBuilder, Updater, oid};
//! use std::time::Duration;
//!
//! struct Demo;
//!
//! impl Updater for Demo {
//!     fn update<'a>(&'a self, builder: &'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>> {
//!         Box::pin(async move {
//!             builder.set_octet_string(&oid!(1, 0), "hello from async-agentx")?;
//!             builder.set_counter32(&oid!(2, 0), 1)?;
//!             Ok(())
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let endpoint: Endpoint = "127.0.0.1:705".parse()?;
//!     let session = Session::open(
//!         endpoint,
//!         oid!(1, 3, 6, 1, 4, 1, 12345),
//!         "demo subagent",
//!     );
//!     session
//!         .register(oid!(1, 3, 6, 1, 4, 1, 12345), Demo, Duration::from_secs(10))
//!         .await?;
//!     session.start_blocking().await
//! }
//! ```

pub mod backoff;
pub mod error;
pub mod handler;
pub mod oid;
pub mod pdu;
pub mod session;
pub mod snapshot;
pub mod transport;
pub mod trie;
pub mod value;
pub mod varbind;

// Re-exports for convenience
pub use backoff::Backoff;
pub use error::{Error, OidErrorKind, ProtocolErrorKind, Result};
pub use handler::{BoxFuture, SetError, SetErrorCode, SetHandler, SetResult, Updater};
pub use oid::Oid;
pub use pdu::{ByteOrder, CloseReason, Pdu, PduType, ResponseError, SearchRange};
pub use session::{RegionHandle, RegisterOptions, Session, SessionBuilder};
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use transport::Endpoint;
pub use trie::OidTrie;
pub use value::Value;
pub use varbind::VarBind;
