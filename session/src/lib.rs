//! Session engines, supervisor, and public client API for the fq
//! message-fanout broker.
//!
//! A session is one authenticated identity materialized as two TCP
//! connections: a command channel carrying the auth handshake, bind/unbind/
//! status RPCs, and heartbeats; and a data channel streaming message frames
//! in both directions. The supervisor keeps both alive across broker
//! restarts, reconnecting the command channel immediately and the data
//! channel under randomized exponential backoff.
//!
//! ## Features
//!
//! - **Dual-connection session**: command and data channels joined by a
//!   broker-issued session key
//! - **Request correlation**: FIFO matching of bind/unbind/status replies
//! - **Heartbeat supervision**: negotiated interval, mirrored ticks, and
//!   staleness teardown
//! - **Asynchronous publish/receive** with a bounded queue and optional
//!   fail-fast backpressure
//! - **Hooks**: auth/bind/unbind/message/disconnect callbacks, delivered on
//!   the protocol tasks or via the receive path
//!
//! ## Example
//!
//! ```rust,no_run
//! use fq_session::{Client, TransientSubHooks};
//!
//! # async fn example() -> Result<(), fq_session::SessionError> {
//! let client = Client::new();
//! let (hooks, mut msgs, _errors) = TransientSubHooks::new();
//! hooks.add_binding("logging", "prefix:\"web.\"");
//! client.set_hooks(hooks);
//! client.creds("broker.example.com", 8765, "worker/jobs", "secret")?;
//! client.connect()?;
//!
//! while let Some(msg) = msgs.recv().await {
//!     println!("{}: {} bytes", msg.route, msg.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backoff;
mod command;
mod data;
#[cfg(test)]
mod test_support;

pub mod client;
pub mod error;
pub mod hooks;
pub mod instr;

pub use client::{Client, Userdata};
pub use error::SessionError;
pub use hooks::{Hooks, TransientSubHooks};
pub use instr::{BindReq, StatusCallback, UnbindReq};

// Re-export the wire-level types that appear in the public API.
pub use fq_wire::{BindFlags, Message, MsgId, Rk, ROUTE_REFUSED};
