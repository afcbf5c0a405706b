#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Cooperative, descriptor-addressed message bus for single-threaded async
//! runtimes.
//!
//! Omnibus is a collection of independently addressable bounded FIFO
//! channels behind one clonable [`Bus`] handle, plus an optional atomic
//! broadcast (append to *every* open channel or suspend, feature
//! `broadcast`) and optional batch transfer (vectored send/receive with
//! partial-progress semantics, feature `batch`). Both features are enabled
//! by default.
//!
//! Tasks that cannot make progress suspend on per-channel FIFO wait queues
//! and resume when capacity or data appears; exactly one peer is woken per
//! transferred payload, so a line of suspended producers drains into an
//! emptying channel one step at a time instead of stampeding. Closing a
//! channel wakes every task suspended on it with a `Closed` error.
//!
//! The crate is executor-agnostic but single-threaded: the [`Bus`] handle is
//! not `Send`, and suspension is expressed through standard
//! `Future`/`Waker` plumbing, so it runs on any current-thread executor
//! (`tokio::task::LocalSet`, `futures::executor::LocalPool`, ...).
//!
//! # Examples
//!
//! ```
//! use omnibus::{Bus, ErrorCode, TrySendError};
//!
//! let bus = Bus::new();
//! let ch = bus.open(2);
//!
//! bus.try_send(ch, 1).unwrap();
//! bus.try_send(ch, 2).unwrap();
//! assert!(matches!(bus.try_send(ch, 3), Err(TrySendError::Full(3))));
//! assert_eq!(bus.last_error(), ErrorCode::WouldBlock);
//!
//! assert_eq!(bus.try_recv(ch).unwrap(), 1);
//! assert_eq!(bus.try_recv(ch).unwrap(), 2);
//!
//! bus.close(ch);
//! assert_eq!(bus.try_recv(ch), Err(omnibus::TryRecvError::Closed));
//! ```

pub mod error;

mod bus;
mod wait;

#[cfg(feature = "broadcast")]
pub use bus::BroadcastFuture;
#[cfg(feature = "batch")]
pub use bus::{RecvBatchFuture, SendBatchFuture};
pub use bus::{Bus, ChannelId, Incoming, RecvFuture, SendFuture};

#[cfg(feature = "broadcast")]
pub use error::{BroadcastError, TryBroadcastError};
#[cfg(feature = "batch")]
pub use error::{TryRecvBatchError, TrySendBatchError};
pub use error::{ErrorCode, RecvError, SendError, TryRecvError, TrySendError};
