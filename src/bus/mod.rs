// src/bus/mod.rs

//! The bus: a descriptor-addressed table of bounded FIFO channels.
//!
//! A [`Bus`] owns a sparse table of channels named by small integer
//! descriptors ([`ChannelId`]). Channels are opened with a fixed capacity and
//! closed independently; a closed descriptor is reused by the next `open`
//! (lowest vacant slot first). Producers and consumers address channels
//! through the same bus handle, which can be cloned freely; every clone is
//! the same bus.
//!
//! Two flavors of every transfer operation exist:
//! - `try_*` returns immediately, reporting `Full`/`Empty` when the channel
//!   cannot satisfy the request;
//! - the awaiting form suspends the calling task until it can succeed or
//!   until the channel is closed underneath it.
//!
//! The bus is single-threaded by construction (the handle is not `Send`):
//! between two suspension points an operation observes and mutates the bus
//! atomically, which is what makes the atomic broadcast and the close
//! protocol race-free without any locking.
//!
//! # Examples
//!
//! ```
//! use omnibus::Bus;
//!
//! # async fn demo() {
//! let bus = Bus::new();
//! let ch = bus.open(2);
//!
//! bus.send(ch, 1u32).await.unwrap();
//! bus.send(ch, 2u32).await.unwrap();
//! assert_eq!(bus.recv(ch).await.unwrap(), 1);
//!
//! bus.close(ch);
//! # }
//! ```

mod async_impl;
mod core;


use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[cfg(feature = "broadcast")]
pub use async_impl::BroadcastFuture;
#[cfg(feature = "batch")]
pub use async_impl::{RecvBatchFuture, SendBatchFuture};
pub use async_impl::{Incoming, RecvFuture, SendFuture};

#[cfg(feature = "broadcast")]
use crate::error::TryBroadcastError;
#[cfg(feature = "batch")]
use crate::error::{TryRecvBatchError, TrySendBatchError};
use crate::error::{ErrorCode, TryRecvError, TrySendError};

#[cfg(any(feature = "broadcast", feature = "batch"))]
use self::core::Blocked;
use self::core::BusCore;

/// Names one open channel within a [`Bus`].
///
/// Descriptors are stable until [`Bus::close`]; afterwards the same index
/// may be handed out again by a subsequent [`Bus::open`]. Operations on a
/// stale descriptor fail with the `Closed` error family and record
/// [`ErrorCode::NoChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) usize);

impl ChannelId {
  /// The slot index behind this descriptor.
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for ChannelId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A handle to a cooperative message bus.
///
/// Cloning is cheap and every clone addresses the same channels. The handle
/// is deliberately not `Send`: all tasks touching one bus must live on the
/// same thread, scheduled cooperatively by the embedding executor.
///
/// Dropping the last handle tears the bus down. Pending operations borrow
/// the handle they were started from, so no task can still be suspended on a
/// wait queue at that point; channels that are still open are dropped along
/// with any undelivered payloads (logged at debug level).
pub struct Bus<T> {
  pub(crate) core: Rc<RefCell<BusCore<T>>>,
}

impl<T> Clone for Bus<T> {
  fn clone(&self) -> Self {
    Bus {
      core: Rc::clone(&self.core),
    }
  }
}

impl<T> Default for Bus<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for Bus<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.core.try_borrow() {
      Ok(core) => f
        .debug_struct("Bus")
        .field("channels", &core.channel_count())
        .field("last_error", &core.last_error)
        .finish(),
      Err(_) => f.write_str("Bus { <in use> }"),
    }
  }
}

impl<T> Bus<T> {
  /// Creates an empty bus with no channels.
  pub fn new() -> Self {
    Bus {
      core: Rc::new(RefCell::new(BusCore::new())),
    }
  }

  /// Opens a channel with the given capacity and returns its descriptor.
  ///
  /// The lowest vacant slot is reused before the table grows, so after a
  /// `close` the next `open` hands the closed descriptor out again.
  /// Records [`ErrorCode::None`].
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero. The bus has no rendezvous mode; every
  /// channel buffers at least one payload.
  pub fn open(&self, capacity: usize) -> ChannelId {
    self.core.borrow_mut().open(capacity)
  }

  /// Closes a channel, waking every task suspended on it.
  ///
  /// The slot is vacated before the waiters run again, so each of them
  /// observes the channel as gone and fails with its `Closed` error. With
  /// the `broadcast` feature, pending broadcasters are also woken to
  /// re-evaluate the shrunken channel set. Closing a stale or never-issued
  /// descriptor is a silent no-op. Records [`ErrorCode::None`].
  ///
  /// Payloads still buffered in the channel are dropped.
  pub fn close(&self, channel: ChannelId) {
    self.core.borrow_mut().close(channel);
  }

  /// Appends `item` to the channel without suspending.
  ///
  /// On success one pending receiver is woken. Fails with
  /// [`TrySendError::Full`] (code [`ErrorCode::WouldBlock`]) when the
  /// buffer is at capacity, or [`TrySendError::Closed`] (code
  /// [`ErrorCode::NoChannel`]) on a stale descriptor; the rejected item is
  /// handed back either way.
  pub fn try_send(&self, channel: ChannelId, item: T) -> Result<(), TrySendError<T>> {
    self.core.borrow_mut().try_send_core(channel, item)
  }

  /// Appends `item` to the channel, suspending while the buffer is full.
  ///
  /// The returned future retries on every wakeup and fails with
  /// [`SendError::Closed`](crate::error::SendError::Closed) if the channel
  /// is closed before the payload fits, including a close that happens
  /// while the sender is suspended.
  pub fn send(&self, channel: ChannelId, item: T) -> SendFuture<'_, T> {
    let waiter = self.core.borrow_mut().next_waiter_id();
    SendFuture::new(self, channel, item, waiter)
  }

  /// Pops the oldest payload without suspending.
  ///
  /// On success one pending sender is woken (a buffer slot was freed) and,
  /// with the `broadcast` feature, the head broadcaster gets to re-check
  /// its all-channels-have-room predicate. Fails with
  /// [`TryRecvError::Empty`] (code [`ErrorCode::WouldBlock`]) or
  /// [`TryRecvError::Closed`] (code [`ErrorCode::NoChannel`]).
  pub fn try_recv(&self, channel: ChannelId) -> Result<T, TryRecvError> {
    self.core.borrow_mut().try_recv_core(channel)
  }

  /// Pops the oldest payload, suspending while the buffer is empty.
  ///
  /// The returned future retries on every wakeup and fails with
  /// [`RecvError::Closed`](crate::error::RecvError::Closed) if the channel
  /// is closed first.
  pub fn recv(&self, channel: ChannelId) -> RecvFuture<'_, T> {
    let waiter = self.core.borrow_mut().next_waiter_id();
    RecvFuture::new(self, channel, waiter)
  }

  /// Returns a stream of payloads from the channel.
  ///
  /// The stream yields exactly what repeated [`recv`](Self::recv) calls
  /// would and terminates with `None` once the channel is closed.
  pub fn incoming(&self, channel: ChannelId) -> Incoming<'_, T> {
    let waiter = self.core.borrow_mut().next_waiter_id();
    Incoming::new(self, channel, waiter)
  }

  /// The error code recorded by the most recent bus operation.
  pub fn last_error(&self) -> ErrorCode {
    self.core.borrow().last_error
  }

  /// Overwrites the recorded error code.
  ///
  /// Useful for callers that want to clear the indicator before a sequence
  /// of operations, mirroring classic `errno` usage.
  pub fn set_last_error(&self, code: ErrorCode) {
    self.core.borrow_mut().set_error(code);
  }

  /// The number of currently open channels.
  pub fn channel_count(&self) -> usize {
    self.core.borrow().channel_count()
  }

  /// The fixed capacity of a channel, or `None` (code
  /// [`ErrorCode::NoChannel`]) on a stale descriptor.
  pub fn capacity(&self, channel: ChannelId) -> Option<usize> {
    let mut core = self.core.borrow_mut();
    let Some(ch) = core.channel(channel) else {
      core.set_error(ErrorCode::NoChannel);
      return None;
    };
    let capacity = ch.capacity;
    core.set_error(ErrorCode::None);
    Some(capacity)
  }

  /// The number of buffered payloads in a channel, or `None` (code
  /// [`ErrorCode::NoChannel`]) on a stale descriptor.
  pub fn len(&self, channel: ChannelId) -> Option<usize> {
    let mut core = self.core.borrow_mut();
    let Some(ch) = core.channel(channel) else {
      core.set_error(ErrorCode::NoChannel);
      return None;
    };
    let len = ch.buffer.len();
    core.set_error(ErrorCode::None);
    Some(len)
  }

  /// Whether a channel currently buffers no payloads.
  pub fn is_empty(&self, channel: ChannelId) -> Option<bool> {
    self.len(channel).map(|len| len == 0)
  }

  /// Whether a channel's buffer is at capacity.
  pub fn is_full(&self, channel: ChannelId) -> Option<bool> {
    let mut core = self.core.borrow_mut();
    let Some(ch) = core.channel(channel) else {
      core.set_error(ErrorCode::NoChannel);
      return None;
    };
    let full = !ch.has_room();
    core.set_error(ErrorCode::None);
    Some(full)
  }

  /// Drains up to `out.len()` payloads into `out` without suspending,
  /// returning the count received.
  ///
  /// One pending sender is woken per drained payload, and with the
  /// `broadcast` feature the head broadcaster is woken once at the end. An
  /// empty `out` returns `Ok(0)` (code [`ErrorCode::None`]) without
  /// touching the channel.
  #[cfg(feature = "batch")]
  pub fn try_recv_batch(&self, channel: ChannelId, out: &mut [T]) -> Result<usize, TryRecvBatchError> {
    let mut core = self.core.borrow_mut();
    if out.is_empty() {
      core.set_error(ErrorCode::None);
      return Ok(0);
    }
    match core.recv_batch_core(channel, out) {
      Ok(count) => Ok(count),
      Err(Blocked::WouldBlock) => Err(TryRecvBatchError::Empty),
      Err(Blocked::NoChannel) => Err(TryRecvBatchError::Closed),
    }
  }

  /// Drains up to `out.len()` payloads into `out`, suspending only while
  /// the channel is empty.
  ///
  /// The future completes on the first wakeup that finds any data,
  /// returning a partial count rather than waiting for the slice to fill.
  #[cfg(feature = "batch")]
  pub fn recv_batch<'a>(&'a self, channel: ChannelId, out: &'a mut [T]) -> RecvBatchFuture<'a, T> {
    let waiter = self.core.borrow_mut().next_waiter_id();
    RecvBatchFuture::new(self, channel, out, waiter)
  }
}

impl<T: Clone> Bus<T> {
  /// Appends one clone of `item` to every open channel at once, without
  /// suspending.
  ///
  /// All-or-nothing: if any open channel is at capacity nothing is written
  /// and the item comes back in [`TryBroadcastError::Full`] (code
  /// [`ErrorCode::WouldBlock`]). A bus with no open channels fails with
  /// [`TryBroadcastError::NoChannels`] (code [`ErrorCode::NoChannel`]). On
  /// success every channel's head receiver is woken.
  #[cfg(feature = "broadcast")]
  pub fn try_broadcast(&self, item: T) -> Result<(), TryBroadcastError<T>> {
    let mut core = self.core.borrow_mut();
    match core.broadcast_core(&item) {
      Ok(()) => Ok(()),
      Err(Blocked::WouldBlock) => Err(TryBroadcastError::Full(item)),
      Err(Blocked::NoChannel) => Err(TryBroadcastError::NoChannels(item)),
    }
  }

  /// Appends one clone of `item` to every open channel at once, suspending
  /// until every open channel has room simultaneously.
  ///
  /// Broadcasters park on a bus-level queue and are woken whenever the
  /// predicate may have changed: any receive on any channel, or any close.
  /// A woken broadcaster that still cannot proceed re-parks at the tail,
  /// keeping broadcasters FIFO among themselves. If the channel set shrinks
  /// to zero while suspended the future fails with
  /// [`BroadcastError::NoChannels`](crate::error::BroadcastError::NoChannels).
  #[cfg(feature = "broadcast")]
  pub fn broadcast(&self, item: T) -> BroadcastFuture<'_, T> {
    let waiter = self.core.borrow_mut().next_waiter_id();
    BroadcastFuture::new(self, item, waiter)
  }

  /// Appends leading items of `items` to the channel without suspending,
  /// returning the count transferred (`min(items.len(), room)`).
  ///
  /// One pending receiver is woken per appended item. An empty slice
  /// returns `Ok(0)` (code [`ErrorCode::None`]) without touching the
  /// channel; a full channel fails with [`TrySendBatchError::Full`].
  #[cfg(feature = "batch")]
  pub fn try_send_batch(&self, channel: ChannelId, items: &[T]) -> Result<usize, TrySendBatchError> {
    let mut core = self.core.borrow_mut();
    if items.is_empty() {
      core.set_error(ErrorCode::None);
      return Ok(0);
    }
    match core.send_batch_core(channel, items) {
      Ok(count) => Ok(count),
      Err(Blocked::WouldBlock) => Err(TrySendBatchError::Full),
      Err(Blocked::NoChannel) => Err(TrySendBatchError::Closed),
    }
  }

  /// Appends leading items of `items` to the channel, suspending only while
  /// the channel is full.
  ///
  /// The future completes on the first wakeup that finds any room,
  /// transferring as much as fits and returning that count. It never waits
  /// for the whole slice to fit, which keeps `items.len() > capacity` from
  /// deadlocking.
  #[cfg(feature = "batch")]
  pub fn send_batch<'a>(&'a self, channel: ChannelId, items: &'a [T]) -> SendBatchFuture<'a, T> {
    let waiter = self.core.borrow_mut().next_waiter_id();
    SendBatchFuture::new(self, channel, items, waiter)
  }
}
