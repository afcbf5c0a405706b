// src/bus/async_impl.rs

//! The awaiting variants: futures that retry an operation on every poll and
//! park on the owning wait queue in between.
//!
//! A poll never caches the channel across a suspension: the channel is
//! re-resolved by descriptor each time, so a close that happened while the
//! task was suspended surfaces as the `Closed` error family. Dropping a
//! pending future removes its queue entry; if a waker already consumed the
//! entry, the wakeup is forwarded to the next waiter of the same queue so
//! cancellation never strands capacity.

use core::marker::PhantomPinned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

#[cfg(feature = "broadcast")]
use crate::error::BroadcastError;
use crate::error::{ErrorCode, RecvError, SendError};
use crate::wait::WaiterId;

#[cfg(any(feature = "broadcast", feature = "batch"))]
use super::core::Blocked;
use super::{Bus, ChannelId};

/// Where a pending operation stands with respect to its wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
  /// Never parked; nothing to clean up.
  Idle,
  /// Parked at least once and not yet complete. The queue entry may already
  /// have been detached by a waker.
  Parked,
  /// Complete; the last wakeup (if any) was consumed productively.
  Done,
}

// --- SendFuture ---

/// A future that completes once its payload has been appended to the
/// channel, or the channel is closed.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct SendFuture<'a, T> {
  bus: &'a Bus<T>,
  channel: ChannelId,
  // Taken on the poll that completes the send.
  item: Option<T>,
  waiter: WaiterId,
  state: WaitState,
  _phantom: PhantomPinned,
}

impl<'a, T> SendFuture<'a, T> {
  pub(super) fn new(bus: &'a Bus<T>, channel: ChannelId, item: T, waiter: WaiterId) -> Self {
    SendFuture {
      bus,
      channel,
      item: Some(item),
      waiter,
      state: WaitState::Idle,
      _phantom: PhantomPinned,
    }
  }
}

impl<'a, T> Future for SendFuture<'a, T> {
  type Output = Result<(), SendError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = unsafe { self.as_mut().get_unchecked_mut() };
    let Some(item) = this.item.take() else {
      // Poll after completion.
      return Poll::Ready(Ok(()));
    };
    let mut core = this.bus.core.borrow_mut();
    let Some(ch) = core.channel_mut(this.channel) else {
      core.set_error(ErrorCode::NoChannel);
      this.state = WaitState::Done;
      return Poll::Ready(Err(SendError::Closed));
    };
    if ch.has_room() {
      ch.buffer.push_back(item);
      ch.recv_waiters.wake_head();
      core.set_error(ErrorCode::None);
      this.state = WaitState::Done;
      return Poll::Ready(Ok(()));
    }
    tracing::trace!(channel = this.channel.0, "channel full; parking sender");
    ch.send_waiters.park(this.waiter, cx.waker());
    core.set_error(ErrorCode::WouldBlock);
    this.item = Some(item);
    this.state = WaitState::Parked;
    Poll::Pending
  }
}

impl<T> Drop for SendFuture<'_, T> {
  fn drop(&mut self) {
    if self.state == WaitState::Parked {
      self
        .bus
        .core
        .borrow_mut()
        .release_send_waiter(self.channel, self.waiter);
    }
  }
}

impl<T> fmt::Debug for SendFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendFuture")
      .field("channel", &self.channel)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

// --- RecvFuture ---

/// One retrying receive step shared by [`RecvFuture`] and [`Incoming`].
fn poll_recv_step<T>(
  bus: &Bus<T>,
  channel: ChannelId,
  waiter: WaiterId,
  state: &mut WaitState,
  cx: &mut Context<'_>,
) -> Poll<Result<T, RecvError>> {
  let mut core = bus.core.borrow_mut();
  let Some(ch) = core.channel_mut(channel) else {
    core.set_error(ErrorCode::NoChannel);
    *state = WaitState::Done;
    return Poll::Ready(Err(RecvError::Closed));
  };
  if let Some(item) = ch.buffer.pop_front() {
    ch.send_waiters.wake_head();
    #[cfg(feature = "broadcast")]
    core.broadcast_waiters.wake_head();
    core.set_error(ErrorCode::None);
    *state = WaitState::Done;
    return Poll::Ready(Ok(item));
  }
  tracing::trace!(channel = channel.0, "channel empty; parking receiver");
  ch.recv_waiters.park(waiter, cx.waker());
  core.set_error(ErrorCode::WouldBlock);
  *state = WaitState::Parked;
  Poll::Pending
}

/// A future that completes with the oldest payload of the channel, or with
/// an error once the channel is closed.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct RecvFuture<'a, T> {
  bus: &'a Bus<T>,
  channel: ChannelId,
  waiter: WaiterId,
  state: WaitState,
}

impl<'a, T> RecvFuture<'a, T> {
  pub(super) fn new(bus: &'a Bus<T>, channel: ChannelId, waiter: WaiterId) -> Self {
    RecvFuture {
      bus,
      channel,
      waiter,
      state: WaitState::Idle,
    }
  }
}

impl<'a, T> Future for RecvFuture<'a, T> {
  type Output = Result<T, RecvError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    poll_recv_step(this.bus, this.channel, this.waiter, &mut this.state, cx)
  }
}

impl<T> Drop for RecvFuture<'_, T> {
  fn drop(&mut self) {
    if self.state == WaitState::Parked {
      self
        .bus
        .core
        .borrow_mut()
        .release_recv_waiter(self.channel, self.waiter);
    }
  }
}

impl<T> fmt::Debug for RecvFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecvFuture")
      .field("channel", &self.channel)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

// --- Incoming ---

/// A stream of payloads from one channel, ending when the channel closes.
///
/// Created by [`Bus::incoming`]. Poll semantics are those of
/// [`RecvFuture`], repeated: parking, cancellation cleanup, and wake
/// forwarding all behave identically.
#[must_use = "streams do nothing unless polled"]
pub struct Incoming<'a, T> {
  bus: &'a Bus<T>,
  channel: ChannelId,
  waiter: WaiterId,
  state: WaitState,
}

impl<'a, T> Incoming<'a, T> {
  pub(super) fn new(bus: &'a Bus<T>, channel: ChannelId, waiter: WaiterId) -> Self {
    Incoming {
      bus,
      channel,
      waiter,
      state: WaitState::Idle,
    }
  }
}

impl<'a, T> Stream for Incoming<'a, T> {
  type Item = T;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    let this = self.get_mut();
    match poll_recv_step(this.bus, this.channel, this.waiter, &mut this.state, cx) {
      Poll::Ready(Ok(item)) => Poll::Ready(Some(item)),
      Poll::Ready(Err(RecvError::Closed)) => Poll::Ready(None),
      Poll::Pending => Poll::Pending,
    }
  }
}

impl<T> Drop for Incoming<'_, T> {
  fn drop(&mut self) {
    if self.state == WaitState::Parked {
      self
        .bus
        .core
        .borrow_mut()
        .release_recv_waiter(self.channel, self.waiter);
    }
  }
}

impl<T> fmt::Debug for Incoming<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Incoming")
      .field("channel", &self.channel)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

// --- BroadcastFuture ---

/// A future that completes once its payload has been appended to every open
/// channel at once.
#[cfg(feature = "broadcast")]
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct BroadcastFuture<'a, T> {
  bus: &'a Bus<T>,
  item: Option<T>,
  waiter: WaiterId,
  state: WaitState,
  _phantom: PhantomPinned,
}

#[cfg(feature = "broadcast")]
impl<'a, T> BroadcastFuture<'a, T> {
  pub(super) fn new(bus: &'a Bus<T>, item: T, waiter: WaiterId) -> Self {
    BroadcastFuture {
      bus,
      item: Some(item),
      waiter,
      state: WaitState::Idle,
      _phantom: PhantomPinned,
    }
  }
}

#[cfg(feature = "broadcast")]
impl<'a, T: Clone> Future for BroadcastFuture<'a, T> {
  type Output = Result<(), BroadcastError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = unsafe { self.as_mut().get_unchecked_mut() };
    let Some(item) = this.item.as_ref() else {
      // Poll after completion.
      return Poll::Ready(Ok(()));
    };
    let mut core = this.bus.core.borrow_mut();
    match core.broadcast_core(item) {
      Ok(()) => {
        this.item = None;
        this.state = WaitState::Done;
        Poll::Ready(Ok(()))
      }
      Err(Blocked::NoChannel) => {
        this.state = WaitState::Done;
        Poll::Ready(Err(BroadcastError::NoChannels))
      }
      Err(Blocked::WouldBlock) => {
        tracing::trace!("a channel is full; parking broadcaster");
        core.broadcast_waiters.park(this.waiter, cx.waker());
        this.state = WaitState::Parked;
        Poll::Pending
      }
    }
  }
}

#[cfg(feature = "broadcast")]
impl<T> Drop for BroadcastFuture<'_, T> {
  fn drop(&mut self) {
    if self.state == WaitState::Parked {
      self.bus.core.borrow_mut().release_broadcast_waiter(self.waiter);
    }
  }
}

#[cfg(feature = "broadcast")]
impl<T> fmt::Debug for BroadcastFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BroadcastFuture")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

// --- SendBatchFuture ---

/// A future that transfers a leading portion of its slice as soon as the
/// channel has any room, completing with the count transferred.
#[cfg(feature = "batch")]
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct SendBatchFuture<'a, T> {
  bus: &'a Bus<T>,
  channel: ChannelId,
  items: &'a [T],
  waiter: WaiterId,
  state: WaitState,
}

#[cfg(feature = "batch")]
impl<'a, T> SendBatchFuture<'a, T> {
  pub(super) fn new(bus: &'a Bus<T>, channel: ChannelId, items: &'a [T], waiter: WaiterId) -> Self {
    SendBatchFuture {
      bus,
      channel,
      items,
      waiter,
      state: WaitState::Idle,
    }
  }
}

#[cfg(feature = "batch")]
impl<'a, T: Clone> Future for SendBatchFuture<'a, T> {
  type Output = Result<usize, SendError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if this.items.is_empty() {
      this.bus.core.borrow_mut().set_error(ErrorCode::None);
      this.state = WaitState::Done;
      return Poll::Ready(Ok(0));
    }
    let mut core = this.bus.core.borrow_mut();
    match core.send_batch_core(this.channel, this.items) {
      Ok(count) => {
        this.state = WaitState::Done;
        Poll::Ready(Ok(count))
      }
      Err(Blocked::NoChannel) => {
        this.state = WaitState::Done;
        Poll::Ready(Err(SendError::Closed))
      }
      Err(Blocked::WouldBlock) => {
        if let Some(ch) = core.channel_mut(this.channel) {
          ch.send_waiters.park(this.waiter, cx.waker());
        }
        this.state = WaitState::Parked;
        Poll::Pending
      }
    }
  }
}

#[cfg(feature = "batch")]
impl<T> Drop for SendBatchFuture<'_, T> {
  fn drop(&mut self) {
    if self.state == WaitState::Parked {
      self
        .bus
        .core
        .borrow_mut()
        .release_send_waiter(self.channel, self.waiter);
    }
  }
}

#[cfg(feature = "batch")]
impl<T> fmt::Debug for SendBatchFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendBatchFuture")
      .field("channel", &self.channel)
      .field("len", &self.items.len())
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

// --- RecvBatchFuture ---

/// A future that drains up to `out.len()` payloads as soon as the channel
/// holds any, completing with the count received.
#[cfg(feature = "batch")]
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct RecvBatchFuture<'a, T> {
  bus: &'a Bus<T>,
  channel: ChannelId,
  out: &'a mut [T],
  waiter: WaiterId,
  state: WaitState,
}

#[cfg(feature = "batch")]
impl<'a, T> RecvBatchFuture<'a, T> {
  pub(super) fn new(
    bus: &'a Bus<T>,
    channel: ChannelId,
    out: &'a mut [T],
    waiter: WaiterId,
  ) -> Self {
    RecvBatchFuture {
      bus,
      channel,
      out,
      waiter,
      state: WaitState::Idle,
    }
  }
}

#[cfg(feature = "batch")]
impl<'a, T> Future for RecvBatchFuture<'a, T> {
  type Output = Result<usize, RecvError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if this.out.is_empty() {
      this.bus.core.borrow_mut().set_error(ErrorCode::None);
      this.state = WaitState::Done;
      return Poll::Ready(Ok(0));
    }
    let mut core = this.bus.core.borrow_mut();
    match core.recv_batch_core(this.channel, this.out) {
      Ok(count) => {
        this.state = WaitState::Done;
        Poll::Ready(Ok(count))
      }
      Err(Blocked::NoChannel) => {
        this.state = WaitState::Done;
        Poll::Ready(Err(RecvError::Closed))
      }
      Err(Blocked::WouldBlock) => {
        if let Some(ch) = core.channel_mut(this.channel) {
          ch.recv_waiters.park(this.waiter, cx.waker());
        }
        this.state = WaitState::Parked;
        Poll::Pending
      }
    }
  }
}

#[cfg(feature = "batch")]
impl<T> Drop for RecvBatchFuture<'_, T> {
  fn drop(&mut self) {
    if self.state == WaitState::Parked {
      self
        .bus
        .core
        .borrow_mut()
        .release_recv_waiter(self.channel, self.waiter);
    }
  }
}

#[cfg(feature = "batch")]
impl<T> fmt::Debug for RecvBatchFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecvBatchFuture")
      .field("channel", &self.channel)
      .field("capacity", &self.out.len())
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
