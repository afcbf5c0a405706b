// src/bus/core.rs

//! The slot table, per-channel state, and the non-suspending cores of every
//! operation.
//!
//! Everything in this module runs to completion between suspension points.
//! Under the single-threaded cooperative model the `RefCell` in
//! [`Bus`](crate::Bus) is the only guard required; there are no locks and no
//! atomics. The awaiting variants in `async_impl` layer parking and retry on
//! top of these cores.

use std::collections::VecDeque;

use crate::error::{ErrorCode, TryRecvError, TrySendError};
use crate::wait::{WaitQueue, WaiterId};

use super::ChannelId;

/// One bounded FIFO buffer plus its two wait queues.
///
/// Invariants at every suspension point: `buffer.len() <= capacity`; a
/// channel with room has no send-waiters; a channel with data has no
/// recv-waiters.
#[derive(Debug)]
pub(crate) struct Channel<T> {
  pub(crate) capacity: usize,
  pub(crate) buffer: VecDeque<T>,
  pub(crate) send_waiters: WaitQueue,
  pub(crate) recv_waiters: WaitQueue,
}

impl<T> Channel<T> {
  fn new(capacity: usize) -> Self {
    Channel {
      capacity,
      buffer: VecDeque::with_capacity(capacity),
      send_waiters: WaitQueue::new(),
      recv_waiters: WaitQueue::new(),
    }
  }

  pub(crate) fn has_room(&self) -> bool {
    self.buffer.len() < self.capacity
  }
}

/// Why a non-suspending core could not complete. The awaiting variants park
/// on `WouldBlock` and fail on `NoChannel`.
#[cfg(any(feature = "broadcast", feature = "batch"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Blocked {
  /// The channel (or, for broadcast, every channel) is gone.
  NoChannel,
  /// A state change is needed before the operation can proceed.
  WouldBlock,
}

/// The mutable state behind a [`Bus`](crate::Bus) handle.
#[derive(Debug)]
pub(crate) struct BusCore<T> {
  /// Sparse channel table. Length is the highest descriptor ever issued
  /// plus one; vacated interior slots are reused before the table grows.
  slots: Vec<Option<Channel<T>>>,
  /// Tasks suspended until every open channel has room.
  #[cfg(feature = "broadcast")]
  pub(crate) broadcast_waiters: WaitQueue,
  pub(crate) last_error: ErrorCode,
  next_waiter: u64,
}

impl<T> BusCore<T> {
  pub(crate) fn new() -> Self {
    BusCore {
      slots: Vec::new(),
      #[cfg(feature = "broadcast")]
      broadcast_waiters: WaitQueue::new(),
      last_error: ErrorCode::None,
      next_waiter: 0,
    }
  }

  pub(crate) fn set_error(&mut self, code: ErrorCode) {
    self.last_error = code;
  }

  /// Hands out a bus-unique waiter identity. Ids are never reused, so a
  /// cancelled future can never remove a stranger's queue entry.
  pub(crate) fn next_waiter_id(&mut self) -> WaiterId {
    let id = WaiterId(self.next_waiter);
    self.next_waiter += 1;
    id
  }

  pub(crate) fn channel(&self, id: ChannelId) -> Option<&Channel<T>> {
    self.slots.get(id.0).and_then(Option::as_ref)
  }

  pub(crate) fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel<T>> {
    self.slots.get_mut(id.0).and_then(Option::as_mut)
  }

  pub(crate) fn channel_count(&self) -> usize {
    self.slots.iter().flatten().count()
  }

  /// Installs a new channel in the lowest vacant slot, growing the table by
  /// one only when no slot is free.
  pub(crate) fn open(&mut self, capacity: usize) -> ChannelId {
    assert!(capacity > 0, "channel capacity must be positive");
    let slot = match self.slots.iter().position(Option::is_none) {
      Some(idx) => idx,
      None => {
        self.slots.push(None);
        self.slots.len() - 1
      }
    };
    self.slots[slot] = Some(Channel::new(capacity));
    self.set_error(ErrorCode::None);
    tracing::debug!(channel = slot, capacity, "channel opened");
    ChannelId(slot)
  }

  /// Closes `id`, waking every suspended waiter. A stale or never-issued
  /// descriptor is a silent no-op.
  ///
  /// The slot is vacated before anyone is woken: a woken waiter re-resolves
  /// the descriptor on its next poll and must observe the channel as gone.
  /// Draining both queues before the channel is dropped is what keeps any
  /// waiter from ever touching a destroyed channel.
  pub(crate) fn close(&mut self, id: ChannelId) {
    let taken = self.slots.get_mut(id.0).and_then(|slot| slot.take());
    self.set_error(ErrorCode::None);
    let Some(mut ch) = taken else { return };
    tracing::debug!(channel = id.0, undelivered = ch.buffer.len(), "channel closed");
    ch.send_waiters.wake_all();
    ch.recv_waiters.wake_all();
    // The channel set changed; every pending broadcast must re-evaluate.
    #[cfg(feature = "broadcast")]
    self.broadcast_waiters.wake_all();
  }

  /// Appends `item` if the channel has room, waking one pending receiver.
  pub(crate) fn try_send_core(&mut self, id: ChannelId, item: T) -> Result<(), TrySendError<T>> {
    let Some(ch) = self.channel_mut(id) else {
      self.set_error(ErrorCode::NoChannel);
      return Err(TrySendError::Closed(item));
    };
    if !ch.has_room() {
      self.set_error(ErrorCode::WouldBlock);
      return Err(TrySendError::Full(item));
    }
    ch.buffer.push_back(item);
    ch.recv_waiters.wake_head();
    self.set_error(ErrorCode::None);
    Ok(())
  }

  /// Pops the oldest payload, waking one pending sender (a slot was freed)
  /// and, with `broadcast`, the head broadcaster (the all-channels-have-room
  /// predicate may now hold).
  pub(crate) fn try_recv_core(&mut self, id: ChannelId) -> Result<T, TryRecvError> {
    let Some(ch) = self.channel_mut(id) else {
      self.set_error(ErrorCode::NoChannel);
      return Err(TryRecvError::Closed);
    };
    let Some(item) = ch.buffer.pop_front() else {
      self.set_error(ErrorCode::WouldBlock);
      return Err(TryRecvError::Empty);
    };
    ch.send_waiters.wake_head();
    #[cfg(feature = "broadcast")]
    self.broadcast_waiters.wake_head();
    self.set_error(ErrorCode::None);
    Ok(item)
  }

  /// Appends one clone of `item` to every open channel, or reports why it
  /// cannot. The append is all-or-nothing: nothing is written unless every
  /// open channel has room.
  #[cfg(feature = "broadcast")]
  pub(crate) fn broadcast_core(&mut self, item: &T) -> Result<(), Blocked>
  where
    T: Clone,
  {
    let mut has_any = false;
    let mut all_have_room = true;
    for ch in self.slots.iter().flatten() {
      has_any = true;
      if !ch.has_room() {
        all_have_room = false;
        break;
      }
    }
    if !has_any {
      self.set_error(ErrorCode::NoChannel);
      return Err(Blocked::NoChannel);
    }
    if !all_have_room {
      self.set_error(ErrorCode::WouldBlock);
      return Err(Blocked::WouldBlock);
    }
    for ch in self.slots.iter_mut().flatten() {
      ch.buffer.push_back(item.clone());
      ch.recv_waiters.wake_head();
    }
    self.set_error(ErrorCode::None);
    Ok(())
  }

  /// Transfers as many leading items as fit right now, waking one pending
  /// receiver per item. Callers handle the empty-slice case.
  #[cfg(feature = "batch")]
  pub(crate) fn send_batch_core(&mut self, id: ChannelId, items: &[T]) -> Result<usize, Blocked>
  where
    T: Clone,
  {
    let Some(ch) = self.channel_mut(id) else {
      self.set_error(ErrorCode::NoChannel);
      return Err(Blocked::NoChannel);
    };
    if !ch.has_room() {
      self.set_error(ErrorCode::WouldBlock);
      return Err(Blocked::WouldBlock);
    }
    let room = ch.capacity - ch.buffer.len();
    let count = room.min(items.len());
    ch.buffer.extend(items[..count].iter().cloned());
    for _ in 0..count {
      ch.recv_waiters.wake_head();
    }
    self.set_error(ErrorCode::None);
    Ok(count)
  }

  /// Drains up to `out.len()` payloads, waking one pending sender per freed
  /// slot and, with `broadcast`, the head broadcaster once at the end.
  /// Callers handle the empty-slice case.
  #[cfg(feature = "batch")]
  pub(crate) fn recv_batch_core(&mut self, id: ChannelId, out: &mut [T]) -> Result<usize, Blocked> {
    let Some(ch) = self.channel_mut(id) else {
      self.set_error(ErrorCode::NoChannel);
      return Err(Blocked::NoChannel);
    };
    if ch.buffer.is_empty() {
      self.set_error(ErrorCode::WouldBlock);
      return Err(Blocked::WouldBlock);
    }
    let count = ch.buffer.len().min(out.len());
    for (slot, item) in out[..count].iter_mut().zip(ch.buffer.drain(..count)) {
      *slot = item;
    }
    for _ in 0..count {
      ch.send_waiters.wake_head();
    }
    #[cfg(feature = "broadcast")]
    self.broadcast_waiters.wake_head();
    self.set_error(ErrorCode::None);
    Ok(count)
  }

  /// Detaches a cancelled sender from `id`'s send queue. If a waker already
  /// detached it, the consumed wakeup is handed to the next waiter so the
  /// freed capacity is not lost to cancellation.
  pub(crate) fn release_send_waiter(&mut self, id: ChannelId, waiter: WaiterId) {
    if let Some(ch) = self.channel_mut(id) {
      if !ch.send_waiters.cancel(waiter) {
        ch.send_waiters.wake_head();
      }
    }
  }

  /// Mirror of [`release_send_waiter`](Self::release_send_waiter) for
  /// receivers.
  pub(crate) fn release_recv_waiter(&mut self, id: ChannelId, waiter: WaiterId) {
    if let Some(ch) = self.channel_mut(id) {
      if !ch.recv_waiters.cancel(waiter) {
        ch.recv_waiters.wake_head();
      }
    }
  }

  /// Mirror of [`release_send_waiter`](Self::release_send_waiter) for
  /// broadcasters parked on the bus-level queue.
  #[cfg(feature = "broadcast")]
  pub(crate) fn release_broadcast_waiter(&mut self, waiter: WaiterId) {
    if !self.broadcast_waiters.cancel(waiter) {
      self.broadcast_waiters.wake_head();
    }
  }
}

impl<T> Drop for BusCore<T> {
  fn drop(&mut self) {
    // Pending futures borrow the bus handle, so no waiter can still be
    // linked when the last handle goes away.
    debug_assert!(self
      .slots
      .iter()
      .flatten()
      .all(|ch| ch.send_waiters.is_empty() && ch.recv_waiters.is_empty()));
    let undelivered: usize = self.slots.iter().flatten().map(|ch| ch.buffer.len()).sum();
    if undelivered > 0 {
      tracing::debug!(undelivered, "bus dropped with undelivered payloads");
    }
  }
}
