// src/error.rs

//! Error types for bus operations.
//!
//! Every operation additionally records an [`ErrorCode`] on the bus (success
//! included), so callers that branch on `Result` alone and callers that poll
//! [`Bus::last_error`](crate::Bus::last_error) observe the same outcome.

use core::fmt;

/// The per-bus error indicator, written by every operation on every return
/// path.
///
/// This is the bus-wide "last outcome" cell: read it right after the call it
/// describes and before issuing another bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
  /// The previous operation completed.
  #[default]
  None,
  /// The descriptor does not name an open channel, or (for broadcast) the
  /// bus has no open channels.
  NoChannel,
  /// The operation could not complete without suspending.
  WouldBlock,
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorCode::None => f.write_str("none"),
      ErrorCode::NoChannel => f.write_str("no channel"),
      ErrorCode::WouldBlock => f.write_str("would block"),
    }
  }
}

/// Error returned by [`try_send`](crate::Bus::try_send). The rejected item is
/// handed back to the caller.
#[derive(PartialEq, Eq, Clone)]
pub enum TrySendError<T> {
  /// The channel buffer is at capacity.
  Full(T),
  /// The descriptor does not name an open channel.
  Closed(T),
}

impl<T> TrySendError<T> {
  /// Consumes the error, returning the rejected item.
  #[inline]
  pub fn into_inner(self) -> T {
    match self {
      TrySendError::Full(v) | TrySendError::Closed(v) => v,
    }
  }
}

impl<T> fmt::Debug for TrySendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrySendError::Full(_) => write!(f, "TrySendError::Full(..)"),
      TrySendError::Closed(_) => write!(f, "TrySendError::Closed(..)"),
    }
  }
}

impl<T> fmt::Display for TrySendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrySendError::Full(_) => f.write_str("channel full"),
      TrySendError::Closed(_) => f.write_str("channel closed"),
    }
  }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

/// Error returned by the awaiting [`send`](crate::Bus::send) (and, with the
/// `batch` feature, [`send_batch`](crate::Bus::send_batch)).
///
/// A suspended sender only fails when the channel disappears underneath it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SendError {
  /// The channel was closed, either before the first attempt or while the
  /// sender was suspended.
  Closed,
}

impl std::error::Error for SendError {}
impl fmt::Display for SendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SendError::Closed => f.write_str("channel closed"),
    }
  }
}

/// Error returned by [`try_recv`](crate::Bus::try_recv).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
  /// The channel buffer holds no payloads.
  Empty,
  /// The descriptor does not name an open channel.
  Closed,
}

impl std::error::Error for TryRecvError {}
impl fmt::Display for TryRecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryRecvError::Empty => f.write_str("channel empty"),
      TryRecvError::Closed => f.write_str("channel closed"),
    }
  }
}

/// Error returned by the awaiting [`recv`](crate::Bus::recv) (and, with the
/// `batch` feature, [`recv_batch`](crate::Bus::recv_batch)).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvError {
  /// The channel was closed, either before the first attempt or while the
  /// receiver was suspended.
  Closed,
}

impl std::error::Error for RecvError {}
impl fmt::Display for RecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvError::Closed => f.write_str("channel closed"),
    }
  }
}

/// Error returned by [`try_broadcast`](crate::Bus::try_broadcast). The
/// rejected item is handed back to the caller.
#[cfg(feature = "broadcast")]
#[derive(PartialEq, Eq, Clone)]
pub enum TryBroadcastError<T> {
  /// At least one open channel is at capacity, so the atomic append cannot
  /// happen now.
  Full(T),
  /// The bus has no open channels.
  NoChannels(T),
}

#[cfg(feature = "broadcast")]
impl<T> TryBroadcastError<T> {
  /// Consumes the error, returning the rejected item.
  #[inline]
  pub fn into_inner(self) -> T {
    match self {
      TryBroadcastError::Full(v) | TryBroadcastError::NoChannels(v) => v,
    }
  }
}

#[cfg(feature = "broadcast")]
impl<T> fmt::Debug for TryBroadcastError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryBroadcastError::Full(_) => write!(f, "TryBroadcastError::Full(..)"),
      TryBroadcastError::NoChannels(_) => write!(f, "TryBroadcastError::NoChannels(..)"),
    }
  }
}

#[cfg(feature = "broadcast")]
impl<T> fmt::Display for TryBroadcastError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryBroadcastError::Full(_) => f.write_str("a channel is full"),
      TryBroadcastError::NoChannels(_) => f.write_str("bus has no open channels"),
    }
  }
}

#[cfg(feature = "broadcast")]
impl<T: fmt::Debug> std::error::Error for TryBroadcastError<T> {}

/// Error returned by the awaiting [`broadcast`](crate::Bus::broadcast).
#[cfg(feature = "broadcast")]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BroadcastError {
  /// The bus has no open channels. This also surfaces when the channel set
  /// shrank to zero while the broadcaster was suspended.
  NoChannels,
}

#[cfg(feature = "broadcast")]
impl std::error::Error for BroadcastError {}
#[cfg(feature = "broadcast")]
impl fmt::Display for BroadcastError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BroadcastError::NoChannels => f.write_str("bus has no open channels"),
    }
  }
}

/// Error returned by [`try_send_batch`](crate::Bus::try_send_batch).
///
/// Batch operations borrow the caller's slice, so there is no item to hand
/// back.
#[cfg(feature = "batch")]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TrySendBatchError {
  /// The channel buffer is at capacity; not even a partial transfer fits.
  Full,
  /// The descriptor does not name an open channel.
  Closed,
}

#[cfg(feature = "batch")]
impl std::error::Error for TrySendBatchError {}
#[cfg(feature = "batch")]
impl fmt::Display for TrySendBatchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrySendBatchError::Full => f.write_str("channel full"),
      TrySendBatchError::Closed => f.write_str("channel closed"),
    }
  }
}

/// Error returned by [`try_recv_batch`](crate::Bus::try_recv_batch).
#[cfg(feature = "batch")]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvBatchError {
  /// The channel buffer holds no payloads.
  Empty,
  /// The descriptor does not name an open channel.
  Closed,
}

#[cfg(feature = "batch")]
impl std::error::Error for TryRecvBatchError {}
#[cfg(feature = "batch")]
impl fmt::Display for TryRecvBatchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryRecvBatchError::Empty => f.write_str("channel empty"),
      TryRecvBatchError::Closed => f.write_str("channel closed"),
    }
  }
}
