#![cfg(feature = "broadcast")]

mod common;
use common::*;

use std::cell::Cell;
use std::rc::Rc;

use omnibus::{BroadcastError, Bus, ErrorCode, TryBroadcastError};
use tokio::task;

// Scenario: a broadcast suspends until the slowest channel has room, then
// appends to every channel at once.
#[tokio::test]
async fn broadcast_waits_for_the_slowest_channel() {
  run_local(async {
    let bus = Bus::new();
    let a = bus.open(1);
    let b = bus.open(1);
    bus.try_send(a, 7).unwrap();

    let done = Rc::new(Cell::new(false));
    let broadcaster = {
      let bus = bus.clone();
      let done = Rc::clone(&done);
      task::spawn_local(async move {
        bus.broadcast(9).await.unwrap();
        done.set(true);
      })
    };
    breathe().await;
    assert!(!done.get());
    assert_eq!(bus.len(b), Some(0));

    assert_eq!(bus.recv(a).await.unwrap(), 7);
    breathe().await;
    assert!(done.get());
    broadcaster.await.unwrap();

    assert_eq!(bus.try_recv(a).unwrap(), 9);
    assert_eq!(bus.try_recv(b).unwrap(), 9);
  })
  .await;
}

#[test]
fn broadcast_to_an_empty_bus_fails_immediately() {
  let bus: Bus<u32> = Bus::new();
  assert!(matches!(bus.try_broadcast(1), Err(TryBroadcastError::NoChannels(1))));
  assert_eq!(bus.last_error(), ErrorCode::NoChannel);

  // A channel that existed once does not count.
  let ch = bus.open(1);
  bus.close(ch);
  assert!(matches!(bus.try_broadcast(2), Err(TryBroadcastError::NoChannels(2))));
  assert_eq!(bus.last_error(), ErrorCode::NoChannel);
}

// Scenario: the channel set shrinks to nothing while a broadcaster is
// suspended; it must fail rather than silently succeed.
#[tokio::test]
async fn broadcast_aborts_when_all_channels_vanish() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(1);
    bus.try_send(ch, 1).unwrap();

    let broadcaster = {
      let bus = bus.clone();
      task::spawn_local(async move { bus.broadcast(2).await })
    };
    breathe().await;

    bus.close(ch);
    assert_eq!(broadcaster.await.unwrap(), Err(BroadcastError::NoChannels));
    assert_eq!(bus.last_error(), ErrorCode::NoChannel);
  })
  .await;
}

#[tokio::test]
async fn broadcast_reaches_every_open_channel() {
  run_local(async {
    let bus = Bus::new();
    let channels: Vec<_> = (0..3).map(|_| bus.open(2)).collect();

    let receivers: Vec<_> = channels
      .iter()
      .map(|&ch| {
        let bus = bus.clone();
        task::spawn_local(async move { bus.recv(ch).await.unwrap() })
      })
      .collect();
    breathe().await;

    bus.broadcast(42u32).await.unwrap();
    for receiver in receivers {
      assert_eq!(receiver.await.unwrap(), 42);
    }
  })
  .await;
}

#[tokio::test]
async fn waiting_broadcasters_complete_in_arrival_order() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(1);
    bus.try_send(ch, 0).unwrap();

    let order = Rc::new(std::cell::RefCell::new(Vec::new()));
    let broadcasters: Vec<_> = (1..=2u32)
      .map(|i| {
        let bus = bus.clone();
        let order = Rc::clone(&order);
        task::spawn_local(async move {
          bus.broadcast(i).await.unwrap();
          order.borrow_mut().push(i);
        })
      })
      .collect();
    breathe().await;

    // Each receive admits exactly the head broadcaster.
    assert_eq!(bus.recv(ch).await.unwrap(), 0);
    breathe().await;
    assert_eq!(*order.borrow(), [1]);

    assert_eq!(bus.recv(ch).await.unwrap(), 1);
    breathe().await;
    assert_eq!(*order.borrow(), [1, 2]);

    for broadcaster in broadcasters {
      broadcaster.await.unwrap();
    }
    assert_eq!(bus.try_recv(ch).unwrap(), 2);
  })
  .await;
}
