mod common;
use common::*;

use omnibus::{Bus, RecvError, SendError, TryRecvError, TrySendError};

use futures_util::StreamExt;
use tokio::task;

// Scenario: a producer pushes through a capacity-2 channel while a consumer
// drains it; back-pressure suspends the producer, order is preserved.
#[tokio::test]
async fn bounded_backpressure_preserves_order() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(2);

    let producer = {
      let bus = bus.clone();
      task::spawn_local(async move {
        for i in 1..=4u32 {
          bus.send(ch, i).await.unwrap();
        }
      })
    };

    let mut received = Vec::new();
    for _ in 0..4 {
      received.push(bus.recv(ch).await.unwrap());
    }
    producer.await.unwrap();

    assert_eq!(received, [1, 2, 3, 4]);
    assert_eq!(bus.is_empty(ch), Some(true));
  })
  .await;
}

#[tokio::test]
async fn payload_order_is_fifo_under_contention() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(3);

    let producer = {
      let bus = bus.clone();
      task::spawn_local(async move {
        for i in 0..100u32 {
          bus.send(ch, i).await.unwrap();
        }
      })
    };

    let mut got = Vec::new();
    for _ in 0..100 {
      got.push(bus.recv(ch).await.unwrap());
    }
    producer.await.unwrap();
    assert_eq!(got, (0..100).collect::<Vec<_>>());
  })
  .await;
}

#[test]
fn try_variants_do_not_disturb_state() {
  let bus = Bus::new();
  let ch = bus.open(1);

  assert_eq!(bus.try_recv(ch), Err(TryRecvError::Empty));
  bus.try_send(ch, 1).unwrap();
  assert!(matches!(bus.try_send(ch, 2), Err(TrySendError::Full(2))));
  assert_eq!(bus.len(ch), Some(1));
  assert_eq!(bus.try_recv(ch), Ok(1));
  assert_eq!(bus.is_empty(ch), Some(true));
}

// Scenario: a sender suspended on a full channel is failed, not stranded,
// when the channel goes away.
#[tokio::test]
async fn close_fails_a_suspended_sender() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(1);
    bus.try_send(ch, 1).unwrap();

    let sender = {
      let bus = bus.clone();
      task::spawn_local(async move { bus.send(ch, 2).await })
    };
    breathe().await;

    bus.close(ch);
    assert_eq!(sender.await.unwrap(), Err(SendError::Closed));
  })
  .await;
}

#[tokio::test]
async fn close_fails_every_suspended_receiver() {
  run_local(async {
    let bus: Bus<u32> = Bus::new();
    let ch = bus.open(1);

    let receivers: Vec<_> = (0..3)
      .map(|_| {
        let bus = bus.clone();
        task::spawn_local(async move { bus.recv(ch).await })
      })
      .collect();
    breathe().await;

    bus.close(ch);
    for receiver in receivers {
      assert_eq!(receiver.await.unwrap(), Err(RecvError::Closed));
    }
  })
  .await;
}

// Each receive frees one slot and admits exactly one suspended sender, so a
// line of producers drains through a capacity-1 channel in arrival order.
#[tokio::test]
async fn suspended_senders_drain_one_slot_at_a_time() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(1);
    bus.try_send(ch, 0).unwrap();

    let senders: Vec<_> = (1..=3u32)
      .map(|i| {
        let bus = bus.clone();
        task::spawn_local(async move { bus.send(ch, i).await.unwrap() })
      })
      .collect();
    breathe().await;

    let mut got = Vec::new();
    for _ in 0..4 {
      got.push(bus.recv(ch).await.unwrap());
      breathe().await;
    }
    for sender in senders {
      sender.await.unwrap();
    }
    assert_eq!(got, [0, 1, 2, 3]);
  })
  .await;
}

#[tokio::test]
async fn incoming_streams_until_close() {
  run_local(async {
    let bus = Bus::new();
    let ch = bus.open(4);

    let collector = {
      let bus = bus.clone();
      task::spawn_local(async move { bus.incoming(ch).collect::<Vec<u32>>().await })
    };

    for i in 0..5u32 {
      bus.send(ch, i).await.unwrap();
    }
    breathe().await;
    bus.close(ch);

    assert_eq!(collector.await.unwrap(), vec![0, 1, 2, 3, 4]);
  })
  .await;
}
