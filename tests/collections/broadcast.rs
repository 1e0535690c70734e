//! BroadcastQueue Tests
//!
//! Tests for multi-reader delivery and blocking reads across threads.

use crate::common::*;
use std::sync::mpsc;
use std::thread;
use strata_primitives::{BroadcastEndpoint, BroadcastQueue};

fn take(endpoint: &BroadcastEndpoint<i32>, block: bool) -> Result<i32> {
    atomically(|tx| endpoint.get(tx, block))
}

#[test]
fn put_put_get_get_then_retry() {
    init_tracing();
    let queue = BroadcastQueue::new();
    let endpoint = atomically(|tx| queue.new_endpoint(tx)).unwrap();
    atomically(|tx| queue.put(tx, 1)).unwrap();
    atomically(|tx| queue.put(tx, 2)).unwrap();

    assert_eq!(take(&endpoint, true).unwrap(), 1);
    assert_eq!(take(&endpoint, true).unwrap(), 2);

    let third = atomically(|tx| {
        tx.or(
            |tx| endpoint.get(tx, true).map(Some),
            |_| Ok(None),
        )
    })
    .unwrap();
    assert_eq!(third, None);
    assert!(matches!(take(&endpoint, false), Err(Error::Empty)));
}

#[test]
fn every_consumer_receives_every_item() {
    const CONSUMERS: usize = 3;
    const ITEMS: i32 = 100;

    let queue = BroadcastQueue::new();
    let endpoints: Vec<_> = (0..CONSUMERS)
        .map(|_| atomically(|tx| queue.new_endpoint(tx)).unwrap())
        .collect();

    let (sender, receiver) = mpsc::channel();
    let consumers: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| {
            let sender = sender.clone();
            thread::spawn(move || {
                let items: Vec<i32> = (0..ITEMS).map(|_| take(&endpoint, true).unwrap()).collect();
                sender.send(items).unwrap();
            })
        })
        .collect();

    for i in 0..ITEMS {
        atomically(|tx| queue.put(tx, i)).unwrap();
    }
    for consumer in consumers {
        consumer.join().unwrap();
    }

    let expected: Vec<i32> = (0..ITEMS).collect();
    for _ in 0..CONSUMERS {
        assert_eq!(receiver.recv_timeout(WAIT_LIMIT).unwrap(), expected);
    }
    assert_eq!(atomically(|tx| queue.written(tx)).unwrap(), ITEMS as usize);
}

#[test]
fn shared_endpoint_splits_work() {
    let queue = BroadcastQueue::new();
    let endpoint = atomically(|tx| queue.new_endpoint(tx)).unwrap();
    atomically(|tx| {
        for i in 0..200 {
            queue.put(tx, i)?;
        }
        Ok(())
    })
    .unwrap();

    let (sender, receiver) = mpsc::channel();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let endpoint = endpoint.clone();
            let sender = sender.clone();
            thread::spawn(move || {
                while let Ok(item) = take(&endpoint, false) {
                    sender.send(item).unwrap();
                }
            })
        })
        .collect();
    drop(sender);
    for worker in workers {
        worker.join().unwrap();
    }

    let mut items: Vec<i32> = receiver.iter().collect();
    items.sort_unstable();
    assert_eq!(items, (0..200).collect::<Vec<_>>());
    assert_eq!(atomically(|tx| endpoint.remaining(tx)).unwrap(), 0);
}

#[test]
fn put_and_cell_write_commit_together() {
    let queue = BroadcastQueue::new();
    let endpoint = atomically(|tx| queue.new_endpoint(tx)).unwrap();
    let sent = TVar::new(0);

    let result: Result<()> = atomically(|tx| {
        queue.put(tx, 1)?;
        sent.modify(tx, |n| n + 1)?;
        Err(StmError::Abort(Error::internal("rolled back")))
    });
    assert!(result.is_err());
    assert!(atomically(|tx| endpoint.is_empty(tx)).unwrap());
    assert_eq!(value_of(&sent), 0);
}

#[test]
fn peek_with_blocking_waits_for_item() {
    let queue = BroadcastQueue::new();
    let endpoint = atomically(|tx| queue.new_endpoint(tx)).unwrap();
    let (sender, receiver) = mpsc::channel();

    let reader = endpoint.clone();
    let handle = thread::spawn(move || {
        let peeked = atomically(|tx| reader.peek(tx, true)).unwrap();
        sender.send(peeked).unwrap();
    });

    thread::sleep(std::time::Duration::from_millis(50));
    atomically(|tx| queue.put(tx, 11)).unwrap();
    assert_eq!(receiver.recv_timeout(WAIT_LIMIT).unwrap(), 11);
    handle.join().unwrap();

    assert_eq!(atomically(|tx| endpoint.remaining(tx)).unwrap(), 1);
    assert_eq!(take(&endpoint, false).unwrap(), 11);
}
