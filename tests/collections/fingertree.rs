//! Finger Tree Tests
//!
//! Tests for persistent sequences shared between threads and stored in
//! cells.

use crate::common::*;
use std::thread;
use strata_fingertree::{FingerTree, ItemCount, MinMax};

#[test]
fn tree_in_cell_keeps_old_versions_intact() {
    let tree: FingerTree<ItemCount<u32>> = (0..1_000).collect();
    let cell = TVar::new(tree.clone());

    atomically(|tx| {
        cell.modify(tx, |t| {
            let (left, right) = t.split_at(500);
            right.append(&left)
        })
    })
    .unwrap();

    let rotated = value_of(&cell);
    assert_eq!(rotated.get(0), Some(&500));
    assert_eq!(rotated.get(999), Some(&499));
    assert_eq!(tree.get(0), Some(&0));
    assert_eq!(tree.len(), 1_000);
}

#[test]
fn trees_are_shared_across_threads() {
    let tree: FingerTree<ItemCount<usize>> = (0..10_000).collect();

    let handles: Vec<_> = (0..4)
        .map(|part| {
            let tree = tree.clone();
            thread::spawn(move || {
                let (_, rest) = tree.split_at(part * 2_500);
                let (chunk, _) = rest.split_at(2_500);
                chunk.iter().sum::<usize>()
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, (0..10_000).sum::<usize>());
}

#[test]
fn compound_measure_tracks_bounds() {
    let measure = (ItemCount::<i64>::new(), MinMax::<i64>::measure());
    let tree = FingerTree::from_items(measure, vec![5, -3, 12, 7, 0]);
    assert_eq!(tree.annotation(), (5, Some((-3, 12))));

    let (left, right) = tree.partition(|(n, _)| *n > 2);
    assert_eq!(left.annotation(), (2, Some((-3, 5))));
    assert_eq!(right.annotation(), (3, Some((0, 12))));
}
