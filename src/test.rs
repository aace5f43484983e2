#![cfg(test)]

use crate::{
    data::{group_keys, KeyGroup, PendingKeys, Slots},
    Fetched, Fetcher, Loader, LoaderConfig,
};
use async_trait::async_trait;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    task::{Context, Poll},
    time::Duration,
};

use futures::{executor, future, task::noop_waker, FutureExt};

/// Fetches `item * 10` for every requested item, and counts its calls.
#[derive(Default)]
struct TimesTen {
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher<(u32, u32)> for TimesTen {
    type Value = (u32, u32);
    type Error = ();

    async fn fetch(&self, _owner: &u32, items: &[u32]) -> Result<Vec<(u32, u32)>, ()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(items.iter().map(|&item| (item, item * 10)).collect())
    }
}

fn config() -> LoaderConfig {
    LoaderConfig::default().with_window(Duration::from_millis(1))
}

#[test]
fn group_by_owner() {
    let keys = vec![("u1", "a1"), ("u1", "a2"), ("u2", "a1")];

    assert_eq!(
        group_keys(&keys),
        vec![
            KeyGroup {
                owner: "u1",
                items: vec!["a1", "a2"],
                positions: vec![0, 1],
            },
            KeyGroup {
                owner: "u2",
                items: vec!["a1"],
                positions: vec![2],
            },
        ]
    );
}

#[test]
fn group_dedups_items_but_keeps_positions() {
    let keys = vec![(1, 7), (2, 3), (1, 7), (1, 8), (1, 7)];
    let groups = group_keys(&keys);

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].owner, 1);
    assert_eq!(groups[0].items, vec![7, 8]);
    assert_eq!(groups[0].positions, vec![0, 2, 3, 4]);
    assert_eq!(groups[1].items, vec![3]);
    assert_eq!(groups[1].positions, vec![1]);
}

#[test]
fn group_empty() {
    let keys: Vec<(u32, u32)> = Vec::new();
    assert!(group_keys(&keys).is_empty());
}

#[test]
fn tokens_follow_enqueue_order() {
    let mut keys = PendingKeys::new();
    let first = keys.add_key((1, 1));
    let second = keys.add_key((1, 1));
    let third = keys.add_key((2, 5));

    assert_eq!(first.index(), 0);
    assert_eq!(second.index(), 1);
    assert_eq!(third.index(), 2);
    assert_eq!(keys.len(), 3);

    assert_eq!(keys.take(), vec![(1, 1), (1, 1), (2, 5)]);
    assert_eq!(keys.len(), 0);
}

#[test]
fn unfilled_slots_are_absent() {
    let mut keys = PendingKeys::new();
    let found = keys.add_key(());
    let missing = keys.add_key(());
    let failed = keys.add_key(());

    let mut slots: Slots<&str, &str> = Slots::with_len(3);
    slots.fill(found.index(), Ok(Some("value")));
    slots.fill(failed.index(), Err("boom"));

    assert_eq!(slots.take(&found), Ok(Some("value")));
    assert_eq!(slots.take(&missing), Ok(None));
    assert_eq!(slots.take(&failed), Err("boom"));

    // A slot can only be taken once.
    assert_eq!(slots.take(&found), Ok(None));
}

#[test]
fn simple_test() {
    let loader = Loader::new(TimesTen::default(), config());

    let fut1 = loader.load((1, 1));
    let fut2 = loader.load((1, 2));

    let (res1, res2) = executor::block_on(future::join(fut1, fut2));

    assert_eq!(res1, Ok(Some((1, 10))));
    assert_eq!(res2, Ok(Some((2, 20))));
    assert_eq!(loader.fetcher().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn one_fetch_per_owner() {
    let loader = Loader::new(TimesTen::default(), config());

    let results = executor::block_on(loader.load_many(vec![(1, 1), (2, 2), (1, 3), (3, 4)]));

    assert_eq!(
        results,
        vec![
            Ok(Some((1, 10))),
            Ok(Some((2, 20))),
            Ok(Some((3, 30))),
            Ok(Some((4, 40))),
        ]
    );
    assert_eq!(loader.fetcher().calls.load(Ordering::SeqCst), 3);
}

#[test]
fn unused_loader_never_fetches() {
    let loader = Loader::new(TimesTen::default(), config());
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(loader.fetcher().calls.load(Ordering::SeqCst), 0);
}

/// Like TimesTen, but odd items fail on their own.
struct OddsFail;

#[async_trait]
impl Fetcher<(u32, u32)> for OddsFail {
    type Value = (u32, u32);
    type Error = u32;

    async fn fetch(&self, _owner: &u32, items: &[u32]) -> Result<Vec<(u32, u32)>, u32> {
        Ok(items.iter().map(|&item| (item, item * 10)).collect())
    }

    async fn fetch_entries(
        &self,
        _owner: &u32,
        items: &[u32],
    ) -> Result<Vec<Fetched<u32, (u32, u32), u32>>, u32> {
        Ok(items
            .iter()
            .map(|&item| match item % 2 {
                0 => Fetched::Value((item, item * 10)),
                _ => Fetched::Failed(item, item),
            })
            .collect())
    }
}

#[test]
fn failed_entries_only_fail_their_item() {
    let loader = Loader::new(OddsFail, config());

    let results = executor::block_on(loader.load_many(vec![(1, 1), (1, 2), (1, 3), (1, 2)]));

    assert_eq!(
        results,
        vec![Err(1), Ok(Some((2, 20))), Err(3), Ok(Some((2, 20)))]
    );
}

#[test]
#[should_panic(expected = "Can't re-poll a completed LoadFuture")]
fn poll_after_ready_panics() {
    let loader = Loader::new(TimesTen::default(), config().with_max_keys(1));

    let waker = noop_waker();
    let mut ctx = Context::from_waker(&waker);

    let mut fut = loader.load((1, 1));
    assert_eq!(fut.poll_unpin(&mut ctx), Poll::Ready(Ok(Some((1, 10)))));

    let _ = fut.poll_unpin(&mut ctx);
}
