use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll},
};

use futures::{
    future::{join_all, BoxFuture},
    FutureExt,
};
use futures_timer::Delay;
use tracing::{debug, trace};

use crate::{
    config::LoaderConfig,
    data::{group_keys, GroupedKey, KeyedEntry, Outcome, PendingKeys, Slots, Token as KeyToken},
    fetch::{Fetched, Fetcher},
    wakerset::{Token as WakerToken, WakerSet},
};

// Neither of a batch's mutexes is held across an await that waits on other
// tasks. Poisoning can't leave the state half-written: every transition is a
// single assignment.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct AccumulatingState<Key, F> {
    keys: PendingKeys<Key>,
    fetcher: Arc<F>,
    delay: Option<Delay>,
    wakers: WakerSet,
}

enum State<Key: GroupedKey, F: Fetcher<Key>> {
    Accum(AccumulatingState<Key, F>),
    Running(WakerSet),
    Done(Slots<F::Value, F::Error>),
}

impl<Key: GroupedKey, F: Fetcher<Key>> Debug for State<Key, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            State::Accum(state) => f
                .debug_struct("Accumulating")
                .field("keys", &state.keys.len())
                .field("armed", &state.delay.is_some())
                .field("waiting", &state.wakers.len())
                .finish(),
            State::Running(wakers) => f
                .debug_struct("Running")
                .field("waiting", &wakers.len())
                .finish(),
            State::Done(..) => f.write_str("Done"),
        }
    }
}

type FetchFuture<F, Key> = BoxFuture<
    'static,
    Slots<<F as Fetcher<Key>>::Value, <F as Fetcher<Key>>::Error>,
>;

struct Batch<Key: GroupedKey, F: Fetcher<Key>> {
    state: Mutex<State<Key, F>>,

    // Polled under its own lock, so that `Loader::load` only ever waits on
    // the short critical sections around `state`, never on fetch work. Set
    // once, when `state` leaves Accum; taken by whichever future completes it.
    fetch: Mutex<Option<FetchFuture<F, Key>>>,
}

impl<Key: GroupedKey, F: Fetcher<Key>> Batch<Key, F> {
    fn new(state: AccumulatingState<Key, F>) -> Self {
        Self {
            state: Mutex::new(State::Accum(state)),
            fetch: Mutex::new(None),
        }
    }
}

impl<Key: GroupedKey, F: Fetcher<Key>> Debug for Batch<Key, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*lock(&self.state), f)
    }
}

type SharedBatch<Key, F> = Arc<Batch<Key, F>>;

/// Run one batch: group the frozen keys by owner, fetch every group
/// concurrently, and place each result in the slot of every position that
/// asked for it.
fn dispatch<Key, F>(fetcher: Arc<F>, keys: Vec<Key>) -> FetchFuture<F, Key>
where
    Key: GroupedKey,
    F: Fetcher<Key>,
{
    async move {
        let groups = group_keys(&keys);
        debug!(keys = keys.len(), groups = groups.len(), "dispatching batch");

        let outcomes = join_all(
            groups
                .iter()
                .map(|group| fetcher.fetch_entries(&group.owner, &group.items)),
        )
        .await;

        let mut slots = Slots::with_len(keys.len());

        for (group, outcome) in groups.iter().zip(outcomes) {
            match outcome {
                Err(err) => {
                    for &position in &group.positions {
                        slots.fill(position, Err(err.clone()));
                    }
                }
                Ok(entries) => {
                    let mut by_item: HashMap<&Key::Item, Result<&F::Value, &F::Error>> =
                        HashMap::with_capacity(entries.len());

                    for entry in &entries {
                        let (item, outcome) = match entry {
                            Fetched::Value(value) => (value.get_key(), Ok(value)),
                            Fetched::Failed(item, err) => (item, Err(err)),
                        };
                        by_item.entry(item).or_insert(outcome);
                    }

                    // Positions with no matching entry stay empty, which
                    // reads back as Ok(None).
                    for &position in &group.positions {
                        match by_item.get(keys[position].item()) {
                            Some(&Ok(value)) => slots.fill(position, Ok(Some(value.clone()))),
                            Some(&Err(err)) => slots.fill(position, Err(err.clone())),
                            None => {}
                        }
                    }
                }
            }
        }

        slots
    }
    .boxed()
}

/// A `Loader` coalesces point lookups into grouped fetches. It is meant to
/// live for a single request: create one per request, share it by reference
/// (or `Arc`) with every resolver, and drop it when the request ends.
///
/// Keys passed to [`load`](Loader::load) accumulate in the current batch.
/// The first key of a batch arms its window timer; when the window expires,
/// (or the configured `max_keys` is reached) the batch closes, its keys are
/// grouped by owner, and the [`Fetcher`] is called once per owner. Each
/// [`LoadFuture`] then resolves with the outcome for its own key.
///
/// A batch is dispatched exactly once. Keys loaded after a batch has closed
/// are never added to it; they open a new batch with a fresh window.
pub struct Loader<Key: GroupedKey, F: Fetcher<Key>> {
    fetcher: Arc<F>,
    config: LoaderConfig,

    // Weak, so that a batch abandoned by all of its futures is freed rather
    // than kept around for the next key.
    current: Mutex<Weak<Batch<Key, F>>>,
}

impl<Key: GroupedKey, F: Fetcher<Key>> Debug for Loader<Key, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("current", &lock(&self.current).upgrade())
            .finish()
    }
}

impl<Key: GroupedKey, F: Fetcher<Key>> Loader<Key, F> {
    pub fn new(fetcher: F, config: LoaderConfig) -> Self {
        Self::with_shared_fetcher(Arc::new(fetcher), config)
    }

    pub fn with_shared_fetcher(fetcher: Arc<F>, config: LoaderConfig) -> Self {
        Self {
            fetcher,
            config,
            current: Mutex::new(Weak::new()),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Enqueue a key and return a future for its outcome: `Ok(Some(value))`
    /// if the item was found, `Ok(None)` if it wasn't, or the error of the
    /// failed fetch for the key's owner.
    ///
    /// The same key may be loaded any number of times; each call gets its own
    /// result, but the item is fetched once per batch.
    pub fn load(&self, key: Key) -> LoadFuture<Key, F> {
        let mut current = lock(&self.current);

        // Join the open batch if there is one. We don't check the clock
        // here: if the window has expired, the next poll of any of its
        // futures closes it, and until then it still accepts keys.
        if let Some(batch) = current.upgrade() {
            let mut state = lock(&batch.state);
            if let State::Accum(ref mut accum) = *state {
                let key_token = accum.keys.add_key(key);

                // If we've hit the key limit:
                // - Clear the timer
                // - Wake the driver so it dispatches right away
                // - Detach the batch from the loader
                match self.config.max_keys {
                    Some(max_keys) if accum.keys.len() >= max_keys.get() => {
                        debug!(keys = accum.keys.len(), "key limit reached, closing batch");
                        accum.delay = None;
                        accum.wakers.wake_driver();
                        drop(state);
                        *current = Weak::new();
                    }
                    _ => drop(state),
                }

                return LoadFuture::new(key_token, batch);
            }

            trace!("batch already closed, opening a new one");
        }

        let mut keys = PendingKeys::new();
        let key_token = keys.add_key(key);

        let immediate = matches!(self.config.max_keys, Some(max_keys) if max_keys.get() <= 1);

        let batch = Arc::new(Batch::new(AccumulatingState {
            keys,
            fetcher: Arc::clone(&self.fetcher),
            delay: if immediate {
                None
            } else {
                Some(Delay::new(self.config.window))
            },
            wakers: WakerSet::default(),
        }));

        if !immediate {
            *current = Arc::downgrade(&batch);
        }

        LoadFuture::new(key_token, batch)
    }

    /// Load several keys into the same batch and wait for all of them.
    /// Outcomes are returned in the order of `keys`.
    pub async fn load_many(
        &self,
        keys: impl IntoIterator<Item = Key>,
    ) -> Vec<Outcome<F::Value, F::Error>> {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }
}

/// A request for a single key, sharing its batch with every other key
/// loaded in the same window. Created by [`Loader::load`].
///
/// There is no background task: awaiting these futures is what drives the
/// batch. Only one of them (the most recent to be polled) is woken by the
/// window timer and the fetch; the rest are woken once, when results are
/// ready. Dropping a `LoadFuture` abandons the wait without disturbing the
/// others; its key is still fetched if the batch already holds it.
///
/// # Panics
///
/// Like most futures, a `LoadFuture` must not be polled again after it has
/// returned `Poll::Ready`. Doing so panics.
pub struct LoadFuture<Key: GroupedKey, F: Fetcher<Key>> {
    key_token: KeyToken,
    waker_token: Option<WakerToken>,
    state: Option<SharedBatch<Key, F>>,
}

impl<Key: GroupedKey, F: Fetcher<Key>> LoadFuture<Key, F> {
    fn new(key_token: KeyToken, state: SharedBatch<Key, F>) -> Self {
        Self {
            key_token,
            waker_token: None,
            state: Some(state),
        }
    }
}

impl<Key: GroupedKey, F: Fetcher<Key>> Debug for LoadFuture<Key, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture")
            .field("position", &self.key_token.index())
            .field("state", &self.state)
            .finish()
    }
}

impl<Key: GroupedKey, F: Fetcher<Key>> Future for LoadFuture<Key, F> {
    type Output = Outcome<F::Value, F::Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let batch = Arc::clone(
            this.state
                .as_ref()
                .expect("Can't re-poll a completed LoadFuture"),
        );
        let mut state = lock(&batch.state);

        if let State::Accum(ref mut accum) = *state {
            if let Some(ref mut delay) = accum.delay {
                if delay.poll_unpin(ctx).is_pending() {
                    // This task now owns the timer's wakeup, so it becomes
                    // the driver.
                    accum.wakers.upsert(&mut this.waker_token, ctx.waker());
                    return Poll::Pending;
                }
            }

            // The window is closed. Freeze the keys and the waiting set and
            // start the fetch; this transition happens once per batch. No one
            // can be holding the fetch lock yet, since it's only reachable
            // once `state` is Running.
            let keys = accum.keys.take();
            let wakers = mem::take(&mut accum.wakers);
            *lock(&batch.fetch) = Some(dispatch(Arc::clone(&accum.fetcher), keys));

            *state = State::Running(wakers);
        }

        match *state {
            State::Running(ref mut wakers) => wakers.upsert(&mut this.waker_token, ctx.waker()),
            State::Done(ref mut slots) => {
                let outcome = slots.take(&this.key_token);
                drop(state);
                this.waker_token = None;
                this.state = None;
                return Poll::Ready(outcome);
            }
            State::Accum(..) => unreachable!("LoadFuture found its batch in an invalid state"),
        }

        drop(state);

        let mut slots = {
            let mut fetch = lock(&batch.fetch);
            let slots = match *fetch {
                // Another future completed the fetch after we registered our
                // waker, and it wakes us once the slots are in place.
                None => return Poll::Pending,
                Some(ref mut fut) => match fut.poll_unpin(ctx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(slots) => slots,
                },
            };
            *fetch = None;
            slots
        };

        // Every slot is filled; release all the waiters at once. We're
        // about to read our own slot, so we don't need waking.
        let outcome = slots.take(&this.key_token);

        let wakers = match mem::replace(&mut *lock(&batch.state), State::Done(slots)) {
            State::Running(wakers) => wakers,
            _ => unreachable!("only the future that completes the fetch leaves Running"),
        };

        match this.waker_token.take() {
            Some(token) => wakers.discard_wake_all(token),
            None => wakers.wake_all(),
        }

        this.state = None;
        Poll::Ready(outcome)
    }
}

impl<Key: GroupedKey, F: Fetcher<Key>> Drop for LoadFuture<Key, F> {
    fn drop(&mut self) {
        // If this future was the driver, another waiter has to take over,
        // or the batch would stall. WakerSet::discard_and_wake handles that.
        if let Some(batch) = self.state.take() {
            let mut state = lock(&batch.state);
            match *state {
                State::Accum(AccumulatingState {
                    ref mut wakers, ..
                })
                | State::Running(ref mut wakers) => {
                    if let Some(token) = self.waker_token.take() {
                        wakers.discard_and_wake(token);
                    }
                }
                State::Done(ref mut slots) => slots.discard(&self.key_token),
            }
        }
    }
}
