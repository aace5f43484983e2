//! Data structures for passing keys into and results out of a batch.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::mem;

/// Position of a single `load` call inside its batch. Each call gets its own
/// token, even when it repeats a key that is already pending.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct Token(usize);

impl Token {
    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.0
    }
}

/// A key that can be batched by a shared owner. All keys with the same
/// `owner` are fetched together in a single call, so the owner should be
/// whatever scopes a single backing-store query (for instance, a user id).
pub trait GroupedKey: Send + Sync + 'static {
    type Owner: Hash + Eq + Clone + Send + Sync + 'static;
    type Item: Hash + Eq + Clone + Send + Sync + 'static;

    fn owner(&self) -> &Self::Owner;
    fn item(&self) -> &Self::Item;
}

impl<Owner, Item> GroupedKey for (Owner, Item)
where
    Owner: Hash + Eq + Clone + Send + Sync + 'static,
    Item: Hash + Eq + Clone + Send + Sync + 'static,
{
    type Owner = Owner;
    type Item = Item;

    #[inline]
    fn owner(&self) -> &Owner {
        &self.0
    }

    #[inline]
    fn item(&self) -> &Item {
        &self.1
    }
}

/// Trait for values returned by a fetch, which can be matched back to the
/// item id they were requested by.
pub trait KeyedEntry<Key: ?Sized> {
    fn get_key(&self) -> &Key;
}

impl<Key, Value> KeyedEntry<Key> for (Key, Value) {
    #[inline]
    fn get_key(&self) -> &Key {
        &self.0
    }
}

/// All the item ids requested under one owner, plus the batch positions
/// that asked for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup<Owner, Item> {
    /// The shared owner of every key in this group.
    pub owner: Owner,

    /// Unique item ids, in the order they were first requested. This is the
    /// list handed to the fetch for this group.
    pub items: Vec<Item>,

    /// Positions in the original key list that belong to this group, in
    /// ascending order. The same item may appear at several positions.
    pub positions: Vec<usize>,
}

/// Partition a flat list of keys into one group per distinct owner.
///
/// Groups are returned in order of first appearance of their owner, and
/// item ids are deduplicated within each group, so a key requested twice is
/// only fetched once. Every index of `keys` appears in exactly one group's
/// `positions`.
pub fn group_keys<K: GroupedKey>(keys: &[K]) -> Vec<KeyGroup<K::Owner, K::Item>> {
    let mut groups: Vec<KeyGroup<K::Owner, K::Item>> = Vec::new();
    let mut group_index: HashMap<&K::Owner, usize> = HashMap::new();
    let mut seen_items: Vec<HashSet<&K::Item>> = Vec::new();

    for (position, key) in keys.iter().enumerate() {
        let index = *group_index.entry(key.owner()).or_insert_with(|| {
            groups.push(KeyGroup {
                owner: key.owner().clone(),
                items: Vec::new(),
                positions: Vec::new(),
            });
            seen_items.push(HashSet::new());
            groups.len() - 1
        });

        let group = &mut groups[index];
        if seen_items[index].insert(key.item()) {
            group.items.push(key.item().clone());
        }
        group.positions.push(position);
    }

    groups
}

/// The ordered list of keys accumulated by a batch before it is dispatched.
#[derive(Debug)]
pub(crate) struct PendingKeys<Key> {
    keys: Vec<Key>,
}

impl<Key> PendingKeys<Key> {
    pub(crate) fn new() -> Self {
        Self { keys: Vec::new() }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Append a key and return the token for its position. Positions are
    /// handed out in enqueue order.
    pub(crate) fn add_key(&mut self, key: Key) -> Token {
        let token = Token(self.keys.len());
        self.keys.push(key);
        token
    }

    /// Take the keys out of this particular &mut self instance, leaving it
    /// empty. Helper method for when the batch leaves Accumulating.
    pub(crate) fn take(&mut self) -> Vec<Key> {
        mem::take(&mut self.keys)
    }
}

/// The outcome of a single load: the value, `None` if the item doesn't
/// exist, or the error of the failed fetch for the key's owner.
pub type Outcome<Value, Error> = Result<Option<Value>, Error>;

/// Results of a completed batch, index-aligned with the frozen key list.
/// Each slot is taken at most once, by the future holding its token.
#[derive(Debug)]
pub(crate) struct Slots<Value, Error> {
    slots: Vec<Option<Outcome<Value, Error>>>,
}

impl<Value, Error> Slots<Value, Error> {
    pub(crate) fn with_len(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    pub(crate) fn fill(&mut self, position: usize, outcome: Outcome<Value, Error>) {
        if let Some(slot) = self.slots.get_mut(position) {
            *slot = Some(outcome);
        }
    }

    /// Take the outcome for a token. A slot that was never filled means the
    /// item wasn't found, which is reported as `Ok(None)`.
    pub(crate) fn take(&mut self, token: &Token) -> Outcome<Value, Error> {
        self.slots
            .get_mut(token.index())
            .and_then(Option::take)
            .unwrap_or(Ok(None))
    }

    /// Drop the outcome associated with a token without reading it. No-op if
    /// it was already taken.
    pub(crate) fn discard(&mut self, token: &Token) {
        if let Some(slot) = self.slots.get_mut(token.index()) {
            *slot = None;
        }
    }
}
