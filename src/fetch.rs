//! The backing-store side of a batch.

use async_trait::async_trait;

use crate::data::{GroupedKey, KeyedEntry};

/// One entry of a fetch, as seen by the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<Item, Value, Error> {
    /// A usable value, matched back to its requests with
    /// [`KeyedEntry::get_key`].
    Value(Value),

    /// The store returned something for `Item`, but it couldn't be turned
    /// into a value. Only the callers that asked for this item receive the
    /// error; the rest of the owner's group is unaffected.
    Failed(Item, Error),
}

/// A `Fetcher` retrieves every requested item for a single owner in one
/// call. A batch calls it once per distinct owner, and may run several of
/// those calls concurrently, so implementations must be safe to share.
///
/// The returned list may be partial: requested items that aren't present are
/// simply left out, and their callers observe `Ok(None)`. Returned values are
/// matched back to their requests with [`KeyedEntry::get_key`]; values that
/// don't match any requested item are ignored.
///
/// An `Err` fails the whole group. Every caller whose key belongs to that
/// owner receives a clone of the error; other owners in the same batch are
/// unaffected. Fetchers whose entries can fail one at a time (a row that
/// doesn't decode, say) override [`fetch_entries`](Fetcher::fetch_entries)
/// instead, so that a bad entry only fails its own item.
#[async_trait]
pub trait Fetcher<Key: GroupedKey>: Send + Sync + 'static {
    type Value: KeyedEntry<Key::Item> + Clone + Send + 'static;
    type Error: Clone + Send + 'static;

    async fn fetch(
        &self,
        owner: &Key::Owner,
        items: &[Key::Item],
    ) -> Result<Vec<Self::Value>, Self::Error>;

    /// The fetch the batch actually runs. By default every value returned by
    /// [`fetch`](Fetcher::fetch) is a [`Fetched::Value`].
    async fn fetch_entries(
        &self,
        owner: &Key::Owner,
        items: &[Key::Item],
    ) -> Result<Vec<Fetched<Key::Item, Self::Value, Self::Error>>, Self::Error> {
        let values = self.fetch(owner, items).await?;
        Ok(values.into_iter().map(Fetched::Value).collect())
    }
}
