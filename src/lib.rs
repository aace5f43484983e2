//! Animeloader batches the point lookups of a GraphQL request against a
//! user's anime list. Many field resolvers each ask "is anime A on user U's
//! list?"; the loader collects those questions for a short window, asks the
//! store once per user, and hands every resolver its own answer, without the
//! resolvers knowing anything about the batch.
//!
//! ## Overview
//!
//! The core is generic. A key is anything implementing [`GroupedKey`]: it
//! names an *owner* (the scope of a single backing-store query, such as a
//! user id) and an *item* within that owner. A [`Fetcher`] retrieves all
//! requested items of one owner in one call:
//!
//! ```
//! use animeloader::{Fetcher, KeyedEntry};
//! use async_trait::async_trait;
//!
//! #[derive(Debug, Clone)]
//! struct Episode {
//!     number: u32,
//!     title: String,
//! }
//!
//! impl KeyedEntry<u32> for Episode {
//!     fn get_key(&self) -> &u32 {
//!         &self.number
//!     }
//! }
//!
//! #[derive(Debug, Clone)]
//! struct ApiError;
//!
//! struct EpisodeApi;
//!
//! // Keys are (series id, episode number) pairs; tuples implement
//! // GroupedKey with the first element as the owner.
//! #[async_trait]
//! impl Fetcher<(String, u32)> for EpisodeApi {
//!     type Value = Episode;
//!     type Error = ApiError;
//!
//!     async fn fetch(&self, series: &String, numbers: &[u32]) -> Result<Vec<Episode>, ApiError> {
//!         Ok(numbers
//!             .iter()
//!             .map(|&number| Episode { number, title: format!("{} #{}", series, number) })
//!             .collect())
//!     }
//! }
//! ```
//!
//! The fetch may return fewer values than were requested. Values are matched
//! back to requests through [`KeyedEntry`], and a requested item with no
//! value is reported as `Ok(None)`: "not found" is an answer, not an error.
//!
//! With a fetcher in hand, create a [`Loader`]. A `Loader` is configured with
//! a [`LoaderConfig`]:
//! - `window` is how long a batch collects keys, measured from its first
//!   key. It defaults to 16ms.
//! - `max_keys` is an optional cap. If set, the batch is dispatched as soon
//!   as it holds this many keys, regardless of the window.
//!
//! ```
//! # use animeloader::{Fetcher, KeyedEntry};
//! # use async_trait::async_trait;
//! # #[derive(Debug, Clone)] struct Episode { number: u32, title: String }
//! # impl KeyedEntry<u32> for Episode { fn get_key(&self) -> &u32 { &self.number } }
//! # #[derive(Debug, Clone)] struct ApiError;
//! # struct EpisodeApi;
//! # #[async_trait]
//! # impl Fetcher<(String, u32)> for EpisodeApi {
//! #     type Value = Episode;
//! #     type Error = ApiError;
//! #     async fn fetch(&self, series: &String, numbers: &[u32]) -> Result<Vec<Episode>, ApiError> {
//! #         Ok(numbers.iter().map(|&number| Episode { number, title: format!("{} #{}", series, number) }).collect())
//! #     }
//! # }
//! use animeloader::{Loader, LoaderConfig};
//! use futures::{executor, join};
//!
//! let loader = Loader::new(EpisodeApi, LoaderConfig::default());
//!
//! // Both keys share an owner, so this is a single fetch.
//! let (first, second) = executor::block_on(async {
//!     join!(
//!         loader.load(("frieren".to_string(), 1)),
//!         loader.load(("frieren".to_string(), 2)),
//!     )
//! });
//!
//! assert_eq!(first.unwrap().unwrap().title, "frieren #1");
//! assert_eq!(second.unwrap().unwrap().title, "frieren #2");
//! ```
//!
//! ## Request scope
//!
//! Loaders are per request. For the anime list, [`LoaderMiddleware::scope`]
//! wraps each request future with a fresh [`UserAnimeLoader`], and
//! resolvers reach it with [`user_anime_loader`] or the shortcut
//! [`load_user_anime`]. Outside a scope these fail with
//! [`ScopeError::LoaderMissing`].
//!
//! ## Design notes
//!
//! ### Positions, not a key map
//!
//! Every call to [`Loader::load`] gets its own position in the batch, in
//! enqueue order, even if it repeats a key. Results are stored in slots
//! aligned with those positions, and each future takes exactly its own
//! slot. Item ids are deduplicated per owner before fetching, so a repeated
//! key costs a clone, not another lookup.
//!
//! ### One window, one dispatch
//!
//! A batch goes through three states: accumulating keys, running its fetch,
//! and done. It moves from accumulating to running exactly once, under its
//! lock, and that transition freezes its keys. A `load` that arrives after
//! the transition never joins the frozen batch; it opens a new one with its
//! own window. A failure for one owner is delivered to that owner's callers
//! only, and a fetcher can fail a single entry with [`Fetched::Failed`],
//! which only reaches the callers of that item.
//!
//! The running fetch is polled under its own lock, apart from the keys, so a
//! `load` never waits on fetch work.
//!
//! ### Poll-driven design
//!
//! In keeping with Rust's polling async design, the batch is not scheduled
//! in any runtime or run in the background; it is driven directly by the
//! [`LoadFuture`]s awaiting it, so the crate works under any executor.
//!
//! The polling is as lazy as possible. Because the batch only needs to be
//! driven by a single task, only the most recently polled future is woken
//! by the window timer and by the fetch. Every other future is woken once,
//! when results are ready. If the driving future is dropped, another waiting
//! future is woken to take its place.

mod batch;
mod config;
mod context;
mod data;
mod error;
mod fetch;
mod test;
mod user_anime;
mod wakerset;

pub use batch::{LoadFuture, Loader};
pub use config::{LoaderConfig, DEFAULT_WINDOW};
pub use context::{load_user_anime, propagate_loader, user_anime_loader, LoaderMiddleware};
pub use data::{group_keys, GroupedKey, KeyGroup, KeyedEntry, Outcome};
pub use error::{Error, Result, ScopeError, StoreError};
pub use fetch::{Fetched, Fetcher};
pub use user_anime::{
    Status, UserAnime, UserAnimeFetcher, UserAnimeKey, UserAnimeLoader, UserAnimeRecord,
    UserAnimeService,
};
