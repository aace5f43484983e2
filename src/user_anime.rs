//! The user anime list domain: which anime a user has on their list, and the
//! loader that answers "does user U have anime A?" for many resolvers at once.

use std::{convert::TryFrom, fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    batch::Loader,
    config::LoaderConfig,
    data::{GroupedKey, KeyedEntry},
    error::StoreError,
    fetch::{Fetched, Fetcher},
};

/// Identifies one entry of one user's list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserAnimeKey {
    pub user_id: String,
    pub anime_id: String,
}

impl UserAnimeKey {
    pub fn new(user_id: impl Into<String>, anime_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            anime_id: anime_id.into(),
        }
    }
}

impl GroupedKey for UserAnimeKey {
    type Owner = String;
    type Item = String;

    fn owner(&self) -> &String {
        &self.user_id
    }

    fn item(&self) -> &String {
        &self.anime_id
    }
}

/// Where an anime stands on a user's list.
///
/// The API exposes status as a closed enum, so a stored value outside of it
/// can't be served as-is. Such a row fails to decode with
/// [`StoreError::Decode`], and that error reaches only the callers that asked
/// for that row's anime; the rest of the user's list loads normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Watching,
    Completed,
    OnHold,
    Dropped,
    PlanToWatch,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Watching => "watching",
            Status::Completed => "completed",
            Status::OnHold => "onhold",
            Status::Dropped => "dropped",
            Status::PlanToWatch => "plantowatch",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watching" => Ok(Status::Watching),
            "completed" => Ok(Status::Completed),
            "onhold" => Ok(Status::OnHold),
            "dropped" => Ok(Status::Dropped),
            "plantowatch" => Ok(Status::PlanToWatch),
            other => Err(StoreError::Decode {
                message: format!("unknown status {:?}", other),
            }),
        }
    }
}

/// A `user_anime` row as the store returns it. Tags are stored comma-joined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAnimeRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub anime_id: Option<String>,
    pub status: Option<String>,
    pub score: Option<f64>,
    pub episodes: Option<i32>,
    pub rewatching: Option<i32>,
    pub rewatching_episodes: Option<i32>,
    pub tags: Option<String>,
    pub list_id: Option<String>,
}

/// An anime on a user's list, as served to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnime {
    pub id: String,
    pub user_id: String,
    pub anime_id: String,
    pub status: Option<Status>,
    pub score: Option<f64>,
    pub episodes: Option<i32>,
    pub rewatching: Option<i32>,
    pub rewatching_episodes: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub list_id: Option<String>,
}

impl TryFrom<UserAnimeRecord> for UserAnime {
    type Error = StoreError;

    fn try_from(record: UserAnimeRecord) -> Result<Self, Self::Error> {
        let missing = |column: &str| StoreError::Decode {
            message: format!("row {} has no {}", record.id, column),
        };

        let user_id = record.user_id.clone().ok_or_else(|| missing("user_id"))?;
        let anime_id = record.anime_id.clone().ok_or_else(|| missing("anime_id"))?;
        let status = record.status.as_deref().map(str::parse::<Status>).transpose()?;
        let tags = record
            .tags
            .as_deref()
            .map(|tags| tags.split(',').map(str::to_owned).collect());

        Ok(UserAnime {
            id: record.id,
            user_id,
            anime_id,
            status,
            score: record.score,
            episodes: record.episodes,
            rewatching: record.rewatching,
            rewatching_episodes: record.rewatching_episodes,
            tags,
            list_id: record.list_id,
        })
    }
}

impl KeyedEntry<String> for UserAnime {
    fn get_key(&self) -> &String {
        &self.anime_id
    }
}

/// The backing-store query behind the loader. Implementations must be safe to
/// call concurrently; a batch issues one call per user.
#[async_trait]
pub trait UserAnimeService: Send + Sync {
    /// Return every list entry of `user_id` whose anime id is in `anime_ids`.
    /// Anime that aren't on the list are left out of the result.
    async fn find_by_user_id_and_anime_ids(
        &self,
        user_id: &str,
        anime_ids: &[String],
    ) -> Result<Vec<UserAnimeRecord>, StoreError>;
}

/// Adapts a [`UserAnimeService`] into a [`Fetcher`] of [`UserAnime`]s.
#[derive(Clone)]
pub struct UserAnimeFetcher {
    service: Arc<dyn UserAnimeService>,
}

impl UserAnimeFetcher {
    pub fn new(service: Arc<dyn UserAnimeService>) -> Self {
        Self { service }
    }
}

impl fmt::Debug for UserAnimeFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAnimeFetcher").finish()
    }
}

#[async_trait]
impl Fetcher<UserAnimeKey> for UserAnimeFetcher {
    type Value = UserAnime;
    type Error = StoreError;

    /// Every requested entry, failing on the first row that doesn't decode.
    /// The loader itself uses [`fetch_entries`](Fetcher::fetch_entries).
    async fn fetch(
        &self,
        user_id: &String,
        anime_ids: &[String],
    ) -> Result<Vec<UserAnime>, StoreError> {
        self.service
            .find_by_user_id_and_anime_ids(user_id, anime_ids)
            .await?
            .into_iter()
            .map(UserAnime::try_from)
            .collect()
    }

    async fn fetch_entries(
        &self,
        user_id: &String,
        anime_ids: &[String],
    ) -> Result<Vec<Fetched<String, UserAnime, StoreError>>, StoreError> {
        let records = self
            .service
            .find_by_user_id_and_anime_ids(user_id, anime_ids)
            .await?;

        // Rows are decoded one at a time, so a bad row only fails the callers
        // that asked for its anime. A row without an anime id can't be
        // matched to any request and is skipped.
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let anime_id = record.anime_id.clone()?;
                Some(match UserAnime::try_from(record) {
                    Ok(user_anime) => Fetched::Value(user_anime),
                    Err(err) => Fetched::Failed(anime_id, err),
                })
            })
            .collect())
    }
}

pub type UserAnimeLoader = Loader<UserAnimeKey, UserAnimeFetcher>;

impl Loader<UserAnimeKey, UserAnimeFetcher> {
    /// A fresh loader over `service`. Call this once per request.
    pub fn for_service(service: Arc<dyn UserAnimeService>, config: LoaderConfig) -> Self {
        Loader::new(UserAnimeFetcher::new(service), config)
    }
}
