//! An in-memory user anime store shared by the integration tests.
#![allow(dead_code)]

use animeloader::{StoreError, UserAnimeRecord, UserAnimeService};
use async_trait::async_trait;
use std::{collections::HashSet, sync::Mutex};

pub fn record(user_id: &str, anime_id: &str) -> UserAnimeRecord {
    UserAnimeRecord {
        id: format!("{}:{}", user_id, anime_id),
        user_id: Some(user_id.to_owned()),
        anime_id: Some(anime_id.to_owned()),
        status: Some("watching".to_owned()),
        episodes: Some(3),
        tags: Some("isekai,favorite".to_owned()),
        ..UserAnimeRecord::default()
    }
}

/// Holds a fixed set of rows, records every query it receives, and fails
/// every query for the users marked as failing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<UserAnimeRecord>,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, user_id: &str, anime_id: &str) -> Self {
        self.with_record(record(user_id, anime_id))
    }

    pub fn with_record(mut self, record: UserAnimeRecord) -> Self {
        self.rows.push(record);
        self
    }

    pub fn failing_for(mut self, user_id: &str) -> Self {
        self.failing.insert(user_id.to_owned());
        self
    }

    /// Every query so far, as (user id, requested anime ids).
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Queries so far, sorted by user id, for tests where group order
    /// doesn't matter.
    pub fn sorted_calls(&self) -> Vec<(String, Vec<String>)> {
        let mut calls = self.calls();
        calls.sort();
        calls
    }
}

#[async_trait]
impl UserAnimeService for MemoryStore {
    async fn find_by_user_id_and_anime_ids(
        &self,
        user_id: &str,
        anime_ids: &[String],
    ) -> Result<Vec<UserAnimeRecord>, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_owned(), anime_ids.to_vec()));

        if self.failing.contains(user_id) {
            return Err(StoreError::Query {
                message: format!("connection reset while reading user {}", user_id),
            });
        }

        Ok(self
            .rows
            .iter()
            .filter(|row| row.user_id.as_deref() == Some(user_id))
            .filter(|row| {
                row.anime_id
                    .as_ref()
                    .map_or(false, |anime_id| anime_ids.contains(anime_id))
            })
            .cloned()
            .collect())
    }
}
