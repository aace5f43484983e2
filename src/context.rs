//! Request-scoped loaders.
//!
//! A loader must never outlive its request: sharing one across requests
//! would leak one user's batches into another's and make unrelated requests
//! contend on the same lock. [`LoaderMiddleware::scope`] builds a fresh
//! [`UserAnimeLoader`] for every request future it wraps, and anything
//! running inside that future can reach it with [`user_anime_loader`].

use std::{future::Future, sync::Arc};

use tracing::Instrument;

use crate::{
    config::LoaderConfig,
    error::{Result, ScopeError},
    user_anime::{UserAnime, UserAnimeKey, UserAnimeLoader, UserAnimeService},
};

// Accessible anywhere inside the call stack of a future wrapped with
// `LoaderMiddleware::scope()`. Task-locals don't follow `spawn()`; wrap
// spawned work with `propagate_loader()`.
tokio::task_local! {
    static USER_ANIME_LOADER: Arc<UserAnimeLoader>;
}

/// Installs request-scoped loaders. Keep one of these for the lifetime of the
/// server and call [`scope`](LoaderMiddleware::scope) once per inbound
/// request.
#[derive(Clone)]
pub struct LoaderMiddleware {
    service: Arc<dyn UserAnimeService>,
    config: LoaderConfig,
}

impl std::fmt::Debug for LoaderMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderMiddleware")
            .field("config", &self.config)
            .finish()
    }
}

impl LoaderMiddleware {
    pub fn new(service: Arc<dyn UserAnimeService>, config: LoaderConfig) -> Self {
        Self { service, config }
    }

    /// Run `fut` with a brand new loader in scope.
    pub fn scope<F, O>(&self, fut: F) -> impl Future<Output = O>
    where
        F: Future<Output = O>,
    {
        let loader = Arc::new(UserAnimeLoader::for_service(
            Arc::clone(&self.service),
            self.config,
        ));

        USER_ANIME_LOADER.scope(
            loader,
            fut.instrument(tracing::debug_span!("user_anime_loader")),
        )
    }
}

/// The loader of the current request. Fails if called outside of
/// [`LoaderMiddleware::scope`], which is a wiring mistake rather than a
/// missing item.
pub fn user_anime_loader() -> Result<Arc<UserAnimeLoader>, ScopeError> {
    USER_ANIME_LOADER
        .try_with(Arc::clone)
        .map_err(|_| ScopeError::LoaderMissing)
}

/// Carry the current request's loader into a future that will run elsewhere,
/// e.g. under `tokio::spawn()`, so that it keeps batching with its request.
pub fn propagate_loader<F, O>(fut: F) -> Result<impl Future<Output = O>, ScopeError>
where
    F: Future<Output = O>,
{
    let loader = user_anime_loader()?;
    Ok(USER_ANIME_LOADER.scope(loader, fut.in_current_span()))
}

/// Look up one entry of a user's list through the current request's loader.
/// `Ok(None)` means the anime isn't on the user's list.
pub async fn load_user_anime(
    user_id: impl Into<String>,
    anime_id: impl Into<String>,
) -> Result<Option<UserAnime>> {
    let loader = user_anime_loader()?;
    let user_anime = loader.load(UserAnimeKey::new(user_id, anime_id)).await?;
    Ok(user_anime)
}
