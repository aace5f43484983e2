use std::{num::NonZeroUsize, time::Duration};

/// The default batch window: long enough for the field resolvers of one
/// GraphQL selection to enqueue, short enough not to be noticed.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(16);

/// Rules for a [`Loader`](crate::Loader).
///
/// - `window` is how long a batch accepts keys, measured from the first key.
///   It is a fixed window: later keys don't extend it.
/// - `max_keys` is an optional cap on the keys per batch. If set, a batch is
///   dispatched as soon as it holds this many keys, regardless of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub window: Duration,
    pub max_keys: Option<NonZeroUsize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_keys: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_window(self, window: Duration) -> Self {
        Self { window, ..self }
    }

    pub fn with_max_keys(self, max_keys: usize) -> Self {
        Self {
            max_keys: NonZeroUsize::new(max_keys),
            ..self
        }
    }
}
