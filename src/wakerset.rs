use std::{collections::HashMap, task::Waker};

#[derive(Debug, Eq, PartialEq, Hash)]
pub(crate) struct Token(usize);

impl Token {
    fn duplicate(&self) -> Token {
        Token(self.0)
    }
}

/// The completion signals of every caller waiting on one batch.
///
/// Each waiting `LoadFuture` registers the waker of its task here and gets
/// back a token. The waker is that caller's private completion signal: it is
/// woken exactly once when the batch is done, via `wake_all`.
///
/// While the batch is still pending, only one task needs to drive it (poll
/// the window timer, then the fetch). That task is the "driving waker", which
/// is always the most recently registered or replaced waker, on the
/// assumption that it was just used to poll the shared future. If the
/// driver goes away, `discard_and_wake` promotes and wakes another waiter so
/// the batch always has a path forward.
#[derive(Debug)]
pub(crate) struct WakerSet {
    wakers: HashMap<Token, Waker>,
    driving_waker: Option<Token>,

    // Tokens are an ever-increasing integer. A batch lives for one window
    // and one fetch, so there's no chance of running out of these.
    next_token: usize,
}

impl Default for WakerSet {
    fn default() -> Self {
        Self {
            wakers: HashMap::with_capacity(1),
            driving_waker: None,
            next_token: 0,
        }
    }
}

impl WakerSet {
    /// Number of registered signals.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }

    /// Register a waker, or refresh it if the future already holds a token.
    /// Either way the waker becomes the driving waker.
    pub(crate) fn upsert(&mut self, token: &mut Option<Token>, waker: &Waker) {
        match token {
            Some(existing) => self.replace_waker(existing, waker),
            None => *token = Some(self.add_waker(waker.clone())),
        }
    }

    #[must_use]
    fn add_waker(&mut self, waker: Waker) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;

        self.wakers.insert(token.duplicate(), waker);
        self.driving_waker = Some(token.duplicate());
        token
    }

    /// The waker is passed by reference and set with `clone_from`, because
    /// it comes from a Context and would need to be cloned anyway. A token
    /// that is no longer in the set is re-inserted.
    fn replace_waker(&mut self, token: &Token, waker: &Waker) {
        match self.wakers.get_mut(token) {
            Some(existing) => existing.clone_from(waker),
            None => {
                self.wakers.insert(token.duplicate(), waker.clone());
            }
        }

        self.driving_waker = Some(token.duplicate());
    }

    /// Wake only the driving waker, so that it re-polls the shared batch.
    /// If there is no driver, an arbitrary waiter is promoted.
    pub(crate) fn wake_driver(&mut self) {
        let driver = self
            .driving_waker
            .as_ref()
            .and_then(|token| self.wakers.get(token));

        match driver {
            Some(waker) => waker.wake_by_ref(),
            None => self.promote_any(),
        }
    }

    /// Discard a waker from this set. If that waker was the driving waker
    /// (or there is currently no driver), an arbitrary waker is made the
    /// driver and woken.
    ///
    /// We promote immediately because if a series of drops happen at the
    /// same time, at least one remaining waiter has to be woken.
    pub(crate) fn discard_and_wake(&mut self, token: Token) {
        self.wakers.remove(&token);
        if self.driving_waker.as_ref() == Some(&token) || self.driving_waker.is_none() {
            self.promote_any();
        }
    }

    fn promote_any(&mut self) {
        match self.wakers.iter().next() {
            None => self.driving_waker = None,
            Some((token, waker)) => {
                self.driving_waker = Some(token.duplicate());
                waker.wake_by_ref();
            }
        }
    }

    /// Release every completion signal exactly once.
    pub(crate) fn wake_all(self) {
        self.wakers
            .into_iter()
            .for_each(|(_token, waker)| waker.wake());
    }

    /// Release every completion signal except the one belonging to `token`,
    /// which is used by the future that finished the batch: it is about to
    /// read its own result and doesn't need a wakeup.
    pub(crate) fn discard_wake_all(mut self, token: Token) {
        self.wakers.remove(&token);
        self.wake_all();
    }
}
