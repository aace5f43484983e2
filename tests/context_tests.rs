//! These tests ensure that every request gets its own loader, and that code
//! outside a request scope is told so instead of silently missing data.

mod common;

use animeloader::{
    load_user_anime, propagate_loader, user_anime_loader, Error, LoaderConfig, LoaderMiddleware,
    ScopeError,
};
use common::MemoryStore;
use futures::{executor, future};
use std::{sync::Arc, time::Duration};

fn middleware(store: &Arc<MemoryStore>) -> LoaderMiddleware {
    LoaderMiddleware::new(
        store.clone(),
        LoaderConfig::default().with_window(Duration::from_millis(5)),
    )
}

#[test]
fn no_loader_outside_scope() {
    assert_eq!(
        user_anime_loader().unwrap_err(),
        ScopeError::LoaderMissing
    );

    let result = executor::block_on(load_user_anime("u1", "a1"));
    assert_eq!(result, Err(Error::Scope(ScopeError::LoaderMissing)));
}

#[test]
fn resolvers_in_one_request_share_a_batch() {
    let store = Arc::new(
        MemoryStore::new()
            .with_entry("u1", "a1")
            .with_entry("u1", "a2"),
    );
    let middleware = middleware(&store);

    let (a1, a2, a3) = executor::block_on(middleware.scope(async {
        future::join3(
            load_user_anime("u1", "a1"),
            load_user_anime("u1", "a2"),
            load_user_anime("u1", "a3"),
        )
        .await
    }));

    assert_eq!(a1.unwrap().unwrap().anime_id, "a1");
    assert_eq!(a2.unwrap().unwrap().anime_id, "a2");
    assert_eq!(a3, Ok(None));
    assert_eq!(
        store.calls(),
        vec![(
            "u1".to_owned(),
            vec!["a1".to_owned(), "a2".to_owned(), "a3".to_owned()]
        )]
    );
}

#[test]
fn each_request_gets_a_fresh_loader() {
    let store = Arc::new(MemoryStore::new().with_entry("u1", "a1"));
    let middleware = middleware(&store);

    let first = executor::block_on(middleware.scope(async { user_anime_loader().unwrap() }));
    let second = executor::block_on(middleware.scope(async { user_anime_loader().unwrap() }));

    assert!(!Arc::ptr_eq(&first, &second));

    // Concurrent requests don't batch with each other either.
    let (r1, r2) = executor::block_on(future::join(
        middleware.scope(load_user_anime("u1", "a1")),
        middleware.scope(load_user_anime("u1", "a1")),
    ));

    assert_eq!(r1, r2);
    assert_eq!(store.calls().len(), 2);
}

#[test]
fn store_errors_reach_the_resolver() {
    let store = Arc::new(MemoryStore::new().failing_for("u2"));
    let middleware = middleware(&store);

    let result = executor::block_on(middleware.scope(load_user_anime("u2", "a1")));

    match result {
        Err(Error::Store(err)) => assert!(err.to_string().starts_with("database query error")),
        other => panic!("expected a store error, got {:?}", other),
    }
}

#[test]
fn propagated_future_keeps_its_loader() {
    let store = Arc::new(MemoryStore::new().with_entry("u1", "a1"));
    let middleware = middleware(&store);

    let (scoped, detached) = executor::block_on(middleware.scope(async {
        let scoped = user_anime_loader().unwrap();
        let detached = propagate_loader(async { user_anime_loader() }).unwrap();
        (scoped, detached)
    }));

    // The request scope is over, but the propagated future still sees the
    // request's loader.
    assert!(user_anime_loader().is_err());
    let propagated = executor::block_on(detached).unwrap();
    assert!(Arc::ptr_eq(&scoped, &propagated));
}

#[test]
fn propagate_outside_scope_fails() {
    let result = propagate_loader(async {}).map(|_| ());
    assert_eq!(result, Err(ScopeError::LoaderMissing));
}
