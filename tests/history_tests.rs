//! History management through the full application context.

mod common;

use std::sync::Arc;
use std::time::Duration;

use translation_history::history::{FavoriteOutcome, ProtectionReason};
use translation_history::{
    AppContext, Config, ErrorKind, HistoryError, RecordStore, SearchState, SqliteRecordStore,
    CLEAR_ALL_CONFIRMATION,
};

use common::{en_zh, test_config, FakeTranslator};

fn context(config: Config) -> AppContext {
    AppContext::in_memory(config, FakeTranslator::new()).unwrap()
}

#[tokio::test]
async fn saved_record_reads_back_unchanged() {
    let ctx = context(test_config());
    let saved = ctx.history.save(en_zh("  Good morning ", "早上好")).await.unwrap();

    assert_eq!(saved.original_text, "Good morning");
    assert_eq!(saved.usage_count, 0);
    assert!(!saved.is_favorite);
    assert_eq!(saved.last_access_time, saved.timestamp);

    let loaded = ctx.history.get(&saved.id).await.unwrap();
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn favorites_need_force_to_delete() {
    let ctx = context(test_config());
    let record = ctx.history.save(en_zh("Hello", "你好")).await.unwrap();

    let outcome = ctx.history.toggle_favorite(&record.id).await.unwrap();
    assert_eq!(outcome, FavoriteOutcome::Favorited { id: record.id.clone() });

    let err = ctx.history.delete(&record.id, false).await.unwrap_err();
    assert!(matches!(
        err,
        HistoryError::Protected { reason: ProtectionReason::Favorite, .. }
    ));
    assert_eq!(err.kind(), ErrorKind::Protection);
    assert!(ctx.history.get(&record.id).await.is_ok());

    let deleted = ctx.history.delete(&record.id, true).await.unwrap();
    assert!(deleted.forced);
    let err = ctx.history.get(&record.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unfavorited_record_deletes_without_force() {
    let ctx = context(test_config());
    let record = ctx.history.save(en_zh("Hello", "你好")).await.unwrap();

    ctx.history.toggle_favorite(&record.id).await.unwrap();
    let outcome = ctx.history.toggle_favorite(&record.id).await.unwrap();
    assert_eq!(outcome, FavoriteOutcome::Unfavorited { id: record.id.clone() });

    let deleted = ctx.history.delete(&record.id, false).await.unwrap();
    assert!(!deleted.forced);
}

#[tokio::test]
async fn favorite_limit_leaves_record_untouched() {
    let mut config = test_config();
    config.history.favorite_limit = 2;
    let ctx = context(config);

    let mut ids = Vec::new();
    for word in ["one", "two", "three"] {
        ids.push(ctx.history.save(en_zh(word, "字")).await.unwrap().id);
    }
    ctx.history.toggle_favorite(&ids[0]).await.unwrap();
    ctx.history.toggle_favorite(&ids[1]).await.unwrap();

    let outcome = ctx.history.toggle_favorite(&ids[2]).await.unwrap();
    assert_eq!(outcome, FavoriteOutcome::LimitExceeded { limit: 2 });
    assert!(!ctx.history.get(&ids[2]).await.unwrap().is_favorite);

    // Unfavoriting is always allowed, and frees a slot.
    ctx.history.toggle_favorite(&ids[0]).await.unwrap();
    let outcome = ctx.history.toggle_favorite(&ids[2]).await.unwrap();
    assert_eq!(outcome, FavoriteOutcome::Favorited { id: ids[2].clone() });
}

#[tokio::test]
async fn clear_all_keeps_favorites_when_asked() {
    let ctx = context(test_config());
    ctx.history.save(en_zh("Hello", "你好")).await.unwrap();
    let world = ctx.history.save(en_zh("World", "世界")).await.unwrap();
    ctx.history.save(en_zh("Foo", "富")).await.unwrap();
    ctx.history.toggle_favorite(&world.id).await.unwrap();

    let stats = ctx.history.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.favorites, 1);

    let outcome = ctx
        .history
        .clear_all(true, CLEAR_ALL_CONFIRMATION)
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 2);
    assert!(outcome.kept_favorites);

    let remaining = ctx.history.recent(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, world.id);
}

#[tokio::test]
async fn clear_all_requires_the_exact_token() {
    let ctx = context(test_config());
    ctx.history.save(en_zh("Hello", "你好")).await.unwrap();

    let err = ctx.history.clear_all(false, "yes please").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ctx.history.stats().await.unwrap().total, 1);

    let outcome = ctx
        .history
        .clear_all(false, CLEAR_ALL_CONFIRMATION)
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 1);
    assert_eq!(ctx.history.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn batch_delete_dedupes_and_counts_each_outcome() {
    let ctx = context(test_config());
    let a = ctx.history.save(en_zh("alpha", "阿尔法")).await.unwrap();
    let b = ctx.history.save(en_zh("beta", "贝塔")).await.unwrap();
    let fav = ctx.history.save(en_zh("gamma", "伽马")).await.unwrap();
    ctx.history.toggle_favorite(&fav.id).await.unwrap();

    let outcome = ctx
        .history
        .delete_batch(&[a.id.clone(), a.id.clone(), b.id.clone()], false)
        .await;
    assert_eq!(outcome.total_requested, 2);
    assert_eq!(outcome.deleted, 2);

    let outcome = ctx
        .history
        .delete_batch(&[fav.id.clone(), "missing".to_string()], false)
        .await;
    assert_eq!(outcome.total_requested, 2);
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.protected_count, 1);
    assert_eq!(outcome.not_found, 1);
    assert_eq!(outcome.failed, 0);
}

#[tokio::test]
async fn batch_delete_is_capped() {
    let mut config = test_config();
    config.history.batch_limit = 3;
    let ctx = context(config);

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(ctx.history.save(en_zh(&format!("word {i}"), "词")).await.unwrap().id);
    }
    let outcome = ctx.history.delete_batch(&ids, false).await;
    assert_eq!(outcome.total_requested, 3);
    assert_eq!(outcome.truncated, 2);
    assert_eq!(outcome.deleted, 3);
    assert_eq!(ctx.history.stats().await.unwrap().total, 2);
}

#[tokio::test]
async fn tags_survive_and_show_in_search_results() {
    let ctx = context(test_config());
    let record = ctx.history.save(en_zh("Where is the station", "车站在哪里")).await.unwrap();

    ctx.history.add_tag(&record.id, " travel ").await.unwrap();
    let tagged = ctx.history.add_tag(&record.id, "travel").await.unwrap();
    assert_eq!(tagged.tags, vec!["travel"]);

    match ctx.search.search("station").await {
        SearchState::Success { items, .. } => {
            assert_eq!(items[0].record.id, record.id);
            assert_eq!(items[0].record.tags, vec!["travel"]);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Tags refine ranking; they do not make a record a candidate.
    assert_eq!(
        ctx.search.search("travel").await,
        SearchState::NoResults { query: "travel".into() }
    );

    let untagged = ctx.history.remove_tag(&record.id, "travel").await.unwrap();
    assert!(untagged.tags.is_empty());
}

#[tokio::test]
async fn purge_keeps_recent_records() {
    let ctx = context(test_config());
    ctx.history.save(en_zh("Hello", "你好")).await.unwrap();
    assert_eq!(ctx.history.purge_older_than(30, true).await.unwrap(), 0);
    assert_eq!(ctx.history.stats().await.unwrap().total, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_store_backs_the_same_rules() {
    let path = std::env::temp_dir().join(format!("history-{}.db", uuid::Uuid::new_v4()));
    let store = SqliteRecordStore::open(&path, Duration::from_secs(5)).unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(store);
    let ctx = AppContext::new(test_config(), Arc::clone(&store), FakeTranslator::new()).unwrap();

    let hello = ctx.history.save(en_zh("Hello", "你好")).await.unwrap();
    let world = ctx.history.save(en_zh("World", "世界")).await.unwrap();
    ctx.history.toggle_favorite(&world.id).await.unwrap();

    assert_eq!(ctx.history.get(&hello.id).await.unwrap(), hello);
    assert!(ctx.history.delete(&world.id, false).await.is_err());

    let outcome = ctx
        .history
        .clear_all(true, CLEAR_ALL_CONFIRMATION)
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 1);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(ctx.history.favorites().await.unwrap()[0].id, world.id);

    drop(ctx);
    drop(store);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_favorites_stop_at_the_limit() {
    let path = std::env::temp_dir().join(format!("history-{}.db", uuid::Uuid::new_v4()));
    let store = SqliteRecordStore::open(&path, Duration::from_secs(5)).unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(store);
    let mut config = test_config();
    config.history.favorite_limit = 3;
    let ctx = AppContext::new(config, Arc::clone(&store), FakeTranslator::new()).unwrap();

    let mut ids = Vec::new();
    for i in 0..10 {
        ids.push(ctx.history.save(en_zh(&format!("word {i}"), "字")).await.unwrap().id);
    }

    let tasks: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let history = Arc::clone(&ctx.history);
            tokio::spawn(async move { history.toggle_favorite(&id).await.unwrap() })
        })
        .collect();

    let mut favorited = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            FavoriteOutcome::Favorited { .. } => favorited += 1,
            FavoriteOutcome::LimitExceeded { limit } => {
                assert_eq!(limit, 3);
                refused += 1;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!((favorited, refused), (3, 7));
    assert_eq!(store.favorite_count().await.unwrap(), 3);

    drop(ctx);
    drop(store);
    let _ = std::fs::remove_file(&path);
}
