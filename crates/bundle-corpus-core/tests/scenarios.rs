//! End-to-end scenarios over the in-memory store: normalize, ingest,
//! analyze, compare.

use bundle_corpus_core::analyzer::top_duplicates;
use bundle_corpus_core::category::Uncategorized;
use bundle_corpus_core::digest::text_digest;
use bundle_corpus_core::models::NewApp;
use bundle_corpus_core::normalize::{prepare_words, NormalizeOptions};
use bundle_corpus_core::report::{build_report, ReportOptions};
use bundle_corpus_core::similarity::{jaccard, most_similar_pair};
use bundle_corpus_core::store::memory::InMemoryStore;
use bundle_corpus_core::store::CorpusStore;
use bundle_corpus_core::{AppId, CancelFlag, ContentKind, CorpusError};

fn app(id: &str) -> NewApp {
    NewApp {
        id: AppId::new(id),
        name: id.to_string(),
        bundle_id: format!("com.example.{}", id),
        version: "1.0".to_string(),
    }
}

async fn ingest(store: &InMemoryStore, id: &str, raw: &[&str]) -> AppId {
    let opts = NormalizeOptions::with_min_length(4);
    let words = prepare_words(raw.iter().map(|s| (*s, 1u64)), &opts, &Uncategorized).unwrap();
    store.replace_app(&app(id), &words, &[]).await.unwrap()
}

#[tokio::test]
async fn two_apps_share_login() {
    let store = InMemoryStore::new();
    let x = ingest(&store, "X", &["login", "login", "error:timeout"]).await;
    let y = ingest(&store, "Y", &["login", "submit"]).await;

    let top = top_duplicates(&store, ContentKind::Word, 10, 2, None).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].label, "login");
    assert_eq!(top[0].apps_count, 2);
    assert_eq!(top[0].total_occurrences, 3);
    assert_eq!(top[0].apps, vec![x.clone(), y.clone()]);

    let score = jaccard(&store, ContentKind::Word, &x, &y).await.unwrap();
    assert!((score - 1.0 / 3.0).abs() < 1e-12);
}

#[tokio::test]
async fn empty_app_is_valid_and_scores_zero() {
    let store = InMemoryStore::new();
    let x = ingest(&store, "X", &["login", "submit"]).await;
    let z = ingest(&store, "Z", &[]).await;

    assert!(store.words_for_app(&z).await.unwrap().is_empty());
    assert_eq!(jaccard(&store, ContentKind::Word, &z, &x).await.unwrap(), 0.0);
    assert_eq!(jaccard(&store, ContentKind::Word, &z, &z).await.unwrap(), 0.0);

    let report = build_report(&store, &ReportOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    let summary = report.apps.iter().find(|a| a.id == z).unwrap();
    assert_eq!(summary.total_words, 0);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["similarity"]["words"]["basis"], "words");
}

#[tokio::test]
async fn short_words_never_reach_the_store() {
    let store = InMemoryStore::new();
    let x = ingest(&store, "X", &["ok", "yes", "login"]).await;
    let words = store.words_for_app(&x).await.unwrap();
    assert_eq!(words.len(), 1);
    assert!(words.contains(&text_digest("login")));
    assert!(store.word(&text_digest("yes")).await.unwrap().is_none());
}

#[tokio::test]
async fn reingest_with_new_content_drops_old_associations() {
    let store = InMemoryStore::new();
    let x = ingest(&store, "X", &["login", "legacy-flow"]).await;
    ingest(&store, "X", &["login", "new-flow"]).await;

    assert!(store
        .apps_for_word(&text_digest("legacy-flow"))
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .apps_for_word(&text_digest("new-flow"))
        .await
        .unwrap()
        .contains(&x));
}

#[tokio::test]
async fn unknown_app_is_distinguished_from_empty_app() {
    let store = InMemoryStore::new();
    let x = ingest(&store, "X", &[]).await;
    let err = jaccard(&store, ContentKind::Word, &x, &AppId::new("never"))
        .await
        .unwrap_err();
    assert!(matches!(err, CorpusError::UnknownApp(ref id) if id.as_str() == "never"));
}

#[tokio::test]
async fn most_similar_pair_prefers_overlap() {
    let store = InMemoryStore::new();
    let a = ingest(&store, "a", &["alpha", "beta", "gamma"]).await;
    let b = ingest(&store, "b", &["alpha", "beta", "gamma", "delta"]).await;
    let c = ingest(&store, "c", &["alpha", "omega"]).await;

    let best = most_similar_pair(&store, ContentKind::Word, &[c, b.clone(), a.clone()], &CancelFlag::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((best.a, best.b), (a, b));
    assert!((best.score - 0.75).abs() < 1e-12);
}
