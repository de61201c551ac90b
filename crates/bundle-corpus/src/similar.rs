//! `bcx similar`: similarity components for one pair of apps.

use anyhow::Result;

use bundle_corpus_core::similarity::pair_similarity;
use bundle_corpus_core::AppId;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_similar(config: &Config, a: &str, b: &str, json: bool) -> Result<()> {
    let weights = config.weights();
    weights.validate()?;
    let a = AppId::new(a.trim().to_ascii_lowercase());
    let b = AppId::new(b.trim().to_ascii_lowercase());

    let store = SqliteStore::open(config).await?;
    let result = pair_similarity(&store, &a, &b, &weights).await;
    store.close().await;
    let pair = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pair)?);
        return Ok(());
    }

    println!("{} / {}", pair.a, pair.b);
    println!("  words:      {:.3}", pair.words);
    println!("  resources:  {:.3}", pair.resources);
    println!("  bundle id:  {:.3}", pair.bundle);
    println!(
        "  combined:   {:.3}  (weights {}/{}/{})",
        pair.combined, weights.word, weights.resource, weights.bundle
    );
    Ok(())
}
