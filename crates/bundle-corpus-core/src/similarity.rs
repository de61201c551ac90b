//! Pairwise similarity between apps.
//!
//! Word-set and resource-set similarity are Jaccard scores. The matrix is
//! built by grouped aggregation over the digest → apps index: every shared
//! digest increments a counter for each pair of apps holding it, which
//! costs `O(total associations)` instead of `k²` full set intersections.
//! Set sizes come from the app → digests side of the index, so
//! `|A ∪ B| = |A| + |B| − |A ∩ B|` needs no further scans.
//!
//! # Combined score
//!
//! `combined = (w_word × word + w_res × resource + w_bundle × bundle) / Σw`
//! where `bundle` is the bundle-ID prefix similarity from
//! [`bundle_prefix_similarity`].

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::cancel::CancelFlag;
use crate::error::{CorpusError, Result};
use crate::models::{AppId, AppRecord, ContentKind, Overlap};
use crate::store::CorpusStore;

/// Jaccard similarity of two sets. Two empty sets score 0.0: no evidence
/// of similarity rather than an undefined ratio.
pub fn jaccard_sets<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let shared = small.iter().filter(|x| large.contains(*x)).count();
    jaccard_from_counts(shared, a.len(), b.len())
}

/// Jaccard similarity from an intersection size and the two set sizes.
///
/// The union never drops below `shared`, so inconsistent inputs clamp to
/// 1.0 instead of underflowing.
pub fn jaccard_from_counts(shared: usize, len_a: usize, len_b: usize) -> f64 {
    let union = len_a.saturating_add(len_b).saturating_sub(shared).max(shared);
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Jaccard similarity of two apps' digest sets of one kind.
///
/// Fails with [`CorpusError::UnknownApp`] if either app was never ingested.
pub async fn jaccard<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
    a: &AppId,
    b: &AppId,
) -> Result<f64> {
    let set_a = store.members(kind, a).await?;
    let set_b = store.members(kind, b).await?;
    Ok(jaccard_sets(&set_a, &set_b))
}

/// What a [`SimilarityMatrix`] was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityBasis {
    Words,
    Resources,
    Combined,
}

impl From<ContentKind> for SimilarityBasis {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Word => SimilarityBasis::Words,
            ContentKind::Resource => SimilarityBasis::Resources,
        }
    }
}

/// Symmetric app × app similarity matrix, rows in `apps` order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatrix {
    pub basis: SimilarityBasis,
    pub apps: Vec<AppId>,
    pub scores: Vec<Vec<f64>>,
}

/// The highest-scoring off-diagonal pair, with `a < b`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPair {
    pub a: AppId,
    pub b: AppId,
    pub score: f64,
}

impl SimilarityMatrix {
    pub fn get(&self, a: &AppId, b: &AppId) -> Option<f64> {
        let i = self.apps.iter().position(|x| x == a)?;
        let j = self.apps.iter().position(|x| x == b)?;
        Some(self.scores[i][j])
    }

    /// Every unordered pair once, as `(a, b, score)` with `a < b`.
    pub fn pairs(&self) -> impl Iterator<Item = (&AppId, &AppId, f64)> + '_ {
        let n = self.apps.len();
        (0..n).flat_map(move |i| {
            (i + 1..n).map(move |j| {
                let (x, y) = (&self.apps[i], &self.apps[j]);
                let (a, b) = if x <= y { (x, y) } else { (y, x) };
                (a, b, self.scores[i][j])
            })
        })
    }

    /// Argmax over off-diagonal entries; ties go to the lexicographically
    /// smaller `(a, b)`. `None` with fewer than two apps.
    pub fn most_similar_pair(&self) -> Option<SimilarPair> {
        let mut best: Option<(&AppId, &AppId, f64)> = None;
        for (a, b, score) in self.pairs() {
            let better = match best {
                None => true,
                Some((ba, bb, bs)) => {
                    score > bs || (score == bs && (a, b) < (ba, bb))
                }
            };
            if better {
                best = Some((a, b, score));
            }
        }
        best.map(|(a, b, score)| SimilarPair {
            a: a.clone(),
            b: b.clone(),
            score,
        })
    }

    /// Pairs scoring at or above `threshold`, best first.
    pub fn pairs_at_least(&self, threshold: f64) -> Vec<SimilarPair> {
        let mut out: Vec<SimilarPair> = self
            .pairs()
            .filter(|(_, _, s)| *s >= threshold)
            .map(|(a, b, score)| SimilarPair {
                a: a.clone(),
                b: b.clone(),
                score,
            })
            .collect();
        out.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then_with(|| (&x.a, &x.b).cmp(&(&y.a, &y.b)))
        });
        out
    }
}

fn dedup_ids(app_ids: &[AppId]) -> Vec<AppId> {
    let mut seen = BTreeSet::new();
    app_ids
        .iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// Build the similarity matrix for `app_ids` (duplicates ignored).
///
/// The diagonal is 1.0 for an app with at least one item and 0.0 for an
/// app with none. Cancellation is honoured between matrix rows.
pub async fn similarity_matrix<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
    app_ids: &[AppId],
    cancel: &CancelFlag,
) -> Result<SimilarityMatrix> {
    let apps = dedup_ids(app_ids);
    let Overlap { sizes, postings } = store.overlap(kind, &apps).await?;
    cancel.check()?;

    let index: HashMap<&AppId, usize> = apps.iter().enumerate().map(|(i, a)| (a, i)).collect();
    let mut shared: HashMap<(usize, usize), usize> = HashMap::new();
    for group in &postings {
        let mut idx: Vec<usize> = group
            .iter()
            .map(|a| {
                index.get(a).copied().ok_or_else(|| {
                    CorpusError::invariant(format!("posting names unrequested app {}", a))
                })
            })
            .collect::<Result<_>>()?;
        idx.sort_unstable();
        for (pos, &i) in idx.iter().enumerate() {
            for &j in &idx[pos + 1..] {
                *shared.entry((i, j)).or_insert(0) += 1;
            }
        }
    }

    tracing::debug!(
        kind = kind.as_str(),
        apps = apps.len(),
        shared_pairs = shared.len(),
        "similarity pair counts aggregated"
    );

    let n = apps.len();
    let size_of = |i: usize| sizes.get(&apps[i]).copied().unwrap_or(0);
    let mut scores = vec![vec![0.0; n]; n];
    for i in 0..n {
        cancel.check()?;
        scores[i][i] = if size_of(i) > 0 { 1.0 } else { 0.0 };
        for j in i + 1..n {
            let common = shared.get(&(i, j)).copied().unwrap_or(0);
            let s = jaccard_from_counts(common, size_of(i), size_of(j));
            scores[i][j] = s;
            scores[j][i] = s;
        }
    }

    Ok(SimilarityMatrix {
        basis: kind.into(),
        apps,
        scores,
    })
}

/// Most similar pair among `app_ids` for one content kind.
pub async fn most_similar_pair<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
    app_ids: &[AppId],
    cancel: &CancelFlag,
) -> Result<Option<SimilarPair>> {
    Ok(similarity_matrix(store, kind, app_ids, cancel)
        .await?
        .most_similar_pair())
}

/// Weights for the combined similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityWeights {
    pub word: f64,
    pub resource: f64,
    pub bundle: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            word: 0.7,
            resource: 0.2,
            bundle: 0.1,
        }
    }
}

impl SimilarityWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [self.word, self.resource, self.bundle];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CorpusError::input("similarity weights must be finite and >= 0"));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(CorpusError::input("similarity weights must not all be zero"));
        }
        Ok(())
    }

    /// Weighted average of the three component scores.
    pub fn combine(&self, word: f64, resource: f64, bundle: f64) -> f64 {
        let total = self.word + self.resource + self.bundle;
        if total <= 0.0 {
            return 0.0;
        }
        (self.word * word + self.resource * resource + self.bundle * bundle) / total
    }
}

/// Share of leading dot-separated segments two bundle IDs have in common,
/// relative to the longer ID. `com.acme.mail` vs `com.acme.chat` → 2/3.
/// Empty IDs score 0.0; comparison is case-insensitive.
pub fn bundle_prefix_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_ascii_lowercase();
    let b = b.trim().to_ascii_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let sa: Vec<&str> = a.split('.').collect();
    let sb: Vec<&str> = b.split('.').collect();
    let common = sa.iter().zip(&sb).take_while(|(x, y)| x == y).count();
    common as f64 / sa.len().max(sb.len()) as f64
}

/// Combine word and resource matrices with bundle-ID prefix similarity.
///
/// Both matrices must list the same apps in the same order; `records`
/// supplies bundle IDs (apps missing from it score 0.0 on that component).
pub fn combined_matrix(
    words: &SimilarityMatrix,
    resources: &SimilarityMatrix,
    records: &[AppRecord],
    weights: &SimilarityWeights,
) -> Result<SimilarityMatrix> {
    if words.apps != resources.apps {
        return Err(CorpusError::input(
            "word and resource matrices cover different apps",
        ));
    }
    let bundles: HashMap<&AppId, &str> = records
        .iter()
        .map(|r| (&r.id, r.bundle_id.as_str()))
        .collect();
    let bundle_of = |id: &AppId| bundles.get(id).copied().unwrap_or("");

    let n = words.apps.len();
    let mut scores = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let bundle = bundle_prefix_similarity(bundle_of(&words.apps[i]), bundle_of(&words.apps[j]));
            let s = weights.combine(words.scores[i][j], resources.scores[i][j], bundle);
            scores[i][j] = s;
            scores[j][i] = s;
        }
    }
    Ok(SimilarityMatrix {
        basis: SimilarityBasis::Combined,
        apps: words.apps.clone(),
        scores,
    })
}

/// All similarity components for one pair of apps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSimilarity {
    pub a: AppId,
    pub b: AppId,
    pub words: f64,
    pub resources: f64,
    pub bundle: f64,
    pub combined: f64,
}

pub async fn pair_similarity<S: CorpusStore + ?Sized>(
    store: &S,
    a: &AppId,
    b: &AppId,
    weights: &SimilarityWeights,
) -> Result<PairSimilarity> {
    let app_a = store.require_app(a).await?;
    let app_b = store.require_app(b).await?;
    let words = jaccard(store, ContentKind::Word, a, b).await?;
    let resources = jaccard(store, ContentKind::Resource, a, b).await?;
    let bundle = bundle_prefix_similarity(&app_a.bundle_id, &app_b.bundle_id);
    Ok(PairSimilarity {
        a: a.clone(),
        b: b.clone(),
        words,
        resources,
        bundle,
        combined: weights.combine(words, resources, bundle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn jaccard_basic_and_empty() {
        let x = set(&["login", "error:timeout"]);
        let y = set(&["login", "submit"]);
        assert!((jaccard_sets(&x, &y) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard_sets(&x, &x), 1.0);
        let empty = set(&[]);
        assert_eq!(jaccard_sets(&empty, &empty), 0.0);
        assert_eq!(jaccard_sets(&empty, &x), 0.0);
    }

    #[test]
    fn jaccard_from_inconsistent_counts_clamps() {
        assert_eq!(jaccard_from_counts(1, 0, 0), 1.0);
        assert_eq!(jaccard_from_counts(3, 1, 1), 1.0);
        assert_eq!(jaccard_from_counts(0, 0, 0), 0.0);
        assert!((jaccard_from_counts(1, 2, 2) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn bundle_prefix() {
        assert!((bundle_prefix_similarity("com.acme.mail", "com.acme.chat") - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(bundle_prefix_similarity("com.acme.mail", "COM.ACME.MAIL"), 1.0);
        assert_eq!(bundle_prefix_similarity("com.acme", "org.acme"), 0.0);
        assert_eq!(bundle_prefix_similarity("", "com.acme"), 0.0);
        assert!((bundle_prefix_similarity("com.acme", "com.acme.pro.lite") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weights_combine_and_validate() {
        let w = SimilarityWeights::default();
        assert!(w.validate().is_ok());
        assert!((w.combine(1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((w.combine(0.5, 0.0, 0.0) - 0.35).abs() < 1e-12);

        let words_only = SimilarityWeights {
            word: 2.0,
            resource: 0.0,
            bundle: 0.0,
        };
        assert!((words_only.combine(0.25, 1.0, 1.0) - 0.25).abs() < 1e-12);

        let bad = SimilarityWeights {
            word: 0.0,
            resource: 0.0,
            bundle: 0.0,
        };
        assert!(bad.validate().is_err());
        let negative = SimilarityWeights {
            word: -1.0,
            ..SimilarityWeights::default()
        };
        assert!(negative.validate().is_err());
    }

    fn matrix(apps: &[&str], scores: Vec<Vec<f64>>) -> SimilarityMatrix {
        SimilarityMatrix {
            basis: SimilarityBasis::Words,
            apps: apps.iter().map(|a| AppId::new(*a)).collect(),
            scores,
        }
    }

    #[test]
    fn most_similar_pair_breaks_ties_lexicographically() {
        let m = matrix(
            &["c", "b", "a"],
            vec![
                vec![1.0, 0.5, 0.5],
                vec![0.5, 1.0, 0.2],
                vec![0.5, 0.2, 1.0],
            ],
        );
        let best = m.most_similar_pair().unwrap();
        assert_eq!(best.a, AppId::new("a"));
        assert_eq!(best.b, AppId::new("c"));
        assert_eq!(best.score, 0.5);
    }

    #[test]
    fn most_similar_pair_needs_two_apps() {
        assert!(matrix(&["a"], vec![vec![1.0]]).most_similar_pair().is_none());
        assert!(matrix(&[], vec![]).most_similar_pair().is_none());
    }

    #[test]
    fn pairs_at_least_sorted() {
        let m = matrix(
            &["a", "b", "c"],
            vec![
                vec![1.0, 0.9, 0.1],
                vec![0.9, 1.0, 0.95],
                vec![0.1, 0.95, 1.0],
            ],
        );
        let hits = m.pairs_at_least(0.8);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].a, AppId::new("b"));
        assert_eq!(hits[0].b, AppId::new("c"));
        assert_eq!(m.get(&AppId::new("c"), &AppId::new("a")), Some(0.1));
    }
}
