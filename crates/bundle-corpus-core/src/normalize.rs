//! Normalization of raw extraction output.
//!
//! Raw strings are trimmed, stripped of control characters and lossy-decode
//! replacement characters, filtered by length and content, and then
//! collapsed to one `(canonical_text, count)` entry per distinct text so
//! the store sees at most one row per word per app.
//!
//! Counts and sizes are bounded ([`MAX_COUNT`], [`MAX_RESOURCE_SIZE`]);
//! values past the bounds are input errors for that app.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::category::{Classifier, ResourceCategory};
use crate::error::{CorpusError, Result};
use crate::models::{ResourceEntry, WordEntry};

/// Largest in-app occurrence count of one word, after merging spellings.
/// Corpus-wide sums over every app stay within `i64`.
pub const MAX_COUNT: u64 = u32::MAX as u64;

/// Largest declared resource size in bytes (256 TiB).
pub const MAX_RESOURCE_SIZE: u64 = 1 << 48;

/// Shapes of compiler and toolchain output that carry no product text.
const TECHNICAL_PATTERNS: &[&str] = &[
    // hex digests
    r"^[0-9A-Fa-f]{8,}$",
    r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$",
    // Swift mangled symbols and runtime entry points
    r"^_\$s[A-Za-z0-9]+",
    r"^_swift_",
    // Objective-C type encodings, e.g. v24@0:8 or @"NSString"16@0:8
    r"^[@v]\d+@\d+:\d+",
    r#"^@"[A-Za-z_]+"\d*"#,
    r"\d+@\d+:\d+",
    // plist and XML headers
    r"^<!DOCTYPE",
    r"^<\?xml",
    // framework load paths
    r"^@rpath/",
    r"\.framework/",
];

/// Drops technical noise: hex digests, UUIDs, Swift symbols, Objective-C
/// type signatures, document headers, framework paths, strings with no
/// letter or digit, and strings made of at most two distinct characters.
#[derive(Debug, Clone)]
pub struct TechnicalFilter {
    patterns: Vec<Regex>,
}

impl TechnicalFilter {
    pub fn new() -> Result<Self> {
        let patterns = TECHNICAL_PATTERNS
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    CorpusError::invariant(format!("technical filter pattern {}: {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_noise(&self, text: &str) -> bool {
        if !text.chars().any(char::is_alphanumeric) {
            return true;
        }
        let distinct: HashSet<char> = text.chars().flat_map(char::to_lowercase).collect();
        if distinct.len() <= 2 && text.chars().count() > 4 {
            return true;
        }
        self.patterns.iter().any(|re| re.is_match(text))
    }
}

/// Filters applied to every raw string.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Minimum length in characters after trimming.
    pub min_length: usize,
    /// Discard strings made only of ASCII digits.
    pub skip_numeric: bool,
    /// Lowercased strings to discard.
    pub stopwords: HashSet<String>,
    /// Technical-noise filter; off unless configured.
    pub technical: Option<TechnicalFilter>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            min_length: 4,
            skip_numeric: true,
            stopwords: HashSet::new(),
            technical: None,
        }
    }
}

impl NormalizeOptions {
    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            min_length,
            ..Self::default()
        }
    }

    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    pub fn with_technical_filter(mut self) -> Result<Self> {
        self.technical = Some(TechnicalFilter::new()?);
        Ok(self)
    }
}

/// Canonicalize one raw string, or `None` if it carries no signal.
pub fn normalize_text(raw: &str, opts: &NormalizeOptions) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            '\t' | '\n' | '\r' => Some(' '),
            char::REPLACEMENT_CHARACTER => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    let canonical = cleaned.trim();

    if canonical.chars().count() < opts.min_length {
        return None;
    }
    if opts.skip_numeric && canonical.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !opts.stopwords.is_empty() && opts.stopwords.contains(&canonical.to_lowercase()) {
        return None;
    }
    if opts
        .technical
        .as_ref()
        .is_some_and(|filter| filter.is_noise(canonical))
    {
        return None;
    }
    Some(canonical.to_string())
}

/// Canonicalize a raw byte run (e.g. a printable run from a binary),
/// decoding it lossily first.
pub fn normalize_bytes(raw: &[u8], opts: &NormalizeOptions) -> Option<String> {
    normalize_text(&String::from_utf8_lossy(raw), opts)
}

/// Collapse raw `(text, count)` pairs to `canonical_text → count`.
///
/// Different raw spellings that normalize to the same text (e.g. differing
/// only in surrounding whitespace) are merged and their counts summed.
/// Zero counts are treated as one occurrence. A merged count above
/// [`MAX_COUNT`] is an input error.
pub fn collapse_words<I, S>(raw: I, opts: &NormalizeOptions) -> Result<BTreeMap<String, u64>>
where
    I: IntoIterator<Item = (S, u64)>,
    S: AsRef<str>,
{
    let mut out: BTreeMap<String, u64> = BTreeMap::new();
    for (text, count) in raw {
        if let Some(canonical) = normalize_text(text.as_ref(), opts) {
            let slot = out.entry(canonical).or_insert(0);
            *slot = slot
                .checked_add(count.max(1))
                .filter(|total| *total <= MAX_COUNT)
                .ok_or_else(|| {
                    CorpusError::input(format!(
                        "occurrence count of {:?} exceeds {}",
                        text.as_ref(),
                        MAX_COUNT
                    ))
                })?;
        }
    }
    Ok(out)
}

/// Normalize, collapse, and categorize one app's raw strings into the batch
/// handed to the store.
pub fn prepare_words<I, S>(
    raw: I,
    opts: &NormalizeOptions,
    classifier: &dyn Classifier,
) -> Result<Vec<WordEntry>>
where
    I: IntoIterator<Item = (S, u64)>,
    S: AsRef<str>,
{
    Ok(collapse_words(raw, opts)?
        .into_iter()
        .map(|(text, count)| {
            let category = classifier.classify(&text).as_str().to_string();
            WordEntry {
                text,
                category,
                count,
            }
        })
        .collect())
}

/// A resource as reported by the upstream hasher, one per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResource {
    pub digest: String,
    pub size: u64,
    pub category: Option<String>,
    pub path: String,
}

/// Collapse an app's resource files to one entry per digest.
///
/// The first path seen becomes the example name; the category falls back to
/// the extension of that path when the hasher did not supply one. Digests
/// are lowercased but otherwise trusted. The same digest declared with two
/// different sizes is malformed input.
pub fn prepare_resources(raw: &[RawResource]) -> Result<Vec<ResourceEntry>> {
    let mut by_digest: BTreeMap<String, ResourceEntry> = BTreeMap::new();
    for r in raw {
        let digest = r.digest.trim().to_ascii_lowercase();
        if digest.is_empty() {
            return Err(CorpusError::input(format!(
                "resource '{}' has an empty digest",
                r.path
            )));
        }
        if r.size > MAX_RESOURCE_SIZE {
            return Err(CorpusError::input(format!(
                "resource '{}' declares size {} above {}",
                r.path, r.size, MAX_RESOURCE_SIZE
            )));
        }
        match by_digest.get_mut(&digest) {
            Some(existing) => {
                if existing.size != r.size {
                    return Err(CorpusError::input(format!(
                        "resource digest {} declared with sizes {} and {}",
                        digest, existing.size, r.size
                    )));
                }
                existing.count += 1;
            }
            None => {
                let category = match &r.category {
                    Some(c) => c
                        .parse::<ResourceCategory>()
                        .unwrap_or_else(|_| ResourceCategory::from_file_name(&r.path)),
                    None => ResourceCategory::from_file_name(&r.path),
                };
                let example_name = r
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or(r.path.as_str())
                    .to_string();
                by_digest.insert(
                    digest.clone(),
                    ResourceEntry {
                        digest,
                        size: r.size,
                        category: category.as_str().to_string(),
                        example_name,
                        count: 1,
                    },
                );
            }
        }
    }
    Ok(by_digest.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{StringCategory, Uncategorized};

    #[test]
    fn trims_and_filters_short() {
        let opts = NormalizeOptions::default();
        assert_eq!(normalize_text("  login \n", &opts).as_deref(), Some("login"));
        assert_eq!(normalize_text("abc", &opts), None);
        assert_eq!(normalize_text("   ", &opts), None);
        assert_eq!(normalize_text("abcd", &opts).as_deref(), Some("abcd"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let opts = NormalizeOptions::default();
        assert_eq!(normalize_text("登录成功", &opts).as_deref(), Some("登录成功"));
        assert_eq!(normalize_text("登录", &opts), None);
    }

    #[test]
    fn strips_control_and_replacement_chars() {
        let opts = NormalizeOptions::default();
        assert_eq!(
            normalize_text("\u{0}log\u{FFFD}in\u{7}", &opts).as_deref(),
            Some("login")
        );
        assert_eq!(
            normalize_bytes(b"sub\xffmit", &opts).as_deref(),
            Some("submit")
        );
    }

    #[test]
    fn numeric_and_stopwords() {
        let opts = NormalizeOptions::default().with_stopwords(["Foundation"]);
        assert_eq!(normalize_text("123456", &opts), None);
        assert_eq!(normalize_text("foundation", &opts), None);
        assert_eq!(normalize_text("v1234", &opts).as_deref(), Some("v1234"));

        let keep_numbers = NormalizeOptions {
            skip_numeric: false,
            ..NormalizeOptions::default()
        };
        assert_eq!(normalize_text("123456", &keep_numbers).as_deref(), Some("123456"));
    }

    #[test]
    fn collapse_sums_duplicates() {
        let opts = NormalizeOptions::with_min_length(4);
        let raw = vec![
            ("login", 1),
            ("login", 1),
            (" login", 0),
            ("error:timeout", 1),
            ("ok", 5),
        ];
        let collapsed = collapse_words(raw, &opts).unwrap();
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed["login"], 3);
        assert_eq!(collapsed["error:timeout"], 1);
    }

    #[test]
    fn prepare_words_categorizes_everything() {
        let opts = NormalizeOptions::default();
        let classify = |t: &str| {
            if t.contains("error") {
                StringCategory::Error
            } else {
                StringCategory::Uncategorized
            }
        };
        let words =
            prepare_words(vec![("error:timeout", 1), ("submit", 2)], &opts, &classify).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "error:timeout");
        assert_eq!(words[0].category, "error");
        assert_eq!(words[1].category, "uncategorized");
        assert_eq!(words[1].count, 2);

        let empty = prepare_words(Vec::<(String, u64)>::new(), &opts, &Uncategorized).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn oversized_counts_are_input_errors() {
        let opts = NormalizeOptions::default();
        let overflow = vec![("login", u64::MAX), ("login", 1)];
        assert!(matches!(
            collapse_words(overflow, &opts),
            Err(CorpusError::Input(_))
        ));

        let merged_past_bound = vec![("login", MAX_COUNT), (" login ", 1)];
        assert!(matches!(
            prepare_words(merged_past_bound, &opts, &Uncategorized),
            Err(CorpusError::Input(_))
        ));

        let at_bound = collapse_words(vec![("login", MAX_COUNT)], &opts).unwrap();
        assert_eq!(at_bound["login"], MAX_COUNT);
    }

    #[test]
    fn technical_filter_is_opt_in() {
        let plain = NormalizeOptions::default();
        let strict = NormalizeOptions::default().with_technical_filter().unwrap();
        let noise = [
            "9f86d081884c7d659a2feaa0c55ad015",
            "123e4567-e89b-12d3-a456-426614174000",
            "_$s10Foundation4DateV",
            "_swift_allocObject",
            "v24@0:8",
            "@\"NSString\"16@0:8",
            "<?xml version=\"1.0\"?>",
            "@rpath/Alamofire.framework/Alamofire",
            "-----",
            "aaaaaa",
            "abababab",
        ];
        for text in noise {
            assert!(normalize_text(text, &plain).is_some(), "{}", text);
            assert_eq!(normalize_text(text, &strict), None, "{}", text);
        }
        for text in ["Sign in to continue", "error:timeout", "登录成功", "com.acme.mail"] {
            assert_eq!(normalize_text(text, &strict).as_deref(), Some(text));
        }
    }

    #[test]
    fn resources_collapse_by_digest() {
        let raw = vec![
            RawResource {
                digest: "AAAA".into(),
                size: 10,
                category: None,
                path: "Payload/a.png".into(),
            },
            RawResource {
                digest: "aaaa".into(),
                size: 10,
                category: None,
                path: "Payload/copy.png".into(),
            },
            RawResource {
                digest: "bbbb".into(),
                size: 3,
                category: Some("fonts".into()),
                path: "x.bin".into(),
            },
        ];
        let entries = prepare_resources(&raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].digest, "aaaa");
        assert_eq!(entries[0].count, 2);
        assert_eq!(entries[0].example_name, "a.png");
        assert_eq!(entries[0].category, "image");
        assert_eq!(entries[1].category, "font");
    }

    #[test]
    fn oversized_resource_is_input_error() {
        let raw = vec![RawResource {
            digest: "dd".into(),
            size: u64::MAX,
            category: None,
            path: "huge.bin".into(),
        }];
        assert!(matches!(prepare_resources(&raw), Err(CorpusError::Input(_))));
    }

    #[test]
    fn resource_size_conflict_is_input_error() {
        let raw = vec![
            RawResource {
                digest: "cc".into(),
                size: 1,
                category: None,
                path: "a".into(),
            },
            RawResource {
                digest: "cc".into(),
                size: 2,
                category: None,
                path: "b".into(),
            },
        ];
        assert!(matches!(prepare_resources(&raw), Err(CorpusError::Input(_))));
    }
}
