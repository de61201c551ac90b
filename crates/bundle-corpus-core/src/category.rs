//! Category tags for words and resources.
//!
//! Both sets are closed enums. Anything a classifier cannot place lands in
//! the catch-all tag (`uncategorized` / `other`); nothing is ever dropped
//! for lack of a category.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category tag assigned to a canonical word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringCategory {
    Url,
    Api,
    Error,
    BundleId,
    FilePath,
    Domain,
    Email,
    Version,
    Coordinates,
    Number,
    UiText,
    DebugInfo,
    ClassMethod,
    Uncategorized,
}

impl StringCategory {
    pub const ALL: [StringCategory; 14] = [
        StringCategory::Url,
        StringCategory::Api,
        StringCategory::Error,
        StringCategory::BundleId,
        StringCategory::FilePath,
        StringCategory::Domain,
        StringCategory::Email,
        StringCategory::Version,
        StringCategory::Coordinates,
        StringCategory::Number,
        StringCategory::UiText,
        StringCategory::DebugInfo,
        StringCategory::ClassMethod,
        StringCategory::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StringCategory::Url => "url",
            StringCategory::Api => "api",
            StringCategory::Error => "error",
            StringCategory::BundleId => "bundle_id",
            StringCategory::FilePath => "file_path",
            StringCategory::Domain => "domain",
            StringCategory::Email => "email",
            StringCategory::Version => "version",
            StringCategory::Coordinates => "coordinates",
            StringCategory::Number => "number",
            StringCategory::UiText => "ui_text",
            StringCategory::DebugInfo => "debug_info",
            StringCategory::ClassMethod => "class_method",
            StringCategory::Uncategorized => "uncategorized",
        }
    }
}

impl fmt::Display for StringCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StringCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StringCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown string category: '{}'", s))
    }
}

/// A pure, total text classifier.
///
/// Implementations must never fail; text they cannot place maps to
/// [`StringCategory::Uncategorized`].
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> StringCategory;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> StringCategory + Send + Sync,
{
    fn classify(&self, text: &str) -> StringCategory {
        self(text)
    }
}

/// Classifier that tags everything as uncategorized.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncategorized;

impl Classifier for Uncategorized {
    fn classify(&self, _text: &str) -> StringCategory {
        StringCategory::Uncategorized
    }
}

/// Inferred type of a resource file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Image,
    Audio,
    Video,
    Document,
    Data,
    Font,
    Certificate,
    Archive,
    Code,
    Config,
    Other,
}

const EXTENSIONS: &[(ResourceCategory, &[&str])] = &[
    (
        ResourceCategory::Image,
        &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "svg", "webp", "ico", "heic"],
    ),
    (
        ResourceCategory::Audio,
        &["mp3", "wav", "m4a", "aac", "ogg", "wma", "flac", "caf"],
    ),
    (
        ResourceCategory::Video,
        &["mp4", "mov", "avi", "mkv", "wmv", "flv", "webm"],
    ),
    (ResourceCategory::Document, &["pdf", "txt", "rtf", "doc", "docx", "md"]),
    (
        ResourceCategory::Data,
        &["json", "xml", "plist", "db", "sqlite", "realm", "strings", "car", "nib"],
    ),
    (ResourceCategory::Font, &["ttf", "otf", "woff", "woff2"]),
    (
        ResourceCategory::Certificate,
        &["cer", "crt", "pem", "p12", "mobileprovision"],
    ),
    (ResourceCategory::Archive, &["zip", "tar", "gz", "7z"]),
    (ResourceCategory::Code, &["js", "html", "css", "lua", "py"]),
    (ResourceCategory::Config, &["conf", "ini", "yaml", "yml", "toml"]),
];

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 11] = [
        ResourceCategory::Image,
        ResourceCategory::Audio,
        ResourceCategory::Video,
        ResourceCategory::Document,
        ResourceCategory::Data,
        ResourceCategory::Font,
        ResourceCategory::Certificate,
        ResourceCategory::Archive,
        ResourceCategory::Code,
        ResourceCategory::Config,
        ResourceCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Image => "image",
            ResourceCategory::Audio => "audio",
            ResourceCategory::Video => "video",
            ResourceCategory::Document => "document",
            ResourceCategory::Data => "data",
            ResourceCategory::Font => "font",
            ResourceCategory::Certificate => "certificate",
            ResourceCategory::Archive => "archive",
            ResourceCategory::Code => "code",
            ResourceCategory::Config => "config",
            ResourceCategory::Other => "other",
        }
    }

    /// Infer the category from a file name or path by its extension.
    pub fn from_file_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => ext.to_ascii_lowercase(),
            _ => return ResourceCategory::Other,
        };
        EXTENSIONS
            .iter()
            .find(|(_, exts)| exts.contains(&ext.as_str()))
            .map(|(cat, _)| *cat)
            .unwrap_or(ResourceCategory::Other)
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the plural spellings older extractors emit ("images", "fonts").
        let s = s.to_ascii_lowercase();
        let singular = s.strip_suffix('s').unwrap_or(&s);
        ResourceCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s || c.as_str() == singular)
            .ok_or_else(|| format!("unknown resource category: '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_category_roundtrip_tags() {
        for c in StringCategory::ALL {
            assert_eq!(c.as_str().parse::<StringCategory>().unwrap(), c);
        }
        assert!("bogus".parse::<StringCategory>().is_err());
    }

    #[test]
    fn closure_is_a_classifier() {
        let c = |t: &str| {
            if t.starts_with("http") {
                StringCategory::Url
            } else {
                StringCategory::Uncategorized
            }
        };
        assert_eq!(c.classify("https://a.b"), StringCategory::Url);
        assert_eq!(Uncategorized.classify("anything"), StringCategory::Uncategorized);
    }

    #[test]
    fn resource_category_by_extension() {
        assert_eq!(ResourceCategory::from_file_name("Assets/logo.PNG"), ResourceCategory::Image);
        assert_eq!(ResourceCategory::from_file_name("click.caf"), ResourceCategory::Audio);
        assert_eq!(ResourceCategory::from_file_name("Info.plist"), ResourceCategory::Data);
        assert_eq!(ResourceCategory::from_file_name("Roboto.ttf"), ResourceCategory::Font);
        assert_eq!(ResourceCategory::from_file_name("README"), ResourceCategory::Other);
        assert_eq!(ResourceCategory::from_file_name(".hidden"), ResourceCategory::Other);
        assert_eq!(ResourceCategory::from_file_name("dir.d/file"), ResourceCategory::Other);
    }

    #[test]
    fn resource_category_accepts_plurals() {
        assert_eq!("images".parse::<ResourceCategory>().unwrap(), ResourceCategory::Image);
        assert_eq!("Font".parse::<ResourceCategory>().unwrap(), ResourceCategory::Font);
        assert_eq!("data".parse::<ResourceCategory>().unwrap(), ResourceCategory::Data);
        assert!("sprites".parse::<ResourceCategory>().is_err());
    }
}
