//! Default string classifier.
//!
//! Tags each canonical word with one [`StringCategory`]. Regex rules are
//! tried in a fixed order and the first match wins; strings no rule
//! matches fall through to three heuristics (UI text, debug/runtime
//! noise, class or selector names) and finally to `uncategorized`.

use anyhow::{Context, Result};
use regex::Regex;

use bundle_corpus_core::category::{Classifier, StringCategory};

/// (category, pattern) in evaluation order.
const RULES: &[(StringCategory, &str)] = &[
    (StringCategory::Url, r"(?i)^[a-z][a-z0-9+.-]*://\S+"),
    (StringCategory::Api, r"(?i)/api/\S*"),
    (
        StringCategory::Error,
        r"(?i)\b(error|failed|failure|exception|invalid|warning|alert|fault)",
    ),
    (
        StringCategory::BundleId,
        r"^[a-zA-Z][a-zA-Z0-9-]*(\.[a-zA-Z][a-zA-Z0-9-]*){2,}$",
    ),
    (
        StringCategory::FilePath,
        r"(?i)^[^\s]+\.(png|jpe?g|gif|mp3|wav|m4a|json|plist|xml|txt|pdf|strings|nib|car)$",
    ),
    (StringCategory::Domain, r"^([a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}$"),
    (
        StringCategory::Email,
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$",
    ),
    (StringCategory::Version, r"^v?\d+\.\d+(\.\d+)*$"),
    (StringCategory::Coordinates, r"^-?\d+\.\d+,\s*-?\d+\.\d+$"),
    (StringCategory::Number, r"^-?\d[\d,.]*$"),
];

const UI_KEYWORDS: &[&str] = &[
    "button", "click", "tap", "swipe", "loading", "success", "cancel", "confirm", "please",
    "welcome", "sign in", "log in", "settings",
];

const UI_CJK: &[&str] = &["请", "您", "确认", "取消", "成功", "失败", "登录", "设置"];

const DEBUG_MARKERS: &[&str] = &[
    "_objc_",
    "objc_msgSend",
    "swift_retain",
    "swift_release",
    "swift_task_",
    "debugDescription",
    ".cxx_destruct",
    "radar://",
    "radr://",
    "/usr/lib/",
    "/System/Library/",
    "<?xml",
    "<plist",
    "<!DOCTYPE",
];

/// Regex-driven [`Classifier`] with a closed category set.
pub struct PatternClassifier {
    rules: Vec<(StringCategory, Regex)>,
    selector: Regex,
    type_name: Regex,
}

impl PatternClassifier {
    pub fn new() -> Result<Self> {
        let rules = RULES
            .iter()
            .map(|(category, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*category, re))
                    .with_context(|| format!("invalid {} pattern", category))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            // Objective-C selectors: `viewDidLoad`, `initWithFrame:style:`
            selector: Regex::new(r"^[a-z_][A-Za-z0-9_]*(:([A-Za-z0-9_]+:)*)?$")?,
            // CamelCase type names and mangled Swift symbols
            type_name: Regex::new(r"^(_\$s[A-Za-z0-9_]+|_?[A-Z]+[a-z0-9]+([A-Z][A-Za-z0-9]*)+)$")?,
        })
    }

    fn is_ui_text(text: &str) -> bool {
        let lower = text.to_lowercase();
        if UI_KEYWORDS.iter().any(|k| lower.contains(k)) || UI_CJK.iter().any(|k| text.contains(k)) {
            return true;
        }
        let sentence_like = text.contains(' ')
            && text.chars().next().is_some_and(|c| c.is_uppercase())
            && text.ends_with(['.', '!', '?']);
        sentence_like
    }

    fn is_debug_info(text: &str) -> bool {
        if DEBUG_MARKERS.iter().any(|m| text.contains(m)) {
            return true;
        }
        // Long unbroken technical tokens, e.g. mangled symbols
        text.chars().count() > 60 && !text.contains([' ', ',', '!', '?'])
    }

    fn is_class_method(&self, text: &str) -> bool {
        let camel = text.chars().any(|c| c.is_uppercase()) || text.contains(':');
        (camel && self.selector.is_match(text)) || self.type_name.is_match(text)
    }
}

impl Classifier for PatternClassifier {
    fn classify(&self, text: &str) -> StringCategory {
        if let Some((category, _)) = self.rules.iter().find(|(_, re)| re.is_match(text)) {
            return *category;
        }
        if Self::is_ui_text(text) {
            StringCategory::UiText
        } else if Self::is_debug_info(text) {
            StringCategory::DebugInfo
        } else if self.is_class_method(text) {
            StringCategory::ClassMethod
        } else {
            StringCategory::Uncategorized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> StringCategory {
        PatternClassifier::new().unwrap().classify(text)
    }

    #[test]
    fn regex_rules_in_order() {
        assert_eq!(classify("https://api.example.com/v1"), StringCategory::Url);
        assert_eq!(classify("/api/v2/users"), StringCategory::Api);
        assert_eq!(classify("error:timeout"), StringCategory::Error);
        assert_eq!(classify("Network request failed"), StringCategory::Error);
        assert_eq!(classify("com.acme.mail"), StringCategory::BundleId);
        assert_eq!(classify("Assets/icons/logo.png"), StringCategory::FilePath);
        assert_eq!(classify("example.com"), StringCategory::Domain);
        assert_eq!(classify("support@acme.io"), StringCategory::Email);
        assert_eq!(classify("2.14.1"), StringCategory::Version);
        assert_eq!(classify("39.9042,116.4074"), StringCategory::Coordinates);
        assert_eq!(classify("1,234,567"), StringCategory::Number);
    }

    #[test]
    fn heuristics() {
        assert_eq!(classify("Tap to continue"), StringCategory::UiText);
        assert_eq!(classify("Your order has shipped."), StringCategory::UiText);
        assert_eq!(classify("请输入密码"), StringCategory::UiText);
        assert_eq!(classify("_objc_empty_cache"), StringCategory::DebugInfo);
        assert_eq!(classify("/usr/lib/libobjc.A.dylib"), StringCategory::DebugInfo);
        assert_eq!(classify("initWithFrame:style:"), StringCategory::ClassMethod);
        assert_eq!(classify("UIViewController"), StringCategory::ClassMethod);
        assert_eq!(classify("viewDidLoad"), StringCategory::ClassMethod);
        assert_eq!(classify("lorem ipsum"), StringCategory::Uncategorized);
        assert_eq!(classify("submit"), StringCategory::Uncategorized);
    }

    #[test]
    fn total_on_odd_input() {
        let c = PatternClassifier::new().unwrap();
        for s in ["", " ", "\u{FFFD}", "::::", "________"] {
            let _ = c.classify(s);
        }
    }
}
