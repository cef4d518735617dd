//! Locale selection and localized value resolution
//!
//! Resolution order is fixed: an exact match on the active locale tag, then
//! the untagged value. Region and language tags are not related to each other,
//! so `ru_RU` does not match a `ru` variant.

use serde::{Deserialize, Serialize};

/// One value of a key, optionally tagged with a locale (`Name[ru]=...`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVariant {
    pub locale: Option<String>,
    pub value: String,
}

impl KeyVariant {
    pub fn new(locale: Option<&str>, value: &str) -> Self {
        Self {
            locale: locale.map(str::to_string),
            value: value.to_string(),
        }
    }
}

/// The active locale used to pick display strings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locale {
    tag: Option<String>,
}

impl Locale {
    /// A locale with the given tag; `C`, `POSIX` and empty tags mean "no locale"
    pub fn new(tag: &str) -> Self {
        let tag = normalize(tag);
        Self { tag }
    }

    /// Locale that only ever resolves untagged values
    pub fn untagged() -> Self {
        Self::default()
    }

    /// Locale from `LC_ALL`, `LC_MESSAGES` or `LANG`, first non-empty wins
    pub fn from_env() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
            .map(|value| Self::new(&value))
            .unwrap_or_default()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Pick the variant for this locale: exact tag first, then untagged
    pub fn resolve<'a>(&self, variants: &'a [KeyVariant]) -> Option<&'a str> {
        if let Some(tag) = &self.tag {
            if let Some(exact) = variants
                .iter()
                .find(|v| v.locale.as_deref() == Some(tag.as_str()))
            {
                return Some(exact.value.as_str());
            }
        }

        variants
            .iter()
            .find(|v| v.locale.is_none())
            .map(|v| v.value.as_str())
    }
}

/// Strip encoding and modifier suffixes: `ru_RU.UTF-8@euro` -> `ru_RU`
fn normalize(tag: &str) -> Option<String> {
    let tag = tag.trim();
    let tag = tag.split(['.', '@']).next().unwrap_or_default();

    match tag {
        "" | "C" | "POSIX" => None,
        tag => Some(tag.to_string()),
    }
}

/// All locale variants of one localizable key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedText {
    variants: Vec<KeyVariant>,
}

impl LocalizedText {
    pub fn new(variants: Vec<KeyVariant>) -> Self {
        Self { variants }
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn variants(&self) -> &[KeyVariant] {
        &self.variants
    }

    pub fn resolve(&self, locale: &Locale) -> Option<&str> {
        locale.resolve(&self.variants)
    }

    pub fn resolve_or(&self, locale: &Locale, default: &str) -> String {
        self.resolve(locale).unwrap_or(default).to_string()
    }
}
