//! Section storage for descriptor files
//!
//! A descriptor is a desktop-entry style file: `[Section]` headers followed by
//! `Key=Value` and `Key[locale]=Value` lines. Each key keeps its locale variants
//! as an ordered list, in file order.

use std::collections::HashMap;

use super::locale::{KeyVariant, Locale, LocalizedText};

/// Separator of list-valued keys such as `Arguments`
const LIST_SEPARATOR: char = ';';

/// A named group of keys
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    name: String,
    keys: HashMap<String, Vec<KeyVariant>>,
}

impl Section {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            keys: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a value; a repeated (key, locale) pair replaces the earlier value
    pub fn insert(&mut self, key: &str, locale: Option<&str>, value: &str) {
        let variants = self.keys.entry(key.to_string()).or_default();

        match variants.iter_mut().find(|v| v.locale.as_deref() == locale) {
            Some(existing) => existing.value = value.to_string(),
            None => variants.push(KeyVariant::new(locale, value)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// All locale variants of a key, in file order
    pub fn variants(&self, key: &str) -> &[KeyVariant] {
        self.keys.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// The untagged value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        Locale::untagged().resolve(self.variants(key))
    }

    pub fn resolve(&self, key: &str, locale: &Locale) -> Option<&str> {
        locale.resolve(self.variants(key))
    }

    pub fn localized(&self, key: &str) -> LocalizedText {
        LocalizedText::new(self.variants(key).to_vec())
    }

    /// The untagged value of a list key, split on `;` with empty items dropped
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| {
            value
                .split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

/// All sections of one descriptor, in file order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sections {
    sections: Vec<Section>,
}

impl Sections {
    /// Split descriptor text into sections
    ///
    /// Malformed lines and keys outside any section are skipped.
    pub fn parse(text: &str) -> Self {
        let mut sections = Self::default();
        let mut current: Option<usize> = None;

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(sections.section_index(header.trim()));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line = number + 1, "Skipping malformed descriptor line");
                continue;
            };

            let Some(index) = current else {
                tracing::debug!(line = number + 1, "Skipping key outside of any section");
                continue;
            };

            let Some((key, locale)) = split_locale(key.trim()) else {
                tracing::debug!(line = number + 1, "Skipping key with malformed locale");
                continue;
            };

            sections.sections[index].insert(key, locale, value.trim());
        }

        sections
    }

    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Index of a section, created on first use so repeated headers merge
    fn section_index(&mut self, name: &str) -> usize {
        match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        }
    }
}

/// Split `Name[ru]` into (`Name`, `Some("ru")`)
fn split_locale(key: &str) -> Option<(&str, Option<&str>)> {
    match key.find('[') {
        None if key.is_empty() => None,
        None => Some((key, None)),
        Some(open) => {
            let locale = key[open + 1..].strip_suffix(']')?;
            let base = key[..open].trim_end();
            if base.is_empty() || locale.is_empty() {
                return None;
            }
            Some((base, Some(locale)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"
# network checks
[Alterator Entry]
Type = Diag
Name=network-diag
DisplayName=Network
DisplayName[ru]=Сеть
Arguments=--quiet;;--color=never;

[ping]
DisplayName=Ping gateway
"#;

    #[test]
    fn test_parse_sections_in_order() {
        let sections = Sections::parse(DESCRIPTOR);
        assert_eq!(sections.names().collect::<Vec<_>>(), vec!["Alterator Entry", "ping"]);
    }

    #[test]
    fn test_locale_variants_kept_in_file_order() {
        let sections = Sections::parse(DESCRIPTOR);
        let entry = sections.get("Alterator Entry").unwrap();

        let variants = entry.variants("DisplayName");
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].locale, None);
        assert_eq!(variants[1].locale.as_deref(), Some("ru"));
        assert_eq!(entry.resolve("DisplayName", &Locale::new("ru")), Some("Сеть"));
        assert_eq!(entry.get("Type"), Some("Diag"));
    }

    #[test]
    fn test_list_values_drop_empty_items() {
        let sections = Sections::parse(DESCRIPTOR);
        let entry = sections.get("Alterator Entry").unwrap();
        assert_eq!(
            entry.list("Arguments"),
            Some(vec!["--quiet".to_string(), "--color=never".to_string()])
        );
        assert_eq!(entry.list("Missing"), None);
    }

    #[test]
    fn test_repeated_key_keeps_last_value() {
        let sections = Sections::parse("[s]\nName=a\nName=b\nName[xx]=c\nName[xx]=d\n");
        let section = sections.get("s").unwrap();
        assert_eq!(section.variants("Name").len(), 2);
        assert_eq!(section.get("Name"), Some("b"));
        assert_eq!(section.resolve("Name", &Locale::new("xx")), Some("d"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let sections = Sections::parse("Orphan=1\n[s]\nno separator\nName[=x\n[]=y\nGood=yes\n");
        let section = sections.get("s").unwrap();
        assert!(!section.contains("Orphan"));
        assert!(!section.contains("Name"));
        assert_eq!(section.get("Good"), Some("yes"));
    }

    #[test]
    fn test_repeated_header_merges() {
        let sections = Sections::parse("[s]\nA=1\n[t]\nB=2\n[s]\nC=3\n");
        assert_eq!(sections.len(), 2);
        let section = sections.get("s").unwrap();
        assert_eq!(section.get("A"), Some("1"));
        assert_eq!(section.get("C"), Some("3"));
    }
}
