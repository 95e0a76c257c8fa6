use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_DICTIONARY: &str = include_str!("../../assets/dictionary.json");

#[derive(Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    exact: HashMap<String, String>,
    #[serde(default)]
    keywords: HashMap<String, String>,
}

/// Curated Vietnamese -> English phrases.
///
/// `exact` maps whole normalized queries; `keywords` are visual terms that
/// must survive translation, kept sorted longest-first so that a longer
/// phrase claims its span before any phrase nested inside it.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    exact: HashMap<String, String>,
    keywords: Vec<(String, String)>,
}

impl Dictionary {
    pub fn new(exact: HashMap<String, String>, keywords: HashMap<String, String>) -> Self {
        let exact = exact
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();

        let mut keywords: Vec<(String, String)> = keywords
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        // Character count, not bytes: diacritics are multi-byte
        keywords.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        Self { exact, keywords }
    }

    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_DICTIONARY).context("Failed to parse built-in dictionary")
    }

    /// Load from `path` when given, otherwise the built-in set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::parse(&data).with_context(|| format!("Failed to parse {}", path.display()))
            }
            None => Self::builtin(),
        }
    }

    fn parse(data: &str) -> Result<Self> {
        let file: DictionaryFile = serde_json::from_str(data)?;
        Ok(Self::new(file.exact, file.keywords))
    }

    pub fn exact(&self, normalized_query: &str) -> Option<&str> {
        self.exact.get(normalized_query).map(String::as_str)
    }

    /// Keyword pairs, longest source phrase first.
    pub fn keywords(&self) -> &[(String, String)] {
        &self.keywords
    }

    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }
}
