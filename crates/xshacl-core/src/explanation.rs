//! Cached explanations and the persisted cache entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ExplainError, Result};
use crate::justification::JustificationNode;
use crate::signature::{SignatureHash, ViolationSignature};

/// A natural-language explanation in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    /// ISO 639-1 code
    pub language_code: String,
    pub natural_language_text: String,
    #[serde(default)]
    pub correction_suggestions: Vec<String>,
    pub provided_by_model: String,
    pub created_at: DateTime<Utc>,
    /// Tree the explanation was generated from, kept for auditing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<JustificationNode>,
}

impl Explanation {
    pub fn new(
        language_code: impl Into<String>,
        text: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            language_code: normalize_language(&language_code.into()),
            natural_language_text: text.into(),
            correction_suggestions: Vec::new(),
            provided_by_model: model.into(),
            created_at: Utc::now(),
            justification: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.correction_suggestions = suggestions;
        self
    }

    pub fn with_justification(mut self, tree: JustificationNode) -> Self {
        self.justification = Some(tree);
        self
    }
}

/// Lowercased, trimmed language code (`EN ` becomes `en`, `pt_BR` becomes `pt-br`)
pub fn normalize_language(code: &str) -> String {
    code.trim().to_lowercase().replace('_', "-")
}

/// Normalize `code` and check it has the shape of a BCP 47 tag: a 2 or 3
/// letter primary language followed by alphanumeric subtags of up to 8
/// characters, separated by hyphens.
pub fn validate_language(code: &str) -> Result<String> {
    let normalized = normalize_language(code);
    let mut subtags = normalized.split('-');

    let primary_ok = subtags
        .next()
        .is_some_and(|p| (2..=3).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_lowercase()));
    let rest_ok = subtags.all(|s| {
        (1..=8).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    });

    if primary_ok && rest_ok {
        Ok(normalized)
    } else {
        Err(ExplainError::invalid_language(code))
    }
}

/// Auxiliary relation attached to a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Relation {
    /// Another signature hash or a focus node observed with the same failure
    SimilarCase(String),
    /// Free-text rule description
    DomainRule(String),
}

/// Persisted unit: one signature with its explanations and relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub hash: SignatureHash,
    pub signature: ViolationSignature,
    /// Keyed by language code
    #[serde(default)]
    pub explanations: BTreeMap<String, Explanation>,
    #[serde(default)]
    pub similar_cases: BTreeSet<String>,
    #[serde(default)]
    pub domain_rules: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(signature: ViolationSignature) -> Self {
        let now = Utc::now();
        Self {
            hash: signature.hash(),
            signature,
            explanations: BTreeMap::new(),
            similar_cases: BTreeSet::new(),
            domain_rules: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn explanation(&self, language: &str) -> Option<&Explanation> {
        self.explanations.get(&normalize_language(language))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.explanations.keys().map(String::as_str)
    }

    /// Insert or replace the explanation for its language.
    ///
    /// Returns `false` and leaves the entry untouched when an identical
    /// explanation is already stored.
    pub fn upsert_explanation(&mut self, language: &str, mut explanation: Explanation) -> bool {
        let language = normalize_language(language);
        explanation.language_code = language.clone();
        if self.explanations.get(&language) == Some(&explanation) {
            return false;
        }
        self.explanations.insert(language, explanation);
        self.updated_at = Utc::now();
        true
    }

    /// Add a relation; returns `false` if it was already present
    pub fn add_relation(&mut self, relation: Relation) -> bool {
        let inserted = match relation {
            Relation::SimilarCase(case) => self.similar_cases.insert(case),
            Relation::DomainRule(rule) => self.domain_rules.insert(rule),
        };
        if inserted {
            self.updated_at = Utc::now();
        }
        inserted
    }

    pub fn relation_count(&self) -> usize {
        self.similar_cases.len() + self.domain_rules.len()
    }
}
