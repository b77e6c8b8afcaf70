//! Last published fingerprint per category

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::SignatureMode;

/// What a category looked like when it was rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    /// Matched row count
    pub count: usize,
    /// SHA-256 of the rendered content, hex encoded
    pub signature: Option<String>,
}

impl Fingerprint {
    pub fn new(count: usize, content: &str, mode: SignatureMode) -> Self {
        let signature = match mode {
            SignatureMode::Content => Some(hex::encode(Sha256::digest(content.as_bytes()))),
            SignatureMode::Count => None,
        };
        Self { count, signature }
    }

    /// Whether `self` differs from a previously published fingerprint
    pub fn differs_from(&self, published: &Fingerprint) -> bool {
        match (&self.signature, &published.signature) {
            (Some(current), Some(previous)) => current != previous,
            _ => self.count != published.count,
        }
    }
}

/// Publish state of one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CategoryState {
    /// Never published by this process
    Unset,
    Published {
        fingerprint: Fingerprint,
        published_at: DateTime<Utc>,
    },
}

impl CategoryState {
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            CategoryState::Unset => None,
            CategoryState::Published { fingerprint, .. } => Some(fingerprint),
        }
    }
}

/// Publish state of every tracked category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishState {
    entries: BTreeMap<String, CategoryState>,
}

impl PublishState {
    /// State with every category set to [`CategoryState::Unset`]
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            entries: names
                .into_iter()
                .map(|name| (name.to_string(), CategoryState::Unset))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CategoryState> {
        self.entries.get(name)
    }

    /// Whether `fingerprint` needs publishing for category `name`
    ///
    /// Unknown and unset categories are always dirty.
    pub fn is_dirty(&self, name: &str, fingerprint: &Fingerprint) -> bool {
        match self.entries.get(name).and_then(CategoryState::fingerprint) {
            Some(published) => fingerprint.differs_from(published),
            None => true,
        }
    }

    pub(crate) fn record(&mut self, name: &str, fingerprint: Fingerprint, at: DateTime<Utc>) {
        self.entries.insert(
            name.to_string(),
            CategoryState::Published {
                fingerprint,
                published_at: at,
            },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryState)> {
        self.entries.iter().map(|(name, state)| (name.as_str(), state))
    }
}
