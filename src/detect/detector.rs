//! Change detection across categories
//!
//! [`ChangeDetector::evaluate`] renders every category against a table and
//! compares it with the last published fingerprint without touching state.
//! [`ChangeDetector::commit`] is the only place state changes, and it is
//! called once the gist write carrying the dirty set has succeeded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::category::{builtin, group_by_owner, Category, RenderContext};
use super::state::{Fingerprint, PublishState};
use crate::config::SignatureMode;
use crate::github::{GistFile, GistFiles};
use crate::source::{SheetRow, Table};

/// Per-owner summary of a grouped category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub owner_id: String,
    pub display_name: String,
    pub count: usize,
}

/// One category rendered against one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub category: String,
    pub label: String,
    pub filename: String,
    pub description: String,
    #[serde(skip)]
    pub rows: Vec<SheetRow>,
    pub count: usize,
    pub groups: Vec<GroupSummary>,
    #[serde(skip)]
    pub content: String,
    pub fingerprint: Fingerprint,
}

/// Snapshots of every category with their dirty verdict, in category order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    entries: Vec<(Snapshot, bool)>,
}

impl Evaluation {
    pub fn get(&self, category: &str) -> Option<&Snapshot> {
        self.entries
            .iter()
            .find(|(snapshot, _)| snapshot.category == category)
            .map(|(snapshot, _)| snapshot)
    }

    pub fn is_dirty(&self, category: &str) -> bool {
        self.entries
            .iter()
            .any(|(snapshot, dirty)| *dirty && snapshot.category == category)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter().map(|(snapshot, _)| snapshot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Snapshot, bool)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dirty snapshots staged for publishing
    pub fn dirty_set(&self) -> DirtySet {
        DirtySet {
            entries: self
                .entries
                .iter()
                .filter(|(_, dirty)| *dirty)
                .map(|(snapshot, _)| DirtyEntry {
                    category: snapshot.category.clone(),
                    label: snapshot.label.clone(),
                    filename: snapshot.filename.clone(),
                    content: snapshot.content.clone(),
                    fingerprint: snapshot.fingerprint.clone(),
                })
                .collect(),
        }
    }
}

/// One staged file of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyEntry {
    pub category: String,
    pub label: String,
    pub filename: String,
    pub content: String,
    pub fingerprint: Fingerprint,
}

/// Categories whose content differs from what was last published
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    entries: Vec<DirtyEntry>,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirtyEntry> {
        self.entries.iter()
    }

    pub fn categories(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.category.as_str()).collect()
    }

    /// File map of a gist update
    pub fn to_gist_files(&self) -> GistFiles {
        self.entries
            .iter()
            .map(|entry| {
                (
                    entry.filename.clone(),
                    GistFile::new(entry.filename.clone(), entry.content.clone()),
                )
            })
            .collect()
    }
}

/// Renders categories and tracks what has been published
pub struct ChangeDetector {
    categories: Vec<Box<dyn Category>>,
    state: PublishState,
    mode: SignatureMode,
    context: RenderContext,
}

impl ChangeDetector {
    pub fn new(
        categories: Vec<Box<dyn Category>>,
        mode: SignatureMode,
        context: RenderContext,
    ) -> Self {
        let state = PublishState::new(categories.iter().map(|c| c.name()));
        Self {
            categories,
            state,
            mode,
            context,
        }
    }

    /// Detector over the built-in categories
    pub fn with_builtin(mode: SignatureMode, context: RenderContext) -> Self {
        Self::new(builtin(), mode, context)
    }

    pub fn state(&self) -> &PublishState {
        &self.state
    }

    pub fn mode(&self) -> SignatureMode {
        self.mode
    }

    /// Render every category and compare it with the publish state
    pub fn evaluate(&self, table: &Table) -> Evaluation {
        let entries = self
            .categories
            .iter()
            .map(|category| {
                let snapshot = self.snapshot(category.as_ref(), table);
                let dirty = self.state.is_dirty(&snapshot.category, &snapshot.fingerprint);
                debug!(
                    category = %snapshot.category,
                    count = snapshot.count,
                    dirty = dirty,
                    "Evaluated category"
                );
                (snapshot, dirty)
            })
            .collect();

        Evaluation { entries }
    }

    /// Record the dirty set as published at `at`
    pub fn commit(&mut self, dirty: &DirtySet, at: DateTime<Utc>) {
        for entry in dirty.iter() {
            self.state
                .record(&entry.category, entry.fingerprint.clone(), at);
        }
    }

    fn snapshot(&self, category: &dyn Category, table: &Table) -> Snapshot {
        let rows: Vec<SheetRow> = table
            .rows
            .iter()
            .filter(|row| category.matches(row))
            .cloned()
            .collect();

        let (content, groups) = if category.grouped() {
            let groups = group_by_owner(&rows);
            let content = category.render(&rows, &groups, &self.context);
            let summaries = groups
                .iter()
                .map(|group| GroupSummary {
                    owner_id: group.owner_id.to_string(),
                    display_name: self.context.display_name(group.owner_id).to_string(),
                    count: group.rows.len(),
                })
                .collect();
            (content, summaries)
        } else {
            (category.render(&rows, &[], &self.context), Vec::new())
        };

        let count = rows.len();
        let fingerprint = Fingerprint::new(count, &content, self.mode);

        Snapshot {
            category: category.name().to_string(),
            label: category.label().to_string(),
            filename: category.filename().to_string(),
            description: category.describe(count),
            rows,
            count,
            groups,
            content,
            fingerprint,
        }
    }
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field(
                "categories",
                &self.categories.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("state", &self.state)
            .field("mode", &self.mode)
            .finish()
    }
}
