//! Tracked views of the sheet
//!
//! A category selects rows, optionally groups them by owner and renders the
//! selection as one markdown file of the gist.

use std::collections::BTreeMap;

use crate::config::SourceConfig;
use crate::source::SheetRow;

/// Approval status that marks an entry as reviewed
pub const APPROVED: &str = "Approved";

/// Rendering inputs shared by all categories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    /// Sheet URL used for location links
    pub edit_url: String,
    /// Sheet tab id used for location links
    pub gid: String,
    /// Display names keyed by owner id
    pub users: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn new(source: &SourceConfig, users: BTreeMap<String, String>) -> Self {
        Self {
            edit_url: source.sheet_edit_url(),
            gid: source.sheet_gid(),
            users,
        }
    }

    /// Display name of an owner, falling back to the id
    pub fn display_name<'a>(&'a self, owner_id: &'a str) -> &'a str {
        self.users.get(owner_id).map(String::as_str).unwrap_or(owner_id)
    }

    /// Link to a row of the sheet
    pub fn location(&self, line: u64) -> String {
        format!("{}#gid={}&range={}:{}", self.edit_url, self.gid, line, line)
    }
}

/// Matched rows of one owner, in sheet order
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerGroup<'a> {
    pub owner_id: &'a str,
    pub rows: Vec<&'a SheetRow>,
}

/// Group rows by owner id; groups are ordered by owner id
///
/// Rows without an owner are not part of any group.
pub fn group_by_owner<'a>(rows: &'a [SheetRow]) -> Vec<OwnerGroup<'a>> {
    let mut groups: BTreeMap<&'a str, Vec<&'a SheetRow>> = BTreeMap::new();
    for row in rows {
        if let Some(owner_id) = row.owner_id.as_deref() {
            groups.entry(owner_id).or_default().push(row);
        }
    }

    groups
        .into_iter()
        .map(|(owner_id, rows)| OwnerGroup { owner_id, rows })
        .collect()
}

/// One tracked view of the sheet
pub trait Category: Send + Sync {
    /// Stable identifier, the key of the publish state
    fn name(&self) -> &'static str;

    /// Gist file the category is published to
    fn filename(&self) -> &'static str;

    /// Human label used in notifications
    fn label(&self) -> &'static str;

    /// Phrase used in the gist description, e.g. "3 unclaimed pokemon"
    fn describe(&self, count: usize) -> String;

    /// Selection predicate
    fn matches(&self, row: &SheetRow) -> bool;

    /// Whether matched rows are grouped by owner
    fn grouped(&self) -> bool {
        false
    }

    /// Render the selection; `groups` is empty for ungrouped categories
    fn render(&self, rows: &[SheetRow], groups: &[OwnerGroup<'_>], ctx: &RenderContext) -> String;
}

/// The categories published by default, in publishing order
pub fn builtin() -> Vec<Box<dyn Category>> {
    vec![Box::new(Unclaimed), Box::new(Unreviewed), Box::new(MissingLink)]
}

fn or_none(lines: &[String]) -> String {
    if lines.is_empty() {
        "None".to_string()
    } else {
        lines.join("\n")
    }
}

fn code_list(rows: &[&SheetRow]) -> String {
    rows.iter()
        .map(|row| format!("`{}`", row.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows nobody has claimed yet
#[derive(Debug, Clone, Copy, Default)]
pub struct Unclaimed;

impl Category for Unclaimed {
    fn name(&self) -> &'static str {
        "unclaimed"
    }

    fn filename(&self) -> &'static str {
        "Unclaimed Pokemon.md"
    }

    fn label(&self) -> &'static str {
        "Unclaimed pokemon"
    }

    fn describe(&self, count: usize) -> String {
        format!("{} unclaimed pokemon", count)
    }

    fn matches(&self, row: &SheetRow) -> bool {
        row.person_in_charge.is_none()
    }

    fn render(&self, rows: &[SheetRow], _groups: &[OwnerGroup<'_>], _ctx: &RenderContext) -> String {
        let mut names: Vec<String> = rows.iter().map(|row| row.name.clone()).collect();
        names.sort();
        format!("## Count: {}\n## Pokemon: \n{}", rows.len(), or_none(&names))
    }
}

/// Submitted entries still waiting for approval
#[derive(Debug, Clone, Copy, Default)]
pub struct Unreviewed;

impl Unreviewed {
    fn render_entry(row: &SheetRow, ctx: &RenderContext) -> String {
        let mut entry = format!("    1. `{}`", row.name);
        if let Some(comment) = &row.comment {
            entry.push_str(" (Marked for review)\n");
            entry.push_str(&format!("        - Comment: {}", comment));
        }
        entry.push_str(&format!(
            "\n        - [Sheet location]({})",
            ctx.location(row.line)
        ));
        if let Some(link) = &row.image_link {
            entry.push_str(&format!("\n        - [Imgur]({})", link));
        }
        entry
    }
}

impl Category for Unreviewed {
    fn name(&self) -> &'static str {
        "unreviewed"
    }

    fn filename(&self) -> &'static str {
        "Unreviewed Pokemon.md"
    }

    fn label(&self) -> &'static str {
        "Unreviewed pokemon"
    }

    fn describe(&self, count: usize) -> String {
        format!("{} unreviewed pokemon", count)
    }

    fn matches(&self, row: &SheetRow) -> bool {
        row.owner_id.is_some()
            && row.image_link.is_some()
            && row.approval_status.as_deref() != Some(APPROVED)
    }

    fn grouped(&self) -> bool {
        true
    }

    fn render(&self, rows: &[SheetRow], groups: &[OwnerGroup<'_>], ctx: &RenderContext) -> String {
        let blocks: Vec<String> = groups
            .iter()
            .map(|group| {
                let entries: Vec<String> = group
                    .rows
                    .iter()
                    .map(|row| Self::render_entry(row, ctx))
                    .collect();
                format!(
                    "- **{}** [{}]\n{}",
                    ctx.display_name(group.owner_id),
                    group.rows.len(),
                    entries.join("\n")
                )
            })
            .collect();

        format!("## Count: {}\n## Users: \n{}", rows.len(), or_none(&blocks))
    }
}

/// Claimed entries without an image link
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingLink;

impl Category for MissingLink {
    fn name(&self) -> &'static str {
        "missing_link"
    }

    fn filename(&self) -> &'static str {
        "Claimed missing link.md"
    }

    fn label(&self) -> &'static str {
        "Missing link pokemon"
    }

    fn describe(&self, count: usize) -> String {
        format!("{} claimed pokemon with missing links", count)
    }

    fn matches(&self, row: &SheetRow) -> bool {
        row.owner_id.is_some() && row.image_link.is_none()
    }

    fn grouped(&self) -> bool {
        true
    }

    fn render(&self, rows: &[SheetRow], groups: &[OwnerGroup<'_>], ctx: &RenderContext) -> String {
        let mut readable = Vec::with_capacity(groups.len());
        let mut mentions = Vec::with_capacity(groups.len());
        for group in groups {
            let names = code_list(&group.rows);
            readable.push(format!(
                "- **{}** [{}] - {}",
                ctx.display_name(group.owner_id),
                group.rows.len(),
                names
            ));
            mentions.push(format!(
                "- **<@{}>** [{}] - {}",
                group.owner_id,
                group.rows.len(),
                names
            ));
        }

        format!(
            "## Count: {}\n## Users: \n{}\n\n\n## Copy & paste to ping:\n```\n{}\n```",
            rows.len(),
            or_none(&readable),
            or_none(&mentions)
        )
    }
}
