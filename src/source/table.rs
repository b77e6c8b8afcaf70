//! Typed view of the spreadsheet export
//!
//! The sheet starts with a preamble, followed by a header row and the data
//! rows. Columns are looked up by name once; a missing required column fails
//! the whole parse instead of surfacing later during rendering.

use serde::Serialize;

use crate::config::{ColumnNames, SourceConfig};
use crate::error::FetchError;

/// One data row of the sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SheetRow {
    /// 1-based row number in the sheet
    pub line: u64,
    pub name: String,
    pub person_in_charge: Option<String>,
    /// Submitter id; the grouping key of per-user categories
    pub owner_id: Option<String>,
    pub image_link: Option<String>,
    pub approval_status: Option<String>,
    pub comment: Option<String>,
}

impl SheetRow {
    /// Row with only a name, used by tests and builders
    pub fn named(line: u64, name: impl Into<String>) -> Self {
        Self {
            line,
            name: name.into(),
            person_in_charge: None,
            owner_id: None,
            image_link: None,
            approval_status: None,
            comment: None,
        }
    }
}

/// Parsed sheet: header plus rows in sheet order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl Table {
    pub fn new(rows: Vec<SheetRow>) -> Self {
        Self {
            header: Vec::new(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where the header sits and how its columns are named
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    /// Number of preamble records before the header
    pub header_row: usize,
    pub columns: ColumnNames,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

impl From<&SourceConfig> for TableLayout {
    fn from(config: &SourceConfig) -> Self {
        Self {
            header_row: config.header_row,
            columns: config.columns.clone(),
        }
    }
}

struct ColumnIndex {
    name: usize,
    person_in_charge: usize,
    owner_id: usize,
    image_link: usize,
    approval_status: usize,
    comment: Option<usize>,
}

impl ColumnIndex {
    fn resolve(header: &[String], columns: &ColumnNames) -> Result<Self, FetchError> {
        let find = |wanted: &str| header.iter().position(|h| h == wanted);
        let require = |wanted: &str| {
            find(wanted).ok_or_else(|| FetchError::MissingColumn(wanted.to_string()))
        };

        Ok(Self {
            name: require(&columns.name)?,
            person_in_charge: require(&columns.person_in_charge)?,
            owner_id: require(&columns.owner_id)?,
            image_link: require(&columns.image_link)?,
            approval_status: require(&columns.approval_status)?,
            comment: find(&columns.comment),
        })
    }
}

/// Parse CSV export text into a [`Table`]
pub fn parse_table(text: &str, layout: &TableLayout) -> Result<Table, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut index: Option<ColumnIndex> = None;
    let mut rows = Vec::new();

    for (position, record) in reader.records().enumerate() {
        let record = record.map_err(|e| FetchError::Csv(e.to_string()))?;
        let line = position as u64 + 1;

        if position < layout.header_row {
            continue;
        }

        let (Some(header), Some(columns)) = (&header, &index) else {
            let names: Vec<String> = record.iter().map(|h| h.trim().to_string()).collect();
            index = Some(ColumnIndex::resolve(&names, &layout.columns)?);
            header = Some(names);
            continue;
        };

        if record.len() != header.len() {
            return Err(FetchError::Malformed {
                line,
                reason: format!("expected {} fields, found {}", header.len(), record.len()),
            });
        }

        let cell = |i: usize| {
            record
                .get(i)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        // Trailing blank rows of the sheet
        let Some(name) = cell(columns.name) else {
            continue;
        };

        rows.push(SheetRow {
            line,
            name,
            person_in_charge: cell(columns.person_in_charge),
            owner_id: cell(columns.owner_id),
            image_link: cell(columns.image_link),
            approval_status: cell(columns.approval_status),
            comment: columns.comment.and_then(cell),
        });
    }

    let header = header.ok_or(FetchError::MissingHeader)?;
    Ok(Table { header, rows })
}
