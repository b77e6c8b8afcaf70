//! Spreadsheet source
//!
//! - `table`: typed rows and the CSV parser
//! - `export`: HTTP fetcher for the sheet's CSV export

pub mod export;
pub mod table;

pub use export::CsvExportSource;
pub use table::{parse_table, SheetRow, Table, TableLayout};

use async_trait::async_trait;

use crate::error::FetchError;

/// Produces the current state of the sheet
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Fetch and parse the whole sheet
    async fn fetch_table(&self) -> Result<Table, FetchError>;
}
