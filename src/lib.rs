//! xlsxclone - In-memory XLSX template engine
//!
//! This crate edits Office Open XML spreadsheet packages directly at the XML/ZIP level:
//! it clones worksheets from a template, writes value cells with the right cell type,
//! manages the shared string table, and serializes a valid package again.
//! Parts it does not touch (styles, themes, drawings, ...) are copied byte for byte.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xlsxclone::{Package, StringMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = std::fs::read("template.xlsx")?;
//!     let mut package = Package::load(&template)?;
//!
//!     // One sheet per entity, always cloned from the template sheet
//!     package.bulk_clone_sheet("base", ["Account", "Opportunity__c"])?;
//!
//!     // Empty strings leave the cell untouched; numeric strings become numbers
//!     package.write_row("Account", 6, ["", "Name", "", "42"], StringMode::AppendAlways)?;
//!
//!     // Repeated markers can share one shared string entry
//!     package.write_row("Account", 7, ["●", "●", "●"], StringMode::GetOrAdd)?;
//!
//!     std::fs::write("output.xlsx", package.generate()?)?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Configuration
//!
//! ```rust,no_run
//! use xlsxclone::{CellAddress, DateFormat, LeadingZeros, PackageBuilder, StringMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = std::fs::read("template.xlsx")?;
//!     let mut package = PackageBuilder::new()
//!         .with_leading_zeros(LeadingZeros::Text)  // "007" stays a string
//!         .with_date_format(DateFormat::Custom("%Y年%m月%d日".to_string()))
//!         .load(&template)?;
//!
//!     let address: CellAddress = "C3".parse()?;
//!     let date = chrono::NaiveDate::from_ymd_opt(2025, 11, 20).ok_or("invalid date")?;
//!     package.write_cell("base", address, date, StringMode::AppendAlways)?;
//!     package.clear_cell("base", "D3".parse()?)?;
//!
//!     std::fs::write("output.xlsx", package.generate()?)?;
//!     Ok(())
//! }
//! ```

mod address;
mod api;
mod builder;
mod content_types;
mod error;
mod manifest;
mod package;
mod security;
mod shared_strings;
mod types;
mod worksheet;
mod xml;

// 公開API
pub use address::{
    column_index_to_letters, letters_to_column_index, parse_cell_reference, CellAddress,
    MAX_COLUMNS, MAX_ROWS,
};
pub use api::{Compression, DateFormat, LeadingZeros, StringMode};
pub use builder::{PackageBuilder, PackageConfig};
pub use error::XlsxCloneError;
pub use manifest::{Relationship, SheetEntry, WorkbookManifest};
pub use package::Package;
pub use security::SecurityConfig;
pub use shared_strings::{SharedString, SharedStringTable};
pub use types::{CellInput, CellValue};
pub use worksheet::{Cell, Row, Worksheet};
