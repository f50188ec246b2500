//! # band-forge – banded report pagination engine
//!
//! This crate turns a band-based report definition plus tabular data into
//! prepared pages: an exact record of which band instance sits where on
//! every physical page. The pipeline stages are:
//!
//! 1. **Define** – report pages and their band tree ([`report`])
//! 2. **Bind** – row cursors over the data ([`data`])
//! 3. **Run** – walk the bands, break pages and columns, honour keep
//!    constraints and subreports ([`engine`])
//! 4. **Number** – logical page numbers and section totals ([`page_numbers`])
//! 5. **Store** – prepared pages with de-duplicated content ([`prepared`])
//!
//! Band content is produced by a host-supplied [`render::BandRenderer`]; the
//! stock [`render::JsonBandRenderer`] expands text placeholders into JSON.
//! A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod cursor;
pub mod data;
mod data_band;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod hierarchy;
pub mod keep;
pub mod page_numbers;
pub mod pipeline;
pub mod prepared;
pub mod render;
pub mod report;
pub mod samples;
mod subreport;

// Re-exports for convenience
pub use data::{DataSources, MemoryDataSource, Value};
pub use data_band::{column_split, rows_per_column};
pub use engine::{Engine, PreparedReport};
pub use error::{ReportError, Result};
pub use pipeline::{prepare_from_json, prepare_report, PipelineConfig};
pub use report::{Band, DataBandSpec, GroupSpec, ReportDefinition, ReportPage};
