//! # Drill Ledger
//!
//! Collects daily drill-log workbooks into one cumulative drilling database workbook.
//!
//! Each daily log names a single drill hole (its identifier in `B3`, the logging date in `L4`)
//! and holds one interval per row below a header row. Ingestion turns those rows into canonical
//! records, and the appender writes them after the last row of the database worksheet.
//!
//! ## Features
//!
//! - **Both Excel formats**: daily logs may be `.xlsx` (Office Open XML) or legacy `.xls` (BIFF8)
//! - **Schema fallback**: columns are located by their header labels, or by fixed positions when
//!   any required label is missing
//! - **All-or-nothing files**: a file with an invalid hole identifier, logging date or number is
//!   rejected before anything is written
//! - **Safe appends**: only the database worksheet is rewritten, and the new workbook replaces the
//!   old one by an atomic rename
//! - **Folder watching**: files arriving in the source folder are ingested once they stop changing
//!
//! ## Entry points
//!
//! - [`pipeline::Pipeline`]: the serialized "ingest, append, persist" unit
//! - [`watch::FolderWatcher`]: drives the pipeline from filesystem events
//! - [`database::stats`]: summary figures over the cumulative database

pub mod config;
pub mod database;
pub mod error;
mod helpers;
pub mod ingest;
pub mod pipeline;
pub mod spreadsheet;
pub mod watch;
