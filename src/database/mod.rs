//! # Database Module
//!
//! The cumulative database workbook: its fixed column layout, the appender that adds batches of
//! canonical rows, and read-back for summary statistics.

pub mod appender;
pub mod layout;
pub mod stats;
