//! Memory-aware, early-stopping OCR scanner for product photo folders.
//!
//! The library exposes the building blocks (`images`, `memory`, `ocr`,
//! `extraction`) and the `pipeline::ScanController` that ties them together.
//! The `modelscan` binary wires them to the environment and the command line.

pub mod config;
pub mod error;
pub mod extraction;
pub mod fallback;
pub mod images;
pub mod memory;
pub mod ocr;
pub mod pipeline;

pub use config::Config;
pub use error::{Result, ScanError};
pub use pipeline::{RunOutcome, RunReport, ScanController};
