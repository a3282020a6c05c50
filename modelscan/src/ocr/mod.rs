//! OCR (Optical Character Recognition) Module
//!
//! # Architecture
//!
//! - `OcrEngine` trait is the seam the scan controller drives; exactly one
//!   engine instance lives for the whole run
//! - `TesseractEngine` implements it locally via leptess, reading
//!   pre-provisioned `*.traineddata` files from `OcrConfig::model_dir`
//! - `load_and_scale` turns an image file into the grayscale buffer the engine
//!   consumes, sized for the current quality tier
//!
//! # Detail levels
//!
//! `DetailLevel::Full` asks Tesseract for word boxes and confidences (hOCR
//! output, parsed with `scraper`). `DetailLevel::TextOnly` only pulls the
//! UTF-8 text and is the cheaper mode used under memory pressure.

mod preprocessing;
mod provider;

pub use preprocessing::load_and_scale;
pub use provider::{
    average_confidence, has_language_data, join_text, parse_hocr, pin_single_thread, BoundingBox,
    DetailLevel, OcrEngine, Recognition, TesseractEngine,
};
