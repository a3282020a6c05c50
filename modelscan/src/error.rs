use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Input directory does not exist: {}", .0.display())]
    InputDirMissing(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}

impl ScanError {
    /// Errors that can be pinned to one image and must not abort the run.
    pub fn is_image_level(&self) -> bool {
        matches!(
            self,
            ScanError::Image(_)
                | ScanError::Ocr(_)
                | ScanError::OcrUnavailable(_)
                | ScanError::OutOfMemory(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
