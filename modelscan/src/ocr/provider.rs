use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::OcrConfig;
use crate::error::{Result, ScanError};

/// How much per-token information the engine computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Level 0: plain text only.
    TextOnly,
    /// Level 1: text with geometry and confidence.
    Full,
}

impl DetailLevel {
    pub fn as_level(self) -> u8 {
        match self {
            DetailLevel::TextOnly => 0,
            DetailLevel::Full => 1,
        }
    }
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_level())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognized fragment. Geometry and confidence are only present at
/// `DetailLevel::Full`; confidence is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub bbox: Option<BoundingBox>,
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bbox: None,
            confidence: None,
        }
    }

    pub fn detailed(text: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bbox: Some(bbox),
            confidence: Some(confidence),
        }
    }
}

/// Mean of all confidence scores present, or 0.0 when there are none.
pub fn average_confidence(results: &[Recognition]) -> f64 {
    let scores: Vec<f64> = results
        .iter()
        .filter_map(|r| r.confidence)
        .map(f64::from)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3000}'..='\u{303F}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}')
}

/// Drop whitespace runs sitting between two CJK characters. Tesseract tends
/// to split CJK text into one word per character.
fn close_cjk_gaps(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            let run_end = chars[i..]
                .iter()
                .position(|c| !c.is_whitespace())
                .map_or(chars.len(), |n| i + n);
            let between_cjk = i > 0
                && run_end < chars.len()
                && is_cjk(chars[i - 1])
                && is_cjk(chars[run_end]);
            if !between_cjk {
                out.extend(&chars[i..run_end]);
            }
            i = run_end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Join fragment texts with single spaces, trimming the ends. Spaces between
/// CJK characters are removed so split labels read as one word again.
pub fn join_text(results: &[Recognition]) -> String {
    let joined = results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    close_cjk_gaps(joined.trim())
}

/// A stateful OCR reader owned by the scan controller.
///
/// Implementations are initialized once per run and reused for every image.
pub trait OcrEngine {
    /// Load models. Called once before the first image; the default does nothing.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn recognize(&mut self, image: &GrayImage, detail: DetailLevel) -> Result<Vec<Recognition>>;
}

/// Cap the OpenMP pool Tesseract spins up. Must run before the engine loads.
pub fn pin_single_thread() {
    if std::env::var_os("OMP_THREAD_LIMIT").is_none() {
        std::env::set_var("OMP_THREAD_LIMIT", "1");
    }
}

/// True when `dir` holds at least one `*.traineddata` file.
pub fn has_language_data(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("traineddata"))
            })
        })
        .unwrap_or(false)
}

enum OcrBackend {
    Pending,
    Local { tesseract: Box<LepTess> },
    Unavailable { reason: String },
}

/// Tesseract-backed engine.
///
/// Construction is cheap; the model is loaded on `start`. A missing or broken
/// model directory leaves the engine unavailable and every recognition then
/// fails with `ScanError::OcrUnavailable`.
pub struct TesseractEngine {
    backend: OcrBackend,
    config: OcrConfig,
}

fn create_tesseract(config: &OcrConfig) -> std::result::Result<LepTess, String> {
    let data_path = config
        .model_dir
        .to_str()
        .ok_or_else(|| format!("non-UTF8 model directory: {}", config.model_dir.display()))?;
    LepTess::new(Some(data_path), &config.languages).map_err(|e| e.to_string())
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            backend: OcrBackend::Pending,
            config: config.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, OcrBackend::Local { .. })
    }

    fn recognize_local(
        tesseract: &mut LepTess,
        image: &GrayImage,
        detail: DetailLevel,
    ) -> Result<Vec<Recognition>> {
        let mut encoded = Vec::new();
        image.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

        tesseract
            .set_image_from_mem(&encoded)
            .map_err(|e| ScanError::Ocr(format!("Failed to set image: {e}")))?;
        drop(encoded);

        match detail {
            DetailLevel::Full => {
                let hocr = tesseract
                    .get_hocr_text(0)
                    .map_err(|e| ScanError::Ocr(format!("Failed to extract hOCR: {e}")))?;
                parse_hocr(&hocr)
            }
            DetailLevel::TextOnly => {
                let text = tesseract
                    .get_utf8_text()
                    .map_err(|e| ScanError::Ocr(format!("Failed to extract text: {e}")))?;
                Ok(text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(Recognition::text_only)
                    .collect())
            }
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn start(&mut self) -> Result<()> {
        if let OcrBackend::Pending = self.backend {
            if !has_language_data(&self.config.model_dir) {
                warn!(
                    model_dir = %self.config.model_dir.display(),
                    "Model directory looks incomplete (no .traineddata files)"
                );
            }
            self.backend = match create_tesseract(&self.config) {
                Ok(mut lt) => {
                    if let Err(e) = lt.set_variable(Variable::PreserveInterwordSpaces, "1") {
                        warn!("Could not set preserve_interword_spaces: {}", e);
                    }
                    info!(
                        languages = %self.config.languages,
                        model_dir = %self.config.model_dir.display(),
                        "Tesseract OCR initialized"
                    );
                    OcrBackend::Local {
                        tesseract: Box::new(lt),
                    }
                }
                Err(e) => {
                    let reason = format!("Tesseract not available: {e}");
                    warn!("{}", reason);
                    OcrBackend::Unavailable { reason }
                }
            };
        }

        match &self.backend {
            OcrBackend::Unavailable { reason } => Err(ScanError::OcrUnavailable(reason.clone())),
            _ => Ok(()),
        }
    }

    fn recognize(&mut self, image: &GrayImage, detail: DetailLevel) -> Result<Vec<Recognition>> {
        if let OcrBackend::Pending = self.backend {
            self.start()?;
        }

        match &mut self.backend {
            OcrBackend::Local { tesseract } => {
                let results = Self::recognize_local(tesseract, image, detail)?;
                debug!(
                    fragments = results.len(),
                    detail = detail.as_level(),
                    "Recognition completed"
                );
                Ok(results)
            }
            OcrBackend::Unavailable { reason } => Err(ScanError::OcrUnavailable(reason.clone())),
            OcrBackend::Pending => Err(ScanError::OcrUnavailable(
                "engine was not started".to_string(),
            )),
        }
    }
}

fn parse_title(title: &str) -> Option<(BoundingBox, f32)> {
    let mut bbox = None;
    let mut conf = None;
    for property in title.split(';') {
        let mut parts = property.split_whitespace();
        match parts.next() {
            Some("bbox") => {
                let coords: Vec<u32> = parts.filter_map(|v| v.parse().ok()).collect();
                if let [x0, y0, x1, y1] = coords[..] {
                    bbox = Some(BoundingBox {
                        left: x0,
                        top: y0,
                        width: x1.saturating_sub(x0),
                        height: y1.saturating_sub(y0),
                    });
                }
            }
            Some("x_wconf") => conf = parts.next().and_then(|v| v.parse::<f32>().ok()),
            _ => {}
        }
    }
    Some((bbox?, conf?))
}

/// Turn Tesseract's hOCR page into word-level recognitions.
///
/// Each `ocrx_word` span carries `bbox x0 y0 x1 y1; x_wconf N` in its title.
/// Words with a negative confidence or blank text are dropped. Storage is
/// reserved fallibly so allocation pressure surfaces as
/// `ScanError::OutOfMemory` instead of aborting the process.
pub fn parse_hocr(hocr: &str) -> Result<Vec<Recognition>> {
    let document = Html::parse_fragment(hocr);
    let selector = Selector::parse("span.ocrx_word")
        .map_err(|e| ScanError::Ocr(format!("invalid hOCR selector: {e:?}")))?;
    let words: Vec<_> = document.select(&selector).collect();

    let mut results = Vec::new();
    results
        .try_reserve(words.len())
        .map_err(|e| ScanError::OutOfMemory(format!("recognition results: {e}")))?;

    for word in words {
        let Some((bbox, conf)) = word.value().attr("title").and_then(parse_title) else {
            continue;
        };
        let text = word.text().collect::<String>();
        let text = text.trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        results.push(Recognition::detailed(
            text,
            bbox,
            (conf / 100.0).clamp(0.0, 1.0),
        ));
    }

    Ok(results)
}
