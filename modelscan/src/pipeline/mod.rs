//! The scan controller.
//!
//! Drives one run over an image folder:
//!
//! ```text
//! INIT ─► SCANNING ─┬─► STOPPED_EARLY ─┬─► FINALIZED
//!                   └─► EXHAUSTED ─────┘
//! ```
//!
//! Each image is preprocessed at a quality tier picked from the resident
//! memory reading taken just before it, recognized, appended to the merged
//! text, and the whole merged text is searched for a model token. The first
//! hit is persisted and ends the scan. Finalization runs exactly once and
//! fills in whatever the scan did not produce.

pub mod artifacts;

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, TierSettings};
use crate::error::{Result, ScanError};
use crate::extraction::{ScoreSummary, TokenExtractor};
use crate::images::list_images;
use crate::memory::{AllocationSession, MemoryProbe, RSS_UNAVAILABLE};
use crate::ocr::{average_confidence, join_text, load_and_scale, OcrEngine};

use artifacts::{
    merged_block, write_failed, write_result, write_score, ArtifactPaths, ArtifactWriters,
    RecognitionRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Primary,
    Fallback,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Primary => write!(f, "primary"),
            QualityTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// Pick the tier for the next image from a resident memory reading.
///
/// Only a valid reading at or above the redline degrades. An unavailable
/// reading counts as low pressure.
pub fn select_tier(reading_mb: f64, redline_mb: f64) -> QualityTier {
    if reading_mb >= 0.0 && reading_mb >= redline_mb {
        QualityTier::Fallback
    } else {
        QualityTier::Primary
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A token turned up and the remaining images were skipped.
    StoppedEarly {
        token: String,
        tokens: Vec<String>,
        /// Images visited, including the one that hit.
        images_scanned: usize,
    },
    /// Every image was visited; `tokens` comes from the full merged text.
    Exhausted { tokens: Vec<String> },
    /// The input folder held no eligible images.
    NoImages,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub image_count: usize,
    pub processed: usize,
    pub failed: Vec<String>,
    pub elapsed: Duration,
    pub peak_alloc_mb: f64,
    pub artifacts: ArtifactPaths,
}

impl RunReport {
    /// The answer of the run: the early hit, or the first finalized token.
    pub fn token(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::StoppedEarly { token, .. } => Some(token),
            RunOutcome::Exhausted { tokens } => tokens.first().map(String::as_str),
            RunOutcome::NoImages => None,
        }
    }

    /// One-line digest printed at the end of every run.
    pub fn summary_line(&self) -> String {
        format!(
            "[SUMMARY] images={} failed={} elapsed={:.2}s peak_alloc={:.2}MB",
            self.image_count,
            self.failed.len(),
            self.elapsed.as_secs_f64(),
            self.peak_alloc_mb
        )
    }

    fn log_summary(&self) {
        info!(
            images = self.image_count,
            processed = self.processed,
            failed = self.failed.len(),
            elapsed_secs = self.elapsed.as_secs_f64(),
            peak_alloc_mb = self.peak_alloc_mb,
            "Run summary"
        );
    }
}

/// Text recognized from one image.
#[derive(Debug)]
struct Recognized {
    text: String,
    avg_conf: f64,
    tier: QualityTier,
}

pub struct ScanController {
    config: PipelineConfig,
    engine: Box<dyn OcrEngine>,
    probe: Box<dyn MemoryProbe>,
    extractor: TokenExtractor,
}

impl ScanController {
    pub fn new(
        config: PipelineConfig,
        engine: Box<dyn OcrEngine>,
        probe: Box<dyn MemoryProbe>,
    ) -> Result<Self> {
        if config.flush_every == 0 {
            return Err(ScanError::Config("flush_every must be at least 1".to_string()));
        }
        let extractor = TokenExtractor::new(&config.rules)?;
        Ok(Self {
            config,
            engine,
            probe,
            extractor,
        })
    }

    pub fn extractor(&self) -> &TokenExtractor {
        &self.extractor
    }

    fn tier_settings(&self, tier: QualityTier) -> TierSettings {
        match tier {
            QualityTier::Primary => self.config.primary,
            QualityTier::Fallback => self.config.fallback,
        }
    }

    /// Scan `input_dir`, writing artifacts into `run_dir`.
    ///
    /// `expected` is an optional known-correct token used only for scoring.
    /// Image-level failures never abort the run; a missing input folder and
    /// artifact I/O errors do.
    pub fn run(
        &mut self,
        input_dir: &Path,
        run_dir: &Path,
        expected: Option<&str>,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let paths = ArtifactPaths::new(run_dir);

        if !input_dir.is_dir() {
            return Err(ScanError::InputDirMissing(input_dir.to_path_buf()));
        }

        let images = list_images(input_dir)?;
        if images.is_empty() {
            warn!(input_dir = %input_dir.display(), "No images found");
            let report = RunReport {
                outcome: RunOutcome::NoImages,
                image_count: 0,
                processed: 0,
                failed: Vec::new(),
                elapsed: started.elapsed(),
                peak_alloc_mb: 0.0,
                artifacts: paths,
            };
            report.log_summary();
            return Ok(report);
        }

        info!(
            images = images.len(),
            input_dir = %input_dir.display(),
            run_dir = %run_dir.display(),
            "Starting scan"
        );

        if let Err(e) = self.engine.start() {
            warn!("OCR engine failed to start, images will fail: {}", e);
        }
        let session = AllocationSession::start();

        std::fs::create_dir_all(run_dir)?;
        paths.clear_stale()?;
        let mut writers = ArtifactWriters::create(&paths)?;

        let mut merged = String::new();
        let mut failed = Vec::new();
        let mut processed = 0usize;
        let mut early_stop: Option<(String, Vec<String>, usize)> = None;

        for (position, path) in images.iter().enumerate() {
            let index = position + 1;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let image_started = Instant::now();
            let rss_before = self.probe.resident_memory_mb();

            match self.process_image(path, rss_before) {
                Err(e) => {
                    if e.is_image_level() {
                        warn!(index, image = %name, "Image failed: {}", e);
                    } else {
                        error!(index, image = %name, "Unexpected error on image: {}", e);
                    }
                    writers.log_line(&format!(
                        "[ERR] {index:04} {name} in {:.2}s, rss={rss_before:.2}MB -> {e}",
                        image_started.elapsed().as_secs_f64()
                    ))?;
                    failed.push(name);
                }
                Ok(recognized) => {
                    processed += 1;

                    let block = merged_block(&name, &recognized.text);
                    writers.append_block(&block)?;
                    merged.push_str(&block);

                    let tokens = self.extractor.extract_tokens(&merged);
                    if let Some(first) = tokens.first() {
                        write_result(&paths.result, &tokens)?;
                        writers.log_line(&format!(
                            "[HIT] {index:04} {name} in {:.2}s -> {first}",
                            image_started.elapsed().as_secs_f64()
                        ))?;
                        writers.flush_all()?;
                        info!(index, image = %name, token = %first, "Model token found, stopping early");
                        early_stop = Some((first.clone(), tokens, index));
                        break;
                    }

                    let rss_now = self.probe.resident_memory_mb();
                    let peak_alloc_mb = session.peak_mb();
                    writers.write_record(&RecognitionRecord {
                        index,
                        filename: name.clone(),
                        text_len: recognized.text.chars().count(),
                        avg_conf: recognized.avg_conf,
                        rss_mb: rss_now,
                        peak_alloc_mb,
                    })?;

                    let cost = image_started.elapsed().as_secs_f64();
                    writers.log_line(&format!(
                        "[OK] {index:04} {name} in {cost:.2}s, avg_conf={:.4}, rss={rss_now:.2}MB, peak_alloc={peak_alloc_mb:.2}MB, tier={}",
                        recognized.avg_conf, recognized.tier
                    ))?;
                    info!(
                        index,
                        image = %name,
                        tier = %recognized.tier,
                        avg_conf = recognized.avg_conf,
                        rss_mb = rss_now,
                        "Image processed in {:.2}s",
                        cost
                    );
                }
            }

            if index % self.config.flush_every == 0 {
                writers.flush_all()?;
            }
        }

        writers.flush_all()?;
        drop(writers);
        drop(merged);

        // Finalization.
        if !paths.has_result() {
            let text = read_lossy(&paths.merged)?;
            let tokens = self.extractor.extract_tokens(&text);
            write_result(&paths.result, &tokens)?;
        }

        if !failed.is_empty() {
            write_failed(&paths.failed, &failed)?;
        }

        let merged_text = read_lossy(&paths.merged)?;
        let scan = self.extractor.scan(&merged_text);
        let summary = ScoreSummary::from_scan(&scan, expected);
        write_score(&paths.score, &summary, Local::now())?;

        let peak_alloc_mb = session.stop();
        let outcome = match early_stop {
            Some((token, tokens, images_scanned)) => RunOutcome::StoppedEarly {
                token,
                tokens,
                images_scanned,
            },
            None => RunOutcome::Exhausted {
                tokens: scan.tokens,
            },
        };

        let report = RunReport {
            outcome,
            image_count: images.len(),
            processed,
            failed,
            elapsed: started.elapsed(),
            peak_alloc_mb,
            artifacts: paths,
        };
        report.log_summary();
        Ok(report)
    }

    /// Recognize one image, retrying once at the fallback tier when the
    /// primary tier runs out of memory.
    fn process_image(&mut self, path: &Path, rss_before: f64) -> Result<Recognized> {
        let tier = select_tier(rss_before, self.config.redline_mb);
        if rss_before == RSS_UNAVAILABLE {
            debug!("Resident memory unavailable, assuming low pressure");
        }

        match self.recognize_at(path, tier) {
            Err(ScanError::OutOfMemory(reason)) if tier == QualityTier::Primary => {
                warn!(
                    image = %path.display(),
                    "Out of memory at primary tier ({}), retrying at fallback",
                    reason
                );
                self.recognize_at(path, QualityTier::Fallback)
            }
            other => other,
        }
    }

    fn recognize_at(&mut self, path: &Path, tier: QualityTier) -> Result<Recognized> {
        let settings = self.tier_settings(tier);
        let gray = load_and_scale(path, settings.max_long_edge)?;
        debug!(
            image = %path.display(),
            width = gray.width(),
            height = gray.height(),
            detail = %settings.detail,
            "Recognizing"
        );

        let results = self.engine.recognize(&gray, settings.detail)?;
        drop(gray);

        Ok(Recognized {
            text: join_text(&results),
            avg_conf: average_confidence(&results),
            tier,
        })
    }
}

fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
