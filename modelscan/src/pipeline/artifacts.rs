use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::extraction::ScoreSummary;

pub const MERGED_FILE: &str = "merged_ocr.txt";
pub const CSV_FILE: &str = "images_ocr.csv";
pub const FAILED_FILE: &str = "failed_slices.txt";
pub const RUN_LOG_FILE: &str = "run.log";
pub const RESULT_FILE: &str = "models_found.txt";
pub const SCORE_FILE: &str = "score.log";

/// First line of a result file that lists tokens.
pub const FOUND_HEADER: &str = "找到的型號：";
/// Whole content of a result file when nothing was found.
pub const NOT_FOUND_MARKER: &str = "未找到型號";

const CSV_HEADER: [&str; 6] = [
    "index",
    "filename",
    "text_len",
    "avg_conf",
    "rss_mb",
    "peak_alloc_mb",
];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Create `<output_root>/run_YYYYmmdd_HHMMSS`, adding `_2`, `_3`, .. when a
/// directory of that name is already there.
pub fn create_run_dir(output_root: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(output_root)?;
    let stem = format!("run_{}", now.format("%Y%m%d_%H%M%S"));

    let mut attempt = 1u32;
    loop {
        let name = if attempt == 1 {
            stem.clone()
        } else {
            format!("{stem}_{attempt}")
        };
        let candidate = output_root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Locations of every artifact inside one run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub merged: PathBuf,
    pub csv: PathBuf,
    pub failed: PathBuf,
    pub run_log: PathBuf,
    pub result: PathBuf,
    pub score: PathBuf,
}

impl ArtifactPaths {
    pub fn new(run_dir: &Path) -> Self {
        Self {
            run_dir: run_dir.to_path_buf(),
            merged: run_dir.join(MERGED_FILE),
            csv: run_dir.join(CSV_FILE),
            failed: run_dir.join(FAILED_FILE),
            run_log: run_dir.join(RUN_LOG_FILE),
            result: run_dir.join(RESULT_FILE),
            score: run_dir.join(SCORE_FILE),
        }
    }

    fn all(&self) -> [&Path; 6] {
        [
            self.merged.as_path(),
            self.csv.as_path(),
            self.failed.as_path(),
            self.run_log.as_path(),
            self.result.as_path(),
            self.score.as_path(),
        ]
    }

    /// Remove artifacts left in the run directory by an earlier run.
    pub fn clear_stale(&self) -> Result<()> {
        for path in self.all() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// True when the result file exists and has content.
    pub fn has_result(&self) -> bool {
        fs::metadata(&self.result)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }
}

/// One row of `images_ocr.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionRecord {
    pub index: usize,
    pub filename: String,
    /// Length of the joined text in characters.
    pub text_len: usize,
    pub avg_conf: f64,
    pub rss_mb: f64,
    pub peak_alloc_mb: f64,
}

/// The streams kept open for the whole scan.
pub struct ArtifactWriters {
    merged: BufWriter<File>,
    csv: csv::Writer<File>,
    run_log: BufWriter<File>,
}

impl ArtifactWriters {
    pub fn create(paths: &ArtifactPaths) -> Result<Self> {
        let mut csv_file = File::create(&paths.csv)?;
        csv_file.write_all(UTF8_BOM)?;
        let mut csv = csv::Writer::from_writer(csv_file);
        csv.write_record(CSV_HEADER)?;

        Ok(Self {
            merged: BufWriter::new(File::create(&paths.merged)?),
            csv,
            run_log: BufWriter::new(File::create(&paths.run_log)?),
        })
    }

    /// Append one image block to the merged text and push it to disk.
    pub fn append_block(&mut self, block: &str) -> Result<()> {
        self.merged.write_all(block.as_bytes())?;
        self.merged.flush()?;
        Ok(())
    }

    pub fn write_record(&mut self, record: &RecognitionRecord) -> Result<()> {
        self.csv.write_record([
            record.index.to_string(),
            record.filename.clone(),
            record.text_len.to_string(),
            format!("{:.4}", record.avg_conf),
            format!("{:.2}", record.rss_mb),
            format!("{:.2}", record.peak_alloc_mb),
        ])?;
        Ok(())
    }

    pub fn log_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.run_log, "{line}")?;
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        self.merged.flush()?;
        self.csv.flush()?;
        self.run_log.flush()?;
        Ok(())
    }
}

/// Format one merged-text block.
pub fn merged_block(filename: &str, text: &str) -> String {
    format!("[{filename}]\n{text}\n\n")
}

pub fn write_result(path: &Path, tokens: &[String]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    if tokens.is_empty() {
        writeln!(out, "{NOT_FOUND_MARKER}")?;
    } else {
        writeln!(out, "{FOUND_HEADER}")?;
        for token in tokens {
            writeln!(out, "{token}")?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn write_failed(path: &Path, filenames: &[String]) -> Result<()> {
    fs::write(path, filenames.join("\n"))?;
    Ok(())
}

pub fn write_score(path: &Path, summary: &ScoreSummary, now: DateTime<Local>) -> Result<()> {
    let content = format!(
        "== SCORE {} ==\n{summary}\n== END ==\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    fs::write(path, content)?;
    Ok(())
}
