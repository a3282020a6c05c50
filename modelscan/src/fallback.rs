//! Helpers for callers that run a scan as a fallback step and only want the
//! answer: allocating a fresh work item and reading back the first token.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::artifacts::RESULT_FILE;

pub const WORK_SUBDIR: &str = "desc_ocr";
pub const INPUT_DIR_NAME: &str = "INPUT";
pub const OUTPUT_DIR_NAME: &str = "OUTPUT";

static CONFUSION_RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
static ITEM_DIR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn confusion_rules() -> &'static [(Regex, &'static str)] {
    CONFUSION_RULES.get_or_init(|| {
        [
            (r"^\$/?-", "SY-"),
            (r"^\$/?", "SY"),
            (r"^\$", "S"),
            (r"^/", "Y"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).expect("static regex"), replacement))
        .collect()
    })
}

fn item_dir_pattern() -> &'static Regex {
    ITEM_DIR_PATTERN.get_or_init(|| Regex::new(r"^item_(\d{2})$").expect("static regex"))
}

/// Undo the usual OCR misreads at the start of a model number: `S` read as
/// `$`, `Y` read as `/`.
///
/// Rules run in order, each on the previous rule's output.
pub fn repair_confusions(token: &str) -> String {
    confusion_rules()
        .iter()
        .fold(token.to_string(), |acc, (pattern, replacement)| {
            pattern.replace(&acc, *replacement).into_owned()
        })
}

fn is_header_line(line: &str) -> bool {
    line.contains("找到") || line.contains("未找") || line.starts_with('#')
}

/// First token recorded in a finished run directory, repaired.
///
/// `None` when the result file is missing, empty or records no token.
pub fn first_token(run_dir: &Path) -> Result<Option<String>> {
    let path = run_dir.join(RESULT_FILE);
    if !path.is_file() {
        debug!(path = %path.display(), "No result file");
        return Ok(None);
    }

    let bytes = fs::read(&path)?;
    let content = String::from_utf8_lossy(&bytes);
    let mut lines = content.lines().map(str::trim).peekable();

    if lines.peek().is_some_and(|first| is_header_line(first)) {
        lines.next();
    }

    Ok(lines
        .find(|line| !line.is_empty())
        .map(repair_confusions))
}

/// One `item_NN` work area: images go into `input`, the run writes `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDirs {
    pub number: u32,
    pub root: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ItemDirs {
    /// Create the next `item_NN` under `<work_root>/desc_ocr`.
    ///
    /// Numbering continues from the highest existing item. `INPUT` is
    /// emptied, `OUTPUT` keeps whatever earlier runs left there.
    pub fn allocate(work_root: &Path) -> Result<Self> {
        let base = work_root.join(WORK_SUBDIR);
        fs::create_dir_all(&base)?;

        let highest = fs::read_dir(&base)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name();
                let caps = item_dir_pattern().captures(name.to_str()?)?;
                caps[1].parse::<u32>().ok()
            })
            .max()
            .unwrap_or(0);

        let number = highest + 1;
        let root = base.join(format!("item_{number:02}"));
        let input = root.join(INPUT_DIR_NAME);
        let output = root.join(OUTPUT_DIR_NAME);

        clear_dir(&input)?;
        fs::create_dir_all(&output)?;

        info!(item = %root.display(), "Allocated work item");
        Ok(Self {
            number,
            root,
            input,
            output,
        })
    }
}

/// Remove everything inside `dir`, creating it if needed.
fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
