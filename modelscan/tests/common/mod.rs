#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{DynamicImage, GrayImage, ImageFormat};

use modelscan::config::PipelineConfig;
use modelscan::error::{Result, ScanError};
use modelscan::memory::MemoryProbe;
use modelscan::ocr::{BoundingBox, DetailLevel, OcrEngine, Recognition};

/// One recognition call seen by `FakeEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCall {
    pub width: u32,
    pub height: u32,
    pub detail: DetailLevel,
}

/// Scripted response for one call.
pub enum Reply {
    Text(&'static str),
    OutOfMemory,
    Fail(&'static str),
}

/// Engine that answers from a script in call order and records what it was
/// asked. Calls past the end of the script recognize nothing.
pub struct FakeEngine {
    replies: VecDeque<Reply>,
    calls: Rc<RefCell<Vec<EngineCall>>>,
    started: Rc<RefCell<usize>>,
    watched: Option<PathBuf>,
    lines_on_disk: Rc<RefCell<Vec<usize>>>,
}

pub struct EngineLog {
    calls: Rc<RefCell<Vec<EngineCall>>>,
    started: Rc<RefCell<usize>>,
    lines_on_disk: Rc<RefCell<Vec<usize>>>,
}

impl EngineLog {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    pub fn starts(&self) -> usize {
        *self.started.borrow()
    }

    /// Lines the watched file held on disk at each recognition call.
    pub fn lines_on_disk(&self) -> Vec<usize> {
        self.lines_on_disk.borrow().clone()
    }
}

impl FakeEngine {
    pub fn new(replies: Vec<Reply>) -> (Self, EngineLog) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let started = Rc::new(RefCell::new(0));
        let lines_on_disk = Rc::new(RefCell::new(Vec::new()));
        let log = EngineLog {
            calls: Rc::clone(&calls),
            started: Rc::clone(&started),
            lines_on_disk: Rc::clone(&lines_on_disk),
        };
        (
            Self {
                replies: replies.into(),
                calls,
                started,
                watched: None,
                lines_on_disk,
            },
            log,
        )
    }

    /// Like `new`, but counts the lines of `path` already on disk each time
    /// the engine is asked to recognize an image.
    pub fn watching(replies: Vec<Reply>, path: &Path) -> (Self, EngineLog) {
        let (mut engine, log) = Self::new(replies);
        engine.watched = Some(path.to_path_buf());
        (engine, log)
    }
}

fn count_lines(path: &Path) -> usize {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    text.trim_start_matches('\u{feff}').lines().count()
}

impl OcrEngine for FakeEngine {
    fn start(&mut self) -> Result<()> {
        *self.started.borrow_mut() += 1;
        Ok(())
    }

    fn recognize(&mut self, image: &GrayImage, detail: DetailLevel) -> Result<Vec<Recognition>> {
        if let Some(path) = &self.watched {
            self.lines_on_disk.borrow_mut().push(count_lines(path));
        }
        self.calls.borrow_mut().push(EngineCall {
            width: image.width(),
            height: image.height(),
            detail,
        });

        match self.replies.pop_front() {
            None => Ok(Vec::new()),
            Some(Reply::OutOfMemory) => Err(ScanError::OutOfMemory("scripted".to_string())),
            Some(Reply::Fail(reason)) => Err(ScanError::Ocr(reason.to_string())),
            Some(Reply::Text(text)) => Ok(text
                .split_whitespace()
                .map(|word| match detail {
                    DetailLevel::Full => Recognition::detailed(
                        word,
                        BoundingBox {
                            left: 0,
                            top: 0,
                            width: 10,
                            height: 10,
                        },
                        0.9,
                    ),
                    DetailLevel::TextOnly => Recognition::text_only(word),
                })
                .collect()),
        }
    }
}

/// Probe that replays scripted readings, repeating the last one when the
/// script runs out.
pub struct ScriptedProbe {
    readings: RefCell<VecDeque<f64>>,
    last: RefCell<f64>,
}

impl ScriptedProbe {
    pub fn new(readings: &[f64]) -> Self {
        Self {
            readings: RefCell::new(readings.iter().copied().collect()),
            last: RefCell::new(100.0),
        }
    }

    pub fn constant(reading: f64) -> Self {
        Self::new(&[reading])
    }
}

impl MemoryProbe for ScriptedProbe {
    fn resident_memory_mb(&self) -> f64 {
        if let Some(next) = self.readings.borrow_mut().pop_front() {
            *self.last.borrow_mut() = next;
        }
        *self.last.borrow()
    }
}

/// Write a blank RGB PNG of the given size.
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::new_rgb8(width, height)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap_or_else(|e| panic!("Failed to write fixture '{name}': {e}"));
    path
}

/// Folder with `names` as small PNGs.
pub fn image_folder(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for name in names {
        write_png(dir.path(), name, 64, 48);
    }
    dir
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig::default()
}

pub fn flushing_every(flush_every: usize) -> PipelineConfig {
    PipelineConfig {
        flush_every,
        ..PipelineConfig::default()
    }
}
