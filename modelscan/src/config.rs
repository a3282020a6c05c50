use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::ocr::DetailLevel;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated list env var, e.g. `SCAN_MATERIALS=ABS,PVC,PP`.
/// Blank entries are dropped; an unset or empty variable yields the defaults.
fn parse_env_list(var: &str, default: &[&str]) -> Vec<String> {
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => val
            .split(',')
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| item.to_string())
            .collect(),
        _ => default.iter().map(|item| item.to_string()).collect(),
    }
}

pub const DEFAULT_LABELS: &[&str] = &["商品型號", "型號", "Model"];
pub const DEFAULT_UNITS: &[&str] = &["mm", "cm", "mAh", "w", "v", "hz", "°c", "kg"];
pub const DEFAULT_MATERIALS: &[&str] = &["ABS", "PVC", "PP"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scan: ScanConfig,
    pub ocr: OcrConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub input_dir: PathBuf,
    pub output_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Directory holding pre-provisioned `*.traineddata` files.
    pub model_dir: PathBuf,
    /// Tesseract language set, `+`-joined.
    pub languages: String,
}

/// Image size / OCR detail pair used for one quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    pub max_long_edge: u32,
    pub detail: DetailLevel,
}

/// Label keywords and noise denylists for the token extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    pub labels: Vec<String>,
    pub units: Vec<String>,
    pub materials: Vec<String>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            units: DEFAULT_UNITS.iter().map(|s| s.to_string()).collect(),
            materials: DEFAULT_MATERIALS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub primary: TierSettings,
    pub fallback: TierSettings,
    /// Resident memory (MB) at or above which the fallback tier is used.
    pub redline_mb: f64,
    /// Flush every open artifact stream after this many images.
    pub flush_every: usize,
    pub rules: ExtractionRules,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary: TierSettings {
                max_long_edge: 1000,
                detail: DetailLevel::Full,
            },
            fallback: TierSettings {
                max_long_edge: 832,
                detail: DetailLevel::TextOnly,
            },
            redline_mb: 2000.0,
            flush_every: 10,
            rules: ExtractionRules::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let pipeline_defaults = PipelineConfig::default();
        Self {
            scan: ScanConfig {
                input_dir: env::var("SCAN_INPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("input")),
                output_root: env::var("SCAN_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("output")),
            },
            ocr: OcrConfig {
                model_dir: env::var("OCR_MODEL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("tessdata")),
                languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "chi_tra+eng".to_string()),
            },
            pipeline: PipelineConfig {
                primary: TierSettings {
                    max_long_edge: parse_env_or(
                        "SCAN_PRIMARY_EDGE",
                        pipeline_defaults.primary.max_long_edge,
                    ),
                    detail: DetailLevel::Full,
                },
                fallback: TierSettings {
                    max_long_edge: parse_env_or(
                        "SCAN_FALLBACK_EDGE",
                        pipeline_defaults.fallback.max_long_edge,
                    ),
                    detail: DetailLevel::TextOnly,
                },
                redline_mb: parse_env_or("SCAN_REDLINE_MB", pipeline_defaults.redline_mb),
                flush_every: parse_env_or("SCAN_FLUSH_EVERY", pipeline_defaults.flush_every)
                    .max(1),
                rules: ExtractionRules {
                    labels: parse_env_list("SCAN_LABELS", DEFAULT_LABELS),
                    units: parse_env_list("SCAN_UNITS", DEFAULT_UNITS),
                    materials: parse_env_list("SCAN_MATERIALS", DEFAULT_MATERIALS),
                },
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SCAN_VARS: &[&str] = &[
        "SCAN_PRIMARY_EDGE",
        "SCAN_FALLBACK_EDGE",
        "SCAN_REDLINE_MB",
        "SCAN_FLUSH_EVERY",
        "SCAN_LABELS",
        "SCAN_UNITS",
        "SCAN_MATERIALS",
        "OCR_LANGUAGES",
    ];

    fn clear_scan_vars() {
        for var in SCAN_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_pipeline_config_defaults() {
        clear_scan_vars();

        let config = Config::default();
        assert_eq!(config.pipeline.primary.max_long_edge, 1000);
        assert_eq!(config.pipeline.primary.detail, DetailLevel::Full);
        assert_eq!(config.pipeline.fallback.max_long_edge, 832);
        assert_eq!(config.pipeline.fallback.detail, DetailLevel::TextOnly);
        assert_eq!(config.pipeline.redline_mb, 2000.0);
        assert_eq!(config.pipeline.flush_every, 10);
        assert_eq!(config.ocr.languages, "chi_tra+eng");
        assert_eq!(config.pipeline.rules, ExtractionRules::default());
    }

    #[test]
    #[serial]
    fn test_pipeline_config_from_env() {
        clear_scan_vars();
        std::env::set_var("SCAN_PRIMARY_EDGE", "1200");
        std::env::set_var("SCAN_REDLINE_MB", "1500.5");
        std::env::set_var("SCAN_MATERIALS", "ABS, PE ,");

        let config = Config::default();
        assert_eq!(config.pipeline.primary.max_long_edge, 1200);
        assert_eq!(config.pipeline.redline_mb, 1500.5);
        assert_eq!(config.pipeline.rules.materials, vec!["ABS", "PE"]);

        clear_scan_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_falls_back_to_default() {
        clear_scan_vars();
        std::env::set_var("SCAN_FALLBACK_EDGE", "tiny");

        let config = Config::default();
        assert_eq!(config.pipeline.fallback.max_long_edge, 832);

        clear_scan_vars();
    }

    #[test]
    #[serial]
    fn test_flush_every_never_zero() {
        clear_scan_vars();
        std::env::set_var("SCAN_FLUSH_EVERY", "0");

        let config = Config::default();
        assert_eq!(config.pipeline.flush_every, 1);

        clear_scan_vars();
    }

    #[test]
    #[serial]
    fn test_config_serializes_for_display() {
        clear_scan_vars();

        let value = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(value["pipeline"]["primary"]["detail"], "full");
        assert_eq!(value["pipeline"]["fallback"]["detail"], "text_only");
        assert_eq!(value["pipeline"]["rules"]["materials"][1], "PVC");
    }
}
