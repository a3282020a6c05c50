use std::fmt;

use super::ExtractionScan;

/// Placeholder printed when a run produced no candidates.
const NO_CANDIDATES: &str = "無";

/// Diagnostic summary of a run's final candidates, optionally graded against
/// a known-correct token.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub candidates: Vec<String>,
    pub units_like: usize,
    pub mats_like: usize,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub expected: String,
    /// 1 when the first candidate is the expected token.
    pub hit_at_1: u8,
    pub precision: f64,
}

impl ScoreSummary {
    pub fn from_scan(scan: &ExtractionScan, expected: Option<&str>) -> Self {
        let candidates = scan.tokens.clone();
        let grade = expected
            .map(str::trim)
            .filter(|gt| !gt.is_empty())
            .map(|gt| {
                let hits = candidates.iter().filter(|c| *c == gt).count();
                let precision = if candidates.is_empty() {
                    0.0
                } else {
                    hits as f64 / candidates.len() as f64
                };
                Grade {
                    expected: gt.to_string(),
                    hit_at_1: u8::from(candidates.first().is_some_and(|c| c == gt)),
                    precision,
                }
            });

        Self {
            units_like: scan.unit_like.len(),
            mats_like: scan.material_like.len(),
            candidates,
            grade,
        }
    }
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.candidates.is_empty() {
            writeln!(f, "[CANDIDATES] {NO_CANDIDATES}")?;
        } else {
            writeln!(f, "[CANDIDATES] {}", self.candidates.join(", "))?;
        }
        write!(
            f,
            "[NOISE] units_like={}  mats_like={}",
            self.units_like, self.mats_like
        )?;
        if let Some(grade) = &self.grade {
            write!(
                f,
                "\n[GT] {}\nHit@1 = {}\nPrecision = {:.2}",
                grade.expected, grade.hit_at_1, grade.precision
            )?;
        }
        Ok(())
    }
}
