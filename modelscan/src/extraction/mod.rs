//! Model-number extraction from merged OCR text.
//!
//! Extraction is anchored on label keywords: only text shortly after a label
//! is considered, and the first token-shaped substring there is the
//! candidate. Measurement values and material abbreviations are the usual
//! false positives on product photos and are filtered out.

mod score;

pub use score::ScoreSummary;

use regex::Regex;

use crate::config::ExtractionRules;
use crate::error::Result;

/// Characters allowed on the label's line after the keyword.
const SAME_LINE_CHARS: usize = 40;
/// Characters taken from the following line.
const NEXT_LINE_CHARS: usize = 80;

const TOKEN_PATTERN: &str = r"[A-Za-z0-9\-_/.+$]{2,24}";

/// Candidates found by one pass over a text, with what the filters dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionScan {
    pub tokens: Vec<String>,
    /// First candidates rejected as measurement values.
    pub unit_like: Vec<String>,
    /// First candidates rejected as material abbreviations.
    pub material_like: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TokenExtractor {
    context: Regex,
    token: Regex,
    unit: Option<Regex>,
    materials: Vec<String>,
}

impl TokenExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        let mut labels: Vec<&str> = rules
            .labels
            .iter()
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            return Err(crate::error::ScanError::Config(
                "at least one extraction label is required".to_string(),
            ));
        }
        // Longer labels first so "商品型號" wins over its suffix "型號".
        labels.sort_by_key(|l| std::cmp::Reverse(l.chars().count()));
        let alternation = labels
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");
        let context = Regex::new(&format!(
            r"(?i)(?:{alternation})([^\n]{{0,{SAME_LINE_CHARS}}}\n?[^\n]{{0,{NEXT_LINE_CHARS}}})"
        ))?;

        let units: Vec<String> = rules
            .units
            .iter()
            .filter(|u| !u.is_empty())
            .map(|u| regex::escape(u))
            .collect();
        let unit = if units.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)(?:{})\b", units.join("|")))?)
        };

        Ok(Self {
            context,
            token: Regex::new(TOKEN_PATTERN)?,
            unit,
            materials: rules.materials.iter().map(|m| m.to_uppercase()).collect(),
        })
    }

    /// Extract candidate model tokens, first-seen order, no duplicates.
    pub fn extract_tokens(&self, text: &str) -> Vec<String> {
        self.scan(text).tokens
    }

    pub fn scan(&self, text: &str) -> ExtractionScan {
        let mut scan = ExtractionScan::default();

        for caps in self.context.captures_iter(text) {
            let Some(window) = caps.get(1) else {
                continue;
            };
            let Some(found) = self.token.find(window.as_str()) else {
                continue;
            };
            let candidate = found.as_str();

            if self.is_unit_like(candidate) {
                push_unique(&mut scan.unit_like, candidate);
                continue;
            }
            if self.is_material(candidate) {
                push_unique(&mut scan.material_like, candidate);
                continue;
            }
            push_unique(&mut scan.tokens, candidate);
        }

        scan
    }

    /// True when `token` carries a unit suffix such as `5mm` or `220V`.
    pub fn is_unit_like(&self, token: &str) -> bool {
        self.unit.as_ref().is_some_and(|re| re.is_match(token))
    }

    pub fn is_material(&self, token: &str) -> bool {
        let upper = token.to_uppercase();
        self.materials.iter().any(|m| *m == upper)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extractor() -> TokenExtractor {
        TokenExtractor::new(&ExtractionRules::default()).unwrap()
    }

    #[test]
    fn test_labeled_token_in_block() {
        let tokens = extractor().extract_tokens("[img1]\n型號: ABC-123\n\n");
        assert_eq!(tokens, vec!["ABC-123"]);
    }

    #[test]
    fn test_unit_value_is_rejected() {
        let ex = extractor();
        assert!(ex.extract_tokens("型號: 5mm").is_empty());
        assert!(ex.extract_tokens("Model 220V").is_empty());
        assert!(ex.extract_tokens("型號：3.5kg 重量").is_empty());
    }

    #[test]
    fn test_material_is_rejected() {
        let ex = extractor();
        assert!(ex.extract_tokens("商品型號 abs").is_empty());
        assert!(ex.extract_tokens("型號: PVC").is_empty());
        assert_eq!(ex.extract_tokens("型號: ABS-200"), vec!["ABS-200"]);
    }

    #[test]
    fn test_english_label_is_case_insensitive() {
        let ex = extractor();
        assert_eq!(ex.extract_tokens("MODEL: XR-7"), vec!["XR-7"]);
        assert_eq!(ex.extract_tokens("model#SY-900+"), vec!["SY-900+"]);
    }

    #[test]
    fn test_label_keyword_is_not_a_candidate() {
        assert_eq!(extractor().extract_tokens("Model: HX/2000"), vec!["HX/2000"]);
    }

    #[test]
    fn test_token_on_next_line() {
        let text = "商品型號：\nKT-88$ 黑色\n";
        assert_eq!(extractor().extract_tokens(text), vec!["KT-88$"]);
    }

    #[test]
    fn test_window_does_not_reach_third_line() {
        let text = "型號：\n顏色\nQQ-1\n";
        assert!(extractor().extract_tokens(text).is_empty());
    }

    #[test]
    fn test_window_length_limit() {
        let reach = SAME_LINE_CHARS + NEXT_LINE_CHARS;

        let text = format!("型號{}AB-1", "說".repeat(reach + 5));
        assert!(extractor().extract_tokens(&text).is_empty());

        let text = format!("型號{}AB-1", "說".repeat(reach - 10));
        assert_eq!(extractor().extract_tokens(&text), vec!["AB-1"]);
    }

    #[test]
    fn test_windows_do_not_overlap() {
        // The second label sits inside the first window, whose first
        // candidate is rejected.
        assert!(extractor().extract_tokens("型號: 12V 型號: QQ-5").is_empty());
    }

    #[test]
    fn test_order_and_dedup() {
        let text = "[a.png]\n型號: ZX-1\n\n[b.png]\nModel ZX-2\n\n[c.png]\n型號 ZX-1\n\n";
        assert_eq!(extractor().extract_tokens(text), vec!["ZX-1", "ZX-2"]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let ex = extractor();
        let text = "型號: A1-B2\n\n規格 5mm\n\nModel: 12V\n\n商品型號 Q9";
        let first = ex.extract_tokens(text);
        assert_eq!(first, ex.extract_tokens(text));
        assert_eq!(first, vec!["A1-B2", "Q9"]);
    }

    #[test]
    fn test_results_never_contain_noise() {
        let ex = extractor();
        let text = ["5mm", "10cm", "PP", "2000mAh", "60Hz", "OK-1", "pvc"]
            .iter()
            .map(|v| format!("型號 {v}\n\n"))
            .collect::<String>();
        let tokens = ex.extract_tokens(&text);
        assert!(tokens.iter().all(|t| !ex.is_unit_like(t) && !ex.is_material(t)));
        assert_eq!(tokens, vec!["OK-1"]);
    }

    #[test]
    fn test_scan_reports_rejections() {
        let scan = extractor().scan("型號: 5mm\n\n型號: PP\n\n型號: GG-3\n");
        assert_eq!(scan.tokens, vec!["GG-3"]);
        assert_eq!(scan.unit_like, vec!["5mm"]);
        assert_eq!(scan.material_like, vec!["PP"]);
    }

    #[test]
    fn test_custom_rules() {
        let rules = ExtractionRules {
            labels: vec!["Type".to_string()],
            units: vec![],
            materials: vec!["steel".to_string()],
        };
        let ex = TokenExtractor::new(&rules).unwrap();
        assert_eq!(ex.extract_tokens("type: 5mm"), vec!["5mm"]);
        assert!(ex.extract_tokens("Type STEEL").is_empty());
        assert!(ex.extract_tokens("型號: ABC-123").is_empty());
    }

    #[test]
    fn test_empty_labels_rejected() {
        let rules = ExtractionRules {
            labels: vec![],
            ..ExtractionRules::default()
        };
        assert!(TokenExtractor::new(&rules).is_err());
    }
}
