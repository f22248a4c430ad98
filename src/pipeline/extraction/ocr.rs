//! Classical OCR engine behind a trait so tests run without Tesseract.

use std::collections::HashMap;

use super::ExtractionError;

/// Page segmentation modes tried per image, in order: fully automatic,
/// uniform block, sparse text, single column.
pub const PSM_MODES: &[u32] = &[3, 6, 11, 4];

/// One OCR run over one image variant.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub text: String,
    /// Mean per-word confidence in 0.0..=1.0.
    pub confidence: f32,
}

pub trait OcrEngine: Send + Sync {
    /// Recognize text in a PNG-encoded image with the given segmentation mode.
    fn recognize(&self, image_png: &[u8], psm: u32) -> Result<OcrResult, ExtractionError>;
}

/// Tesseract engine, Russian plus English.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata_dir: Option<String>,
    lang: String,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    pub fn new(tessdata_dir: Option<String>) -> Self {
        Self {
            tessdata_dir,
            lang: "rus+eng".to_string(),
        }
    }

    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn recognize(&self, image_png: &[u8], psm: u32) -> Result<OcrResult, ExtractionError> {
        let tess = tesseract::Tesseract::new(self.tessdata_dir.as_deref(), Some(&self.lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let tess = tess
            .set_variable("tessedit_pageseg_mode", &psm.to_string())
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_png)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        // Word-level confidences from TSV output; see parse_tsv for the format.
        match tess.get_tsv_text(0) {
            Ok(tsv) => Ok(aggregate_words(&parse_tsv(&tsv))),
            Err(_) => {
                let text = tess
                    .get_text()
                    .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
                let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;
                Ok(OcrResult {
                    text: text.trim().to_string(),
                    confidence,
                })
            }
        }
    }
}

/// A recognized word with its confidence in 0..=100.
#[derive(Debug, Clone, PartialEq)]
pub struct TsvWord {
    pub text: String,
    pub confidence: i32,
}

/// Parse Tesseract TSV output into word entries.
/// TSV columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Level 5 rows are words; conf -1 marks entries
/// Tesseract could not score, which are skipped like zero-confidence words.
pub fn parse_tsv(tsv: &str) -> Vec<TsvWord> {
    let mut words = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }
        let conf: i32 = match fields[10].parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if conf <= 0 {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        words.push(TsvWord {
            text: text.to_string(),
            confidence: conf,
        });
    }

    words
}

/// Join scored words into a single result with mean confidence.
pub fn aggregate_words(words: &[TsvWord]) -> OcrResult {
    if words.is_empty() {
        return OcrResult {
            text: String::new(),
            confidence: 0.0,
        };
    }
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let mean = words.iter().map(|w| w.confidence as f32).sum::<f32>() / words.len() as f32;
    OcrResult {
        text,
        confidence: mean / 100.0,
    }
}

/// Mock OCR engine for unit testing without Tesseract.
/// Returns a default result, overridable per segmentation mode.
pub struct MockOcrEngine {
    default: OcrResult,
    per_psm: HashMap<u32, OcrResult>,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            default: OcrResult {
                text: text.to_string(),
                confidence,
            },
            per_psm: HashMap::new(),
        }
    }

    pub fn with_psm_result(mut self, psm: u32, text: &str, confidence: f32) -> Self {
        self.per_psm.insert(
            psm,
            OcrResult {
                text: text.to_string(),
                confidence,
            },
        );
        self
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _image_png: &[u8], psm: u32) -> Result<OcrResult, ExtractionError> {
        Ok(self.per_psm.get(&psm).cloned().unwrap_or_else(|| self.default.clone()))
    }
}

/// Mock engine that always fails, for degradation tests.
pub struct FailingOcrEngine;

impl OcrEngine for FailingOcrEngine {
    fn recognize(&self, _image_png: &[u8], _psm: u32) -> Result<OcrResult, ExtractionError> {
        Err(ExtractionError::OcrProcessing("engine unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV_HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn mock_returns_configured_text() {
        let engine = MockOcrEngine::new("АКТ по заявке", 0.85);
        let result = engine.recognize(b"fake", 3).unwrap();
        assert_eq!(result.text, "АКТ по заявке");
        assert!((result.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn mock_per_psm_override() {
        let engine = MockOcrEngine::new("default", 0.5).with_psm_result(6, "block mode", 0.9);
        assert_eq!(engine.recognize(b"x", 3).unwrap().text, "default");
        assert_eq!(engine.recognize(b"x", 6).unwrap().text, "block mode");
    }

    #[test]
    fn failing_engine_errors() {
        assert!(FailingOcrEngine.recognize(b"x", 3).is_err());
    }

    #[test]
    fn tsv_parser_extracts_scored_words() {
        let tsv = format!(
            "{TSV_HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t600\t800\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t95\tАКТ\n\
             5\t1\t1\t1\t1\t2\t100\t20\t60\t30\t88\t1847896"
        );
        let words = parse_tsv(&tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "АКТ");
        assert_eq!(words[0].confidence, 95);
    }

    #[test]
    fn tsv_parser_skips_unscored_and_structural_rows() {
        let tsv = format!(
            "{TSV_HEADER}\n\
             4\t1\t1\t1\t1\t0\t10\t20\t200\t30\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t-1\tgarbled\n\
             5\t1\t1\t1\t1\t2\t100\t20\t80\t30\t0\tzero\n\
             5\t1\t1\t1\t1\t3\t200\t20\t80\t30\t70\tok"
        );
        let words = parse_tsv(&tsv);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "ok");
    }

    #[test]
    fn tsv_parser_skips_malformed_lines() {
        let tsv = format!("{TSV_HEADER}\ntoo\tfew\nnot_a_number\t1\t1\t1\t1\t1\t1\t1\t1\t1\t50\tx");
        assert!(parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn aggregate_means_confidences() {
        let words = vec![
            TsvWord {
                text: "АКТ".into(),
                confidence: 90,
            },
            TsvWord {
                text: "1847896".into(),
                confidence: 70,
            },
        ];
        let result = aggregate_words(&words);
        assert_eq!(result.text, "АКТ 1847896");
        assert!((result.confidence - 0.80).abs() < 1e-6);
    }

    #[test]
    fn aggregate_empty_is_zero_confidence() {
        let result = aggregate_words(&[]);
        assert!(result.text.is_empty());
        assert_eq!(result.confidence, 0.0);
    }
}
