//! OCR text cleanup: a literal correction table, garbage-line filtering and
//! an optional LLM pass over the head of the text.
//!
//! The deterministic part always runs; the LLM pass is strictly additive and
//! any remote failure falls back to the deterministic output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ollama::LlmClient;

/// Known OCR misreads seen on real scans, applied in order as literal
/// replacements. Replacement values never contain a key, so a second
/// application is a no-op.
pub const CORRECTIONS: &[(&str, &str)] = &[
    // Mangled Russian words
    ("ниоподписонся", "нижеподписавшиеся"),
    ("впарить", "оборудование"),
    ("выпопнил", "выполнил"),
    ("BRT", "АКТ"),
    ("прадетовителем", "представителем"),
    ("Boiron", "Выполненные"),
    ("Cyerarmum", "Сервисные"),
    ("Эрве", "Замена"),
    // Latin artifacts inside Russian text
    ("doraron", ""),
    ("aos yy eae", ""),
    ("nia wa", "ООО"),
    ("taore Vonwrera", "представитель Заказчика"),
    ("tenner", "картридж"),
    // Equipment model misreads
    ("Ls ОМЗ ОЛА", "LaserJet M1132"),
];

/// Lines longer than this are kept only if enough of them is letters.
const LETTER_RATIO_MIN_LINE_LEN: usize = 3;

/// Minimum share of alphabetic characters for a line to survive.
const LETTER_RATIO_THRESHOLD: f64 = 0.3;

/// Latin-only lines shorter than this are treated as OCR noise.
const SHORT_LATIN_LINE_LEN: usize = 10;

/// The LLM pass only sees the head of the text; the tail is reattached
/// verbatim.
pub const LLM_CLEANUP_HEAD_CHARS: usize = 2000;

/// Reject an LLM rewrite that shrank the text below this share of the input.
pub const LLM_MIN_LENGTH_RATIO: f64 = 0.3;

static GARBAGE_SHORT_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2,4}\s+[a-z]{2,4}\s+[a-z]{2,4}$").expect("invalid garbage pattern")
});
static GARBAGE_SYMBOLS_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\W_]+$").expect("invalid garbage pattern"));
static GARBAGE_SHORT_LATIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z\s]+$").expect("invalid garbage pattern"));

/// Apply the correction table and drop garbage lines. Idempotent.
pub fn correct(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut corrected = text.to_string();
    for (wrong, right) in CORRECTIONS {
        corrected = corrected.replace(wrong, right);
    }

    let mut kept = Vec::new();
    for raw_line in corrected.split('\n') {
        let line = raw_line.trim();
        if line.is_empty() {
            kept.push("");
            continue;
        }
        if !is_garbage_line(line) {
            kept.push(line);
        }
    }
    kept.join("\n")
}

fn is_garbage_line(line: &str) -> bool {
    let char_count = line.chars().count();

    if char_count > LETTER_RATIO_MIN_LINE_LEN {
        let letters = line.chars().filter(|c| c.is_alphabetic()).count();
        if (letters as f64) / (char_count as f64) < LETTER_RATIO_THRESHOLD {
            return true;
        }
    }

    let lower = line.to_lowercase();
    if GARBAGE_SHORT_WORDS.is_match(&lower) || GARBAGE_SYMBOLS_ONLY.is_match(&lower) {
        return true;
    }
    if char_count < SHORT_LATIN_LINE_LEN && GARBAGE_SHORT_LATIN.is_match(&lower) {
        return true;
    }

    false
}

fn llm_prompt(chunk: &str) -> String {
    format!(
        "You are a Russian document text correction expert.\n\n\
         INPUT: OCR text from a Russian service document with recognition errors.\n\n\
         YOUR TASK:\n\
         1. Fix OCR errors in Russian words\n\
         2. Remove garbage text that doesn't make sense\n\
         3. Reconstruct damaged Russian words\n\
         4. Keep all numbers, dates, and model names intact\n\
         5. Preserve document structure\n\n\
         CORRUPTED TEXT:\n{chunk}\n\n\
         CORRECTED TEXT (Russian, clean, structured):"
    )
}

/// Byte offset of the first `chars` character boundary, clamped to the end.
fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Run the deterministic cleanup, then optionally let an LLM rewrite the
/// head of the text. The rewrite is accepted only if it kept a reasonable
/// share of the input; otherwise, and on any client error, the
/// deterministic result stands.
pub fn normalize_text(text: &str, llm: Option<(&dyn LlmClient, &str)>) -> String {
    let corrected = correct(text);

    let Some((client, model)) = llm else {
        return corrected;
    };
    if corrected.trim().chars().count() < 10 {
        return corrected;
    }

    let split = char_boundary(&corrected, LLM_CLEANUP_HEAD_CHARS);
    let (head, tail) = corrected.split_at(split);

    match client.generate(model, &llm_prompt(head)) {
        Ok(rewritten) => {
            let rewritten = rewritten.trim();
            let min_len = corrected.chars().count() as f64 * LLM_MIN_LENGTH_RATIO;
            if !rewritten.is_empty() && rewritten.chars().count() as f64 > min_len {
                format!("{rewritten}{tail}")
            } else {
                tracing::warn!(
                    rewritten_chars = rewritten.chars().count(),
                    "LLM cleanup dropped too much text, keeping deterministic output"
                );
                corrected
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM cleanup unavailable, keeping deterministic output");
            corrected
        }
    }
}
