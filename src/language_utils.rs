//! Language utilities for ISO language code handling
//!
//! Requests may carry ISO 639-1 (2-letter) or ISO 639-2 (3-letter) codes;
//! providers and output file names want them in a canonical form.

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn lookup(code: &str) -> Option<Language> {
    let code = code.trim().to_lowercase();
    match code.len() {
        2 => Language::from_639_1(&code),
        3 => {
            let part2t = PART2B_TO_PART2T
                .iter()
                .find(|(b, _)| *b == code)
                .map(|(_, t)| *t)
                .unwrap_or(code.as_str());
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-2/T if no ISO 639-1 code exists
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang.to_639_1().unwrap_or_else(|| lang.to_639_3()).to_string())
}

/// Whether a string is a recognizable ISO 639-1 or 639-2 code
pub fn is_language_code(code: &str) -> bool {
    lookup(code).is_some()
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang.to_name().to_string())
}

/// Upper-case ISO 639-1 code, the form DeepL expects
pub fn to_deepl_code(code: &str) -> String {
    normalize_to_part1_or_part2t(code)
        .unwrap_or_else(|_| code.trim().to_string())
        .to_uppercase()
}
