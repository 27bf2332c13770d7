//! Input normalization and language-code handling.
//! Normalized input feeds the cache key, so two requests that differ only in
//! surrounding or repeated whitespace share one cache entry.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Language tags such as `en`, `zh-cn`, `pt_br` or `auto`.
static LANGUAGE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,8}(?:[-_][a-z0-9]{1,8})*$").expect("static regex"));

/// Trim and collapse whitespace runs to a single space. Case is preserved.
pub fn normalize_input(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Trim and lowercase a language code.
pub fn normalize_language_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Whether an already-normalized code looks like a language tag.
pub fn is_language_code(code: &str) -> bool {
    LANGUAGE_CODE.is_match(code)
}

/// Display name for a language code. Unknown codes are returned as-is.
pub fn language_name(code: &str) -> String {
    let primary = code.split(['-', '_']).next().unwrap_or(code);
    let name = match primary {
        "auto" => "Auto Detect",
        "en" => "English",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "pt" => "Portuguese",
        "it" => "Italian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "tr" => "Turkish",
        "vi" => "Vietnamese",
        "th" => "Thai",
        "nl" => "Dutch",
        "pl" => "Polish",
        "uk" => "Ukrainian",
        _ => return code.to_string(),
    };
    name.to_string()
}
