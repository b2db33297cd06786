use once_cell::sync::Lazy;
use regex::Regex;
use whatlang::{detect, Script};

const MIN_ALPHA_CHARS: usize = 4;
const LATIN_CONFIDENCE_THRESHOLD: f64 = 0.68;
const NON_LATIN_CONFIDENCE_THRESHOLD: f64 = 0.5;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid url regex"));
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[@#][\p{L}\p{N}_]+").expect("valid handle regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Overlay captions are short; links, handles and hashtags say nothing about the language.
fn normalize_caption(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, " ");
    let without_handles = HANDLE_RE.replace_all(&without_urls, " ");
    WHITESPACE_RE
        .replace_all(&without_handles, " ")
        .trim()
        .to_string()
}

pub fn detect_language_name(text: &str) -> Option<String> {
    let normalized = normalize_caption(text);
    if normalized.chars().filter(|ch| ch.is_alphabetic()).count() < MIN_ALPHA_CHARS {
        return None;
    }

    let info = detect(&normalized)?;
    let threshold = match info.script() {
        Script::Latin => LATIN_CONFIDENCE_THRESHOLD,
        _ => NON_LATIN_CONFIDENCE_THRESHOLD,
    };
    if info.is_reliable() || info.confidence() >= threshold {
        return Some(info.lang().eng_name().to_string());
    }

    None
}

fn language_name_from_tag(tag: &str) -> Option<&'static str> {
    let primary = tag.split(['-', '_']).next()?.trim().to_lowercase();
    match primary.as_str() {
        "en" => Some("English"),
        "zh" => Some("Chinese"),
        "ja" => Some("Japanese"),
        "ko" => Some("Korean"),
        "ru" => Some("Russian"),
        "uk" => Some("Ukrainian"),
        "es" => Some("Spanish"),
        "pt" => Some("Portuguese"),
        "it" => Some("Italian"),
        "fr" => Some("French"),
        "de" => Some("German"),
        "ar" => Some("Arabic"),
        "hi" => Some("Hindi"),
        "tr" => Some("Turkish"),
        "nl" => Some("Dutch"),
        "pl" => Some("Polish"),
        "vi" => Some("Vietnamese"),
        "th" => Some("Thai"),
        "id" => Some("Indonesian"),
        "fa" => Some("Persian"),
        "he" | "iw" => Some("Hebrew"),
        _ => None,
    }
}

/// First recognised tag of an `Accept-Language` header, in listed order.
fn language_from_accept_header(header: &str) -> Option<&'static str> {
    header
        .split(',')
        .filter_map(|entry| entry.split(';').next())
        .find_map(|tag| language_name_from_tag(tag.trim()))
}

/// Picks the language the overlay text should be rendered in.
///
/// An explicit choice wins, then detection on the text itself, then the
/// browser's `Accept-Language`, then the configured default.
pub fn resolve_overlay_language(
    explicit: &str,
    text: &str,
    accept_language: Option<&str>,
    default_language: &str,
) -> String {
    let explicit = explicit.trim();
    if !explicit.is_empty() {
        return explicit.to_string();
    }

    if let Some(language) = detect_language_name(text) {
        return language;
    }

    if let Some(language) = accept_language.and_then(language_from_accept_header) {
        return language.to_string();
    }

    default_language.to_string()
}
