use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref URL: Regex = Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid regex");
    static ref TOKEN: Regex = Regex::new(r"(?u)[#@]?[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Analyze tweet text into index terms: NFKC normalization, lowercase, URLs
/// dropped, hashtags and mentions kept verbatim, every other token stemmed.
/// Must match the analysis used when the term dictionary was built.
pub fn analyze(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let stripped = URL.replace_all(&normalized, " ");
    TOKEN
        .find_iter(&stripped)
        .map(|m| {
            let token = m.as_str().trim_end_matches('\'');
            if token.starts_with('#') || token.starts_with('@') {
                token.to_string()
            } else {
                STEMMER.stem(token).to_string()
            }
        })
        .filter(|t| !t.is_empty())
        .collect()
}
