use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

/// Lowercases and collapses every run of characters that are neither letters
/// nor digits (in any script) into `_`. A value with no letters or digits at
/// all maps to a short hash of itself so distinct names keep distinct slugs.
pub fn slugify(value: &str) -> String {
    let lowered = value.to_lowercase();
    let slug = NON_SLUG_CHARS
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string();
    if !slug.is_empty() {
        return slug;
    }
    let digest = Sha256::digest(value.trim().as_bytes());
    hex::encode(&digest[..6])
}
