//! Link detection in message text
//!
//! The UI previews only the first link of a message, so the main entry point
//! is `first_link`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Candidate link tokens: scheme-prefixed or bare `www.` hosts
static LINK_CANDIDATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").unwrap()
});

/// Common protocols accepted as links. Exotic schemes like javascript:,
/// data:, or custom-app:// are rejected.
const LINK_PROTOCOLS: &[&str] = &["http://", "https://", "ftp://", "ftps://"];

/// Punctuation that usually ends a sentence rather than a URL
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', ')', ']', '}', '>'];

/// Check if the whole text is a single URL with a common protocol
pub fn is_url(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.len() > 2000 || trimmed.contains(char::is_whitespace) {
        return false;
    }

    let lower = trimmed.to_lowercase();
    if !LINK_PROTOCOLS.iter().any(|p| lower.starts_with(p)) {
        return false;
    }

    validator::validate_url(trimmed)
}

/// First web link embedded in `text`, normalized to an absolute http(s) URL.
///
/// `www.example.com` becomes `http://www.example.com`; trailing sentence
/// punctuation is not part of the link.
pub fn first_link(text: &str) -> Option<String> {
    links(text).next()
}

/// All web links in `text`, in order of appearance
pub fn links(text: &str) -> impl Iterator<Item = String> + '_ {
    LINK_CANDIDATE_REGEX
        .find_iter(text)
        .filter_map(|m| normalize_candidate(m.as_str()))
}

fn normalize_candidate(raw: &str) -> Option<String> {
    let candidate = trim_trailing(raw);
    let absolute = if candidate.len() >= 4 && candidate[..4].eq_ignore_ascii_case("www.") {
        format!("http://{}", candidate)
    } else {
        candidate.to_string()
    };

    let parsed = url::Url::parse(&absolute).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    is_url(&absolute).then_some(absolute)
}

/// Strip trailing punctuation, keeping a closing paren that balances one inside the link
fn trim_trailing(raw: &str) -> &str {
    let mut end = raw.len();
    while let Some(ch) = raw[..end].chars().next_back() {
        if !TRAILING_PUNCTUATION.contains(&ch) {
            break;
        }
        if ch == ')' {
            let inner = &raw[..end];
            if inner.matches('(').count() >= inner.matches(')').count() {
                break;
            }
        }
        end -= ch.len_utf8();
    }
    &raw[..end]
}
