//! Inbound text: typed input, share-intent payloads and share deep links
//!
//! Each source hands over a raw payload; only non-blank strings make it
//! through to the store.

use crate::models::normalize_text;
use url::Url;

/// Text typed into the composer
pub fn text_from_input(raw: &str) -> Option<String> {
    normalize_text(raw)
}

/// `text` field of a share-intent payload, e.g. `{"text": "...", "type": "text"}`.
/// Anything other than a non-blank JSON string is rejected.
pub fn text_from_share_payload(payload: &serde_json::Value) -> Option<String> {
    payload.get("text")?.as_str().and_then(normalize_text)
}

/// Same as `text_from_share_payload`, from the raw JSON string
pub fn text_from_share_json(raw: &str) -> Option<String> {
    let payload: serde_json::Value = serde_json::from_str(raw).ok()?;
    text_from_share_payload(&payload)
}

/// `<scheme>://share?text=<percent-encoded text>`
pub fn text_from_deep_link(link: &str, scheme: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    if !url.scheme().eq_ignore_ascii_case(scheme) || url.host_str() != Some("share") {
        return None;
    }
    let text = url
        .query_pairs()
        .find(|(key, _)| key == "text")
        .map(|(_, value)| value.into_owned())?;
    normalize_text(&text)
}
