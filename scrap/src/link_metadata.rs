//! Link metadata fetching - extracts Open Graph data from web pages
//!
//! Field priority (first hit wins):
//! - title:       og:title → twitter:title → <title>
//! - description: og:description → twitter:description → description
//! - site name:   og:site_name → page hostname (without `www.`)
//! - image:       og:image → og:image:secure_url → twitter:image, made absolute

use crate::config::FetchConfig;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("Response larger than {0} bytes")]
    TooLarge(usize),
}

/// Minimal response shape the preview fetch needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET seam, so the cache can be driven without a network
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &Url, accept: &str) -> Result<HttpResponse, FetchError>;
}

/// Default client backed by reqwest
pub struct ReqwestClient {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ReqwestClient {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config.max_html_bytes))
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &Url, accept: &str) -> Result<HttpResponse, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await?;

        let status = response.status().as_u16();
        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(FetchError::TooLarge(self.max_body_bytes));
            }
        }

        // Content-Length is absent for chunked bodies, so cap while reading
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge(self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Fetched link metadata. Missing fields are `None`, never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewData {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub image_url: Option<String>,
}

/// Fetch a page and extract its preview metadata
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_preview(
    client: &dyn HttpClient,
    url: &Url,
    config: &FetchConfig,
) -> Result<PreviewData, FetchError> {
    debug!("Fetching link preview");

    let response = client.get(url, &config.accept).await?;
    if !response.is_success() {
        return Err(FetchError::Status(response.status));
    }
    if response.body.len() > config.max_html_bytes {
        return Err(FetchError::TooLarge(config.max_html_bytes));
    }

    Ok(extract_preview(&response.body, url))
}

/// Extract preview fields from an HTML document fetched from `page_url`
pub fn extract_preview(html: &str, page_url: &Url) -> PreviewData {
    let meta = meta_tags(html);
    let first = |keys: &[&str]| keys.iter().find_map(|key| meta.get(*key).cloned());

    let title = first(&["og:title", "twitter:title"]).or_else(|| title_tag(html));
    let description = first(&["og:description", "twitter:description", "description"]);
    let site_name = first(&["og:site_name"]).or_else(|| hostname(page_url));
    let image_url = first(&["og:image", "og:image:secure_url", "twitter:image"])
        .and_then(|raw| resolve_url(page_url, &raw));

    PreviewData {
        url: page_url.to_string(),
        title,
        description,
        site_name,
        image_url,
    }
}

static META_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<meta\b[^>]*>").unwrap());

static KEY_ATTR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s(?:property|name)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

static CONTENT_ATTR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\scontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

static TITLE_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>([^<]*)</title>").unwrap());

/// Cleaned `content` of every `<meta property|name=...>` tag, keyed by the
/// lowercased key. Attributes may come in any order; the first non-blank
/// value for a key wins.
fn meta_tags(html: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for tag in META_TAG_REGEX.find_iter(html) {
        let tag = tag.as_str();
        let Some(key) = attr_value(&KEY_ATTR_REGEX, tag) else {
            continue;
        };
        let Some(content) = attr_value(&CONTENT_ATTR_REGEX, tag).and_then(clean_text) else {
            continue;
        };
        tags.entry(key.trim().to_ascii_lowercase()).or_insert(content);
    }
    tags
}

fn attr_value<'a>(re: &Regex, tag: &'a str) -> Option<&'a str> {
    let caps = re.captures(tag)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

fn title_tag(html: &str) -> Option<String> {
    let caps = TITLE_TAG_REGEX.captures(html)?;
    clean_text(&caps[1])
}

/// Decode entities, collapse whitespace; `None` if nothing is left
fn clean_text(raw: &str) -> Option<String> {
    let decoded = decode_entities(raw);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn hostname(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Make an image reference absolute. `data:` URLs pass through untouched.
fn resolve_url(base: &Url, reference: &str) -> Option<String> {
    if reference
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
    {
        return Some(reference.to_string());
    }
    base.join(reference).ok().map(|u| u.to_string())
}

/// Decode the HTML entities that commonly appear in meta tags
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        result.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        // Entities are short; anything longer is a bare ampersand
        let decoded = tail.as_bytes()[1..]
            .iter()
            .take(11)
            .position(|&b| b == b';')
            .and_then(|semi| {
                let name = &tail[1..semi + 1];
                decode_entity(name).map(|ch| (ch, semi + 2))
            });

        match decoded {
            Some((ch, consumed)) => {
                result.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                result.push('&');
                rest = &tail[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        _ => {
            let code = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}
