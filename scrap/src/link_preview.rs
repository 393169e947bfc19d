//! LinkPreviewCache - deduplicating, session-lifetime cache of link previews
//!
//! Coalescing: the first `request` for a URL records `Pending` and starts the
//! only fetch for it, under a single lock acquisition. Every later request
//! sees `Pending` (or the terminal state) and performs no I/O.
//!
//! Terminal entries (`Ready`, `Failed`) are never replaced for the lifetime of
//! the cache. Fetches are not cancelled when a caller goes away; they still
//! populate the cache. `PreviewBinding` lets a view ignore results for a URL
//! it no longer shows.

use crate::config::FetchConfig;
use crate::link_metadata::{fetch_preview, HttpClient, PreviewData};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

/// Fallback Tokio runtime for requests made outside any runtime context
/// (foreign callers through UniFFI). Shared by all caches and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("scrap-preview")
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

fn runtime_handle() -> tokio::runtime::Handle {
    tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
}

/// Cached preview state for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPreview {
    /// A fetch is in flight
    Pending,
    Ready(PreviewData),
    /// The fetch did not succeed. Not retried.
    Failed,
}

impl LinkPreview {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LinkPreview::Pending)
    }

    pub fn data(&self) -> Option<&PreviewData> {
        match self {
            LinkPreview::Ready(data) => Some(data),
            _ => None,
        }
    }
}

/// Called with `(url, state)` on every state transition
pub type PreviewListener = Arc<dyn Fn(&str, &LinkPreview) + Send + Sync>;

pub type ListenerId = u64;

struct Inner {
    client: Arc<dyn HttpClient>,
    config: FetchConfig,
    entries: Mutex<HashMap<String, Arc<watch::Sender<LinkPreview>>>>,
    listeners: Mutex<Vec<(ListenerId, PreviewListener)>>,
    next_listener_id: AtomicU64,
}

impl Inner {
    fn complete(&self, key: &str, state: LinkPreview) {
        {
            let entries = self.entries.lock();
            let Some(tx) = entries.get(key) else {
                return;
            };
            if tx.borrow().is_terminal() {
                return;
            }
            tx.send_replace(state.clone());
        }
        self.notify(key, &state);
    }

    fn notify(&self, key: &str, state: &LinkPreview) {
        let listeners: Vec<PreviewListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(key, state);
        }
    }
}

/// Cheap to clone; clones share the same entries
#[derive(Clone)]
pub struct LinkPreviewCache {
    inner: Arc<Inner>,
}

impl LinkPreviewCache {
    pub fn new(client: Arc<dyn HttpClient>, config: FetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                entries: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current state for `url`, starting a fetch if the URL has never been seen.
    ///
    /// Never blocks on the network. Malformed or non-http(s) URLs are recorded
    /// as `Failed` straight away.
    pub fn request(&self, url: &str) -> LinkPreview {
        let key = normalize_url(url);

        let (state, fetch_url) = {
            let mut entries = self.inner.entries.lock();
            if let Some(tx) = entries.get(&key) {
                return tx.borrow().clone();
            }

            let fetch_url = fetchable_url(&key);
            let state = if fetch_url.is_some() {
                LinkPreview::Pending
            } else {
                debug!(url = %key, "Not a fetchable URL");
                LinkPreview::Failed
            };
            let (tx, _) = watch::channel(state.clone());
            entries.insert(key.clone(), Arc::new(tx));
            (state, fetch_url)
        };

        self.inner.notify(&key, &state);
        if let Some(fetch_url) = fetch_url {
            self.spawn_fetch(key, fetch_url);
        }
        state
    }

    /// Peek at the state for `url` without starting a fetch
    pub fn get(&self, url: &str) -> Option<LinkPreview> {
        let key = normalize_url(url);
        self.inner.entries.lock().get(&key).map(|tx| tx.borrow().clone())
    }

    /// `request`, then wait until the entry is terminal
    pub async fn resolve(&self, url: &str) -> LinkPreview {
        let current = self.request(url);
        if current.is_terminal() {
            return current;
        }

        let key = normalize_url(url);
        let rx = {
            let entries = self.inner.entries.lock();
            entries.get(&key).map(|tx| tx.subscribe())
        };
        let Some(mut rx) = rx else {
            return current;
        };

        let resolved = match rx.wait_for(LinkPreview::is_terminal).await {
            Ok(state) => (*state).clone(),
            Err(_) => current,
        };
        resolved
    }

    /// Resolve the URL a view is bound to. `None` if the view was rebound
    /// to something else before the result arrived.
    pub async fn resolve_for(
        &self,
        binding: &PreviewBinding,
        ticket: &BindingTicket,
    ) -> Option<LinkPreview> {
        let state = self.resolve(&ticket.url).await;
        binding.is_current(ticket).then_some(state)
    }

    /// Number of URLs with a fetch still in flight
    pub fn in_flight(&self) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|tx| !tx.borrow().is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    pub fn subscribe(&self, listener: PreviewListener) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// The fetch runs in its own task so that a panic while fetching or
    /// parsing still settles the entry as `Failed`.
    fn spawn_fetch(&self, key: String, url: Url) {
        let handle = runtime_handle();
        let fetch = {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move {
                fetch_preview(inner.client.as_ref(), &url, &inner.config).await
            })
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let state = match fetch.await {
                Ok(Ok(data)) => LinkPreview::Ready(data),
                Ok(Err(e)) => {
                    debug!(url = %key, error = %e, "Link preview fetch failed");
                    LinkPreview::Failed
                }
                Err(e) => {
                    warn!(url = %key, error = %e, "Link preview task did not complete");
                    LinkPreview::Failed
                }
            };
            inner.complete(&key, state);
        });
    }
}

/// Cache key: the parsed URL's serialization, or the trimmed input if it doesn't parse
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) => url.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

fn fetchable_url(key: &str) -> Option<Url> {
    let url = Url::parse(key).ok()?;
    if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
        Some(url)
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GENERATION CHECK
// ─────────────────────────────────────────────────────────────────────────────

/// Tracks which URL a view currently shows. Every `bind` invalidates tickets
/// handed out before it.
#[derive(Debug, Default)]
pub struct PreviewBinding {
    generation: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTicket {
    generation: u64,
    url: String,
}

impl BindingTicket {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PreviewBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, url: &str) -> BindingTicket {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        BindingTicket {
            generation,
            url: url.to_string(),
        }
    }

    /// The view stopped showing any link
    pub fn unbind(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_current(&self, ticket: &BindingTicket) -> bool {
        self.generation.load(Ordering::Acquire) == ticket.generation
    }
}
