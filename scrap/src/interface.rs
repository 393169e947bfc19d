//! Scrap FFI Interface Definition
//!
//! The object and records exposed to the Swift / Kotlin shells via UniFFI.
//! The app constructs one `ScrapCore` at launch and keeps it for its lifetime.

use crate::config::{ConfigError, ScrapConfig};
use crate::content_detection;
use crate::database::{Database, DatabaseError, KeyValueStorage};
use crate::ingest;
use crate::link_metadata::{FetchError, HttpClient, PreviewData, ReqwestClient};
use crate::link_preview::{LinkPreview, LinkPreviewCache};
use crate::models::{Message, MessagePatch};
use crate::store::MessageStore;
use crate::timeline;
use std::sync::Arc;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS & ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// A message as the UI sees it
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct MessageRecord {
    pub id: String,
    pub text: String,
    /// Creation time, unix milliseconds
    pub timestamp_ms: i64,
    pub parent: Option<String>,
    /// First web link in `text`, the one to preview
    pub first_link: Option<String>,
}

impl From<&Message> for MessageRecord {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            text: message.text.clone(),
            timestamp_ms: message.date.timestamp_millis(),
            parent: message.parent.clone(),
            first_link: content_detection::first_link(&message.text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PreviewRecord {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub image_url: Option<String>,
}

impl From<&PreviewData> for PreviewRecord {
    fn from(data: &PreviewData) -> Self {
        Self {
            url: data.url.clone(),
            title: data.title.clone(),
            description: data.description.clone(),
            site_name: data.site_name.clone(),
            image_url: data.image_url.clone(),
        }
    }
}

/// Link preview fetch state
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum LinkPreviewState {
    Pending,
    Ready { preview: PreviewRecord },
    Failed,
}

impl From<&LinkPreview> for LinkPreviewState {
    fn from(state: &LinkPreview) -> Self {
        match state {
            LinkPreview::Pending => LinkPreviewState::Pending,
            LinkPreview::Ready(data) => LinkPreviewState::Ready {
                preview: PreviewRecord::from(data),
            },
            LinkPreview::Failed => LinkPreviewState::Failed,
        }
    }
}

/// Error type for Scrap operations
#[derive(Debug, Error, uniffi::Error)]
pub enum ScrapError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid config: {0}")]
    ConfigError(String),
    #[error("HTTP client error: {0}")]
    HttpError(String),
}

impl From<DatabaseError> for ScrapError {
    fn from(e: DatabaseError) -> Self {
        ScrapError::DatabaseError(e.to_string())
    }
}

impl From<ConfigError> for ScrapError {
    fn from(e: ConfigError) -> Self {
        ScrapError::ConfigError(e.to_string())
    }
}

impl From<FetchError> for ScrapError {
    fn from(e: FetchError) -> Self {
        ScrapError::HttpError(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVERS (implemented on the foreign side)
// ═══════════════════════════════════════════════════════════════════════════════

#[uniffi::export(with_foreign)]
pub trait MessagesObserver: Send + Sync {
    /// Latest list, most recent first
    fn on_messages_changed(&self, messages: Vec<MessageRecord>);
}

#[uniffi::export(with_foreign)]
pub trait PreviewObserver: Send + Sync {
    fn on_preview_changed(&self, url: String, state: LinkPreviewState);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE OBJECT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(uniffi::Object)]
pub struct ScrapCore {
    config: ScrapConfig,
    store: MessageStore,
    previews: LinkPreviewCache,
}

// Internal constructors and accessors (not exported via FFI)
impl ScrapCore {
    /// Assemble from explicit parts; hydrates the store
    pub fn with_parts(
        storage: Arc<dyn KeyValueStorage>,
        client: Arc<dyn HttpClient>,
        config: ScrapConfig,
    ) -> Self {
        let store = MessageStore::open(storage, config.storage_key.clone());
        let previews = LinkPreviewCache::new(client, config.fetch.clone());
        Self {
            config,
            store,
            previews,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn previews(&self) -> &LinkPreviewCache {
        &self.previews
    }

    fn open(db_path: &str, config: ScrapConfig) -> Result<Self, ScrapError> {
        let db = Database::open(db_path)?;
        let client = ReqwestClient::new(&config.fetch)?;
        Ok(Self::with_parts(Arc::new(db), Arc::new(client), config))
    }

    fn add_message(&self, message: Option<Message>) -> Option<MessageRecord> {
        let message = message?;
        let record = MessageRecord::from(&message);
        self.store.add(message).then_some(record)
    }
}

#[uniffi::export]
impl ScrapCore {
    /// Open (or create) the message database at `db_path`
    #[uniffi::constructor]
    pub fn new(db_path: String) -> Result<Self, ScrapError> {
        Self::open(&db_path, ScrapConfig::default())
    }

    /// Same as `new`, with a JSON config (missing fields use defaults)
    #[uniffi::constructor]
    pub fn with_config(db_path: String, config_json: String) -> Result<Self, ScrapError> {
        let config = ScrapConfig::from_json(&config_json)?;
        Self::open(&db_path, config)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// All messages, most recent first
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.store.list().iter().map(MessageRecord::from).collect()
    }

    /// For each message in `messages()` order: the date-divider label that
    /// follows it, if it is the last message of its (local) day
    pub fn date_dividers(&self) -> Vec<Option<String>> {
        let messages = self.store.list();
        let today = chrono::Local::now().date_naive();
        (0..messages.len())
            .map(|i| {
                timeline::needs_divider(&messages, i, &chrono::Local).then(|| {
                    timeline::date_label(timeline::local_day(&messages[i], &chrono::Local), today)
                })
            })
            .collect()
    }

    pub fn first_link(&self, text: String) -> Option<String> {
        content_detection::first_link(&text)
    }

    /// Cached preview state; starts the fetch on first sight of `url`
    pub fn request_preview(&self, url: String) -> LinkPreviewState {
        LinkPreviewState::from(&self.previews.request(&url))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Typed input. `None` if the text is blank.
    pub fn add_text(&self, text: String) -> Option<MessageRecord> {
        let text = ingest::text_from_input(&text)?;
        self.add_message(Message::from_text(&text))
    }

    pub fn reply(&self, text: String, parent_id: String) -> Option<MessageRecord> {
        let text = ingest::text_from_input(&text)?;
        self.add_message(Message::reply_to(&text, &parent_id))
    }

    /// Share-intent payload as JSON
    pub fn add_shared_payload(&self, payload_json: String) -> Option<MessageRecord> {
        let text = ingest::text_from_share_json(&payload_json)?;
        self.add_message(Message::from_text(&text))
    }

    /// `scrapper://share?text=...`
    pub fn add_from_deep_link(&self, link: String) -> Option<MessageRecord> {
        let text = ingest::text_from_deep_link(&link, &self.config.deep_link_scheme)?;
        self.add_message(Message::from_text(&text))
    }

    pub fn update_text(&self, id: String, text: String) -> bool {
        self.store.update(&id, MessagePatch::text(text))
    }

    pub fn set_parent(&self, id: String, parent_id: Option<String>) -> bool {
        self.store.update(&id, MessagePatch::parent(parent_id))
    }

    pub fn delete_message(&self, id: String) -> bool {
        self.store.delete(&id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn subscribe_messages(&self, observer: Arc<dyn MessagesObserver>) -> u64 {
        self.store.subscribe(Arc::new(move |messages: &[Message]| {
            observer.on_messages_changed(messages.iter().map(MessageRecord::from).collect());
        }))
    }

    pub fn unsubscribe_messages(&self, id: u64) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn subscribe_previews(&self, observer: Arc<dyn PreviewObserver>) -> u64 {
        self.previews
            .subscribe(Arc::new(move |url: &str, state: &LinkPreview| {
                observer.on_preview_changed(url.to_string(), LinkPreviewState::from(state));
            }))
    }

    pub fn unsubscribe_previews(&self, id: u64) -> bool {
        self.previews.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStorage;
    use crate::link_metadata::HttpResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use url::Url;

    struct PageClient;

    #[async_trait]
    impl HttpClient for PageClient {
        async fn get(&self, url: &Url, _accept: &str) -> Result<HttpResponse, FetchError> {
            Ok(HttpResponse {
                status: 200,
                body: format!("<title>Page at {}</title>", url.path()),
            })
        }
    }

    fn core() -> ScrapCore {
        ScrapCore::with_parts(
            Arc::new(MemoryStorage::new()),
            Arc::new(PageClient),
            ScrapConfig::default(),
        )
    }

    #[derive(Default)]
    struct RecordingObserver {
        lists: Mutex<Vec<Vec<MessageRecord>>>,
        previews: Mutex<Vec<(String, LinkPreviewState)>>,
    }

    impl MessagesObserver for RecordingObserver {
        fn on_messages_changed(&self, messages: Vec<MessageRecord>) {
            self.lists.lock().push(messages);
        }
    }

    impl PreviewObserver for RecordingObserver {
        fn on_preview_changed(&self, url: String, state: LinkPreviewState) {
            self.previews.lock().push((url, state));
        }
    }

    #[test]
    fn test_add_text_and_records() {
        let core = core();
        let record = core.add_text("  look https://example.com/a  ".to_string()).unwrap();
        assert_eq!(record.text, "look https://example.com/a");
        assert_eq!(record.first_link.as_deref(), Some("https://example.com/a"));
        assert_eq!(core.messages(), vec![record]);

        assert!(core.add_text("   ".to_string()).is_none());
        assert_eq!(core.messages().len(), 1);
    }

    #[test]
    fn test_ingestion_paths() {
        let core = core();
        assert!(core
            .add_shared_payload(r#"{"text": "shared"}"#.to_string())
            .is_some());
        assert!(core.add_shared_payload(r#"{"text": 7}"#.to_string()).is_none());
        assert!(core
            .add_from_deep_link("scrapper://share?text=linked".to_string())
            .is_some());
        assert!(core
            .add_from_deep_link("elsewhere://share?text=linked".to_string())
            .is_none());

        let texts: Vec<String> = core.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.contains(&"shared".to_string()));
        assert!(texts.contains(&"linked".to_string()));
    }

    #[test]
    fn test_update_reply_delete() {
        let core = core();
        let root = core.add_text("root".to_string()).unwrap();
        let reply = core.reply("child".to_string(), root.id.clone()).unwrap();
        assert_eq!(reply.parent.as_deref(), Some(root.id.as_str()));

        assert!(core.update_text(root.id.clone(), "root edited".to_string()));
        assert!(!core.update_text("missing".to_string(), "x".to_string()));
        assert!(core.set_parent(reply.id.clone(), None));
        assert_eq!(core.store().get(&reply.id).unwrap().parent, None);

        assert!(core.delete_message(root.id.clone()));
        assert!(!core.delete_message(root.id));
        assert_eq!(core.messages().len(), 1);
    }

    #[test]
    fn test_messages_observer() {
        let core = core();
        let observer = Arc::new(RecordingObserver::default());
        let id = core.subscribe_messages(observer.clone());

        let record = core.add_text("observed".to_string()).unwrap();
        core.delete_message(record.id.clone());
        assert!(core.unsubscribe_messages(id));
        core.add_text("unobserved".to_string());

        let lists = observer.lists.lock();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0], vec![record]);
        assert!(lists[1].is_empty());
    }

    #[test]
    fn test_date_dividers_align_with_messages() {
        let core = core();
        core.add_text("one".to_string());
        core.add_text("two".to_string());

        let dividers = core.date_dividers();
        assert_eq!(dividers.len(), 2);
        // Both were created just now: only the oldest carries the divider
        assert!(dividers[1].is_some());
    }

    #[tokio::test]
    async fn test_preview_through_core() {
        let core = core();
        let observer = Arc::new(RecordingObserver::default());
        core.subscribe_previews(observer.clone());

        let url = "https://example.com/post".to_string();
        assert_eq!(core.request_preview(url.clone()), LinkPreviewState::Pending);

        core.previews().resolve(&url).await;
        match core.request_preview(url.clone()) {
            LinkPreviewState::Ready { preview } => {
                assert_eq!(preview.title.as_deref(), Some("Page at /post"));
                assert_eq!(preview.site_name.as_deref(), Some("example.com"));
            }
            other => panic!("Expected Ready, got {:?}", other),
        }

        let previews = observer.previews.lock();
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0], (url.clone(), LinkPreviewState::Pending));
        assert!(matches!(previews[1].1, LinkPreviewState::Ready { .. }));
    }

    #[test]
    fn test_with_config_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrap.sqlite").to_string_lossy().to_string();
        assert!(matches!(
            ScrapCore::with_config(path, "{oops".to_string()),
            Err(ScrapError::ConfigError(_))
        ));
    }

    #[test]
    fn test_new_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrap.sqlite").to_string_lossy().to_string();

        let first = ScrapCore::new(path.clone()).unwrap();
        let record = first.add_text("kept".to_string()).unwrap();
        drop(first);

        let second = ScrapCore::new(path).unwrap();
        assert_eq!(second.messages(), vec![record]);
    }
}
