//! End-to-end behaviour of the store and preview cache as the app drives them:
//! adding, ordering, deleting, and previewing a link while its fetch is pending.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use scrap::config::FetchConfig;
use scrap::database::MemoryStorage;
use scrap::link_metadata::{FetchError, HttpClient, HttpResponse};
use scrap::{LinkPreview, LinkPreviewCache, Message, MessageStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use url::Url;

/// Holds every response until the test releases the gate
struct GatedClient {
    calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for GatedClient {
    async fn get(&self, _url: &Url, _accept: &str) -> Result<HttpResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await;
        Ok(HttpResponse {
            status: 200,
            body: r#"<meta property="og:title" content="Foo &amp; Co">"#.to_string(),
        })
    }
}

fn message(id: &str, text: &str, minutes_ago: i64) -> Message {
    Message {
        id: id.to_string(),
        text: text.to_string(),
        date: Utc::now() - Duration::minutes(minutes_ago),
        parent: None,
    }
}

fn texts(store: &MessageStore) -> Vec<String> {
    store.list().into_iter().map(|m| m.text).collect()
}

#[tokio::test]
async fn test_add_delete_and_preview_while_pending() {
    let store = MessageStore::new(Arc::new(MemoryStorage::new()), "messages-storage");
    assert!(store.add(message("m1", "check http://foo.com", 10)));
    assert!(store.add(message("m2", "hi", 1)));
    assert_eq!(texts(&store), vec!["hi", "check http://foo.com"]);

    assert!(store.delete("m2"));
    assert_eq!(texts(&store), vec!["check http://foo.com"]);

    let client = GatedClient::new();
    let cache = LinkPreviewCache::new(client.clone(), FetchConfig::default());
    let link = scrap::content_detection::first_link(&store.list()[0].text).unwrap();

    assert_eq!(cache.request(&link), LinkPreview::Pending);
    tokio::task::yield_now().await;
    assert_eq!(cache.request(&link), LinkPreview::Pending);
    assert_eq!(cache.in_flight(), 1);

    client.gate.add_permits(1);
    let first = cache.resolve(&link).await;
    let second = cache.resolve(&link).await;
    assert_eq!(first, second);
    assert_eq!(
        first.data().and_then(|d| d.title.as_deref()),
        Some("Foo & Co")
    );
    assert_eq!(client.calls(), 1);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_waiters_share_one_fetch() {
    let client = GatedClient::new();
    let cache = LinkPreviewCache::new(client.clone(), FetchConfig::default());

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve("https://example.com").await })
        })
        .collect();

    tokio::task::yield_now().await;
    client.gate.add_permits(8);

    let mut results = Vec::new();
    for waiter in waiters {
        results.push(waiter.await.unwrap());
    }
    assert!(results.iter().all(|r| r == &results[0]));
    assert!(matches!(results[0], LinkPreview::Ready(_)));
    assert_eq!(client.calls(), 1);
}

#[test]
fn test_listing_is_always_date_descending() {
    let store = MessageStore::new(Arc::new(MemoryStorage::new()), "messages-storage");
    for (i, minutes_ago) in [5, 50, 1, 30, 0, 12].into_iter().enumerate() {
        store.add(message(&format!("m{}", i), "x", minutes_ago));
    }
    store.update("m1", scrap::models::MessagePatch::date(Utc::now() + Duration::minutes(1)));

    let list = store.list();
    assert_eq!(list[0].id, "m1");
    assert!(list.windows(2).all(|w| w[0].date >= w[1].date));
}
