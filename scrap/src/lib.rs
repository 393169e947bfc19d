//! Scrap Core - Rust logic for the Scrap notes app
//!
//! A persisted, most-recent-first list of short text messages, plus a
//! coalescing link preview cache for the URLs those messages contain.
//!
//! Types are exported via UniFFI proc-macros (#[derive(uniffi::Record/Enum)]).

pub mod config;
pub mod content_detection;
pub mod database;
pub mod ingest;
pub mod interface;
pub mod link_metadata;
pub mod link_preview;
pub mod models;
pub mod store;
pub mod timeline;

pub use config::ScrapConfig;
pub use interface::*;
pub use link_preview::{LinkPreview, LinkPreviewCache};
pub use models::Message;
pub use store::MessageStore;

uniffi::setup_scaffolding!("scrap");
