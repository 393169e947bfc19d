//! Command-line front end for a Scrap message database
//!
//! Run with: cargo run --bin scrap -- --db scrap.sqlite list
//! Logging follows RUST_LOG (default: warn).

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use scrap::config::ScrapConfig;
use scrap::content_detection;
use scrap::database::Database;
use scrap::link_metadata::ReqwestClient;
use scrap::timeline;
use scrap::{LinkPreview, ScrapCore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "scrap.sqlite")]
    db: PathBuf,

    /// Optional JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a message
    Add {
        text: String,
        /// Id of the message this one replies to
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// List messages, grouped by day
    List,
    /// Replace a message's text
    Edit { id: String, text: String },
    /// Delete a message
    Delete { id: String },
    /// Add the text of a share-intent JSON payload
    Share { payload: String },
    /// Add the text carried by a share deep link
    Open { link: String },
    /// Fetch link previews (defaults to the first link of every message)
    Preview { urls: Vec<String> },
}

fn load_config(path: Option<&PathBuf>) -> Result<ScrapConfig> {
    match path {
        Some(path) => ScrapConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ScrapConfig::default()),
    }
}

fn print_added(added: Option<scrap::MessageRecord>) {
    match added {
        Some(record) => println!("{}", record.id),
        None => eprintln!("Nothing to add"),
    }
}

fn list(core: &ScrapCore) {
    let messages = core.store().list();
    if messages.is_empty() {
        println!("No messages");
        return;
    }

    let today = Local::now().date_naive();
    for group in timeline::day_groups(&messages, &Local) {
        for message in &group.messages {
            let time = message.date.with_timezone(&Local).format("%H:%M");
            let reply = if message.parent.is_some() { "↳ " } else { "" };
            println!("{}  {}  {}{}", time, message.id, reply, message.text);
        }
        println!("── {} ──", timeline::date_label(group.day, today));
    }
}

/// First occurrence of each link, in order
fn unique_links(links: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

async fn preview(core: &ScrapCore, urls: Vec<String>) {
    let urls = if urls.is_empty() {
        unique_links(
            core.store()
                .list()
                .iter()
                .filter_map(|m| content_detection::first_link(&m.text)),
        )
    } else {
        unique_links(urls)
    };

    let results = join_all(urls.iter().map(|url| core.previews().resolve(url))).await;
    for (url, state) in urls.iter().zip(results) {
        match state {
            LinkPreview::Ready(data) => {
                println!("{}", url);
                for (label, value) in [
                    ("title", &data.title),
                    ("description", &data.description),
                    ("site", &data.site_name),
                    ("image", &data.image_url),
                ] {
                    if let Some(value) = value {
                        println!("  {}: {}", label, value);
                    }
                }
            }
            LinkPreview::Failed => println!("{}\n  (no preview)", url),
            LinkPreview::Pending => println!("{}\n  (pending)", url),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let db = Database::open(&args.db)
        .with_context(|| format!("Failed to open database at {}", args.db.display()))?;
    let client = ReqwestClient::new(&config.fetch).context("Failed to build HTTP client")?;
    let core = ScrapCore::with_parts(Arc::new(db), Arc::new(client), config);

    match args.command {
        Command::Add { text, reply_to } => print_added(match reply_to {
            Some(parent) => core.reply(text, parent),
            None => core.add_text(text),
        }),
        Command::List => list(&core),
        Command::Edit { id, text } => {
            if !core.update_text(id.clone(), text) {
                anyhow::bail!("No message {} (or the new text was blank)", id);
            }
        }
        Command::Delete { id } => {
            if !core.delete_message(id.clone()) {
                anyhow::bail!("No message {}", id);
            }
        }
        Command::Share { payload } => print_added(core.add_shared_payload(payload)),
        Command::Open { link } => print_added(core.add_from_deep_link(link)),
        Command::Preview { urls } => preview(&core, urls).await,
    }

    Ok(())
}
