//! # embed_digest
//!
//! Turns the articles of a Google Reader compatible aggregator (FreshRSS and
//! friends) into browsable music pages. Every Bandcamp, YouTube or
//! SoundCloud link found in an article becomes a lazily loaded player in a
//! paginated, dark-themed viewer, one viewer per feed or category, with an
//! index page across all of them.
//!
//! ## Usage
//!
//! ```sh
//! embed_digest generate --server https://rss.example.com --username me --feeds feed/12 --categories Music
//! embed_digest index --dir freshrss_embeds
//! embed_digest serve --dir freshrss_embeds
//! ```
//!
//! ## Architecture
//!
//! `generate` runs a sequential pipeline:
//! 1. **Configuration**: flags, environment and YAML file are merged and
//!    validated, credentials are prompted for if needed
//! 2. **Fetching**: log in, then pull each selected stream
//! 3. **Extraction**: one embed per article, first service in priority order
//! 4. **Resolution**: Bandcamp pages are fetched for their player ids
//! 5. **Output**: pages are written as `<stem>.html` + `<stem>_data.json`
//!
//! `index`, `sync` and `serve` work on an existing output directory.

use clap::Parser;
use itertools::Itertools;
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod serve;
mod services;
mod sync;
mod utils;

use api::{GReaderClient, Session, StreamTarget};
use cli::{Cli, Command, GenerateArgs, IndexArgs, ServeArgs, SyncArgs};
use config::{DEFAULT_MAX_PAGE_BUTTONS, FileConfig, GenerateSettings, Mode, Prompt, TerminalPrompt};
use models::Service;
use outputs::{index, pages};
use services::bandcamp::{BandcampResolver, PageSource};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate(args) => run_generate(args).await,
        Command::Index(args) => run_index(args).await,
        Command::Sync(args) => run_sync(args).await,
        Command::Serve(args) => run_serve(args).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "embed_digest failed");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    result.map_err(Into::into)
}

async fn run_generate(args: GenerateArgs) -> error::Result<()> {
    generate_command(args, &mut TerminalPrompt).await
}

/// `generate` after argument parsing: config, login, then listing or output.
async fn generate_command<P: Prompt>(args: GenerateArgs, prompt: &mut P) -> error::Result<()> {
    let file = match &args.config {
        Some(path) => {
            let file = FileConfig::load(path)?;
            info!(path = %path.display(), "Loaded config file");
            file
        }
        None => FileConfig::default(),
    };

    // Everything that can be checked locally is checked before logging in.
    let mode = config::resolve_mode(&args, &file)?;
    let connection = config::resolve_connection(&args, &file, prompt)?;
    debug!(?connection, "Resolved connection");

    let client = GReaderClient::new(&connection)?;
    let session = client.authenticate().await?;

    match mode {
        Mode::ListFeeds => {
            let feeds = client.list_feeds(&session).await?;
            println!("{} feeds:", feeds.len());
            for feed in feeds {
                let categories = if feed.categories.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", feed.categories.join(", "))
                };
                println!("  {}  {}{categories}", feed.id, feed.title);
            }
        }
        Mode::ListCategories => {
            let categories = client.list_categories(&session).await?;
            println!("{} categories:", categories.len());
            for category in categories {
                println!("  {}  ({})", category.label, category.id);
            }
        }
        Mode::Generate(settings) => {
            ensure_writable_dir(&settings.output_dir).await?;
            let resolver = if settings.resolve_bandcamp {
                Some(BandcampResolver::http()?)
            } else {
                None
            };
            let generated = generate(&client, &session, &settings, resolver.as_ref()).await?;

            if generated.is_empty() {
                println!("No embeddable links found in the selected feeds or categories.");
            } else {
                println!("Wrote {} viewer(s) to {}:", generated.len(), settings.output_dir.display());
                for artifact in &generated {
                    println!(
                        "  {}  {} embeds on {} page(s), {} article(s) without links  ({})",
                        artifact.name,
                        artifact.embeds,
                        artifact.pages,
                        artifact.misses,
                        artifact.html.display()
                    );
                }
                println!(
                    "Run `embed_digest index --dir {}` to refresh index.html.",
                    settings.output_dir.display()
                );
            }
        }
    }
    Ok(())
}

const READING_LIST_NAME: &str = "Reading list";

/// One artifact requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    name: String,
    target: StreamTarget,
}

/// Feeds are named by their subscription title, categories by their label.
async fn selections(
    client: &GReaderClient,
    session: &Session,
    settings: &GenerateSettings,
) -> error::Result<Vec<Selection>> {
    let mut selected = Vec::new();

    if !settings.feeds.is_empty() {
        let feeds = client.list_feeds(session).await?;
        for id in &settings.feeds {
            let name = match feeds.iter().find(|f| &f.id == id) {
                Some(feed) if !feed.title.trim().is_empty() => feed.title.clone(),
                Some(_) => id.clone(),
                None => {
                    warn!(feed = %id, "Feed is not among the subscriptions, using its id as name");
                    id.clone()
                }
            };
            selected.push(Selection {
                name,
                target: StreamTarget::Feed(id.clone()),
            });
        }
    }

    for category in &settings.categories {
        let label = category.strip_prefix(api::LABEL_PREFIX).unwrap_or(category);
        selected.push(Selection {
            name: label.to_string(),
            target: StreamTarget::Category(label.to_string()),
        });
    }

    if settings.reading_list {
        selected.push(Selection {
            name: READING_LIST_NAME.to_string(),
            target: StreamTarget::ReadingList,
        });
    }
    Ok(selected)
}

/// Stems claimed by more than one selection, with the names that claim them.
fn shared_stems(selected: &[Selection]) -> Vec<(String, Vec<String>)> {
    selected
        .iter()
        .into_group_map_by(|s| utils::artifact_stem(&s.name))
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(stem, group)| (stem, group.into_iter().map(|s| s.name.clone()).collect()))
        .sorted()
        .collect()
}

/// What `generate` wrote for one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GeneratedArtifact {
    name: String,
    embeds: usize,
    pages: usize,
    /// Articles without a recognizable link.
    misses: usize,
    html: PathBuf,
}

#[instrument(level = "info", skip_all, fields(output_dir = %settings.output_dir.display()))]
async fn generate<S: PageSource>(
    client: &GReaderClient,
    session: &Session,
    settings: &GenerateSettings,
    resolver: Option<&BandcampResolver<S>>,
) -> error::Result<Vec<GeneratedArtifact>> {
    let mut generated = Vec::new();
    let selected = selections(client, session, settings).await?;
    for (stem, names) in shared_stems(&selected) {
        warn!(%stem, ?names, "Selections share one file name, the later one overwrites the earlier");
    }

    for selection in selected {
        info!(name = %selection.name, stream = %selection.target.stream_id(), "Processing");
        let articles = client
            .fetch_articles(
                session,
                std::slice::from_ref(&selection.target),
                settings.unread_only,
                settings.max_articles,
            )
            .await?;

        debug!(
            articles = articles.len(),
            unread = articles.iter().filter(|a| a.unread).count(),
            "Fetched stream"
        );

        let mut extraction = services::extract_all(&articles);
        if let Some(resolver) = resolver {
            resolver.resolve_records(&mut extraction.records).await;
        }
        // Resolved ids can collapse different page URLs onto one player.
        let (records, resolved_duplicates) = services::dedupe(extraction.records);
        let duplicates = extraction.duplicates + resolved_duplicates;

        if records.is_empty() {
            warn!(
                name = %selection.name,
                articles = articles.len(),
                misses = extraction.misses,
                "No embeds found, nothing written"
            );
            continue;
        }

        let counts = services::count_by_service(&records);
        let embeds = records.len();
        let pages = pages::paginate(records, settings.items_per_page)?;
        let paths = pages::write_artifact(
            &settings.output_dir,
            &selection.name,
            &pages,
            settings.max_page_buttons,
        )
        .await?;

        info!(
            name = %selection.name,
            data = %paths.data.display(),
            embeds,
            pages = pages.len(),
            misses = extraction.misses,
            duplicates,
            bandcamp = counts[0].1,
            youtube = counts[1].1,
            soundcloud = counts[2].1,
            "Artifact written"
        );
        generated.push(GeneratedArtifact {
            name: selection.name,
            embeds,
            pages: pages.len(),
            misses: extraction.misses,
            html: paths.html,
        });
    }
    Ok(generated)
}

async fn run_index(args: IndexArgs) -> error::Result<()> {
    let totals = index::build_index(&args.input_dir, &args.title, &args.description).await?;
    println!(
        "Indexed {} feed(s), {} embeds into {}",
        totals.feeds,
        totals.total,
        args.input_dir.join(index::INDEX_FILE).display()
    );
    for service in Service::PRIORITY {
        println!("  {} {}: {}", service.icon(), service.label(), totals.counts.get(service));
    }
    Ok(())
}

async fn run_sync(args: SyncArgs) -> error::Result<()> {
    let listened = sync::load_listened(&args.listened_file).await?;
    info!(viewers = listened.len(), "Loaded listened ids");

    let opts = sync::SyncOptions {
        feed_dir: &args.feed_dir,
        output_dir: args.output_dir.as_deref(),
        stats_only: args.stats_only,
        max_page_buttons: DEFAULT_MAX_PAGE_BUTTONS,
    };
    let results = sync::sync_directory(&listened, &opts).await?;

    let (mut original, mut removed) = (0, 0);
    for result in &results {
        let s = result.stats;
        original += s.original;
        removed += s.removed;
        println!(
            "  {}: {} -> {} ({} removed, {} -> {} pages){}",
            result.stem,
            s.original,
            s.kept,
            s.removed,
            s.pages_before,
            s.pages_after,
            if result.written { "" } else { "  unchanged" }
        );
    }
    println!(
        "{} viewer(s): {original} embeds, {removed} removed, {} kept{}",
        results.len(),
        original - removed,
        if args.stats_only { " (stats only, nothing written)" } else { "" }
    );
    Ok(())
}

async fn run_serve(args: ServeArgs) -> error::Result<()> {
    serve::serve(&args.dir, &args.bind, args.port).await
}
