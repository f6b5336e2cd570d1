//! Command-line interface definitions.
//!
//! One binary, four subcommands: `generate` talks to the aggregator and
//! writes viewer pages, `index` summarizes a directory of viewer pages,
//! `sync` drops embeds already marked as listened, and `serve` previews the
//! output over HTTP. Connection options can also come from environment
//! variables or a YAML config file (see [`crate::config`]).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_MAX_PAGE_BUTTONS, DEFAULT_OUTPUT_DIR};

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # See what is available
/// embed_digest generate --server https://rss.example.com --username me --list-feeds
///
/// # One viewer per feed and one for the "Music" category, unread only
/// embed_digest generate --interactive --feeds feed/12 feed/31 --categories Music --unread-only
///
/// # Build index.html for the output directory
/// embed_digest index --dir freshrss_embeds --title "My music"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch articles and write one viewer per feed or category
    Generate(GenerateArgs),
    /// Build index.html over a directory of generated viewers
    Index(IndexArgs),
    /// Remove embeds marked as listened in the browser
    Sync(SyncArgs),
    /// Serve a directory of generated viewers over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Prompt for server, username and password
    #[arg(long)]
    pub interactive: bool,

    /// Aggregator base URL (e.g. https://rss.example.com)
    #[arg(long, env = "FRESHRSS_SERVER")]
    pub server: Option<String>,

    #[arg(long, env = "FRESHRSS_USERNAME")]
    pub username: Option<String>,

    /// API password; prompted for when omitted
    #[arg(long, env = "FRESHRSS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Optional YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List subscribed feeds and exit
    #[arg(long)]
    pub list_feeds: bool,

    /// List categories and exit
    #[arg(long)]
    pub list_categories: bool,

    /// Feed ids to process (e.g. feed/123)
    #[arg(long, num_args = 1..)]
    pub feeds: Vec<String>,

    /// Category names to process
    #[arg(long, num_args = 1..)]
    pub categories: Vec<String>,

    /// Also build one viewer over every subscription ("Reading list")
    #[arg(long)]
    pub reading_list: bool,

    /// Only consider unread articles
    #[arg(long)]
    pub unread_only: bool,

    /// Articles to fetch per feed or category, 0 for no limit [default: 100]
    #[arg(long)]
    pub max_articles: Option<usize>,

    /// Output directory [default: freshrss_embeds]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Embeds per page [default: 8]
    #[arg(long)]
    pub items_per_page: Option<usize>,

    /// Numbered page buttons shown at once
    #[arg(long, default_value_t = DEFAULT_MAX_PAGE_BUTTONS)]
    pub max_page_buttons: usize,

    /// Keep Bandcamp links as plain links instead of resolving their players
    #[arg(long)]
    pub no_resolve_bandcamp: bool,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory holding the generated viewers
    #[arg(short, long, visible_alias = "dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub input_dir: PathBuf,

    #[arg(long, default_value = "Music Embeds")]
    pub title: String,

    #[arg(long, default_value = "Music collected from your RSS feeds")]
    pub description: String,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// localStorage export from the browser (JSON object)
    #[arg(short, long)]
    pub listened_file: PathBuf,

    /// Directory holding the generated viewers
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub feed_dir: PathBuf,

    /// Write results here instead of overwriting in place
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Report what would be removed without writing anything
    #[arg(long)]
    pub stats_only: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub dir: PathBuf,

    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_parsing() {
        let cli = Cli::parse_from([
            "embed_digest",
            "generate",
            "--server",
            "https://rss.example.com",
            "--username",
            "me",
            "--feeds",
            "feed/1",
            "feed/2",
            "--categories",
            "Music",
            "--unread-only",
            "--reading-list",
            "--items-per-page",
            "4",
        ]);

        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.server.as_deref(), Some("https://rss.example.com"));
        assert_eq!(args.feeds, vec!["feed/1", "feed/2"]);
        assert_eq!(args.categories, vec!["Music"]);
        assert!(args.unread_only);
        assert!(args.reading_list);
        assert_eq!(args.items_per_page, Some(4));
        assert_eq!(args.max_page_buttons, 15);
        assert_eq!(args.max_articles, None);
    }

    #[test]
    fn test_index_dir_alias() {
        let cli = Cli::parse_from(["embed_digest", "index", "--dir", "/tmp/out", "--title", "Mine"]);
        let Command::Index(args) = cli.command else {
            panic!("expected index");
        };
        assert_eq!(args.input_dir, PathBuf::from("/tmp/out"));
        assert_eq!(args.title, "Mine");
    }

    #[test]
    fn test_index_defaults() {
        let cli = Cli::parse_from(["embed_digest", "index"]);
        let Command::Index(args) = cli.command else {
            panic!("expected index");
        };
        assert_eq!(args.input_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_sync_requires_listened_file() {
        assert!(Cli::try_parse_from(["embed_digest", "sync"]).is_err());
        let cli = Cli::try_parse_from(["embed_digest", "sync", "-l", "browser.json", "--stats-only"]).unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.stats_only);
        assert_eq!(args.feed_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::parse_from(["embed_digest", "serve"]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 8000);
        assert_eq!(args.bind, "127.0.0.1");
    }
}
