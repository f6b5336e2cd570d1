//! Run configuration for `generate`.
//!
//! Values are layered, highest priority first: command-line flags,
//! environment variables (handled by clap), the optional YAML file given
//! with `--config`, then built-in defaults. Everything here is validated
//! before the first network request.
//!
//! Credential gathering goes through the [`Prompt`] trait so the terminal
//! interaction stays out of the API client.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use secrecy::SecretString;
use serde::Deserialize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::cli::GenerateArgs;
use crate::error::{Error, Result};

pub const DEFAULT_OUTPUT_DIR: &str = "freshrss_embeds";
pub const DEFAULT_ITEMS_PER_PAGE: usize = 8;
pub const DEFAULT_MAX_ARTICLES: usize = 100;
pub const DEFAULT_MAX_PAGE_BUTTONS: usize = 15;

/// Connection details for a Google Reader compatible server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL without trailing slash.
    pub server_url: String,
    pub username: String,
    pub password: SecretString,
}

impl ConnectionConfig {
    pub fn new(server_url: &str, username: &str, password: &str) -> Result<Self> {
        let server_url = server_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&server_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "server URL must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if username.trim().is_empty() {
            return Err(Error::Config("username must not be empty".to_string()));
        }
        Ok(Self {
            server_url,
            username: username.trim().to_string(),
            password: SecretString::from(password.to_string()),
        })
    }

    /// Root of the Google Reader API on a FreshRSS-style server.
    pub fn api_url(&self) -> String {
        format!("{}/api/greader.php", self.server_url)
    }
}

/// Contents of the optional YAML config file.
///
/// ```yaml
/// server: https://rss.example.com
/// username: me
/// output_dir: docs
/// items_per_page: 12
/// unread_only: true
/// ```
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub items_per_page: Option<usize>,
    pub max_articles: Option<usize>,
    pub unread_only: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        if raw.trim().is_empty() {
            debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// What `generate` was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    ListFeeds,
    ListCategories,
    Generate(GenerateSettings),
}

/// Validated settings for an output run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSettings {
    pub feeds: Vec<String>,
    pub categories: Vec<String>,
    /// One extra viewer over every subscription.
    pub reading_list: bool,
    pub unread_only: bool,
    /// 0 means no limit.
    pub max_articles: usize,
    pub output_dir: PathBuf,
    pub items_per_page: usize,
    pub max_page_buttons: usize,
    pub resolve_bandcamp: bool,
}

/// Merge flags with the config file and validate the combination.
pub fn resolve_mode(args: &GenerateArgs, file: &FileConfig) -> Result<Mode> {
    if args.list_feeds {
        return Ok(Mode::ListFeeds);
    }
    if args.list_categories {
        return Ok(Mode::ListCategories);
    }

    if args.feeds.is_empty() && args.categories.is_empty() && !args.reading_list {
        return Err(Error::Config(
            "no feeds or categories given; use --feeds, --categories or --reading-list \
             (or --list-feeds / --list-categories to see what is available)"
                .to_string(),
        ));
    }

    let items_per_page = args
        .items_per_page
        .or(file.items_per_page)
        .unwrap_or(DEFAULT_ITEMS_PER_PAGE);
    if items_per_page < 1 {
        return Err(Error::Config("items per page must be at least 1".to_string()));
    }
    if args.max_page_buttons < 1 {
        return Err(Error::Config("max page buttons must be at least 1".to_string()));
    }

    Ok(Mode::Generate(GenerateSettings {
        feeds: args.feeds.clone(),
        categories: args.categories.clone(),
        reading_list: args.reading_list,
        unread_only: args.unread_only || file.unread_only.unwrap_or(false),
        max_articles: args
            .max_articles
            .or(file.max_articles)
            .unwrap_or(DEFAULT_MAX_ARTICLES),
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        items_per_page,
        max_page_buttons: args.max_page_buttons,
        resolve_bandcamp: !args.no_resolve_bandcamp,
    }))
}

/// Source of answers for interactive credential prompts.
pub trait Prompt {
    fn ask(&mut self, label: &str) -> Result<String>;
    fn ask_secret(&mut self, label: &str) -> Result<String>;
}

/// Reads answers from the terminal.
///
/// Secrets are typed with echo off. When stdin is not a terminal (piped
/// input) they are read as a plain line.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn print_label(label: &str) -> Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{label}: ").map_err(|e| Error::io("<stdout>", e))?;
        stdout.flush().map_err(|e| Error::io("<stdout>", e))
    }

    fn read_line(label: &str) -> Result<String> {
        Self::print_label(label)?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::io("<stdin>", e))?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_hidden(label: &str) -> Result<String> {
        Self::print_label(label)?;
        terminal::enable_raw_mode().map_err(|e| Error::io("<terminal>", e))?;
        let typed = Self::collect_hidden();
        let _ = terminal::disable_raw_mode();
        println!();
        typed
    }

    fn collect_hidden() -> Result<String> {
        let mut secret = String::new();
        loop {
            let Event::Key(key) = event::read().map_err(|e| Error::io("<terminal>", e))? else {
                continue;
            };
            match edit_secret(&mut secret, key) {
                SecretInput::Typing => {}
                SecretInput::Done => return Ok(secret),
                SecretInput::Cancelled => {
                    return Err(Error::Config("password prompt cancelled".to_string()));
                }
            }
        }
    }
}

impl Prompt for TerminalPrompt {
    fn ask(&mut self, label: &str) -> Result<String> {
        Self::read_line(label).map(|s| s.trim().to_string())
    }

    fn ask_secret(&mut self, label: &str) -> Result<String> {
        if io::stdin().is_terminal() {
            Self::read_hidden(label)
        } else {
            Self::read_line(label)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecretInput {
    Typing,
    Done,
    Cancelled,
}

/// Apply one key press to a secret being typed.
fn edit_secret(secret: &mut String, key: KeyEvent) -> SecretInput {
    if key.kind != KeyEventKind::Press {
        return SecretInput::Typing;
    }
    match key.code {
        KeyCode::Enter => SecretInput::Done,
        KeyCode::Esc => SecretInput::Cancelled,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => SecretInput::Cancelled,
        KeyCode::Backspace => {
            secret.pop();
            SecretInput::Typing
        }
        KeyCode::Char(c) => {
            secret.push(c);
            SecretInput::Typing
        }
        _ => SecretInput::Typing,
    }
}

/// Build the connection config from flags, file and, when needed, prompts.
///
/// `--interactive` asks for everything. Otherwise server and username must
/// come from flags, environment or file, and only a missing password is
/// prompted for.
pub fn resolve_connection<P: Prompt>(
    args: &GenerateArgs,
    file: &FileConfig,
    prompt: &mut P,
) -> Result<ConnectionConfig> {
    if args.interactive {
        let server = prompt.ask("Server URL (e.g. https://rss.example.com)")?;
        let username = prompt.ask("Username")?;
        let password = prompt.ask_secret("Password")?;
        return ConnectionConfig::new(&server, &username, &password);
    }

    let server = args.server.clone().or_else(|| file.server.clone());
    let username = args.username.clone().or_else(|| file.username.clone());
    let (Some(server), Some(username)) = (server, username) else {
        return Err(Error::Config(
            "use --interactive or provide --server and --username".to_string(),
        ));
    };

    let password = match args.password.clone().or_else(|| file.password.clone()) {
        Some(p) => p,
        None => prompt.ask_secret(&format!("Password for {username}"))?,
    };
    ConnectionConfig::new(&server, &username, &password)
}
