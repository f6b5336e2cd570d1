//! Google Reader API client.
//!
//! Talks to the `greader.php` endpoint that FreshRSS (and several other
//! aggregators) expose. The client is read-only: it logs in once, then lists
//! subscriptions and labels and pulls stream contents.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`GReaderClient::authenticate`] | `POST accounts/ClientLogin` with `Email` / `Passwd` |
//! | [`GReaderClient::list_feeds`] | `GET reader/api/0/subscription/list?output=json` |
//! | [`GReaderClient::list_categories`] | `GET reader/api/0/tag/list?output=json` |
//! | [`GReaderClient::fetch_articles`] | `GET reader/api/0/stream/contents?output=json&s=..&n=..` |
//!
//! Every request after login carries `Authorization: GoogleLogin auth=<token>`.
//! Requests are awaited one after another and are not retried; a non-2xx
//! answer aborts the run.

use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::models::{Article, Category, Feed};

pub const LABEL_PREFIX: &str = "user/-/label/";
const READ_STATE: &str = "user/-/state/com.google/read";
const READING_LIST: &str = "user/-/state/com.google/reading-list";
/// Largest `n` the server is asked for in one page.
const MAX_BATCH: usize = 1000;

/// Token obtained from `ClientLogin`.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
}

impl Session {
    fn authorization(&self) -> String {
        format!("GoogleLogin auth={}", self.token.expose_secret())
    }
}

/// A stream to pull articles from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// Subscription stream id, e.g. `feed/12`.
    Feed(String),
    /// Category label, with or without the `user/-/label/` prefix.
    Category(String),
    /// Every subscription at once.
    ReadingList,
}

impl StreamTarget {
    pub fn stream_id(&self) -> String {
        match self {
            StreamTarget::Feed(id) => id.clone(),
            StreamTarget::Category(label) if label.starts_with(LABEL_PREFIX) => label.clone(),
            StreamTarget::Category(label) => format!("{LABEL_PREFIX}{label}"),
            StreamTarget::ReadingList => READING_LIST.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

#[derive(Deserialize)]
struct Subscription {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    categories: Vec<TagRef>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<TagRef>,
}

#[derive(Deserialize)]
struct TagRef {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Deserialize)]
struct StreamContents {
    #[serde(default)]
    items: Vec<Item>,
    continuation: Option<String>,
}

#[derive(Deserialize, Default)]
struct Body {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct Alternate {
    #[serde(default)]
    href: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Origin {
    #[serde(default)]
    stream_id: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct Item {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    published: i64,
    summary: Option<Body>,
    content: Option<Body>,
    #[serde(default)]
    alternate: Vec<Alternate>,
    author: Option<String>,
    #[serde(default)]
    origin: Origin,
    #[serde(default)]
    categories: Vec<String>,
}

impl From<Item> for Article {
    fn from(item: Item) -> Self {
        let unread = !item.categories.iter().any(|c| c == READ_STATE);
        let content = item
            .summary
            .filter(|b| !b.content.is_empty())
            .or(item.content)
            .unwrap_or_default()
            .content;
        Article {
            id: item.id,
            title: item.title,
            content,
            published: item.published,
            author: item.author,
            feed_title: item.origin.title,
            feed_id: item.origin.stream_id,
            link: item
                .alternate
                .into_iter()
                .next()
                .map(|a| a.href)
                .unwrap_or_default(),
            unread,
        }
    }
}

/// Read-only client for one server and one account.
#[derive(Debug, Clone)]
pub struct GReaderClient {
    http: reqwest::Client,
    api_url: String,
    connection: ConnectionConfig,
}

impl GReaderClient {
    pub fn new(connection: &ConnectionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: connection.api_url(),
            connection: connection.clone(),
        })
    }

    /// Exchange username and password for a session token.
    #[instrument(level = "info", skip_all, fields(server = %self.connection.server_url))]
    pub async fn authenticate(&self) -> Result<Session> {
        let url = format!("{}/accounts/ClientLogin", self.api_url);
        let form = [
            ("Email", self.connection.username.as_str()),
            ("Passwd", self.connection.password.expose_secret()),
        ];

        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("could not reach {}: {e}", self.connection.server_url)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "server answered HTTP {} (check username and API password)",
                status.as_u16()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Auth(format!("could not read login response: {e}")))?;
        let token = body
            .lines()
            .find_map(|line| line.trim().strip_prefix("Auth="))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("no Auth= token in login response".to_string()))?;

        info!(user = %self.connection.username, "Authenticated");
        Ok(Session {
            token: SecretString::from(token.to_string()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/reader/api/0/{endpoint}", self.api_url);
        let t0 = Instant::now();
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, session.authorization())
            .query(&[("output", "json")])
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "API request failed");
            return Err(Error::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let parsed = resp.json::<T>().await?;
        debug!(endpoint, elapsed_ms = t0.elapsed().as_millis() as u64, "API request done");
        Ok(parsed)
    }

    /// All subscriptions of the account.
    #[instrument(level = "info", skip_all)]
    pub async fn list_feeds(&self, session: &Session) -> Result<Vec<Feed>> {
        let list: SubscriptionList = self
            .get_json(session, "subscription/list", &[])
            .await?;
        let feeds: Vec<Feed> = list
            .subscriptions
            .into_iter()
            .map(|s| Feed {
                id: s.id,
                title: s.title,
                categories: s
                    .categories
                    .into_iter()
                    .map(|c| {
                        if c.label.is_empty() {
                            c.id.strip_prefix(LABEL_PREFIX).unwrap_or(&c.id).to_string()
                        } else {
                            c.label
                        }
                    })
                    .collect(),
            })
            .collect();
        info!(count = feeds.len(), "Listed feeds");
        Ok(feeds)
    }

    /// User labels; system states and other tags are left out.
    #[instrument(level = "info", skip_all)]
    pub async fn list_categories(&self, session: &Session) -> Result<Vec<Category>> {
        let list: TagList = self.get_json(session, "tag/list", &[]).await?;
        let categories: Vec<Category> = list
            .tags
            .into_iter()
            .filter_map(|tag| {
                let label = tag.id.strip_prefix(LABEL_PREFIX)?.to_string();
                Some(Category { id: tag.id, label })
            })
            .collect();
        info!(count = categories.len(), "Listed categories");
        Ok(categories)
    }

    /// Articles from each target, concatenated in target order.
    ///
    /// `max_articles` applies per target; 0 means no limit.
    pub async fn fetch_articles(
        &self,
        session: &Session,
        targets: &[StreamTarget],
        unread_only: bool,
        max_articles: usize,
    ) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        for target in targets {
            let batch = self
                .fetch_stream(session, target, unread_only, max_articles)
                .await?;
            articles.extend(batch);
        }
        Ok(articles)
    }

    /// One stream, following `continuation` until the cap or the end.
    #[instrument(level = "info", skip_all, fields(stream = %target.stream_id(), unread_only, max_articles))]
    pub async fn fetch_stream(
        &self,
        session: &Session,
        target: &StreamTarget,
        unread_only: bool,
        max_articles: usize,
    ) -> Result<Vec<Article>> {
        let stream_id = target.stream_id();
        let mut articles: Vec<Article> = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let batch = if max_articles == 0 {
                MAX_BATCH
            } else {
                (max_articles - articles.len()).min(MAX_BATCH)
            };

            let mut query = vec![("s", stream_id.clone()), ("n", batch.to_string())];
            if unread_only {
                query.push(("xt", READ_STATE.to_string()));
            }
            if let Some(c) = &continuation {
                query.push(("c", c.clone()));
            }

            let page: StreamContents = self
                .get_json(session, "stream/contents", &query)
                .await?;
            let received = page.items.len();
            articles.extend(page.items.into_iter().map(Article::from));
            debug!(received, total = articles.len(), "Fetched stream page");

            if max_articles != 0 && articles.len() >= max_articles {
                articles.truncate(max_articles);
                break;
            }
            match page.continuation {
                Some(next) if received > 0 && continuation.as_deref() != Some(next.as_str()) => {
                    continuation = Some(next);
                }
                _ => break,
            }
        }

        info!(count = articles.len(), "Fetched articles");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API: &str = "/api/greader.php";

    async fn client_for(server: &MockServer) -> GReaderClient {
        let connection = ConnectionConfig::new(&server.uri(), "me", "secret").unwrap();
        GReaderClient::new(&connection).unwrap()
    }

    async fn logged_in(server: &MockServer) -> (GReaderClient, Session) {
        Mock::given(method("POST"))
            .and(path(format!("{API}/accounts/ClientLogin")))
            .respond_with(ResponseTemplate::new(200).set_body_string("SID=x\nLSID=y\nAuth=tok123\n"))
            .mount(server)
            .await;
        let client = client_for(server).await;
        let session = client.authenticate().await.unwrap();
        (client, session)
    }

    fn item(n: usize, read: bool) -> serde_json::Value {
        let mut categories = vec!["user/-/state/com.google/reading-list"];
        if read {
            categories.push(READ_STATE);
        }
        json!({
            "id": format!("tag:google.com,2005:reader/item/{n}"),
            "title": format!("Post {n}"),
            "published": 1_709_294_400 + n as i64,
            "summary": {"content": format!("<p>body {n}</p>")},
            "alternate": [{"href": format!("https://blog.example/{n}")}],
            "author": "Writer",
            "origin": {"streamId": "feed/1", "title": "Indie Blog"},
            "categories": categories,
        })
    }

    #[test]
    fn test_stream_ids() {
        assert_eq!(StreamTarget::Feed("feed/7".into()).stream_id(), "feed/7");
        assert_eq!(
            StreamTarget::Category("Music".into()).stream_id(),
            "user/-/label/Music"
        );
        assert_eq!(
            StreamTarget::Category("user/-/label/Music".into()).stream_id(),
            "user/-/label/Music"
        );
        assert_eq!(StreamTarget::ReadingList.stream_id(), READING_LIST);
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session = Session {
            token: SecretString::from("tok123".to_string()),
        };
        assert!(!format!("{session:?}").contains("tok123"));
    }

    #[tokio::test]
    async fn test_authenticate_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/accounts/ClientLogin")))
            .and(body_string_contains("Email=me"))
            .and(body_string_contains("Passwd=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("SID=x\nAuth=tok123\n"))
            .expect(1)
            .mount(&server)
            .await;

        let session = client_for(&server).await.authenticate().await.unwrap();
        assert_eq!(session.authorization(), "GoogleLogin auth=tok123");
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Error=BadAuthentication"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_authenticate_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("SID=x\n"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_authenticate_unreachable() {
        let connection = ConnectionConfig::new("http://127.0.0.1:9", "me", "pw").unwrap();
        let err = GReaderClient::new(&connection)
            .unwrap()
            .authenticate()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_list_feeds() {
        let server = MockServer::start().await;
        let (client, session) = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/reader/api/0/subscription/list")))
            .and(query_param("output", "json"))
            .and(header("authorization", "GoogleLogin auth=tok123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscriptions": [
                    {"id": "feed/1", "title": "Indie Blog",
                     "categories": [{"id": "user/-/label/Music", "label": "Music"}]},
                    {"id": "feed/2", "title": "Tape Blog", "categories": []}
                ]
            })))
            .mount(&server)
            .await;

        let feeds = client.list_feeds(&session).await.unwrap();
        assert_eq!(
            feeds,
            vec![
                Feed {
                    id: "feed/1".into(),
                    title: "Indie Blog".into(),
                    categories: vec!["Music".into()],
                },
                Feed {
                    id: "feed/2".into(),
                    title: "Tape Blog".into(),
                    categories: vec![],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_categories_keeps_labels_only() {
        let server = MockServer::start().await;
        let (client, session) = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/reader/api/0/tag/list")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tags": [
                    {"id": "user/-/state/com.google/starred"},
                    {"id": "user/-/label/Music", "type": "folder"},
                    {"id": "user/-/label/Tapes", "type": "folder"}
                ]
            })))
            .mount(&server)
            .await;

        let labels: Vec<String> = client
            .list_categories(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["Music", "Tapes"]);
    }

    #[tokio::test]
    async fn test_non_2xx_is_status_error() {
        let server = MockServer::start().await;
        let (client, session) = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/reader/api/0/tag/list")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client.list_categories(&session).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_follows_continuation() {
        let server = MockServer::start().await;
        let (client, session) = logged_in(&server).await;
        let stream_path = format!("{API}/reader/api/0/stream/contents");

        Mock::given(method("GET"))
            .and(path(stream_path.clone()))
            .and(query_param("c", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(3, false)]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(stream_path))
            .and(query_param("s", "feed/1"))
            .and(query_param("n", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(1, false), item(2, true)],
                "continuation": "page2"
            })))
            .mount(&server)
            .await;

        let articles = client
            .fetch_articles(&session, &[StreamTarget::Feed("feed/1".into())], false, 0)
            .await
            .unwrap();

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Post 1", "Post 2", "Post 3"]);
        assert!(articles[0].unread);
        assert!(!articles[1].unread);
        assert_eq!(articles[0].link, "https://blog.example/1");
        assert_eq!(articles[0].feed_title, "Indie Blog");
        assert_eq!(articles[0].content, "<p>body 1</p>");
    }

    #[tokio::test]
    async fn test_fetch_caps_and_filters_unread() {
        let server = MockServer::start().await;
        let (client, session) = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/reader/api/0/stream/contents")))
            .and(query_param("s", "user/-/label/Music"))
            .and(query_param("n", "2"))
            .and(query_param("xt", READ_STATE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(1, false), item(2, false)],
                "continuation": "more"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let articles = client
            .fetch_articles(&session, &[StreamTarget::Category("Music".into())], true, 2)
            .await
            .unwrap();
        assert_eq!(articles.len(), 2);
    }

    #[test]
    fn test_item_falls_back_to_content_body() {
        let item: Item = serde_json::from_value(json!({
            "id": "x",
            "title": "t",
            "content": {"content": "<p>full</p>"},
            "origin": {"streamId": "feed/3", "title": "F"}
        }))
        .unwrap();
        let article = Article::from(item);
        assert_eq!(article.content, "<p>full</p>");
        assert_eq!(article.link, "");
        assert_eq!(article.author, None);
        assert!(article.unread);
    }
}
