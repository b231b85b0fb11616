use std::time::Duration;

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::domain::{Item, PaperId};
use crate::error::WatchError;

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

pub trait FeedClient: Send + Sync {
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<Item>, WatchError>;
}

#[derive(Clone)]
pub struct ArxivHttpClient {
    client: Client,
    base_url: String,
}

impl ArxivHttpClient {
    pub fn new() -> Result<Self, WatchError> {
        Self::with_base_url(ARXIV_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, WatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("arxiv-watch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| WatchError::FeedHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| WatchError::FeedHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, WatchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "arXiv request failed".to_string());
        Err(WatchError::FeedStatus { status, message })
    }
}

impl FeedClient for ArxivHttpClient {
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<Item>, WatchError> {
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .map_err(|err| WatchError::FeedHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| WatchError::FeedHttp(err.to_string()))?;

        let mut items = parse_atom_feed(&body, query)?;
        items.sort_by(|a, b| b.published.cmp(&a.published));
        debug!(query, count = items.len(), "feed returned items");
        Ok(items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_url: Option<String>,
    author_name: String,
    in_author: bool,
    malformed: Option<String>,
}

impl EntryBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Id => self.id.push_str(text),
            Field::Title => self.title.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::AuthorName => self.author_name.push_str(text),
        }
    }

    fn add_link(&mut self, element: &BytesStart<'_>) {
        let mut href = None;
        let mut title = None;
        let mut link_type = None;
        for attr in element.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|value| value.into_owned())
                .unwrap_or_default();
            match attr.key.as_ref() {
                b"href" => href = Some(value),
                b"title" => title = Some(value),
                b"type" => link_type = Some(value),
                _ => {}
            }
        }
        let is_pdf =
            title.as_deref() == Some("pdf") || link_type.as_deref() == Some("application/pdf");
        if is_pdf && self.pdf_url.is_none() {
            self.pdf_url = href;
        }
    }

    fn add_category(&mut self, element: &BytesStart<'_>) {
        for attr in element.attributes().flatten() {
            if attr.key.as_ref() == b"term" {
                let term = attr
                    .unescape_value()
                    .map(|value| value.into_owned())
                    .unwrap_or_default();
                if !term.is_empty() && !self.categories.contains(&term) {
                    self.categories.push(term);
                }
            }
        }
    }

    fn build(self, query: &str) -> Result<Item, String> {
        if let Some(reason) = self.malformed {
            return Err(format!("entry {} has undecodable text: {reason}", self.id.trim()));
        }
        if self.id.contains("/api/errors") {
            return Err(format!("feed reported an error: {}", self.summary.trim()));
        }
        let id = self
            .id
            .parse::<PaperId>()
            .map_err(|err| err.to_string())?;
        let title = clean_whitespace(&self.title);
        if title.is_empty() {
            return Err(format!("entry {id} has no title"));
        }
        let published = DateTime::parse_from_rfc3339(self.published.trim())
            .map_err(|err| format!("entry {id} has invalid published date: {err}"))?
            .with_timezone(&Utc);
        let asset_url = self
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{id}.pdf"));

        Ok(Item {
            id,
            title,
            authors: self.authors,
            summary: self.summary.trim().to_string(),
            published,
            categories: self.categories,
            asset_url,
            origin_query: query.to_string(),
        })
    }
}

/// Parses an Atom response. Entries that cannot be turned into an [`Item`] are logged and
/// skipped; only a document-level XML error fails the whole call.
pub fn parse_atom_feed(xml: &str, query: &str) -> Result<Vec<Item>, WatchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref element)) => {
                let name = element.local_name();
                if name.as_ref() == b"entry" {
                    entry = Some(EntryBuilder::default());
                } else if let Some(current) = entry.as_mut() {
                    match name.as_ref() {
                        b"id" => field = Some(Field::Id),
                        b"title" => field = Some(Field::Title),
                        b"summary" => field = Some(Field::Summary),
                        b"published" => field = Some(Field::Published),
                        b"author" => {
                            current.in_author = true;
                            current.author_name.clear();
                        }
                        b"name" if current.in_author => field = Some(Field::AuthorName),
                        b"link" => current.add_link(element),
                        b"category" | b"primary_category" => current.add_category(element),
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(ref element)) => {
                if let Some(current) = entry.as_mut() {
                    match element.local_name().as_ref() {
                        b"link" => current.add_link(element),
                        b"category" | b"primary_category" => current.add_category(element),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(current), Some(active)) = (entry.as_mut(), field) {
                    match text.unescape() {
                        Ok(text) => current.push_text(active, &text),
                        Err(err) => current.malformed = Some(err.to_string()),
                    }
                }
            }
            Ok(Event::CData(data)) => {
                if let (Some(current), Some(active)) = (entry.as_mut(), field) {
                    current.push_text(active, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(ref element)) => {
                field = None;
                match element.local_name().as_ref() {
                    b"author" => {
                        if let Some(current) = entry.as_mut() {
                            current.in_author = false;
                            let name = clean_whitespace(&current.author_name);
                            if !name.is_empty() {
                                current.authors.push(name);
                            }
                        }
                    }
                    b"entry" => {
                        if let Some(finished) = entry.take() {
                            match finished.build(query) {
                                Ok(item) => items.push(item),
                                Err(reason) => {
                                    warn!(query, reason = %reason, "skipping malformed feed entry")
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(WatchError::FeedParse(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn clean_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
