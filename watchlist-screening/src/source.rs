//! Watchlist sources
//!
//! A source produces the plain text of the watchlist document. The refresh
//! coordinator does not care whether it came over HTTP, from disk, or from memory.

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

/// Hex digits of the content digest kept in version tags
const VERSION_DIGEST_LEN: usize = 12;

/// Plain text of a fetched watchlist document
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Identity of the source (URL or path)
    pub source_id: String,

    /// Document text with markup removed
    pub text: String,

    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,

    /// SHA-256 of `text`, lowercase hex
    pub content_digest: String,
}

impl SourceDocument {
    /// Wrap fetched text, computing its digest
    pub fn new(source_id: impl Into<String>, text: String, fetched_at: DateTime<Utc>) -> Self {
        let content_digest = format!("{:x}", Sha256::digest(text.as_bytes()));
        Self {
            source_id: source_id.into(),
            text,
            fetched_at,
            content_digest,
        }
    }

    /// Provenance tag stored in cache metadata: `source@fetch-time#digest-prefix`
    pub fn version_tag(&self) -> String {
        format!(
            "{}@{}#{}",
            self.source_id,
            self.fetched_at.to_rfc3339(),
            &self.content_digest[..VERSION_DIGEST_LEN]
        )
    }
}

/// Anything that can deliver the watchlist document
#[async_trait]
pub trait WatchlistSource: Send + Sync {
    /// Identity used in logs and version tags
    fn source_id(&self) -> &str;

    /// Fetch the current document
    async fn fetch(&self) -> Result<SourceDocument>;
}

/// Downloads the watchlist over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: Client,
}

impl HttpSource {
    /// Create source with the configured URL and timeouts
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.connect_timeout() + config.read_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }
}

#[async_trait]
impl WatchlistSource for HttpSource {
    fn source_id(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<SourceDocument> {
        info!(url = %self.url, "Fetching watchlist");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned HTTP {}", self.url, status)));
        }

        let body = response.text().await?;
        debug!(url = %self.url, bytes = body.len(), "Watchlist downloaded");

        Ok(SourceDocument::new(&self.url, html_to_text(&body), Utc::now()))
    }
}

/// Reads the watchlist from a local file on every fetch
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    id: String,
}

impl FileSource {
    /// Create source for a file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = format!("file://{}", path.display());
        Self { path, id }
    }
}

#[async_trait]
impl WatchlistSource for FileSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<SourceDocument> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", self.path.display(), e)))?;

        Ok(SourceDocument::new(&self.id, html_to_text(&body), Utc::now()))
    }
}

/// In-memory source; the text can be swapped between fetches
#[derive(Debug)]
pub struct StaticSource {
    id: String,
    text: RwLock<String>,
}

impl StaticSource {
    /// Create source returning `text`
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: RwLock::new(text.into()),
        }
    }

    /// Replace the text returned by later fetches
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.write() = text.into();
    }
}

#[async_trait]
impl WatchlistSource for StaticSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<SourceDocument> {
        let text = self.text.read().clone();
        Ok(SourceDocument::new(&self.id, text, Utc::now()))
    }
}

lazy_static! {
    static ref BLOCKS: Regex =
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
            .expect("block pattern is valid");

    static ref TAGS: Regex = Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid");

    static ref ENTITY: Regex =
        Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9A-Fa-f]{1,6})|([A-Za-z][A-Za-z0-9]{1,7}));")
            .expect("entity pattern is valid");
}

/// Named entities of the HTML markup and Latin-1 sets
#[rustfmt::skip]
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'), ("lt", '<'), ("gt", '>'), ("quot", '"'), ("apos", '\''),
    ("nbsp", '\u{a0}'), ("iexcl", '¡'), ("cent", '¢'), ("pound", '£'), ("curren", '¤'),
    ("yen", '¥'), ("brvbar", '¦'), ("sect", '§'), ("uml", '¨'), ("copy", '©'),
    ("ordf", 'ª'), ("laquo", '«'), ("not", '¬'), ("shy", '\u{ad}'), ("reg", '®'),
    ("macr", '¯'), ("deg", '°'), ("plusmn", '±'), ("sup2", '²'), ("sup3", '³'),
    ("acute", '´'), ("micro", 'µ'), ("para", '¶'), ("middot", '·'), ("cedil", '¸'),
    ("sup1", '¹'), ("ordm", 'º'), ("raquo", '»'), ("frac14", '¼'), ("frac12", '½'),
    ("frac34", '¾'), ("iquest", '¿'),
    ("Agrave", 'À'), ("Aacute", 'Á'), ("Acirc", 'Â'), ("Atilde", 'Ã'), ("Auml", 'Ä'),
    ("Aring", 'Å'), ("AElig", 'Æ'), ("Ccedil", 'Ç'), ("Egrave", 'È'), ("Eacute", 'É'),
    ("Ecirc", 'Ê'), ("Euml", 'Ë'), ("Igrave", 'Ì'), ("Iacute", 'Í'), ("Icirc", 'Î'),
    ("Iuml", 'Ï'), ("ETH", 'Ð'), ("Ntilde", 'Ñ'), ("Ograve", 'Ò'), ("Oacute", 'Ó'),
    ("Ocirc", 'Ô'), ("Otilde", 'Õ'), ("Ouml", 'Ö'), ("times", '×'), ("Oslash", 'Ø'),
    ("Ugrave", 'Ù'), ("Uacute", 'Ú'), ("Ucirc", 'Û'), ("Uuml", 'Ü'), ("Yacute", 'Ý'),
    ("THORN", 'Þ'), ("szlig", 'ß'),
    ("agrave", 'à'), ("aacute", 'á'), ("acirc", 'â'), ("atilde", 'ã'), ("auml", 'ä'),
    ("aring", 'å'), ("aelig", 'æ'), ("ccedil", 'ç'), ("egrave", 'è'), ("eacute", 'é'),
    ("ecirc", 'ê'), ("euml", 'ë'), ("igrave", 'ì'), ("iacute", 'í'), ("icirc", 'î'),
    ("iuml", 'ï'), ("eth", 'ð'), ("ntilde", 'ñ'), ("ograve", 'ò'), ("oacute", 'ó'),
    ("ocirc", 'ô'), ("otilde", 'õ'), ("ouml", 'ö'), ("divide", '÷'), ("oslash", 'ø'),
    ("ugrave", 'ù'), ("uacute", 'ú'), ("ucirc", 'û'), ("uuml", 'ü'), ("yacute", 'ý'),
    ("thorn", 'þ'), ("yuml", 'ÿ'),
];

/// Strip markup from an HTML page, keeping its text content
///
/// Script and style bodies are dropped, tags become spaces, character references
/// are decoded and whitespace runs collapse to one space.
pub fn html_to_text(html: &str) -> String {
    let without_blocks = BLOCKS.replace_all(html, " ");
    let without_tags = TAGS.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode character references in one pass, so `&amp;Ntilde;` stays `&Ntilde;`
///
/// Unknown names and invalid code points are left as written.
fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|name| {
                    NAMED_ENTITIES
                        .iter()
                        .find(|(entity, _)| *entity == name.as_str())
                        .map(|(_, c)| *c)
                })
            };

            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
