//! Byte stream sources
//!
//! A source turns a track URL into an ordered stream of byte chunks plus the
//! declared total length, when the transport knows it.

use crate::config::PlayerSettings;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// An opened transfer.
pub struct OpenedStream {
    /// Declared total length in bytes, if known
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens byte streams for track URLs.
pub trait ByteSource: Send + Sync {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<OpenedStream>>;
}

// ========================================
// HTTP
// ========================================

/// Progressive HTTP source.
///
/// Non-2xx responses are transport failures. When a relay is configured the
/// request goes to `{relay}?target=<url>` instead of the URL itself.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    relay: Option<Url>,
}

impl HttpSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            relay: None,
        }
    }

    /// Route every request through a pass-through relay.
    pub fn with_relay(mut self, relay: &str) -> Result<Self> {
        let relay = Url::parse(relay)
            .map_err(|e| Error::Config(format!("invalid relay URL {}: {}", relay, e)))?;
        self.relay = Some(relay);
        Ok(self)
    }

    /// Final request URL for `target`
    pub fn request_url(&self, target: &str) -> Result<Url> {
        match &self.relay {
            Some(relay) => {
                let mut url = relay.clone();
                url.query_pairs_mut().append_pair("target", target);
                Ok(url)
            }
            None => Url::parse(target)
                .map_err(|e| Error::Config(format!("invalid track URL {}: {}", target, e))),
        }
    }

    async fn fetch(&self, target: &str) -> Result<OpenedStream> {
        let url = self.request_url(target)?;
        info!("Requesting {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_length = response.content_length();
        debug!("Response {} (length {:?})", response.status(), content_length);

        let body = response.bytes_stream().map_err(Error::from).boxed();
        Ok(OpenedStream {
            content_length,
            body,
        })
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl ByteSource for HttpSource {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<OpenedStream>> {
        self.fetch(url).boxed()
    }
}

// ========================================
// Local files
// ========================================

/// Reads a local file in chunks, as if it were arriving over the network.
#[derive(Debug, Clone, Default)]
pub struct FileSource;

impl FileSource {
    fn path_of(url: &str) -> PathBuf {
        PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
    }

    async fn read(&self, url: &str) -> Result<OpenedStream> {
        let path = Self::path_of(url);
        let file = tokio::fs::File::open(&path).await?;
        let content_length = file.metadata().await.ok().map(|m| m.len());
        info!("Streaming local file {} ({:?} bytes)", path.display(), content_length);

        let body = ReaderStream::new(file).map_err(Error::from).boxed();
        Ok(OpenedStream {
            content_length,
            body,
        })
    }
}

impl ByteSource for FileSource {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<OpenedStream>> {
        self.read(url).boxed()
    }
}

/// HTTP for `http(s)://` URLs, local files for everything else.
#[derive(Debug, Clone, Default)]
pub struct RoutingSource {
    http: HttpSource,
    file: FileSource,
}

impl RoutingSource {
    pub fn new(http: HttpSource) -> Self {
        Self {
            http,
            file: FileSource,
        }
    }

    /// Source for a player configured by `settings`.
    ///
    /// Remote URLs go through `settings.relay_url` when one is set.
    pub fn from_settings(settings: &PlayerSettings) -> Result<Self> {
        let http = match &settings.relay_url {
            Some(relay) => HttpSource::default().with_relay(relay)?,
            None => HttpSource::default(),
        };
        Ok(Self::new(http))
    }

    fn is_remote(url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

impl ByteSource for RoutingSource {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<OpenedStream>> {
        if Self::is_remote(url) {
            self.http.open(url)
        } else {
            self.file.open(url)
        }
    }
}
