use crate::config::ServerConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A prepare call may block while the server downloads the source; give it
/// room, but never hang forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// One entry in the folder hierarchy. A folder either contains more folders
/// or, when it has a listing, is a leaf collection of episodes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FolderEntry {
    pub name: String,
    /// Full path from the library root, `/`-joined.
    pub path: String,
    #[serde(rename = "has_list_file")]
    pub has_listing: bool,
}

/// One episode of a leaf collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoEntry {
    pub title: String,
    /// 1-based part number; unique within a collection and the key that
    /// cover updates and playback requests correlate on.
    pub page: u32,
    #[serde(default)]
    pub bvid: Option<String>,
    /// Duration in seconds, when the listing declares one.
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverInfo {
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl CoverInfo {
    /// Cover URL, treating an empty string as no cover.
    pub fn url(&self) -> Option<&str> {
        self.cover_url.as_deref().filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    Ready,
    /// The server is still downloading or converting the source. Any status
    /// other than `ready` means the stream is not playable yet.
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayInfo {
    pub status: PlayStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub subtitle_url: Option<String>,
}

impl PlayInfo {
    pub fn is_ready(&self) -> bool {
        self.status == PlayStatus::Ready
    }

    /// Subtitle URL, treating an empty string as no subtitle.
    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Percent-encode each segment of a library path while keeping the `/`
/// separators, for use in a URL path position.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Stateless client for the library server. Cheap to clone; all clones share
/// one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(server: &ServerConfig) -> Result<Self, ApiError> {
        Self::with_base_url(server.base_url())
    }

    /// Create a client against a specific base URL (for testing).
    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// List subfolders. An empty path lists the library root.
    pub async fn list_folders(&self, path: &str) -> Result<Vec<FolderEntry>, ApiError> {
        let url = if path.is_empty() {
            format!("{}/api/folders", self.base_url)
        } else {
            format!(
                "{}/api/folders?path={}",
                self.base_url,
                urlencoding::encode(path)
            )
        };

        debug!(path, "listing folders");

        self.get_json(url).await
    }

    /// List the episodes of a leaf collection.
    pub async fn list_videos(&self, folder_path: &str) -> Result<Vec<VideoEntry>, ApiError> {
        let url = format!("{}/api/folders/{}", self.base_url, encode_path(folder_path));

        debug!(folder_path, "listing videos");

        self.get_json(url).await
    }

    pub async fn get_cover(&self, bvid: &str, page: u32) -> Result<CoverInfo, ApiError> {
        let url = format!("{}/api/cover/{}/{}", self.base_url, bvid, page);

        debug!(bvid, page, "fetching cover");

        self.get_json(url).await
    }

    /// Ask the server to prepare an episode for streaming. The server may
    /// answer `pending` while it is still downloading or converting.
    pub async fn prepare_playback(&self, folder_path: &str, page: u32) -> Result<PlayInfo, ApiError> {
        let url = format!(
            "{}/api/play/{}/{}",
            self.base_url,
            encode_path(folder_path),
            page
        );

        debug!(folder_path, page, "requesting playback");

        self.get_json(url).await
    }

    /// Join a server-relative URL (`/static/…`, `/covers/…`) onto the
    /// configured base. Already-absolute URLs pass through unchanged.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { url, status });
        }

        response
            .json()
            .await
            .map_err(|source| ApiError::Request { url, source })
    }
}
