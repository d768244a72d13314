/// Bot configuration, read from the environment (after `.env` is loaded).
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use courier_shared::errors::{CourierError, CourierResult};
use courier_shared::throttle::DEFAULT_STATUS_INTERVAL;
use url::Url;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    /// Downloader executable (yt-dlp or a compatible fork), taken verbatim.
    pub downloader_path: String,
    /// Extra leading arguments, whitespace separated in `DOWNLOADER_ARGS`.
    pub downloader_args: Vec<String>,
    /// Working directory of every download; also the HTTP server root.
    pub storage_dir: PathBuf,
    /// Prefix for links to downloaded files.
    pub base_url: Url,
    /// Bind address of the static file server, if it should run.
    pub http_server: Option<SocketAddr>,
    pub debug: bool,
    pub status_interval: Duration,
    pub max_concurrent: usize,
    /// Per-request limit; `None` lets a download run forever.
    pub download_timeout: Option<Duration>,
    pub format: String,
    pub merge_output_format: String,
}

impl BotConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> CourierResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> CourierResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let token = get("TELOXIDE_TOKEN")
            .ok_or_else(|| CourierError::Config("TELOXIDE_TOKEN must be set".into()))?;

        let base_url = get("BASE_URL").unwrap_or_else(|| "http://localhost:8080/".to_string());
        let base_url = Url::parse(&base_url)
            .map_err(|e| CourierError::Config(format!("BASE_URL {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CourierError::Config(format!("BASE_URL {} cannot hold a path", base_url)));
        }

        let http_server = match get("HTTP_SERVER") {
            Some(addr) => Some(addr.parse::<SocketAddr>().map_err(|e| {
                CourierError::Config(format!("HTTP_SERVER {:?}: {}", addr, e))
            })?),
            None => None,
        };

        let status_interval = match get("STATUS_INTERVAL_SECS") {
            Some(v) => Duration::from_secs(parse_number(&v, "STATUS_INTERVAL_SECS")?),
            None => DEFAULT_STATUS_INTERVAL,
        };

        let max_concurrent = parse_or(get("MAX_CONCURRENT_DOWNLOADS"), "MAX_CONCURRENT_DOWNLOADS", 3)?;
        if max_concurrent == 0 {
            return Err(CourierError::Config("MAX_CONCURRENT_DOWNLOADS must be at least 1".into()));
        }

        let timeout_secs: u64 = parse_or(get("DOWNLOAD_TIMEOUT_SECS"), "DOWNLOAD_TIMEOUT_SECS", 3600)?;

        let debug = match get("BOT_DEBUG") {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
            None => false,
        };

        Ok(Self {
            token,
            downloader_path: get("DOWNLOADER_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            downloader_args: get("DOWNLOADER_ARGS")
                .map(|v| v.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            storage_dir: PathBuf::from(get("STORAGE_DIR").unwrap_or_else(|| "./downloads".to_string())),
            base_url,
            http_server,
            debug,
            status_interval,
            max_concurrent,
            download_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            format: get("DOWNLOAD_FORMAT")
                .unwrap_or_else(|| "bestvideo[height<=1080]+bestaudio,bestaudio".to_string()),
            merge_output_format: get("MERGE_OUTPUT_FORMAT").unwrap_or_else(|| "mp4".to_string()),
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> CourierResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CourierError::Config(format!("{} must be a number, got {:?}", key, value)))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> CourierResult<T> {
    match value {
        Some(v) => parse_number(&v, key),
        None => Ok(default),
    }
}
