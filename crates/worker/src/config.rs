use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reelfetch_core::naming::ARTIFACT_EXTENSIONS;
use reelfetch_core::source::{SourcePolicy, DEFAULT_SOURCE_DOMAIN};
use reelfetch_fetcher::options::{
    DEFAULT_CONCURRENT_FRAGMENTS, DEFAULT_FRAGMENT_RETRIES, DEFAULT_RETRIES,
};
use reelfetch_fetcher::ytdlp::DEFAULT_BINARY;
use reelfetch_fetcher::FetchOptions;

use crate::artifact::ArtifactPolicy;

/// A configuration variable that could not be interpreted.
#[derive(Debug, thiserror::Error)]
#[error("{name} must be {expected}, got '{value}'")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Fetch and job settings loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Output root; every artifact path is relative to it.
    pub download_dir: PathBuf,
    /// Cookie file handed to the engine when it exists.
    pub cookies_file: Option<PathBuf>,
    /// ffmpeg location handed to the engine.
    pub ffmpeg_path: Option<PathBuf>,
    /// yt-dlp binary.
    pub ytdlp_path: PathBuf,
    /// Let still images through instead of recoding everything to video.
    pub allow_images: bool,
    /// Hosts a submitted URL may point at.
    pub allowed_domains: Vec<String>,
    pub concurrent_fragments: u32,
    pub retries: u32,
    pub fragment_retries: u32,
}

impl FetchConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default          |
    /// |------------------------|------------------|
    /// | `DOWNLOAD_DIR`         | `downloads`      |
    /// | `COOKIES_FILE`         | unset            |
    /// | `FFMPEG_PATH`          | unset            |
    /// | `YTDLP_PATH`           | `yt-dlp`         |
    /// | `ALLOW_IMAGES`         | `yes`            |
    /// | `ALLOWED_DOMAINS`      | `instagram.com`  |
    /// | `CONCURRENT_FRAGMENTS` | `4`              |
    /// | `RETRIES`              | `10`             |
    /// | `FRAGMENT_RETRIES`     | `10`             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let allow_images = match non_empty("ALLOW_IMAGES") {
            Some(value) => parse_flag("ALLOW_IMAGES", &value)?,
            None => true,
        };

        let allowed_domains = non_empty("ALLOWED_DOMAINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_SOURCE_DOMAIN.to_string()]);

        Ok(Self {
            download_dir: non_empty("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("downloads")),
            cookies_file: non_empty("COOKIES_FILE").map(PathBuf::from),
            ffmpeg_path: non_empty("FFMPEG_PATH").map(PathBuf::from),
            ytdlp_path: non_empty("YTDLP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY)),
            allow_images,
            allowed_domains,
            concurrent_fragments: parse_or(
                "CONCURRENT_FRAGMENTS",
                non_empty("CONCURRENT_FRAGMENTS"),
                DEFAULT_CONCURRENT_FRAGMENTS,
            )?,
            retries: parse_or("RETRIES", non_empty("RETRIES"), DEFAULT_RETRIES)?,
            fragment_retries: parse_or(
                "FRAGMENT_RETRIES",
                non_empty("FRAGMENT_RETRIES"),
                DEFAULT_FRAGMENT_RETRIES,
            )?,
        })
    }

    /// Settings for a test or embedding that only cares about the output
    /// directory.
    pub fn with_download_dir(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            cookies_file: None,
            ffmpeg_path: None,
            ytdlp_path: PathBuf::from(DEFAULT_BINARY),
            allow_images: true,
            allowed_domains: vec![DEFAULT_SOURCE_DOMAIN.to_string()],
            concurrent_fragments: DEFAULT_CONCURRENT_FRAGMENTS,
            retries: DEFAULT_RETRIES,
            fragment_retries: DEFAULT_FRAGMENT_RETRIES,
        }
    }

    pub fn source_policy(&self) -> SourcePolicy {
        SourcePolicy::new(&self.allowed_domains)
    }

    pub fn artifact_policy(&self) -> ArtifactPolicy {
        ArtifactPolicy::new(&self.download_dir, ARTIFACT_EXTENSIONS.iter().copied())
    }

    /// Engine options for a job submitted at `now`.
    pub fn fetch_options(&self, now: DateTime<Utc>) -> FetchOptions {
        FetchOptions {
            concurrent_fragments: self.concurrent_fragments,
            retries: self.retries,
            fragment_retries: self.fragment_retries,
            cookies_file: self.cookies_file.clone(),
            ffmpeg_location: self.ffmpeg_path.clone(),
            allow_images: self.allow_images,
            ..FetchOptions::new(&self.download_dir, now)
        }
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        _ => Err(ConfigError {
            name,
            expected: "yes or no",
            value: value.to_string(),
        }),
    }
}

fn parse_or<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError {
            name,
            expected: "a non-negative integer",
            value: raw,
        }),
    }
}
