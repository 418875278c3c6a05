//! Per-job engine options.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Format selector: best video plus best audio, else best single file.
pub const DEFAULT_FORMAT: &str = "bestvideo+bestaudio/best";
/// Container used when separate streams are merged.
pub const DEFAULT_MERGE_FORMAT: &str = "mp4";
/// Container everything is recoded to when still images are not allowed.
pub const RECODE_FORMAT: &str = "mp4";
pub const DEFAULT_CONCURRENT_FRAGMENTS: u32 = 4;
pub const DEFAULT_RETRIES: u32 = 10;
pub const DEFAULT_FRAGMENT_RETRIES: u32 = 10;

/// Options passed opaquely to a [`FetchEngine`](crate::FetchEngine).
///
/// Retry and concurrency tuning belong to the engine; the job engine never
/// retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Output path template, already rooted in the output directory.
    pub output_template: String,
    pub format: String,
    pub merge_output_format: String,
    pub concurrent_fragments: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    /// Netscape cookie file for authenticated sources.
    pub cookies_file: Option<PathBuf>,
    /// Directory or binary path of ffmpeg, when not on `PATH`.
    pub ffmpeg_location: Option<PathBuf>,
    /// `true` lets still images through untouched; `false` recodes every
    /// result to [`RECODE_FORMAT`].
    pub allow_images: bool,
}

impl FetchOptions {
    /// Options with default tuning writing into `output_dir`.
    pub fn new(output_dir: &Path, now: DateTime<Utc>) -> Self {
        Self {
            output_template: output_template(output_dir, now),
            format: DEFAULT_FORMAT.to_string(),
            merge_output_format: DEFAULT_MERGE_FORMAT.to_string(),
            concurrent_fragments: DEFAULT_CONCURRENT_FRAGMENTS,
            retries: DEFAULT_RETRIES,
            fragment_retries: DEFAULT_FRAGMENT_RETRIES,
            cookies_file: None,
            ffmpeg_location: None,
            allow_images: true,
        }
    }
}

/// `<dir>/<uploader>__<media id>__<YYYYmmdd_HHMMSS>.<ext>`.
///
/// The timestamp keeps repeated fetches of the same media from colliding.
pub fn output_template(output_dir: &Path, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    output_dir
        .join(format!("%(uploader)s__%(id)s__{stamp}.%(ext)s"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn template_embeds_directory_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let template = output_template(Path::new("downloads"), now);
        assert_eq!(
            template,
            Path::new("downloads")
                .join("%(uploader)s__%(id)s__20240309_140507.%(ext)s")
                .to_string_lossy()
        );
    }

    #[test]
    fn defaults_match_engine_tuning() {
        let options = FetchOptions::new(Path::new("out"), Utc::now());
        assert_eq!(options.format, "bestvideo+bestaudio/best");
        assert_eq!(options.merge_output_format, "mp4");
        assert_eq!(options.concurrent_fragments, 4);
        assert_eq!(options.retries, 10);
        assert_eq!(options.fragment_retries, 10);
        assert!(options.allow_images);
        assert!(options.cookies_file.is_none());
    }
}
