//! `yt-dlp` subprocess engine.
//!
//! The binary is asked to print one machine-readable line per progress
//! update (`--newline --progress-template`) and the final file path once
//! post-processing has moved it into place (`--print after_move:`). Both
//! stdout and stderr are scanned line by line while the process runs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::engine::{EngineError, EngineEvent, FetchEngine, ProgressSink};
use crate::options::{FetchOptions, RECODE_FORMAT};

/// Default binary name, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "yt-dlp";

/// Marker in front of every progress line.
const PROGRESS_PREFIX: &str = "[progress]";
/// Marker in front of the produced file path.
const OUTPUT_PREFIX: &str = "[output]";
/// Prefix yt-dlp uses for fatal messages.
const ERROR_PREFIX: &str = "ERROR:";

/// Maximum bytes kept from a single output line.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Engine backed by the `yt-dlp` command-line tool.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
    prefix_args: Vec<OsString>,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Arguments placed before the generated ones, for launchers such as
    /// `python3 -m yt_dlp`.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one fetch, excluding any prefix args.
    ///
    /// `cookies` is passed separately because it is only used when the
    /// configured file actually exists.
    pub fn build_args(url: &str, options: &FetchOptions, cookies: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--no-playlist",
            "--newline",
            "--progress",
            "--no-warnings",
            "--no-simulate",
            "--progress-template",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push(
            format!(
                "download:{PROGRESS_PREFIX}%(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s"
            )
            .into(),
        );
        args.push("--print".into());
        args.push(format!("after_move:{OUTPUT_PREFIX}%(filepath)s").into());

        args.push("--output".into());
        args.push(options.output_template.clone().into());
        args.push("--format".into());
        args.push(options.format.clone().into());
        args.push("--merge-output-format".into());
        args.push(options.merge_output_format.clone().into());
        args.push("--concurrent-fragments".into());
        args.push(options.concurrent_fragments.to_string().into());
        args.push("--retries".into());
        args.push(options.retries.to_string().into());
        args.push("--fragment-retries".into());
        args.push(options.fragment_retries.to_string().into());

        if let Some(cookies) = cookies {
            args.push("--cookies".into());
            args.push(cookies.as_os_str().to_owned());
        }
        if let Some(ffmpeg) = &options.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.as_os_str().to_owned());
        }
        if !options.allow_images {
            args.push("--recode-video".into());
            args.push(RECODE_FORMAT.into());
        }

        args.push("--".into());
        args.push(url.into());
        args
    }

    async fn usable_cookies(options: &FetchOptions) -> Option<&Path> {
        let path = options.cookies_file.as_deref()?;
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Some(path)
        } else {
            tracing::warn!(path = %path.display(), "Cookie file not found, fetching without it");
            None
        }
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        progress: ProgressSink,
    ) -> Result<PathBuf, EngineError> {
        let cookies = Self::usable_cookies(options).await;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(Self::build_args(url, options, cookies))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(EngineError::Spawn)?;
        tracing::debug!(program = %self.program.display(), url, "Fetch engine started");

        // Merge both pipes into one line channel; it closes once the
        // process has closed both.
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let mut produced = None;
        let mut last_error = None;
        while let Some(line) = line_rx.recv().await {
            match parse_line(&line) {
                OutputLine::Progress(event) => progress.emit(event),
                OutputLine::Output(path) => produced = Some(path),
                OutputLine::Error(message) => {
                    tracing::debug!(url, error = %message, "Fetch engine reported an error");
                    last_error = Some(message);
                }
                OutputLine::Other => {
                    tracing::trace!(line = %line, "Fetch engine output");
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::ExecutionFailed {
                exit_code: status.code(),
                message: last_error
                    .unwrap_or_else(|| format!("yt-dlp exited unsuccessfully ({status})")),
            });
        }

        produced.ok_or(EngineError::NoOutput)
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Classification of a single line printed by yt-dlp.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputLine {
    Progress(EngineEvent),
    Output(PathBuf),
    Error(String),
    Other,
}

fn parse_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.trim_start().strip_prefix(PROGRESS_PREFIX) {
        let mut fields = rest.splitn(4, '|');
        let status = fields.next().unwrap_or_default().trim();
        let percent = fields.next().unwrap_or_default();
        let speed = fields.next().unwrap_or_default();
        let eta = fields.next().unwrap_or_default();
        return OutputLine::Progress(EngineEvent::from_status(status, percent, speed, eta));
    }

    if let Some(path) = line.strip_prefix(OUTPUT_PREFIX) {
        let path = path.trim();
        if !path.is_empty() {
            return OutputLine::Output(PathBuf::from(path));
        }
    }

    if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
        return OutputLine::Error(message.trim().to_string());
    }

    OutputLine::Other
}

/// Forward each line of `reader` to `tx`. Invalid UTF-8 is replaced rather
/// than ending the read, so the child never blocks on a full pipe.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                buf.truncate(MAX_LINE_BYTES);
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Fetch engine pipe read failed");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn options() -> FetchOptions {
        FetchOptions::new(Path::new("downloads"), chrono::Utc::now())
    }

    fn has_pair(args: &[OsString], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    // -- parse_line ----------------------------------------------------------

    #[test]
    fn parses_progress_line() {
        assert_eq!(
            parse_line("[progress]downloading|\x1b[0;94m 42.1%\x1b[0m|2.00MiB/s|00:03\n"),
            OutputLine::Progress(EngineEvent::Downloading {
                percent: "\x1b[0;94m 42.1%\x1b[0m".into(),
                speed: "2.00MiB/s".into(),
                eta: "00:03".into(),
            })
        );
    }

    #[test]
    fn parses_finished_line() {
        assert_eq!(
            parse_line("[progress]finished|100%|NA|NA"),
            OutputLine::Progress(EngineEvent::Finished)
        );
    }

    #[test]
    fn truncated_progress_line_is_still_an_event() {
        assert_eq!(
            parse_line("[progress]downloading"),
            OutputLine::Progress(EngineEvent::Downloading {
                percent: String::new(),
                speed: String::new(),
                eta: String::new(),
            })
        );
    }

    #[test]
    fn parses_output_path() {
        assert_eq!(
            parse_line("[output]downloads/user__abc__20240101_000000.mp4\r\n"),
            OutputLine::Output(PathBuf::from("downloads/user__abc__20240101_000000.mp4"))
        );
        assert_eq!(parse_line("[output]   "), OutputLine::Other);
    }

    #[test]
    fn parses_error_line() {
        assert_eq!(
            parse_line("ERROR: [Instagram] abc: Requested content is not available"),
            OutputLine::Error("[Instagram] abc: Requested content is not available".into())
        );
    }

    #[test]
    fn other_lines_are_ignored() {
        assert_eq!(parse_line("[info] abc: Downloading 1 format(s)"), OutputLine::Other);
        assert_eq!(parse_line(""), OutputLine::Other);
    }

    // -- build_args ----------------------------------------------------------

    #[test]
    fn args_carry_tuning_and_end_with_url() {
        let opts = options();
        let args = YtDlpEngine::build_args("https://instagram.com/p/1", &opts, None);

        assert!(has_pair(&args, "--output", &opts.output_template));
        assert!(has_pair(&args, "--format", "bestvideo+bestaudio/best"));
        assert!(has_pair(&args, "--merge-output-format", "mp4"));
        assert!(has_pair(&args, "--concurrent-fragments", "4"));
        assert!(has_pair(&args, "--retries", "10"));
        assert!(has_pair(&args, "--fragment-retries", "10"));
        assert!(args.iter().any(|a| a == "--no-playlist"));
        assert_eq!(args.last().unwrap(), "https://instagram.com/p/1");
        assert_eq!(&args[args.len() - 2], "--");
    }

    #[test]
    fn images_disallowed_adds_recode() {
        let mut opts = options();
        assert!(!YtDlpEngine::build_args("u", &opts, None)
            .iter()
            .any(|a| a == "--recode-video"));

        opts.allow_images = false;
        let args = YtDlpEngine::build_args("u", &opts, None);
        assert!(has_pair(&args, "--recode-video", "mp4"));
    }

    #[test]
    fn optional_paths_are_passed_when_present() {
        let mut opts = options();
        opts.ffmpeg_location = Some(PathBuf::from("/opt/ffmpeg/bin"));
        let args = YtDlpEngine::build_args("u", &opts, Some(Path::new("cookies.txt")));

        assert!(has_pair(&args, "--cookies", "cookies.txt"));
        assert!(has_pair(&args, "--ffmpeg-location", "/opt/ffmpeg/bin"));
    }

    #[tokio::test]
    async fn missing_cookie_file_is_skipped() {
        let mut opts = options();
        opts.cookies_file = Some(PathBuf::from("/definitely/not/here/cookies.txt"));
        assert!(YtDlpEngine::usable_cookies(&opts).await.is_none());

        let file = tempfile::NamedTempFile::new().expect("create temp file");
        opts.cookies_file = Some(file.path().to_path_buf());
        assert_eq!(YtDlpEngine::usable_cookies(&opts).await, Some(file.path()));
    }

    // -- fetch (scripted stand-in for the binary) ----------------------------

    /// Write a shell script that plays the part of yt-dlp.
    fn write_temp_script(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        write!(f, "{body}").expect("write body");
        f.flush().expect("flush script");
        f
    }

    fn scripted_engine(script: &tempfile::NamedTempFile) -> YtDlpEngine {
        YtDlpEngine::new("sh").with_prefix_args([script.path().as_os_str()])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_streams_progress_and_returns_output() {
        let script = write_temp_script(
            "echo '[info] starting'\n\
             echo '[progress]downloading| 10.0%|1.00MiB/s|00:09'\n\
             echo '[info] merging noise' 1>&2\n\
             echo '[progress]downloading| 55.5%|1.20MiB/s|00:04'\n\
             echo '[progress]finished|100%|NA|NA'\n\
             echo '[output]downloads/clip.mp4'\n",
        );
        let engine = scripted_engine(&script);
        let (sink, mut rx) = ProgressSink::channel();

        let path = engine
            .fetch("https://instagram.com/p/1", &options(), sink)
            .await
            .expect("fetch should succeed");
        assert_eq!(path, PathBuf::from("downloads/clip.mp4"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events.last(), Some(&EngineEvent::Finished));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Downloading { speed, .. } if speed == "1.20MiB/s")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_failure_carries_last_error_line() {
        let script = write_temp_script(
            "echo '[progress]downloading| 3.0%|NA|NA'\n\
             echo 'ERROR: [Instagram] abc: Requested content is not available' 1>&2\n\
             exit 1\n",
        );
        let engine = scripted_engine(&script);
        let (sink, _rx) = ProgressSink::channel();

        let err = engine
            .fetch("https://instagram.com/p/1", &options(), sink)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            EngineError::ExecutionFailed { exit_code: Some(1), ref message }
                if message == "[Instagram] abc: Requested content is not available"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_without_output_line_is_an_error() {
        let script = write_temp_script("echo '[progress]finished|100%|NA|NA'\n");
        let engine = scripted_engine(&script);
        let (sink, _rx) = ProgressSink::channel();

        let err = engine.fetch("u", &options(), sink).await.unwrap_err();
        assert_matches!(err, EngineError::NoOutput);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let engine = YtDlpEngine::new("/nonexistent/bin/yt-dlp-missing");
        let (sink, _rx) = ProgressSink::channel();

        let err = engine.fetch("u", &options(), sink).await.unwrap_err();
        assert_matches!(err, EngineError::Spawn(_));
    }
}
