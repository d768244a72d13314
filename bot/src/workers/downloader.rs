/// Downloader subprocess adapter.
///
/// Spawns the download tool inside the storage directory, hands its stdout
/// out as raw text chunks and forwards stderr to tracing. Completion is
/// two-phase: the caller reads chunks until `None`, then calls `wait`, which
/// refuses to report an exit status before stdout has been fully drained.
use std::path::PathBuf;
use std::process::Stdio;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courier_shared::errors::DownloadError;

use crate::config::BotConfig;

/// Bytes requested from the pipe per read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Storage subdirectory for one URL: unpadded URL-safe base64 of its SHA-256.
pub fn output_dir_name(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(url.as_bytes()))
}

/// Builds and launches downloader invocations.
#[derive(Debug, Clone)]
pub struct Downloader {
    program: String,
    /// Arguments placed before ours, e.g. `-m yt_dlp` when the program is `python3`.
    base_args: Vec<String>,
    storage_dir: PathBuf,
    format: String,
    merge_output_format: String,
}

impl Downloader {
    /// `program` is used verbatim as the executable path.
    pub fn new(program: &str, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.to_string(),
            base_args: Vec::new(),
            storage_dir: storage_dir.into(),
            format: "bestvideo[height<=1080]+bestaudio,bestaudio".to_string(),
            merge_output_format: "mp4".to_string(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(&config.downloader_path, &config.storage_dir)
            .with_args(config.downloader_args.iter().cloned())
            .with_format(&config.format, &config.merge_output_format)
    }

    /// Arguments passed before every invocation's own.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_format(mut self, format: &str, merge_output_format: &str) -> Self {
        self.format = format.to_string();
        self.merge_output_format = merge_output_format.to_string();
        self
    }

    fn command(&self, url: &str, extra: &[&str]) -> Command {
        let template = format!("{}/%(title)s.%(ext)s", output_dir_name(url));
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .arg("-o")
            .arg(template)
            .arg("-f")
            .arg(&self.format)
            .arg("--merge-output-format")
            .arg(&self.merge_output_format)
            .args(extra)
            .arg(url)
            .current_dir(&self.storage_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Start a download and return its live output handle.
    pub fn launch(&self, url: &str, label: &str) -> Result<DownloadProcess, DownloadError> {
        if self.program.is_empty() {
            return Err(DownloadError::SpawnFailed("no downloader configured".into()));
        }

        let mut child = self
            .command(url, &["--write-info-json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DownloadError::SpawnFailed(format!("{}: {}", self.program, e)))?;

        info!(task = %label, pid = ?child.id(), "downloader started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::SpawnFailed("no stdout handle".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::SpawnFailed("no stderr handle".into()))?;

        // Stderr reader task - forward to tracing, remember the last line
        let task = label.to_string();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut last_line = None;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if line.starts_with("ERROR") {
                            warn!(target: "downloader", task = %task, "{}", line);
                        } else {
                            debug!(target: "downloader", task = %task, "{}", line);
                        }
                        last_line = Some(line.to_string());
                    }
                    Err(e) => {
                        warn!(task = %task, "failed to read downloader stderr: {}", e);
                        break;
                    }
                }
            }
            debug!(task = %task, "downloader stderr stream ended");
            last_line
        });

        Ok(DownloadProcess {
            label: label.to_string(),
            child,
            stdout,
            buf: vec![0; READ_BUFFER_SIZE],
            partial: Vec::new(),
            eof: false,
            stderr_task,
        })
    }

    /// Ask the downloader for the final file paths of a finished download.
    ///
    /// Returned paths are relative to the storage directory.
    pub async fn resolve_artifacts(&self, url: &str) -> Result<Vec<String>, DownloadError> {
        let output = self
            .command(url, &["--print", "filename"])
            .output()
            .await
            .map_err(|e| DownloadError::ArtifactResolution(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .last()
                .map(String::from)
                .unwrap_or_else(|| output.status.to_string());
            return Err(DownloadError::ArtifactResolution(reason));
        }

        let artifacts: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        if artifacts.is_empty() {
            return Err(DownloadError::ArtifactResolution("downloader printed no file names".into()));
        }
        Ok(artifacts)
    }
}

/// A running download. Dropping it kills the process.
pub struct DownloadProcess {
    label: String,
    child: Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
    /// Trailing bytes of a UTF-8 character split across reads.
    partial: Vec<u8>,
    eof: bool,
    stderr_task: JoinHandle<Option<String>>,
}

impl DownloadProcess {
    /// Next chunk of stdout text, or `None` once the stream hit EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<String>, DownloadError> {
        while !self.eof {
            let n = self
                .stdout
                .read(&mut self.buf)
                .await
                .map_err(|e| DownloadError::ReadFailed(e.to_string()))?;

            if n == 0 {
                self.eof = true;
                debug!(task = %self.label, "downloader stdout reached EOF");
                if !self.partial.is_empty() {
                    let rest = String::from_utf8_lossy(&self.partial).into_owned();
                    self.partial.clear();
                    return Ok(Some(rest));
                }
                break;
            }

            self.partial.extend_from_slice(&self.buf[..n]);
            let text = take_utf8(&mut self.partial);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    /// Drain whatever stdout is left, then wait for the process to exit.
    pub async fn wait(mut self) -> Result<(), DownloadError> {
        let mut discarded = 0;
        while let Some(chunk) = self.next_chunk().await? {
            discarded += chunk.len();
        }
        if discarded > 0 {
            warn!(task = %self.label, discarded, "unread downloader output drained before wait");
        }

        let context = match (&mut self.stderr_task).await {
            Ok(line) => line,
            Err(e) => {
                warn!(task = %self.label, "stderr forwarder failed: {}", e);
                None
            }
        };

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| DownloadError::ReadFailed(format!("waiting for downloader: {}", e)))?;

        info!(task = %self.label, %status, "downloader exited");
        if status.success() {
            Ok(())
        } else {
            Err(DownloadError::ExitStatus {
                code: status.code(),
                context,
            })
        }
    }
}

/// Decode everything decodable in `bytes`, keeping an incomplete trailing
/// character for the next read. Invalid sequences become U+FFFD.
fn take_utf8(bytes: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(valid) => {
                text.push_str(valid);
                start = bytes.len();
                break;
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                text.push_str(std::str::from_utf8(&bytes[start..valid_end]).unwrap_or_default());
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }
    bytes.drain(..start);
    text
}
