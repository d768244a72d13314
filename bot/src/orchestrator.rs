/// Per-request download orchestration.
///
/// Each inbound URL gets its own `Orchestrator` running as a tokio task:
/// validate -> acknowledge -> wait for a slot -> stream downloader output
/// through the status publisher -> wait for exit -> resolve file names.
/// Whatever happens, exactly one `TerminalResult` is sent back to the
/// dispatch loop.
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use courier_shared::errors::DownloadError;
use courier_shared::models::{Outcome, RequestContext, StatusKind, StatusUpdate, TerminalResult};
use courier_shared::task_queue::TaskQueue;
use courier_shared::throttle::StatusPublisher;

use crate::config::BotConfig;
use crate::workers::downloader::Downloader;

/// Everything a request needs from the rest of the process.
pub struct AppContext {
    pub config: BotConfig,
    pub downloader: Downloader,
    pub task_queue: TaskQueue,
    /// Cancelled on shutdown; every running download stops at its next await.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: BotConfig, shutdown: CancellationToken) -> Self {
        let downloader = Downloader::from_config(&config);
        Self::with_downloader(config, downloader, shutdown)
    }

    pub fn with_downloader(config: BotConfig, downloader: Downloader, shutdown: CancellationToken) -> Self {
        let task_queue = TaskQueue::new(config.max_concurrent);
        Self {
            config,
            downloader,
            task_queue,
            shutdown,
        }
    }
}

/// Queues an orchestrator reports into.
#[derive(Clone)]
pub struct EventSenders {
    pub status: mpsc::Sender<StatusUpdate>,
    pub results: mpsc::Sender<TerminalResult>,
}

pub struct Orchestrator {
    ctx: Arc<AppContext>,
    request: RequestContext,
    events: EventSenders,
}

impl Orchestrator {
    pub fn new(ctx: Arc<AppContext>, request: RequestContext, events: EventSenders) -> Self {
        Self { ctx, request, events }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the request to completion and report its outcome.
    pub async fn run(self) {
        let short_id = self.request.short_id();
        info!(task = %short_id, chat_id = self.request.chat_id, url = %self.request.url, "request received");

        let outcome = match self.execute().await {
            Ok(artifacts) => {
                info!(task = %short_id, files = artifacts.len(), "download finished");
                Outcome::Success { artifacts }
            }
            Err(e) if e.is_input_error() => {
                info!(task = %short_id, "request rejected: {}", e);
                Outcome::Failure { reason: e.to_string() }
            }
            Err(e) => {
                warn!(task = %short_id, "download failed: {}", e);
                Outcome::Failure { reason: e.to_string() }
            }
        };

        let result = TerminalResult {
            request: self.request.clone(),
            outcome,
        };
        if self.events.results.send(result).await.is_err() {
            warn!(task = %short_id, "dispatch loop gone, dropping result");
        }
    }

    async fn execute(&self) -> Result<Vec<String>, DownloadError> {
        let url = validate_url(&self.request.url)?;

        self.publish(StatusKind::Started).await;
        let mut publisher = StatusPublisher::new(self.ctx.config.status_interval, Instant::now());

        let queue = &self.ctx.task_queue;
        let id = self.request.id;
        queue.enqueue(id, self.request.chat_id).await;

        let acquired = tokio::select! {
            acquired = queue.acquire(id) => acquired,
            _ = self.ctx.shutdown.cancelled() => false,
        };
        if !acquired {
            queue.fail(id).await;
            return Err(DownloadError::Cancelled);
        }

        let work = async {
            tokio::select! {
                result = self.download(&url, &mut publisher) => result,
                _ = self.ctx.shutdown.cancelled() => Err(DownloadError::Cancelled),
            }
        };
        let result = match self.ctx.config.download_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Err(DownloadError::Timeout(limit.as_secs()))),
            None => work.await,
        };

        match &result {
            Ok(_) => queue.complete(id).await,
            Err(_) => queue.fail(id).await,
        }
        result
    }

    /// Streaming phase. Dropping this future kills the downloader.
    async fn download(&self, url: &str, publisher: &mut StatusPublisher) -> Result<Vec<String>, DownloadError> {
        let mut process = self.ctx.downloader.launch(url, &self.request.short_id())?;

        while let Some(chunk) = process.next_chunk().await? {
            if let Some(snapshot) = publisher.push(&chunk, Instant::now()) {
                self.publish(StatusKind::Snapshot(snapshot)).await;
            }
        }
        process.wait().await?;

        self.ctx.downloader.resolve_artifacts(url).await
    }

    async fn publish(&self, kind: StatusKind) {
        let update = StatusUpdate {
            request: self.request.clone(),
            kind,
        };
        if self.events.status.send(update).await.is_err() {
            warn!(task = %self.request.short_id(), "dispatch loop gone, dropping status");
        }
    }
}

/// Accept only absolute http(s) URLs. Returns the trimmed text.
pub fn validate_url(text: &str) -> Result<String, DownloadError> {
    let text = text.trim();
    let url = Url::parse(text).map_err(|e| DownloadError::InvalidInput(format!("{:?}: {}", text, e)))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(text.to_string()),
        _ => Err(DownloadError::InvalidInput(format!("{:?}: only http and https links are supported", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url("  https://www.youtube.com/watch?v=dQw4w9WgXcQ \n").unwrap(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert!(validate_url("http://example.com/video").is_ok());
        for bad in ["", "hello there", "ftp://example.com/file", "file:///etc/passwd", "youtube.com/watch"] {
            assert!(
                matches!(validate_url(bad), Err(DownloadError::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;
        use std::time::Duration;
        use crate::test_support::{fake_downloader, fake_downloader_failing_resolution};
        use std::path::Path;

        struct Harness {
            ctx: Arc<AppContext>,
            events: EventSenders,
            status_rx: mpsc::Receiver<StatusUpdate>,
            results_rx: mpsc::Receiver<TerminalResult>,
            _storage: tempfile::TempDir,
        }

        fn harness(script: &str, extra: &[(&str, &str)]) -> Harness {
            harness_with(fake_downloader, script, extra)
        }

        fn harness_with(
            make: fn(&Path, &str) -> Downloader,
            script: &str,
            extra: &[(&str, &str)],
        ) -> Harness {
            let storage = tempfile::tempdir().unwrap();
            let mut vars = vec![("TELOXIDE_TOKEN", "test"), ("STATUS_INTERVAL_SECS", "0")];
            vars.extend_from_slice(extra);
            let config = BotConfig::from_lookup(|key| {
                vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
            })
            .unwrap();
            let downloader = make(storage.path(), script);
            let ctx = Arc::new(AppContext::with_downloader(config, downloader, CancellationToken::new()));
            let (status, status_rx) = mpsc::channel(256);
            let (results, results_rx) = mpsc::channel(16);
            Harness {
                ctx,
                events: EventSenders { status, results },
                status_rx,
                results_rx,
                _storage: storage,
            }
        }

        impl Harness {
            async fn run(&mut self, url: &str) -> (Vec<StatusKind>, Outcome) {
                let request = RequestContext::new(7, 42, url);
                Orchestrator::new(self.ctx.clone(), request.clone(), self.events.clone())
                    .run()
                    .await;
                let result = self.results_rx.recv().await.unwrap();
                assert_eq!(result.request, request);
                let mut statuses = Vec::new();
                while let Ok(update) = self.status_rx.try_recv() {
                    assert_eq!(update.request.id, request.id);
                    statuses.push(update.kind);
                }
                (statuses, result.outcome)
            }
        }

        #[tokio::test]
        async fn test_success_reports_artifacts() {
            let mut h = harness("printf 'hello\\n'\nsleep 0.1\nprintf '\\r[download] 100%%\\n'\n", &[]);
            let url = "https://example.com/watch?v=1";
            let (statuses, outcome) = h.run(url).await;

            assert_eq!(statuses[0], StatusKind::Started);
            assert!(statuses[1..].iter().all(|s| matches!(s, StatusKind::Snapshot(_))));
            assert_eq!(
                statuses.last(),
                Some(&StatusKind::Snapshot("hello\n[download] 100%\n".to_string()))
            );

            let dir = crate::workers::downloader::output_dir_name(url);
            assert_eq!(
                outcome,
                Outcome::Success {
                    artifacts: vec![format!("{}/clip.mp4", dir), format!("{}/clip.m4a", dir)]
                }
            );
            assert_eq!(h.ctx.task_queue.stats().await.completed, 1);
        }

        #[tokio::test]
        async fn test_nonzero_exit_fails() {
            let mut h = harness("echo 'ERROR: Video unavailable' >&2\nexit 1\n", &[]);
            let (statuses, outcome) = h.run("https://example.com/watch?v=2").await;

            assert_eq!(statuses, vec![StatusKind::Started]);
            match outcome {
                Outcome::Failure { reason } => assert!(reason.contains("ERROR: Video unavailable"), "{}", reason),
                other => panic!("expected failure, got {:?}", other),
            }
            assert_eq!(h.ctx.task_queue.stats().await.failed, 1);
        }

        #[tokio::test]
        async fn test_artifact_resolution_failure_fails_once() {
            let mut h = harness_with(fake_downloader_failing_resolution, "printf 'done\\n'\n", &[]);
            let (statuses, outcome) = h.run("https://example.com/watch?v=5").await;

            assert_eq!(statuses[0], StatusKind::Started);
            assert_eq!(
                outcome,
                Outcome::Failure {
                    reason: "could not resolve downloaded files: ERROR: unable to resolve file name".into()
                }
            );
            assert!(h.results_rx.try_recv().is_err());
            let stats = h.ctx.task_queue.stats().await;
            assert_eq!((stats.completed, stats.failed, stats.running), (0, 1, 0));
        }

        #[tokio::test]
        async fn test_invalid_url_fails_without_ack() {
            let mut h = harness("echo 'should not run'\n", &[]);
            let (statuses, outcome) = h.run("not a url").await;
            assert!(statuses.is_empty());
            assert!(matches!(outcome, Outcome::Failure { reason } if reason.starts_with("invalid URL")));
            assert_eq!(h.ctx.task_queue.stats().await.failed, 0);
        }

        #[tokio::test]
        async fn test_timeout_kills_download() {
            let mut h = harness("exec sleep 30\n", &[("DOWNLOAD_TIMEOUT_SECS", "1")]);
            let started = std::time::Instant::now();
            let (_, outcome) = h.run("https://example.com/watch?v=3").await;
            assert!(started.elapsed() < Duration::from_secs(10));
            assert_eq!(outcome, Outcome::Failure { reason: "download timed out after 1s".into() });
        }

        #[tokio::test]
        async fn test_shutdown_cancels_download() {
            let mut h = harness("exec sleep 30\n", &[]);
            let token = h.ctx.shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                token.cancel();
            });
            let (_, outcome) = h.run("https://example.com/watch?v=4").await;
            assert_eq!(outcome, Outcome::Failure { reason: "download cancelled".into() });
        }
    }
}
