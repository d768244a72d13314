/// Helpers shared by the bot's unit tests.
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_shared::errors::{CourierError, CourierResult};

use crate::notifier::{Notifier, RenderMode};
use crate::workers::downloader::Downloader;

/// Answers `--print filename` like yt-dlp would for a two-format download.
const FAKE_DOWNLOADER_PRELUDE: &str = r#"prev=""
out=""
print=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  if [ "$arg" = "--print" ]; then print=1; fi
  prev="$arg"
done
if [ -n "$print" ]; then
  dir="${out%%/*}"
  echo "$dir/clip.mp4"
  echo "$dir/clip.m4a"
  exit 0
fi
"#;

/// Any `--print` invocation fails, as when the downloader cannot resolve
/// file names after a successful download.
const FAILING_RESOLUTION_PRELUDE: &str = r#"for arg in "$@"; do
  if [ "$arg" = "--print" ]; then
    echo 'ERROR: unable to resolve file name' >&2
    exit 3
  fi
done
"#;

/// Write a shell script standing in for yt-dlp and return a downloader
/// that runs it. `body` runs for download invocations.
///
/// The script is run through `sh` rather than executed directly, so a
/// concurrently forking test can never hit ETXTBSY on it.
pub fn fake_downloader(storage: &Path, body: &str) -> Downloader {
    write_fake(storage, FAKE_DOWNLOADER_PRELUDE, body)
}

/// Like `fake_downloader`, but file name resolution always fails.
pub fn fake_downloader_failing_resolution(storage: &Path, body: &str) -> Downloader {
    write_fake(storage, FAILING_RESOLUTION_PRELUDE, body)
}

fn write_fake(storage: &Path, prelude: &str, body: &str) -> Downloader {
    let script = storage.join("fake-yt-dlp.sh");
    std::fs::write(&script, format!("{}{}", prelude, body)).unwrap();
    Downloader::new("sh", storage).with_args([script.display().to_string()])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        chat_id: i64,
        reply_to: Option<i32>,
        text: String,
        mode: RenderMode,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
}

/// Notifier that records everything instead of talking to Telegram.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    next_id: Mutex<i32>,
    fail_sends: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        mode: RenderMode,
    ) -> CourierResult<i32> {
        if self.fail_sends {
            return Err(CourierError::Delivery("recording notifier set to fail".into()));
        }
        self.sent.lock().await.push(Sent::Message {
            chat_id,
            reply_to,
            text: text.to_string(),
            mode,
        });
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        Ok(1000 + *next_id)
    }

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        _mode: RenderMode,
    ) -> CourierResult<()> {
        if self.fail_sends {
            return Err(CourierError::Delivery("recording notifier set to fail".into()));
        }
        self.sent.lock().await.push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }
}
