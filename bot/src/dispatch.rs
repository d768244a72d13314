/// Process-wide dispatch loop.
///
/// Fans in three queues: inbound Telegram updates, status updates and
/// terminal results from running orchestrators. Each event is handled to
/// completion before the next one is taken, which makes this loop the only
/// writer to the chat. Downloads themselves run in their own tasks, so a slow
/// or hung download never holds the loop up.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_shared::models::{Outcome, RequestContext, StatusKind, StatusUpdate, TerminalResult};

use crate::commands::{Command, Inbound};
use crate::notifier::{Notifier, RenderMode};
use crate::orchestrator::{AppContext, EventSenders, Orchestrator};
use crate::render;

const STATUS_QUEUE_SIZE: usize = 256;
const RESULT_QUEUE_SIZE: usize = 64;

pub struct DispatchLoop<N: Notifier> {
    ctx: Arc<AppContext>,
    notifier: Arc<N>,
    inbound: mpsc::Receiver<Inbound>,
    status_rx: mpsc::Receiver<StatusUpdate>,
    results_rx: mpsc::Receiver<TerminalResult>,
    /// Handed to every orchestrator; dropped once inbound closes so the
    /// status and result queues close when the last download reports.
    events: Option<EventSenders>,
    /// Status message of each acknowledged request.
    status_messages: HashMap<Uuid, i32>,
    in_flight: usize,
}

impl<N: Notifier + 'static> DispatchLoop<N> {
    pub fn new(ctx: Arc<AppContext>, notifier: Arc<N>, inbound: mpsc::Receiver<Inbound>) -> Self {
        let (status, status_rx) = mpsc::channel(STATUS_QUEUE_SIZE);
        let (results, results_rx) = mpsc::channel(RESULT_QUEUE_SIZE);
        Self {
            ctx,
            notifier,
            inbound,
            status_rx,
            results_rx,
            events: Some(EventSenders { status, results }),
            status_messages: HashMap::new(),
            in_flight: 0,
        }
    }

    /// Run until inbound is closed and every started request has reported.
    pub async fn run(mut self) {
        info!("dispatch loop started");
        let mut inbound_open = true;

        loop {
            // Status before results: a request's pending status updates are
            // always delivered before its terminal result.
            tokio::select! {
                biased;
                Some(update) = self.status_rx.recv() => self.on_status(update).await,
                Some(result) = self.results_rx.recv() => self.on_result(result).await,
                event = self.inbound.recv(), if inbound_open => match event {
                    Some(event) => self.on_inbound(event).await,
                    None => {
                        inbound_open = false;
                        self.events = None;
                        info!(in_flight = self.in_flight, "inbound closed, waiting for running downloads");
                    }
                },
                else => break,
            }
        }

        info!("dispatch loop stopped");
    }

    async fn on_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Text { chat_id, message_id, text } => self.start_request(chat_id, message_id, text),
            Inbound::Command { chat_id, message_id, command } => match command {
                Command::Start | Command::Help => {
                    self.reply(chat_id, message_id, render::HELP_TEXT, RenderMode::Plain).await;
                }
                Command::Status => {
                    let stats = self.ctx.task_queue.stats().await;
                    let mine = self.ctx.task_queue.active_for_chat(chat_id).await;
                    let text = render::queue_status_text(&stats, &mine);
                    self.reply(chat_id, message_id, &text, RenderMode::Plain).await;
                }
                Command::Download(url) if url.trim().is_empty() => {
                    self.reply(chat_id, message_id, "Usage: /download <url>", RenderMode::Plain).await;
                }
                Command::Download(url) => self.start_request(chat_id, message_id, url),
            },
        }
    }

    fn start_request(&mut self, chat_id: i64, message_id: i32, url: String) {
        let Some(events) = &self.events else {
            warn!(chat_id, "request arrived during shutdown, ignoring");
            return;
        };
        let request = RequestContext::new(chat_id, message_id, url);
        debug!(task = %request.short_id(), "spawning orchestrator");
        Orchestrator::new(self.ctx.clone(), request, events.clone()).spawn();
        self.in_flight += 1;
    }

    async fn on_status(&mut self, update: StatusUpdate) {
        let request = &update.request;
        match update.kind {
            StatusKind::Started => {
                match self
                    .notifier
                    .send(request.chat_id, render::STARTED_TEXT, Some(request.message_id), RenderMode::Plain)
                    .await
                {
                    Ok(message_id) => {
                        self.status_messages.insert(request.id, message_id);
                    }
                    Err(e) => warn!(task = %request.short_id(), "failed to acknowledge request: {}", e),
                }
            }
            StatusKind::Snapshot(snapshot) => {
                let Some(&message_id) = self.status_messages.get(&request.id) else {
                    debug!(task = %request.short_id(), "no status message to edit");
                    return;
                };
                let text = render::status_text(&snapshot);
                if let Err(e) = self
                    .notifier
                    .edit(request.chat_id, message_id, &text, RenderMode::MarkdownV2)
                    .await
                {
                    warn!(task = %request.short_id(), "failed to update status: {}", e);
                }
            }
        }
    }

    async fn on_result(&mut self, result: TerminalResult) {
        let request = &result.request;
        self.status_messages.remove(&request.id);
        self.in_flight = self.in_flight.saturating_sub(1);

        let text = match &result.outcome {
            Outcome::Success { artifacts } => render::completion_text(&self.ctx.config.base_url, artifacts),
            Outcome::Failure { reason } => render::failure_text(reason),
        };
        self.reply(request.chat_id, request.message_id, &text, RenderMode::MarkdownV2)
            .await;
    }

    async fn reply(&self, chat_id: i64, message_id: i32, text: &str, mode: RenderMode) {
        if let Err(e) = self.notifier.send(chat_id, text, Some(message_id), mode).await {
            warn!(chat_id, "failed to send reply: {}", e);
        }
    }
}
