use crate::config::DISCORD_MESSAGE_LIMIT;
use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notice shown when the stream produced nothing but whitespace.
pub const NO_VALID_RESPONSE: &str = "無有效回應，請嘗試其他提示。";

/// A remote chat message whose content can be replaced.
#[async_trait]
pub trait EditableMessage: Send + Sync {
    async fn edit(&self, content: &str) -> anyhow::Result<()>;
}

/// Handle to a message the bot already sent in a channel.
pub struct DiscordMessage {
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
}

impl DiscordMessage {
    pub fn new(
        http: Arc<serenity::Http>,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Self {
        Self {
            http,
            channel_id,
            message_id,
        }
    }
}

#[async_trait]
impl EditableMessage for DiscordMessage {
    async fn edit(&self, content: &str) -> anyhow::Result<()> {
        self.channel_id
            .edit_message(
                &*self.http,
                self.message_id,
                serenity::EditMessage::new().content(content),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The stream ended and the reply was published.
    Completed,
    /// The stream ended without any visible text.
    Empty,
    /// The stream raised; an error notice was published.
    Failed,
    /// The caller abandoned the render.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RenderReport {
    pub outcome: RenderOutcome,
    /// Successful content edits, notices excluded.
    pub edits: usize,
    pub reply: String,
}

/// Fragments pulled per edit before the renderer stops polling the stream
/// and waits for the interval to pass.
const MAX_PULLS_PER_EDIT: usize = 1024;

#[derive(Default)]
struct RenderState {
    reply: String,
    buffer: String,
    buffered_chars: usize,
    pulled: usize,
    edits: usize,
}

impl RenderState {
    fn push(&mut self, fragment: &str) {
        self.pulled += 1;
        if fragment.is_empty() {
            return;
        }
        self.buffer.push_str(fragment);
        self.buffered_chars += fragment.chars().count();
        self.reply.push_str(fragment);
    }

    /// Whitespace alone never triggers a flush.
    fn has_pending(&self) -> bool {
        !self.buffer.is_empty() && !self.reply.trim().is_empty()
    }

    /// A message's worth of text, or too many fragments, since the last edit.
    fn saturated(&self) -> bool {
        self.pulled >= MAX_PULLS_PER_EDIT || self.buffered_chars >= DISCORD_MESSAGE_LIMIT
    }

    fn report(self, outcome: RenderOutcome) -> RenderReport {
        RenderReport {
            outcome,
            edits: self.edits,
            reply: self.reply,
        }
    }
}

/// Publishes a streamed completion into a single, periodically edited message.
pub struct StreamRenderer {
    mention: String,
    interval: Duration,
}

impl StreamRenderer {
    pub fn new(mention: impl Into<String>, interval: Duration) -> Self {
        Self {
            mention: mention.into(),
            interval,
        }
    }

    /// Drive `fragments` to completion, editing `message` at most once per
    /// interval. Never returns an error: stream faults become a notice edit.
    pub async fn render<S, M>(
        &self,
        fragments: S,
        message: &M,
        cancel: &CancellationToken,
    ) -> RenderReport
    where
        S: Stream<Item = anyhow::Result<String>>,
        M: EditableMessage + ?Sized,
    {
        tokio::pin!(fragments);
        let mut state = RenderState::default();

        'stream: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(message, state).await,
                item = fragments.next() => item,
            };
            match next {
                None => break 'stream,
                Some(Ok(fragment)) => state.push(&fragment),
                Some(Err(e)) => return self.fail(message, state, e).await,
            }

            // Coalesce whatever the stream already has ready.
            while !state.saturated() {
                if cancel.is_cancelled() {
                    return self.cancelled(message, state).await;
                }
                match fragments.next().now_or_never() {
                    None => break,
                    Some(None) => break 'stream,
                    Some(Some(Ok(fragment))) => state.push(&fragment),
                    Some(Some(Err(e))) => return self.fail(message, state, e).await,
                }
            }

            if !state.has_pending() && !state.saturated() {
                continue;
            }

            // One edit per interval for as long as text keeps arriving.
            loop {
                if state.has_pending() {
                    self.flush(message, &mut state).await;
                }
                state.pulled = 0;

                let deadline = Instant::now() + self.interval;
                let mut ended = false;
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled(message, state).await,
                        _ = tokio::time::sleep_until(deadline) => break,
                        item = fragments.next(), if !ended && !state.saturated() => match item {
                            None => ended = true,
                            Some(Ok(fragment)) => state.push(&fragment),
                            Some(Err(e)) => return self.fail(message, state, e).await,
                        },
                    }
                }
                if ended {
                    break 'stream;
                }
                if !state.has_pending() && !state.saturated() {
                    break;
                }
            }
        }

        if state.has_pending() {
            self.flush(message, &mut state).await;
        }

        if state.reply.trim().is_empty() {
            let notice = format!("{} {}", self.mention, NO_VALID_RESPONSE);
            self.publish(message, &notice).await;
            info!("Stream produced no visible text");
            return state.report(RenderOutcome::Empty);
        }

        debug!(
            edits = state.edits,
            chars = state.reply.chars().count(),
            "Stream render completed"
        );
        state.report(RenderOutcome::Completed)
    }

    fn content(&self, reply: &str) -> String {
        fit_message(&format!("{}\n{}", self.mention, reply))
    }

    async fn flush<M: EditableMessage + ?Sized>(&self, message: &M, state: &mut RenderState) {
        let content = self.content(&state.reply);
        if self.publish(message, &content).await {
            state.edits += 1;
        }
        state.buffer.clear();
        state.buffered_chars = 0;
    }

    async fn fail<M: EditableMessage + ?Sized>(
        &self,
        message: &M,
        state: RenderState,
        error: anyhow::Error,
    ) -> RenderReport {
        warn!("Completion stream failed: {:#}", error);
        let notice = if state.reply.trim().is_empty() {
            format!("{} 生成回應時發生錯誤: {}", self.mention, error)
        } else {
            fit_message(&format!(
                "{}\n{}\n\n⚠️ 回應中斷: {}",
                self.mention, state.reply, error
            ))
        };
        self.publish(message, &notice).await;
        state.report(RenderOutcome::Failed)
    }

    /// Text already received is still published before giving up.
    async fn cancelled<M: EditableMessage + ?Sized>(
        &self,
        message: &M,
        mut state: RenderState,
    ) -> RenderReport {
        if state.has_pending() {
            self.flush(message, &mut state).await;
        }
        info!(edits = state.edits, "Stream render cancelled");
        state.report(RenderOutcome::Cancelled)
    }

    /// One retry, then the update is dropped.
    async fn publish<M: EditableMessage + ?Sized>(&self, message: &M, content: &str) -> bool {
        for attempt in 1..=2 {
            match message.edit(content).await {
                Ok(()) => return true,
                Err(e) => warn!(attempt, "Message edit failed: {:#}", e),
            }
        }
        false
    }
}

/// Truncate to the Discord message limit, counting characters.
pub fn fit_message(content: &str) -> String {
    if content.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(DISCORD_MESSAGE_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Mutex;

    const MENTION: &str = "<@42>";

    #[derive(Default)]
    struct RecordingMessage {
        edits: Mutex<Vec<String>>,
        failures_left: Mutex<usize>,
    }

    impl RecordingMessage {
        fn failing(times: usize) -> Self {
            Self {
                edits: Mutex::new(Vec::new()),
                failures_left: Mutex::new(times),
            }
        }

        fn edits(&self) -> Vec<String> {
            self.edits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EditableMessage for RecordingMessage {
        async fn edit(&self, content: &str) -> anyhow::Result<()> {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("429 Too Many Requests");
            }
            self.edits.lock().unwrap().push(content.to_string());
            Ok(())
        }
    }

    fn instant(fragments: &[&str]) -> impl Stream<Item = anyhow::Result<String>> {
        let owned: Vec<anyhow::Result<String>> =
            fragments.iter().map(|f| Ok(f.to_string())).collect();
        stream::iter(owned)
    }

    fn delayed(
        items: Vec<(u64, anyhow::Result<String>)>,
    ) -> impl Stream<Item = anyhow::Result<String>> {
        stream::iter(items).then(|(delay_ms, item)| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            item
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_fragments_coalesce_into_one_edit() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(5));
        let message = RecordingMessage::default();

        let report = renderer
            .render(
                instant(&["Hel", "lo, ", "world!"]),
                &message,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(message.edits(), vec!["<@42>\nHello, world!".to_string()]);
        assert_eq!(report.outcome, RenderOutcome::Completed);
        assert_eq!(report.edits, 1);
        assert_eq!(report.reply, "Hello, world!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_only_stream_shows_notice() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();

        let report = renderer
            .render(instant(&["   ", ""]), &message, &CancellationToken::new())
            .await;

        assert_eq!(
            message.edits(),
            vec!["<@42> 無有效回應，請嘗試其他提示。".to_string()]
        );
        assert_eq!(report.outcome, RenderOutcome::Empty);
        assert_eq!(report.edits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_stream_shows_notice() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();

        let report = renderer
            .render(instant(&[]), &message, &CancellationToken::new())
            .await;

        assert_eq!(message.edits().len(), 1);
        assert_eq!(report.outcome, RenderOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_fragments_are_throttled() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();
        let words: Vec<String> = (0..20).map(|i| format!("w{} ", i)).collect();
        let items = words.iter().map(|w| (100, Ok(w.clone()))).collect();

        let report = renderer
            .render(delayed(items), &message, &CancellationToken::new())
            .await;

        let edits = message.edits();
        assert!(!edits.is_empty());
        assert!(edits.len() < words.len(), "got {} edits", edits.len());
        assert_eq!(edits.last().unwrap(), &format!("<@42>\n{}", words.concat()));
        assert_eq!(report.edits, edits.len());
        assert_eq!(report.outcome, RenderOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_respect_interval() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(2));
        let message = RecordingMessage::default();
        let items = (0..30).map(|_| (100, Ok("x".to_string()))).collect();

        let started = Instant::now();
        renderer
            .render(delayed(items), &message, &CancellationToken::new())
            .await;

        // Fragments span 3s; edits land at roughly 0s, 2s and 4s.
        assert_eq!(message.edits().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_buffer_flushed_once() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();
        let items = vec![(0, Ok("Hello".to_string())), (500, Ok(" there".to_string()))];

        let report = renderer
            .render(delayed(items), &message, &CancellationToken::new())
            .await;

        assert_eq!(
            message.edits(),
            vec!["<@42>\nHello".to_string(), "<@42>\nHello there".to_string()]
        );
        assert_eq!(report.edits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_after_flushes_edits_notice() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();
        let items = vec![
            (0, Ok("first ".to_string())),
            (2000, Ok("second".to_string())),
            (2000, Err(anyhow::anyhow!("connection reset"))),
        ];

        let report = renderer
            .render(delayed(items), &message, &CancellationToken::new())
            .await;

        let edits = message.edits();
        assert_eq!(edits.len(), 3);
        assert_eq!(edits[0], "<@42>\nfirst ");
        assert_eq!(edits[1], "<@42>\nfirst second");
        assert!(edits[2].contains("connection reset"));
        assert!(edits[2].contains("first second"));
        assert_eq!(report.outcome, RenderOutcome::Failed);
        assert_eq!(report.edits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_before_any_text() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();
        let items = vec![(0, Err(anyhow::anyhow!("401 Unauthorized")))];

        let report = renderer
            .render(delayed(items), &message, &CancellationToken::new())
            .await;

        assert_eq!(
            message.edits(),
            vec!["<@42> 生成回應時發生錯誤: 401 Unauthorized".to_string()]
        );
        assert_eq!(report.outcome, RenderOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_failure_is_retried_once() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::failing(1);

        let report = renderer
            .render(instant(&["hi"]), &message, &CancellationToken::new())
            .await;

        assert_eq!(message.edits(), vec!["<@42>\nhi".to_string()]);
        assert_eq!(report.edits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_edit_failure_is_absorbed() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::failing(usize::MAX);

        let report = renderer
            .render(instant(&["hi"]), &message, &CancellationToken::new())
            .await;

        assert!(message.edits().is_empty());
        assert_eq!(report.outcome, RenderOutcome::Completed);
        assert_eq!(report.edits, 0);
        assert_eq!(report.reply, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_render() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();
        let cancel = CancellationToken::new();
        let fragments = instant(&["partial"]).chain(stream::pending());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let report = renderer.render(fragments, &message, &cancel).await;

        assert_eq!(report.outcome, RenderOutcome::Cancelled);
        assert_eq!(message.edits(), vec!["<@42>\npartial".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_buffered_during_interval_is_shown_before_next_fragment() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = Arc::new(RecordingMessage::default());
        let cancel = CancellationToken::new();
        let items = vec![
            (0, Ok("a".to_string())),
            (500, Ok("b".to_string())),
            (30_000, Ok("c".to_string())),
        ];

        let task = {
            let message = message.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { renderer.render(delayed(items), &*message, &cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            message.edits(),
            vec!["<@42>\na".to_string(), "<@42>\nab".to_string()]
        );

        let report = task.await.unwrap();
        assert_eq!(report.outcome, RenderOutcome::Completed);
        assert_eq!(report.edits, 3);
        assert_eq!(message.edits().last().unwrap(), "<@42>\nabc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_publishes_buffered_text() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_secs(1));
        let message = RecordingMessage::default();
        let cancel = CancellationToken::new();
        let items = vec![(0, Ok("a".to_string())), (500, Ok("b".to_string()))];
        let fragments = delayed(items).chain(stream::pending());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            trigger.cancel();
        });

        let report = renderer.render(fragments, &message, &cancel).await;

        assert_eq!(report.outcome, RenderOutcome::Cancelled);
        assert_eq!(
            message.edits(),
            vec!["<@42>\na".to_string(), "<@42>\nab".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_endless_ready_stream_is_throttled_and_cancellable() {
        let renderer = StreamRenderer::new(MENTION, Duration::from_millis(100));
        let message = RecordingMessage::default();
        let cancel = CancellationToken::new();
        let fragments = stream::repeat_with(|| Ok("x".to_string()));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = renderer.render(fragments, &message, &cancel).await;

        assert_eq!(report.outcome, RenderOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
        let edits = message.edits();
        assert!(edits.len() >= 10, "got {} edits", edits.len());
        assert!(edits.len() <= 20, "got {} edits", edits.len());
        assert!(edits
            .iter()
            .all(|e| e.chars().count() <= DISCORD_MESSAGE_LIMIT));
    }

    #[test]
    fn test_fit_message_truncates_by_chars() {
        let long = "字".repeat(DISCORD_MESSAGE_LIMIT + 10);
        let fitted = fit_message(&long);
        assert_eq!(fitted.chars().count(), DISCORD_MESSAGE_LIMIT);
        assert!(fitted.ends_with('…'));

        assert_eq!(fit_message("short"), "short");
    }
}
