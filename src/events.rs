use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use crate::{
    manager::PlayerManager,
    model::gateway::{EndReason, WebSocketClosed},
    voice::Notifier,
};

/// Everything a node reports, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    NodeConnected { node: u8 },
    NodeDisconnected { node: u8 },
    NodeError { node: u8, message: String },
    Track(TrackEvent),
}

/// Track lifecycle event for one guild, passed through from the node as is.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEvent {
    pub guild: GuildId,
    /// Encoded track the event refers to.
    pub track: String,
    pub kind: TrackEventKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackEventKind {
    Start,
    End { reason: EndReason },
    Error { reason: String },
    Stuck { threshold_ms: u64 },
    VoiceClosed(WebSocketClosed),
}

/// User facing message produced by a player transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    NowPlaying { title: String },
    TrackFailed { title: String, reason: String, queue_finished: bool },
    TrackStuck { title: String, threshold_ms: u64, queue_finished: bool },
    QueueFinished,
    /// The node refused the next track; `previous` is the notice of the event that led there.
    PlaybackHalted { title: String, previous: Option<Box<Notice>> },
}

fn next_step(queue_finished: bool) -> &'static str {
    if queue_finished {
        "The queue is finished, leaving the voice channel."
    } else {
        "Skipping to the next track."
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NowPlaying { title } => write!(f, "🎵 Now playing: **{}**", title),
            Notice::TrackFailed { title, reason, queue_finished } => write!(
                f,
                "⚠️ Could not play **{}** ({}). {}",
                title,
                reason,
                next_step(*queue_finished)
            ),
            Notice::TrackStuck { title, threshold_ms, queue_finished } => write!(
                f,
                "⚠️ **{}** got stuck for {}ms. {}",
                title,
                threshold_ms,
                next_step(*queue_finished)
            ),
            Notice::QueueFinished => write!(f, "✅ The queue is finished, leaving the voice channel."),
            Notice::PlaybackHalted { title, previous } => {
                if let Some(previous) = previous {
                    write!(f, "{} ", previous)?;
                }

                write!(
                    f,
                    "⏸️ Could not start **{}**, the audio node is unavailable. Queue another track to retry.",
                    title
                )
            },
        }
    }
}

/// Routes node events to the owning guild player and posts the resulting notice.
pub struct Dispatcher {
    manager: Arc<PlayerManager>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(manager: Arc<PlayerManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self { manager, notifier }
    }

    /// Consumes events one at a time until every sender is gone.
    ///
    /// Events are applied strictly in arrival order, so each guild sees its own events FIFO.
    pub async fn run(self, mut events: UnboundedReceiver<NodeEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }

        debug!("Node event channel closed, dispatcher exiting");
    }

    pub async fn dispatch(&self, event: NodeEvent) {
        match event {
            NodeEvent::NodeConnected { node } => info!("Connected to audio node id {}", node),
            NodeEvent::NodeDisconnected { node } => warn!("Audio node id {} disconnected", node),
            NodeEvent::NodeError { node, message } => error!("Audio node id {} error: {}", node, message),
            NodeEvent::Track(event) => {
                if let TrackEventKind::VoiceClosed(closed) = &event.kind {
                    warn!(
                        "Voice socket closed for guild {}: {} (code {}, by remote: {})",
                        event.guild, closed.reason, closed.code, closed.by_remote
                    );
                }

                if let TrackEventKind::Error { reason } = &event.kind {
                    error!("Track error on guild {}: {}", event.guild, reason);
                }

                if let TrackEventKind::Stuck { threshold_ms } = &event.kind {
                    error!("Track stuck on guild {} for {}ms", event.guild, threshold_ms);
                }

                if let Some((channel, notice)) = self.manager.apply_event(&event).await {
                    self.notify(channel, notice).await;
                }
            }
        }
    }

    async fn notify(&self, channel: ChannelId, notice: Notice) {
        if let Err(why) = self.notifier.notify(channel, notice.to_string()).await {
            debug!("Skipping notification for channel {}: {}", channel, why);
        }
    }
}
