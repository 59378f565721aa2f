use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use crate::{
    events::{Notice, TrackEventKind},
    node::NodeLink,
};
use super::{queue::GuildQueue, track::TrackDescriptor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Voice session requested, nothing accepted by the node yet.
    Connecting,
    Playing,
    Paused,
}

/// What the manager must do after a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    None,
    /// Send a play instruction for this track.
    Play(TrackDescriptor),
    /// Tear the player down: destroy on the node, leave voice, drop the queue.
    Destroy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub notice: Option<Notice>,
    pub effect: Effect,
}

impl Transition {
    pub(crate) fn ignored() -> Self {
        Self { notice: None, effect: Effect::None }
    }
}

/// Per guild playback state, one per live voice session.
pub struct GuildPlayer {
    pub(crate) guild: GuildId,
    pub(crate) voice_channel: ChannelId,
    pub(crate) text_channel: ChannelId,
    pub(crate) status: PlaybackStatus,
    pub(crate) queue: GuildQueue,
    pub(crate) node: Arc<dyn NodeLink>,
    pub(crate) session: u64,
    pub(crate) destroyed: bool,
    // Track advanced past after an error or stuck event. Its trailing end event is dropped
    // until the next track starts, even when the same track is queued again right after.
    pub(crate) abandoned: Option<String>,
}

impl GuildPlayer {
    pub(crate) fn new(
        guild: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        node: Arc<dyn NodeLink>,
        session: u64,
    ) -> Self {
        Self {
            guild,
            voice_channel,
            text_channel,
            status: PlaybackStatus::Connecting,
            queue: GuildQueue::new(),
            node,
            session,
            destroyed: false,
            abandoned: None,
        }
    }

    fn is_current(&self, track: &str) -> bool {
        self.queue.current().map_or(false, |current| current.encoded == track)
    }

    /// Reconciles a node track event into the player.
    ///
    /// Events about anything other than the current track are stale and leave the player as is.
    pub(crate) fn apply(&mut self, track: &str, kind: &TrackEventKind) -> Transition {
        if matches!(kind, TrackEventKind::End { .. }) && self.abandoned.as_deref() == Some(track) {
            self.abandoned = None;

            return Transition::ignored();
        }

        if !self.is_current(track) {
            return Transition::ignored();
        }

        match kind {
            TrackEventKind::Start => {
                self.abandoned = None;

                if self.status == PlaybackStatus::Connecting {
                    self.status = PlaybackStatus::Playing;
                }

                let title = self.current_title();

                Transition {
                    notice: Some(Notice::NowPlaying { title }),
                    effect: Effect::None,
                }
            },
            TrackEventKind::End { reason } => {
                if reason.may_start_next() {
                    self.finish_current()
                } else {
                    Transition::ignored()
                }
            },
            TrackEventKind::Error { reason } => {
                let title = self.current_title();
                let (effect, queue_finished) = self.abandon(track);

                Transition {
                    notice: Some(Notice::TrackFailed { title, reason: reason.clone(), queue_finished }),
                    effect,
                }
            },
            TrackEventKind::Stuck { threshold_ms } => {
                let title = self.current_title();
                let (effect, queue_finished) = self.abandon(track);

                Transition {
                    notice: Some(Notice::TrackStuck { title, threshold_ms: *threshold_ms, queue_finished }),
                    effect,
                }
            },
            TrackEventKind::VoiceClosed(_) => Transition::ignored(),
        }
    }

    /// The current track is over, either naturally or skipped.
    pub(crate) fn finish_current(&mut self) -> Transition {
        let (effect, queue_finished) = self.advance();

        Transition {
            notice: queue_finished.then_some(Notice::QueueFinished),
            effect,
        }
    }

    fn abandon(&mut self, track: &str) -> (Effect, bool) {
        self.abandoned = Some(track.to_string());

        self.advance()
    }

    fn advance(&mut self) -> (Effect, bool) {
        self.queue.advance();

        match self.queue.current() {
            Some(next) => (Effect::Play(next.clone()), false),
            None => (Effect::Destroy, true),
        }
    }

    fn current_title(&self) -> String {
        self.queue.current()
            .map(|track| track.title.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            guild: self.guild,
            voice_channel: self.voice_channel,
            text_channel: self.text_channel,
            status: self.status,
            current: self.queue.current().cloned(),
            pending: self.queue.pending().cloned().collect(),
            node: self.node.id(),
        }
    }
}

/// Read only copy of a player's state.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSnapshot {
    pub guild: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
    pub status: PlaybackStatus,
    pub current: Option<TrackDescriptor>,
    pub pending: Vec<TrackDescriptor>,
    pub node: u8,
}
