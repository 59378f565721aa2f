use serde::{Serialize, Deserialize};
use serde_aux::prelude::*;
use serenity::model::id::GuildId;
use std::num::NonZeroU64;
use crate::events::{TrackEvent, TrackEventKind};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GatewayEvent {
    pub op: String,
    #[serde(rename = "type")]
    pub event_type: Option<String>
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Cpu {
    pub cores: i64,
    #[serde(rename = "systemLoad")]
    pub system_load: f64,
    #[serde(rename = "lavalinkLoad")]
    pub lavalink_load: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrameStats {
    pub sent: i64,
    pub deficit: i64,
    pub nulled: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Memory {
    pub reservable: i64,
    pub used: i64,
    pub free: i64,
    pub allocated: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct State {
    #[serde(default)]
    pub position: u64,
    pub time: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stats {
    #[serde(rename = "playingPlayers")]
    pub playing_players: i64,
    pub memory: Memory,
    #[serde(rename = "frameStats")]
    pub frame_stats: Option<FrameStats>,
    pub players: i64,
    pub cpu: Cpu,
    pub uptime: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerUpdate {
    pub state: State,
    #[serde(rename = "guildId")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub guild_id: u64,
}

/// The voice connection between the node and discord was closed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WebSocketClosed {
    pub code: u16,
    pub reason: String,
    #[serde(rename = "byRemote")]
    pub by_remote: bool
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
    #[serde(other)]
    Unknown,
}

impl EndReason {
    /// Whether the next track in the queue should be started.
    pub fn may_start_next(self) -> bool {
        !matches!(self, EndReason::Replaced)
    }
}

#[derive(Debug, Deserialize)]
struct RawTrackEvent {
    #[serde(rename = "guildId")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    guild_id: u64,
    #[serde(default)]
    track: String,
    reason: Option<EndReason>,
    exception: Option<super::track::Exception>,
    error: Option<String>,
    #[serde(rename = "thresholdMs")]
    threshold_ms: Option<u64>,
}

/// A decoded text frame from the node.
#[derive(Debug)]
pub(crate) enum Inbound {
    Stats(Stats),
    PlayerUpdate(PlayerUpdate),
    Track(TrackEvent),
    Ignored,
}

pub(crate) fn decode(text: &str) -> serde_json::Result<Inbound> {
    let head = serde_json::from_str::<GatewayEvent>(text)?;

    let inbound = match head.op.as_str() {
        "stats" => Inbound::Stats(serde_json::from_str(text)?),
        "playerUpdate" => Inbound::PlayerUpdate(serde_json::from_str(text)?),
        "event" => {
            let raw = serde_json::from_str::<RawTrackEvent>(text)?;

            let guild = match NonZeroU64::new(raw.guild_id) {
                Some(id) => GuildId::from(id),
                None => return Ok(Inbound::Ignored),
            };

            let kind = match head.event_type.as_deref() {
                Some("TrackStartEvent") => TrackEventKind::Start,
                Some("TrackEndEvent") => TrackEventKind::End {
                    reason: raw.reason.unwrap_or(EndReason::Unknown),
                },
                Some("TrackExceptionEvent") => TrackEventKind::Error {
                    reason: raw.exception
                        .and_then(|e| e.message)
                        .or(raw.error)
                        .unwrap_or_else(|| "unknown error".to_string()),
                },
                Some("TrackStuckEvent") => TrackEventKind::Stuck {
                    threshold_ms: raw.threshold_ms.unwrap_or_default(),
                },
                Some("WebSocketClosedEvent") => {
                    let closed = serde_json::from_str::<WebSocketClosed>(text)?;
                    TrackEventKind::VoiceClosed(closed)
                },
                _ => return Ok(Inbound::Ignored),
            };

            Inbound::Track(TrackEvent { guild, track: raw.track, kind })
        },
        _ => Inbound::Ignored,
    };

    Ok(inbound)
}
