use serde::{
    Serialize,
    Deserialize
};
use serenity::model::id::UserId;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

/// Response of the node's `loadtracks` route.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tracks {
    #[serde(default)]
    pub playlist_info: PlaylistInfo,
    pub load_type: LoadType,
    #[serde(default)]
    pub tracks: Vec<Track>,
    pub exception: Option<Exception>
}

impl Tracks {
    pub fn empty(load_type: LoadType) -> Self {
        Self {
            playlist_info: PlaylistInfo::default(),
            load_type,
            tracks: Vec::new(),
            exception: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Track {
    pub track: String,
    pub info: Option<TrackInfo>
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub uri: String
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    /// The node sends `null` here for some faults.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct PlaylistInfo {
    pub name: Option<String>,
    #[serde(rename = "selectedTrack")]
    pub selected_track: Option<i64>
}

/// One playable item, as queued for a guild.
///
/// `encoded` is the node's opaque track blob; it is what play instructions carry and what
/// track events are matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub encoded: String,
    pub title: String,
    pub uri: Option<String>,
    pub author: Option<String>,
    pub duration: Option<Duration>,
    pub requester: UserId,
}

impl TrackDescriptor {
    pub fn from_track(track: Track, requester: UserId) -> Self {
        match track.info {
            Some(info) => Self {
                encoded: track.track,
                title: info.title,
                uri: Some(info.uri).filter(|uri| !uri.is_empty()),
                author: Some(info.author).filter(|author| !author.is_empty()),
                duration: if info.is_stream { None } else { Some(Duration::from_millis(info.length)) },
                requester,
            },
            None => Self {
                encoded: track.track,
                title: "Unknown title".to_string(),
                uri: None,
                author: None,
                duration: None,
                requester,
            }
        }
    }
}
