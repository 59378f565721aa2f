use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use crate::error::{NotifyError, VoiceError};

/// What the node needs to attach to a discord voice session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceConnectionInfo {
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

/// The chat gateway side of a voice session.
///
/// Whether the requesting user is in the channel is checked before a command gets here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync + 'static {
    /// Joins (or moves to) `channel`, returning the session details to forward to the node.
    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<VoiceConnectionInfo, VoiceError>;
    async fn leave(&self, guild: GuildId) -> Result<(), VoiceError>;
}

/// Posts a text message into a channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, channel: ChannelId, message: String) -> Result<(), NotifyError>;
}
