use async_trait::async_trait;
use serenity::{
    cache::Cache,
    client::Context,
    http::{Http, HttpError},
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::Songbird;
use std::sync::Arc;
use crate::{
    error::{NotifyError, VoiceError},
    manager::PlayerManager,
    voice::{Notifier, VoiceConnectionInfo, VoiceGateway},
};

/// Where the bot sits relative to a user, as seen by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceLocationState {
    /// The bot is not connected to any VC
    ClientDisconnected,
    /// The message author is not connected to any VC
    UserDisconnected,
    /// Bot and message author are on the same VC
    OnSameChannel,
    /// Bot and message author are on different VC's
    OnDifferentChannel
}

pub fn voice_channel_of(cache: &Cache, guild: GuildId, user: UserId) -> Option<ChannelId> {
    cache
        .guild(guild)
        .and_then(|guild| guild.voice_states.get(&user).and_then(|state| state.channel_id))
}

pub fn is_on_same_vc(cache: impl AsRef<Cache>, guild: GuildId, user: UserId) -> VoiceLocationState {
    let cache = cache.as_ref();
    let bot_id = cache.current_user().id;

    let bot_channel = voice_channel_of(cache, guild, bot_id);
    let user_channel = voice_channel_of(cache, guild, user);

    match (bot_channel, user_channel) {
        (None, _) => VoiceLocationState::ClientDisconnected,
        (_, None) => VoiceLocationState::UserDisconnected,
        (Some(bot), Some(user)) if bot == user => VoiceLocationState::OnSameChannel,
        _ => VoiceLocationState::OnDifferentChannel,
    }
}

/// Gets the player manager stored in the client's data.
pub async fn player_manager(ctx: &Context) -> Option<Arc<PlayerManager>> {
    ctx.data.read().await.get::<PlayerManager>().cloned()
}

/// Voice sessions through songbird's gateway-only mode; audio is left to the node.
pub struct SongbirdGateway {
    songbird: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }

    pub async fn from_context(ctx: &Context) -> Option<Self> {
        songbird::get(ctx).await.map(Self::new)
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<VoiceConnectionInfo, VoiceError> {
        let (info, _call) = self.songbird
            .join_gateway(guild, channel)
            .await
            .map_err(VoiceError::new)?;

        Ok(VoiceConnectionInfo {
            session_id: info.session_id,
            token: info.token,
            endpoint: info.endpoint,
        })
    }

    async fn leave(&self, guild: GuildId) -> Result<(), VoiceError> {
        if self.songbird.get(guild).is_none() {
            return Ok(());
        }

        self.songbird.remove(guild).await.map_err(VoiceError::new)
    }
}

/// Posts notices as plain channel messages.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn notify(&self, channel: ChannelId, message: String) -> Result<(), NotifyError> {
        match channel.say(self.http.as_ref(), message).await {
            Ok(_) => Ok(()),
            Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response)))
                if response.status_code.as_u16() == 404 => Err(NotifyError::UnknownChannel(channel)),
            Err(why) => Err(NotifyError::Failed(why.to_string())),
        }
    }
}
