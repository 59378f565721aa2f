use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use crate::{
    cluster::Cluster,
    error::{ManagerError, ManagerResult},
    events::{Notice, TrackEvent},
    model::{
        events::{Event, VoiceUpdate},
        player::{Effect, GuildPlayer, PlaybackStatus, PlayerSnapshot},
        track::TrackDescriptor,
        Instruction,
    },
    node::NodeLink,
    resolver::{Resolution, Resolver},
    voice::{VoiceConnectionInfo, VoiceGateway},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyHere,
    Moved,
}

impl fmt::Display for JoinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinOutcome::Joined => write!(f, "👋 Joined your voice channel."),
            JoinOutcome::AlreadyHere => write!(f, "I'm already in your voice channel."),
            JoinOutcome::Moved => write!(f, "🔀 Moved to your voice channel."),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// `started` is set when the track went straight to the node instead of waiting in the queue.
    Queued { title: String, started: bool },
    QueuedMany { count: usize, started: bool },
    /// The player was stopped while the query was being resolved.
    Discarded,
}

impl fmt::Display for PlayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayOutcome::Queued { title, started: true } => write!(f, "▶️ Playing **{}**", title),
            PlayOutcome::Queued { title, started: false } => write!(f, "➕ Added **{}** to the queue", title),
            PlayOutcome::QueuedMany { count, .. } => write!(f, "➕ Added **{}** tracks to the queue", count),
            PlayOutcome::Discarded => write!(f, "The player was stopped, nothing was added."),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped { next: String },
    QueueFinished,
}

impl fmt::Display for SkipOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipOutcome::Skipped { next } => write!(f, "⏭️ Skipped. Up next: **{}**", next),
            SkipOutcome::QueueFinished => write!(f, "⏭️ Skipped. The queue is finished, leaving the voice channel."),
        }
    }
}

type PlayerHandle = Arc<Mutex<GuildPlayer>>;

/// Plays of one guild that are still resolving. `stop` cancels all of them at once.
struct PendingPlays {
    id: u64,
    token: CancellationToken,
    count: usize,
}

/// Registration of one resolving play, released on drop.
struct PlayTicket<'a> {
    pending: &'a DashMap<GuildId, PendingPlays>,
    guild: GuildId,
    id: u64,
    token: CancellationToken,
}

impl PlayTicket<'_> {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PlayTicket<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.pending.entry(self.guild) {
            if entry.get().id != self.id {
                return;
            }

            let plays = entry.get_mut();
            plays.count = plays.count.saturating_sub(1);

            if plays.count == 0 {
                entry.remove();
            }
        }
    }
}

/// Owns every guild player and runs the commands against them.
///
/// A guild's entry in `players` is only ever replaced after the previous player was marked
/// destroyed, and only while holding that player's lock.
pub struct PlayerManager {
    cluster: Arc<Cluster>,
    resolver: Resolver,
    voice: Arc<dyn VoiceGateway>,
    players: DashMap<GuildId, PlayerHandle>,
    pending: DashMap<GuildId, PendingPlays>,
    sessions: AtomicU64,
}

impl PlayerManager {
    pub fn new(cluster: Arc<Cluster>, resolver: Resolver, voice: Arc<dyn VoiceGateway>) -> Self {
        Self {
            cluster,
            resolver,
            voice,
            players: DashMap::new(),
            pending: DashMap::new(),
            sessions: AtomicU64::new(1),
        }
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    fn player(&self, guild: GuildId) -> Option<PlayerHandle> {
        self.players.get(&guild).map(|item| Arc::clone(item.value()))
    }

    fn ticket(&self, guild: GuildId) -> PlayTicket<'_> {
        let mut plays = self.pending.entry(guild).or_insert_with(|| PendingPlays {
            id: self.sessions.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            count: 0,
        });
        plays.count += 1;

        PlayTicket {
            pending: &self.pending,
            guild,
            id: plays.id,
            token: plays.token.clone(),
        }
    }

    async fn locked(&self, guild: GuildId) -> ManagerResult<OwnedMutexGuard<GuildPlayer>> {
        let player = self.player(guild)
            .ok_or(ManagerError::PlayerNotFound)?
            .lock_owned()
            .await;

        if player.destroyed {
            return Err(ManagerError::PlayerNotFound);
        }

        Ok(player)
    }

    pub async fn join(
        &self,
        guild: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        requester: UserId,
    ) -> ManagerResult<JoinOutcome> {
        let (player, outcome) = self.acquire(guild, voice_channel, text_channel, true).await?;

        debug!(
            "Join for guild {} requested by {}: {:?} (session {})",
            guild, requester, outcome, player.session
        );

        Ok(outcome)
    }

    /// Returns the locked player of `guild`, creating and connecting it when there is none.
    async fn acquire(
        &self,
        guild: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        allow_move: bool,
    ) -> ManagerResult<(OwnedMutexGuard<GuildPlayer>, JoinOutcome)> {
        loop {
            if let Some(existing) = self.player(guild) {
                let mut player = existing.lock_owned().await;

                if player.destroyed {
                    continue;
                }

                if player.voice_channel == voice_channel {
                    return Ok((player, JoinOutcome::AlreadyHere));
                }

                if !allow_move {
                    return Err(ManagerError::VoiceChannelMismatch {
                        expected: player.voice_channel,
                        actual: voice_channel,
                    });
                }

                self.connect_voice(&player.node, guild, voice_channel).await?;
                player.voice_channel = voice_channel;
                player.text_channel = text_channel;

                info!("Moved player of guild {} to channel {}", guild, voice_channel);

                return Ok((player, JoinOutcome::Moved));
            }

            let node = self.cluster.best()?;
            let session = self.sessions.fetch_add(1, Ordering::Relaxed);
            let player = Arc::new(Mutex::new(GuildPlayer::new(guild, voice_channel, text_channel, node, session)));
            let mut guard = Arc::clone(&player).lock_owned().await;

            let inserted = match self.players.entry(guild) {
                Entry::Occupied(_) => false,
                Entry::Vacant(entry) => {
                    entry.insert(player);
                    true
                }
            };

            if !inserted {
                trace!("Lost player creation race for guild {}, retrying", guild);
                continue;
            }

            if let Err(why) = self.connect_voice(&guard.node, guild, voice_channel).await {
                guard.destroyed = true;
                self.players.remove(&guild);

                if let Err(leave) = self.voice.leave(guild).await {
                    warn!("Failed to leave voice in guild {} after a failed join: {}", guild, leave);
                }

                return Err(why);
            }

            info!("Created player for guild {} on node {} (session {})", guild, guard.node.id(), session);

            return Ok((guard, JoinOutcome::Joined));
        }
    }

    async fn connect_voice(&self, node: &Arc<dyn NodeLink>, guild: GuildId, channel: ChannelId) -> ManagerResult<()> {
        let info = self.voice.join(guild, channel).await?;

        node.send(guild, voice_update(guild, info)).await?;

        Ok(())
    }

    /// Resolves `query` and queues the result, joining the voice channel first when needed.
    pub async fn play(
        &self,
        guild: GuildId,
        query: &str,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        requester: UserId,
    ) -> ManagerResult<PlayOutcome> {
        let ticket = self.ticket(guild);

        let existing = match self.locked(guild).await {
            Ok(player) => {
                check_channel(&player, voice_channel)?;

                Some((Arc::clone(&player.node), player.session))
            },
            Err(_) => None,
        };

        let node = match &existing {
            Some((node, _)) => Arc::clone(node),
            None => self.cluster.best()?,
        };

        let tracks = match self.resolver.resolve(node.as_ref(), query, requester).await {
            Resolution::Found { tracks, .. } if !tracks.is_empty() => tracks,
            Resolution::Found { .. } | Resolution::NoMatches => return Err(ManagerError::NoMatches),
            Resolution::Failed { cause } => {
                warn!("Failed to resolve {:?} for guild {}: {}", query, guild, cause);

                return Err(ManagerError::Resolution(cause));
            },
        };

        if ticket.is_cancelled() {
            debug!("Play on guild {} was stopped during resolve, discarding {} tracks", guild, tracks.len());

            return Ok(PlayOutcome::Discarded);
        }

        let mut player = match existing {
            Some((_, session)) => {
                let player = match self.locked(guild).await {
                    Ok(player) if player.session == session => player,
                    _ => {
                        debug!("Player of guild {} went away during resolve, discarding {} tracks", guild, tracks.len());

                        return Ok(PlayOutcome::Discarded);
                    },
                };

                check_channel(&player, voice_channel)?;

                player
            },
            None => self.acquire(guild, voice_channel, text_channel, false).await?.0,
        };

        if ticket.is_cancelled() {
            self.destroy(&mut player).await;

            return Ok(PlayOutcome::Discarded);
        }

        self.enqueue_into(&mut player, tracks).await
    }

    /// Queues already resolved tracks on an existing player.
    pub async fn enqueue(
        &self,
        guild: GuildId,
        voice_channel: ChannelId,
        tracks: Vec<TrackDescriptor>,
    ) -> ManagerResult<PlayOutcome> {
        let mut player = self.locked(guild).await?;

        check_channel(&player, voice_channel)?;

        self.enqueue_into(&mut player, tracks).await
    }

    async fn enqueue_into(&self, player: &mut GuildPlayer, tracks: Vec<TrackDescriptor>) -> ManagerResult<PlayOutcome> {
        let count = tracks.len();
        let title = match tracks.first() {
            Some(first) => first.title.clone(),
            None => return Err(ManagerError::NoMatches),
        };
        let idle = player.queue.current().is_none();
        // A halted player still holds the track the node refused; that one goes first.
        let started = idle && player.queue.is_empty();

        if idle {
            let head = player.queue.peek().unwrap_or(&tracks[0]).clone();

            player.node.send(player.guild, Instruction::play(&head)).await?;
            player.queue.append(tracks);
            player.queue.advance();
            player.status = PlaybackStatus::Playing;
        } else {
            player.queue.append(tracks);
        }

        debug!("Queued {} tracks on guild {}, {} pending", count, player.guild, player.queue.size());

        Ok(if count == 1 {
            PlayOutcome::Queued { title, started }
        } else {
            PlayOutcome::QueuedMany { count, started }
        })
    }

    /// Ends the current track the same way a natural track end does.
    pub async fn skip(&self, guild: GuildId) -> ManagerResult<SkipOutcome> {
        let mut player = self.locked(guild).await?;

        if player.queue.current().is_none() {
            return Err(ManagerError::NothingPlaying);
        }

        let previous = player.queue.clone();

        match player.finish_current().effect {
            Effect::Play(next) => {
                if let Err(why) = player.node.send(guild, Instruction::play(&next)).await {
                    player.queue = previous;

                    return Err(why.into());
                }

                Ok(SkipOutcome::Skipped { next: next.title })
            },
            _ => {
                self.destroy(&mut player).await;

                Ok(SkipOutcome::QueueFinished)
            },
        }
    }

    /// Destroys the player right away, whatever is queued, and discards plays still resolving.
    pub async fn stop(&self, guild: GuildId) -> ManagerResult<()> {
        let cancelled = match self.pending.remove(&guild) {
            Some((_, plays)) => {
                plays.token.cancel();
                true
            },
            None => false,
        };

        match self.locked(guild).await {
            Ok(mut player) => {
                self.destroy(&mut player).await;

                Ok(())
            },
            Err(_) if cancelled => {
                debug!("Cancelled resolving plays of guild {}", guild);

                Ok(())
            },
            Err(why) => Err(why),
        }
    }

    pub async fn pause(&self, guild: GuildId) -> ManagerResult<()> {
        self.set_paused(guild, true).await
    }

    pub async fn resume(&self, guild: GuildId) -> ManagerResult<()> {
        self.set_paused(guild, false).await
    }

    async fn set_paused(&self, guild: GuildId, pause: bool) -> ManagerResult<()> {
        let mut player = self.locked(guild).await?;

        if player.queue.current().is_none() {
            return Err(ManagerError::NothingPlaying);
        }

        player.node.send(guild, Instruction::pause(pause)).await?;
        player.status = if pause { PlaybackStatus::Paused } else { PlaybackStatus::Playing };

        Ok(())
    }

    pub async fn snapshot(&self, guild: GuildId) -> Option<PlayerSnapshot> {
        self.locked(guild).await.ok().map(|player| player.snapshot())
    }

    /// Applies a node track event, returning the notice to post and where to post it.
    ///
    /// Events for guilds without a player are dropped.
    pub async fn apply_event(&self, event: &TrackEvent) -> Option<(ChannelId, Notice)> {
        let mut player = match self.locked(event.guild).await {
            Ok(player) => player,
            Err(_) => {
                trace!("Dropping {:?} event for guild {} without a player", event.kind, event.guild);

                return None;
            }
        };

        let transition = player.apply(&event.track, &event.kind);

        match transition.effect {
            Effect::None => {},
            Effect::Play(next) => {
                if let Err(why) = player.node.send(event.guild, Instruction::play(&next)).await {
                    error!("Failed to start {:?} on guild {}: {}", next.title, event.guild, why);

                    player.queue.rewind();
                    player.status = PlaybackStatus::Connecting;

                    let notice = Notice::PlaybackHalted {
                        title: next.title,
                        previous: transition.notice.map(Box::new),
                    };

                    return Some((player.text_channel, notice));
                }
            },
            Effect::Destroy => self.destroy(&mut player).await,
        }

        transition.notice.map(|notice| (player.text_channel, notice))
    }

    /// Tears the player down. Node and voice cleanup are best effort.
    async fn destroy(&self, player: &mut GuildPlayer) {
        player.destroyed = true;
        player.queue.clear();
        self.players.remove(&player.guild);

        if let Err(why) = player.node.send(player.guild, Instruction::Destroy).await {
            warn!("Failed to destroy node player of guild {}: {}", player.guild, why);
        }

        if let Err(why) = self.voice.leave(player.guild).await {
            warn!("Failed to leave voice in guild {}: {}", player.guild, why);
        }

        info!("Destroyed player of guild {} (session {})", player.guild, player.session);
    }
}

impl typemap_rev::TypeMapKey for PlayerManager {
    type Value = Arc<PlayerManager>;
}

fn check_channel(player: &GuildPlayer, voice_channel: ChannelId) -> ManagerResult<()> {
    if player.voice_channel != voice_channel {
        return Err(ManagerError::VoiceChannelMismatch {
            expected: player.voice_channel,
            actual: voice_channel,
        });
    }

    Ok(())
}

fn voice_update(guild: GuildId, info: VoiceConnectionInfo) -> Instruction {
    Instruction::VoiceUpdate(VoiceUpdate {
        session_id: info.session_id,
        event: Event {
            token: info.token,
            endpoint: info.endpoint,
            guild_id: guild.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ResolveError, VoiceError},
        events::TrackEventKind,
        model::{gateway::EndReason, track::LoadType},
        node::testing::{loaded, RecordingLink},
        resolver::{
            testing::{item, FixedCatalog},
            CatalogEntry, CatalogProvider,
        },
        voice::{testing::voice_info, MockVoiceGateway},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn voice() -> ChannelId {
        ChannelId::new(10)
    }

    fn text() -> ChannelId {
        ChannelId::new(20)
    }

    fn user() -> UserId {
        UserId::new(5)
    }

    fn track(name: &str) -> TrackDescriptor {
        TrackDescriptor {
            encoded: format!("enc-{}", name),
            title: name.to_string(),
            uri: None,
            author: None,
            duration: None,
            requester: user(),
        }
    }

    fn tracks(names: &[&str]) -> Vec<TrackDescriptor> {
        names.iter().map(|n| track(n)).collect()
    }

    fn accepting() -> MockVoiceGateway {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().returning(|guild, _| Ok(voice_info(guild)));
        gateway.expect_leave().returning(|_| Ok(()));
        gateway
    }

    fn setup(resolver: Resolver, gateway: MockVoiceGateway) -> (Arc<PlayerManager>, Arc<RecordingLink>) {
        let link = Arc::new(RecordingLink::new(1));
        let cluster = Arc::new(Cluster::new());
        cluster.add(link.clone()).unwrap();

        (Arc::new(PlayerManager::new(cluster, resolver, Arc::new(gateway))), link)
    }

    fn end(name: &str) -> TrackEvent {
        TrackEvent {
            guild: guild(),
            track: format!("enc-{}", name),
            kind: TrackEventKind::End { reason: EndReason::Finished },
        }
    }

    /// Catalog that blocks every lookup until released.
    struct GatedCatalog {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl CatalogProvider for GatedCatalog {
        async fn lookup(&self, _url: &str) -> Result<CatalogEntry, ResolveError> {
            self.entered.notify_one();
            self.release.notified().await;

            Ok(CatalogEntry::Track(item("Get Lucky", "Daft Punk")))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_create_one_player() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(1).returning(|guild, _| Ok(voice_info(guild)));
        let (manager, link) = setup(Resolver::new(), gateway);

        let joins = (0..8).map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.join(guild(), voice(), text(), user()).await })
        });

        let outcomes = futures::future::join_all(joins)
            .await
            .into_iter()
            .map(|result| result.unwrap().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(outcomes.iter().filter(|o| **o == JoinOutcome::Joined).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == JoinOutcome::AlreadyHere).count(), 7);
        assert_eq!(manager.players.len(), 1);
        assert_eq!(link.ops(), vec!["voiceUpdate"]);
    }

    #[tokio::test]
    async fn join_forwards_voice_session_to_node() {
        let (manager, link) = setup(Resolver::new(), accepting());

        assert_eq!(manager.join(guild(), voice(), text(), user()).await.unwrap(), JoinOutcome::Joined);

        let sent = link.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, guild());
        assert!(matches!(
            &sent[0].1,
            Instruction::VoiceUpdate(update) if update.session_id == "session-1" && update.event.guild_id == "1"
        ));

        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.status, PlaybackStatus::Connecting);
        assert_eq!(snapshot.node, 1);
    }

    #[tokio::test]
    async fn repeated_join_to_same_channel_sends_nothing() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        link.clear();

        let outcome = manager.join(guild(), voice(), text(), user()).await.unwrap();

        assert_eq!(outcome, JoinOutcome::AlreadyHere);
        assert!(link.sent().is_empty());
        assert_eq!(manager.players.len(), 1);
    }

    #[tokio::test]
    async fn join_to_other_channel_moves_and_keeps_status() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        manager.enqueue(guild(), voice(), tracks(&["a"])).await.unwrap();
        link.clear();

        let outcome = manager.join(guild(), ChannelId::new(11), ChannelId::new(21), user()).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Moved);
        assert_eq!(link.ops(), vec!["voiceUpdate"]);
        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.voice_channel, ChannelId::new(11));
        assert_eq!(snapshot.text_channel, ChannelId::new(21));
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(snapshot.current, Some(track("a")));
    }

    #[tokio::test]
    async fn failed_voice_join_leaves_no_player() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(1).returning(|_, _| Err(VoiceError::new("missing permissions")));
        gateway.expect_leave().returning(|_| Ok(()));
        let (manager, link) = setup(Resolver::new(), gateway);

        let result = manager.join(guild(), voice(), text(), user()).await;

        assert!(matches!(result, Err(ManagerError::Voice(_))));
        assert!(manager.snapshot(guild()).await.is_none());
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn join_without_connected_node_fails() {
        let (manager, link) = setup(Resolver::new(), MockVoiceGateway::new());
        link.set_available(false);

        let err = manager.join(guild(), voice(), text(), user()).await.unwrap_err();

        assert!(err.is_node_unavailable());
        assert!(manager.snapshot(guild()).await.is_none());
    }

    #[tokio::test]
    async fn queue_plays_through_then_destroys() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(1).returning(|guild, _| Ok(voice_info(guild)));
        gateway.expect_leave().times(1).returning(|_| Ok(()));
        let (manager, link) = setup(Resolver::new(), gateway);

        manager.join(guild(), voice(), text(), user()).await.unwrap();
        let outcome = manager.enqueue(guild(), voice(), tracks(&["a", "b"])).await.unwrap();

        assert_eq!(outcome, PlayOutcome::QueuedMany { count: 2, started: true });
        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current, Some(track("a")));
        assert_eq!(snapshot.pending, vec![track("b")]);
        assert_eq!(link.plays(), vec!["enc-a".to_string()]);

        assert_eq!(manager.apply_event(&end("a")).await, None);
        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current, Some(track("b")));
        assert!(snapshot.pending.is_empty());
        assert_eq!(link.plays(), vec!["enc-a".to_string(), "enc-b".to_string()]);

        assert_eq!(manager.apply_event(&end("b")).await, Some((text(), Notice::QueueFinished)));
        assert!(manager.snapshot(guild()).await.is_none());
        assert_eq!(link.ops(), vec!["voiceUpdate", "play", "play", "destroy"]);
    }

    #[tokio::test]
    async fn enqueue_while_playing_only_appends() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        manager.enqueue(guild(), voice(), tracks(&["a"])).await.unwrap();
        link.clear();

        let outcome = manager.enqueue(guild(), voice(), tracks(&["b"])).await.unwrap();

        assert_eq!(outcome, PlayOutcome::Queued { title: "b".to_string(), started: false });
        assert!(link.sent().is_empty());
        assert_eq!(manager.snapshot(guild()).await.unwrap().pending, vec![track("b")]);
    }

    #[tokio::test]
    async fn commands_from_other_channel_are_rejected() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        link.clear();

        let result = manager.enqueue(guild(), ChannelId::new(99), tracks(&["a"])).await;

        assert!(matches!(
            result,
            Err(ManagerError::VoiceChannelMismatch { expected, actual }) if expected == voice() && actual == ChannelId::new(99)
        ));
        assert!(link.sent().is_empty());
        assert_eq!(manager.snapshot(guild()).await.unwrap().current, None);
    }

    #[tokio::test]
    async fn unavailable_node_leaves_state_unchanged() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        link.set_available(false);

        let err = manager.enqueue(guild(), voice(), tracks(&["a", "b"])).await.unwrap_err();

        assert!(err.is_node_unavailable());
        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current, None);
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.status, PlaybackStatus::Connecting);

        link.set_available(true);
        manager.enqueue(guild(), voice(), tracks(&["a", "b"])).await.unwrap();
        assert_eq!(manager.snapshot(guild()).await.unwrap().current, Some(track("a")));
    }

    #[tokio::test]
    async fn play_joins_and_starts_best_result() {
        let (manager, link) = setup(Resolver::new(), accepting());
        link.add_load("ytsearch:daft punk", loaded(LoadType::SearchResult, &["one", "two"]));

        let outcome = manager.play(guild(), "daft punk", voice(), text(), user()).await.unwrap();

        assert_eq!(outcome, PlayOutcome::Queued { title: "one".to_string(), started: true });
        assert_eq!(outcome.to_string(), "▶️ Playing **one**");
        assert_eq!(link.ops(), vec!["voiceUpdate", "play"]);
        assert_eq!(manager.snapshot(guild()).await.unwrap().current.unwrap().requester, user());
        assert!(manager.pending.is_empty());
    }

    #[tokio::test]
    async fn play_without_matches_creates_nothing() {
        let (manager, link) = setup(Resolver::new(), MockVoiceGateway::new());

        let result = manager.play(guild(), "no such song", voice(), text(), user()).await;

        assert!(matches!(result, Err(ManagerError::NoMatches)));
        assert!(manager.snapshot(guild()).await.is_none());
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn play_reports_load_failures() {
        let (manager, link) = setup(Resolver::new(), MockVoiceGateway::new());
        link.add_load("https://youtu.be/gone", crate::model::track::Tracks::empty(LoadType::LoadFailed));

        let result = manager.play(guild(), "https://youtu.be/gone", voice(), text(), user()).await;

        assert!(matches!(result, Err(ManagerError::Resolution(ResolveError::LoadFailed { .. }))));
        assert!(manager.snapshot(guild()).await.is_none());
    }

    #[tokio::test]
    async fn collection_counts_only_resolved_items() {
        let catalog = FixedCatalog(CatalogEntry::Collection {
            name: Some("Road trip".to_string()),
            items: vec![item("one", "A"), item("two", "B"), item("three", "C"), item("four", "D"), item("five", "E")],
        });
        let (manager, link) = setup(Resolver::with_catalog(Arc::new(catalog)), accepting());
        link.add_load("ytsearch:two B", loaded(LoadType::SearchResult, &["two"]));
        link.add_load("ytsearch:five E", loaded(LoadType::SearchResult, &["five"]));

        let outcome = manager
            .play(guild(), "https://open.spotify.com/playlist/37i9dQZF1DX0XUsuxWHRQd", voice(), text(), user())
            .await
            .unwrap();

        assert_eq!(outcome, PlayOutcome::QueuedMany { count: 2, started: true });
        assert_eq!(outcome.to_string(), "➕ Added **2** tracks to the queue");
        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current.unwrap().title, "two");
        assert_eq!(snapshot.pending.len(), 1);
    }

    #[tokio::test]
    async fn stop_during_resolve_discards_the_play() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let catalog = GatedCatalog { entered: entered.clone(), release: release.clone() };
        let (manager, link) = setup(Resolver::with_catalog(Arc::new(catalog)), accepting());
        link.add_load("ytsearch:Get Lucky Daft Punk", loaded(LoadType::SearchResult, &["get-lucky"]));
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        link.clear();

        let play = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .play(guild(), "https://open.spotify.com/track/69kOkLUCkxIZYexIgSG8rq", voice(), text(), user())
                    .await
            }
        });

        entered.notified().await;
        manager.stop(guild()).await.unwrap();
        release.notify_one();

        assert_eq!(play.await.unwrap().unwrap(), PlayOutcome::Discarded);
        assert!(manager.snapshot(guild()).await.is_none());
        assert_eq!(link.ops(), vec!["destroy"]);
    }

    #[tokio::test]
    async fn stop_during_first_resolve_prevents_the_player() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let catalog = GatedCatalog { entered: entered.clone(), release: release.clone() };
        let (manager, link) = setup(Resolver::with_catalog(Arc::new(catalog)), MockVoiceGateway::new());
        link.add_load("ytsearch:Get Lucky Daft Punk", loaded(LoadType::SearchResult, &["get-lucky"]));

        let play = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .play(guild(), "https://open.spotify.com/track/69kOkLUCkxIZYexIgSG8rq", voice(), text(), user())
                    .await
            }
        });

        entered.notified().await;
        manager.stop(guild()).await.unwrap();
        release.notify_one();

        assert_eq!(play.await.unwrap().unwrap(), PlayOutcome::Discarded);
        assert!(manager.snapshot(guild()).await.is_none());
        assert!(link.sent().is_empty());
        assert!(manager.pending.is_empty());
        assert!(matches!(manager.stop(guild()).await, Err(ManagerError::PlayerNotFound)));
    }

    #[tokio::test]
    async fn failed_advance_halts_until_next_enqueue() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        manager.enqueue(guild(), voice(), tracks(&["a", "b"])).await.unwrap();
        link.set_available(false);

        let halted = Notice::PlaybackHalted { title: "b".to_string(), previous: None };
        assert_eq!(manager.apply_event(&end("a")).await, Some((text(), halted)));

        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current, None);
        assert_eq!(snapshot.pending, vec![track("b")]);
        assert_eq!(snapshot.status, PlaybackStatus::Connecting);

        link.set_available(true);
        link.clear();

        let outcome = manager.enqueue(guild(), voice(), tracks(&["c"])).await.unwrap();

        assert_eq!(outcome, PlayOutcome::Queued { title: "c".to_string(), started: false });
        assert_eq!(link.plays(), vec!["enc-b".to_string()]);
        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current, Some(track("b")));
        assert_eq!(snapshot.pending, vec![track("c")]);
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn skip_advances_then_finishes() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        manager.enqueue(guild(), voice(), tracks(&["a", "b"])).await.unwrap();
        link.clear();

        let outcome = manager.skip(guild()).await.unwrap();
        assert_eq!(outcome, SkipOutcome::Skipped { next: "b".to_string() });
        assert_eq!(link.plays(), vec!["enc-b".to_string()]);

        assert_eq!(manager.skip(guild()).await.unwrap(), SkipOutcome::QueueFinished);
        assert!(manager.snapshot(guild()).await.is_none());
        assert!(matches!(manager.skip(guild()).await, Err(ManagerError::PlayerNotFound)));
    }

    #[tokio::test]
    async fn skip_with_nothing_current_fails() {
        let (manager, _) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();

        assert!(matches!(manager.skip(guild()).await, Err(ManagerError::NothingPlaying)));
        assert!(manager.snapshot(guild()).await.is_some());
    }

    #[tokio::test]
    async fn failed_skip_restores_queue() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        manager.enqueue(guild(), voice(), tracks(&["a", "b"])).await.unwrap();
        link.set_available(false);

        assert!(manager.skip(guild()).await.unwrap_err().is_node_unavailable());

        let snapshot = manager.snapshot(guild()).await.unwrap();
        assert_eq!(snapshot.current, Some(track("a")));
        assert_eq!(snapshot.pending, vec![track("b")]);
    }

    #[tokio::test]
    async fn stop_destroys_even_if_node_is_down() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        manager.enqueue(guild(), voice(), tracks(&["a", "b", "c"])).await.unwrap();
        link.set_available(false);

        manager.stop(guild()).await.unwrap();

        assert!(manager.snapshot(guild()).await.is_none());
        assert!(matches!(manager.stop(guild()).await, Err(ManagerError::PlayerNotFound)));
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_status() {
        let (manager, link) = setup(Resolver::new(), accepting());
        manager.join(guild(), voice(), text(), user()).await.unwrap();
        assert!(matches!(manager.pause(guild()).await, Err(ManagerError::NothingPlaying)));

        manager.enqueue(guild(), voice(), tracks(&["a"])).await.unwrap();
        link.clear();

        manager.pause(guild()).await.unwrap();
        assert_eq!(manager.snapshot(guild()).await.unwrap().status, PlaybackStatus::Paused);

        manager.resume(guild()).await.unwrap();
        assert_eq!(manager.snapshot(guild()).await.unwrap().status, PlaybackStatus::Playing);
        assert_eq!(link.sent().into_iter().map(|(_, i)| i).collect::<Vec<_>>(), vec![
            Instruction::pause(true),
            Instruction::pause(false),
        ]);
    }

    #[tokio::test]
    async fn events_for_unknown_guilds_are_dropped() {
        let (manager, _) = setup(Resolver::new(), MockVoiceGateway::new());

        assert_eq!(manager.apply_event(&end("a")).await, None);
    }

    #[test]
    fn outcomes_render_for_chat() {
        assert_eq!(JoinOutcome::AlreadyHere.to_string(), "I'm already in your voice channel.");
        assert_eq!(
            PlayOutcome::Queued { title: "b".to_string(), started: false }.to_string(),
            "➕ Added **b** to the queue"
        );
        assert_eq!(SkipOutcome::Skipped { next: "c".to_string() }.to_string(), "⏭️ Skipped. Up next: **c**");
    }
}
