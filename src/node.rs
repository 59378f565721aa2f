use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use parking_lot::Mutex;
use reqwest::{Client as HttpClient, header::HeaderMap};
use serenity::model::id::GuildId;
use std::{
    sync::Arc,
    time::Duration
};
use tokio::sync::{mpsc::UnboundedSender, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message as TungsteniteMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tracing_futures::Instrument;
use crate::{
    builder::{NodeConfig, CLIENT_NAME},
    error::{NodeError, NodeResult},
    events::NodeEvent,
    model::{
        gateway::{decode, Inbound, Stats},
        track::Tracks,
        Instruction,
    },
    types::{SocketSink, SocketStream},
};

/// Fixed wait between a disconnect and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Control link to an audio node, as seen by the players bound to it.
#[async_trait]
pub trait NodeLink: Send + Sync + 'static {
    fn id(&self) -> u8;

    fn status(&self) -> NodeStatus;

    /// Forwards `instruction` for `guild`; fails with [`NodeError::NodeUnavailable`] unless connected.
    async fn send(&self, guild: GuildId, instruction: Instruction) -> NodeResult<()>;

    async fn load_tracks(&self, identifier: &str) -> NodeResult<Tracks>;

    /// Tears the link down for good.
    async fn shutdown(&self) {}
}

/// Opens the websocket half of a node connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, config: &NodeConfig) -> NodeResult<(SocketSink, SocketStream)>;
}

pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &NodeConfig) -> NodeResult<(SocketSink, SocketStream)> {
        let mut request = config.socket.as_str().into_client_request()?;

        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&config.pass)?);
        headers.insert("Num-Shards", HeaderValue::from(config.shards));
        headers.insert("User-Id", HeaderValue::from(config.user_id.get()));
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        let (stream, _) = tokio_tungstenite::connect_async(request).await?;

        let (write, read) = stream.split();

        Ok((Box::pin(write), Box::pin(read)))
    }
}

struct NodeState {
    status: NodeStatus,
    reconnect_pending: bool,
    reconnect_attempts: u32,
    // Bumped on every successful connect so a stale read loop cannot report a disconnect.
    epoch: u64,
    stats: Option<Stats>,
}

pub struct Node {
    id: u8,
    config: NodeConfig,
    http: HttpClient,
    connector: Arc<dyn Connector>,
    state: Mutex<NodeState>,
    socket_write: AsyncMutex<Option<SocketSink>>,
    events: UnboundedSender<NodeEvent>,
    shutdown: CancellationToken,
}

impl Node {
    pub fn new(
        id: u8,
        config: NodeConfig,
        connector: Arc<dyn Connector>,
        events: UnboundedSender<NodeEvent>,
    ) -> NodeResult<Arc<Self>> {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_str(&config.pass)?);

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Arc::new(Self {
            id,
            config,
            http,
            connector,
            state: Mutex::new(NodeState {
                status: NodeStatus::Disconnected,
                reconnect_pending: false,
                reconnect_attempts: 0,
                epoch: 0,
                stats: None,
            }),
            socket_write: AsyncMutex::new(None),
            events,
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn status(&self) -> NodeStatus {
        self.state.lock().status
    }

    /// Last statistics reported by the node.
    pub fn stats(&self) -> Option<Stats> {
        self.state.lock().stats.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.state.lock().reconnect_attempts
    }

    /// Connects, falling back to the reconnect timer if the node is not reachable yet.
    pub async fn start(self: &Arc<Self>) {
        if self.connect().await.is_err() {
            self.request_reconnect();
        }
    }

    /// Opens the control connection and starts reading node events.
    ///
    /// Does nothing when the node is already connected or connecting.
    pub async fn connect(self: &Arc<Self>) -> NodeResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(NodeError::ShuttingDown);
        }

        {
            let mut state = self.state.lock();

            if state.status != NodeStatus::Disconnected {
                return Ok(());
            }

            state.status = NodeStatus::Connecting;
        }

        info!("Node id {} trying to connect to {}", self.id, self.config.socket);

        match self.connector.connect(&self.config).await {
            Ok((mut write, _)) if self.shutdown.is_cancelled() => {
                self.state.lock().status = NodeStatus::Disconnected;

                if let Err(why) = write.close().await {
                    debug!("Node id {} did not close cleanly: {}", self.id, why);
                }

                Err(NodeError::ShuttingDown)
            },
            Ok((write, read)) => {
                *self.socket_write.lock().await = Some(write);

                let epoch = {
                    let mut state = self.state.lock();
                    state.status = NodeStatus::Connected;
                    state.reconnect_attempts = 0;
                    state.epoch += 1;
                    state.epoch
                };

                info!("Node id {} connected successfully to server", self.id);

                self.emit(NodeEvent::NodeConnected { node: self.id });

                let span = tracing::info_span!("node", id = self.id);
                tokio::spawn(Arc::clone(self).read_loop(read, epoch).instrument(span));

                Ok(())
            },
            Err(why) => {
                self.state.lock().status = NodeStatus::Disconnected;

                warn!("Node id {} failed to connect: {}", self.id, why);

                self.emit(NodeEvent::NodeError { node: self.id, message: why.to_string() });

                Err(why)
            }
        }
    }

    /// The link dropped: mark the node down and arm a single reconnect attempt.
    pub fn on_disconnected(self: &Arc<Self>) {
        let epoch = self.state.lock().epoch;

        self.disconnected(epoch);
    }

    fn disconnected(self: &Arc<Self>, epoch: u64) {
        {
            let mut state = self.state.lock();

            if state.epoch != epoch || state.status != NodeStatus::Connected {
                return;
            }

            state.status = NodeStatus::Disconnected;
        }

        self.emit(NodeEvent::NodeDisconnected { node: self.id });

        self.request_reconnect();
    }

    fn request_reconnect(self: &Arc<Self>) {
        let schedule = {
            let mut state = self.state.lock();

            if self.shutdown.is_cancelled() || state.reconnect_pending {
                false
            } else {
                state.reconnect_pending = true;
                true
            }
        };

        if schedule {
            warn!("Node id {} is down, attempting reconnect in {}s", self.id, RECONNECT_DELAY.as_secs());

            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let node = Arc::clone(self);

        tokio::spawn(async move {
            tokio::select! {
                _ = node.shutdown.cancelled() => {
                    node.state.lock().reconnect_pending = false;
                    return;
                },
                _ = tokio::time::sleep(RECONNECT_DELAY) => (),
            }

            let attempt = {
                let mut state = node.state.lock();
                state.reconnect_pending = false;

                if state.status == NodeStatus::Disconnected {
                    state.reconnect_attempts += 1;
                    Some(state.reconnect_attempts)
                } else {
                    None
                }
            };

            let attempt = match attempt {
                Some(attempt) => attempt,
                None => {
                    debug!("Node id {} already reconnected, skipping scheduled attempt", node.id);
                    return;
                }
            };

            info!("Node id {} reconnect attempt {}", node.id, attempt);

            if node.connect().await.is_err() {
                node.request_reconnect();
            }
        });
    }

    async fn read_loop(self: Arc<Self>, mut read: SocketStream, epoch: u64) {
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = read.next() => message,
            };

            match message {
                Some(Ok(TungsteniteMessage::Text(text))) => self.handle_text(&text),
                Some(Ok(TungsteniteMessage::Close(frame))) => {
                    info!("Node id {} closed the connection: {:?}", self.id, frame);
                    break;
                },
                Some(Ok(_)) => (),
                Some(Err(why)) => {
                    warn!("Node id {} socket error: {}", self.id, why);
                    break;
                },
                None => break,
            }
        }

        self.disconnected(epoch);
    }

    fn handle_text(&self, text: &str) {
        match decode(text) {
            Ok(Inbound::Stats(stats)) => {
                self.state.lock().stats = Some(stats);
            },
            Ok(Inbound::PlayerUpdate(update)) => {
                trace!("Guild {} position {}ms", update.guild_id, update.state.position);
            },
            Ok(Inbound::Track(event)) => self.emit(NodeEvent::Track(event)),
            Ok(Inbound::Ignored) => trace!("Ignoring node payload: {}", text),
            Err(why) => warn!("Node id {} sent a malformed payload: {}", self.id, why),
        }
    }

    fn emit(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            trace!("Node id {} has no event receiver", self.id);
        }
    }
}

#[async_trait]
impl NodeLink for Node {
    fn id(&self) -> u8 {
        self.id
    }

    fn status(&self) -> NodeStatus {
        Node::status(self)
    }

    async fn send(&self, guild: GuildId, instruction: Instruction) -> NodeResult<()> {
        if Node::status(self) != NodeStatus::Connected {
            return Err(NodeError::NodeUnavailable);
        }

        let payload = serde_json::to_string(&instruction.payload(guild)?)?;

        let mut socket = self.socket_write.lock().await;
        let socket = socket.as_mut().ok_or(NodeError::NodeUnavailable)?;

        socket.send(TungsteniteMessage::text(payload)).await?;

        debug!("Sent `{}` to node id {} for guild {}", instruction.op(), self.id, guild);

        Ok(())
    }

    async fn load_tracks(&self, identifier: &str) -> NodeResult<Tracks> {
        let response = self.http.get(format!("{}/loadtracks", self.config.rest))
            .query(&[("identifier", identifier)])
            .send()
            .await?
            .error_for_status()?
            .json::<Tracks>()
            .await?;

        Ok(response)
    }

    async fn shutdown(&self) {
        info!("Shutting down node id {}", self.id);

        self.shutdown.cancel();
        self.state.lock().status = NodeStatus::Disconnected;

        if let Some(mut socket) = self.socket_write.lock().await.take() {
            if let Err(why) = socket.close().await {
                debug!("Node id {} did not close cleanly: {}", self.id, why);
            }
        }

        self.emit(NodeEvent::NodeDisconnected { node: self.id });
    }
}
