use serenity::model::id::ChannelId;
use thiserror::Error;
use tokio_tungstenite::tungstenite::error::Error as TungsteniteError;

pub type NodeResult<T> = ::std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("The audio node is not connected.")]
    NodeUnavailable,
    #[error("The node is shutting down.")]
    ShuttingDown,
    #[error("Error on the node websocket: {0}")]
    Socket(#[from] TungsteniteError),
    #[error("Error on the node rest api: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid data was provided to the payload json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

pub type ClusterResult<T> = ::std::result::Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Cannot find a connected node, this can mean every node is down or none was added")]
    CannotFindNode,
    #[error("Node id {0} is already part of the cluster")]
    DuplicateNode(u8),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Node(#[from] NodeError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No `user id` was set on the node builder.")]
    MissingUserId,
    #[error("Invalid value for `{var}`: {value:?}")]
    InvalidVar { var: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("The node failed to load the track: {message}")]
    LoadFailed { message: String },
    #[error("This kind of catalog link cannot be played")]
    UnsupportedLink,
    #[error("Catalog lookup failed: {0}")]
    Catalog(String),
    #[error(transparent)]
    Node(#[from] NodeError),
}

#[derive(Debug, Error)]
#[error("Voice gateway error: {message}")]
pub struct VoiceError {
    pub message: String,
}

impl VoiceError {
    pub fn new(message: impl ToString) -> Self {
        Self { message: message.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Text channel {0} could not be found")]
    UnknownChannel(ChannelId),
    #[error("Failed to post notification: {0}")]
    Failed(String),
}

pub type ManagerResult<T> = ::std::result::Result<T, ManagerError>;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("There is no player for this guild")]
    PlayerNotFound,
    #[error("Nothing is playing right now")]
    NothingPlaying,
    #[error("You must be in the same voice channel as the player ({expected})")]
    VoiceChannelMismatch { expected: ChannelId, actual: ChannelId },
    #[error("Nothing was found for that query")]
    NoMatches,
    #[error("Could not load that query: {0}")]
    Resolution(ResolveError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl ManagerError {
    /// Whether the command failed because no node could take the instruction.
    pub fn is_node_unavailable(&self) -> bool {
        matches!(
            self,
            ManagerError::Node(NodeError::NodeUnavailable)
                | ManagerError::Cluster(ClusterError::CannotFindNode)
        )
    }
}
