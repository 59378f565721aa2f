pub mod types;
pub mod error;
pub mod node;
pub mod model;
pub mod events;
pub mod voice;
pub mod cluster;
pub mod builder;
pub mod resolver;
pub mod manager;

#[cfg(feature = "util")]
pub mod util;

pub use cluster::{Cluster, ClusterBuilder};
pub use events::{Dispatcher, NodeEvent, Notice};
pub use manager::{JoinOutcome, PlayOutcome, PlayerManager, SkipOutcome};
pub use resolver::Resolver;
