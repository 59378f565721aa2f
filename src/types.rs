use futures::{Sink, Stream};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::{error::Error as TungsteniteError, Message};

/// Write half of a node connection.
pub type SocketSink = Pin<Box<dyn Sink<Message, Error = TungsteniteError> + Send>>;

/// Read half of a node connection.
pub type SocketStream = Pin<Box<dyn Stream<Item = Result<Message, TungsteniteError>> + Send>>;
