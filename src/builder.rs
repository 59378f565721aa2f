use crate::error::ConfigError;
use serenity::model::id::UserId;

pub(crate) const CLIENT_NAME: &str = concat!("tunelink/", env!("CARGO_PKG_VERSION"));

pub struct NodeBuilder {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) ssl: bool,
    pub(crate) pass: String,
    pub(crate) shards: u64,
    pub(crate) id: Option<UserId>,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            ssl: false,
            pass: "youshallnotpass".to_string(),
            shards: 1,
            id: None,
        }
    }
}

impl NodeBuilder {
    /// Reads the node location from the environment, loading a `.env` file first if present.
    ///
    /// `LAVALINK_HOST`, `LAVALINK_PORT`, `LAVALINK_PASSWORD` and `LAVALINK_SECURE` are read;
    /// anything missing keeps its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(host) = var("LAVALINK_HOST") {
            builder.set_host(host);
        }

        if let Some(port) = var("LAVALINK_PORT") {
            let parsed = port.trim().parse::<u16>().map_err(|_| ConfigError::InvalidVar {
                var: "LAVALINK_PORT",
                value: port.clone(),
            })?;
            builder.set_port(parsed);
        }

        if let Some(pass) = var("LAVALINK_PASSWORD") {
            builder.set_password(pass);
        }

        if let Some(secure) = var("LAVALINK_SECURE") {
            builder.set_ssl(secure.trim() == "true");
        }

        Ok(builder)
    }

    pub fn set_host(&mut self, host: impl ToString) -> &mut Self {
        self.host = host.to_string();
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_password(&mut self, password: impl ToString) -> &mut Self {
        self.pass = password.to_string();
        self
    }

    pub fn set_shards(&mut self, shards: u64) -> &mut Self {
        self.shards = shards;
        self
    }

    pub fn set_user_id(&mut self, id: impl Into<UserId>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn set_ssl(&mut self, ssl: bool) -> &mut Self {
        self.ssl = ssl;
        self
    }

    pub(crate) fn build(&self) -> Result<NodeConfig, ConfigError> {
        let user_id = self.id.ok_or(ConfigError::MissingUserId)?;

        let (http, ws) = if self.ssl { ("https", "wss") } else { ("http", "ws") };

        Ok(NodeConfig {
            rest: format!("{}://{}:{}", http, self.host, self.port),
            socket: format!("{}://{}:{}", ws, self.host, self.port),
            pass: self.pass.clone(),
            shards: self.shards,
            user_id,
        })
    }
}

/// Resolved connection details of one node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub rest: String,
    pub socket: String,
    pub pass: String,
    pub shards: u64,
    pub user_id: UserId,
}
