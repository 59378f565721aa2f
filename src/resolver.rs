use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::{
    error::ResolveError,
    model::track::{LoadType, TrackDescriptor, Tracks},
    node::NodeLink,
};

lazy_static!(
    static ref URL_REGEX: Regex = Regex::new(r"^https?://(?:www\.)?.+").unwrap();
    static ref CATALOG_REGEX: Regex = Regex::new(r"^https?://open\.spotify\.com/").unwrap();
);

#[derive(Debug, Clone, PartialEq)]
pub enum TrackSearch<'a> {
    Youtube(&'a str),
    Url(&'a str)
}

impl<'a> TrackSearch<'a> {
    pub fn new(query: &'a str) -> Self {
        if URL_REGEX.is_match(query) {
            Self::Url(query)
        } else {
            Self::Youtube(query)
        }
    }
}

impl std::fmt::Display for TrackSearch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Youtube(query) => write!(f, "ytsearch:{}", query),
            Self::Url(url) => write!(f, "{}", url)
        }
    }
}

/// One entry of an external music catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub name: String,
    pub artist: Option<String>,
}

impl CatalogItem {
    fn search_term(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} {}", self.name, artist).trim().to_string(),
            None => self.name.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Track(CatalogItem),
    /// Playlist or album.
    Collection { name: Option<String>, items: Vec<CatalogItem> },
    Unsupported,
}

/// Looks up catalog links (e.g. `open.spotify.com`) that the node cannot load by itself.
#[async_trait]
pub trait CatalogProvider: Send + Sync + 'static {
    async fn lookup(&self, url: &str) -> Result<CatalogEntry, ResolveError>;
}

#[derive(Debug)]
pub enum Resolution {
    NoMatches,
    /// `playlist` is set when the query named a collection rather than a single track.
    Found { tracks: Vec<TrackDescriptor>, playlist: Option<String> },
    Failed { cause: ResolveError },
}

/// Turns a user query into playable tracks through a node's loader.
#[derive(Default)]
pub struct Resolver {
    catalog: Option<Arc<dyn CatalogProvider>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Arc<dyn CatalogProvider>) -> Self {
        Self { catalog: Some(catalog) }
    }

    pub fn is_catalog_url(query: &str) -> bool {
        CATALOG_REGEX.is_match(query)
    }

    pub async fn resolve(&self, node: &dyn NodeLink, query: &str, requester: UserId) -> Resolution {
        let query = query.trim();

        match &self.catalog {
            Some(catalog) if Self::is_catalog_url(query) => {
                self.resolve_catalog(catalog.as_ref(), node, query, requester).await
            },
            _ => self.resolve_search(node, TrackSearch::new(query), requester).await,
        }
    }

    async fn resolve_search(&self, node: &dyn NodeLink, search: TrackSearch<'_>, requester: UserId) -> Resolution {
        let tracks = match node.load_tracks(&search.to_string()).await {
            Ok(tracks) => tracks,
            Err(why) => return Resolution::Failed { cause: why.into() },
        };

        from_load(tracks, requester)
    }

    async fn resolve_catalog(
        &self,
        catalog: &dyn CatalogProvider,
        node: &dyn NodeLink,
        url: &str,
        requester: UserId,
    ) -> Resolution {
        let entry = match catalog.lookup(url).await {
            Ok(entry) => entry,
            Err(cause) => return Resolution::Failed { cause },
        };

        match entry {
            CatalogEntry::Track(item) => {
                match self.first_match(node, &item, requester).await {
                    Ok(Some(track)) => Resolution::Found { tracks: vec![track], playlist: None },
                    Ok(None) => Resolution::NoMatches,
                    Err(cause) => Resolution::Failed { cause },
                }
            },
            CatalogEntry::Collection { name, items } => {
                let mut tracks = Vec::with_capacity(items.len());

                for item in items.iter().filter(|item| !item.name.trim().is_empty()) {
                    match self.first_match(node, item, requester).await {
                        Ok(Some(track)) => tracks.push(track),
                        Ok(None) => debug!("No match for catalog item {:?}, skipping", item.name),
                        Err(why) => warn!("Failed to resolve catalog item {:?}, skipping: {}", item.name, why),
                    }
                }

                if tracks.is_empty() {
                    Resolution::NoMatches
                } else {
                    Resolution::Found {
                        tracks,
                        playlist: Some(name.unwrap_or_else(|| "playlist".to_string())),
                    }
                }
            },
            CatalogEntry::Unsupported => Resolution::Failed { cause: ResolveError::UnsupportedLink },
        }
    }

    async fn first_match(
        &self,
        node: &dyn NodeLink,
        item: &CatalogItem,
        requester: UserId,
    ) -> Result<Option<TrackDescriptor>, ResolveError> {
        let term = item.search_term();
        let tracks = node.load_tracks(&TrackSearch::Youtube(&term).to_string()).await?;

        match tracks.load_type {
            LoadType::LoadFailed => Err(load_failure(&tracks)),
            _ => Ok(tracks.tracks
                .into_iter()
                .next()
                .map(|track| TrackDescriptor::from_track(track, requester))),
        }
    }
}

fn load_failure(tracks: &Tracks) -> ResolveError {
    ResolveError::LoadFailed {
        message: tracks.exception
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string()),
    }
}

fn from_load(tracks: Tracks, requester: UserId) -> Resolution {
    match tracks.load_type {
        LoadType::LoadFailed => Resolution::Failed { cause: load_failure(&tracks) },
        _ if tracks.tracks.is_empty() => Resolution::NoMatches,
        LoadType::NoMatches => Resolution::NoMatches,
        LoadType::PlaylistLoaded => Resolution::Found {
            playlist: Some(tracks.playlist_info.name.unwrap_or_else(|| "playlist".to_string())),
            tracks: tracks.tracks
                .into_iter()
                .map(|track| TrackDescriptor::from_track(track, requester))
                .collect(),
        },
        LoadType::TrackLoaded | LoadType::SearchResult => Resolution::Found {
            tracks: tracks.tracks
                .into_iter()
                .take(1)
                .map(|track| TrackDescriptor::from_track(track, requester))
                .collect(),
            playlist: None,
        },
    }
}
