//! Share links and the media collections they unlock.
//!
//! This is the content-resolution side of the service: a link token maps to a
//! recipient and a collection, and a collection maps to the media files found
//! under its directory at startup.

pub mod file;
pub mod mime;
pub mod scanner;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::mime::MediaKind;
use crate::lease::LinkToken;

#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: Uuid,
    pub title: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub mime: &'static str,
    pub kind: MediaKind,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub root: PathBuf,
    pub items: Vec<MediaItem>,
}

/// One recipient + collection pairing. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ShareLink {
    pub token: LinkToken,
    pub recipient: String,
    pub collection: String,
    pub created_at: DateTime<Utc>,
}

/// What a granted viewer gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct ContentListing {
    pub recipient: String,
    pub collection: String,
    pub media: Vec<MediaEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaEntry {
    pub id: Uuid,
    pub title: String,
    pub kind: MediaKind,
    pub mime: &'static str,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate collection id '{0}'")]
    DuplicateCollection(String),
    #[error("duplicate link token '{0}'")]
    DuplicateLink(LinkToken),
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
}

#[derive(Debug, Default)]
pub struct Catalog {
    collections: HashMap<String, Collection>,
    links: HashMap<LinkToken, ShareLink>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_collection(&mut self, collection: Collection) -> Result<(), CatalogError> {
        if self.collections.contains_key(&collection.id) {
            return Err(CatalogError::DuplicateCollection(collection.id));
        }
        self.collections.insert(collection.id.clone(), collection);
        Ok(())
    }

    pub fn insert_link(&mut self, link: ShareLink) -> Result<(), CatalogError> {
        if !self.collections.contains_key(&link.collection) {
            return Err(CatalogError::UnknownCollection(link.collection));
        }
        if self.links.contains_key(&link.token) {
            return Err(CatalogError::DuplicateLink(link.token));
        }
        self.links.insert(link.token.clone(), link);
        Ok(())
    }

    /// Create a link with a freshly generated token.
    pub fn create_link(
        &mut self,
        recipient: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<ShareLink, CatalogError> {
        let link = ShareLink {
            token: LinkToken::generate(),
            recipient: recipient.into(),
            collection: collection.into(),
            created_at: Utc::now(),
        };
        self.insert_link(link.clone())?;
        Ok(link)
    }

    pub fn remove_link(&mut self, token: &LinkToken) -> Option<ShareLink> {
        self.links.remove(token)
    }

    pub fn link(&self, token: &LinkToken) -> Option<&ShareLink> {
        self.links.get(token)
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.get(id)
    }

    /// Links sorted by creation time, oldest first.
    pub fn links(&self) -> Vec<&ShareLink> {
        let mut links: Vec<_> = self.links.values().collect();
        links.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.token.as_str().cmp(b.token.as_str())));
        links
    }

    /// Content listing for a link, or `None` if the link is unknown.
    pub fn listing(&self, token: &LinkToken) -> Option<ContentListing> {
        let link = self.links.get(token)?;
        let collection = self.collections.get(&link.collection)?;
        Some(ContentListing {
            recipient: link.recipient.clone(),
            collection: collection.title.clone(),
            media: collection
                .items
                .iter()
                .map(|item| MediaEntry {
                    id: item.id,
                    title: item.title.clone(),
                    kind: item.kind,
                    mime: item.mime,
                    size: item.file_size,
                })
                .collect(),
        })
    }

    /// A media item reachable through `token`'s collection.
    pub fn media_item(&self, token: &LinkToken, id: Uuid) -> Option<&MediaItem> {
        let link = self.links.get(token)?;
        let collection = self.collections.get(&link.collection)?;
        collection.items.iter().find(|item| item.id == id)
    }
}
