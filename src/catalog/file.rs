use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::catalog::scanner::scan_collection;
use crate::catalog::{Catalog, CatalogError, Collection, ShareLink};
use crate::lease::LinkToken;

/// On-disk catalog layout.
///
/// ```toml
/// [[collections]]
/// id = "summer-2024"
/// title = "Summer 2024"
/// path = "/srv/media/summer"
///
/// [[links]]
/// token = "3f0c..."
/// recipient = "Alice"
/// collection = "summer-2024"
/// ```
#[derive(Deserialize, Default, Debug)]
pub struct CatalogFile {
    #[serde(default)]
    pub collections: Vec<CollectionEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

#[derive(Deserialize, Debug)]
pub struct CollectionEntry {
    pub id: String,
    pub title: Option<String>,
    pub path: PathBuf,
}

#[derive(Deserialize, Debug)]
pub struct LinkEntry {
    pub token: String,
    pub recipient: String,
    pub collection: String,
    pub created_at: Option<DateTime<Utc>>,
}

pub fn parse_catalog(content: &str) -> Result<CatalogFile, CatalogError> {
    Ok(toml::from_str(content)?)
}

/// Read, parse and scan a catalog. Relative collection paths resolve against
/// the catalog file's directory.
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    let file = parse_catalog(&content)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    build_catalog(file, base)
}

pub fn build_catalog(file: CatalogFile, base: &Path) -> Result<Catalog, CatalogError> {
    let mut catalog = Catalog::new();

    for entry in file.collections {
        let root = if entry.path.is_absolute() {
            entry.path
        } else {
            base.join(entry.path)
        };
        let items = scan_collection(&entry.id, &root);
        catalog.insert_collection(Collection {
            title: entry.title.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            root,
            items,
        })?;
    }

    for entry in file.links {
        catalog.insert_link(ShareLink {
            token: LinkToken::new(entry.token),
            recipient: entry.recipient,
            collection: entry.collection,
            created_at: entry.created_at.unwrap_or_else(Utc::now),
        })?;
    }

    Ok(catalog)
}
