use std::path::Path;
use std::time::Instant;

use uuid::Uuid;
use walkdir::WalkDir;

use crate::catalog::MediaItem;
use crate::catalog::mime::{MediaKind, classify};

/// Stable id for a file within a collection: same collection id and relative
/// path always give the same id across restarts.
pub fn media_item_id(collection_id: &str, relative: &Path) -> Uuid {
    let seed = format!("{}\x00{}", collection_id, relative.to_string_lossy());
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
}

/// Walk a collection directory and return its audio/video files, sorted by
/// relative path. Missing or unreadable entries are logged and skipped.
pub fn scan_collection(collection_id: &str, root: &Path) -> Vec<MediaItem> {
    let start = Instant::now();
    let mut items = Vec::new();

    if !root.exists() {
        tracing::warn!(
            "Collection '{}' path does not exist: {}",
            collection_id,
            root.display()
        );
        return items;
    }

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Err(e) => tracing::warn!("Cannot access entry: {}", e),
            Ok(entry) if entry.file_type().is_file() => {
                if let Some(item) = process_file(collection_id, root, entry.path()) {
                    items.push(item);
                }
            }
            Ok(_) => {}
        }
    }

    let video = items.iter().filter(|i| i.kind == MediaKind::Video).count();
    tracing::info!(
        "Collection '{}': {} files ({} video, {} audio) in {:.1}s",
        collection_id,
        items.len(),
        video,
        items.len() - video,
        start.elapsed().as_secs_f64()
    );
    items
}

fn process_file(collection_id: &str, root: &Path, path: &Path) -> Option<MediaItem> {
    let (kind, mime) = classify(path)?;

    let file_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!("Cannot stat {}: {}", path.display(), e);
            return None;
        }
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.to_string_lossy().into_owned());

    let item = MediaItem {
        id: media_item_id(collection_id, relative),
        title,
        path: path.to_path_buf(),
        file_size,
        mime,
        kind,
    };
    tracing::debug!("indexed {} -> {}", item.id, item.path.display());
    Some(item)
}
