use std::path::Path;

use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Classify a file path by its extension into a (MediaKind, MIME type) pair.
///
/// Returns `None` for anything that is not audio or video. Extensions are
/// matched case-insensitively.
pub fn classify(path: &Path) -> Option<(MediaKind, &'static str)> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();

    let result = match ext.as_str() {
        // Video
        "mp4" | "m4v" => (MediaKind::Video, "video/mp4"),
        "mkv" => (MediaKind::Video, "video/x-matroska"),
        "mov" => (MediaKind::Video, "video/quicktime"),
        "mpg" | "mpeg" => (MediaKind::Video, "video/mpeg"),
        "ogv" => (MediaKind::Video, "video/ogg"),
        "webm" => (MediaKind::Video, "video/webm"),
        "3gp" => (MediaKind::Video, "video/3gpp"),

        // Audio
        "mp3" => (MediaKind::Audio, "audio/mpeg"),
        "flac" => (MediaKind::Audio, "audio/flac"),
        "wav" => (MediaKind::Audio, "audio/wav"),
        "m4a" => (MediaKind::Audio, "audio/mp4"),
        "aac" => (MediaKind::Audio, "audio/aac"),
        "ogg" | "oga" | "opus" => (MediaKind::Audio, "audio/ogg"),
        "aiff" | "aif" => (MediaKind::Audio, "audio/aiff"),

        _ => return None,
    };

    Some(result)
}
