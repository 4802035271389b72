//! Audio tag reading and rewriting (ID3 for `.mp3`).

use crate::error::FsError;
use id3::{Tag, TagLike, Version};
use std::path::Path;
use tracing::debug;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Rewrites the artist/album/title tags of a file in place.
pub trait TagRewriter: Send + Sync {
    fn rewrite_tags(&self, artist: &str, album: &str, song: &str, path: &Path)
        -> Result<(), FsError>;
}

/// Whether `name` has an extension we know how to tag.
pub fn is_recognized_audio(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

/// Artist, album and title of a track, with defaults for missing tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub title: String,
}

impl TrackTags {
    /// Read tags from `path`; untagged or unrecognized files get defaults and
    /// the file stem as title.
    pub fn read(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tag = if is_recognized_audio(&path.to_string_lossy()) {
            match Tag::read_from_path(path) {
                Ok(tag) => Some(tag),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "no readable ID3 tag");
                    None
                }
            }
        } else {
            None
        };

        let non_empty = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let artist = tag.as_ref().and_then(|t| non_empty(t.artist()));
        let album = tag.as_ref().and_then(|t| non_empty(t.album()));
        let title = tag.as_ref().and_then(|t| non_empty(t.title()));

        TrackTags {
            artist: artist.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: album.unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            title: title.unwrap_or(stem),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Id3TagRewriter;

impl TagRewriter for Id3TagRewriter {
    fn rewrite_tags(
        &self,
        artist: &str,
        album: &str,
        song: &str,
        path: &Path,
    ) -> Result<(), FsError> {
        let tagging_error = |err: id3::Error| FsError::Tagging {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        let mut tag = match Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(err) if matches!(err.kind, id3::ErrorKind::NoTag) => Tag::new(),
            Err(err) => return Err(tagging_error(err)),
        };
        tag.set_artist(artist);
        tag.set_album(album);
        if !song.is_empty() {
            tag.set_title(song);
        }
        tag.write_to_path(path, Version::Id3v24)
            .map_err(tagging_error)?;
        debug!(path = %path.display(), artist, album, song, "tags rewritten");
        Ok(())
    }
}
