use std::{
    fmt::Display,
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::{debug, warn};

/// Named durable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// Last observed price, plain decimal text.
    Price,
    /// Last relayed post id, plain text.
    Post,
}

/// Small-file store for the last-seen markers. One file per [`CursorKind`],
/// holding the raw value with no delimiter.
#[derive(Debug, Clone)]
pub struct CursorStore {
    price: PathBuf,
    post: PathBuf,
}

impl CursorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Post => "post",
        }
    }
}

impl CursorStore {
    pub fn new(price: impl Into<PathBuf>, post: impl Into<PathBuf>) -> Self {
        Self {
            price: price.into(),
            post: post.into(),
        }
    }

    pub fn path(&self, kind: CursorKind) -> &Path {
        match kind {
            CursorKind::Price => &self.price,
            CursorKind::Post => &self.post,
        }
    }

    /// Reads a slot. Absent, unreadable, empty or unparsable slots are all a
    /// cold start and yield `None`.
    pub fn load<T: FromStr>(&self, kind: CursorKind) -> Option<T> {
        let path = self.path(kind);
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(cursor = kind.name(), "No persisted cursor, starting cold");
                return None;
            }
            Err(e) => {
                warn!(cursor = kind.name(), path = %path.display(), "Failed to read cursor: {e}");
                return None;
            }
        };

        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(cursor = kind.name(), value = raw, "Ignoring unparsable cursor");
                None
            }
        }
    }

    /// Overwrites a slot wholesale. Writes go to a sibling temp file first and
    /// are renamed into place; there is a single writer per slot.
    pub fn save(&self, kind: CursorKind, value: impl Display) -> io::Result<()> {
        let path = self.path(kind);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, value.to_string())?;
        fs::rename(&tmp, path)
    }
}
