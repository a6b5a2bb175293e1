//! Image preloading with pluggable sources
//!
//! A preload is fire-and-forget: the source decodes the URL wherever it
//! likes and reports one `LoadEvent` on the supplied channel.
//! - `DecodeSource`: local files decoded with the `image` crate on a worker pool
//! - `ManualSource`: completes on demand, for deterministic tests and embedding

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use log::{debug, trace, warn};
use serde::Serialize;

use super::traits::WorkerPool;

/// Index of a tracked image inside its tracker
pub type ImageId = usize;

/// What a successful decode reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Encoded size on disk
    pub bytes: u64,
}

/// Preload errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    UnsupportedScheme(String),
    Io(String),
    Decode(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::UnsupportedScheme(s) => write!(f, "Unsupported URL scheme: {}", s),
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Decode(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Completion signal for one preload
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub id: ImageId,
    pub url: String,
    pub result: Result<ImageInfo, LoadError>,
}

/// Asynchronous image decode primitive.
pub trait ImageSource {
    /// Start loading `url`. Exactly one `LoadEvent` with `id` goes to `done`
    /// once the image is decoded or has failed. The event may be sent before
    /// this returns; the caller only reads the channel later.
    fn preload(&self, id: ImageId, url: &str, done: Sender<LoadEvent>);
}

// ===== Decode source =====

/// Decodes local files on a worker pool.
///
/// Accepts plain paths and `file://` URLs. Relative paths are resolved
/// against `base_dir` when set.
#[derive(Clone)]
pub struct DecodeSource {
    pool: Arc<dyn WorkerPool>,
    base_dir: Option<PathBuf>,
}

impl fmt::Debug for DecodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeSource")
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

impl DecodeSource {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool, base_dir: None }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Map a URL to a local path
    pub fn resolve(&self, url: &str) -> Result<PathBuf, LoadError> {
        let raw = if let Some(rest) = url.strip_prefix("file://") {
            rest
        } else if let Some((scheme, _)) = url.split_once("://") {
            return Err(LoadError::UnsupportedScheme(scheme.to_string()));
        } else {
            url
        };
        let path = PathBuf::from(raw);
        Ok(match (&self.base_dir, path.is_relative()) {
            (Some(base), true) => base.join(path),
            _ => path,
        })
    }

    /// Blocking decode (runs on a worker)
    pub fn decode(path: &Path) -> Result<ImageInfo, LoadError> {
        let bytes = std::fs::metadata(path)
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?
            .len();
        let img = image::ImageReader::open(path)
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?
            .with_guessed_format()
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| LoadError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(ImageInfo {
            width: img.width(),
            height: img.height(),
            bytes,
        })
    }
}

impl ImageSource for DecodeSource {
    fn preload(&self, id: ImageId, url: &str, done: Sender<LoadEvent>) {
        let url = url.to_string();
        let path = match self.resolve(&url) {
            Ok(p) => p,
            Err(e) => {
                let _ = done.send(LoadEvent { id, url, result: Err(e) });
                return;
            }
        };
        trace!("Queue decode #{}: {}", id, path.display());
        self.pool.execute(Box::new(move || {
            let result = Self::decode(&path);
            match &result {
                Ok(info) => debug!("Decoded #{} {}x{} ({} bytes)", id, info.width, info.height, info.bytes),
                Err(e) => debug!("Decode #{} failed: {}", id, e),
            }
            // Receiver gone means the tracker was dropped mid-run
            if done.send(LoadEvent { id, url, result }).is_err() {
                trace!("Tracker gone, dropping result for #{}", id);
            }
        }));
    }
}

// ===== Manual source =====

#[derive(Debug)]
struct PendingLoad {
    id: ImageId,
    url: String,
    done: Sender<LoadEvent>,
}

/// Source that completes preloads only when told to.
///
/// Clones share the pending list, so a test can keep one handle while the
/// tracker owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    pending: Arc<Mutex<Vec<PendingLoad>>>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs still waiting, in request order
    pub fn pending_urls(&self) -> Vec<String> {
        self.lock().iter().map(|p| p.url.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Complete the first pending preload of `url`. Returns false if none.
    pub fn complete(&self, url: &str) -> bool {
        self.finish(url, Ok(ImageInfo { width: 1, height: 1, bytes: 0 }))
    }

    /// Fail the first pending preload of `url`. Returns false if none.
    pub fn fail(&self, url: &str) -> bool {
        self.finish(url, Err(LoadError::Decode("simulated failure".to_string())))
    }

    /// Complete every pending preload, in request order
    pub fn complete_all(&self) -> usize {
        let drained: Vec<PendingLoad> = self.lock().drain(..).collect();
        let count = drained.len();
        for p in drained {
            Self::send(p, Ok(ImageInfo { width: 1, height: 1, bytes: 0 }));
        }
        count
    }

    fn finish(&self, url: &str, result: Result<ImageInfo, LoadError>) -> bool {
        let taken = {
            let mut pending = self.lock();
            pending
                .iter()
                .position(|p| p.url == url)
                .map(|idx| pending.remove(idx))
        };
        match taken {
            Some(p) => {
                Self::send(p, result);
                true
            }
            None => {
                warn!("ManualSource: no pending preload for {}", url);
                false
            }
        }
    }

    fn send(p: PendingLoad, result: Result<ImageInfo, LoadError>) {
        let _ = p.done.send(LoadEvent { id: p.id, url: p.url, result });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingLoad>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ImageSource for ManualSource {
    fn preload(&self, id: ImageId, url: &str, done: Sender<LoadEvent>) {
        self.lock().push(PendingLoad { id, url: url.to_string(), done });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workers::Workers;
    use std::time::Duration;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imgprogress-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve() {
        let src = DecodeSource::new(Arc::new(Workers::new(1))).with_base_dir("/srv/page");
        assert_eq!(src.resolve("a.png").unwrap(), PathBuf::from("/srv/page/a.png"));
        assert_eq!(src.resolve("file:///tmp/b.png").unwrap(), PathBuf::from("/tmp/b.png"));
        assert_eq!(
            src.resolve("https://example.com/c.png"),
            Err(LoadError::UnsupportedScheme("https".to_string()))
        );
    }

    #[test]
    fn test_decode_png_on_pool() {
        let dir = temp_dir();
        let path = dir.join("tiny.png");
        image::RgbaImage::new(3, 2).save(&path).unwrap();

        let src = DecodeSource::new(Arc::new(Workers::new(2)));
        let (tx, rx) = crossbeam_channel::unbounded();
        src.preload(7, path.to_str().unwrap(), tx);

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.id, 7);
        let info = event.result.unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        assert!(info.bytes > 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_decode_failures_are_reported() {
        let dir = temp_dir();
        let junk = dir.join("junk.png");
        std::fs::write(&junk, b"definitely not a png").unwrap();

        let src = DecodeSource::new(Arc::new(Workers::new(1)));
        let (tx, rx) = crossbeam_channel::unbounded();
        src.preload(0, junk.to_str().unwrap(), tx.clone());
        src.preload(1, dir.join("missing.png").to_str().unwrap(), tx.clone());
        src.preload(2, "http://example.com/x.png", tx);

        let mut events: Vec<LoadEvent> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        events.sort_by_key(|e| e.id);
        assert!(matches!(events[0].result, Err(LoadError::Decode(_))));
        assert!(matches!(events[1].result, Err(LoadError::Io(_))));
        assert!(matches!(events[2].result, Err(LoadError::UnsupportedScheme(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_manual_source_any_order() {
        let src = ManualSource::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        src.preload(0, "a", tx.clone());
        src.preload(1, "b", tx);
        assert_eq!(src.pending_urls(), vec!["a", "b"]);

        assert!(src.complete("b"));
        assert!(!src.complete("b"));
        assert!(src.fail("a"));
        assert_eq!(src.pending_count(), 0);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.id, 1);
        assert!(first.result.is_ok());
        assert_eq!(second.id, 0);
        assert!(second.result.is_err());
    }
}
