//! Face-crop sources backed by image files.
//!
//! Detection happens upstream: every file is taken to be one detected face
//! region. Enrollment reads a fixed directory per user; recognition polls a
//! directory for files it has not seen yet.

use crate::frame::{Frame, FrameError};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "tiff"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot list {path}: {source}")]
    Scan {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

impl SourceError {
    /// True when the source itself is unusable, as opposed to one bad file.
    pub fn is_scan(&self) -> bool {
        matches!(self, SourceError::Scan { .. })
    }
}

/// Anything that hands out face crops one at a time.
pub trait FaceSource {
    /// Next face crop, or `None` when nothing is available right now.
    fn next_face(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// True for file names with a supported image extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode one image file into a frame.
pub fn load_frame(path: &Path, sequence: u32) -> Result<Frame, SourceError> {
    let image = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(source) => SourceError::Io {
            path: path.display().to_string(),
            source,
        },
        source => SourceError::Decode {
            path: path.display().to_string(),
            source,
        },
    })?;
    let frame = Frame::from_image(&image, sequence);
    tracing::debug!(
        path = %path.display(),
        width = frame.width,
        height = frame.height,
        brightness = frame.avg_brightness(),
        dark = frame.is_dark,
        "loaded face crop"
    );
    Ok(frame)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Scan {
        path: dir.display().to_string(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// One `(label, directory)` pair per subdirectory of `root`, sorted by label.
pub fn enrollment_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, SourceError> {
    let entries = std::fs::read_dir(root).map_err(|source| SourceError::Scan {
        path: root.display().to_string(),
        source,
    })?;
    let mut dirs: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|p| {
            let label = p.file_name()?.to_str()?.to_string();
            Some((label, p))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Every image in a directory, in file-name order. Each file is one capture
/// attempt.
pub struct ImageDirSource {
    queue: VecDeque<PathBuf>,
    sequence: u32,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let queue: VecDeque<PathBuf> = list_images(dir)?.into();
        tracing::info!(dir = %dir.display(), files = queue.len(), "opened image directory");
        Ok(Self { queue, sequence: 0 })
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl FaceSource for ImageDirSource {
    fn next_face(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.queue.pop_front() else {
            return Ok(None);
        };
        self.sequence += 1;
        load_frame(&path, self.sequence).map(Some)
    }
}

/// Polls a directory and yields each new image exactly once.
pub struct ProbeWatcher {
    dir: PathBuf,
    seen: HashSet<PathBuf>,
    pending: VecDeque<PathBuf>,
    sequence: u32,
}

impl ProbeWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: HashSet::new(),
            pending: VecDeque::new(),
            sequence: 0,
        }
    }

    /// Mark every image currently present as seen, so only later arrivals
    /// are reported.
    pub fn skip_existing(&mut self) -> Result<usize, SourceError> {
        let existing = list_images(&self.dir)?;
        let count = existing.len();
        self.seen.extend(existing);
        Ok(count)
    }

    /// Rescan the directory and queue unseen images. Files that have gone
    /// away are forgotten.
    pub fn poll(&mut self) -> Result<usize, SourceError> {
        let current = list_images(&self.dir)?;
        self.seen.retain(|p| current.binary_search(p).is_ok());

        let mut fresh = 0;
        for path in current {
            if self.seen.insert(path.clone()) {
                self.pending.push_back(path);
                fresh += 1;
            }
        }
        if fresh > 0 {
            tracing::debug!(dir = %self.dir.display(), fresh, "new probe images");
        }
        Ok(fresh)
    }

    /// Number of files currently remembered as seen.
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Path of the next queued probe without loading it.
    pub fn peek(&self) -> Option<&Path> {
        self.pending.front().map(PathBuf::as_path)
    }
}

impl FaceSource for ProbeWatcher {
    fn next_face(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.pending.is_empty() {
            self.poll()?;
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.sequence += 1;
        load_frame(&path, self.sequence).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_png(path: &Path, value: u8) {
        GrayImage::from_pixel(32, 32, Luma([value])).save(path).unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/face.PNG")));
        assert!(is_image_file(Path::new("face.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("README")));
    }

    #[test]
    fn test_dir_source_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 200);
        write_png(&dir.path().join("a.png"), 50);
        std::fs::write(dir.path().join("skip.txt"), "x").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.remaining(), 2);
        let first = source.next_face().unwrap().unwrap();
        assert_eq!(first.data[0], 50);
        assert_eq!(first.sequence, 1);
        let second = source.next_face().unwrap().unwrap();
        assert_eq!(second.data[0], 200);
        assert!(source.next_face().unwrap().is_none());
    }

    #[test]
    fn test_dir_source_missing_dir() {
        assert!(matches!(
            ImageDirSource::open(Path::new("/nonexistent/facegate")),
            Err(SourceError::Scan { .. })
        ));
    }

    #[test]
    fn test_decode_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(load_frame(&path, 0).is_err());
    }

    #[test]
    fn test_enrollment_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("bob")).unwrap();
        std::fs::create_dir(root.path().join("alice")).unwrap();
        std::fs::write(root.path().join("stray.png"), b"").unwrap();
        let dirs = enrollment_dirs(root.path()).unwrap();
        let labels: Vec<&str> = dirs.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["alice", "bob"]);
    }

    #[test]
    fn test_probe_watcher_yields_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("old.png"), 10);

        let mut watcher = ProbeWatcher::new(dir.path());
        assert_eq!(watcher.skip_existing().unwrap(), 1);
        assert!(watcher.next_face().unwrap().is_none());

        write_png(&dir.path().join("new.png"), 120);
        assert_eq!(watcher.poll().unwrap(), 1);
        assert_eq!(watcher.peek(), Some(dir.path().join("new.png").as_path()));
        let frame = watcher.next_face().unwrap().unwrap();
        assert_eq!(frame.data[0], 120);
        assert!(watcher.next_face().unwrap().is_none());
        assert_eq!(watcher.poll().unwrap(), 0);
    }

    #[test]
    fn test_probe_watcher_forgets_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 10);
        write_png(&dir.path().join("b.png"), 20);

        let mut watcher = ProbeWatcher::new(dir.path());
        assert_eq!(watcher.poll().unwrap(), 2);
        assert_eq!(watcher.seen_len(), 2);

        std::fs::remove_file(dir.path().join("a.png")).unwrap();
        assert_eq!(watcher.poll().unwrap(), 0);
        assert_eq!(watcher.seen_len(), 1);
    }

    #[test]
    fn test_probe_watcher_missing_dir_is_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let probes = dir.path().join("probes");
        std::fs::create_dir(&probes).unwrap();
        let mut watcher = ProbeWatcher::new(&probes);
        assert!(watcher.next_face().unwrap().is_none());

        std::fs::remove_dir(&probes).unwrap();
        let err = watcher.next_face().unwrap_err();
        assert!(err.is_scan());
    }

    #[test]
    fn test_decode_error_is_not_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(!load_frame(&path, 0).unwrap_err().is_scan());
    }
}
