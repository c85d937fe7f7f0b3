//! Filesystem watch and candidate filtering
//!
//! Reacts to close-after-write and rename-into-area events on the watched
//! roots. Candidates get a cheap magic-byte check before they are queued;
//! the watch callback never blocks on a full queue — overflow is dropped
//! and logged so the watcher stays responsive.

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Cheap container check: magic bytes only, not a full open
pub fn looks_like_archive(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut buf = [0u8; 16];
    let Ok(n) = file.read(&mut buf) else {
        return false;
    };
    infer::get(&buf[..n])
        .map(|kind| kind.mime_type() == "application/zip")
        .unwrap_or(false)
}

/// Filter one path and push it onto the queue without blocking
pub fn enqueue_candidate(path: PathBuf, tx: &mpsc::Sender<PathBuf>) {
    if !path.is_file() {
        return;
    }
    if !looks_like_archive(&path) {
        debug!(path = %path.display(), "Not an archive container; dropped");
        return;
    }

    match tx.try_send(path) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(path)) => {
            warn!(path = %path.display(), "Candidate queue full; dropping");
        }
        Err(mpsc::error::TrySendError::Closed(path)) => {
            warn!(path = %path.display(), "Candidate queue closed; dropping");
        }
    }
}

fn handle_event(event: Event, tx: &mpsc::Sender<PathBuf>) {
    // Close-after-write, rename-into-area and self-move events; anything
    // else (opens, metadata, partial writes) is noise
    let relevant = matches!(
        event.kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    );
    if !relevant {
        return;
    }

    for path in event.paths {
        enqueue_candidate(path, tx);
    }
}

/// Register the watch on every root. The returned watcher must stay alive
/// for the watch to keep firing.
pub fn spawn_watcher(
    dirs: &[PathBuf],
    recursive: bool,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => handle_event(event, &tx),
        Err(e) => warn!("Watch error: {}", e),
    })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for dir in dirs {
        watcher.watch(dir, mode)?;
        debug!(dir = %dir.display(), recursive = recursive, "Watching");
    }

    Ok(watcher)
}

/// Enqueue archives already sitting in the watched roots (delivered while
/// the service was down)
pub fn sweep_existing(dirs: &[PathBuf], recursive: bool, tx: &mpsc::Sender<PathBuf>) {
    for dir in dirs {
        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                enqueue_candidate(entry.path().to_path_buf(), tx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::valid_package;

    #[test]
    fn test_zip_magic_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = valid_package(dir.path(), "pkg.zip");
        assert!(looks_like_archive(&path));
    }

    #[test]
    fn test_non_archive_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text, not a container").unwrap();
        assert!(!looks_like_archive(&path));
        assert!(!looks_like_archive(&dir.path().join("missing.zip")));
    }

    #[tokio::test]
    async fn test_enqueue_filters_non_archives() {
        let dir = tempfile::tempdir().unwrap();
        let archive = valid_package(dir.path(), "pkg.zip");
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"nope").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        enqueue_candidate(text, &tx);
        enqueue_candidate(archive.clone(), &tx);
        drop(tx);

        assert_eq!(rx.recv().await, Some(archive));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let a = valid_package(dir.path(), "a.zip");
        let b = valid_package(dir.path(), "b.zip");

        let (tx, mut rx) = mpsc::channel(1);
        enqueue_candidate(a.clone(), &tx);
        // Queue full: this one is dropped, the call returns immediately
        enqueue_candidate(b, &tx);
        drop(tx);

        assert_eq!(rx.recv().await, Some(a));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_sweep_finds_existing_archives() {
        let dir = tempfile::tempdir().unwrap();
        let archive = valid_package(dir.path(), "old.zip");
        std::fs::write(dir.path().join("junk.txt"), b"junk").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        sweep_existing(&[dir.path().to_path_buf()], false, &tx);
        drop(tx);

        assert_eq!(rx.recv().await, Some(archive));
        assert_eq!(rx.recv().await, None);
    }
}
