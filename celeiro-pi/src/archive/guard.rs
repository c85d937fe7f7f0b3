//! Package guard: cooperative locking and safe-copy isolation
//!
//! The lock is advisory: stripping the write bits keeps cooperating
//! producers from mutating a package while a worker inspects it. The safe
//! copy means every inspector operation runs against an application-owned
//! file, so a producer overwriting or deleting the original cannot corrupt
//! an in-flight validation.

use crate::error::{IntakeError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Owner-write and world-write bits, stripped while locked
const WRITE_BITS: u32 = 0o202;

/// Guard for one inbound package file
pub struct PackageGuard {
    origin: PathBuf,
    group_id: Option<u32>,
    copy: Option<PathBuf>,
    /// Permission bits observed before locking; Some while locked
    saved_mode: Option<u32>,
}

impl PackageGuard {
    pub fn new(origin: &Path, group_id: Option<u32>) -> Self {
        Self {
            origin: origin.to_path_buf(),
            group_id,
            copy: None,
            saved_mode: None,
        }
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Working-copy path; None until [`isolate`](Self::isolate) ran
    pub fn copy_path(&self) -> Option<&Path> {
        self.copy.as_deref()
    }

    /// Strip write bits from the original and hand it to the application
    /// group. Idempotent: locking an already-locked guard is a no-op.
    pub fn lock(&mut self) -> Result<()> {
        if self.saved_mode.is_some() {
            return Ok(());
        }

        let meta = fs::metadata(&self.origin)
            .map_err(|e| IntakeError::Lock(format!("{}: {}", self.origin.display(), e)))?;
        let original_mode = meta.permissions().mode();
        let locked_mode = original_mode & !WRITE_BITS;

        fs::set_permissions(&self.origin, fs::Permissions::from_mode(locked_mode))
            .map_err(|e| IntakeError::Lock(format!("chmod {}: {}", self.origin.display(), e)))?;

        if let Some(gid) = self.group_id {
            if let Err(e) = std::os::unix::fs::chown(&self.origin, None, Some(gid)) {
                // Group change failed after the permission change succeeded;
                // roll the permissions back before propagating
                let _ = fs::set_permissions(
                    &self.origin,
                    fs::Permissions::from_mode(original_mode),
                );
                return Err(IntakeError::Lock(format!(
                    "chown {}: {}",
                    self.origin.display(),
                    e
                )));
            }
        }

        self.saved_mode = Some(original_mode);
        debug!(path = %self.origin.display(), mode = format!("{:o}", original_mode), "Package locked");
        Ok(())
    }

    /// Restore the permission bits observed before locking. Idempotent;
    /// callers invoke this on every exit path.
    pub fn unlock(&mut self) -> Result<()> {
        let Some(mode) = self.saved_mode.take() else {
            return Ok(());
        };

        fs::set_permissions(&self.origin, fs::Permissions::from_mode(mode)).map_err(|e| {
            IntakeError::Lock(format!("restore {}: {}", self.origin.display(), e))
        })?;
        debug!(path = %self.origin.display(), "Package unlocked");
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.saved_mode.is_some()
    }

    /// Copy the original into the working directory under a fresh opaque
    /// identifier, preserving the original extension. All inspection runs
    /// against the returned path.
    pub fn isolate(&mut self, working_dir: &Path) -> Result<PathBuf> {
        if let Some(copy) = &self.copy {
            return Ok(copy.clone());
        }

        fs::create_dir_all(working_dir)?;

        let opaque = Uuid::new_v4().simple().to_string();
        let file_name = match self.origin.extension() {
            Some(ext) => format!("{}.{}", opaque, ext.to_string_lossy().to_lowercase()),
            None => opaque,
        };
        let dest = working_dir.join(file_name);

        fs::copy(&self.origin, &dest).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IntakeError::SourceVanished(self.origin.clone())
            } else {
                IntakeError::Io(e)
            }
        })?;

        debug!(origin = %self.origin.display(), copy = %dest.display(), "Package isolated");
        self.copy = Some(dest.clone());
        Ok(dest)
    }

    /// Rename the original with a `failed_` marker
    pub fn mark_failed(&self, silence: bool) -> Result<()> {
        self.mark("failed_", silence)
    }

    /// Rename the original with a `duplicated_` marker
    pub fn mark_duplicated(&self, silence: bool) -> Result<()> {
        self.mark("duplicated_", silence)
    }

    fn mark(&self, prefix: &str, silence: bool) -> Result<()> {
        let file_name = self
            .origin
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = self
            .origin
            .with_file_name(format!("{}{}", prefix, file_name));

        match fs::rename(&self.origin, &target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && silence => {
                // Original already gone (operator cleanup race); tolerated
                warn!(path = %self.origin.display(), "Original vanished before marking");
                Ok(())
            }
            Err(e) => Err(IntakeError::Io(e)),
        }
    }
}
