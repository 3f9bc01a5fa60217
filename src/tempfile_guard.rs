//! Best-effort cleanup for `-part` files.
//!
//! Mirrors the `TempFileGuard` / `guard.defuse()` pattern used by the
//! donor codebase's receiver around its own temp files: a guard is
//! created alongside the `-part` file and removes it on `Drop` unless
//! defused. Callers defuse it in two distinct situations: after a
//! successful rename (the normal path), and before propagating a
//! transport failure (premature EOF), since the error handling design
//! requires a `-part` file to survive a transport failure but not a
//! checksum mismatch, which is left to remove the file via `Drop`.

use std::path::{Path, PathBuf};

pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    /// Arms a guard over `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Disarms the guard; `Drop` will no longer remove the file. Call
    /// this once the `-part` file has been renamed to its final name.
    pub fn defuse(mut self) {
        self.armed = false;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_file_on_drop_unless_defused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x-part");
        std::fs::write(&path, b"partial").unwrap();

        {
            let _guard = TempFileGuard::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn leaves_file_alone_when_defused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x-part");
        std::fs::write(&path, b"partial").unwrap();

        let guard = TempFileGuard::new(&path);
        guard.defuse();
        assert!(path.exists());
    }
}
