//! Generated directory index.
//!
//! `GET ` (empty name) and `GET filelist.txt` both resolve to this
//! listing rather than to a file on disk; dotfiles are hidden from it.

use std::path::Path;

use crate::error::{ProtocolError, Result};

/// The name reserved for the generated index; requesting it by this name
/// also resolves to the index rather than a file.
pub const INDEX_NAME: &str = "filelist.txt";

/// Returns true for the two names that resolve to the generated index
/// rather than to a file in the serving directory.
pub fn is_index_name(name: &str) -> bool {
    name.is_empty() || name == INDEX_NAME
}

/// Lists non-dotfile entries of `dir`, joined by `\n`.
///
/// Order is whatever `read_dir` yields; callers that need a stable order
/// should sort the result themselves (the wire contract leaves it
/// implementation-defined).
pub async fn build_index(dir: &Path) -> Result<String> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(ProtocolError::Io)?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(ProtocolError::Io)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') {
            names.push(name.into_owned());
        }
    }

    Ok(names.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_non_dotfiles_only() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"").unwrap();

        let index = build_index(dir.path()).await.unwrap();
        let mut lines: Vec<&str> = index.split('\n').collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn index_name_recognized() {
        assert!(is_index_name(""));
        assert!(is_index_name("filelist.txt"));
        assert!(!is_index_name("other.txt"));
    }
}
