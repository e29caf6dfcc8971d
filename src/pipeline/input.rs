//! Input validation: fail on missing or unreadable files before any service call.
//!
//! Both stages start here. A PDF is checked for existence, read permission and
//! the `%PDF` magic bytes so callers get a meaningful error rather than a
//! pdfium crash; a page document is read fully as UTF-8.

use crate::error::Pdf2RulesError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path and return it.
pub fn resolve_pdf(path: impl AsRef<Path>) -> Result<PathBuf, Pdf2RulesError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(Pdf2RulesError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(Pdf2RulesError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2RulesError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2RulesError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Read a page document produced by stage 1.
pub async fn read_page_document(path: impl AsRef<Path>) -> Result<String, Pdf2RulesError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Pdf2RulesError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2RulesError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2RulesError::DocumentReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// Write `contents` atomically: temp file in the same directory, then rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2RulesError> {
    let fail = |e: std::io::Error| Pdf2RulesError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
