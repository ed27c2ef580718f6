use std::path::{Component, Path};

use crate::TransferError;

/// Validates and normalizes a remote destination directory.
///
/// Leading and trailing slashes are dropped (`"/"` and `""` both mean the
/// root) and backslashes become forward slashes. Rejects:
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_destination_path(path: &str) -> Result<String, TransferError> {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {path}"
                )));
            }
            Component::Prefix(_) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {path}"
                )));
            }
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    TransferError::InvalidPath(format!("non UTF-8 path: {path}"))
                })?;
                if part.contains(':') {
                    return Err(TransferError::InvalidPath(format!(
                        "path prefix not allowed: {path}"
                    )));
                }
                parts.push(part);
            }
            Component::RootDir | Component::CurDir => {}
        }
    }

    Ok(parts.join("/"))
}

/// Validates a display file name sent when a session is created.
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }
    if name == "." || name == ".." {
        return Err(TransferError::InvalidPath(format!(
            "reserved file name: {name}"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidPath(format!(
            "file name must not contain separators: {name}"
        )));
    }
    Ok(())
}
