use serde::{Deserialize, Serialize};

/// Lifecycle state of one file's upload.
///
/// `Pending → Active → Completing`, with `Error` or `Cancelled` as
/// terminal exits from `Pending`/`Active`. A `Completing` entry is removed
/// from the progress feed after the display hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "completing")]
    Completing,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl UploadStatus {
    /// Returns `true` while chunks may still be uploaded for the file.
    pub fn is_active(self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::Active)
    }

    /// Returns `true` for states no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Error | UploadStatus::Cancelled)
    }

    /// Short label for progress displays.
    pub fn label(self) -> &'static str {
        match self {
            UploadStatus::Pending => "Waiting...",
            UploadStatus::Active => "Uploading",
            UploadStatus::Completing => "Completed",
            UploadStatus::Error => "Error",
            UploadStatus::Cancelled => "Cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_status_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadStatus::Completing).unwrap(),
            "\"completing\""
        );
        assert_eq!(
            serde_json::to_string(&UploadStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        let parsed: UploadStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(parsed, UploadStatus::Active);
    }

    #[test]
    fn status_predicates() {
        assert!(UploadStatus::Pending.is_active());
        assert!(UploadStatus::Active.is_active());
        assert!(!UploadStatus::Completing.is_active());
        assert!(UploadStatus::Error.is_terminal());
        assert!(UploadStatus::Cancelled.is_terminal());
        assert!(!UploadStatus::Completing.is_terminal());
    }

    #[test]
    fn status_labels() {
        assert_eq!(UploadStatus::Pending.label(), "Waiting...");
        assert_eq!(UploadStatus::Completing.label(), "Completed");
    }
}
