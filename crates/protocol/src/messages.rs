use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session creation
// ---------------------------------------------------------------------------

/// Begins an upload session for one file.
///
/// Sent as multipart text fields (`fileName`, `contentType`, `path`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub path: String,
}

impl CreateUploadRequest {
    /// Returns the multipart text fields in wire order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("fileName", self.file_name.clone()),
            ("contentType", self.content_type.clone()),
            ("path", self.path.clone()),
        ]
    }
}

/// Identifiers assigned by the server when a session is created.
///
/// The server answers with snake_case keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUploadResponse {
    pub upload_id: String,
    pub file_id: String,
}

// ---------------------------------------------------------------------------
// Chunk upload
// ---------------------------------------------------------------------------

/// Metadata for one chunk upload. The bytes travel in a separate
/// multipart part named [`CHUNK_PART_NAME`](crate::constants::CHUNK_PART_NAME).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadRequest {
    pub upload_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(skip)]
    pub file_id: String,
    pub checksum: String,
    /// 1-based chunk number.
    pub chunk_number: u32,
    pub total_chunks: u32,
}

impl ChunkUploadRequest {
    /// Returns the multipart text fields in wire order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("uploadId", self.upload_id.clone()),
            ("checksum", self.checksum.clone()),
            ("chunkNumber", self.chunk_number.to_string()),
            ("totalChunks", self.total_chunks.to_string()),
            ("path", self.path.clone()),
        ]
    }

    /// Returns `true` for the final chunk of the file.
    pub fn is_last(&self) -> bool {
        self.chunk_number == self.total_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_response_uses_snake_case() {
        let json = r#"{"upload_id":"u-1","file_id":"f-1"}"#;
        let resp: CreateUploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.upload_id, "u-1");
        assert_eq!(resp.file_id, "f-1");
    }

    #[test]
    fn create_request_field_names() {
        let req = CreateUploadRequest {
            file_name: "report.pdf".into(),
            content_type: "application/pdf".into(),
            path: "docs".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"fileName\""));
        assert!(json.contains("\"contentType\""));

        let names: Vec<_> = req.form_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["fileName", "contentType", "path"]);
    }

    #[test]
    fn chunk_request_form_fields() {
        let req = ChunkUploadRequest {
            upload_id: "u-1".into(),
            path: String::new(),
            file_id: "f-1".into(),
            checksum: "ab".repeat(32),
            chunk_number: 2,
            total_chunks: 3,
        };
        let fields = req.form_fields();
        assert_eq!(fields[0], ("uploadId", "u-1".to_string()));
        assert_eq!(fields[2], ("chunkNumber", "2".to_string()));
        assert_eq!(fields[3], ("totalChunks", "3".to_string()));
        assert!(!req.is_last());
    }

    #[test]
    fn chunk_request_skips_file_id() {
        let req = ChunkUploadRequest {
            upload_id: "u-1".into(),
            path: "docs".into(),
            file_id: "f-1".into(),
            checksum: String::new(),
            chunk_number: 1,
            total_chunks: 1,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("fileId"));
        assert!(json.contains("\"chunkNumber\":1"));
        assert!(req.is_last());
    }
}
