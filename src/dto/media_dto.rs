use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub id: uuid::Uuid,
    pub secure_id: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub category: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMediaResponse {
    pub success: bool,
}
