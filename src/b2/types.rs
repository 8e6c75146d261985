//! Wire types for the B2 native API calls the blob store makes

use serde::{Deserialize, Deserializer, Serialize};

/// Accept a count as a JSON number, a numeric string, or null (as 0)
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Raw::Number(n)) => Ok(n),
        Some(Raw::Text(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// `b2_authorize_account` response (v3 layout)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Authorization {
    pub account_id: String,
    pub authorization_token: String,
    pub api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiInfo {
    pub storage_api: StorageApi,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StorageApi {
    pub api_url: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListBuckets<'a> {
    pub account_id: &'a str,
    pub bucket_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BucketList {
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Bucket {
    pub bucket_id: String,
    pub bucket_name: String,
}

/// `b2_list_file_names` request narrowed to a single name
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFileNames<'a> {
    pub bucket_id: &'a str,
    pub prefix: &'a str,
    pub start_file_name: &'a str,
    pub max_file_count: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileNames {
    pub files: Vec<FileVersion>,
}

/// One file version as B2 lists it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub file_name: String,
    /// Absent for folder placeholders
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub content_length: u64,
    /// "upload", "hide", "folder" or "start"
    pub action: String,
}

impl FileVersion {
    /// Whether this is a visible, completed upload
    pub fn is_live(&self) -> bool {
        self.action == "upload" && self.file_id.is_some()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetUploadUrl<'a> {
    pub bucket_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadTarget {
    pub upload_url: String,
    pub authorization_token: String,
}

/// `b2_upload_file` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub content_length: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteFileVersion<'a> {
    pub file_name: &'a str,
    pub file_id: &'a str,
}

/// JSON body B2 sends with every non-2xx response
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
