// =============================================================================
// GOOGLE DRIVE CLIENT
// =============================================================================
//
// Drive v3 file operations used by the assistant's tools. Search queries are
// embedded in Drive's `q` language, so user text is escaped before it is
// placed inside a quoted string.

use super::google_api::{GoogleApi, GoogleError, DRIVE_BASE_URL};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

pub const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 1000;

const LIST_FIELDS: &str = "files(id, name, mimeType, createdTime, modifiedTime, size)";
const SEARCH_FIELDS: &str = "files(id, name, mimeType, createdTime, webViewLink)";
const DOC_FIELDS: &str = "files(id, name, createdTime, modifiedTime, webViewLink)";
const METADATA_FIELDS: &str =
    "id, name, mimeType, size, createdTime, modifiedTime, webViewLink, owners";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    /// Bytes, as a decimal string. Absent for folders and Google-native files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<DriveUser>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareRole {
    Reader,
    Writer,
    Commenter,
}

impl ShareRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "reader" => Some(ShareRole::Reader),
            "writer" => Some(ShareRole::Writer),
            "commenter" => Some(ShareRole::Commenter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareRole::Reader => "reader",
            ShareRole::Writer => "writer",
            ShareRole::Commenter => "commenter",
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Escapes a value for use inside a single-quoted Drive query string.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn name_contains(query: &str) -> String {
    format!(
        "name contains '{}' and trashed=false",
        escape_query_value(query)
    )
}

fn page_size(max_results: Option<u32>) -> u32 {
    max_results
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

pub struct DriveClient {
    api: Arc<GoogleApi>,
    base_url: String,
}

impl DriveClient {
    pub fn new(api: Arc<GoogleApi>) -> Self {
        Self {
            api,
            base_url: DRIVE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn list(&self, query: Vec<(&str, String)>) -> Result<Vec<DriveFile>, GoogleError> {
        let url = format!("{}/files", self.base_url);
        let list: FileList = self.api.get(&url, &query).await?;
        Ok(list.files)
    }

    /// Most recent files, regardless of type.
    pub async fn list_files(&self, max_results: Option<u32>) -> Result<Vec<DriveFile>, GoogleError> {
        self.list(vec![
            ("pageSize", page_size(max_results).to_string()),
            ("fields", LIST_FIELDS.to_string()),
        ])
        .await
    }

    /// Files whose name contains `query`, excluding trashed files.
    pub async fn search_files(&self, query: &str) -> Result<Vec<DriveFile>, GoogleError> {
        self.list(vec![
            ("q", name_contains(query)),
            ("pageSize", DEFAULT_PAGE_SIZE.to_string()),
            ("fields", SEARCH_FIELDS.to_string()),
        ])
        .await
    }

    pub async fn search_docs(&self, query: &str) -> Result<Vec<DriveFile>, GoogleError> {
        self.list(vec![
            (
                "q",
                format!("mimeType='{}' and {}", DOCUMENT_MIME_TYPE, name_contains(query)),
            ),
            ("pageSize", DEFAULT_PAGE_SIZE.to_string()),
            ("fields", DOC_FIELDS.to_string()),
        ])
        .await
    }

    /// Google Docs ordered by last modification, newest first.
    pub async fn list_docs(&self, max_results: Option<u32>) -> Result<Vec<DriveFile>, GoogleError> {
        self.list(vec![
            (
                "q",
                format!("mimeType='{}' and trashed=false", DOCUMENT_MIME_TYPE),
            ),
            ("pageSize", page_size(max_results).to_string()),
            ("orderBy", "modifiedTime desc".to_string()),
            ("fields", DOC_FIELDS.to_string()),
        ])
        .await
    }

    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<DriveFile, GoogleError> {
        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let url = format!("{}/files", self.base_url);
        self.api
            .post(
                &url,
                &[("fields", "id, name, webViewLink".to_string())],
                &metadata,
            )
            .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), GoogleError> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        self.api.delete(&url).await
    }

    pub async fn get_file_metadata(&self, file_id: &str) -> Result<DriveFile, GoogleError> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        self.api
            .get(&url, &[("fields", METADATA_FIELDS.to_string())])
            .await
    }

    /// Grants `email` access to a file and notifies them by email.
    pub async fn share_file(
        &self,
        file_id: &str,
        email: &str,
        role: ShareRole,
    ) -> Result<Permission, GoogleError> {
        let url = format!("{}/files/{}/permissions", self.base_url, file_id);
        let body = json!({
            "type": "user",
            "role": role.as_str(),
            "emailAddress": email,
        });
        self.api
            .post(&url, &[("sendNotificationEmail", "true".to_string())], &body)
            .await
    }
}
