use std::path::Path;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::core::config::ServiceAccountSource;
use crate::core::sync::{DriveError, DriveItem, DriveStore};
use crate::infra::google_auth::ServiceAccountAuth;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Minimal Drive v3 client covering lookups, folder creation and resumable uploads.
pub struct GoogleDriveClient {
    client: Client,
    auth: ServiceAccountAuth,
    api_base: String,
    upload_base: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<ApiFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    trashed: bool,
}

impl From<ApiFile> for DriveItem {
    fn from(file: ApiFile) -> Self {
        DriveItem {
            id: file.id,
            name: file.name,
        }
    }
}

impl GoogleDriveClient {
    pub fn new(auth: ServiceAccountAuth) -> Self {
        Self {
            client: Client::new(),
            auth,
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }

    pub async fn from_source(
        source: &ServiceAccountSource,
        scope: &str,
    ) -> Result<Self, DriveError> {
        let auth = ServiceAccountAuth::from_source(source, scope).await?;
        tracing::info!(scope = %scope, "Drive client authenticating as {}", auth.client_email());
        Ok(Self::new(auth))
    }

    async fn list(&self, query: &str, page_size: u32) -> Result<Vec<ApiFile>, DriveError> {
        let token = self.auth.get_access_token().await?;
        let resp = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("spaces", "drive"),
                ("fields", "files(id, name)"),
                ("pageSize", &page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| DriveError::Api(e.to_string()))?;

        let list: FileList = Self::json_or_error(resp, "list files").await?;
        Ok(list.files)
    }

    async fn json_or_error<T: for<'de> Deserialize<'de>>(
        resp: Response,
        what: &str,
    ) -> Result<T, DriveError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(DriveError::Api(format!(
                "Drive returned {} for {}: {}",
                status, what, text
            )));
        }

        resp.json()
            .await
            .map_err(|e| DriveError::Api(format!("Bad response for {}: {}", what, e)))
    }

    /// Opens a resumable upload session and returns its session URI.
    async fn start_resumable_upload(
        &self,
        folder_id: &str,
        name: &str,
        content_type: &str,
        length: usize,
    ) -> Result<String, DriveError> {
        let token = self.auth.get_access_token().await?;
        let resp = self
            .client
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "resumable"), ("fields", "id, name")])
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", length.to_string())
            .json(&json!({
                "name": name,
                "parents": [folder_id],
            }))
            .send()
            .await
            .map_err(|e| DriveError::Api(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DriveError::Api(format!(
                "Drive returned {} when starting upload of {}: {}",
                status, name, text
            )));
        }

        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DriveError::Api("Upload session has no Location header".to_string()))
    }
}

#[async_trait]
impl DriveStore for GoogleDriveClient {
    async fn find_folders(&self, name: &str) -> Result<Vec<DriveItem>, DriveError> {
        let files = self.list(&folder_query(name), 10).await?;
        Ok(files.into_iter().map(DriveItem::from).collect())
    }

    async fn get_folder(&self, id: &str) -> Result<Option<DriveItem>, DriveError> {
        let token = self.auth.get_access_token().await?;
        let resp = self
            .client
            .get(format!("{}/files/{}", self.api_base, id))
            .bearer_auth(token)
            .query(&[("fields", "id, name, mimeType, trashed")])
            .send()
            .await
            .map_err(|e| DriveError::Api(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let file: ApiFile = Self::json_or_error(resp, "get folder").await?;
        if file.trashed || file.mime_type.as_deref() != Some(FOLDER_MIME_TYPE) {
            return Ok(None);
        }
        Ok(Some(file.into()))
    }

    async fn create_folder(&self, name: &str) -> Result<DriveItem, DriveError> {
        let token = self.auth.get_access_token().await?;
        let resp = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "id, name")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
            }))
            .send()
            .await
            .map_err(|e| DriveError::Api(e.to_string()))?;

        let file: ApiFile = Self::json_or_error(resp, "create folder").await?;
        Ok(file.into())
    }

    async fn file_exists(&self, folder_id: &str, name: &str) -> Result<bool, DriveError> {
        let files = self.list(&file_in_folder_query(folder_id, name), 1).await?;
        Ok(!files.is_empty())
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        path: &Path,
    ) -> Result<DriveItem, DriveError> {
        let bytes = tokio::fs::read(path).await?;
        let content_type = guess_content_type(path);

        let session = self
            .start_resumable_upload(folder_id, name, &content_type, bytes.len())
            .await?;

        let resp = self
            .client
            .put(session)
            .header("Content-Type", content_type.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| DriveError::Api(e.to_string()))?;

        let file: ApiFile = Self::json_or_error(resp, "upload").await?;
        Ok(file.into())
    }
}

/// Escapes a string literal for the Drive query language.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn folder_query(name: &str) -> String {
    format!(
        "mimeType='{}' and name='{}' and trashed=false",
        FOLDER_MIME_TYPE,
        escape_query_value(name)
    )
}

fn file_in_folder_query(folder_id: &str, name: &str) -> String {
    format!(
        "name='{}' and '{}' in parents and trashed=false",
        escape_query_value(name),
        escape_query_value(folder_id)
    )
}

fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_query() {
        assert_eq!(
            folder_query("CodmonFiles"),
            "mimeType='application/vnd.google-apps.folder' and name='CodmonFiles' and trashed=false"
        );
    }

    #[test]
    fn test_file_query_escapes_quotes() {
        assert_eq!(
            file_in_folder_query("abc", "2024年10月1日_it's.pdf"),
            "name='2024年10月1日_it\\'s.pdf' and 'abc' in parents and trashed=false"
        );
    }

    #[test]
    fn test_escape_backslash_first() {
        assert_eq!(escape_query_value(r"a\'b"), r"a\\\'b");
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type(Path::new("report.PDF")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("recital.mp4")), "video/mp4");
        assert_eq!(guess_content_type(Path::new("icon.webp")), "image/webp");
        assert_eq!(
            guess_content_type(Path::new("no_extension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_api_file_parses_partial_fields() {
        let list: FileList =
            serde_json::from_str(r#"{"files":[{"id":"1","name":"CodmonFiles"}]}"#).unwrap();
        let item: DriveItem = list.files.into_iter().next().unwrap().into();
        assert_eq!(
            item,
            DriveItem {
                id: "1".to_string(),
                name: "CodmonFiles".to_string()
            }
        );

        let empty: FileList = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
    }
}
