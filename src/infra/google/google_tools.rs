// =============================================================================
// GOOGLE DRIVE AND DOCS TOOLS
// =============================================================================
//
// Registers the Drive and Docs operations with the tool registry. Each
// handler turns a client result into the uniform `{success, message, data}`
// envelope; API failures become `success: false` with the error attached so
// the model can explain what went wrong.

use super::docs_client::{DocsClient, InsertLocation};
use super::drive_client::{DriveClient, ShareRole};
use super::google_api::GoogleError;
use crate::core::ai::{
    with_state, FnTool, PropertyDef, RegistryError, ToolArgs, ToolDescriptor, ToolError,
    ToolRegistry, ToolResult,
};
use serde_json::json;
use std::sync::Arc;

fn failed(message: &str, error: GoogleError) -> ToolResult {
    tracing::error!("{}: {}", message, error);
    ToolResult::failed_with(message, error)
}

// =============================================================================
// DRIVE HANDLERS
// =============================================================================

async fn list_files(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let max_results = args.opt_u32("maxResults")?;
    Ok(match drive.list_files(max_results).await {
        Ok(files) => ToolResult::ok(
            format!("Found {} files", files.len()),
            json!({ "files": files }),
        ),
        Err(e) => failed("Failed to list files from Google Drive", e),
    })
}

async fn search_files(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let query = args.str("query")?;
    Ok(match drive.search_files(query).await {
        Ok(files) => ToolResult::ok(
            format!("Found {} files matching \"{}\"", files.len(), query),
            json!({ "files": files }),
        ),
        Err(e) => failed("Failed to search files in Google Drive", e),
    })
}

async fn create_folder(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let name = args.str("folderName")?;
    let parent = args.opt_str("parentFolderId");
    Ok(match drive.create_folder(name, parent).await {
        Ok(folder) => ToolResult::ok(
            format!("Folder \"{}\" created successfully", name),
            json!({ "folder": folder }),
        ),
        Err(e) => failed("Failed to create folder in Google Drive", e),
    })
}

async fn delete_file(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let file_id = args.str("fileId")?;
    Ok(match drive.delete_file(file_id).await {
        Ok(()) => {
            tracing::info!("Deleted Drive file {}", file_id);
            ToolResult::ok("File deleted successfully", json!({ "fileId": file_id }))
        }
        Err(e) => failed("Failed to delete file from Google Drive", e),
    })
}

async fn file_metadata(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let file_id = args.str("fileId")?;
    Ok(match drive.get_file_metadata(file_id).await {
        Ok(file) => ToolResult::ok(
            "File metadata retrieved successfully",
            json!({ "file": file }),
        ),
        Err(e) => failed("Failed to get file metadata", e),
    })
}

async fn share_file(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let file_id = args.str("fileId")?;
    let email = args.str("email")?;
    let role = match args.opt_str("role") {
        None => ShareRole::Reader,
        Some(value) => ShareRole::parse(value).ok_or_else(|| ToolError::InvalidArgument {
            name: "role".to_string(),
            reason: format!("expected reader, writer or commenter, got '{}'", value),
        })?,
    };

    Ok(match drive.share_file(file_id, email, role).await {
        Ok(permission) => ToolResult::ok(
            format!("File shared with {} as {}", email, role.as_str()),
            json!({ "permission": permission }),
        ),
        Err(e) => failed("Failed to share file", e),
    })
}

async fn search_docs(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let query = args.str("query")?;
    Ok(match drive.search_docs(query).await {
        Ok(documents) => ToolResult::ok(
            format!(
                "Found {} documents matching \"{}\"",
                documents.len(),
                query
            ),
            json!({ "documents": documents }),
        ),
        Err(e) => failed("Failed to search Google Docs", e),
    })
}

async fn list_docs(drive: Arc<DriveClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let max_results = args.opt_u32("maxResults")?;
    Ok(match drive.list_docs(max_results).await {
        Ok(documents) => ToolResult::ok(
            format!("Found {} documents", documents.len()),
            json!({ "documents": documents }),
        ),
        Err(e) => failed("Failed to list Google Docs", e),
    })
}

// =============================================================================
// DOCS HANDLERS
// =============================================================================

async fn create_doc(docs: Arc<DocsClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let title = args.str("title")?;
    Ok(match docs.create_document(title).await {
        Ok(document) => ToolResult::ok(
            format!("Document \"{}\" created successfully", title),
            json!({ "document": document }),
        ),
        Err(e) => failed("Failed to create Google Doc", e),
    })
}

async fn read_doc(docs: Arc<DocsClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let document_id = args.str("documentId")?;
    Ok(match docs.read_document(document_id).await {
        Ok(document) => ToolResult::ok("Document read successfully", json!({ "document": document })),
        Err(e) => failed("Failed to read Google Doc", e),
    })
}

async fn write_doc(docs: Arc<DocsClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let document_id = args.str("documentId")?;
    // Whitespace is content here, so the raw value is used
    let text = args
        .get("text")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ToolError::MissingArgument("text".to_string()))?;
    let location = match args.opt_str("location") {
        None => InsertLocation::default(),
        Some(value) => InsertLocation::parse(value).ok_or_else(|| ToolError::InvalidArgument {
            name: "location".to_string(),
            reason: format!("expected start or end, got '{}'", value),
        })?,
    };

    Ok(match docs.write_text(document_id, text, location).await {
        Ok(url) => ToolResult::ok("Text added to document successfully", json!({ "url": url })),
        Err(e) => failed("Failed to write to Google Doc", e),
    })
}

async fn replace_in_doc(docs: Arc<DocsClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let document_id = args.str("documentId")?;
    let search = args.str("searchText")?;
    // An empty replacement deletes the matches
    let replacement = args
        .get("replacementText")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::MissingArgument("replacementText".to_string()))?;

    Ok(match docs.replace_text(document_id, search, replacement).await {
        Ok(occurrences) => ToolResult::ok(
            format!(
                "Text replaced successfully in document ({} occurrences changed)",
                occurrences
            ),
            json!({
                "occurrencesChanged": occurrences,
                "url": super::docs_client::document_url(document_id),
            }),
        ),
        Err(e) => failed("Failed to replace text in Google Doc", e),
    })
}

// =============================================================================
// REGISTRATION
// =============================================================================

pub fn register_google_tools(
    registry: &mut ToolRegistry,
    drive: Arc<DriveClient>,
    docs: Arc<DocsClient>,
) -> Result<(), RegistryError> {
    registry.register_fn(
        ToolDescriptor::new(
            "list_google_drive_files",
            "List files in the user's Google Drive. Returns up to the specified number of recent files.",
        )
        .optional(
            "maxResults",
            PropertyDef::number("Maximum number of files to return (default: 10)"),
        ),
        with_state(&drive, list_files),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "search_google_drive_files",
            "Search for files in Google Drive by name.",
        )
        .param("query", PropertyDef::string("Search query to find files")),
        with_state(&drive, search_files),
    )?;

    registry.register_fn(
        ToolDescriptor::new("create_google_drive_folder", "Create a new folder in Google Drive.")
            .param("folderName", PropertyDef::string("Name of the folder to create"))
            .optional("parentFolderId", PropertyDef::string("Optional parent folder ID")),
        with_state(&drive, create_folder),
    )?;

    registry.register_destructive(
        ToolDescriptor::new(
            "delete_google_drive_file",
            "Delete a file from Google Drive. Destructive: only call with confirm set to true after the user has explicitly confirmed.",
        )
        .param("fileId", PropertyDef::string("ID of the file to delete")),
        FnTool(with_state(&drive, delete_file)),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "get_file_metadata",
            "Get detailed information about a specific file in Google Drive.",
        )
        .param("fileId", PropertyDef::string("ID of the file to get metadata for")),
        with_state(&drive, file_metadata),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "share_google_drive_file",
            "Share a file with another user via email.",
        )
        .param("fileId", PropertyDef::string("ID of the file to share"))
        .param("email", PropertyDef::string("Email address of the person to share with"))
        .optional(
            "role",
            PropertyDef::string_enum(
                "Permission level (reader, writer, or commenter)",
                &["reader", "writer", "commenter"],
            ),
        ),
        with_state(&drive, share_file),
    )?;

    registry.register_fn(
        ToolDescriptor::new("create_google_doc", "Create a new Google Doc with a specified title.")
            .param("title", PropertyDef::string("Title for the new Google Doc")),
        with_state(&docs, create_doc),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "read_google_doc",
            "Read the content from a Google Doc. Returns the full text content of the document, all tabs included.",
        )
        .param(
            "documentId",
            PropertyDef::string("ID or full URL of the Google Doc to read"),
        ),
        with_state(&docs, read_doc),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "write_to_google_doc",
            "Write or append text to a Google Doc. Can add text at the start or end of the document.",
        )
        .param("documentId", PropertyDef::string("ID of the Google Doc to write to"))
        .param("text", PropertyDef::string("Text content to add to the document"))
        .optional(
            "location",
            PropertyDef::string_enum(
                "Where to add the text (start or end of document)",
                &["start", "end"],
            ),
        ),
        with_state(&docs, write_doc),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "replace_text_in_google_doc",
            "Find and replace text in a Google Doc. Replaces all occurrences of the search text.",
        )
        .param("documentId", PropertyDef::string("ID of the Google Doc"))
        .param("searchText", PropertyDef::string("Text to search for"))
        .param("replacementText", PropertyDef::string("Text to replace with")),
        with_state(&docs, replace_in_doc),
    )?;

    registry.register_fn(
        ToolDescriptor::new("search_google_docs", "Search for Google Docs by name.")
            .param("query", PropertyDef::string("Search query to find documents")),
        with_state(&drive, search_docs),
    )?;

    registry.register_fn(
        ToolDescriptor::new("list_google_docs", "List recent Google Docs in the user's Drive.")
            .optional(
                "maxResults",
                PropertyDef::number("Maximum number of documents to return (default: 10)"),
            ),
        with_state(&drive, list_docs),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::google_api::test_support::{spawn_stub, StaticToken};
    use super::super::google_api::GoogleApi;
    use super::*;
    use crate::core::ai::tools::ToolLookup;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Json;
    use serde_json::Value;

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => ToolArgs::new(map),
            _ => ToolArgs::default(),
        }
    }

    async fn registry_against(router: axum::Router) -> ToolRegistry {
        let base = spawn_stub(router).await;
        let api = Arc::new(GoogleApi::new(Arc::new(StaticToken)));
        let drive = Arc::new(DriveClient::new(Arc::clone(&api)).with_base_url(&base));
        let docs = Arc::new(DocsClient::new(api).with_base_url(&base));

        let mut registry = ToolRegistry::new();
        register_google_tools(&mut registry, drive, docs).unwrap();
        registry
    }

    async fn call(registry: &ToolRegistry, name: &str, value: Value) -> Result<ToolResult, ToolError> {
        match registry.resolve(name) {
            ToolLookup::Found(tool) => tool.invoke(args(value)).await,
            ToolLookup::NotFound { .. } => panic!("{} is not registered", name),
        }
    }

    #[tokio::test]
    async fn test_registers_full_catalogue() {
        let registry = registry_against(axum::Router::new()).await;

        assert_eq!(registry.len(), 12);
        let ToolLookup::Found(delete) = registry.resolve("delete_google_drive_file") else {
            panic!("delete tool missing");
        };
        assert!(delete.destructive);
        let ToolLookup::Found(list) = registry.resolve("list_google_drive_files") else {
            panic!("list tool missing");
        };
        assert!(!list.destructive);
        assert!(list.descriptor.parameters.required.is_empty());
    }

    #[tokio::test]
    async fn test_list_files_reports_count() {
        let router = axum::Router::new().route(
            "/files",
            get(|| async {
                Json(json!({ "files": [
                    { "id": "1", "name": "Budget.xlsx" },
                    { "id": "2", "name": "Notes", "mimeType": "application/vnd.google-apps.document" }
                ] }))
            }),
        );
        let registry = registry_against(router).await;

        let result = call(&registry, "list_google_drive_files", json!({ "maxResults": 2 }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Found 2 files");
        assert_eq!(result.data.unwrap()["files"][1]["name"], "Notes");
    }

    #[tokio::test]
    async fn test_api_failure_becomes_failed_result() {
        let router = axum::Router::new().route(
            "/files",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": { "message": "Insufficient Permission" } })),
                )
            }),
        );
        let registry = registry_against(router).await;

        let result = call(&registry, "search_google_docs", json!({ "query": "plan" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Failed to search Google Docs");
        assert!(result.error.unwrap().contains("Insufficient Permission"));
    }

    #[tokio::test]
    async fn test_argument_errors() {
        let registry = registry_against(axum::Router::new()).await;

        let missing = call(&registry, "search_google_drive_files", json!({}))
            .await
            .unwrap_err();
        assert_eq!(missing.to_string(), "Missing 'query' argument");

        let bad_role = call(
            &registry,
            "share_google_drive_file",
            json!({ "fileId": "1", "email": "a@b.co", "role": "owner" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(bad_role, ToolError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_delete_without_confirm_never_reaches_drive() {
        // No routes: any request would fail with 404
        let registry = registry_against(axum::Router::new()).await;

        let result = call(&registry, "delete_google_drive_file", json!({ "fileId": "abc" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.message,
            crate::core::ai::tools::CONFIRMATION_REQUIRED_MESSAGE
        );
    }
}
