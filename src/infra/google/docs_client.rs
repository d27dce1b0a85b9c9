// =============================================================================
// GOOGLE DOCS CLIENT
// =============================================================================
//
// Create, read, append to and find-and-replace in Google Docs.
//
// Reads request `includeTabsContent=true` so documents with several tabs are
// returned in full; every tab becomes a heading followed by its text, nested
// tabs one level deeper.

use super::google_api::{GoogleApi, GoogleError, DOCS_BASE_URL};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// GOOGLE DOCS API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    document_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tabs: Vec<Tab>,
    /// Only populated when tabs content was not requested.
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tab {
    tab_properties: TabProperties,
    document_tab: Option<DocumentTab>,
    #[serde(default)]
    child_tabs: Vec<Tab>,
}

#[derive(Debug, Deserialize)]
struct TabProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct DocumentTab {
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuralElement {
    end_index: Option<i64>,
    paragraph: Option<Paragraph>,
    table: Option<Table>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
    paragraph_style: Option<ParagraphStyle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphStyle {
    named_style_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    #[serde(default)]
    table_rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRow {
    #[serde(default)]
    table_cells: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<serde_json::Value>,
}

// =============================================================================
// PUBLIC TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentText {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
}

/// Where `write_text` inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertLocation {
    Start,
    #[default]
    End,
}

impl InsertLocation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "start" => Some(InsertLocation::Start),
            "end" => Some(InsertLocation::End),
            _ => None,
        }
    }
}

pub fn document_url(document_id: &str) -> String {
    format!("https://docs.google.com/document/d/{}/edit", document_id)
}

/// Extracts the document ID from a Google Docs URL, or accepts a bare ID.
pub fn extract_doc_id(url_or_id: &str) -> Option<String> {
    let url_or_id = url_or_id.trim();
    if url_or_id.contains("docs.google.com") {
        if let Some(start) = url_or_id.find("/document/d/") {
            let after_d = &url_or_id[start + 12..];
            let end = after_d
                .find(|c: char| c == '/' || c == '?' || c == '#')
                .unwrap_or(after_d.len());
            let id = &after_d[..end];
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    } else if !url_or_id.is_empty() && !url_or_id.contains('/') && !url_or_id.contains(' ') {
        return Some(url_or_id.to_string());
    }
    None
}

// =============================================================================
// GOOGLE DOCS CLIENT
// =============================================================================

pub struct DocsClient {
    api: Arc<GoogleApi>,
    base_url: String,
}

impl DocsClient {
    pub fn new(api: Arc<GoogleApi>) -> Self {
        Self {
            api,
            base_url: DOCS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn resolve_id(doc_id_or_url: &str) -> Result<String, GoogleError> {
        extract_doc_id(doc_id_or_url)
            .ok_or_else(|| GoogleError::InvalidDocumentId(doc_id_or_url.to_string()))
    }

    async fn fetch(&self, document_id: &str, include_tabs: bool) -> Result<Document, GoogleError> {
        let url = format!("{}/documents/{}", self.base_url, document_id);
        let query = if include_tabs {
            vec![("includeTabsContent", "true".to_string())]
        } else {
            Vec::new()
        };
        self.api.get(&url, &query).await
    }

    async fn batch_update(
        &self,
        document_id: &str,
        requests: serde_json::Value,
    ) -> Result<BatchUpdateResponse, GoogleError> {
        let url = format!("{}/documents/{}:batchUpdate", self.base_url, document_id);
        self.api
            .post(&url, &[], &json!({ "requests": requests }))
            .await
    }

    pub async fn create_document(&self, title: &str) -> Result<DocumentRef, GoogleError> {
        let url = format!("{}/documents", self.base_url);
        let document: Document = self.api.post(&url, &[], &json!({ "title": title })).await?;

        Ok(DocumentRef {
            url: document_url(&document.document_id),
            id: document.document_id,
            title: document.title,
        })
    }

    /// Reads the full text of a document, all tabs included.
    pub async fn read_document(&self, doc_id_or_url: &str) -> Result<DocumentText, GoogleError> {
        let document_id = Self::resolve_id(doc_id_or_url)?;
        let document = self.fetch(&document_id, true).await?;
        let content = document_text(&document);

        tracing::info!(
            "Read Google Doc '{}' with {} top-level tab(s): {} chars",
            document.title,
            document.tabs.len(),
            content.len()
        );

        Ok(DocumentText {
            url: document_url(&document.document_id),
            id: document.document_id,
            title: document.title,
            content,
        })
    }

    /// Inserts `text` plus a trailing newline at the start or end of the body.
    pub async fn write_text(
        &self,
        doc_id_or_url: &str,
        text: &str,
        location: InsertLocation,
    ) -> Result<String, GoogleError> {
        let document_id = Self::resolve_id(doc_id_or_url)?;
        let document = self.fetch(&document_id, false).await?;
        let index = insertion_index(&document, location)?;

        self.batch_update(
            &document_id,
            json!([{
                "insertText": {
                    "location": { "index": index },
                    "text": format!("{}\n", text),
                }
            }]),
        )
        .await?;

        Ok(document_url(&document_id))
    }

    /// Replaces every case-insensitive occurrence of `search` and returns how
    /// many were changed.
    pub async fn replace_text(
        &self,
        doc_id_or_url: &str,
        search: &str,
        replacement: &str,
    ) -> Result<u64, GoogleError> {
        let document_id = Self::resolve_id(doc_id_or_url)?;
        let response = self
            .batch_update(
                &document_id,
                json!([{
                    "replaceAllText": {
                        "containsText": { "text": search, "matchCase": false },
                        "replaceText": replacement,
                    }
                }]),
            )
            .await?;

        // Google omits occurrencesChanged when nothing matched
        Ok(response
            .replies
            .first()
            .and_then(|reply| reply["replaceAllText"]["occurrencesChanged"].as_u64())
            .unwrap_or(0))
    }
}

// =============================================================================
// TEXT EXTRACTION
// =============================================================================

fn document_text(document: &Document) -> String {
    let mut output = String::new();

    if !document.tabs.is_empty() {
        extract_tabs_text(&document.tabs, &mut output, 0);
    } else if let Some(body) = &document.body {
        extract_body_text(body, &mut output);
    }

    output.trim().to_string()
}

fn extract_tabs_text(tabs: &[Tab], output: &mut String, depth: usize) {
    // A document with one plain tab reads as plain text
    let show_headings = tabs.len() > 1 || depth > 0 || !tabs[0].child_tabs.is_empty();

    for tab in tabs {
        if show_headings {
            let indent = "#".repeat(depth + 2);
            output.push_str(&format!("\n{} {}\n\n", indent, tab.tab_properties.title));
        }

        if let Some(body) = tab.document_tab.as_ref().and_then(|t| t.body.as_ref()) {
            extract_body_text(body, output);
        }

        if !tab.child_tabs.is_empty() {
            extract_tabs_text(&tab.child_tabs, output, depth + 1);
        }
    }
}

fn extract_body_text(body: &Body, output: &mut String) {
    for element in &body.content {
        extract_element_text(element, output);
    }
}

fn extract_element_text(element: &StructuralElement, output: &mut String) {
    if let Some(paragraph) = &element.paragraph {
        let style = paragraph
            .paragraph_style
            .as_ref()
            .and_then(|s| s.named_style_type.as_deref());
        match style {
            Some("HEADING_1") => output.push_str("### "),
            Some("HEADING_2") => output.push_str("#### "),
            Some("HEADING_3") => output.push_str("##### "),
            _ => {}
        }

        for run in paragraph.elements.iter().filter_map(|e| e.text_run.as_ref()) {
            if let Some(content) = &run.content {
                output.push_str(content);
            }
        }
    }

    if let Some(table) = &element.table {
        output.push('\n');
        for row in &table.table_rows {
            let cells: Vec<String> = row
                .table_cells
                .iter()
                .map(|cell| {
                    let mut cell_text = String::new();
                    for cell_element in &cell.content {
                        extract_element_text(cell_element, &mut cell_text);
                    }
                    cell_text.trim().to_string()
                })
                .collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        output.push('\n');
    }
}

/// Index 1 is the start of the body; the last index before the body's final
/// newline is its end.
fn insertion_index(document: &Document, location: InsertLocation) -> Result<i64, GoogleError> {
    if location == InsertLocation::Start {
        return Ok(1);
    }

    let end_index = document
        .body
        .as_ref()
        .and_then(|body| body.content.last())
        .and_then(|element| element.end_index)
        .ok_or_else(|| GoogleError::Unexpected("document body has no end index".to_string()))?;

    Ok((end_index - 1).max(1))
}
