use crate::error::RagError;
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Bytes inspected when deciding whether a file is binary
const BINARY_SNIFF_LEN: usize = 8192;

/// Directories that never hold useful source text
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__"];

/// Represents a document with its content and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The text content of the document
    pub text: String,
    /// Path of the file relative to the loaded directory
    pub source_path: String,
    /// `file_path`, `file_name`, `file_type` and `file_size`
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Read a single file. Returns `Ok(None)` for binary, unsupported or empty files.
    pub fn from_file<P: AsRef<Path>>(
        file_path: P,
        source_path: &str,
    ) -> Result<Option<Self>, RagError> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RagError::DocumentLoad(format!("invalid file name: {}", path.display()))
            })?
            .to_string();

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type {} for {}", mime_type, source_path);

        let Some(text) = read_document_content(path, &mime_type)? else {
            return Ok(None);
        };

        if text.trim().is_empty() {
            debug!("Skipping empty file: {}", source_path);
            return Ok(None);
        }

        let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut metadata = BTreeMap::new();
        metadata.insert("file_path".to_string(), source_path.to_string());
        metadata.insert("file_name".to_string(), file_name);
        metadata.insert("file_type".to_string(), mime_type);
        metadata.insert("file_size".to_string(), file_size.to_string());

        Ok(Some(Document {
            text,
            source_path: source_path.to_string(),
            metadata,
        }))
    }
}

/// Load every ingestible file under `dir`, in sorted path order
pub fn load_documents<P: AsRef<Path>>(dir: P) -> Result<Vec<Document>, RagError> {
    let root = dir.as_ref();

    if !root.is_dir() {
        return Err(RagError::DocumentLoad(format!(
            "directory does not exist: {}",
            root.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let source_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        match Document::from_file(path, &source_path) {
            Ok(Some(document)) => documents.push(document),
            Ok(None) => skipped += 1,
            Err(e) => {
                warn!("Skipping {}: {}", source_path, e);
                skipped += 1;
            }
        }
    }

    if documents.is_empty() {
        return Err(RagError::DocumentLoad(format!(
            "no ingestible files found in {}",
            root.display()
        )));
    }

    info!(
        "Loaded {} documents from {} ({} files skipped)",
        documents.len(),
        root.display(),
        skipped
    );

    Ok(documents)
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&&*name))
}

/// Read content from a document based on its MIME type.
/// Returns `Ok(None)` when the file is not text.
pub fn read_document_content<P: AsRef<Path>>(
    file_path: P,
    mime_type: &str,
) -> Result<Option<String>, RagError> {
    let path = file_path.as_ref();

    // Handle PDF documents
    if mime_type.starts_with("application/pdf") {
        info!("Processing PDF document: {}", path.display());
        let content = extract_text(path).map_err(|e| {
            RagError::DocumentLoad(format!(
                "failed to extract text from PDF {}: {}",
                path.display(),
                e
            ))
        })?;

        // PDF extraction can sometimes include excessive whitespace
        let cleaned_content = normalize_whitespace(&content);

        if cleaned_content.is_empty() {
            warn!("Extracted PDF content is empty or contains only whitespace");
        }

        return Ok(Some(cleaned_content));
    }

    // Everything else is accepted as long as it is UTF-8 text
    let bytes = fs::read(path).map_err(|e| {
        RagError::DocumentLoad(format!("failed to read {}: {}", path.display(), e))
    })?;

    if looks_binary(&bytes) {
        debug!("Skipping binary file: {}", path.display());
        return Ok(None);
    }

    match String::from_utf8(bytes) {
        Ok(content) => Ok(Some(content)),
        Err(_) => {
            debug!("Skipping non UTF-8 file: {}", path.display());
            Ok(None)
        }
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // At most two consecutive newlines survive (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            // Don't add consecutive spaces
            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}
