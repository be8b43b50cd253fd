//! Document loading for the supported upload formats.

use std::path::Path;

use crate::error::{Error, Result};

/// The file formats ingestion accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
    Markdown,
}

impl DocumentKind {
    /// Classify a path by its (case-insensitive) extension.
    ///
    /// Returns `None` for anything other than `pdf`, `txt` or `md`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Lowercased extension with a leading dot, or an empty string.
pub fn extension_label(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// A document's text, one entry per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub pages: Vec<String>,
}

impl LoadedDocument {
    pub fn total_pages(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX).max(1)
    }

    /// All page texts joined by a blank line.
    pub fn text(&self) -> String {
        self.pages.join("\n\n")
    }
}

/// Load a document from disk.
///
/// Text and markdown files are one page. PDFs yield one entry per page.
pub fn load(path: &Path) -> Result<LoadedDocument> {
    match DocumentKind::from_path(path) {
        Some(DocumentKind::Pdf) => load_pdf(path),
        Some(DocumentKind::Text | DocumentKind::Markdown) => {
            let content = std::fs::read_to_string(path)?;
            Ok(LoadedDocument {
                pages: vec![content],
            })
        }
        None => Err(Error::UnsupportedFile(extension_label(path))),
    }
}

fn load_pdf(path: &Path) -> Result<LoadedDocument> {
    let doc = lopdf::Document::load(path)?;
    let mut pages = Vec::new();

    for page_number in doc.get_pages().into_keys() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(
                    page = page_number,
                    error = %e,
                    "no extractable text on PDF page"
                );
                String::new()
            }
        };
        pages.push(text);
    }

    Ok(LoadedDocument { pages })
}

/// Write a PDF with one text line per page.
#[cfg(test)]
pub(crate) fn write_test_pdf(path: &Path, pages: &[&str]) {
    use lopdf::{
        Document,
        Object,
        Stream,
        content::{Content, Operation},
        dictionary,
    };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
