//! Document text extraction and chunking.
//!
//! PDF, DOCX, PPTX and CSV have dedicated readers. Every other file is
//! read as UTF-8 plain text.

mod office;
mod pdf;
mod tabular;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    #[error("unreadable {format} document {path}: {reason}")]
    Corrupt {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    #[error("document is not valid UTF-8 text: {0}")]
    Decode(PathBuf),

    #[error("IO error reading document: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a document into ordered text chunks.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

/// Reader selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    Docx,
    Pptx,
    Csv,
    Text,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Format::Pdf,
            "docx" => Format::Docx,
            "pptx" => Format::Pptx,
            "csv" => Format::Csv,
            _ => Format::Text,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Format::Pdf => "PDF",
            Format::Docx => "DOCX",
            Format::Pptx => "PPTX",
            Format::Csv => "CSV",
            Format::Text => "text",
        }
    }
}

/// Extracts text by file format and chunks it.
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    chunk_size: usize,
}

impl DocumentExtractor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Extractor for DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::NotFound(path.to_path_buf()));
        }

        let format = Format::from_path(path);
        let bytes = std::fs::read(path)?;
        let read = match format {
            Format::Pdf => pdf::read_pdf(&bytes),
            Format::Docx => office::read_docx(&bytes),
            Format::Pptx => office::read_pptx(&bytes),
            Format::Csv => tabular::read_csv(&bytes),
            Format::Text => match String::from_utf8(bytes) {
                Ok(text) => Ok(text),
                Err(_) => return Err(ExtractionError::Decode(path.to_path_buf())),
            },
        };
        let text = read.map_err(|reason| ExtractionError::Corrupt {
            path: path.to_path_buf(),
            format: format.name(),
            reason,
        })?;

        let chunks = chunk_text(&text, self.chunk_size);
        tracing::debug!(
            "Extracted {} chunks from {} ({})",
            chunks.len(),
            path.display(),
            format.name()
        );
        Ok(chunks)
    }
}

/// Collapse whitespace and greedily wrap words into chunks of at most
/// `max_chars` characters. Words longer than `max_chars` are split.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                if piece.len() == max_chars {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_collapses_whitespace() {
        let chunks = chunk_text("  Paris   is\n\tthe capital  of France. ", 500);
        assert_eq!(chunks, vec!["Paris is the capital of France.".to_string()]);
    }

    #[test]
    fn test_chunk_respects_limit() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = chunk_text(text, 11);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 11));
    }

    #[test]
    fn test_chunk_splits_long_words() {
        let chunks = chunk_text("abcdefghij xy", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij", "xy"]);
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunk_size_counts_characters() {
        let chunks = chunk_text("été été", 3);
        assert_eq!(chunks, vec!["été", "été"]);
        assert_eq!(chunks[0].len(), 5);
    }

    #[test]
    fn test_chunk_empty() {
        assert!(chunk_text("   \n ", 10).is_empty());
    }

    #[test]
    fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("geo.txt");
        fs::write(&path, "Paris is the capital of France.\n").unwrap();

        let chunks = DocumentExtractor::new(500).extract(&path).unwrap();
        assert_eq!(chunks, vec!["Paris is the capital of France.".to_string()]);
    }

    #[test]
    fn test_unknown_extension_read_as_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.rst");
        fs::write(&path, "plain words").unwrap();

        assert_eq!(DocumentExtractor::new(500).extract(&path).unwrap(), vec!["plain words"]);
    }

    #[test]
    fn test_extract_errors() {
        let dir = TempDir::new().unwrap();
        let extractor = DocumentExtractor::new(500);

        let missing = extractor.extract(&dir.path().join("missing.txt"));
        assert!(matches!(missing, Err(ExtractionError::NotFound(_))));

        let binary = dir.path().join("blob.bin");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            extractor.extract(&binary),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn test_csv_rendered_as_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cities.csv");
        fs::write(&path, "city,country\nParis,France\n").unwrap();

        let chunks = DocumentExtractor::new(500).extract(&path).unwrap();
        assert_eq!(chunks, vec!["city country Paris France".to_string()]);
    }

    #[test]
    fn test_docx_extracted_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("geo.DOCX");
        let body = office::tests::docx_body(&["Paris is the capital", "of France."]);
        fs::write(&path, office::tests::package(&[("word/document.xml", body.as_str())])).unwrap();

        let chunks = DocumentExtractor::new(500).extract(&path).unwrap();
        assert_eq!(chunks, vec!["Paris is the capital of France.".to_string()]);
    }

    #[test]
    fn test_pdf_goes_through_pdf_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paper.PDF");
        fs::write(&path, b"%PDF-1.4 truncated").unwrap();

        match DocumentExtractor::new(500).extract(&path) {
            Err(ExtractionError::Corrupt { format, .. }) => assert_eq!(format, "PDF"),
            other => panic!("expected a corrupt PDF error, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_office_falls_back_to_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.doc");
        fs::write(&path, "saved as plain text").unwrap();

        let chunks = DocumentExtractor::new(500).extract(&path).unwrap();
        assert_eq!(chunks, vec!["saved as plain text".to_string()]);
    }
}
