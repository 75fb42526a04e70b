use std::fmt;

#[derive(Debug)]
pub enum DocMergeError {
    InvalidPageIndex { index: usize, len: usize },
    InvalidConfiguration(String),
    Layout(String),
    /// A row renderer panicked.
    Render(String),
    Pdf(String),
    Docx(String),
    Archive(String),
    Transport(String),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for DocMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocMergeError::InvalidPageIndex { index, len } => {
                write!(f, "page index {} out of range (template has {} pages)", index, len)
            }
            DocMergeError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            DocMergeError::Layout(message) => write!(f, "layout error: {}", message),
            DocMergeError::Render(message) => write!(f, "render failed: {}", message),
            DocMergeError::Pdf(message) => write!(f, "pdf error: {}", message),
            DocMergeError::Docx(message) => write!(f, "docx error: {}", message),
            DocMergeError::Archive(message) => write!(f, "archive error: {}", message),
            DocMergeError::Transport(message) => write!(f, "mail transport error: {}", message),
            DocMergeError::Json(err) => write!(f, "json error: {}", err),
            DocMergeError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for DocMergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocMergeError::Json(err) => Some(err),
            DocMergeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DocMergeError {
    fn from(value: std::io::Error) -> Self {
        DocMergeError::Io(value)
    }
}

impl From<serde_json::Error> for DocMergeError {
    fn from(value: serde_json::Error) -> Self {
        DocMergeError::Json(value)
    }
}

impl From<lopdf::Error> for DocMergeError {
    fn from(value: lopdf::Error) -> Self {
        DocMergeError::Pdf(value.to_string())
    }
}

impl From<zip::result::ZipError> for DocMergeError {
    fn from(value: zip::result::ZipError) -> Self {
        DocMergeError::Archive(value.to_string())
    }
}

impl From<docx_rs::DocxError> for DocMergeError {
    fn from(value: docx_rs::DocxError) -> Self {
        DocMergeError::Docx(value.to_string())
    }
}
