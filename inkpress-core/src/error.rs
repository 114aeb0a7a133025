use thiserror::Error;

/// Failure to bring a document into a session. The previous session, if any,
/// is left untouched by every failed load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not a valid document: {0}")]
    Malformed(String),
    #[error("document is password protected")]
    PasswordProtected,
}

/// Failure to flatten a session into output bytes. No partial output is ever
/// produced.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no document loaded")]
    NoDocumentLoaded,
    #[error("document serialization failed: {0}")]
    SerializationFailed(String),
}
