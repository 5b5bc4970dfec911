//! Error types for the notification crate.

use std::path::PathBuf;

/// Errors that can occur while rendering notifications.
#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    /// No template registered under this name.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Error occurred while rendering a template.
    #[error("template render error: {0}")]
    TemplateRenderError(String),

    /// An override template failed to compile.
    #[error("template syntax error in {name}: {message}")]
    TemplateSyntaxError {
        /// Template name.
        name: String,
        /// Compiler message.
        message: String,
    },

    /// Failed to read an override template.
    #[error("template load error: {path}")]
    TemplateLoadError {
        /// Path to the template that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Override directory does not exist or is not a directory.
    #[error("template directory not found: {0}")]
    TemplateDirectoryNotFound(PathBuf),

    /// Override directory listing failed.
    #[error("failed to list templates in {path}")]
    TemplateListError {
        /// Path to the template directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
