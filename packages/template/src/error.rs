//! Template errors.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The template text could not be parsed.
    #[error("template: {name}:{line}: {message}")]
    Syntax {
        name: String,
        line: usize,
        message: String,
    },

    /// The template parsed but expansion failed.
    #[error("template: {name}:{line}: executing \"{name}\": {message}")]
    Exec {
        name: String,
        line: usize,
        message: String,
    },

    /// The context value could not be turned into template data.
    #[error("template context could not be serialized: {0}")]
    Context(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn syntax(name: &str, line: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn exec(name: &str, line: usize, message: impl Into<String>) -> Self {
        Error::Exec {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }
}
