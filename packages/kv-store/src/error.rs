//! Error types for the store layer.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The key does not exist in the backend.
    #[error("Key not found in store: {key}")]
    NotFound { key: String },

    /// The backend answered, but not in a way we can use.
    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the key is absent rather than unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_key() {
        let e = Error::NotFound {
            key: "/foo/bar".to_string(),
        };
        assert_eq!(format!("{}", e), "Key not found in store: /foo/bar");
        assert!(e.is_not_found());
    }

    #[test]
    fn backend_is_not_not_found() {
        let e = Error::Backend {
            message: "cluster unavailable".to_string(),
        };
        assert!(!e.is_not_found());
        assert!(format!("{}", e).contains("cluster unavailable"));
    }
}
