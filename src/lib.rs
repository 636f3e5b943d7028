pub mod codec;
pub mod config;
pub mod directory;
pub mod profiles;
pub mod reconcile;
pub mod schema;
pub mod server;
pub mod service;
pub mod transcode;

pub use config::Config;
pub use server::Server;

use directory::DirectoryError;
use transcode::RequestError;

#[derive(thiserror::Error, Debug)]
pub enum AdRestError {
    #[error("attribute validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("missing attribute(s): {}", .0.join(", "))]
    MissingAttribute(Vec<String>),

    #[error("case collision in attribute keys: {0}")]
    AmbiguousAttributeKey(String),

    #[error("{0}")]
    Request(#[from] RequestError),

    #[error("operation expects singular result")]
    EmptyResults,

    #[error("operation expects singular result")]
    NonUniqueResults,

    #[error("failed to reload resource: {0}")]
    ReloadAfterModify(String),

    #[error("{0}")]
    Directory(#[from] DirectoryError),

    #[error("Resource not found: {0}")]
    ProfileNotFound(String),

    #[error("Resource already exists: {0}")]
    ProfileExists(String),

    #[error("Resource name mismatch: {0}")]
    ProfileMismatch(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Kerberos error: {0}")]
    Kerberos(String),

    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdRestError {
    /// True for failures caused by the caller's input rather than by the
    /// service or the directory server.
    pub fn is_client_error(&self) -> bool {
        match self {
            AdRestError::Validation(_)
            | AdRestError::MissingAttribute(_)
            | AdRestError::AmbiguousAttributeKey(_)
            | AdRestError::Request(_)
            | AdRestError::EmptyResults
            | AdRestError::NonUniqueResults
            | AdRestError::ProfileNotFound(_)
            | AdRestError::ProfileExists(_)
            | AdRestError::ProfileMismatch(_) => true,
            AdRestError::Directory(e) => e.kind.is_client_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdRestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use directory::DirectoryErrorKind;

    #[test]
    fn test_validation_error_names_every_attribute() {
        let err = AdRestError::Validation(vec!["badAttr1".to_string(), "badAttr2".to_string()]);
        assert_eq!(err.to_string(), "attribute validation failed: badAttr1, badAttr2");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_result_count_errors_share_message() {
        assert_eq!(
            AdRestError::EmptyResults.to_string(),
            AdRestError::NonUniqueResults.to_string()
        );
    }

    #[test]
    fn test_reload_failure_is_server_error() {
        let err = AdRestError::ReloadAfterModify("cn=x,dc=example,dc=com".to_string());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_directory_error_classification() {
        let bad_input = AdRestError::from(DirectoryError::new(
            DirectoryErrorKind::ObjectClassViolation,
            "object class violation",
        ));
        assert!(bad_input.is_client_error());

        let unclassified =
            AdRestError::from(DirectoryError::new(DirectoryErrorKind::Other(52), "unavailable"));
        assert!(!unclassified.is_client_error());
    }
}
