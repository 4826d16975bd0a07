use thiserror::Error;

/// Errors raised while reading resources out of a request, or while writing
/// them into a response.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request has no {0} state")]
    MissingState(&'static str),

    #[error("resource {name:?} has no document")]
    MissingDocument { name: String },

    #[error("malformed resource {name:?}")]
    Malformed {
        name: String,
        #[source]
        source: DocumentError,
    },

    #[error("resource {name:?} cannot be installed into the response")]
    NotInstallable {
        name: String,
        #[source]
        source: DocumentError,
    },

    #[error("cannot parse function input")]
    Input(#[source] serde_json::Error),
}

/// A structural problem with a single resource document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("{0} must be an object")]
    NotAnObject(&'static str),

    #[error("label {0:?} must have a string value")]
    LabelNotString(String),

    #[error("{0} must be a non-empty string")]
    MissingField(&'static str),
}
