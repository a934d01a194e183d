//! Error types for the Dymaxion Labs client.

// Field-level docs would mostly repeat the variant docs.
#![allow(missing_docs)]

use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::result;
use thiserror::Error;
use url::Url;

/// A custom `Result`, for convenience.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Query parameters which may carry credentials and must never be logged.
const SENSITIVE_QUERY_PARAMS: &[&str] =
    &["api_key", "upload_id", "signature", "token", "X-Goog-Signature"];

/// A Dymaxion Labs client error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server answered 404 Not Found.
    #[non_exhaustive]
    #[error("not found: {url} ({body})")]
    NotFound { url: Url, body: String },

    /// The server answered with a 4xx status other than 404.
    #[non_exhaustive]
    #[error("bad request: {status} for {url} ({body})")]
    BadRequest {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// The server answered with a 5xx status.
    #[non_exhaustive]
    #[error("internal server error: {status} for {url} ({body})")]
    InternalServerError {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// We received an HTTP status code that fits no other category.
    #[non_exhaustive]
    #[error("{status} for {url} ({body})")]
    UnexpectedHttpStatus {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// We could not access the specified URL.
    ///
    /// **WARNING:** Do not construct this directly, but use
    /// `Error::could_not_access_url`, which strips credentials from the URL.
    #[non_exhaustive]
    #[error("error accessing '{url}': {source}")]
    CouldNotAccessUrl { url: Url, source: Box<Error> },

    /// We could not parse a URL.
    #[non_exhaustive]
    #[error("could not parse URL {value:?}: {source}")]
    CouldNotParseUrl {
        value: String,
        source: url::ParseError,
    },

    /// We could not read a local file.
    #[non_exhaustive]
    #[error("could not read file {path:?}: {source}")]
    CouldNotReadFile { path: PathBuf, source: Box<Error> },

    /// We could not write a local file.
    #[non_exhaustive]
    #[error("could not write file {path:?}: {source}")]
    CouldNotWriteFile { path: PathBuf, source: Box<Error> },

    /// The user must specify the environment variable `var`.
    #[non_exhaustive]
    #[error("must specify {var}")]
    MissingEnvVar { var: String },

    /// An argument failed a local check before any request was sent.
    #[non_exhaustive]
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// We encountered an unknown estimator type.
    #[non_exhaustive]
    #[error("unknown estimator type {type_name:?} (expected \"object_detection\" or \"segmentation\")")]
    UnknownEstimatorType { type_name: String },

    /// The task has not reached a terminal state yet.
    #[non_exhaustive]
    #[error("task {id} is still running (state {state})")]
    TaskStillRunning { id: String, state: String },

    /// `transmit_next_chunk` was called before `initiate`.
    #[non_exhaustive]
    #[error("resumable upload was not initiated")]
    UploadNotInitiated {},

    /// `transmit_next_chunk` was called after the upload finished.
    #[non_exhaustive]
    #[error("resumable upload has already finished")]
    UploadAlreadyFinished {},

    /// The upload server sent a response we can't reconcile with what we
    /// sent.
    #[non_exhaustive]
    #[error("invalid response from upload session {url}: {message}")]
    InvalidUploadResponse { url: Url, message: String },

    /// A wait timed out.
    #[non_exhaustive]
    #[error("the operation timed out")]
    Timeout {},

    /// A wait was cancelled by its cancellation token.
    #[non_exhaustive]
    #[error("the wait was cancelled")]
    WaitCancelled {},

    /// Another kind of error occurred.
    #[non_exhaustive]
    #[error("{source}")]
    Other {
        /// The original error.
        #[from]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl Error {
    /// Construct an `Error::CouldNotAccessUrl` value, taking care to
    /// sanitize the URL query.
    pub(crate) fn could_not_access_url<E>(url: &Url, error: E) -> Error
    where
        E: Into<Error>,
    {
        Error::CouldNotAccessUrl {
            url: url_without_credentials(url),
            source: Box::new(error.into()),
        }
    }

    pub(crate) fn could_not_parse_url<S: Into<String>>(
        value: S,
        error: url::ParseError,
    ) -> Error {
        Error::CouldNotParseUrl {
            value: value.into(),
            source: error,
        }
    }

    pub(crate) fn could_not_read_file<P, E>(path: P, error: E) -> Error
    where
        P: Into<PathBuf>,
        E: Into<Error>,
    {
        Error::CouldNotReadFile {
            path: path.into(),
            source: Box::new(error.into()),
        }
    }

    pub(crate) fn could_not_write_file<P, E>(path: P, error: E) -> Error
    where
        P: Into<PathBuf>,
        E: Into<Error>,
    {
        Error::CouldNotWriteFile {
            path: path.into(),
            source: Box::new(error.into()),
        }
    }

    /// Construct a `MissingEnvVar` value.
    pub(crate) fn missing_env_var<S: Into<String>>(var: S) -> Self {
        Error::MissingEnvVar { var: var.into() }
    }

    /// Construct an `InvalidArgument` value.
    pub(crate) fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status onto our error taxonomy.
    pub(crate) fn from_status(url: &Url, status: StatusCode, body: String) -> Error {
        let url = url_without_credentials(url);
        if status == StatusCode::NOT_FOUND {
            Error::NotFound { url, body }
        } else if status.is_client_error() {
            Error::BadRequest { url, status, body }
        } else if status.is_server_error() {
            Error::InternalServerError { url, status, body }
        } else {
            Error::UnexpectedHttpStatus { url, status, body }
        }
    }

    /// Is this error likely to be temporary?
    pub fn might_be_temporary(&self) -> bool {
        match self {
            Error::CouldNotAccessUrl { source, .. } => source.might_be_temporary(),
            Error::CouldNotReadFile { source, .. } => source.might_be_temporary(),
            Error::BadRequest { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            Error::InternalServerError { status, .. } => matches!(
                *status,
                StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            // Per-call timeouts and dropped connections are worth another try.
            Error::Other { source } => source
                .downcast_ref::<reqwest::Error>()
                .map(|e| e.is_timeout() || e.is_connect())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Return the original `Error` that caused this error, without any
    /// wrapper errors.
    pub fn original_error(&self) -> &Error {
        match self {
            Error::CouldNotAccessUrl { source, .. }
            | Error::CouldNotReadFile { source, .. }
            | Error::CouldNotWriteFile { source, .. } => source.original_error(),
            _ => self,
        }
    }

    /// Is this (or the error it wraps) a 404 from the server?
    pub fn is_not_found(&self) -> bool {
        matches!(self.original_error(), Error::NotFound { .. })
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

/// Given a URL with possible credentials in its query (an `api_key`, or the
/// `upload_id` of a resumable session), replace them with `*****` to minimize
/// the risk of leaking credentials into logs somewhere.
pub(crate) fn url_without_credentials(url: &Url) -> Url {
    if url.query().is_none() {
        return url.to_owned();
    }

    let mut query = BTreeMap::new();
    for (k, v) in url.query_pairs() {
        query.insert(k.into_owned(), v.into_owned());
    }

    let mut new_url = url.to_owned();
    {
        let mut serializer = new_url.query_pairs_mut();
        serializer.clear();
        for (k, v) in query.iter() {
            if SENSITIVE_QUERY_PARAMS.contains(&k.as_str()) {
                serializer.append_pair(k, "*****");
            } else {
                serializer.append_pair(k, v);
            }
        }
    }
    new_url
}

#[test]
fn url_without_credentials_is_sanitized() {
    let url = Url::parse("https://storage.example.com/upload?path=a.tif&upload_id=12345")
        .expect("could not parse URL");
    let cleaned = url_without_credentials(&url);
    assert_eq!(
        cleaned.as_str(),
        "https://storage.example.com/upload?path=a.tif&upload_id=*****"
    );
}

#[test]
fn url_without_query_is_unchanged() {
    let url = Url::parse("https://api.dymaxionlabs.com/tasks/1/").unwrap();
    assert_eq!(url_without_credentials(&url), url);
}

#[test]
fn status_codes_are_classified() {
    let url = Url::parse("https://api.dymaxionlabs.com/tasks/1/").unwrap();
    let err = Error::from_status(&url, StatusCode::NOT_FOUND, String::new());
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(err.is_not_found());
    let err = Error::from_status(&url, StatusCode::CONFLICT, String::new());
    assert!(matches!(err, Error::BadRequest { .. }));
    assert!(!err.might_be_temporary());
    let err = Error::from_status(&url, StatusCode::TOO_MANY_REQUESTS, String::new());
    assert!(err.might_be_temporary());
    let err = Error::from_status(&url, StatusCode::BAD_GATEWAY, String::new());
    assert!(matches!(err, Error::InternalServerError { .. }));
    assert!(err.might_be_temporary());
    let err = Error::from_status(&url, StatusCode::NOT_IMPLEMENTED, String::new());
    assert!(!err.might_be_temporary());
}

#[test]
fn wrapped_errors_expose_original() {
    let url = Url::parse("https://api.dymaxionlabs.com/storage/file/").unwrap();
    let inner = Error::from_status(&url, StatusCode::NOT_FOUND, "gone".to_owned());
    let outer = Error::could_not_access_url(&url, inner);
    assert!(outer.is_not_found());
}
