mod client;
mod document;
mod sanitize;
mod version;

pub use client::{
    CollectionStatus, Credentials, DavResponse, DocumentLocation, RemoteDocumentStore,
    WebdavClient, WebdavError,
};
pub use document::{
    ConfigDocument, DocumentError, LEGACY_SCRIPT_VERSION_KEY, MAX_TIMESTAMP_MILLIS,
    SCRIPT_VERSION_KEY, format_timestamp,
};
pub use sanitize::ensure_array;
pub use version::compare_version;
