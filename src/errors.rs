//! Error types for the crash-handling pipeline.
//!
//! Each enum covers one concern and carries a [`name`] accessor so log
//! lines can lead with a stable, grep-friendly tag.
//!
//! [`name`]: HandlerError::name

use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline errors.
///
/// These are the only conditions that stop a run outright: continuing as
/// root after a failed drop is unsafe, and without a captured dump file
/// every later stage is meaningless.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler's own executable path could not be determined.
    #[error("unable to locate the handler executable: {0}")]
    ExeLookup(#[source] std::io::Error),
    /// Could not change into the handler's own directory.
    #[error("unable to change into {path:?}: {source}")]
    Chdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Could not stat a file for its owning uid/gid.
    #[error("unable to stat {path:?} for its owner: {source}")]
    OwnerLookup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A privilege-lowering syscall failed.
    #[error("privilege drop failed: {0}")]
    PrivilegeDrop(#[source] nix::Error),
    /// The dump could not be written to local disk.
    #[error("unable to write dump to {path:?}: {source}")]
    DumpWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HandlerError {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerError::ExeLookup(_) => "ExeLookup",
            HandlerError::Chdir { .. } => "Chdir",
            HandlerError::OwnerLookup { .. } => "OwnerLookup",
            HandlerError::PrivilegeDrop(_) => "PrivilegeDrop",
            HandlerError::DumpWrite { .. } => "DumpWrite",
        }
    }
}

/// Errors from the object-storage client.
///
/// All of these degrade the pipeline rather than stopping it: the
/// notification is posted with an explicit upload-failure line instead of
/// a download link.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage service or bucket could not be reached.
    #[error("storage connection failed: {0}")]
    Connect(String),
    /// The multipart transaction could not be started.
    #[error("multipart upload could not be started: {0}")]
    Create(String),
    /// One part failed to upload.
    #[error("part {part} failed to upload: {msg}")]
    Part { part: i32, msg: String },
    /// The multipart transaction could not be finalized.
    #[error("multipart completion failed: {0}")]
    Complete(String),
    /// The started transaction could not be aborted either.
    #[error("multipart abort failed: {0}")]
    Abort(String),
    /// The retrieval URL could not be signed.
    #[error("presigning the retrieval URL failed: {0}")]
    Presign(String),
    /// The local dump file could not be read or compressed.
    #[error("dump file error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn name(&self) -> &'static str {
        match self {
            StoreError::Connect(_) => "Connect",
            StoreError::Create(_) => "Create",
            StoreError::Part { .. } => "Part",
            StoreError::Complete(_) => "Complete",
            StoreError::Abort(_) => "Abort",
            StoreError::Presign(_) => "Presign",
            StoreError::Io(_) => "Io",
        }
    }
}

/// Errors from posting the chat message.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The HTTP request itself failed.
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The chat API answered but rejected the message.
    #[error("chat API rejected the message: {0}")]
    Api(String),
}

impl NotifyError {
    pub fn name(&self) -> &'static str {
        match self {
            NotifyError::Transport(_) => "Transport",
            NotifyError::Api(_) => "Api",
        }
    }
}

/// Errors resolving the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file named by `CRASH_REPORTER_CONFIG` is unreadable.
    #[error("unable to read config file {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML (or has mistyped fields).
    #[error("malformed config file {path:?}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// An environment override holds a value that does not parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

impl ConfigError {
    pub fn name(&self) -> &'static str {
        match self {
            ConfigError::ReadFile { .. } => "ReadFile",
            ConfigError::ParseFile { .. } => "ParseFile",
            ConfigError::InvalidValue { .. } => "InvalidValue",
        }
    }
}
