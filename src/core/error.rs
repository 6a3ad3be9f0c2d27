//! Purpose: Crate-wide error type shared by the engine, the session and the binary.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Every fallible operation returns `Result<_, Error>`; callers branch on `kind()`.
//! Invariants: `Display` shows the message (or the kind) plus path and source context.
//! Invariants: The operation name is context for logs and never changes the text.
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Io,
    NoGraph,
    NodeNotFound,
    PathNotFound,
    ReadOnlyProperty,
    TypeConversion,
    TypeResolution,
    ContainerInvalid,
    NoScriptSupport,
    Persistence,
    Corrupt,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    operation: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            operation: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Name of the operation that failed, e.g. `vpp_set_property`.
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message}")?,
            None => write!(f, "{:?}", self.kind)?,
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Io => 3,
        ErrorKind::Corrupt => 4,
        ErrorKind::Persistence => 5,
        ErrorKind::NoGraph
        | ErrorKind::NodeNotFound
        | ErrorKind::PathNotFound
        | ErrorKind::ReadOnlyProperty
        | ErrorKind::TypeConversion
        | ErrorKind::TypeResolution
        | ErrorKind::ContainerInvalid
        | ErrorKind::NoScriptSupport => 6,
    }
}
