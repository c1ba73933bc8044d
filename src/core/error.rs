use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    InvalidArgument,
    Internal,
    /// Collection absent, dropped, or never existed.
    CollectionNotFound,
    IndexNotFound,
    DocumentNotFound,
    /// A collection that failed to open or manifest. Permanent.
    CorruptedCollection,
    /// The database directory holds inconsistent collection metadata.
    CorruptedDatabase,
    DuplicateName,
    DuplicateIdentifier,
    IllegalName,
    UniqueConstraintViolated,
    DocumentKeyBad,
    GeoIndexViolated,
    BitarrayValueUnsupported,
    CapConstraintViolated,
    DatabaseLocked,
    /// The database handle was closed.
    DatabaseClosed,
    WrongDatabasePath,
    UnknownCollectionType,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn not_found(name: &str) -> Self {
        Error::new(ErrorKind::CollectionNotFound, format!("collection '{}' not found", name))
    }

    pub fn corrupted(name: &str) -> Self {
        Error::new(ErrorKind::CorruptedCollection, format!("collection '{}' is corrupted", name))
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context.into())
    }

    pub fn unique_violated(index: u64) -> Self {
        Error::new(
            ErrorKind::UniqueConstraintViolated,
            format!("unique constraint of index {} violated", index),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by index maintenance share the crate error type.
pub type IndexError = Error;
