use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("{extra} trailing bytes after chunk at offset {offset:#x}")]
    TrailingData { offset: usize, extra: usize },

    #[error("unexpected chunk tag: expected {expected:?}, found {found:?}")]
    UnexpectedTag { expected: [u8; 4], found: [u8; 4] },

    #[error("{context}: {message}")]
    Parse { context: &'static str, message: String },

    #[error("object handle {handle} does not name an object in this pack")]
    DanglingReference { handle: u32 },

    #[error("stream {name} is missing from the scene archive")]
    MissingStream { name: String },

    #[error("{file}: {source}")]
    InFile {
        file: String,
        #[source]
        source: Box<Error>,
    },

    #[error("reference from {from} to {to} points outside of the copied subtree")]
    ReferenceOutOfScope { from: String, to: String },

    #[error("properties do not match the class and routines: expected {expected} members, \
             found {found} entries")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("{path} is referenced by {count} other object(s)")]
    ReferencedObject { path: String, count: usize },

    #[error("{path} is a root object")]
    RootObject { path: String },

    #[error("moving {object} under {new_parent} would create a cycle")]
    WouldCreateCycle { object: String, new_parent: String },

    #[error("no such object")]
    NoSuchObject,

    #[error("no texture with id {0}")]
    NoSuchTexture(u32),

    #[error("class schema: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach the name of the stream or file a format error came from.
    pub fn in_file(self, file: impl Into<String>) -> Self {
        Error::InFile {
            file: file.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means the input bytes were malformed.
    pub fn is_format_error(&self) -> bool {
        match self {
            Error::UnexpectedEof { .. }
            | Error::TrailingData { .. }
            | Error::UnexpectedTag { .. }
            | Error::Parse { .. }
            | Error::DanglingReference { .. }
            | Error::MissingStream { .. } => true,
            Error::InFile { source, .. } => source.is_format_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
