use std::error::Error;
use std::fmt;
use std::io;

/// Enumeration of all possible errors that can occur while extracting media
#[derive(Debug)]
pub enum MediaParserError {
    /// A structural invariant of the container was violated. Not retryable.
    Malformed(MalformedError),
    /// More bytes are needed before parsing can make progress.
    InsufficientData,
    /// The byte source ended in the middle of a mandatory structure.
    EndOfInput,
    /// The caller broke a precondition of the API.
    Contract(ContractError),
    Io(io::Error),
}

/// Malformed container data, with the offending byte offset when known
#[derive(Debug)]
pub struct MalformedError {
    pub message: String,
    pub offset: Option<u64>,
}

impl MalformedError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: None,
        }
    }

    /// Attach the byte offset at which the problem was detected.
    pub fn at(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Precondition failure on the caller side
#[derive(Debug)]
pub struct ContractError {
    pub message: String,
}

impl ContractError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl MediaParserError {
    pub fn malformed(message: impl Into<String>) -> Self {
        MediaParserError::Malformed(MalformedError::new(message))
    }

    pub fn malformed_at(message: impl Into<String>, offset: u64) -> Self {
        MediaParserError::Malformed(MalformedError::new(message).at(offset))
    }

    pub fn contract(message: impl Into<String>) -> Self {
        MediaParserError::Contract(ContractError::new(message))
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, MediaParserError::InsufficientData)
    }

    /// Whether calling again with more buffered bytes can succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_insufficient_data()
    }
}

impl fmt::Display for MediaParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaParserError::Malformed(err) => write!(f, "Malformed container: {}", err),
            MediaParserError::InsufficientData => write!(f, "Insufficient buffered data"),
            MediaParserError::EndOfInput => write!(f, "Unexpected end of input"),
            MediaParserError::Contract(err) => write!(f, "Contract violation: {}", err),
            MediaParserError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Display for MalformedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at byte {})", self.message, offset),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for MediaParserError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MediaParserError::Malformed(err) => Some(err),
            MediaParserError::Contract(err) => Some(err),
            MediaParserError::Io(err) => Some(err),
            _ => None,
        }
    }
}
impl Error for MalformedError {}
impl Error for ContractError {}

// Conversion implementations
impl From<io::Error> for MediaParserError {
    fn from(err: io::Error) -> Self {
        MediaParserError::Io(err)
    }
}

impl From<MalformedError> for MediaParserError {
    fn from(err: MalformedError) -> Self {
        MediaParserError::Malformed(err)
    }
}

impl From<ContractError> for MediaParserError {
    fn from(err: ContractError) -> Self {
        MediaParserError::Contract(err)
    }
}

// Conversion to io::Error for callers that work with io::Result
impl From<MediaParserError> for io::Error {
    fn from(err: MediaParserError) -> Self {
        match err {
            MediaParserError::Io(err) => err,
            MediaParserError::InsufficientData => io::Error::new(io::ErrorKind::WouldBlock, err),
            MediaParserError::EndOfInput => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

// Type alias for Result with MediaParserError
pub type MediaParserResult<T> = Result<T, MediaParserError>;
