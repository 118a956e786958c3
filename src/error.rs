use std::io;

/// Broad classes of failures, used by callers that only care about the
/// category of a [`VcdError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    Structural,
    Collision,
    UnsupportedValue,
    MissingParameter,
    UnsupportedFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum VcdError {
    #[error("I/O operation failed")]
    Io(#[from] io::Error),
    #[error("[vcd] no `$dumpvars` found, the file has no body")]
    MissingBodyMarker,
    #[error("[vcd] malformed header near `{0}`")]
    MalformedHeader(String),
    #[error("[vcd] `$var {0}` does not have exactly four fields")]
    MalformedVar(String),
    #[error("[vcd] invalid width `{0}` of variable `{1}`, expected 1 to 65536 bits")]
    InvalidWidth(String, String),
    #[error("[vcd] {0} is not valid UTF-8 text")]
    InvalidEncoding(String, #[source] std::string::FromUtf8Error),
    #[error("[vcd] record `{0}` references undeclared symbol `{1}`")]
    UndeclaredSymbol(String, String),
    #[error("[vcd] time marker #{0} comes after #{1}")]
    TimeWentBackwards(u64, u64),
    #[error("[vcd] invalid timescale `{0}`")]
    InvalidTimescale(String),
    #[error("[logic] {0}")]
    MalformedExport(String),
    #[error("[vcd] `$upscope` without a matching `$scope`")]
    UnbalancedUpscope,
    #[error("`{0}` is both a scope and a signal")]
    ScopeSignalCollision(String),
    #[error("signal `{0}` is declared twice")]
    DuplicateSignal(String),
    #[error("signals `{0}` and `{1}` both map to the identifier `{2}`")]
    IdentifierCollision(String, String, String),
    #[error("'{0}' is not a value supported by the simulator")]
    UnsupportedValue(String),
    #[error("no signal to drive for symbol `{0}`")]
    UnresolvedSymbol(String),
    #[error("please specify {0}")]
    MissingParameter(&'static str),
    #[error("unsupported input format `{0}`, only .vcd, .csv and .bin are supported")]
    UnsupportedFormat(String),
}

impl VcdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VcdError::Io(_) => ErrorKind::Io,
            VcdError::MissingBodyMarker
            | VcdError::MalformedHeader(_)
            | VcdError::MalformedVar(_)
            | VcdError::InvalidWidth(..)
            | VcdError::InvalidEncoding(..)
            | VcdError::UndeclaredSymbol(..)
            | VcdError::TimeWentBackwards(..)
            | VcdError::InvalidTimescale(_)
            | VcdError::MalformedExport(_) => ErrorKind::Format,
            VcdError::UnbalancedUpscope => ErrorKind::Structural,
            VcdError::ScopeSignalCollision(_)
            | VcdError::DuplicateSignal(_)
            | VcdError::IdentifierCollision(..) => ErrorKind::Collision,
            VcdError::UnsupportedValue(_) | VcdError::UnresolvedSymbol(_) => {
                ErrorKind::UnsupportedValue
            }
            VcdError::MissingParameter(_) => ErrorKind::MissingParameter,
            VcdError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
        }
    }
}

/// Failures of the byte-level parsers used for binary exports.
impl<'a> From<nom::Err<(&'a [u8], nom::error::ErrorKind)>> for VcdError {
    fn from(e: nom::Err<(&'a [u8], nom::error::ErrorKind)>) -> Self {
        match e {
            nom::Err::Incomplete(_) => VcdError::MalformedExport("truncated binary export".to_string()),
            nom::Err::Error((rest, kind)) | nom::Err::Failure((rest, kind)) => {
                VcdError::MalformedExport(format!(
                    "binary export rejected by {:?} with {} bytes left",
                    kind,
                    rest.len()
                ))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VcdError>;
