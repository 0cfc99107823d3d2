use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectivesError {
    Empty,
    BadWeight { line: usize, text: String },
    BadToken { line: usize, text: String },
    MissingTokens { line: usize },
}

impl fmt::Display for ObjectivesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "objectives file contains no objectives"),
            Self::BadWeight { line, text } => {
                write!(f, "line {line}: cannot parse weight '{text}'")
            }
            Self::BadToken { line, text } => {
                write!(f, "line {line}: cannot parse feature token '{text}'")
            }
            Self::MissingTokens { line } => {
                write!(f, "line {line}: objective has a weight but no tokens")
            }
        }
    }
}

impl std::error::Error for ObjectivesError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MotifsError {
    Empty,
    BadWeight { line: usize, text: String },
    NonPositiveWeight { line: usize },
    BadInput { line: usize, text: String },
    MissingInputs { line: usize },
}

impl fmt::Display for MotifsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "motifs file contains no motifs"),
            Self::BadWeight { line, text } => {
                write!(f, "line {line}: cannot parse motif weight '{text}'")
            }
            Self::NonPositiveWeight { line } => {
                write!(f, "line {line}: motif weight must be strictly positive")
            }
            Self::BadInput { line, text } => {
                write!(f, "line {line}: cannot parse input byte '{text}'")
            }
            Self::MissingInputs { line } => {
                write!(f, "line {line}: motif has a weight but no inputs")
            }
        }
    }
}

impl std::error::Error for MotifsError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotError {
    TooShort { actual: usize, min: usize },
    InvalidMagic { found: [u8; 4] },
    Truncated { section: &'static str },
    TrailingBytes { extra: usize },
    BadRngState { len: usize },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { actual, min } => {
                write!(f, "snapshot too short: got {actual} bytes, need at least {min}")
            }
            Self::InvalidMagic { found } => {
                write!(f, "invalid snapshot magic: {found:02x?}")
            }
            Self::Truncated { section } => {
                write!(f, "snapshot truncated while reading {section}")
            }
            Self::TrailingBytes { extra } => {
                write!(f, "snapshot has {extra} trailing bytes")
            }
            Self::BadRngState { len } => {
                write!(f, "snapshot rng state has invalid length {len}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MovieError {
    TooShort { actual: usize, min: usize },
    InvalidMagic { found: [u8; 4] },
    UnsupportedVersion { found: u8 },
    Truncated { section: &'static str },
    CrcMismatch { stored: u32, computed: u32 },
}

impl fmt::Display for MovieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { actual, min } => {
                write!(f, "movie too short: got {actual} bytes, need at least {min}")
            }
            Self::InvalidMagic { found } => write!(f, "invalid movie magic: {found:02x?}"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported movie version: {found}")
            }
            Self::Truncated { section } => write!(f, "movie truncated while reading {section}"),
            Self::CrcMismatch { stored, computed } => write!(
                f,
                "movie crc mismatch: stored=0x{stored:08x}, computed=0x{computed:08x}"
            ),
        }
    }
}

impl std::error::Error for MovieError {}
