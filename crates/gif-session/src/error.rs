use std::fmt;

/// Error codes reported by a decoding engine. Numeric values are stable and
/// shared with the codes exposed through [`EngineErrorCode::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineErrorCode {
    #[default]
    NoError,
    OpenFailed,
    ReadFailed,
    NotGifFile,
    NoScreenDescriptor,
    NoImageDescriptor,
    NoColorMap,
    WrongRecord,
    DataTooBig,
    NotEnoughMemory,
    CloseFailed,
    NotReadable,
    ImageDefect,
    EofTooSoon,
    NoFrames,
    InvalidScreenDimensions,
    InvalidImageDimensions,
    ImageNotConfined,
    RewindFailed,
    InvalidByteBuffer,
    Unknown,
}

impl EngineErrorCode {
    pub const ALL: &[EngineErrorCode] = &[
        EngineErrorCode::NoError,
        EngineErrorCode::OpenFailed,
        EngineErrorCode::ReadFailed,
        EngineErrorCode::NotGifFile,
        EngineErrorCode::NoScreenDescriptor,
        EngineErrorCode::NoImageDescriptor,
        EngineErrorCode::NoColorMap,
        EngineErrorCode::WrongRecord,
        EngineErrorCode::DataTooBig,
        EngineErrorCode::NotEnoughMemory,
        EngineErrorCode::CloseFailed,
        EngineErrorCode::NotReadable,
        EngineErrorCode::ImageDefect,
        EngineErrorCode::EofTooSoon,
        EngineErrorCode::NoFrames,
        EngineErrorCode::InvalidScreenDimensions,
        EngineErrorCode::InvalidImageDimensions,
        EngineErrorCode::ImageNotConfined,
        EngineErrorCode::RewindFailed,
        EngineErrorCode::InvalidByteBuffer,
        EngineErrorCode::Unknown,
    ];

    pub fn code(self) -> i32 {
        match self {
            EngineErrorCode::NoError => 0,
            EngineErrorCode::OpenFailed => 101,
            EngineErrorCode::ReadFailed => 102,
            EngineErrorCode::NotGifFile => 103,
            EngineErrorCode::NoScreenDescriptor => 104,
            EngineErrorCode::NoImageDescriptor => 105,
            EngineErrorCode::NoColorMap => 106,
            EngineErrorCode::WrongRecord => 107,
            EngineErrorCode::DataTooBig => 108,
            EngineErrorCode::NotEnoughMemory => 109,
            EngineErrorCode::CloseFailed => 110,
            EngineErrorCode::NotReadable => 111,
            EngineErrorCode::ImageDefect => 112,
            EngineErrorCode::EofTooSoon => 113,
            EngineErrorCode::NoFrames => 1000,
            EngineErrorCode::InvalidScreenDimensions => 1001,
            EngineErrorCode::InvalidImageDimensions => 1002,
            EngineErrorCode::ImageNotConfined => 1003,
            EngineErrorCode::RewindFailed => 1004,
            EngineErrorCode::InvalidByteBuffer => 1005,
            EngineErrorCode::Unknown => 1006,
        }
    }

    /// Inverse of [`code`](Self::code). Unrecognized values map to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .unwrap_or(EngineErrorCode::Unknown)
    }

    pub fn description(self) -> &'static str {
        match self {
            EngineErrorCode::NoError => "No error",
            EngineErrorCode::OpenFailed => "Failed to open given input",
            EngineErrorCode::ReadFailed => "Failed to read from given input",
            EngineErrorCode::NotGifFile => "Data is not in GIF format",
            EngineErrorCode::NoScreenDescriptor => "No screen descriptor detected",
            EngineErrorCode::NoImageDescriptor => "No image descriptor detected",
            EngineErrorCode::NoColorMap => "Neither global nor local color map found",
            EngineErrorCode::WrongRecord => "Wrong record type detected",
            EngineErrorCode::DataTooBig => "Number of pixels bigger than width * height",
            EngineErrorCode::NotEnoughMemory => "Failed to allocate required memory",
            EngineErrorCode::CloseFailed => "Failed to close given input",
            EngineErrorCode::NotReadable => "Given file was not opened for read",
            EngineErrorCode::ImageDefect => "Image is defective, decoding aborted",
            EngineErrorCode::EofTooSoon => "Image EOF detected before image complete",
            EngineErrorCode::NoFrames => "No frames found, at least one frame required",
            EngineErrorCode::InvalidScreenDimensions => "Invalid screen size, dimensions must be positive",
            EngineErrorCode::InvalidImageDimensions => "Invalid image size, dimensions must be positive",
            EngineErrorCode::ImageNotConfined => "Image size exceeds screen size",
            EngineErrorCode::RewindFailed => "Input source rewind failed, animation stopped",
            EngineErrorCode::InvalidByteBuffer => "Invalid and/or indirect byte buffer specified",
            EngineErrorCode::Unknown => "Unknown error",
        }
    }

    pub fn is_error(self) -> bool {
        self != EngineErrorCode::NoError
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// The source could not be opened or is not a decodable animation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to open source: {message} [{code}]")]
pub struct OpenError {
    pub code: EngineErrorCode,
    pub message: String,
}

impl OpenError {
    pub fn new(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned by session operations.
///
/// Use after destroy is deliberately not represented here: operations on a
/// destroyed session return their degraded value instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("decoding engine error: {0}")]
    Engine(EngineErrorCode),
    #[error("snapshot was captured from a different source")]
    IncompatibleSnapshot,
}

impl SessionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SessionError::InvalidArgument(message.into())
    }
}
