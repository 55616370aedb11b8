//! Decoding engine boundary.
//!
//! The session layer never decodes pixels itself. It drives an engine through
//! [`DecodingEngine`], which the bundled [`GifEngine`] implements on top of the
//! `gif` crate. Other engines can be plugged in with
//! [`SessionHandle::from_engine`](crate::SessionHandle::from_engine).

pub mod decoder;
pub mod source;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::EngineErrorCode;
use crate::media::PixelBuffer;
use crate::snapshot::Snapshot;
use crate::texture::{TextureTarget, TextureUpload};

pub use self::decoder::GifEngine;

/// Frames shorter than this are raised to it (browsers do the same for
/// zero-delay GIFs).
pub const DEFAULT_MIN_FRAME_DELAY: Duration = Duration::from_millis(20);

/// Where an animation is read from. The resource is consumed by `open`.
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// One-shot stream. Decoded lazily; see [`DecodingEngine::save_remainder`].
    Stream(Box<dyn Read + Send>),
    /// Already opened file, read from `offset` to the end.
    File { file: File, offset: u64 },
}

impl Source {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Source::Bytes(bytes.into())
    }

    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Source::Stream(Box::new(reader))
    }

    pub fn file(file: File, offset: u64) -> Self {
        Source::File { file, offset }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Source::Path(_) => "path",
            Source::Bytes(_) => "bytes",
            Source::Stream(_) => "stream",
            Source::File { .. } => "file",
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Source::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Source::Stream(_) => f.write_str("Stream"),
            Source::File { offset, .. } => write!(f, "File {{ offset: {offset} }}"),
        }
    }
}

/// Engine construction options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub min_frame_delay: Duration,
    /// Overrides the loop count stored in the file (0 = infinite).
    pub loop_count: Option<u16>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            min_frame_delay: DEFAULT_MIN_FRAME_DELAY,
            loop_count: None,
        }
    }
}

/// Absolute seek position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Time on the unscaled timeline, counted from the start of the first pass.
    Time(Duration),
    /// Frame number counted across passes (`frame_count + 1` is frame 1 of pass 2).
    Frame(usize),
}

/// Snapshot does not belong to this engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMismatch;

/// One open decoding session inside an engine.
///
/// Engines are driven by exactly one session handle, always under that
/// handle's lock, so implementations need `Send` but not `Sync`.
///
/// Position model: `current_frame_index` is the frame most recently shown.
/// `render` shows the next frame, `current_loop` counts completed passes and
/// saturates at a finite loop count, at which point the engine is completed and
/// `render` keeps returning the last frame.
pub trait DecodingEngine: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn frame_count(&self) -> usize;
    /// Length of one pass on the unscaled timeline.
    fn duration(&self) -> Duration;
    /// Declared delay of `index`; zero when out of range.
    fn frame_duration(&self, index: usize) -> Duration;
    fn loop_count(&self) -> u16;
    fn set_loop_count(&mut self, count: u16);
    /// Render at 1/`sample_size` of the logical size (nearest neighbour) and,
    /// when `opaque` is set, report the image as opaque whatever it declares.
    /// `width`/`height` report the reduced size. `sample_size` is at least 1.
    fn set_options(&mut self, sample_size: u16, opaque: bool);
    fn comment(&self) -> Option<String>;
    fn allocation_byte_count(&self) -> u64;
    fn metadata_byte_count(&self) -> u64;
    fn source_length(&self) -> u64;
    fn error_code(&self) -> EngineErrorCode;
    fn is_opaque(&self) -> bool;
    fn is_completed(&self) -> bool;
    fn current_frame_index(&self) -> usize;
    fn current_loop(&self) -> u32;
    /// Elapsed unscaled time within the current pass.
    fn current_position(&self) -> Duration;

    /// Advance to the next frame and write it into `buffer`. Returns bytes written.
    fn render(&mut self, buffer: &mut PixelBuffer) -> Result<usize, EngineErrorCode>;
    /// Move to `target`; when `buffer` is given the frame is written into it.
    /// Returns the resolved frame index.
    fn seek(
        &mut self,
        target: SeekTarget,
        buffer: Option<&mut PixelBuffer>,
    ) -> Result<usize, EngineErrorCode>;
    /// Rewind to the first frame of the first pass.
    fn reset(&mut self) -> bool;

    /// Buffer the unread tail of a one-shot stream inside the engine. This
    /// reads the caller's stream to its end and blocks until it does.
    fn save_remainder(&mut self);
    /// Resume decoding from a saved tail. Returns the index of the next frame
    /// to be shown, or `None` when nothing was saved.
    fn restore_remainder(&mut self) -> Option<usize>;

    fn capture_snapshot(&self) -> Snapshot;
    /// Position the session from `snapshot` so the next `render` shows the
    /// captured frame. Returns that frame index.
    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<usize, SnapshotMismatch>;

    fn upload_to_texture(&mut self, target: &mut dyn TextureTarget, level: u32, mode: TextureUpload);

    /// Release decoder state. Called exactly once, by the owning session token.
    fn close(&mut self);
}
