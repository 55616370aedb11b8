//! Thread-safe decoding sessions for animated GIFs.
//!
//! A [`SessionHandle`] owns one decoding session and can be shared between a
//! UI thread pulling frames, a background [decode driver](SessionHandle::start_decoder)
//! pushing frames into a [`PresentationTarget`], and a texture upload thread.
//! Destroying the handle is safe while any of them is mid-operation.

pub mod driver;
pub mod engine;
pub mod error;
pub mod media;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod surface;
pub mod texture;

#[cfg(test)]
pub(crate) mod test_support;

pub use driver::DriverState;
pub use engine::{DecodingEngine, EngineOptions, GifEngine, SeekTarget, Source};
pub use error::{EngineErrorCode, OpenError, SessionError};
pub use media::{FrameRect, PixelBuffer};
pub use session::{MIN_SPEED_FACTOR, SessionHandle, SessionStatus};
pub use settings::PlaybackSettings;
pub use snapshot::Snapshot;
pub use surface::{BindOutcome, OffscreenSurface, PresentationTarget, draw_placeholder};
pub use texture::{TextureTarget, TextureUpload};
