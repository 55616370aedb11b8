use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::media::PixelBuffer;
use crate::session::{SessionHandle, check_buffer};

/// Saved playback position, opaque outside the engine that produced it.
///
/// The words are engine-defined; the session layer only stores them and hands
/// them back. Serializes as a plain JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<i64>);

impl Snapshot {
    pub fn from_raw(words: Vec<i64>) -> Self {
        Self(words)
    }

    pub fn as_raw(&self) -> &[i64] {
        &self.0
    }

    pub fn into_raw(self) -> Vec<i64> {
        self.0
    }

    /// Captured from a destroyed session.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl SessionHandle {
    /// Capture the current position. Safe while the decode driver runs; the
    /// snapshot is taken between two frames. Empty once destroyed.
    pub fn capture_state(&self) -> Snapshot {
        self.with_engine(Snapshot::default(), |engine| engine.capture_snapshot())
    }

    /// Apply `snapshot` and render the frame it points at into `buffer`.
    /// Returns that frame's index.
    pub fn restore_state(
        &self,
        snapshot: &Snapshot,
        buffer: &mut PixelBuffer,
    ) -> Result<usize, SessionError> {
        let mut state = self.state();
        let Some(token) = state.token.as_mut() else {
            return Ok(0);
        };
        let engine = token.engine_mut();
        check_buffer(engine, buffer)?;
        engine
            .apply_snapshot(snapshot)
            .map_err(|_| SessionError::IncompatibleSnapshot)?;
        engine.render(buffer).map_err(SessionError::Engine)?;
        let index = engine.current_frame_index();
        state.suspended = false;
        Ok(index)
    }
}
