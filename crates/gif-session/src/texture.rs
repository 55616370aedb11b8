//! GPU texture upload path.
//!
//! The session does not own a GPU context. Callers implement [`TextureTarget`]
//! over whatever API they use and call these methods from their upload thread.

use crate::media::FrameRect;
use crate::session::SessionHandle;

/// Receives frame pixels (tightly packed RGBA8) for a texture.
pub trait TextureTarget {
    /// Replace the whole texture level.
    fn upload(&mut self, level: u32, width: u32, height: u32, pixels: &[u8]);
    /// Overwrite `region` of an existing texture level.
    fn update(&mut self, level: u32, region: FrameRect, pixels: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUpload {
    Full,
    /// Only the region that changed since the previous frame. Valid when the
    /// texture already holds the previous frame.
    Partial,
}

impl SessionHandle {
    /// Upload the current frame as a whole texture level.
    pub fn upload_texture(&self, target: &mut dyn TextureTarget, level: u32) {
        self.with_engine((), |engine| {
            engine.upload_to_texture(target, level, TextureUpload::Full);
        });
    }

    /// Upload only the part of the current frame that changed.
    pub fn update_texture(&self, target: &mut dyn TextureTarget, level: u32) {
        self.with_engine((), |engine| {
            engine.upload_to_texture(target, level, TextureUpload::Partial);
        });
    }

    /// Move to frame `index` without rendering into a CPU buffer. Follow with
    /// [`upload_texture`](Self::upload_texture).
    pub fn seek_texture_frame(&self, index: usize) -> usize {
        self.with_engine(0, |engine| {
            engine
                .seek(crate::engine::SeekTarget::Frame(index), None)
                .unwrap_or_else(|code| {
                    log::warn!("Texture seek to frame {index} failed: {code}");
                    engine.current_frame_index()
                })
        })
    }
}
