//! Presentation targets and binding a session to one.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::media::PixelBuffer;
use crate::session::SessionHandle;
use crate::snapshot::Snapshot;

/// Somewhere decoded frames are shown.
///
/// The decode driver calls `begin_frame`, renders into the returned buffer,
/// then hands it back through `end_frame`. Targets are owned by the caller;
/// sessions only keep a weak reference.
pub trait PresentationTarget: Send + Sync {
    /// Buffer for the next frame, or `None` when the target cannot accept one.
    fn begin_frame(&self) -> Option<PixelBuffer>;
    fn end_frame(&self, frame: PixelBuffer);
}

pub(crate) struct SurfaceBinding {
    pub(crate) target: Weak<dyn PresentationTarget>,
}

/// Result of [`SessionHandle::bind_surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindOutcome {
    /// The snapshot was applied. `false` without a snapshot, and when an
    /// incompatible one was replaced by frame zero.
    pub restored: bool,
    pub driver_started: bool,
}

/// Paint a placeholder into a target that has no decoded frame yet.
/// Returns `false` when the target was not ready.
pub fn draw_placeholder(target: &dyn PresentationTarget, draw: impl FnOnce(&mut PixelBuffer)) -> bool {
    let Some(mut frame) = target.begin_frame() else {
        return false;
    };
    draw(&mut frame);
    target.end_frame(frame);
    true
}

impl SessionHandle {
    /// Attach `target`, replacing any previous binding, and position playback
    /// from `snapshot`. A driver that was running, or that was suspended by
    /// [`unbind_surface`](Self::unbind_surface), is restarted on the new target.
    pub fn bind_surface(
        &self,
        target: Arc<dyn PresentationTarget>,
        snapshot: Option<&Snapshot>,
    ) -> BindOutcome {
        let driver = self.control().driver.take();
        let was_running = self.join_driver(driver);

        let mut control = self.control();
        control.binding = Some(SurfaceBinding {
            target: Arc::downgrade(&target),
        });

        let restored = {
            let mut state = self.state();
            let Some(token) = state.token.as_mut() else {
                return BindOutcome::default();
            };
            let engine = token.engine_mut();
            let restored = match snapshot {
                Some(snapshot) => match engine.apply_snapshot(snapshot) {
                    Ok(index) => {
                        log::debug!("Surface bound, resuming at frame {index}");
                        true
                    }
                    Err(_) => {
                        log::warn!("Snapshot does not match this source, starting from frame 0");
                        engine.reset();
                        false
                    }
                },
                None => false,
            };
            state.suspended = false;
            restored
        };
        if snapshot.is_some() {
            control.paused = None;
        }

        let mut driver_started = false;
        if was_running || std::mem::take(&mut control.resume_driver) {
            driver_started = self.spawn_driver_locked(&mut control, Arc::downgrade(&target));
        }

        BindOutcome {
            restored,
            driver_started,
        }
    }

    /// Detach the bound target, stopping the driver first. Returns the
    /// position at detach time for the next bind, `None` when nothing was bound.
    pub fn unbind_surface(&self) -> Option<Snapshot> {
        let driver = {
            let mut control = self.control();
            if control.binding.is_none() && control.driver.is_none() {
                return None;
            }
            control.binding = None;
            control.driver.take()
        };
        let had_driver = self.join_driver(driver);
        let mut control = self.control();
        control.resume_driver = had_driver;

        let mut state = self.state();
        let snapshot = state.token.as_ref()?.engine().capture_snapshot();
        if had_driver {
            state.suspended = true;
            log::debug!("Surface unbound, session suspended");
        }
        Some(snapshot)
    }

    pub fn has_surface(&self) -> bool {
        self.control()
            .binding
            .as_ref()
            .is_some_and(|b| b.target.strong_count() > 0)
    }
}

struct OffscreenState {
    latest: Option<PixelBuffer>,
    presented: u64,
}

/// In-memory target that keeps the most recently presented frame.
pub struct OffscreenSurface {
    width: u32,
    height: u32,
    state: Mutex<OffscreenState>,
}

impl OffscreenSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Mutex::new(OffscreenState {
                latest: None,
                presented: 0,
            }),
        }
    }

    /// Sized for `handle`'s frames.
    pub fn for_session(handle: &SessionHandle) -> Self {
        Self::new(handle.width(), handle.height())
    }

    pub fn latest_frame(&self) -> Option<PixelBuffer> {
        self.lock().latest.clone()
    }

    pub fn presented_count(&self) -> u64 {
        self.lock().presented
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OffscreenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresentationTarget for OffscreenSurface {
    fn begin_frame(&self) -> Option<PixelBuffer> {
        // Keep the previous contents so a failed render leaves the old frame.
        Some(
            self.lock()
                .latest
                .clone()
                .unwrap_or_else(|| PixelBuffer::new(self.width, self.height)),
        )
    }

    fn end_frame(&self, frame: PixelBuffer) {
        let mut state = self.lock();
        state.latest = Some(frame);
        state.presented += 1;
    }
}
