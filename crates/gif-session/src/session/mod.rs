//! The session handle: one engine session shared between threads.
//!
//! Every operation takes the handle's state lock before touching the engine.
//! `destroy` takes the token out under that lock, so an operation that runs
//! afterwards finds no token and returns its degraded value.
//!
//! Binding and driver control use a second lock. When both are needed they are
//! taken in the order control, then state. The driver thread is never joined
//! while the control lock is held, since its presentation callback may call
//! back into the handle.

mod token;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::driver::DriverTask;
use crate::engine::{DecodingEngine, GifEngine, SeekTarget, Source};
use crate::error::{EngineErrorCode, OpenError, SessionError};
use crate::media::PixelBuffer;
use crate::settings::PlaybackSettings;
use crate::surface::SurfaceBinding;

pub(crate) use self::token::SessionToken;

/// Smallest accepted speed factor; positive factors below it are raised to it.
pub const MIN_SPEED_FACTOR: f32 = 1.0 / i32::MAX as f32;

const DEFAULT_DRIVER_THREAD_NAME: &str = "gif-decode";

/// Lifecycle of a session as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    /// Surface detached while the decode driver was running.
    Suspended,
    Destroyed,
}

pub(crate) struct SessionState {
    pub(crate) token: Option<SessionToken>,
    pub(crate) speed_factor: f32,
    pub(crate) suspended: bool,
}

pub(crate) struct Control {
    pub(crate) binding: Option<SurfaceBinding>,
    pub(crate) driver: Option<DriverTask>,
    /// Restart the driver on the next bind.
    pub(crate) resume_driver: bool,
    /// Frame shown when the driver was stopped and how much of its delay was left.
    pub(crate) paused: Option<(usize, Duration)>,
}

pub(crate) struct Shared {
    state: Mutex<SessionState>,
    control: Mutex<Control>,
    alive: AtomicBool,
    pub(crate) thread_name: String,
}

/// Thread-safe handle to one decoding session. Clones share the session.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Open `source` with the bundled GIF engine and default settings.
    pub fn open(source: impl Into<Source>) -> Result<Self, OpenError> {
        Self::open_with_settings(source, &PlaybackSettings::default())
    }

    pub fn open_with_settings(
        source: impl Into<Source>,
        settings: &PlaybackSettings,
    ) -> Result<Self, OpenError> {
        let engine = GifEngine::open(source.into(), &settings.engine_options())?;
        let handle = Self::with_thread_name(Box::new(engine), settings.driver_thread_name.clone());
        if let Err(e) = handle.set_speed_factor(settings.speed_factor) {
            log::warn!("Ignoring stored speed factor: {e}");
        }
        Ok(handle)
    }

    /// Wrap an already opened engine session.
    pub fn from_engine(engine: Box<dyn DecodingEngine>) -> Self {
        Self::with_thread_name(engine, DEFAULT_DRIVER_THREAD_NAME.into())
    }

    fn with_thread_name(engine: Box<dyn DecodingEngine>, thread_name: String) -> Self {
        let token = SessionToken::new(engine);
        log::info!(
            "Session #{} opened: {}x{}, {} frames",
            token.id(),
            token.engine().width(),
            token.engine().height(),
            token.engine().frame_count()
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    token: Some(token),
                    speed_factor: 1.0,
                    suspended: false,
                }),
                control: Mutex::new(Control {
                    binding: None,
                    driver: None,
                    resume_driver: false,
                    paused: None,
                }),
                alive: AtomicBool::new(true),
                thread_name,
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        self.shared.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the engine, or return `default` once destroyed.
    pub(crate) fn with_engine<R>(&self, default: R, f: impl FnOnce(&mut dyn DecodingEngine) -> R) -> R {
        let mut state = self.state();
        match state.token.as_mut() {
            Some(token) => f(token.engine_mut()),
            None => default,
        }
    }

    /// Stop the driver, then close the engine. Later calls do nothing.
    pub fn destroy(&self) {
        let driver = {
            let mut control = self.control();
            // Under the control lock so no driver can be spawned after this.
            self.shared.alive.store(false, Ordering::Release);
            control.binding = None;
            control.resume_driver = false;
            control.paused = None;
            control.driver.take()
        };
        // The driver may be presenting into a callback that locks control.
        if let Some(driver) = driver {
            driver.stop();
        }

        // Dropping the token closes the engine.
        self.state().token = None;
    }

    pub fn is_destroyed(&self) -> bool {
        !self.shared.alive.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        if state.token.is_none() {
            SessionStatus::Destroyed
        } else if state.suspended {
            SessionStatus::Suspended
        } else {
            SessionStatus::Open
        }
    }

    /// Decode the next frame into `buffer`. Returns the number of bytes
    /// written, 0 once destroyed.
    pub fn render_frame(&self, buffer: &mut PixelBuffer) -> Result<usize, SessionError> {
        let mut state = self.state();
        let Some(token) = state.token.as_mut() else {
            return Ok(0);
        };
        let engine = token.engine_mut();
        check_buffer(engine, buffer)?;
        engine.render(buffer).map_err(SessionError::Engine)
    }

    /// Jump to `position` on the unscaled timeline and render that frame.
    pub fn seek_to_time(
        &self,
        position: Duration,
        buffer: &mut PixelBuffer,
    ) -> Result<usize, SessionError> {
        self.seek(SeekTarget::Time(position), buffer)
    }

    /// Jump to frame `index` (counted across passes) and render it.
    pub fn seek_to_frame(&self, index: usize, buffer: &mut PixelBuffer) -> Result<usize, SessionError> {
        self.seek(SeekTarget::Frame(index), buffer)
    }

    fn seek(&self, target: SeekTarget, buffer: &mut PixelBuffer) -> Result<usize, SessionError> {
        let mut state = self.state();
        let Some(token) = state.token.as_mut() else {
            return Ok(0);
        };
        let engine = token.engine_mut();
        check_buffer(engine, buffer)?;
        engine.seek(target, Some(buffer)).map_err(SessionError::Engine)
    }

    /// Playback speed multiplier applied to every frame delay.
    pub fn set_speed_factor(&self, factor: f32) -> Result<(), SessionError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SessionError::invalid(format!(
                "speed factor must be positive and finite, got {factor}"
            )));
        }
        self.state().speed_factor = factor.max(MIN_SPEED_FACTOR);
        Ok(())
    }

    pub fn speed_factor(&self) -> f32 {
        self.state().speed_factor
    }

    /// Number of passes to play, 0 for infinite. Accepts `0..=65535`.
    pub fn set_loop_count(&self, count: i32) -> Result<(), SessionError> {
        let count = u16::try_from(count).map_err(|_| {
            SessionError::invalid(format!("loop count {count} is outside <0, 65535>"))
        })?;
        self.with_engine((), |engine| engine.set_loop_count(count));
        Ok(())
    }

    /// Render at 1/`sample_size` of the logical size and optionally report the
    /// image as opaque. Frame buffers must match the reduced `width`/`height`
    /// afterwards.
    pub fn set_options(&self, sample_size: u16, opaque: bool) -> Result<(), SessionError> {
        if sample_size == 0 {
            return Err(SessionError::invalid("sample size must be at least 1"));
        }
        self.with_engine((), |engine| engine.set_options(sample_size, opaque));
        Ok(())
    }

    pub fn loop_count(&self) -> u16 {
        self.with_engine(0, |engine| engine.loop_count())
    }

    /// Buffer the unread tail of a stream source so decoding can continue
    /// after the caller's stream is gone.
    ///
    /// The stream is read to its end while the session lock is held, so every
    /// other call on this session waits for a slow stream. Call it when the
    /// rest of the stream is already available.
    pub fn save_remainder(&self) {
        self.with_engine((), |engine| engine.save_remainder());
    }

    /// Continue from a saved tail. Returns the next frame index, `None` when
    /// nothing was saved.
    pub fn restore_remainder(&self) -> Option<usize> {
        self.with_engine(None, |engine| engine.restore_remainder())
    }

    /// Rewind to the first frame. `false` once destroyed.
    pub fn reset(&self) -> bool {
        self.with_engine(false, |engine| engine.reset())
    }

    pub fn width(&self) -> u32 {
        self.with_engine(0, |engine| engine.width())
    }

    pub fn height(&self) -> u32 {
        self.with_engine(0, |engine| engine.height())
    }

    pub fn frame_count(&self) -> usize {
        self.with_engine(0, |engine| engine.frame_count())
    }

    pub fn duration(&self) -> Duration {
        self.with_engine(Duration::ZERO, |engine| engine.duration())
    }

    pub fn frame_duration(&self, index: usize) -> Duration {
        self.with_engine(Duration::ZERO, |engine| engine.frame_duration(index))
    }

    pub fn current_frame_index(&self) -> usize {
        self.with_engine(0, |engine| engine.current_frame_index())
    }

    pub fn current_loop(&self) -> u32 {
        self.with_engine(0, |engine| engine.current_loop())
    }

    pub fn current_position(&self) -> Duration {
        self.with_engine(Duration::ZERO, |engine| engine.current_position())
    }

    pub fn is_opaque(&self) -> bool {
        self.with_engine(false, |engine| engine.is_opaque())
    }

    pub fn allocation_byte_count(&self) -> u64 {
        self.with_engine(0, |engine| engine.allocation_byte_count())
    }

    pub fn metadata_byte_count(&self) -> u64 {
        self.with_engine(0, |engine| engine.metadata_byte_count())
    }

    pub fn source_length(&self) -> u64 {
        self.with_engine(0, |engine| engine.source_length())
    }

    pub fn comment(&self) -> Option<String> {
        self.with_engine(None, |engine| engine.comment())
    }

    /// Last error reported by the engine.
    pub fn native_error_code(&self) -> EngineErrorCode {
        self.with_engine(EngineErrorCode::NoError, |engine| engine.error_code())
    }

    pub fn is_animation_completed(&self) -> bool {
        self.with_engine(false, |engine| engine.is_completed())
    }

    /// Delay of the frame currently shown, divided by the speed factor.
    pub fn current_frame_delay(&self) -> Duration {
        let state = self.state();
        let factor = state.speed_factor;
        let Some(token) = state.token.as_ref() else {
            return Duration::ZERO;
        };
        let engine = token.engine();
        scale_delay(engine.frame_duration(engine.current_frame_index()), factor)
    }
}

pub(crate) fn check_buffer(engine: &dyn DecodingEngine, buffer: &PixelBuffer) -> Result<(), SessionError> {
    let (width, height) = (engine.width(), engine.height());
    if buffer.matches(width, height) {
        Ok(())
    } else {
        Err(SessionError::invalid(format!(
            "buffer is {}x{}, session is {width}x{height}",
            buffer.width(),
            buffer.height()
        )))
    }
}

/// `delay / factor`, saturating instead of overflowing for tiny factors.
pub(crate) fn scale_delay(delay: Duration, factor: f32) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() / f64::from(factor)).unwrap_or(Duration::MAX)
}
