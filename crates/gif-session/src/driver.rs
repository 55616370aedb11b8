//! Background decode driver: renders frames into a presentation target at the
//! pace set by frame delays and the speed factor.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::session::{Control, SessionHandle, Shared};
use crate::surface::{PresentationTarget, SurfaceBinding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Running,
}

/// A running driver thread. Owned by the session's control block.
pub(crate) struct DriverTask {
    stop_tx: Sender<()>,
    /// Yields the unexpired part of the frame delay it was waiting on.
    thread: JoinHandle<Option<Duration>>,
}

impl DriverTask {
    fn spawn(
        session: Weak<Shared>,
        target: Weak<dyn PresentationTarget>,
        resume_after: Option<Duration>,
        name: &str,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || run(&session, &target, &stop_rx, resume_after))?;
        Ok(Self { stop_tx, thread })
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Signal the thread and wait for it to exit. From the driver thread
    /// itself this only signals.
    pub(crate) fn stop(self) -> Option<Duration> {
        let _ = self.stop_tx.try_send(());
        if self.thread.thread().id() == std::thread::current().id() {
            log::debug!("Decode driver stopped from its own thread, detaching");
            return None;
        }
        match self.thread.join() {
            Ok(remaining) => remaining,
            Err(_) => {
                log::error!("Decode driver thread panicked");
                None
            }
        }
    }
}

fn run(
    session: &Weak<Shared>,
    target: &Weak<dyn PresentationTarget>,
    stop_rx: &Receiver<()>,
    mut wait: Option<Duration>,
) -> Option<Duration> {
    loop {
        if let Some(delay) = wait.take() {
            let started = Instant::now();
            match stop_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    return Some(delay.saturating_sub(started.elapsed()));
                }
            }
        } else if stop_rx.try_recv().is_ok() {
            return None;
        }

        let Some(shared) = session.upgrade() else {
            return None;
        };
        let handle = SessionHandle { shared };
        let Some(target) = target.upgrade() else {
            log::debug!("Presentation target dropped, decode driver exiting");
            return None;
        };
        let Some(mut frame) = target.begin_frame() else {
            log::debug!("Presentation target not ready, decode driver exiting");
            return None;
        };

        let rendered = handle.render_frame(&mut frame);
        target.end_frame(frame);
        if let Err(e) = rendered {
            log::error!("Decode driver stopped: {e}");
            return None;
        }
        if handle.is_destroyed() {
            return None;
        }
        if handle.is_animation_completed() {
            log::info!("Animation completed, decode driver exiting");
            return None;
        }

        wait = Some(handle.current_frame_delay());
    }
}

impl SessionHandle {
    /// Start continuous playback into `target`. Returns `false` when a driver
    /// is already running or the session is destroyed.
    pub fn start_decoder(&self, target: Arc<dyn PresentationTarget>) -> bool {
        let mut control = self.control();
        if control.driver.as_ref().is_some_and(DriverTask::is_running) {
            return false;
        }
        control.binding = Some(SurfaceBinding {
            target: Arc::downgrade(&target),
        });
        self.spawn_driver_locked(&mut control, Arc::downgrade(&target))
    }

    /// Stop the driver and wait for its thread. Returns `false` when none was running.
    pub fn stop_decoder(&self) -> bool {
        let driver = {
            let mut control = self.control();
            control.resume_driver = false;
            control.driver.take()
        };
        self.join_driver(driver)
    }

    pub fn driver_state(&self) -> DriverState {
        if self
            .control()
            .driver
            .as_ref()
            .is_some_and(DriverTask::is_running)
        {
            DriverState::Running
        } else {
            DriverState::Stopped
        }
    }

    /// Stop a driver already taken out of the control block and keep the
    /// rest of its frame delay. Must be called without the control lock: the
    /// driver may be inside a presentation callback that takes it.
    pub(crate) fn join_driver(&self, driver: Option<DriverTask>) -> bool {
        let Some(driver) = driver else {
            return false;
        };
        let was_running = driver.is_running();
        if let Some(remaining) = driver.stop() {
            let index = self.current_frame_index();
            self.control().paused = Some((index, remaining));
        }
        if was_running {
            log::info!("Decode driver stopped");
        }
        was_running
    }

    pub(crate) fn spawn_driver_locked(
        &self,
        control: &mut Control,
        target: Weak<dyn PresentationTarget>,
    ) -> bool {
        if self.is_destroyed() {
            return false;
        }
        match control.driver.take() {
            // Started by another caller while this one was stopping the old driver.
            Some(running) if running.is_running() => {
                control.driver = Some(running);
                return false;
            }
            // Exited on its own; the join does not block.
            Some(finished) => {
                finished.stop();
            }
            None => {}
        }

        let index = self.current_frame_index();
        let resume_after = control
            .paused
            .take()
            .filter(|(paused_at, _)| *paused_at == index)
            .map(|(_, remaining)| remaining);

        match DriverTask::spawn(
            Arc::downgrade(&self.shared),
            target,
            resume_after,
            &self.shared.thread_name,
        ) {
            Ok(task) => {
                log::info!(
                    "Decode driver started on '{}'{}",
                    self.shared.thread_name,
                    match resume_after {
                        Some(d) => format!(", resuming after {d:?}"),
                        None => String::new(),
                    }
                );
                control.driver = Some(task);
                true
            }
            Err(e) => {
                log::error!("Failed to spawn decode driver thread: {e}");
                false
            }
        }
    }
}
