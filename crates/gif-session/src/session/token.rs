use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::DecodingEngine;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Exclusive ownership of one engine session.
///
/// Dropping the token closes the engine, so a session is closed exactly once
/// and a taken token cannot be reached again.
pub(crate) struct SessionToken {
    engine: Box<dyn DecodingEngine>,
    id: u64,
}

impl SessionToken {
    pub(crate) fn new(engine: Box<dyn DecodingEngine>) -> Self {
        Self {
            engine,
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn engine(&self) -> &dyn DecodingEngine {
        self.engine.as_ref()
    }

    pub(crate) fn engine_mut(&mut self) -> &mut dyn DecodingEngine {
        self.engine.as_mut()
    }
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        self.engine.close();
        log::info!("Session #{} closed", self.id);
    }
}
