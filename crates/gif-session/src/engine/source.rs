use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Source;
use crate::error::{EngineErrorCode, OpenError};

/// Resolved input for the GIF decoder.
pub enum Input {
    /// Whole source in memory (paths, files, byte buffers).
    Memory(Vec<u8>),
    /// One-shot stream read on demand.
    Stream(StreamTail),
}

/// Read re-readable sources fully; wrap streams for lazy consumption.
pub fn resolve(source: Source) -> Result<Input, OpenError> {
    match source {
        Source::Path(path) => fs::read(&path).map(Input::Memory).map_err(|e| {
            OpenError::new(
                EngineErrorCode::OpenFailed,
                format!("{}: {e}", path.display()),
            )
        }),
        Source::Bytes(bytes) => Ok(Input::Memory(bytes)),
        Source::File { mut file, offset } => {
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| OpenError::new(EngineErrorCode::OpenFailed, e.to_string()))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| OpenError::new(EngineErrorCode::ReadFailed, e.to_string()))?;
            Ok(Input::Memory(data))
        }
        Source::Stream(reader) => Ok(Input::Stream(StreamTail::new(reader))),
    }
}

enum Tail {
    /// Still reading from the caller's stream.
    Live(Box<dyn Read + Send>),
    /// Unread tail copied into the engine; the original stream is gone.
    Saved(Cursor<Vec<u8>>),
}

struct TailState {
    tail: Tail,
    consumed: u64,
}

/// Shared view of a one-shot stream.
///
/// One clone is handed to the decoder as its reader, the engine keeps another
/// so it can swap the live stream for an in-memory copy of its tail without
/// tearing down the decoder.
#[derive(Clone)]
pub struct StreamTail {
    state: Arc<Mutex<TailState>>,
}

impl StreamTail {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TailState {
                tail: Tail::Live(reader),
                consumed: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes handed to the decoder so far.
    pub fn consumed(&self) -> u64 {
        self.lock().consumed
    }

    #[cfg(test)]
    pub fn is_saved(&self) -> bool {
        matches!(self.lock().tail, Tail::Saved(_))
    }

    /// Drain the rest of the live stream into memory and drop the stream.
    /// Returns the number of buffered bytes. Already saved tails are left as is.
    pub fn save(&self) -> io::Result<usize> {
        let mut state = self.lock();
        let Tail::Live(reader) = &mut state.tail else {
            return Ok(0);
        };
        let mut rest = Vec::new();
        let result = reader.read_to_end(&mut rest);
        let saved = rest.len();
        // Keep whatever arrived even when the stream failed part way.
        state.tail = Tail::Saved(Cursor::new(rest));
        result.map(|_| saved)
    }

    /// Unread bytes left in a saved tail, `None` while still live.
    #[cfg(test)]
    pub fn saved_remaining(&self) -> Option<usize> {
        match &self.lock().tail {
            Tail::Saved(cursor) => {
                let pos = cursor.position() as usize;
                Some(cursor.get_ref().len().saturating_sub(pos))
            }
            Tail::Live(_) => None,
        }
    }

    /// Drop the stream or buffer.
    pub fn release(&self) {
        self.lock().tail = Tail::Saved(Cursor::new(Vec::new()));
    }
}

impl Read for StreamTail {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let n = match &mut state.tail {
            Tail::Live(reader) => reader.read(buf)?,
            Tail::Saved(cursor) => cursor.read(buf)?,
        };
        state.consumed += n as u64;
        Ok(n)
    }
}
