//! Fixtures shared by the unit tests.

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::engine::{DecodingEngine, SeekTarget, SnapshotMismatch};
use crate::error::EngineErrorCode;
use crate::media::PixelBuffer;
use crate::snapshot::Snapshot;
use crate::surface::PresentationTarget;
use crate::texture::{TextureTarget, TextureUpload};

const SIZE: u16 = 8;

fn frame_color(index: usize) -> [u8; 4] {
    let i = (index % 8) as u8;
    [20 + i * 30, 230 - i * 25, i.wrapping_mul(70) ^ 0x55, 255]
}

/// An 8x8 GIF whose frames are distinct solid colors.
pub fn animated_gif(frames: usize, delay_cs: u16, repeat: gif::Repeat) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, SIZE, SIZE, &[]).unwrap();
        encoder.set_repeat(repeat).unwrap();
        for i in 0..frames {
            let mut rgba: Vec<u8> = frame_color(i).repeat(usize::from(SIZE) * usize::from(SIZE));
            let mut frame = gif::Frame::from_rgba_speed(SIZE, SIZE, &mut rgba, 10);
            frame.delay = delay_cs;
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

/// Single-frame GIF carrying `text` in a comment extension.
pub fn commented_gif(text: &str) -> Vec<u8> {
    assert!(text.len() < 256);
    let mut data = animated_gif(1, 10, gif::Repeat::Infinite);
    // After the header, logical screen descriptor and global color table.
    let packed = data[10];
    let table = if packed & 0x80 == 0 { 0 } else { 3 << ((packed & 0x07) + 1) };
    let at = 13 + table;
    let mut block = vec![0x21, 0xFE, text.len() as u8];
    block.extend_from_slice(text.as_bytes());
    block.push(0x00);
    data.splice(at..at, block);
    data
}

/// Stream that hands out at most 16 bytes per read and fails once closed.
pub struct ClosableStream {
    inner: Cursor<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl ClosableStream {
    pub fn new(data: Vec<u8>) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: Cursor::new(data),
                closed: closed.clone(),
            },
            closed,
        )
    }
}

impl Read for ClosableStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
        }
        let n = buf.len().min(16);
        self.inner.read(&mut buf[..n])
    }
}

/// Minimal engine that panics if used after `close`.
pub struct StubEngine {
    width: u32,
    height: u32,
    frames: usize,
    index: usize,
    started: bool,
    loop_count: u16,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl StubEngine {
    pub fn new(width: u32, height: u32, frames: usize) -> (Self, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                width,
                height,
                frames,
                index: 0,
                started: false,
                loop_count: 0,
                closes: closes.clone(),
                closed: false,
            },
            closes,
        )
    }

    fn check_open(&self) {
        assert!(!self.closed, "engine used after close");
    }
}

impl DecodingEngine for StubEngine {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn frame_count(&self) -> usize {
        self.frames
    }
    fn duration(&self) -> Duration {
        Duration::from_millis(10) * self.frames as u32
    }
    fn frame_duration(&self, index: usize) -> Duration {
        if index < self.frames { Duration::from_millis(10) } else { Duration::ZERO }
    }
    fn loop_count(&self) -> u16 {
        self.loop_count
    }
    fn set_loop_count(&mut self, count: u16) {
        self.loop_count = count;
    }
    fn set_options(&mut self, _sample_size: u16, _opaque: bool) {}
    fn comment(&self) -> Option<String> {
        None
    }
    fn allocation_byte_count(&self) -> u64 {
        0
    }
    fn metadata_byte_count(&self) -> u64 {
        0
    }
    fn source_length(&self) -> u64 {
        0
    }
    fn error_code(&self) -> EngineErrorCode {
        EngineErrorCode::NoError
    }
    fn is_opaque(&self) -> bool {
        true
    }
    fn is_completed(&self) -> bool {
        false
    }
    fn current_frame_index(&self) -> usize {
        self.check_open();
        self.index
    }
    fn current_loop(&self) -> u32 {
        0
    }
    fn current_position(&self) -> Duration {
        Duration::from_millis(10) * self.index as u32
    }

    fn render(&mut self, buffer: &mut PixelBuffer) -> Result<usize, EngineErrorCode> {
        self.check_open();
        if self.started {
            self.index = (self.index + 1) % self.frames;
        }
        self.started = true;
        buffer.fill(frame_color(self.index));
        Ok(buffer.byte_len())
    }

    fn seek(
        &mut self,
        target: SeekTarget,
        buffer: Option<&mut PixelBuffer>,
    ) -> Result<usize, EngineErrorCode> {
        self.check_open();
        self.index = match target {
            SeekTarget::Frame(i) => i % self.frames,
            SeekTarget::Time(_) => 0,
        };
        self.started = true;
        if let Some(buffer) = buffer {
            buffer.fill(frame_color(self.index));
        }
        Ok(self.index)
    }

    fn reset(&mut self) -> bool {
        self.index = 0;
        self.started = false;
        true
    }

    fn save_remainder(&mut self) {}

    fn restore_remainder(&mut self) -> Option<usize> {
        None
    }

    fn capture_snapshot(&self) -> Snapshot {
        Snapshot::from_raw(vec![self.index as i64])
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<usize, SnapshotMismatch> {
        let &[index] = snapshot.as_raw() else {
            return Err(SnapshotMismatch);
        };
        self.index = usize::try_from(index).map_err(|_| SnapshotMismatch)? % self.frames;
        self.started = false;
        Ok(self.index)
    }

    fn upload_to_texture(&mut self, _target: &mut dyn TextureTarget, _level: u32, _mode: TextureUpload) {
        self.check_open();
    }

    fn close(&mut self) {
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Target that keeps every presented frame.
pub struct RecordingSurface {
    width: u32,
    height: u32,
    frames: Mutex<Vec<PixelBuffer>>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn frames(&self) -> Vec<PixelBuffer> {
        self.frames.lock().unwrap().clone()
    }
}

impl PresentationTarget for RecordingSurface {
    fn begin_frame(&self) -> Option<PixelBuffer> {
        Some(PixelBuffer::new(self.width, self.height))
    }

    fn end_frame(&self, frame: PixelBuffer) {
        self.frames.lock().unwrap().push(frame);
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
