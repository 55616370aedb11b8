use std::hash::Hasher;
use std::io::{Cursor, Read};
use std::time::Duration;

use gif::{ColorOutput, DecodeOptions, DecodingError, DisposalMethod, Repeat};
use rustc_hash::FxHasher;

use super::source::{self, Input, StreamTail};
use super::{DecodingEngine, EngineOptions, SeekTarget, SnapshotMismatch, Source};
use crate::error::{EngineErrorCode, OpenError};
use crate::media::{FrameRect, PixelBuffer, rgba_len};
use crate::snapshot::Snapshot;
use crate::texture::{TextureTarget, TextureUpload};

/// First word of every snapshot this engine produces ("GIFS").
const SNAPSHOT_TAG: i64 = 0x4749_4653;
const SNAPSHOT_LEN: usize = 6;

type BoxedReader = Box<dyn Read + Send>;

/// One composed frame: the full canvas after drawing it.
struct StoredFrame {
    pixels: Vec<u8>, // RGBA8, full canvas
    delay: Duration,
    /// Canvas region that differs from the previous frame.
    damage: FrameRect,
}

/// Disposal of the previous frame, applied before drawing the next one.
struct Disposal {
    method: DisposalMethod,
    rect: FrameRect,
    previous: Option<Vec<u8>>,
}

/// [`DecodingEngine`] backed by the `gif` crate.
///
/// In-memory sources are decoded completely at open. Streams are decoded one
/// frame at a time as playback reaches them, so `frame_count` grows until the
/// stream ends.
pub struct GifEngine {
    decoder: Option<gif::Decoder<BoxedReader>>,
    stream: Option<StreamTail>,
    width: u32,
    height: u32,
    canvas: Vec<u8>,
    pending_disposal: Option<Disposal>,
    frames: Vec<StoredFrame>,
    exhausted: bool,
    min_frame_delay: Duration,
    file_loop_count: u16,
    loop_override: Option<u16>,
    comment: Option<String>,
    memory_len: u64,
    opaque: bool,
    opaque_hint: bool,
    sample_size: u16,
    fingerprint: u64,
    current_index: usize,
    /// Frame the next `render` shows instead of advancing.
    pending: Option<usize>,
    current_loop: u32,
    completed: bool,
    error: EngineErrorCode,
    remainder_saved: bool,
}

impl GifEngine {
    pub fn open(source: Source, options: &EngineOptions) -> Result<Self, OpenError> {
        let kind = source.kind();
        let input = source::resolve(source)?;

        let (reader, stream, comment, memory_len) = match input {
            Input::Memory(data) => {
                let comment = find_comment(&data);
                let len = data.len() as u64;
                (Box::new(Cursor::new(data)) as BoxedReader, None, comment, len)
            }
            Input::Stream(tail) => (Box::new(tail.clone()) as BoxedReader, Some(tail), None, 0),
        };

        let mut decode_options = DecodeOptions::new();
        decode_options.set_color_output(ColorOutput::RGBA);
        let decoder = decode_options.read_info(reader).map_err(|e| {
            let code = match e {
                DecodingError::Io(_) => EngineErrorCode::ReadFailed,
                _ => EngineErrorCode::NotGifFile,
            };
            OpenError::new(code, e.to_string())
        })?;

        let width = u32::from(decoder.width());
        let height = u32::from(decoder.height());
        if width == 0 || height == 0 {
            return Err(OpenError::new(
                EngineErrorCode::InvalidScreenDimensions,
                format!("logical screen is {width}x{height}"),
            ));
        }

        let mut engine = Self {
            decoder: Some(decoder),
            stream,
            width,
            height,
            canvas: vec![0u8; rgba_len(width, height)],
            pending_disposal: None,
            frames: Vec::new(),
            exhausted: false,
            min_frame_delay: options.min_frame_delay,
            file_loop_count: 1,
            loop_override: options.loop_count,
            comment,
            memory_len,
            opaque: true,
            opaque_hint: false,
            sample_size: 1,
            fingerprint: 0,
            current_index: 0,
            pending: Some(0),
            current_loop: 0,
            completed: false,
            error: EngineErrorCode::NoError,
            remainder_saved: false,
        };

        engine
            .decode_next()
            .map_err(|code| OpenError::new(code, "failed to decode first frame"))?;
        if engine.frames.is_empty() {
            return Err(OpenError::new(EngineErrorCode::NoFrames, "source contains no frames"));
        }

        if engine.stream.is_none() {
            while !engine.exhausted {
                if let Err(code) = engine.decode_next() {
                    log::warn!(
                        "GIF truncated after {} frames ({code}), playing what was decoded",
                        engine.frames.len()
                    );
                }
            }
        }

        engine.fingerprint = fingerprint(&engine.frames[0], width, height);

        log::info!(
            "Opened GIF from {kind}: {}x{}, {} frame{}{}",
            width,
            height,
            engine.frames.len(),
            if engine.frames.len() == 1 { "" } else { "s" },
            if engine.exhausted { "" } else { " so far" }
        );

        Ok(engine)
    }

    /// Decode one more frame from the source. Marks the engine exhausted at
    /// the end of input and on the first failure; failures are not retried.
    fn decode_next(&mut self) -> Result<(), EngineErrorCode> {
        let Some(decoder) = self.decoder.as_mut() else {
            self.exhausted = true;
            return Ok(());
        };

        let result = match decoder.read_next_frame() {
            Ok(Some(frame)) => {
                let stored = compose_frame(
                    &mut self.canvas,
                    &mut self.pending_disposal,
                    self.width,
                    self.height,
                    frame,
                    self.min_frame_delay,
                );
                let covers_canvas = frame.left == 0
                    && frame.top == 0
                    && u32::from(frame.width) >= self.width
                    && u32::from(frame.height) >= self.height;
                if frame.transparent.is_some() || (self.frames.is_empty() && !covers_canvas) {
                    self.opaque = false;
                }
                self.frames.push(stored);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => {
                if let Some(decoder) = &self.decoder {
                    self.file_loop_count = loops_from_repeat(decoder.repeat());
                }
                Ok(())
            }
            Ok(false) => {
                log::debug!("GIF input exhausted after {} frames", self.frames.len());
                self.exhausted = true;
                self.decoder = None;
                Ok(())
            }
            Err(e) => {
                let code = decode_error_code(&e);
                log::warn!("GIF decode failed at frame {}: {e}", self.frames.len());
                self.exhausted = true;
                self.decoder = None;
                self.error = code;
                Err(code)
            }
        }
    }

    /// Decode until `index` exists. `Ok(false)` once input ends before it.
    fn ensure_frame(&mut self, index: usize) -> Result<bool, EngineErrorCode> {
        while self.frames.len() <= index {
            if self.exhausted {
                return Ok(false);
            }
            self.decode_next()?;
        }
        Ok(true)
    }

    fn ensure_all(&mut self) -> Result<(), EngineErrorCode> {
        while !self.exhausted {
            self.decode_next()?;
        }
        Ok(())
    }

    fn write_frame(&self, index: usize, buffer: &mut PixelBuffer) -> usize {
        let Some(frame) = self.frames.get(index) else {
            return 0;
        };
        if self.sample_size > 1 {
            if !buffer.matches(self.width(), self.height()) {
                return 0;
            }
            downsample(&frame.pixels, self.width, u32::from(self.sample_size), buffer);
            return buffer.byte_len();
        }
        let dst = buffer.as_bytes_mut();
        if dst.len() != frame.pixels.len() {
            return 0;
        }
        dst.copy_from_slice(&frame.pixels);
        dst.len()
    }

    fn finite_loops(&self) -> Option<u32> {
        match self.loop_count() {
            0 => None,
            n => Some(u32::from(n)),
        }
    }

    /// Place the cursor on `index` within pass `pass`, completing the
    /// animation when `pass` is past the last allowed one.
    fn position_at(&mut self, pass: u32, index: usize) {
        self.pending = None;
        match self.finite_loops() {
            Some(limit) if pass >= limit => {
                self.current_loop = limit;
                self.current_index = self.frames.len() - 1;
                self.completed = true;
            }
            _ => {
                self.current_loop = pass;
                self.current_index = index;
                self.completed = false;
            }
        }
    }
}

impl DecodingEngine for GifEngine {
    fn width(&self) -> u32 {
        (self.width / u32::from(self.sample_size)).max(1)
    }

    fn height(&self) -> u32 {
        (self.height / u32::from(self.sample_size)).max(1)
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn duration(&self) -> Duration {
        self.frames.iter().map(|f| f.delay).sum()
    }

    fn frame_duration(&self, index: usize) -> Duration {
        self.frames.get(index).map_or(Duration::ZERO, |f| f.delay)
    }

    fn loop_count(&self) -> u16 {
        self.loop_override.unwrap_or(self.file_loop_count)
    }

    fn set_loop_count(&mut self, count: u16) {
        self.loop_override = Some(count);
        match self.finite_loops() {
            Some(limit) if self.current_loop >= limit => {
                self.current_loop = limit;
                self.completed = true;
            }
            _ => self.completed = false,
        }
    }

    fn set_options(&mut self, sample_size: u16, opaque: bool) {
        self.sample_size = sample_size.max(1);
        self.opaque_hint = opaque;
        log::debug!(
            "Sample size {}, {}x{} output",
            self.sample_size,
            self.width(),
            self.height()
        );
    }

    fn comment(&self) -> Option<String> {
        self.comment.clone()
    }

    fn allocation_byte_count(&self) -> u64 {
        let frames: usize = self.frames.iter().map(|f| f.pixels.len()).sum();
        (frames + self.canvas.len()) as u64
    }

    fn metadata_byte_count(&self) -> u64 {
        let records = self.frames.len() * std::mem::size_of::<StoredFrame>();
        let comment = self.comment.as_ref().map_or(0, |c| c.len());
        (records + comment) as u64
    }

    fn source_length(&self) -> u64 {
        match &self.stream {
            Some(tail) => tail.consumed(),
            None => self.memory_len,
        }
    }

    fn error_code(&self) -> EngineErrorCode {
        self.error
    }

    fn is_opaque(&self) -> bool {
        self.opaque || self.opaque_hint
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn current_frame_index(&self) -> usize {
        self.current_index
    }

    fn current_loop(&self) -> u32 {
        self.current_loop
    }

    fn current_position(&self) -> Duration {
        self.frames
            .iter()
            .take(self.current_index)
            .map(|f| f.delay)
            .sum()
    }

    fn render(&mut self, buffer: &mut PixelBuffer) -> Result<usize, EngineErrorCode> {
        if self.completed {
            return Ok(self.write_frame(self.current_index, buffer));
        }

        let next = self.pending.take().unwrap_or(self.current_index + 1);
        let next = if self.ensure_frame(next)? {
            next
        } else {
            // End of a pass.
            self.current_loop = self.current_loop.saturating_add(1);
            if let Some(limit) = self.finite_loops() {
                if self.current_loop >= limit {
                    self.current_loop = limit;
                    self.completed = true;
                    log::debug!("Animation completed after {limit} loop(s)");
                    return Ok(self.write_frame(self.current_index, buffer));
                }
            }
            0
        };

        self.current_index = next;
        Ok(self.write_frame(next, buffer))
    }

    fn seek(
        &mut self,
        target: SeekTarget,
        buffer: Option<&mut PixelBuffer>,
    ) -> Result<usize, EngineErrorCode> {
        let (pass, index) = match target {
            SeekTarget::Frame(frame) => {
                self.ensure_frame(frame)?;
                let n = self.frames.len();
                (u32::try_from(frame / n).unwrap_or(u32::MAX), frame % n)
            }
            SeekTarget::Time(time) => {
                self.ensure_all()?;
                let total = self.duration().as_millis();
                if total == 0 {
                    (0, 0)
                } else {
                    let t = time.as_millis();
                    let mut offset = t % total;
                    let mut index = self.frames.len() - 1;
                    for (i, frame) in self.frames.iter().enumerate() {
                        let delay = frame.delay.as_millis();
                        if offset < delay {
                            index = i;
                            break;
                        }
                        offset -= delay;
                    }
                    (u32::try_from(t / total).unwrap_or(u32::MAX), index)
                }
            }
        };

        self.position_at(pass, index);
        if let Some(buffer) = buffer {
            self.write_frame(self.current_index, buffer);
        }
        Ok(self.current_index)
    }

    fn reset(&mut self) -> bool {
        self.current_index = 0;
        self.pending = Some(0);
        self.current_loop = 0;
        self.completed = false;
        true
    }

    fn save_remainder(&mut self) {
        let Some(tail) = &self.stream else {
            return;
        };
        if !self.exhausted {
            match tail.save() {
                Ok(bytes) => log::debug!("Saved {bytes} byte stream remainder"),
                Err(e) => {
                    log::warn!("Stream failed while saving remainder: {e}");
                    self.error = EngineErrorCode::ReadFailed;
                }
            }
        }
        self.remainder_saved = true;
    }

    fn restore_remainder(&mut self) -> Option<usize> {
        if !std::mem::take(&mut self.remainder_saved) {
            return None;
        }
        let next = self.pending.unwrap_or(self.current_index + 1);
        match self.ensure_frame(next) {
            Ok(true) => Some(next),
            Ok(false) => Some(0),
            Err(_) => None,
        }
    }

    fn capture_snapshot(&self) -> Snapshot {
        let position_ms = self.current_position().as_millis();
        Snapshot::from_raw(vec![
            SNAPSHOT_TAG,
            self.fingerprint as i64,
            self.current_index as i64,
            i64::from(self.current_loop),
            i64::try_from(position_ms).unwrap_or(i64::MAX),
            i64::from(self.completed),
        ])
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<usize, SnapshotMismatch> {
        let &[tag, fingerprint, index, current_loop, _position, completed] = snapshot.as_raw()
        else {
            return Err(SnapshotMismatch);
        };
        debug_assert_eq!(snapshot.as_raw().len(), SNAPSHOT_LEN);
        if tag != SNAPSHOT_TAG || fingerprint as u64 != self.fingerprint {
            return Err(SnapshotMismatch);
        }
        let index = usize::try_from(index).map_err(|_| SnapshotMismatch)?;
        let current_loop = u32::try_from(current_loop).map_err(|_| SnapshotMismatch)?;
        if !matches!(self.ensure_frame(index), Ok(true)) {
            return Err(SnapshotMismatch);
        }

        self.current_index = index;
        self.current_loop = current_loop;
        self.completed = completed != 0 && self.finite_loops().is_some();
        self.pending = (!self.completed).then_some(index);
        Ok(index)
    }

    fn upload_to_texture(&mut self, target: &mut dyn TextureTarget, level: u32, mode: TextureUpload) {
        let Some(frame) = self.frames.get(self.current_index) else {
            return;
        };
        if self.sample_size > 1 {
            let mut scaled = PixelBuffer::new(self.width(), self.height());
            downsample(&frame.pixels, self.width, u32::from(self.sample_size), &mut scaled);
            match mode {
                TextureUpload::Full => {
                    target.upload(level, scaled.width(), scaled.height(), scaled.as_bytes());
                }
                // Damage is tracked on the full canvas.
                TextureUpload::Partial => {
                    let region = FrameRect::full(scaled.width(), scaled.height());
                    target.update(level, region, scaled.as_bytes());
                }
            }
            return;
        }
        match mode {
            TextureUpload::Full => target.upload(level, self.width, self.height, &frame.pixels),
            TextureUpload::Partial => {
                if frame.damage.is_empty() {
                    return;
                }
                let region = frame.damage.extract(&frame.pixels, self.width);
                target.update(level, frame.damage, &region);
            }
        }
    }

    fn close(&mut self) {
        self.decoder = None;
        if let Some(tail) = self.stream.take() {
            tail.release();
        }
        self.frames = Vec::new();
        self.canvas = Vec::new();
        self.pending_disposal = None;
        self.exhausted = true;
    }
}

/// Draw `frame` onto `canvas` and return the composed result.
fn compose_frame(
    canvas: &mut [u8],
    pending: &mut Option<Disposal>,
    width: u32,
    height: u32,
    frame: &gif::Frame<'_>,
    min_delay: Duration,
) -> StoredFrame {
    let rect = FrameRect {
        left: u32::from(frame.left),
        top: u32::from(frame.top),
        width: u32::from(frame.width),
        height: u32::from(frame.height),
    }
    .clamp_to(width, height);

    // The first frame replaces whatever was shown before.
    let mut damage = FrameRect::full(width, height);
    if let Some(disposal) = pending.take() {
        damage = rect;
        if !matches!(disposal.method, DisposalMethod::Any | DisposalMethod::Keep) {
            damage = damage.union(&disposal.rect);
        }
        apply_disposal(canvas, width, disposal);
    }

    let previous = (frame.dispose == DisposalMethod::Previous).then(|| canvas.to_vec());

    // Composite frame onto canvas at the correct offset (GIF frames can be partial updates)
    let fw = u32::from(frame.width);
    for y in 0..u32::from(frame.height) {
        for x in 0..fw {
            let dst_x = u32::from(frame.left) + x;
            let dst_y = u32::from(frame.top) + y;
            if dst_x >= width || dst_y >= height {
                continue;
            }
            let src_idx = ((y * fw + x) * 4) as usize;
            let Some(src) = frame.buffer.get(src_idx..src_idx + 4) else {
                continue;
            };
            // Only overwrite if source pixel is not fully transparent
            if src[3] > 0 {
                let dst_idx = ((dst_y * width + dst_x) * 4) as usize;
                canvas[dst_idx..dst_idx + 4].copy_from_slice(src);
            }
        }
    }

    *pending = Some(Disposal {
        method: frame.dispose,
        rect,
        previous,
    });

    // GIF delay is in centiseconds
    let delay = Duration::from_millis(u64::from(frame.delay) * 10).max(min_delay);

    StoredFrame {
        pixels: canvas.to_vec(),
        delay,
        damage,
    }
}

fn apply_disposal(canvas: &mut [u8], width: u32, disposal: Disposal) {
    match disposal.method {
        DisposalMethod::Background => {
            let r = disposal.rect;
            for y in r.top..r.top + r.height {
                let start = ((y * width + r.left) * 4) as usize;
                let end = start + r.width as usize * 4;
                canvas[start..end].fill(0);
            }
        }
        DisposalMethod::Previous => {
            if let Some(previous) = disposal.previous {
                canvas.copy_from_slice(&previous);
            }
        }
        _ => {}
    }
}

/// Loop count convention: 0 is infinite. A file without a NETSCAPE
/// extension plays once.
/// Nearest-neighbour reduction: output pixel (x, y) is canvas pixel
/// (x * step, y * step).
fn downsample(canvas: &[u8], canvas_w: u32, step: u32, out: &mut PixelBuffer) {
    let row_bytes = out.width() as usize * 4;
    let (canvas_w, step) = (canvas_w as usize, step as usize);
    for (y, row) in out.as_bytes_mut().chunks_exact_mut(row_bytes).enumerate() {
        let src_row = y * step * canvas_w;
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let i = (src_row + x * step) * 4;
            px.copy_from_slice(&canvas[i..i + 4]);
        }
    }
}

fn loops_from_repeat(repeat: Repeat) -> u16 {
    match repeat {
        Repeat::Infinite => 0,
        Repeat::Finite(0) => 1,
        Repeat::Finite(n) => n,
    }
}

fn decode_error_code(e: &DecodingError) -> EngineErrorCode {
    match e {
        DecodingError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            EngineErrorCode::EofTooSoon
        }
        DecodingError::Io(_) => EngineErrorCode::ReadFailed,
        _ => EngineErrorCode::ImageDefect,
    }
}

fn fingerprint(first: &StoredFrame, width: u32, height: u32) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u32(width);
    hasher.write_u32(height);
    hasher.write_u64(first.delay.as_millis() as u64);
    hasher.write(&first.pixels);
    hasher.finish()
}

/// First comment extension of a GIF held in memory.
fn find_comment(data: &[u8]) -> Option<String> {
    if data.len() < 13 || !data.starts_with(b"GIF") {
        return None;
    }
    let mut pos = 13 + color_table_len(data[10]);
    while let Some(&introducer) = data.get(pos) {
        match introducer {
            // Extension
            0x21 => {
                let label = *data.get(pos + 1)?;
                if label == 0xFE {
                    let mut text = Vec::new();
                    let mut block = pos + 2;
                    loop {
                        let len = *data.get(block)? as usize;
                        if len == 0 {
                            break;
                        }
                        text.extend_from_slice(data.get(block + 1..block + 1 + len)?);
                        block += 1 + len;
                    }
                    return Some(String::from_utf8_lossy(&text).into_owned());
                }
                pos = skip_sub_blocks(data, pos + 2)?;
            }
            // Image descriptor, optional local color table, LZW code size, data
            0x2C => {
                let packed = *data.get(pos + 9)?;
                pos = skip_sub_blocks(data, pos + 10 + color_table_len(packed) + 1)?;
            }
            _ => return None,
        }
    }
    None
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 == 0 {
        0
    } else {
        3 * (1usize << ((packed & 0x07) + 1))
    }
}

fn skip_sub_blocks(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *data.get(pos)? as usize;
        pos += 1;
        if len == 0 {
            return Some(pos);
        }
        pos += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ClosableStream, animated_gif};

    fn open_bytes(frames: usize, delay_cs: u16, repeat: Repeat) -> GifEngine {
        GifEngine::open(
            Source::bytes(animated_gif(frames, delay_cs, repeat)),
            &EngineOptions::default(),
        )
        .unwrap()
    }

    /// Smallest valid GIF (1x1) with a comment extension after the palette.
    const COMMENTED_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xFF, 0xFF,
        0xFF, 0x00, 0x00, 0x00, 0x21, 0xFE, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00, 0x2C, 0x00,
        0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
    ];

    #[test]
    fn finds_comment_extension() {
        assert_eq!(find_comment(COMMENTED_GIF).as_deref(), Some("hello"));
    }

    #[test]
    fn no_comment_in_plain_gif() {
        assert_eq!(find_comment(&animated_gif(2, 10, Repeat::Infinite)), None);
        assert_eq!(find_comment(b"not a gif"), None);
    }

    #[test]
    fn opens_memory_source_completely() {
        let engine = open_bytes(3, 10, Repeat::Infinite);
        assert_eq!(engine.frame_count(), 3);
        assert_eq!(engine.duration(), Duration::from_millis(300));
        assert_eq!(engine.frame_duration(1), Duration::from_millis(100));
        assert_eq!(engine.frame_duration(7), Duration::ZERO);
        assert_eq!(engine.loop_count(), 0);
        assert!(engine.is_opaque());
        assert!(engine.allocation_byte_count() > 0);
    }

    #[test]
    fn rejects_non_gif_input() {
        let err = GifEngine::open(Source::bytes(b"PNG nope".to_vec()), &EngineOptions::default())
            .err()
            .unwrap();
        assert!(err.code.is_error());
    }

    #[test]
    fn short_delays_are_raised_to_minimum() {
        let engine = open_bytes(2, 0, Repeat::Infinite);
        assert_eq!(engine.frame_duration(0), crate::engine::DEFAULT_MIN_FRAME_DELAY);
    }

    #[test]
    fn finite_repeat_maps_to_loop_count() {
        assert_eq!(loops_from_repeat(Repeat::Finite(0)), 1);
        assert_eq!(loops_from_repeat(Repeat::Finite(3)), 3);
        assert_eq!(loops_from_repeat(Repeat::Infinite), 0);
    }

    #[test]
    fn render_walks_frames_and_wraps() {
        let mut engine = open_bytes(3, 10, Repeat::Infinite);
        let mut buf = PixelBuffer::new(engine.width(), engine.height());
        let mut seen = Vec::new();
        for _ in 0..5 {
            engine.render(&mut buf).unwrap();
            seen.push(engine.current_frame_index());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
        assert_eq!(engine.current_loop(), 1);
        assert!(!engine.is_completed());
    }

    #[test]
    fn distinct_frames_render_distinct_pixels() {
        let mut engine = open_bytes(2, 10, Repeat::Infinite);
        let mut first = PixelBuffer::new(engine.width(), engine.height());
        let mut second = first.clone();
        engine.render(&mut first).unwrap();
        engine.render(&mut second).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn seek_time_picks_frame_by_accumulated_delay() {
        let mut engine = open_bytes(3, 10, Repeat::Infinite);
        assert_eq!(engine.seek(SeekTarget::Time(Duration::from_millis(150)), None), Ok(1));
        assert_eq!(engine.seek(SeekTarget::Time(Duration::from_millis(299)), None), Ok(2));
        assert_eq!(engine.seek(SeekTarget::Time(Duration::from_millis(300)), None), Ok(0));
        assert_eq!(engine.current_loop(), 1);
    }

    #[test]
    fn seek_past_last_pass_completes() {
        let mut engine = open_bytes(3, 10, Repeat::Infinite);
        engine.set_loop_count(2);
        let mut buf = PixelBuffer::new(engine.width(), engine.height());
        let index = engine
            .seek(SeekTarget::Time(Duration::from_millis(1000)), Some(&mut buf))
            .unwrap();
        assert_eq!(index, 2);
        assert!(engine.is_completed());
        assert_eq!(engine.current_loop(), 2);

        let before = buf.clone();
        engine.render(&mut buf).unwrap();
        assert_eq!(engine.current_frame_index(), 2);
        assert_eq!(buf, before);
    }

    #[test]
    fn raising_loop_count_resumes_completed_animation() {
        let mut engine = open_bytes(2, 10, Repeat::Infinite);
        engine.set_loop_count(1);
        engine.seek(SeekTarget::Frame(5), None).unwrap();
        assert!(engine.is_completed());
        engine.set_loop_count(0);
        assert!(!engine.is_completed());
    }

    #[test]
    fn snapshot_rejects_other_source() {
        let a = open_bytes(3, 10, Repeat::Infinite);
        let mut b = open_bytes(4, 20, Repeat::Infinite);
        assert_eq!(b.apply_snapshot(&a.capture_snapshot()), Err(SnapshotMismatch));
        assert_eq!(b.apply_snapshot(&Snapshot::from_raw(vec![1, 2])), Err(SnapshotMismatch));
    }

    #[test]
    fn snapshot_positions_next_render() {
        let mut engine = open_bytes(3, 10, Repeat::Infinite);
        engine.seek(SeekTarget::Frame(4), None).unwrap();
        let snapshot = engine.capture_snapshot();

        let mut other = open_bytes(3, 10, Repeat::Infinite);
        assert_eq!(other.apply_snapshot(&snapshot), Ok(1));
        let mut buf = PixelBuffer::new(other.width(), other.height());
        other.render(&mut buf).unwrap();
        assert_eq!(other.current_frame_index(), 1);
        assert_eq!(other.current_loop(), 1);
    }

    #[test]
    fn stream_source_decodes_lazily() {
        let (stream, _closed) = ClosableStream::new(animated_gif(3, 10, Repeat::Infinite));
        let mut engine = GifEngine::open(Source::stream(stream), &EngineOptions::default()).unwrap();
        assert_eq!(engine.frame_count(), 1);
        engine.seek(SeekTarget::Frame(2), None).unwrap();
        assert_eq!(engine.frame_count(), 3);
        assert!(engine.source_length() > 0);
    }

    #[test]
    fn closed_stream_without_saved_remainder_fails() {
        let (stream, closed) = ClosableStream::new(animated_gif(3, 10, Repeat::Infinite));
        let mut engine = GifEngine::open(Source::stream(stream), &EngineOptions::default()).unwrap();
        closed.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut buf = PixelBuffer::new(engine.width(), engine.height());
        engine.render(&mut buf).unwrap();
        assert_eq!(engine.render(&mut buf), Err(EngineErrorCode::ReadFailed));
        assert_eq!(engine.error_code(), EngineErrorCode::ReadFailed);
    }

    #[test]
    fn restore_without_save_is_none() {
        let mut engine = open_bytes(2, 10, Repeat::Infinite);
        engine.save_remainder();
        assert_eq!(engine.restore_remainder(), None);
    }

    #[test]
    fn sample_size_reduces_output() {
        let mut engine = open_bytes(2, 10, Repeat::Infinite);
        let mut full = PixelBuffer::new(8, 8);
        engine.render(&mut full).unwrap();
        engine.reset();

        engine.set_options(3, false);
        assert_eq!((engine.width(), engine.height()), (2, 2));
        let mut small = PixelBuffer::new(2, 2);
        assert_eq!(engine.render(&mut small), Ok(16));
        assert_eq!(small.pixel(1, 1), full.pixel(3, 3));

        // Larger than the canvas still leaves one pixel.
        engine.set_options(100, false);
        assert_eq!((engine.width(), engine.height()), (1, 1));
    }

    #[test]
    fn opaque_option_overrides_transparency() {
        let mut rgba = vec![0, 0, 0, 0, 255, 0, 0, 255, 255, 0, 0, 255, 255, 0, 0, 255];
        let mut data = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut data, 2, 2, &[]).unwrap();
            encoder.write_frame(&gif::Frame::from_rgba_speed(2, 2, &mut rgba, 10)).unwrap();
        }
        let mut engine = GifEngine::open(Source::bytes(data), &EngineOptions::default()).unwrap();
        assert!(!engine.is_opaque());
        engine.set_options(1, true);
        assert!(engine.is_opaque());
        engine.set_options(1, false);
        assert!(!engine.is_opaque());
    }

    #[test]
    fn sampled_texture_upload_uses_reduced_size() {
        struct Sizes(Vec<(u32, u32, usize)>);
        impl TextureTarget for Sizes {
            fn upload(&mut self, _level: u32, w: u32, h: u32, pixels: &[u8]) {
                self.0.push((w, h, pixels.len()));
            }
            fn update(&mut self, _level: u32, region: FrameRect, pixels: &[u8]) {
                self.0.push((region.width, region.height, pixels.len()));
            }
        }

        let mut engine = open_bytes(2, 10, Repeat::Infinite);
        engine.set_options(2, false);
        let mut sizes = Sizes(Vec::new());
        engine.upload_to_texture(&mut sizes, 0, TextureUpload::Full);
        engine.upload_to_texture(&mut sizes, 0, TextureUpload::Partial);
        assert_eq!(sizes.0, vec![(4, 4, 64), (4, 4, 64)]);
    }

    #[test]
    fn partial_texture_update_covers_damage() {
        struct Recorder {
            full: usize,
            regions: Vec<FrameRect>,
        }
        impl TextureTarget for Recorder {
            fn upload(&mut self, _level: u32, _w: u32, _h: u32, _pixels: &[u8]) {
                self.full += 1;
            }
            fn update(&mut self, _level: u32, region: FrameRect, pixels: &[u8]) {
                assert_eq!(pixels.len(), rgba_len(region.width, region.height));
                self.regions.push(region);
            }
        }

        let mut engine = open_bytes(2, 10, Repeat::Infinite);
        let mut rec = Recorder { full: 0, regions: Vec::new() };
        engine.upload_to_texture(&mut rec, 0, TextureUpload::Full);
        engine.upload_to_texture(&mut rec, 0, TextureUpload::Partial);
        assert_eq!(rec.full, 1);
        assert_eq!(rec.regions, vec![FrameRect::full(engine.width(), engine.height())]);
    }
}
