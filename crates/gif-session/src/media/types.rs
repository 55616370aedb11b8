/// An RGBA8 pixel buffer that frames are rendered into.
///
/// The byte length is always `width * height * 4`; the constructors enforce it
/// so engines can copy whole frames without re-checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>, // RGBA8
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Zero-filled (fully transparent) buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; rgba_len(width, height)],
            width,
            height,
        }
    }

    /// Wrap existing pixel data. Returns `None` when the length does not match.
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == rgba_len(width, height)).then_some(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// RGBA value at (x, y), or `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let px = &self.data[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }
}

/// Byte length of a tightly packed RGBA8 image.
pub fn rgba_len(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 4
}

/// Region of the canvas touched by one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl FrameRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }

    /// Intersect with a `canvas_w` x `canvas_h` canvas.
    pub fn clamp_to(&self, canvas_w: u32, canvas_h: u32) -> Self {
        let left = self.left.min(canvas_w);
        let top = self.top.min(canvas_h);
        Self {
            left,
            top,
            width: self.width.min(canvas_w - left),
            height: self.height.min(canvas_h - top),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rect containing both. Empty rects are ignored.
    pub fn union(&self, other: &FrameRect) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = (self.left + self.width).max(other.left + other.width);
        let bottom = (self.top + self.height).max(other.top + other.height);
        Self {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn covers(&self, canvas_w: u32, canvas_h: u32) -> bool {
        self.left == 0 && self.top == 0 && self.width >= canvas_w && self.height >= canvas_h
    }

    /// Copy this region out of a full-canvas RGBA8 image, row by row.
    pub fn extract(&self, canvas: &[u8], canvas_w: u32) -> Vec<u8> {
        let row_bytes = self.width as usize * 4;
        let mut out = Vec::with_capacity(row_bytes * self.height as usize);
        for y in self.top..self.top + self.height {
            let start = ((y as usize) * (canvas_w as usize) + self.left as usize) * 4;
            out.extend_from_slice(&canvas[start..start + row_bytes]);
        }
        out
    }
}
