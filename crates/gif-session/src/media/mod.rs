pub mod types;

pub use types::{FrameRect, PixelBuffer, rgba_len};
