//! Text and image embedding.
//!
//! Two families of encoder live here:
//!
//! - [`DualEncoder`]: CLIP image and text towers sharing a 512-d space, used
//!   for image vectors and for free-text "vibe" queries against them
//! - [`TextEmbedder`]: MiniLM sentence vectors (384-d), used only to compare
//!   tag strings with each other
//!
//! Vectors from the two families are never compared with each other.
//!
//! ```rust,ignore
//! let encoder = DualEncoder::load(files, DeviceKind::Cpu)?;
//! let tensor = encoder.preprocess(&image);
//! let image_vec = encoder.embed_image(&tensor)?;
//! let text_vec = encoder.encode_text("moody film photo")?;
//! ```

pub mod clip;
pub mod preprocess;
pub mod text;

pub use clip::{DualEncoder, DualEncoderFiles};
pub use text::TextEmbedder;
