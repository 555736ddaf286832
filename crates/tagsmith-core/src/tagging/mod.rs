//! Multi-label image tagging.
//!
//! An image goes through letterbox preprocessing, one pass of the tagger
//! network, and sigmoid postprocessing into a category-grouped [`TagMap`].
//!
//! ```rust,ignore
//! use tagsmith_core::tagging::{ImageTagger, TagOptions};
//!
//! let tagger = ImageTagger::load(&model, &metadata, DeviceKind::Cpu)?;
//! let tags = tagger.tag(&image, &TagOptions::default())?;
//! for (category, tags) in &tags {
//!     println!("{category}: {}", tags.len());
//! }
//! ```
//!
//! [`TagMap`]: crate::types::TagMap

pub mod postprocess;
pub mod preprocess;
pub mod table;
pub mod tagger;

pub use postprocess::TagOptions;
pub use table::TagTable;
pub use tagger::{validate_request, ImageTagger};
