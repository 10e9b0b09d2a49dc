//! facegate-vision: the vision layer in front of the engine.
//!
//! Loads face crops from image files, converts them to grayscale frames and
//! applies the preprocessing the descriptor expects (histogram equalization
//! and light smoothing).

pub mod frame;
pub mod source;

pub use frame::{is_dark_frame, Frame, FrameError};
pub use source::{enrollment_dirs, load_frame, FaceSource, ImageDirSource, ProbeWatcher, SourceError};
