pub mod error;
pub mod keys;
pub mod postprocess;
pub mod render;
pub mod subtitles;
