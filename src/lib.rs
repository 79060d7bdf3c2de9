//! Overture: render-and-deliver pipeline for programmatic video.
//!
//! Jobs come in over HTTP, get rendered by a headless engine under an
//! admission gate, pass through ffmpeg post-processing, and land in S3.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod http;
pub mod media;
pub mod ports;
