pub mod cmd;
pub mod loudness;
