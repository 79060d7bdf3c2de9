pub mod health;
pub mod housekeeping;
pub mod postprocess;
pub mod render;
