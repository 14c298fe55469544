pub mod artifact;
pub mod audio_format;
pub mod config;
pub mod dependency;
pub mod device;
pub mod error;
pub mod routing_plan;
pub mod state;
