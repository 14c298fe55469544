pub mod capture_provider;
pub mod device_registry;
pub mod installer;
pub mod recording_sink;
pub mod session_delegate;
