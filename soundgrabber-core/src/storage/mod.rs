pub mod metadata;
pub mod recordings;
pub mod settings;
pub mod wav_writer;
