pub mod frame_queue;
pub mod wav_format;
