use serde::{Deserialize, Serialize};

/// Sample encoding written to the recording file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Int16,
    Int24,
    Float32,
}

impl SampleFormat {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Float32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    /// WAVE `fmt ` format tag: 1 = integer PCM, 3 = IEEE float.
    pub fn wav_format_code(self) -> u16 {
        match self {
            Self::Int16 | Self::Int24 => 1,
            Self::Float32 => 3,
        }
    }
}

/// Shape of the audio stream flowing from the loopback tap into the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.sample_format.bits_per_sample() / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        Ok(())
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::new(48000, 2, SampleFormat::Float32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes() {
        let format = StreamFormat::new(48000, 2, SampleFormat::Int24);
        assert_eq!(format.block_align(), 6);
        assert_eq!(format.byte_rate(), 288_000);

        let float = StreamFormat::default();
        assert_eq!(float.block_align(), 8);
        assert_eq!(float.sample_format.wav_format_code(), 3);
    }

    #[test]
    fn rejects_surround() {
        let format = StreamFormat::new(48000, 6, SampleFormat::Int16);
        assert!(format.validate().is_err());
    }
}
