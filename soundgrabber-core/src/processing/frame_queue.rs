/// Longest buffer `for_duration` will allocate.
pub const MAX_QUEUE_SECS: f64 = 60.0;

/// Bounded, frame-aligned queue between the audio callback and the writer thread.
///
/// Wrap in `Arc<parking_lot::Mutex<FrameQueue>>` for cross-thread access; the
/// callback only ever pushes, the writer only ever drains.
///
/// Overflow drops the oldest whole frames so channels never slip out of
/// alignment. Dropped samples are counted for diagnostics.
#[derive(Debug)]
pub struct FrameQueue {
    buffer: Vec<f32>,
    channels: usize,
    read_index: usize,
    len: usize,
    dropped: u64,
}

impl FrameQueue {
    /// A queue holding `capacity_frames` frames of `channels` samples each.
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            buffer: vec![0.0; capacity_frames.max(1).saturating_mul(channels)],
            channels,
            read_index: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// Sized for `seconds` of audio, capped at [`MAX_QUEUE_SECS`].
    ///
    /// Non-finite durations get the cap, negative ones a single frame.
    pub fn for_duration(seconds: f64, sample_rate: u32, channels: u16) -> Self {
        let seconds = if seconds.is_finite() {
            seconds.clamp(0.0, MAX_QUEUE_SECS)
        } else {
            log::warn!("Queue duration {} is not finite; using {} s", seconds, MAX_QUEUE_SECS);
            MAX_QUEUE_SECS
        };
        let frames = (seconds * sample_rate as f64).ceil() as usize;
        Self::new(frames, channels)
    }

    /// Append interleaved samples. Returns how many samples were dropped to make room.
    ///
    /// A trailing partial frame is ignored.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let whole = samples.len() - samples.len() % self.channels;
        if whole == 0 {
            return 0;
        }
        let capacity = self.buffer.len();

        // Anything beyond capacity can never be read; keep the newest tail only.
        let (samples, mut dropped) = if whole > capacity {
            (&samples[whole - capacity..whole], whole - capacity)
        } else {
            (&samples[..whole], 0)
        };

        let overflow = (self.len + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % capacity;
            self.len -= overflow;
            dropped += overflow;
        }

        let mut write_index = (self.read_index + self.len) % capacity;
        for &sample in samples {
            self.buffer[write_index] = sample;
            write_index = (write_index + 1) % capacity;
        }
        self.len += samples.len();
        self.dropped += dropped as u64;
        dropped
    }

    /// Remove and return every queued sample.
    pub fn drain(&mut self) -> Vec<f32> {
        let capacity = self.buffer.len();
        let mut out = Vec::with_capacity(self.len);
        let first = self.len.min(capacity - self.read_index);
        out.extend_from_slice(&self.buffer[self.read_index..self.read_index + first]);
        out.extend_from_slice(&self.buffer[..self.len - first]);
        self.read_index = 0;
        self.len = 0;
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn frames(&self) -> usize {
        self.len / self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.buffer.len() / self.channels
    }

    /// Total samples dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain() {
        let mut queue = FrameQueue::new(4, 2);
        assert_eq!(queue.push(&[0.1, 0.2, 0.3, 0.4]), 0);

        assert_eq!(queue.frames(), 2);
        assert_eq!(queue.drain(), vec![0.1, 0.2, 0.3, 0.4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_whole_frames() {
        let mut queue = FrameQueue::new(2, 2);
        queue.push(&[1.0, 1.0, 2.0, 2.0]);
        let dropped = queue.push(&[3.0, 3.0]);

        assert_eq!(dropped, 2);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.drain(), vec![2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn oversized_batch_keeps_newest_tail() {
        let mut queue = FrameQueue::new(2, 1);
        let dropped = queue.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(dropped, 3);
        assert_eq!(queue.drain(), vec![4.0, 5.0]);
    }

    #[test]
    fn wraps_around_between_drains() {
        let mut queue = FrameQueue::new(3, 1);
        queue.push(&[1.0, 2.0]);
        assert_eq!(queue.drain(), vec![1.0, 2.0]);

        queue.push(&[3.0, 4.0]);
        queue.push(&[5.0]);
        assert_eq!(queue.drain(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn partial_frames_are_ignored() {
        let mut queue = FrameQueue::new(4, 2);
        queue.push(&[0.5, 0.5, 0.9]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn sized_by_duration() {
        let queue = FrameQueue::for_duration(0.5, 48000, 2);
        assert_eq!(queue.capacity_frames(), 24000);
    }

    #[test]
    fn unreasonable_durations_are_capped() {
        let cap = (MAX_QUEUE_SECS * 48000.0) as usize;
        assert_eq!(FrameQueue::for_duration(f64::INFINITY, 48000, 2).capacity_frames(), cap);
        assert_eq!(FrameQueue::for_duration(f64::NAN, 48000, 2).capacity_frames(), cap);
        assert_eq!(FrameQueue::for_duration(1e12, 48000, 2).capacity_frames(), cap);
        assert_eq!(FrameQueue::for_duration(-3.0, 48000, 2).capacity_frames(), 1);
    }
}
