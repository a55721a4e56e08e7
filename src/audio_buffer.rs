// src/audio_buffer.rs

/// Fixed-size mono buffer holding the most recently rendered batch.
///
/// Owned by a scheduler and overwritten in place on every render.
/// Callers that need the previous batch must copy it out before the
/// next boundary.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: Vec<f32>,
}

impl OutputBuffer {
    /// Allocate a zeroed buffer of `frames` samples.
    pub fn new(frames: usize) -> Self {
        Self {
            data: vec![0.0; frames],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Sample at `index`, or silence past the end.
    #[inline]
    pub fn sample(&self, index: usize) -> f32 {
        self.data.get(index).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = OutputBuffer::new(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_clear_and_sample() {
        let mut buffer = OutputBuffer::new(4);
        buffer.samples_mut().copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(buffer.sample(2), 0.3);
        assert_eq!(buffer.sample(10), 0.0);

        buffer.clear();
        assert_eq!(buffer.sample(2), 0.0);
    }
}
