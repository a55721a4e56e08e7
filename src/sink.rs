// src/sink.rs
//
// Downstream consumers of rendered audio.

use std::cell::RefCell;
use std::rc::Rc;

/// Receives audio in frame order.
///
/// Batch-granularity producers push one full buffer per completed batch;
/// per-sample producers push one-sample slices.
pub trait AudioSink {
    fn push(&mut self, samples: &[f32]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    #[inline]
    fn push(&mut self, _samples: &[f32]) {}
}

impl AudioSink for Vec<f32> {
    #[inline]
    fn push(&mut self, samples: &[f32]) {
        self.extend_from_slice(samples);
    }
}

/// Shared capture: the driver keeps one handle, the scheduler owns the other.
impl AudioSink for Rc<RefCell<Vec<f32>>> {
    #[inline]
    fn push(&mut self, samples: &[f32]) {
        self.borrow_mut().extend_from_slice(samples);
    }
}

impl AudioSink for Box<dyn AudioSink> {
    #[inline]
    fn push(&mut self, samples: &[f32]) {
        (**self).push(samples)
    }
}

/// Create a capture sink plus a handle for reading it back.
pub fn capture() -> (Box<dyn AudioSink>, Rc<RefCell<Vec<f32>>>) {
    let shared = Rc::new(RefCell::new(Vec::new()));
    (Box::new(Rc::clone(&shared)), shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_in_order() {
        let (mut sink, handle) = capture();
        sink.push(&[1.0, 2.0]);
        sink.push(&[3.0]);
        assert_eq!(*handle.borrow(), vec![1.0, 2.0, 3.0]);
    }
}
