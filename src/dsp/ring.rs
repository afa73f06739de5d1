//! Ring Sample Buffer
//!
//! Fixed-capacity circular store of samples. Writes past capacity overwrite
//! the oldest data; reads address samples relative to the oldest one still
//! retained and may straddle the physical wrap point.
//!
//! Capacity never changes after construction, so every push and read is O(1)
//! per sample and allocation-free.

use crate::error::{NrError, NrResult};

#[derive(Debug, Clone)]
pub struct RingSampleBuffer {
    buf: Vec<f32>,
    // Next physical write position.
    head: usize,
    len: usize,
}

impl RingSampleBuffer {
    /// # Panics
    /// Panics if `capacity` is zero. Engine configs validate their lengths
    /// before constructing a ring.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be > 0");
        Self {
            buf: vec![0.0; capacity],
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Append one sample. Returns the evicted sample once the buffer is full.
    #[inline]
    pub fn push_sample(&mut self, x: f32) -> Option<f32> {
        let cap = self.buf.len();
        let evicted = if self.len == cap {
            Some(self.buf[self.head])
        } else {
            self.len += 1;
            None
        };
        self.buf[self.head] = x;
        self.head = (self.head + 1) % cap;
        evicted
    }

    /// Append samples, overwriting the oldest once capacity is exceeded.
    pub fn push(&mut self, samples: &[f32]) {
        let cap = self.buf.len();
        // Only the newest `cap` samples can survive.
        let tail = &samples[samples.len().saturating_sub(cap)..];
        for &x in tail {
            self.buf[self.head] = x;
            self.head = (self.head + 1) % cap;
        }
        self.len = (self.len + tail.len()).min(cap);
    }

    #[inline]
    fn oldest(&self) -> usize {
        let cap = self.buf.len();
        (self.head + cap - self.len) % cap
    }

    /// Sample at `offset` after the oldest retained sample.
    #[inline]
    pub fn get(&self, offset: usize) -> Option<f32> {
        if offset >= self.len {
            return None;
        }
        Some(self.buf[(self.oldest() + offset) % self.buf.len()])
    }

    /// Logical view of `length` samples starting `offset` after the oldest.
    ///
    /// Returned as two physical halves, oldest first; the second half is empty
    /// unless the range crosses the wrap point.
    pub fn read(&self, offset: usize, length: usize) -> NrResult<(&[f32], &[f32])> {
        if offset.checked_add(length).map_or(true, |end| end > self.len) {
            return Err(NrError::OutOfRange {
                offset,
                len: length,
                available: self.len,
            });
        }
        let cap = self.buf.len();
        let start = (self.oldest() + offset) % cap;
        let first = length.min(cap - start);
        Ok((
            &self.buf[start..start + first],
            &self.buf[..length - first],
        ))
    }

    /// Copy `out.len()` samples starting at `offset` into `out`.
    pub fn copy_to(&self, offset: usize, out: &mut [f32]) -> NrResult<()> {
        let (a, b) = self.read(offset, out.len())?;
        out[..a.len()].copy_from_slice(a);
        out[a.len()..].copy_from_slice(b);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut ring = RingSampleBuffer::new(4);
        ring.push(&[1.0, 2.0]);
        assert_eq!(ring.len(), 2);
        assert!(!ring.is_full());
        assert_eq!(ring.get(0), Some(1.0));
        assert_eq!(ring.get(1), Some(2.0));
        assert_eq!(ring.get(2), None);
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut ring = RingSampleBuffer::new(4);
        ring.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(ring.is_full());
        let mut out = [0.0; 4];
        ring.copy_to(0, &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_read_spans_wrap_point() {
        let mut ring = RingSampleBuffer::new(5);
        ring.push(&[0.0, 1.0, 2.0, 3.0]);
        ring.push(&[4.0, 5.0, 6.0]);
        // Retained: 2,3,4,5,6 with the physical wrap after 4.
        let (a, b) = ring.read(1, 4).unwrap();
        assert!(!b.is_empty());
        let joined: Vec<f32> = a.iter().chain(b.iter()).copied().collect();
        assert_eq!(joined, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_push_sample_reports_eviction() {
        let mut ring = RingSampleBuffer::new(2);
        assert_eq!(ring.push_sample(1.0), None);
        assert_eq!(ring.push_sample(2.0), None);
        assert_eq!(ring.push_sample(3.0), Some(1.0));
        assert_eq!(ring.get(0), Some(2.0));
    }

    #[test]
    fn test_read_out_of_range() {
        let mut ring = RingSampleBuffer::new(8);
        ring.push(&[1.0, 2.0, 3.0]);
        assert_eq!(
            ring.read(2, 2).unwrap_err(),
            NrError::OutOfRange {
                offset: 2,
                len: 2,
                available: 3
            }
        );
    }

    #[test]
    fn test_read_huge_offset_is_out_of_range() {
        let mut ring = RingSampleBuffer::new(4);
        ring.push(&[1.0, 2.0]);
        assert_eq!(
            ring.read(usize::MAX, 2).unwrap_err(),
            NrError::OutOfRange {
                offset: usize::MAX,
                len: 2,
                available: 2
            }
        );
        assert!(ring.read(1, usize::MAX).is_err());
        assert_eq!(ring.get(usize::MAX), None);
    }

    #[test]
    #[should_panic(expected = "ring capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = RingSampleBuffer::new(0);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingSampleBuffer::new(3);
        ring.push(&[1.0, 2.0, 3.0]);
        ring.clear();
        assert!(ring.is_empty());
        ring.push(&[7.0]);
        assert_eq!(ring.get(0), Some(7.0));
    }
}
