/// Fixed-length block of signed 16-bit PCM.
///
/// Allocated once at pipeline construction and refilled every cycle. The
/// frame tracks how much of it holds fresh samples; downstream stages only
/// ever see a *complete* frame.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Box<[i16]>,
    filled: usize,
}

impl AudioFrame {
    /// Empty frame of `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0; len].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Complete frame holding a copy of `samples`.
    pub fn from_samples(samples: &[i16]) -> Self {
        Self {
            samples: samples.into(),
            filled: samples.len(),
        }
    }

    /// Capacity in samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.filled == self.samples.len()
    }

    /// Samples written since the last [`AudioFrame::clear`].
    #[inline]
    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.filled]
    }

    /// Forget the current contents; the buffer itself is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Tail of the buffer that still needs samples.
    #[inline]
    pub(crate) fn unfilled_mut(&mut self) -> &mut [i16] {
        &mut self.samples[self.filled..]
    }

    /// Whole backing buffer, used as scratch while discarding warm-up audio.
    #[inline]
    pub(crate) fn scratch_mut(&mut self) -> &mut [i16] {
        self.filled = 0;
        &mut self.samples
    }

    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.samples.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_tracking() {
        let mut f = AudioFrame::new(4);
        assert!(!f.is_complete());
        f.unfilled_mut()[..3].copy_from_slice(&[1, 2, 3]);
        f.advance(3);
        assert_eq!(f.samples(), &[1, 2, 3]);
        f.unfilled_mut()[0] = 4;
        f.advance(1);
        assert!(f.is_complete());
        f.clear();
        assert!(f.samples().is_empty());
        assert_eq!(f.len(), 4);
    }
}
