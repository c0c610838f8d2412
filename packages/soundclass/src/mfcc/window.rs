use std::f64::consts::PI;

/// Hamming window coefficients, computed once for a fixed length.
///
/// `w[i] = 0.54 - 0.46 · cos(2πi / (N - 1))`
#[derive(Debug, Clone)]
pub struct HammingWindow {
    coeffs: Box<[f32]>,
}

impl HammingWindow {
    pub fn new(len: usize) -> Self {
        let coeffs = if len == 1 {
            vec![1.0]
        } else {
            let denom = (len - 1) as f64;
            (0..len)
                .map(|i| (0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos()) as f32)
                .collect()
        };
        Self { coeffs: coeffs.into_boxed_slice() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    #[inline]
    pub fn coeffs(&self) -> &[f32] {
        &self.coeffs
    }

    /// Multiply `frame` by the window in place.
    #[inline]
    pub fn apply(&self, frame: &mut [f32]) {
        debug_assert_eq!(frame.len(), self.coeffs.len());
        for (x, &w) in frame.iter_mut().zip(self.coeffs.iter()) {
            *x *= w;
        }
    }
}

/// First-order pre-emphasis `y[0] = x[0]`, `y[i] = x[i] - α·x[i-1]`.
#[inline]
pub fn pre_emphasis(input: &[f32], out: &mut [f32], alpha: f32) {
    debug_assert_eq!(input.len(), out.len());
    let Some(&first) = input.first() else {
        return;
    };
    out[0] = first;
    for (dst, pair) in out[1..].iter_mut().zip(input.windows(2)) {
        *dst = pair[1] - alpha * pair[0];
    }
}
