use realfft::RealFftPlanner;
use realfft::num_complex::Complex;

/// Spectre de magnitude d'une fenêtre de Hann, pour le thread de traitement.
///
/// Plan, scratch and magnitude buffers are allocated once; `process` does
/// not allocate.
///
/// # Example
/// ```
/// use am_audio::fft::FftPipeline;
/// let fft = FftPipeline::new(2048);
/// assert_eq!(fft.bins(), 1025);
/// ```
pub struct FftPipeline {
    fft_size: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    plan: std::sync::Arc<dyn realfft::RealToComplex<f32>>,
    /// Hann window coefficients.
    window: Vec<f32>,
}

impl FftPipeline {
    /// Plan a forward transform of `size` samples.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let magnitudes = vec![0.0; spectrum_buf.len()];

        Self {
            fft_size: size,
            input_buf,
            spectrum_buf,
            scratch,
            magnitudes,
            plan,
            window: hann(size),
        }
    }

    /// Process `samples` through the windowed FFT.
    ///
    /// Uses the first `fft_size` samples and zero-pads shorter input.
    /// Returns the magnitude spectrum (N/2+1 bins), valid until the next call.
    ///
    /// # Example
    /// ```
    /// use am_audio::fft::FftPipeline;
    /// let mut fft = FftPipeline::new(256);
    /// let samples = vec![0.0f32; 100];
    /// let spectrum = fft.process(&samples);
    /// assert_eq!(spectrum.len(), 129); // N/2 + 1
    /// assert!(spectrum.iter().all(|&m| m == 0.0));
    /// ```
    pub fn process(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.fft_size.min(samples.len());

        let (head, tail) = self.input_buf.split_at_mut(n);
        for ((slot, s), w) in head.iter_mut().zip(samples).zip(&self.window) {
            *slot = s * w;
        }
        tail.fill(0.0);

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            self.magnitudes.fill(0.0);
            return &self.magnitudes;
        }

        let scale = 1.0 / self.fft_size as f32;
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.spectrum_buf) {
            *mag = (c.re * c.re + c.im * c.im).sqrt() * scale;
        }
        &self.magnitudes
    }

    /// FFT window size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins (N/2 + 1).
    #[must_use]
    pub fn bins(&self) -> usize {
        self.magnitudes.len()
    }

    /// Width of one bin in Hz.
    #[must_use]
    pub fn bin_hz(&self, sample_rate: u32) -> f32 {
        sample_rate as f32 / self.fft_size as f32
    }
}

/// Symmetric Hann window of `size` points.
fn hann(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / denom).cos())
        .collect()
}
