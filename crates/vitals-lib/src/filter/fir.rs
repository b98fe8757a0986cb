//! Causal FIR convolution, sample by sample or over a whole buffer.
//!
//! `y[n] = Σ h[k]·x[n−k]` with a zero-seeded history. The batch form is the
//! streaming form run to completion, so both produce identical output.
use super::design::ImpulseResponse;

/// Streaming FIR state: fixed delay line over the most recent raw samples.
#[derive(Debug, Clone)]
pub struct StreamingFir {
    taps: ImpulseResponse,
    delay_line: Vec<f64>,
    pos: usize,
}

impl StreamingFir {
    pub fn new(taps: ImpulseResponse) -> Self {
        Self {
            delay_line: vec![0.0; taps.len()],
            taps,
            pos: 0,
        }
    }

    /// Feed one raw sample and return the filtered value.
    ///
    /// A non-finite sample enters the delay line as zero and yields NaN for
    /// its own step only.
    pub fn push(&mut self, sample: f64) -> f64 {
        let gap = !sample.is_finite();
        let n = self.delay_line.len();
        self.delay_line[self.pos] = if gap { 0.0 } else { sample };

        let taps = self.taps.as_slice();
        let mut output = 0.0;
        for (k, h) in taps.iter().enumerate() {
            output += h * self.delay_line[(self.pos + n - k) % n];
        }
        self.pos = (self.pos + 1) % n;

        if gap {
            f64::NAN
        } else {
            output
        }
    }

    /// Lazily filter an iterator of samples.
    pub fn filter_iter<I>(self, samples: I) -> FirIter<I::IntoIter>
    where
        I: IntoIterator<Item = f64>,
    {
        FirIter {
            filter: self,
            samples: samples.into_iter(),
        }
    }

    /// Forget the history, as if no sample had been pushed.
    pub fn reset(&mut self) {
        self.delay_line.fill(0.0);
        self.pos = 0;
    }

    pub fn group_delay(&self) -> usize {
        self.taps.group_delay()
    }

    pub fn taps(&self) -> &ImpulseResponse {
        &self.taps
    }
}

/// Iterator returned by [`StreamingFir::filter_iter`].
#[derive(Debug, Clone)]
pub struct FirIter<I> {
    filter: StreamingFir,
    samples: I,
}

impl<I: Iterator<Item = f64>> Iterator for FirIter<I> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        self.samples.next().map(|x| self.filter.push(x))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

/// Filter a complete buffer. Output has the input's length and lags it by
/// [`ImpulseResponse::group_delay`] samples.
pub fn apply_fir(samples: &[f64], taps: &ImpulseResponse) -> Vec<f64> {
    StreamingFir::new(taps.clone())
        .filter_iter(samples.iter().copied())
        .collect()
}
