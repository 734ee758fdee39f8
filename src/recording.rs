use crate::error::AnalysisError;

/// Half-open time window `[start, end)` on the response time axis, in ms.
#[derive(Clone, Copy, Debug)]
pub struct TimeWindow {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl TimeWindow {
    pub fn new(start_ms: f64, end_ms: f64) -> Result<Self, AnalysisError> {
        if !(start_ms < end_ms) {
            return Err(AnalysisError::InvalidWindow { start_ms, end_ms });
        }
        Ok(Self { start_ms, end_ms })
    }

    pub fn contains(&self, t_ms: f64) -> bool {
        t_ms >= self.start_ms && t_ms < self.end_ms
    }
}

/// Optional voltage columns some exports carry. Kept in the raw export units.
#[derive(Clone, Debug)]
pub struct VoltageTrace {
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
}

/// Column-oriented table of samples for one recording.
///
/// Sweeps are stored as contiguous, equal-length blocks; sweep ids are
/// 1-based. Times are in ms, current in pA, pressure in mmHg (conversions
/// happen once, at parse time).
#[derive(Clone, Debug)]
pub struct Recording {
    n_sweeps: usize,
    samples_per_sweep: usize,
    pub time_ms: Vec<f64>,
    pub current_pa: Vec<f64>,
    pub stim_time_ms: Vec<f64>,
    pub pressure_mmhg: Vec<f64>,
    pub voltage: Option<VoltageTrace>,
}

/// Borrowed view of one sweep's slices.
#[derive(Clone, Copy, Debug)]
pub struct SweepView<'a> {
    pub sweep: usize,
    pub time_ms: &'a [f64],
    pub current_pa: &'a [f64],
    pub stim_time_ms: &'a [f64],
    pub pressure_mmhg: &'a [f64],
}

impl Recording {
    pub fn from_columns(
        n_sweeps: usize,
        time_ms: Vec<f64>,
        current_pa: Vec<f64>,
        stim_time_ms: Vec<f64>,
        pressure_mmhg: Vec<f64>,
        voltage: Option<VoltageTrace>,
    ) -> Result<Self, AnalysisError> {
        let rows = time_ms.len();
        if rows == 0 {
            return Err(AnalysisError::EmptyRecording);
        }
        if n_sweeps == 0 {
            return Err(AnalysisError::NoSweeps);
        }
        for len in [current_pa.len(), stim_time_ms.len(), pressure_mmhg.len()] {
            if len != rows {
                return Err(AnalysisError::ColumnMismatch {
                    expected: rows,
                    actual: len,
                });
            }
        }
        if rows % n_sweeps != 0 {
            return Err(AnalysisError::UnevenSweeps {
                rows,
                sweeps: n_sweeps,
            });
        }
        Ok(Self {
            n_sweeps,
            samples_per_sweep: rows / n_sweeps,
            time_ms,
            current_pa,
            stim_time_ms,
            pressure_mmhg,
            voltage,
        })
    }

    pub fn n_sweeps(&self) -> usize {
        self.n_sweeps
    }

    pub fn samples_per_sweep(&self) -> usize {
        self.samples_per_sweep
    }

    fn block(&self, sweep: usize) -> std::ops::Range<usize> {
        let start = (sweep - 1) * self.samples_per_sweep;
        start..start + self.samples_per_sweep
    }

    /// View of one sweep (1-based id).
    pub fn sweep(&self, sweep: usize) -> Result<SweepView<'_>, AnalysisError> {
        if sweep == 0 || sweep > self.n_sweeps {
            return Err(AnalysisError::SweepOutOfRange {
                sweep,
                available: self.n_sweeps,
            });
        }
        let r = self.block(sweep);
        Ok(SweepView {
            sweep,
            time_ms: &self.time_ms[r.clone()],
            current_pa: &self.current_pa[r.clone()],
            stim_time_ms: &self.stim_time_ms[r.clone()],
            pressure_mmhg: &self.pressure_mmhg[r],
        })
    }

    pub fn sweeps(&self) -> impl Iterator<Item = SweepView<'_>> {
        (1..=self.n_sweeps).map(move |n| {
            let r = self.block(n);
            SweepView {
                sweep: n,
                time_ms: &self.time_ms[r.clone()],
                current_pa: &self.current_pa[r.clone()],
                stim_time_ms: &self.stim_time_ms[r.clone()],
                pressure_mmhg: &self.pressure_mmhg[r],
            }
        })
    }

    /// Mutable access to one sweep's current trace.
    pub(crate) fn current_mut(&mut self, sweep: usize) -> &mut [f64] {
        let r = self.block(sweep);
        &mut self.current_pa[r]
    }

    /// Restrict one sweep to a time window, returning (time, current) pairs.
    ///
    /// This is the single-channel-opening view used before amplitude
    /// histogramming.
    pub fn isolate(
        &self,
        sweep: usize,
        window: TimeWindow,
    ) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
        let view = self.sweep(sweep)?;
        let mut times = Vec::new();
        let mut currents = Vec::new();
        for (&t, &i) in view.time_ms.iter().zip(view.current_pa) {
            if window.contains(t) {
                times.push(t);
                currents.push(i);
            }
        }
        if times.is_empty() {
            return Err(AnalysisError::EmptyWindow {
                start_ms: window.start_ms,
                end_ms: window.end_ms,
                sweep,
            });
        }
        Ok((times, currents))
    }
}

impl<'a> SweepView<'a> {
    /// Indices of samples whose response time falls inside the window.
    pub fn window_indices(&self, window: TimeWindow) -> Vec<usize> {
        self.time_ms
            .iter()
            .enumerate()
            .filter(|(_, &t)| window.contains(t))
            .map(|(idx, _)| idx)
            .collect()
    }
}
