use log::debug;

use crate::error::AnalysisError;
use crate::recording::{Recording, TimeWindow};

/// Subtract each sweep's baseline from its current trace, in place.
///
/// The baseline is the mean current over the samples whose response time
/// falls inside `window`. Returns the per-sweep baselines that were removed.
pub fn subtract(
    recording: &mut Recording,
    window: TimeWindow,
) -> Result<Vec<f64>, AnalysisError> {
    let mut baselines = Vec::with_capacity(recording.n_sweeps());
    for view in recording.sweeps() {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (&t, &i) in view.time_ms.iter().zip(view.current_pa) {
            if window.contains(t) {
                sum += i;
                count += 1;
            }
        }
        if count == 0 {
            return Err(AnalysisError::EmptyWindow {
                start_ms: window.start_ms,
                end_ms: window.end_ms,
                sweep: view.sweep,
            });
        }
        baselines.push(sum / count as f64);
    }
    for (sweep, &baseline) in baselines.iter().enumerate() {
        for value in recording.current_mut(sweep + 1) {
            *value -= baseline;
        }
    }
    debug!("baseline-subtracted {} sweeps", baselines.len());
    Ok(baselines)
}
