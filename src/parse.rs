use std::path::Path;

use log::{debug, info};

use crate::error::AnalysisError;
use crate::recording::{Recording, VoltageTrace};

/// Pressure command signal scale: 0.02 V per mmHg.
const VOLTS_PER_MMHG: f64 = 0.02;
/// Seconds to milliseconds.
const MS_PER_S: f64 = 1000.0;
/// Amps to picoamps.
const PA_PER_A: f64 = 1e12;

/// Parse a HEKA ascii export from disk.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Recording, AnalysisError> {
    let raw = std::fs::read_to_string(path)?;
    parse_str(&raw)
}

/// Parse a HEKA ascii export.
///
/// Header lines are the ones containing lowercase letters; every other
/// non-blank line is a data candidate (the export writes scientific
/// notation with an uppercase E, so numeric rows never trip the check). The export carries one file header
/// line plus two header lines per sweep, so the sweep count falls out of the
/// header/data line difference. Data rows are comma separated with either 5
/// columns (`index, ti, i, tp, p`) or 7 (adding `tv, v`); rows with a
/// non-numeric field are dropped.
pub fn parse_str(input: &str) -> Result<Recording, AnalysisError> {
    let lines: Vec<&str> = input.trim().lines().collect();
    if lines.is_empty() {
        return Err(AnalysisError::EmptyRecording);
    }

    // (1-based line number, whitespace-stripped text) for each data candidate.
    let candidates: Vec<(usize, String)> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.chars().any(|c| c.is_ascii_lowercase()))
        .map(|(idx, line)| {
            let cleaned: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            (idx + 1, cleaned)
        })
        .collect();
    if candidates.is_empty() {
        return Err(AnalysisError::EmptyRecording);
    }

    let header_lines = lines.len() - candidates.len();
    if header_lines < 3 {
        return Err(AnalysisError::NoSweeps);
    }
    let n_sweeps = (header_lines - 1) / 2;
    if n_sweeps == 0 {
        return Err(AnalysisError::NoSweeps);
    }

    // The first candidate row fixes the column layout.
    let n_cols = candidates[0].1.split(',').count();
    if n_cols != 5 && n_cols != 7 {
        return Err(AnalysisError::UnexpectedColumnCount(n_cols));
    }
    let has_voltage = n_cols == 7;

    let mut time_ms = Vec::with_capacity(candidates.len());
    let mut current_pa = Vec::with_capacity(candidates.len());
    let mut stim_time_ms = Vec::with_capacity(candidates.len());
    let mut pressure_mmhg = Vec::with_capacity(candidates.len());
    let mut v_time = Vec::new();
    let mut v_volts = Vec::new();
    let mut dropped = 0usize;

    for (line_no, row) in &candidates {
        let fields: Vec<&str> = row.split(',').collect();
        if fields.len() != n_cols {
            debug!("dropping line {line_no}: expected {n_cols} fields, got {}", fields.len());
            dropped += 1;
            continue;
        }
        let mut values = [0.0f64; 7];
        let mut ok = true;
        for (slot, field) in values.iter_mut().zip(&fields) {
            match field.parse::<f64>() {
                Ok(v) => *slot = v,
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            debug!("dropping line {line_no}: non-numeric field");
            dropped += 1;
            continue;
        }
        // values[0] is the export's running row index; nothing downstream
        // needs it.
        time_ms.push(values[1] * MS_PER_S);
        current_pa.push(values[2] * PA_PER_A);
        stim_time_ms.push(values[3] * MS_PER_S);
        pressure_mmhg.push(values[4] / VOLTS_PER_MMHG);
        if has_voltage {
            v_time.push(values[5]);
            v_volts.push(values[6]);
        }
    }

    if time_ms.is_empty() {
        return Err(AnalysisError::EmptyRecording);
    }
    if dropped > 0 {
        debug!("dropped {dropped} malformed data rows");
    }

    let voltage = has_voltage.then(|| VoltageTrace {
        time: v_time,
        voltage: v_volts,
    });
    let recording = Recording::from_columns(
        n_sweeps,
        time_ms,
        current_pa,
        stim_time_ms,
        pressure_mmhg,
        voltage,
    )?;
    info!(
        "parsed {} samples into {} sweeps ({} per sweep, {} columns)",
        recording.time_ms.len(),
        recording.n_sweeps(),
        recording.samples_per_sweep(),
        n_cols
    );
    Ok(recording)
}
