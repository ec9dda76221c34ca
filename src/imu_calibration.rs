// Heading sensor calibration persistence
//
// File format: one decimal byte per line, 22 lines. Blank lines are ignored.
use std::fmt::Write as _;
use std::path::Path;

use tracing::info;

use crate::hal::{CALIBRATION_BLOB_LEN, HalError, HeadingSensor};

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: '{text}' is not a byte value")]
    Parse { line: usize, text: String },

    #[error("Expected {expected} calibration bytes, found {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Sensor error: {0}")]
    Sensor(#[from] HalError),
}

/// Parse the text format into a blob
pub fn parse(text: &str) -> Result<[u8; CALIBRATION_BLOB_LEN], CalibrationError> {
    let mut bytes = Vec::with_capacity(CALIBRATION_BLOB_LEN);
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = trimmed.parse::<u8>().map_err(|_| CalibrationError::Parse {
            line: idx + 1,
            text: trimmed.to_string(),
        })?;
        bytes.push(value);
    }

    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CalibrationError::Length {
            expected: CALIBRATION_BLOB_LEN,
            actual,
        })
}

/// Render a blob in the text format
pub fn format(blob: &[u8; CALIBRATION_BLOB_LEN]) -> String {
    let mut out = String::with_capacity(CALIBRATION_BLOB_LEN * 4);
    for byte in blob {
        let _ = writeln!(out, "{}", byte);
    }
    out
}

/// Load a calibration file and write it into the sensor
pub fn restore(sensor: &mut dyn HeadingSensor, path: &Path) -> Result<(), CalibrationError> {
    let blob = parse(&std::fs::read_to_string(path)?)?;
    sensor.write_calibration(&blob)?;
    info!("Restored heading calibration from {}", path.display());
    Ok(())
}

/// Read the calibration out of the sensor and save it
pub fn save(sensor: &mut dyn HeadingSensor, path: &Path) -> Result<(), CalibrationError> {
    let blob = sensor.read_calibration()?;
    std::fs::write(path, format(&blob))?;
    info!("Saved heading calibration to {}", path.display());
    Ok(())
}
