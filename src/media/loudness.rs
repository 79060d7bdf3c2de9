//! Typed parsing of the loudnorm measurement pass.
//!
//! ffmpeg prints the measurement as a JSON block embedded in free-form
//! stderr text. That scraping concern is isolated here; callers only see a
//! typed measurement or `None`, and `None` means "skip normalization", not
//! "fail the job".

use regex::Regex;
use serde::Deserialize;

/// Integrated loudness, true peak, loudness range and threshold as measured
/// on the unmodified audio.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessMeasurement {
    pub input_i: f64,
    pub input_tp: f64,
    pub input_lra: f64,
    pub input_thresh: f64,
}

// loudnorm emits every numeric field as a JSON string.
#[derive(Deserialize)]
struct RawMeasurement {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
}

/// Extract the measurement from the stderr of a loudnorm measurement pass.
pub fn parse_measurement(stderr: &str) -> Option<LoudnessMeasurement> {
    let re = Regex::new(r#"(?s)\{[^{}]*"input_i"[^{}]*\}"#).expect("static regex");
    let block = re.find(stderr)?.as_str();
    let raw: RawMeasurement = serde_json::from_str(block).ok()?;

    Some(LoudnessMeasurement {
        input_i: raw.input_i.trim().parse().ok()?,
        input_tp: raw.input_tp.trim().parse().ok()?,
        input_lra: raw.input_lra.trim().parse().ok()?,
        input_thresh: raw.input_thresh.trim().parse().ok()?,
    })
}
