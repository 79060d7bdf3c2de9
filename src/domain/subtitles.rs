//! SRT subtitle generation from timed segments.

use super::postprocess::SubtitleSegment;

/// Render timed segments as an SRT document: 1-based indices and
/// millisecond-precision `HH:MM:SS,mmm --> HH:MM:SS,mmm` cue lines.
pub fn to_srt(segments: &[SubtitleSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(segment.start_secs),
            format_timestamp(segment.end_secs),
            segment.text
        ));
    }
    out
}

fn format_timestamp(secs: f64) -> String {
    let total_millis = (secs.max(0.0) * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        millis
    )
}
