//! Deterministic storage key construction.
//!
//! Keys are namespaced by brief id and execution id so repeated runs of the
//! same job never destructively collide; the primary render key carries a
//! millisecond timestamp so resubmissions stay unique.

pub fn render_key(brief_id: &str, execution_id: u64, timestamp_ms: i64) -> String {
    format!("renders/{}/{}/{}.mp4", brief_id, execution_id, timestamp_ms)
}

pub fn variant_key(brief_id: &str, execution_id: u64, variant_name: &str) -> String {
    format!(
        "renders/{}/{}/variants/{}.mp4",
        brief_id, execution_id, variant_name
    )
}

pub fn subtitles_key(brief_id: &str, execution_id: u64) -> String {
    format!("renders/{}/{}/subtitles.srt", brief_id, execution_id)
}

/// Prefix shared by every scratch render artifact; the housekeeping sweep
/// matches on it.
pub const SCRATCH_PREFIX: &str = "render-";

pub fn scratch_file_name(execution_id: u64, timestamp_ms: i64, suffix: &str) -> String {
    format!("{}{}-{}-{}", SCRATCH_PREFIX, execution_id, timestamp_ms, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_keys_differ_by_submission_time() {
        let a = render_key("brief-9", 4, 1_700_000_000_000);
        let b = render_key("brief-9", 4, 1_700_000_000_001);
        assert_ne!(a, b);
        assert!(a.starts_with("renders/brief-9/4/"));
    }

    #[test]
    fn variant_and_subtitle_keys_share_the_job_namespace() {
        assert_eq!(
            variant_key("b", 1, "vertical"),
            "renders/b/1/variants/vertical.mp4"
        );
        assert_eq!(subtitles_key("b", 1), "renders/b/1/subtitles.srt");
    }

    #[test]
    fn scratch_names_carry_prefix_and_execution_id() {
        let name = scratch_file_name(12, 99, "out.mp4");
        assert!(name.starts_with(SCRATCH_PREFIX));
        assert!(name.contains("12"));
    }
}
