//! Best-effort tagging of converter output lines for display.
//!
//! Matching depends on the script's exact log phrasing; if that drifts, lines
//! fall back to `Plain` without affecting the job itself.

use crate::model::LineClass;

const ERROR_MARKERS: &[&str] = &["✗", "error", "failed"];
const SUCCESS_MARKERS: &[&str] = &["✓", "converted:", "success"];
const INFO_MARKERS: &[&str] = &["found:", "detected"];

/// Classify a raw line. Case-insensitive; error markers win over success
/// markers, which win over info markers.
pub fn classify_line(line: &str) -> LineClass {
    let lowered = line.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| lowered.contains(m));

    if has_any(ERROR_MARKERS) {
        LineClass::Error
    } else if has_any(SUCCESS_MARKERS) {
        LineClass::Success
    } else if has_any(INFO_MARKERS) {
        LineClass::Info
    } else {
        LineClass::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_typical_script_output() {
        assert_eq!(classify_line("Found: a.mp4"), LineClass::Info);
        assert_eq!(classify_line("Converted: a.mp4"), LineClass::Success);
        assert_eq!(classify_line("Error: b.mp4"), LineClass::Error);
        assert_eq!(classify_line("Detected audio codec: pcm_s24le"), LineClass::Info);
        assert_eq!(classify_line("✓ c.mov"), LineClass::Success);
        assert_eq!(classify_line("✗ d.mov"), LineClass::Error);
        assert_eq!(classify_line("Processing 3 files"), LineClass::Plain);
        assert_eq!(classify_line(""), LineClass::Plain);
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(classify_line("ERROR opening file"), LineClass::Error);
        assert_eq!(classify_line("Transcode FAILED"), LineClass::Error);
        assert_eq!(classify_line("all done, Success"), LineClass::Success);
        assert_eq!(classify_line("FOUND: 4 files"), LineClass::Info);
    }

    #[test]
    fn error_markers_take_precedence() {
        assert_eq!(classify_line("Converted: x.mp4 (error in metadata)"), LineClass::Error);
        assert_eq!(classify_line("✓ then ✗"), LineClass::Error);
        assert_eq!(classify_line("Found: y.mp4, success"), LineClass::Success);
    }
}
