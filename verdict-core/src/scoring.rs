//! Deterministic scoring — substring heuristic and score blending.
//!
//! Both functions are pure and total: any input, including empty strings,
//! is valid and nothing here can fail.

/// Score a model response against an optional expected output.
///
/// Returns `0.5` when no expected output is provided (no signal), `1.0` when
/// the expected output occurs as a case-insensitive substring of the
/// response, and `0.0` otherwise.
pub fn heuristic_score(response: &str, expected: Option<&str>) -> f64 {
    match expected {
        None => 0.5,
        Some(expected) if expected.is_empty() => 0.5,
        Some(expected) => {
            if response.to_lowercase().contains(&expected.to_lowercase()) {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Blend heuristic and judge scores into a combined score and pass flag.
///
/// Equal weighting is fixed, not configurable.
pub fn combine(heuristic: f64, judge: f64, threshold: f64) -> (f64, bool) {
    let combined = 0.5 * heuristic + 0.5 * judge;
    (combined, combined >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_heuristic_no_expected_is_half() {
        assert_eq!(heuristic_score("anything at all", None), 0.5);
        assert_eq!(heuristic_score("", None), 0.5);
    }

    #[test]
    fn test_heuristic_empty_expected_is_half() {
        // An empty expected string carries no signal, same as absent.
        assert_eq!(heuristic_score("response", Some("")), 0.5);
    }

    #[test]
    fn test_heuristic_substring_match() {
        assert_eq!(
            heuristic_score("The answer is 4, obviously.", Some("answer is 4")),
            1.0
        );
        assert_eq!(heuristic_score("hello world", Some("goodbye")), 0.0);
    }

    #[test]
    fn test_heuristic_match_is_case_insensitive() {
        assert_eq!(heuristic_score("Input: HELLO", Some("input: hello")), 1.0);
        assert_eq!(heuristic_score("input: hello", Some("Input: HELLO")), 1.0);
    }

    #[test]
    fn test_heuristic_empty_response_no_match() {
        assert_eq!(heuristic_score("", Some("expected")), 0.0);
    }

    #[test]
    fn test_combine_equal_weighting() {
        let (combined, _) = combine(1.0, 0.0, 0.5);
        assert_eq!(combined, 0.5);
        let (combined, _) = combine(0.5, 0.9, 0.75);
        assert!((combined - 0.7).abs() < 1e-9);
        let (combined, _) = combine(1.0, 1.0, 0.75);
        assert_eq!(combined, 1.0);
    }

    #[test]
    fn test_combine_threshold_boundary() {
        // Pass is >= threshold, so exact equality passes.
        let (combined, passed) = combine(0.5, 1.0, 0.75);
        assert_eq!(combined, 0.75);
        assert!(passed);

        let (combined, passed) = combine(0.5, 0.9, 0.75);
        assert!((combined - 0.7).abs() < 1e-9);
        assert!(!passed);
    }

    #[test]
    fn test_combine_zero_threshold_always_passes() {
        let (_, passed) = combine(0.0, 0.0, 0.0);
        assert!(passed);
    }
}
