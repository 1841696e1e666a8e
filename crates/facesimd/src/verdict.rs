//! Turning a raw distance into the JSON verdict returned to clients.

use serde::Serialize;

/// Response body for a successful verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub distance: f64,
    pub similarity: String,
    pub verified: bool,
}

impl Verdict {
    /// Shape a verdict. `verified` uses a strict `<`: a distance equal to
    /// the threshold does not verify.
    pub fn from_distance(distance: f64, threshold: f64, model_used: Option<String>) -> Self {
        Self {
            model_used,
            distance,
            similarity: format!("{}%", format_percent(similarity_percent(distance))),
            verified: distance < threshold,
        }
    }
}

/// `(1 - distance) * 100`, rounded to two decimals.
pub fn similarity_percent(distance: f64) -> f64 {
    let raw = (1.0 - distance) * 100.0;
    // Round the exact binary value, as Python's round() does
    format!("{raw:.2}").parse().unwrap_or(raw)
}

/// Shortest round-trip rendering that always keeps a decimal point
/// (`100.0`, `87.5`, `63.21`).
fn format_percent(value: f64) -> String {
    let s = value.to_string();
    if s.contains('.') || !value.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_faces() {
        let v = Verdict::from_distance(0.0, 0.40, None);
        assert_eq!(v.similarity, "100.0%");
        assert!(v.verified);
    }

    #[test]
    fn test_similarity_rounds_to_two_decimals() {
        assert_eq!(Verdict::from_distance(0.1234567, 0.4, None).similarity, "87.65%");
        assert_eq!(Verdict::from_distance(0.125, 0.4, None).similarity, "87.5%");
        assert_eq!(Verdict::from_distance(0.3679, 0.4, None).similarity, "63.21%");
    }

    #[test]
    fn test_distance_above_one_gives_negative_similarity() {
        let v = Verdict::from_distance(1.25, 0.35, None);
        assert_eq!(v.similarity, "-25.0%");
        assert!(!v.verified);
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        assert!(!Verdict::from_distance(0.40, 0.40, None).verified);
        assert!(Verdict::from_distance(0.3999999, 0.40, None).verified);
        assert!(!Verdict::from_distance(0.35, 0.35, None).verified);
        assert!(Verdict::from_distance(0.349, 0.35, None).verified);
    }

    #[test]
    fn test_same_distance_differs_by_threshold() {
        // 0.38 passes the fixed-model threshold but not the multi-model one
        assert!(Verdict::from_distance(0.38, 0.40, None).verified);
        assert!(!Verdict::from_distance(0.38, 0.35, None).verified);
    }

    #[test]
    fn test_json_shape_without_model() {
        let v = Verdict::from_distance(0.25, 0.40, None);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"distance": 0.25, "similarity": "75.0%", "verified": true})
        );
    }

    #[test]
    fn test_json_shape_with_model() {
        let v = Verdict::from_distance(0.5, 0.35, Some("Facenet".into()));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["model_used"], "Facenet");
        assert_eq!(json["verified"], false);
        assert_eq!(json["similarity"], "50.0%");
    }

    #[test]
    fn test_format_percent_keeps_decimal_point() {
        assert_eq!(format_percent(100.0), "100.0");
        assert_eq!(format_percent(-0.0), "-0.0");
        assert_eq!(format_percent(12.34), "12.34");
    }
}
