use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alignment classification reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    #[default]
    Unknown,
}

impl Severity {
    /// Lenient label parsing. Anything unrecognized is `Unknown`.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" | "normal" => Severity::Ok,
            "warning" | "warn" => Severity::Warning,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Canonical result of one analyzed frame.
///
/// Every field is always populated: missing or malformed values in the
/// analyzer reply are replaced with `0` / `Severity::Unknown` by
/// [`MeasurementRecord::from_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    /// Signed, positive = right of the reference line.
    pub offset_pixels: f64,
    /// Physical units (millimeters); 0 when the analyzer does not know.
    #[serde(rename = "offsetMm")]
    pub offset_physical: f64,
    pub status: Severity,
    /// Seconds, relative to the source (0 for still uploads).
    pub captured_at: f64,
}

const PIXEL_KEYS: &[&str] = &[
    "offsetPixels",
    "offset_pixels",
    "offset_px",
    "alignment_offset_pixels",
];
const PHYSICAL_KEYS: &[&str] = &[
    "offsetMm",
    "offset_mm",
    "offsetPhysical",
    "alignment_offset_mm",
];

impl MeasurementRecord {
    pub fn new(offset_pixels: f64, offset_physical: f64, status: Severity, captured_at: f64) -> Self {
        Self {
            offset_pixels,
            offset_physical,
            status,
            captured_at,
        }
    }

    /// Normalize an analyzer reply body.
    ///
    /// Never fails: a body that is not an object, or one with missing/garbled
    /// fields, yields defaults for whatever could not be read.
    pub fn from_reply(body: &Value, captured_at: f64) -> Self {
        let Some(obj) = body.as_object() else {
            return Self {
                captured_at,
                ..Self::default()
            };
        };

        let offset_pixels = first_number(obj, PIXEL_KEYS);
        let offset_physical = first_number(obj, PHYSICAL_KEYS);

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .or_else(|| {
                obj.get("alignment")
                    .and_then(|a| a.get("severity"))
                    .and_then(Value::as_str)
            })
            .map(Severity::from_label)
            .unwrap_or_default();

        Self {
            offset_pixels,
            offset_physical,
            status,
            captured_at,
        }
    }
}

fn first_number(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(lenient_f64)
        .unwrap_or(0.0)
}

fn lenient_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}
