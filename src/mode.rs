use serde::{Deserialize, Serialize};

/// Where frames are currently acquired from. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    #[default]
    Upload,
    Video,
    Webcam,
}

impl AcquisitionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" | "image" | "file" => Some(Self::Upload),
            "video" => Some(Self::Video),
            "webcam" | "camera" | "cam" => Some(Self::Webcam),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionMode::Upload => "upload",
            AcquisitionMode::Video => "video",
            AcquisitionMode::Webcam => "webcam",
        }
    }

    /// Modes that sample on a timer rather than once per selection.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, AcquisitionMode::Upload)
    }
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
