use crate::ids::DeviceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Twin-style device document: an id plus a nested property bag reported by
/// the device or set by operators. Properties are foreign input and stay as
/// raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Device {
    /// Resolves a dot-separated path (`"Reported.Type"`) into the property
    /// document. Returns `None` when any segment is missing or a non-object
    /// is traversed.
    #[must_use]
    pub fn property_at(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.properties.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}
