//! Input-device classification.
//!
//! [`is_input_like`] decides whether a raw device descriptor belongs to the
//! human-input space this system guards. It is a pure predicate: same
//! descriptor in, same answer out, no side effects, no failure mode.

use serde::{Deserialize, Serialize};

/// Raw attributes of one currently present device, as reported by the
/// enumeration provider. Transient; not owned by this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable hierarchical identity of the physical device
    /// (class-prefixed path, e.g. `HID\VID_046D&PID_C52B\...`).
    pub instance_id: String,
    /// Free-text device name from the provider.
    #[serde(default)]
    pub display_name: String,
}

/// The generic HID bus prefix. Sufficient on its own: built-in input
/// devices often carry generic or localized names.
const GENERIC_HID_PREFIX: &str = "HID\\";

/// Bus prefixes under which input devices appear. ACPI and I2C cover
/// internal keyboards and touchpads; ROOT covers root-enumerated devices.
const INPUT_BUS_PREFIXES: &[&str] = &["HID\\", "ACPI\\", "I2C\\", "ROOT\\"];

/// Name tokens marking a device as keyboard/mouse/HID, matched
/// case-insensitively against the display name.
const NAME_MARKERS: &[&str] = &["KEYBOARD", "MOUSE", "HID"];

/// Returns `true` if the descriptor looks like a human-input device that
/// is eligible for whitelisting.
///
/// A descriptor qualifies when its instance id falls under one of the
/// input bus prefixes and either the prefix is the generic HID bus or the
/// display name contains a keyboard/mouse/HID marker. Prefix-only matching
/// over-includes unrelated ACPI/I2C devices; name-only matching misses
/// devices with generic names, hence the dual heuristic.
pub fn is_input_like(descriptor: &DeviceDescriptor) -> bool {
    let id = descriptor.instance_id.as_str();
    if id.is_empty() {
        return false;
    }

    if id.starts_with(GENERIC_HID_PREFIX) {
        return true;
    }

    if !INPUT_BUS_PREFIXES.iter().any(|p| id.starts_with(p)) {
        return false;
    }

    let name = descriptor.display_name.to_uppercase();
    NAME_MARKERS.iter().any(|m| name.contains(m))
}
