//! Registered devices and the known-hardware catalog.

use crate::address::SenderAddress;
use crate::capability::Capability;
use crate::eep::id::{EepId, Manufacturer};

/// A device registered with the gateway.
///
/// Owns its capabilities; created by `add_device`, destroyed by
/// `remove_device`, never shared between gateways. The registry is
/// runtime-only and not persisted.
pub struct Device {
    pub address: SenderAddress,
    pub eep: EepId,
    pub name: Option<String>,
    /// Virtual sender used when commanding this device; falls back to the
    /// module base ID when unset.
    pub sender: Option<SenderAddress>,
    pub(crate) capabilities: Vec<Box<dyn Capability>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address.to_string())
            .field("eep", &self.eep.to_string())
            .field("name", &self.name)
            .field("capabilities", &self.capabilities.len())
            .finish()
    }
}

/// A known hardware model, resolving a human-readable name to its EEP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceType {
    pub uid: &'static str,
    pub eep: EepId,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

/// Hardware with non-obvious EEP assignments (manufacturer variants and
/// rebranded modules). Generic devices resolve through the profile
/// catalog directly.
pub const DEVICE_CATALOG: &[DeviceType] = &[
    DeviceType {
        uid: "Eltako_FAH60",
        eep: EepId::with_manufacturer(0xA5, 0x06, 0x01, Manufacturer::Eltako),
        manufacturer: "Eltako",
        model: "FAH60 Wireless outdoor brightness sensor",
    },
    DeviceType {
        uid: "NodOn_SIN-2-RS-01",
        eep: EepId::new(0xD2, 0x05, 0x00),
        manufacturer: "NodOn",
        model: "SIN-2-RS-01 Roller Shutter Controller",
    },
];

/// Look up a catalog entry by its uid.
pub fn find_device_type(uid: &str) -> Option<&'static DeviceType> {
    DEVICE_CATALOG.iter().find(|t| t.uid == uid)
}
