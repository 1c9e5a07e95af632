//! F6-02: Rocker switch, 2 rockers — application styles 1 and 2.
//!
//! Both styles share one telegram layout and only differ in which rocker
//! side is "on"; the push-button state machine treats them identically.

use crate::address::SenderAddress;
use crate::capability::{Capability, PushButtonCapability, StateChangeSink};
use crate::eep::id::EepId;
use crate::eep::profile::{EepDataField, EepSpecification};

const ROCKER_ACTION: &[(u64, &str)] = &[(0, "a1"), (1, "a0"), (2, "b1"), (3, "b0")];
const ENERGY_BOW: &[(u64, &str)] = &[(0, "released"), (1, "pressed")];
const SECOND_ACTION: &[(u64, &str)] = &[(0, "No 2nd action"), (1, "2nd action valid")];

fn rocker_fields() -> Vec<EepDataField> {
    vec![
        EepDataField::new("R1", "Rocker 1st action", 0, 3).with_enum(ROCKER_ACTION),
        EepDataField::new("EB", "Energy bow", 3, 1).with_enum(ENERGY_BOW),
        EepDataField::new("R2", "Rocker 2nd action", 4, 3).with_enum(ROCKER_ACTION),
        EepDataField::new("SA", "2nd action", 7, 1).with_enum(SECOND_ACTION),
    ]
}

fn push_button(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(PushButtonCapability::new(address, sink))
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    [
        (0x01, "Light and blind control - application style 1"),
        (0x02, "Light and blind control - application style 2"),
    ]
    .into_iter()
    .map(|(ty, name)| {
        EepSpecification::single_telegram(EepId::new(0xF6, 0x02, ty), name, rocker_fields())
            .with_capability(push_button)
    })
    .collect()
}
