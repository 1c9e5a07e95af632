//! D5-00-01: single input contact (window/door state).

use crate::address::SenderAddress;
use crate::capability::{observable, Capability, ScalarCapability, StateChangeSink};
use crate::eep::id::EepId;
use crate::eep::profile::{EepDataField, EepSpecification};

const LEARN_BIT: &[(u64, &str)] = &[(0, "Teach-in telegram"), (1, "Data telegram")];
const CONTACT: &[(u64, &str)] = &[(0, "open"), (1, "closed")];

fn window_mirror(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(ScalarCapability::new(address, sink, observable::WINDOW_STATE))
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    let fields = vec![
        EepDataField::new("LRN", "Learn button", 4, 1).with_enum(LEARN_BIT),
        EepDataField::new("CO", "Contact", 7, 1)
            .with_enum(CONTACT)
            .observed_as(observable::WINDOW_STATE),
    ];
    vec![EepSpecification::single_telegram(
        EepId::new(0xD5, 0x00, 0x01),
        "Single input contact",
        fields,
    )
    .with_capability(window_mirror)]
}
