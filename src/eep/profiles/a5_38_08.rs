//! A5-38-08: central command — gateway.
//!
//! Only CMD 2 "Dimming" is modelled. The CMD selector occupies the first
//! data byte; outbound telegrams must also set the 4BS learn bit to 1 or
//! the dimmer would treat the command as a teach-in.

use crate::capability::{action, DeviceCommand};
use crate::eep::handler::EepError;
use crate::eep::id::EepId;
use crate::eep::message::EepMessage;
use crate::eep::profile::{EepDataField, EepSpecification, EepTelegram};
use std::collections::HashMap;

const DIMMING_CMD: u64 = 2;

const LEARN_BIT: &[(u64, &str)] = &[(0, "Teach-in telegram"), (1, "Data telegram")];
const DIMMING_RANGE: &[(u64, &str)] = &[(0, "Absolute"), (1, "Relative")];
const STORE_FINAL: &[(u64, &str)] = &[(0, "No"), (1, "Yes")];
const SWITCHING: &[(u64, &str)] = &[(0, "Off"), (1, "On")];

fn eep() -> EepId {
    EepId::new(0xA5, 0x38, 0x08)
}

fn encode_dim(command: &DeviceCommand) -> Result<EepMessage, EepError> {
    let value = |field: &'static str| -> Result<u64, EepError> {
        command
            .values
            .get(field)
            .copied()
            .ok_or_else(|| EepError::MissingCommandField {
                action: command.action.clone(),
                field,
            })
    };

    let mut msg = EepMessage::outgoing(eep(), DIMMING_CMD, "Dimming");
    msg.set_raw("EDIM", value("EDIM")?);
    msg.set_raw("RMP", command.values.get("RMP").copied().unwrap_or(0));
    msg.set_raw("SW", command.values.get("SW").copied().unwrap_or(1));
    msg.set_raw("EDIMR", command.values.get("EDIMR").copied().unwrap_or(0));
    msg.set_raw("STR", command.values.get("STR").copied().unwrap_or(0));
    msg.set_raw("LRNB", 1);
    Ok(msg)
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    let dimming = EepTelegram::new(
        Some("Dimming"),
        vec![
            EepDataField::new("EDIM", "Dimming value", 8, 8).scaled(0.0, 255.0),
            EepDataField::new("RMP", "Ramping time", 16, 8)
                .scaled(0.0, 255.0)
                .with_unit("s"),
            EepDataField::new("LRNB", "Learn bit", 28, 1).with_enum(LEARN_BIT),
            EepDataField::new("EDIMR", "Dimming range", 29, 1).with_enum(DIMMING_RANGE),
            EepDataField::new("STR", "Store final value", 30, 1).with_enum(STORE_FINAL),
            EepDataField::new("SW", "Switching command", 31, 1).with_enum(SWITCHING),
        ],
    );

    let mut telegrams = HashMap::new();
    telegrams.insert(DIMMING_CMD, dimming);

    vec![
        EepSpecification::new(eep(), "Central command - gateway", 8, Some(0), telegrams)
            .with_encoder(action::DIM, encode_dim),
    ]
}
