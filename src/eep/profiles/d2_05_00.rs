//! D2-05-00: blinds control for position and angle, type 0x00.
//!
//! Four telegram types selected by the CMD nibble at the *end* of the
//! telegram data (`cmd_offset = -4`). The reply telegram feeds the cover
//! capability; the outbound commands are produced by the encoders below.

use std::collections::HashMap;

use crate::address::SenderAddress;
use crate::capability::{action, Capability, CoverCapability, DeviceCommand, StateChangeSink};
use crate::eep::handler::EepError;
use crate::eep::id::EepId;
use crate::eep::message::EepMessage;
use crate::eep::profile::{EepDataField, EepSpecification, EepTelegram};
use crate::capability::observable;

pub const CMD_GO_TO_POSITION: u64 = 1;
pub const CMD_STOP: u64 = 2;
pub const CMD_QUERY_POSITION: u64 = 3;
pub const CMD_REPLY_POSITION: u64 = 4;

const CHANNEL_SELECT: &[(u64, &str)] = &[
    (0, "Channel 1"),
    (1, "Channel 2"),
    (2, "Channel 3"),
    (3, "Channel 4"),
    (15, "All channels"),
];
const CHANNEL_REPLY: &[(u64, &str)] = &[
    (0, "Channel 1"),
    (1, "Channel 2"),
    (2, "Channel 3"),
    (3, "Channel 4"),
];
const REPOSITIONING: &[(u64, &str)] = &[
    (0, "Directly to target POS/ANG"),
    (1, "Up, then to target POS/ANG"),
    (2, "Down, then to target POS/ANG"),
];
const LOCK_SET: &[(u64, &str)] = &[
    (0, "No change"),
    (1, "Set blockage mode"),
    (2, "Set alarm mode"),
    (7, "Unblock"),
];
const LOCK_REPLY: &[(u64, &str)] = &[
    (0, "Normal (no lock)"),
    (1, "Blockage mode"),
    (2, "Alarm mode"),
];

fn eep() -> EepId {
    EepId::new(0xD2, 0x05, 0x00)
}

fn channel_field(offset: usize, entries: &'static [(u64, &'static str)]) -> EepDataField {
    EepDataField::new("CHN", "Channel", offset, 4).with_enum(entries)
}

fn cover(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(CoverCapability::new(address, sink))
}

fn encode_set_position(command: &DeviceCommand) -> Result<EepMessage, EepError> {
    let pos = command
        .values
        .get("POS")
        .copied()
        .ok_or_else(|| EepError::MissingCommandField {
            action: command.action.clone(),
            field: "POS",
        })?;
    let mut msg = EepMessage::outgoing(eep(), CMD_GO_TO_POSITION, "Go to position and angle");
    msg.set_raw("POS", pos);
    // 127 means "do not change"
    msg.set_raw("ANG", command.values.get("ANG").copied().unwrap_or(127));
    msg.set_raw("REPO", command.values.get("REPO").copied().unwrap_or(0));
    msg.set_raw("LOCK", command.values.get("LOCK").copied().unwrap_or(0));
    msg.set_raw("CHN", command.values.get("CHN").copied().unwrap_or(0));
    Ok(msg)
}

fn encode_stop(command: &DeviceCommand) -> Result<EepMessage, EepError> {
    let mut msg = EepMessage::outgoing(eep(), CMD_STOP, "Stop");
    msg.set_raw("CHN", command.values.get("CHN").copied().unwrap_or(0));
    Ok(msg)
}

fn encode_query_position(command: &DeviceCommand) -> Result<EepMessage, EepError> {
    let mut msg = EepMessage::outgoing(eep(), CMD_QUERY_POSITION, "Query position and angle");
    msg.set_raw("CHN", command.values.get("CHN").copied().unwrap_or(0));
    Ok(msg)
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    let mut telegrams = HashMap::new();

    telegrams.insert(
        CMD_GO_TO_POSITION,
        EepTelegram::new(
            Some("Go to position and angle"),
            vec![
                EepDataField::new("POS", "Vertical position", 1, 7)
                    .with_range(0, 127)
                    .with_unit("%")
                    .observed_as(observable::POSITION),
                EepDataField::new("ANG", "Rotation angle", 9, 7)
                    .with_range(0, 127)
                    .with_unit("%")
                    .observed_as(observable::ANGLE),
                EepDataField::new("REPO", "Repositioning mode", 17, 3).with_enum(REPOSITIONING),
                EepDataField::new("LOCK", "Set locking mode", 21, 3).with_enum(LOCK_SET),
                channel_field(24, CHANNEL_SELECT),
            ],
        ),
    );

    telegrams.insert(
        CMD_STOP,
        EepTelegram::new(Some("Stop"), vec![channel_field(0, CHANNEL_SELECT)]),
    );

    telegrams.insert(
        CMD_QUERY_POSITION,
        EepTelegram::new(
            Some("Query position and angle"),
            vec![channel_field(0, CHANNEL_SELECT)],
        ),
    );

    telegrams.insert(
        CMD_REPLY_POSITION,
        EepTelegram::new(
            Some("Reply position and angle"),
            vec![
                EepDataField::new("POS", "Vertical position", 1, 7)
                    .with_unit("%")
                    .observed_as(observable::POSITION),
                EepDataField::new("ANG", "Rotation angle", 9, 7)
                    .with_unit("%")
                    .observed_as(observable::ANGLE),
                EepDataField::new("LOCK", "Locking modes", 21, 3).with_enum(LOCK_REPLY),
                channel_field(24, CHANNEL_REPLY),
            ],
        ),
    );

    vec![EepSpecification::new(
        eep(),
        "Blinds control for position and angle, type 0x00",
        4,
        Some(-4),
        telegrams,
    )
    .with_capability(cover)
    .with_encoder(action::SET_COVER_POSITION, encode_set_position)
    .with_encoder(action::STOP_COVER, encode_stop)
    .with_encoder(action::QUERY_COVER_POSITION, encode_query_position)]
}
