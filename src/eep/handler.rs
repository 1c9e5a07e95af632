//! Generic, profile-driven EEP decode and encode.
//!
//! Decoding runs in four passes:
//!
//! 1. **raw** — extract every field's raw integer, so that
//! 2. **interpret** — enum translation and scaling can consult *any*
//!    sibling raw value, regardless of declaration order,
//! 3. **project** — fields tagged with an observable UID are copied into
//!    the semantic entity map, and
//! 4. **resolve** — profile resolvers overwrite entities that need
//!    cross-field logic (vendor quirks, range-select bits).
//!
//! Encoding is the inverse of pass 1: the buffer is sized to cover the CMD
//! selector and every declared field, then raw values are written bit-exact.

use std::sync::Arc;

use thiserror::Error;

use crate::eep::id::EepId;
use crate::eep::message::{EepMessage, EepMessageType, EepMessageValue, EntityValue, Value};
use crate::eep::profile::{EepSpecification, RawValues, Scale, Unit};
use crate::erp1::{BitFieldError, Erp1Telegram, Rorg};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EepError {
    #[error("message sender must be set before encoding")]
    MissingSender,
    #[error("unknown telegram type {cmd} for EEP {eep}")]
    UnknownTelegramType { cmd: u64, eep: EepId },
    #[error("profile RORG 0x{0:02X} is not a radio telegram type")]
    UnsupportedRorg(u8),
    #[error("command {action:?} is missing required field {field}")]
    MissingCommandField {
        action: String,
        field: &'static str,
    },
    #[error(transparent)]
    Field(#[from] BitFieldError),
}

/// De- and encodes messages of one EEP.
///
/// Cheap to clone; the specification is shared.
#[derive(Clone)]
pub struct EepHandler {
    spec: Arc<EepSpecification>,
}

impl EepHandler {
    pub fn new(spec: Arc<EepSpecification>) -> Self {
        EepHandler { spec }
    }

    pub fn specification(&self) -> &EepSpecification {
        &self.spec
    }

    /// Resolve the CMD bit offset against a telegram of `total_bits` bits
    /// (negative offsets count from the end).
    fn cmd_bit_offset(&self, total_bits: usize) -> Option<usize> {
        let offset = self.spec.cmd_offset?;
        if offset >= 0 {
            Some(offset as usize)
        } else {
            total_bits.checked_sub(offset.unsigned_abs() as usize)
        }
    }

    /// Interpret an inbound radio telegram.
    ///
    /// An unknown CMD value is not an error: the message comes back with
    /// sender and EEP set but no values, so metadata still flows.
    pub fn decode(&self, telegram: &Erp1Telegram) -> Result<EepMessage, EepError> {
        let mut msg = EepMessage::new(self.spec.eep);
        msg.sender = Some(telegram.sender);
        msg.rssi = telegram.rssi;
        if let Some(destination) = telegram.destination {
            if !destination.is_broadcast() {
                msg.destination = Some(destination);
            }
        }

        let cmd_value = if self.spec.cmd_size > 0 {
            let total_bits = telegram.telegram_data.len() * 8;
            let offset = self
                .cmd_bit_offset(total_bits)
                .ok_or(BitFieldError::OutOfRange {
                    offset: 0,
                    size: self.spec.cmd_size,
                    total_bits,
                })?;
            telegram.bitstring_raw_value(offset, self.spec.cmd_size)?
        } else {
            0
        };

        let Some(eep_telegram) = self.spec.telegrams.get(&cmd_value) else {
            return Ok(msg);
        };

        msg.message_type = Some(EepMessageType {
            id: cmd_value,
            description: eep_telegram
                .name
                .map(str::to_string)
                .unwrap_or_else(|| format!("Telegram {cmd_value}")),
        });

        // pass 1: raw values, so later passes can consult any sibling field
        let mut raws = RawValues::new();
        for field in &eep_telegram.datafields {
            raws.insert(
                field.id,
                telegram.bitstring_raw_value(field.offset, field.size)?,
            );
        }

        // pass 2: enum translation and (context-dependent) scaling
        for field in &eep_telegram.datafields {
            let raw = raws[field.id];

            let value = if field.range_enum.is_some() {
                Value::Text(
                    field
                        .enum_label(raw)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Unknown({raw})")),
                )
            } else {
                let bounds = match field.scale {
                    Scale::None => None,
                    Scale::Fixed { min, max } => Some((min, max)),
                    Scale::Dependent(f) => f(&raws),
                };
                match bounds {
                    Some((scale_min, scale_max)) => {
                        let (range_min, range_max) = field.effective_range();
                        Value::Float(telegram.bitstring_scaled_value(
                            field.offset,
                            field.size,
                            range_min,
                            range_max,
                            scale_min,
                            scale_max,
                        )?)
                    }
                    None => Value::Int(raw),
                }
            };

            let unit = match field.unit {
                Unit::None => None,
                Unit::Fixed(unit) => Some(unit),
                Unit::Dependent(f) => f(&raws),
            };

            msg.values
                .insert(field.id, EepMessageValue { raw, value, unit });
        }

        // pass 3: project annotated fields into the semantic entity map
        for field in &eep_telegram.datafields {
            if let (Some(uid), Some(value)) = (field.observable_uid, msg.values.get(field.id)) {
                msg.entities.insert(
                    uid,
                    EntityValue {
                        value: value.value.clone(),
                        unit: value.unit,
                    },
                );
            }
        }

        // pass 4: cross-field resolvers overwrite
        for (uid, resolver) in &self.spec.semantic_resolvers {
            if let Some(entity) = resolver(&msg.values) {
                msg.entities.insert(uid, entity);
            }
        }

        Ok(msg)
    }

    /// Build the radio telegram for an outbound message.
    ///
    /// The message must carry a sender, a `message_type.id` naming a
    /// telegram of this profile, and a raw value for every field to write.
    pub fn encode(&self, message: &EepMessage) -> Result<Erp1Telegram, EepError> {
        let sender = message.sender.ok_or(EepError::MissingSender)?;
        let cmd_value = message.message_type.as_ref().map(|t| t.id).unwrap_or(0);

        let eep_telegram =
            self.spec
                .telegrams
                .get(&cmd_value)
                .ok_or(EepError::UnknownTelegramType {
                    cmd: cmd_value,
                    eep: self.spec.eep,
                })?;

        // size the buffer to cover every field and the CMD selector
        let mut max_bit = eep_telegram
            .datafields
            .iter()
            .map(|f| f.offset + f.size)
            .max()
            .unwrap_or(0);
        if self.spec.cmd_size > 0 {
            match self.spec.cmd_offset {
                Some(offset) if offset < 0 => max_bit += self.spec.cmd_size,
                Some(offset) => max_bit = max_bit.max(offset as usize + self.spec.cmd_size),
                None => {}
            }
        }
        let buffer_len = max_bit.div_ceil(8);

        let rorg = Rorg::try_from(self.spec.eep.rorg)
            .map_err(|_| EepError::UnsupportedRorg(self.spec.eep.rorg))?;

        let mut erp1 = Erp1Telegram::new(rorg, vec![0u8; buffer_len], sender);
        erp1.destination = message.destination;

        if self.spec.cmd_size > 0 {
            if let Some(offset) = self.cmd_bit_offset(buffer_len * 8) {
                erp1.set_bitstring_raw_value(offset, self.spec.cmd_size, cmd_value)?;
            }
        }

        for field in &eep_telegram.datafields {
            if let Some(value) = message.values.get(field.id) {
                erp1.set_bitstring_raw_value(field.offset, field.size, value.raw)?;
            }
        }

        Ok(erp1)
    }
}
