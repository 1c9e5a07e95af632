//! Declarative EEP profile model.
//!
//! A profile is pure data: the generic [`EepHandler`](super::handler)
//! never branches on a concrete EEP id. Everything profile-specific —
//! field layouts, context-dependent scales, vendor quirks, command
//! encodings, which capabilities a device of this profile gets — is
//! expressed here and interpreted generically.

use std::collections::HashMap;

use crate::address::SenderAddress;
use crate::capability::{Capability, DeviceCommand, StateChangeSink};
use crate::eep::handler::EepError;
use crate::eep::id::EepId;
use crate::eep::message::{EepMessage, EepMessageValue, EntityValue};

/// Raw field values of one telegram, keyed by field id. Input to the
/// context-dependent scale, unit and resolver functions.
pub type RawValues = HashMap<&'static str, u64>;

/// Decoded field values, keyed by field id.
pub type DecodedValues = HashMap<&'static str, EepMessageValue>;

/// How a field's raw integer maps to an interpreted value.
///
/// The scale bounds may depend on *other* fields of the same telegram
/// (e.g. a meter's divisor field); the two-pass decode guarantees every
/// raw value is available when a `Dependent` scale runs.
#[derive(Clone, Copy)]
pub enum Scale {
    /// No scaling: the value stays the raw integer.
    None,
    Fixed { min: f64, max: f64 },
    Dependent(fn(&RawValues) -> Option<(f64, f64)>),
}

/// Unit label of a field, possibly depending on sibling fields.
#[derive(Clone, Copy)]
pub enum Unit {
    None,
    Fixed(&'static str),
    Dependent(fn(&RawValues) -> Option<&'static str>),
}

/// One data field of an EEP telegram.
#[derive(Clone, Copy)]
pub struct EepDataField {
    /// Short field token from the EEP sheet, e.g. `"POS"`.
    pub id: &'static str,
    pub name: &'static str,
    /// Bit offset, counted from the MSB of the first telegram data byte.
    pub offset: usize,
    /// Field width in bits.
    pub size: usize,
    /// Raw-value bounds. `None` derives the default: the enum key range
    /// when an enum is declared, `0..=2^size - 1` otherwise.
    pub range: Option<(u64, u64)>,
    pub scale: Scale,
    pub unit: Unit,
    /// When present the field decodes to a label instead of a number.
    pub range_enum: Option<&'static [(u64, &'static str)]>,
    /// Semantic entity this field's decoded value is projected under.
    pub observable_uid: Option<&'static str>,
}

impl EepDataField {
    pub fn new(id: &'static str, name: &'static str, offset: usize, size: usize) -> Self {
        EepDataField {
            id,
            name,
            offset,
            size,
            range: None,
            scale: Scale::None,
            unit: Unit::None,
            range_enum: None,
            observable_uid: None,
        }
    }

    pub fn with_range(mut self, min: u64, max: u64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn scaled(mut self, min: f64, max: f64) -> Self {
        self.scale = Scale::Fixed { min, max };
        self
    }

    pub fn scaled_by(mut self, f: fn(&RawValues) -> Option<(f64, f64)>) -> Self {
        self.scale = Scale::Dependent(f);
        self
    }

    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Unit::Fixed(unit);
        self
    }

    pub fn with_unit_by(mut self, f: fn(&RawValues) -> Option<&'static str>) -> Self {
        self.unit = Unit::Dependent(f);
        self
    }

    pub fn with_enum(mut self, entries: &'static [(u64, &'static str)]) -> Self {
        self.range_enum = Some(entries);
        self
    }

    pub fn observed_as(mut self, observable_uid: &'static str) -> Self {
        self.observable_uid = Some(observable_uid);
        self
    }

    /// Effective raw-value bounds, applying the declaration defaults.
    pub fn effective_range(&self) -> (u64, u64) {
        if let Some(entries) = self.range_enum {
            let min = entries.iter().map(|(k, _)| *k).min().unwrap_or(0);
            let max = entries.iter().map(|(k, _)| *k).max().unwrap_or(0);
            return (min, max);
        }
        match self.range {
            Some(range) => range,
            None => (0, max_raw(self.size)),
        }
    }

    /// Enum label for a raw value.
    pub fn enum_label(&self, raw: u64) -> Option<&'static str> {
        self.range_enum?
            .iter()
            .find(|(key, _)| *key == raw)
            .map(|(_, label)| *label)
    }
}

/// Largest raw value representable in `size` bits.
pub fn max_raw(size: usize) -> u64 {
    if size >= 64 {
        u64::MAX
    } else {
        (1u64 << size) - 1
    }
}

/// One telegram type of an EEP: a named list of data fields.
#[derive(Clone)]
pub struct EepTelegram {
    pub name: Option<&'static str>,
    pub datafields: Vec<EepDataField>,
}

impl EepTelegram {
    pub fn new(name: Option<&'static str>, datafields: Vec<EepDataField>) -> Self {
        EepTelegram { name, datafields }
    }
}

/// Combines several decoded fields into one semantic entity value
/// (e.g. "ILL1 or ILL2 depending on RS").
pub type SemanticResolver = fn(&DecodedValues) -> Option<EntityValue>;

/// Turns a [`DeviceCommand`] into an outbound message with the CMD value
/// and raw field values set; the gateway fills sender and destination.
pub type CommandEncoder = fn(&DeviceCommand) -> Result<EepMessage, EepError>;

/// Creates a capability instance for a device of this profile.
pub type CapabilityFactory = fn(SenderAddress, StateChangeSink) -> Box<dyn Capability>;

/// A complete EEP specification: everything needed to de- and encode
/// messages of one profile and to equip its devices with capabilities.
#[derive(Clone)]
pub struct EepSpecification {
    pub eep: EepId,
    pub name: String,
    /// Width of the CMD selector in bits; 0 means a single telegram type.
    pub cmd_size: usize,
    /// Bit offset of the CMD selector. Negative values count from the end
    /// of the telegram data.
    pub cmd_offset: Option<i32>,
    /// Telegram table keyed by CMD value (key 0 when `cmd_size == 0`).
    pub telegrams: HashMap<u64, EepTelegram>,
    pub semantic_resolvers: HashMap<&'static str, SemanticResolver>,
    pub command_encoders: HashMap<&'static str, CommandEncoder>,
    pub capability_factories: Vec<CapabilityFactory>,
}

impl EepSpecification {
    pub fn new(
        eep: EepId,
        name: impl Into<String>,
        cmd_size: usize,
        cmd_offset: Option<i32>,
        telegrams: HashMap<u64, EepTelegram>,
    ) -> Self {
        EepSpecification {
            eep,
            name: name.into(),
            cmd_size,
            cmd_offset,
            telegrams,
            semantic_resolvers: HashMap::new(),
            command_encoders: HashMap::new(),
            capability_factories: Vec::new(),
        }
    }

    /// Profile with exactly one telegram type and no CMD selector.
    pub fn single_telegram(
        eep: EepId,
        name: impl Into<String>,
        datafields: Vec<EepDataField>,
    ) -> Self {
        let mut telegrams = HashMap::new();
        telegrams.insert(0, EepTelegram::new(None, datafields));
        EepSpecification::new(eep, name, 0, None, telegrams)
    }

    pub fn with_resolver(mut self, observable_uid: &'static str, f: SemanticResolver) -> Self {
        self.semantic_resolvers.insert(observable_uid, f);
        self
    }

    pub fn with_encoder(mut self, action_uid: &'static str, f: CommandEncoder) -> Self {
        self.command_encoders.insert(action_uid, f);
        self
    }

    pub fn with_capability(mut self, f: CapabilityFactory) -> Self {
        self.capability_factories.push(f);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_enum_field_then_range_is_derived_from_keys() {
        const ENTRIES: &[(u64, &str)] = &[(0, "released"), (1, "pressed")];
        let field = EepDataField::new("EB", "Energy bow", 3, 1).with_enum(ENTRIES);
        assert_eq!(field.effective_range(), (0, 1));
        assert_eq!(field.enum_label(1), Some("pressed"));
        assert_eq!(field.enum_label(2), None);
    }

    #[test]
    fn given_plain_field_then_range_defaults_to_size() {
        let field = EepDataField::new("TMP", "Temperature", 16, 8);
        assert_eq!(field.effective_range(), (0, 255));
        let wide = EepDataField::new("MR", "Meter reading", 0, 24);
        assert_eq!(wide.effective_range(), (0, 0xFF_FFFF));
    }

    #[test]
    fn given_declared_range_then_it_wins_over_the_default() {
        let field = EepDataField::new("HUM", "Humidity", 8, 8).with_range(0, 250);
        assert_eq!(field.effective_range(), (0, 250));
    }
}
