//! A5-06-XX: light sensors.
//!
//! The standard types report two overlapping illumination ranges (ILL1 and
//! ILL2) with a range-select bit; the Eltako variant of A5-06-01 abuses
//! the layout and picks the range by whether ILL2 reads zero. Both rules
//! live here as semantic resolvers, never in the engine.

use crate::address::SenderAddress;
use crate::capability::{observable, Capability, ScalarCapability, StateChangeSink};
use crate::eep::id::{EepId, Manufacturer};
use crate::eep::message::EntityValue;
use crate::eep::profile::{DecodedValues, EepDataField, EepSpecification};

const RANGE_SELECT: &[(u64, &str)] = &[(0, "Use ILL1"), (1, "Use ILL2")];

fn illumination_mirror(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(ScalarCapability::new(address, sink, observable::ILLUMINATION))
}

fn entity_from(values: &DecodedValues, field_id: &str) -> Option<EntityValue> {
    let value = values.get(field_id)?;
    Some(EntityValue {
        value: value.value.clone(),
        unit: value.unit,
    })
}

/// Standard A5-06: the RS bit names the field holding the measurement.
fn select_by_range_bit(values: &DecodedValues) -> Option<EntityValue> {
    let rs = values.get("RS")?;
    let field_id = if rs.raw == 0 { "ILL1" } else { "ILL2" };
    entity_from(values, field_id)
}

/// Eltako A5-06-01: ILL2 carries the reading unless it is zero, in which
/// case the low-range ILL1 applies.
fn select_eltako(values: &DecodedValues) -> Option<EntityValue> {
    match values.get("ILL2") {
        Some(ill2) if ill2.raw != 0 => entity_from(values, "ILL2"),
        _ => entity_from(values, "ILL1"),
    }
}

fn dual_range_profile(
    ty: u8,
    ill2_min: f64,
    ill2_max: f64,
    ill1_min: f64,
    ill1_max: f64,
) -> EepSpecification {
    let fields = vec![
        EepDataField::new("SVC", "Supply voltage", 0, 8)
            .scaled(0.0, 5.1)
            .with_unit("V"),
        EepDataField::new("ILL2", "Illumination", 8, 8)
            .scaled(ill2_min, ill2_max)
            .with_unit("lx"),
        EepDataField::new("ILL1", "Illumination", 16, 8)
            .scaled(ill1_min, ill1_max)
            .with_unit("lx"),
        EepDataField::new("RS", "Range select", 31, 1).with_enum(RANGE_SELECT),
    ];
    EepSpecification::single_telegram(
        EepId::new(0xA5, 0x06, ty),
        format!(
            "Light sensor, range {}lx to {}lx",
            ill1_min.min(ill2_min),
            ill1_max.max(ill2_max)
        ),
        fields,
    )
    .with_resolver(observable::ILLUMINATION, select_by_range_bit)
    .with_capability(illumination_mirror)
}

fn ten_bit_profile() -> EepSpecification {
    let fields = vec![
        EepDataField::new("SVC", "Supply voltage", 0, 8)
            .with_range(0, 250)
            .scaled(0.0, 5.0)
            .with_unit("V"),
        EepDataField::new("ILL", "Illumination", 8, 10)
            .scaled(0.0, 1000.0)
            .with_unit("lx")
            .observed_as(observable::ILLUMINATION),
    ];
    EepSpecification::single_telegram(
        EepId::new(0xA5, 0x06, 0x03),
        "Light sensor, 10-bit measurement, range 0lx to 1000lx",
        fields,
    )
    .with_capability(illumination_mirror)
}

fn eltako_profile() -> EepSpecification {
    let fields = vec![
        EepDataField::new("ILL1", "Illumination (twilight)", 0, 8)
            .scaled(0.0, 100.0)
            .with_unit("lx"),
        EepDataField::new("ILL2", "Illumination (daylight)", 8, 8)
            .scaled(300.0, 30000.0)
            .with_unit("lx"),
    ];
    EepSpecification::single_telegram(
        EepId::with_manufacturer(0xA5, 0x06, 0x01, Manufacturer::Eltako),
        "Eltako light sensor",
        fields,
    )
    .with_resolver(observable::ILLUMINATION, select_eltako)
    .with_capability(illumination_mirror)
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    vec![
        dual_range_profile(0x01, 300.0, 30000.0, 600.0, 60000.0),
        dual_range_profile(0x02, 0.0, 510.0, 0.0, 1020.0),
        dual_range_profile(0x05, 0.0, 5100.0, 0.0, 10200.0),
        ten_bit_profile(),
        eltako_profile(),
    ]
}
