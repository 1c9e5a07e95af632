//! A5-02-XX: temperature sensors.
//!
//! The whole family shares one layout and differs only in the measuring
//! range; types 0x20/0x30 use a 10-bit reading.

use crate::address::SenderAddress;
use crate::capability::{observable, Capability, ScalarCapability, StateChangeSink};
use crate::eep::id::EepId;
use crate::eep::profile::{EepDataField, EepSpecification};

fn temperature_mirror(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(ScalarCapability::new(address, sink, observable::TEMPERATURE))
}

fn temperature_profile(ty: u8, scale_min: f64, scale_max: f64, ten_bit: bool) -> EepSpecification {
    let name = format!(
        "{}emperature sensor, range {scale_min}°C to {scale_max}°C",
        if ten_bit { "10 bit t" } else { "T" }
    );
    let (offset, size) = if ten_bit { (14, 10) } else { (16, 8) };
    let tmp = EepDataField::new("TMP", "Temperature", offset, size)
        .scaled(scale_min, scale_max)
        .with_unit("°C")
        .observed_as(observable::TEMPERATURE);

    EepSpecification::single_telegram(EepId::new(0xA5, 0x02, ty), name, vec![tmp])
        .with_capability(temperature_mirror)
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    let eight_bit = [
        (0x01, -40.0, 0.0),
        (0x02, -30.0, 10.0),
        (0x03, -20.0, 20.0),
        (0x04, -10.0, 30.0),
        (0x05, 0.0, 40.0),
        (0x06, 10.0, 50.0),
        (0x07, 20.0, 60.0),
        (0x08, 30.0, 70.0),
        (0x09, 40.0, 80.0),
        (0x0A, 50.0, 90.0),
        (0x0B, 60.0, 100.0),
        (0x10, -60.0, 20.0),
        (0x11, -50.0, 30.0),
        (0x12, -40.0, 40.0),
        (0x13, -30.0, 50.0),
        (0x14, -20.0, 60.0),
        (0x15, -10.0, 70.0),
        (0x16, 0.0, 80.0),
        (0x17, 10.0, 90.0),
        (0x18, 20.0, 100.0),
        (0x19, 30.0, 110.0),
        (0x1A, 40.0, 120.0),
        (0x1B, 50.0, 130.0),
    ];
    let ten_bit = [(0x20, -10.0, 41.2), (0x30, -40.0, 62.3)];

    eight_bit
        .into_iter()
        .map(|(ty, min, max)| temperature_profile(ty, min, max, false))
        .chain(
            ten_bit
                .into_iter()
                .map(|(ty, min, max)| temperature_profile(ty, min, max, true)),
        )
        .collect()
}
