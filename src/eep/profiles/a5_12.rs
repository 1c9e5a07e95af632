//! A5-12-XX: automated meter reading (AMR).
//!
//! The meter reading spans 24 bits; its effective scale depends on the
//! DIV field of the *same* telegram, which is why scale bounds are
//! functions of the raw-value map and not constants.

use crate::eep::id::EepId;
use crate::eep::profile::{EepDataField, EepSpecification, RawValues};

const DATA_TYPE: &[(u64, &str)] = &[(0, "Cumulative value"), (1, "Current value")];
const DIVISOR: &[(u64, &str)] = &[(0, "x/1"), (1, "x/10"), (2, "x/100"), (3, "x/1000")];

fn meter_scale(raws: &RawValues) -> Option<(f64, f64)> {
    const DIVISORS: [f64; 4] = [1.0, 10.0, 100.0, 1000.0];
    let div = raws.get("DIV").copied().unwrap_or(0) as usize;
    let divisor = DIVISORS.get(div).copied().unwrap_or(1.0);
    Some((0.0, 16_777_215.0 / divisor))
}

fn meter_profile(ty: u8, info_id: &'static str, info_name: &'static str) -> EepSpecification {
    let medium = match ty {
        0x01 => "electricity",
        0x02 => "gas",
        0x03 => "water",
        _ => "counter",
    };
    let fields = vec![
        EepDataField::new("MR", "Meter reading", 0, 24).scaled_by(meter_scale),
        EepDataField::new(info_id, info_name, 24, 4),
        EepDataField::new("DT", "Data type (unit)", 29, 1).with_enum(DATA_TYPE),
        EepDataField::new("DIV", "Divisor (scale)", 30, 2).with_enum(DIVISOR),
    ];
    EepSpecification::single_telegram(
        EepId::new(0xA5, 0x12, ty),
        format!("Automated meter reading (AMR), {medium}"),
        fields,
    )
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    vec![
        meter_profile(0x00, "CH", "Measurement channel"),
        meter_profile(0x01, "TI", "Tariff info"),
        meter_profile(0x02, "TI", "Tariff info"),
        meter_profile(0x03, "TI", "Tariff info"),
    ]
}
