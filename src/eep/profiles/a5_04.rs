//! A5-04-XX: temperature and humidity sensors.

use crate::address::SenderAddress;
use crate::capability::{observable, Capability, ScalarCapability, StateChangeSink};
use crate::eep::id::EepId;
use crate::eep::profile::{EepDataField, EepSpecification};

const SENSOR_AVAILABILITY: &[(u64, &str)] = &[
    (0, "Temperature sensor not available"),
    (1, "Temperature sensor available"),
];

fn humidity_mirror(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(ScalarCapability::new(address, sink, observable::HUMIDITY))
}

fn temperature_mirror(address: SenderAddress, sink: StateChangeSink) -> Box<dyn Capability> {
    Box::new(ScalarCapability::new(address, sink, observable::TEMPERATURE))
}

fn profile(ty: u8, temp_min: f64, temp_max: f64) -> EepSpecification {
    let fields = vec![
        EepDataField::new("HUM", "Humidity", 8, 8)
            .with_range(0, 250)
            .scaled(0.0, 100.0)
            .with_unit("%")
            .observed_as(observable::HUMIDITY),
        EepDataField::new("TMP", "Temperature", 16, 8)
            .with_range(0, 250)
            .scaled(temp_min, temp_max)
            .with_unit("°C")
            .observed_as(observable::TEMPERATURE),
        EepDataField::new("TSN", "T-Sensor availability", 30, 1).with_enum(SENSOR_AVAILABILITY),
    ];
    EepSpecification::single_telegram(
        EepId::new(0xA5, 0x04, ty),
        format!("Temperature and humidity sensor, range {temp_min}°C to {temp_max}°C"),
        fields,
    )
    .with_capability(humidity_mirror)
    .with_capability(temperature_mirror)
}

pub(super) fn profiles() -> Vec<EepSpecification> {
    vec![profile(0x01, 0.0, 40.0), profile(0x02, -20.0, 60.0)]
}
