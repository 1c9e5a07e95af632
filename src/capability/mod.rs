//! Capabilities: per-device interpreters turning decoded EEP messages into
//! semantic [`StateChange`] events.
//!
//! A capability is bound to one device address and one state-change sink.
//! It never owns its device; the gateway owns both and feeds every decoded
//! message to every capability of the owning device. Some capabilities keep
//! timers (button hold detection, cover movement watchdog) and may emit
//! with [`StateChangeSource::Timer`] between telegrams.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::address::SenderAddress;
use crate::eep::message::EepMessage;

pub use crate::eep::message::Value;

pub mod cover;
pub mod metadata;
pub mod push_button;
pub mod scalar;

pub use cover::CoverCapability;
pub use metadata::MetaDataCapability;
pub use push_button::PushButtonCapability;
pub use scalar::ScalarCapability;

/// Stable semantic names for quantities a device can report, independent of
/// the field ids a particular EEP uses (`TMP` vs `TEMP` vs `T`).
pub mod observable {
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const ILLUMINATION: &str = "illumination";
    pub const MOTION: &str = "motion";
    pub const VOLTAGE: &str = "voltage";

    pub const POSITION: &str = "position";
    pub const ANGLE: &str = "angle";
    pub const COVER_STATE: &str = "cover_state";

    pub const WINDOW_STATE: &str = "window_state";

    pub const RSSI: &str = "rssi";
    pub const LAST_SEEN: &str = "last_seen";
    pub const TELEGRAM_COUNT: &str = "telegram_count";
}

/// Stable semantic names for commands, independent of CMD byte encodings.
pub mod action {
    pub const SET_COVER_POSITION: &str = "set_cover_position";
    pub const STOP_COVER: &str = "stop_cover";
    pub const QUERY_COVER_POSITION: &str = "query_cover_position";
    pub const DIM: &str = "dim";
}

/// Whether a state change was triggered by a radio telegram or by a timer
/// (hold detection, watchdog, release fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChangeSource {
    Telegram,
    Timer,
}

/// A semantic update emitted by a capability.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub device_address: SenderAddress,
    pub observable_uid: &'static str,
    pub value: Value,
    pub unit: Option<&'static str>,
    pub timestamp: SystemTime,
    /// Press duration, movement time and similar, when meaningful.
    pub time_elapsed: Option<Duration>,
    pub source: StateChangeSource,
}

impl StateChange {
    pub fn new(
        device_address: SenderAddress,
        observable_uid: &'static str,
        value: impl Into<Value>,
    ) -> Self {
        StateChange {
            device_address,
            observable_uid,
            value: value.into(),
            unit: None,
            timestamp: SystemTime::now(),
            time_elapsed: None,
            source: StateChangeSource::Telegram,
        }
    }

    pub fn with_unit(mut self, unit: Option<&'static str>) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.time_elapsed = Some(elapsed);
        self
    }

    pub fn from_timer(mut self) -> Self {
        self.source = StateChangeSource::Timer;
        self
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} = {}",
            self.device_address, self.observable_uid, self.value
        )?;
        if let Some(unit) = self.unit {
            write!(f, " {unit}")?;
        }
        if self.source == StateChangeSource::Timer {
            write!(f, " (timer)")?;
        }
        Ok(())
    }
}

/// Where capabilities deliver their state changes.
pub type StateChangeSink = Arc<dyn Fn(StateChange) + Send + Sync>;

/// A stateful per-device message interpreter.
///
/// `decode` ignores messages from other senders and must never panic the
/// dispatch loop; implementations log and continue on anything unexpected.
pub trait Capability: Send {
    /// The device this capability is bound to.
    fn device_address(&self) -> SenderAddress;

    /// Interpret a message already filtered to this device.
    fn decode_filtered(&mut self, message: &EepMessage);

    /// Feed a decoded message to this capability.
    fn decode(&mut self, message: &EepMessage) {
        if message.sender != Some(self.device_address()) {
            return;
        }
        self.decode_filtered(message);
    }

    /// Cancel any pending timers. Called on device removal and gateway
    /// shutdown; cancelled timers terminate without emitting.
    fn stop(&mut self) {}
}

/// A command for a device, addressed by action UID with raw field values.
///
/// The profile's command encoder for `action` turns this into an outbound
/// [`EepMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    pub action: String,
    /// EEP field id → raw value.
    pub values: HashMap<&'static str, u64>,
}

impl DeviceCommand {
    pub fn new(action: &str) -> Self {
        DeviceCommand {
            action: action.to_string(),
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, field_id: &'static str, raw: u64) -> Self {
        self.values.insert(field_id, raw);
        self
    }

    /// Drive a D2-05-00 cover to `position` (0 = open, 100 = closed) and
    /// slat `angle`, both in percent.
    pub fn set_cover_position(position: u8, angle: u8, channel: u8) -> Self {
        DeviceCommand::new(action::SET_COVER_POSITION)
            .with_value("POS", position.min(100) as u64)
            .with_value("ANG", angle.min(100) as u64)
            .with_value("CHN", channel as u64)
    }

    /// Stop cover movement on `channel`.
    pub fn stop_cover(channel: u8) -> Self {
        DeviceCommand::new(action::STOP_COVER).with_value("CHN", channel as u64)
    }

    /// Ask a cover to report its current position and angle.
    pub fn query_cover_position(channel: u8) -> Self {
        DeviceCommand::new(action::QUERY_COVER_POSITION).with_value("CHN", channel as u64)
    }

    /// Dim an A5-38-08 central-command dimmer to `value` (0–255) over
    /// `ramp_time` seconds.
    pub fn dim(value: u8, ramp_time: u8, switch_on: bool) -> Self {
        DeviceCommand::new(action::DIM)
            .with_value("EDIM", value as u64)
            .with_value("RMP", ramp_time as u64)
            .with_value("SW", switch_on as u64)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A sink recording every emitted state change, for capability tests.
    pub fn recording_sink() -> (StateChangeSink, Arc<Mutex<Vec<StateChange>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let sink: StateChangeSink = Arc::new(move |change| {
            sink_log.lock().unwrap().push(change);
        });
        (sink, log)
    }
}
