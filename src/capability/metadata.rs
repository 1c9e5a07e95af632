//! Reception metadata: telegram count, signal strength, last-seen time.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::address::SenderAddress;
use crate::capability::{observable, Capability, StateChange, StateChangeSink, Value};
use crate::eep::message::EepMessage;

/// Tracks bookkeeping observables every device has, regardless of profile.
/// The gateway prepends it to every device's capability list.
pub struct MetaDataCapability {
    device_address: SenderAddress,
    sink: StateChangeSink,
    telegram_count: u64,
}

impl MetaDataCapability {
    pub fn new(device_address: SenderAddress, sink: StateChangeSink) -> Self {
        MetaDataCapability {
            device_address,
            sink,
            telegram_count: 0,
        }
    }
}

impl Capability for MetaDataCapability {
    fn device_address(&self) -> SenderAddress {
        self.device_address
    }

    fn decode_filtered(&mut self, message: &EepMessage) {
        self.telegram_count += 1;

        (self.sink)(StateChange::new(
            self.device_address,
            observable::TELEGRAM_COUNT,
            self.telegram_count,
        ));

        if let Some(rssi) = message.rssi {
            (self.sink)(StateChange::new(
                self.device_address,
                observable::RSSI,
                rssi as u64,
            ));
        }

        let unix_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        (self.sink)(StateChange::new(
            self.device_address,
            observable::LAST_SEEN,
            Value::Float(unix_seconds),
        ));
    }
}
