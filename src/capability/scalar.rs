//! Generic scalar mirror: forwards one semantic entity as state changes.

use crate::address::SenderAddress;
use crate::capability::{Capability, StateChange, StateChangeSink};
use crate::eep::message::EepMessage;

/// Emits a [`StateChange`] whenever the configured observable UID shows up
/// in a message's entity map. Fully profile-agnostic: the projection from
/// field ids to entities already happened in the EEP handler.
pub struct ScalarCapability {
    device_address: SenderAddress,
    sink: StateChangeSink,
    observable_uid: &'static str,
}

impl ScalarCapability {
    pub fn new(
        device_address: SenderAddress,
        sink: StateChangeSink,
        observable_uid: &'static str,
    ) -> Self {
        ScalarCapability {
            device_address,
            sink,
            observable_uid,
        }
    }
}

impl Capability for ScalarCapability {
    fn device_address(&self) -> SenderAddress {
        self.device_address
    }

    fn decode_filtered(&mut self, message: &EepMessage) {
        let Some(entity) = message.entities.get(self.observable_uid) else {
            return;
        };
        (self.sink)(
            StateChange::new(
                self.device_address,
                self.observable_uid,
                entity.value.clone(),
            )
            .with_unit(entity.unit),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::observable;
    use crate::capability::test_support::recording_sink;
    use crate::eep::id::EepId;
    use crate::eep::message::{EntityValue, Value};

    #[test]
    fn given_matching_entity_then_value_and_unit_are_mirrored() {
        let address = SenderAddress::from_number(0x0123_4567).unwrap();
        let (sink, log) = recording_sink();
        let mut capability = ScalarCapability::new(address, sink, observable::TEMPERATURE);

        let mut msg = EepMessage::new(EepId::new(0xA5, 0x02, 0x05));
        msg.sender = Some(address);
        msg.entities.insert(
            observable::TEMPERATURE,
            EntityValue {
                value: Value::Float(15.7),
                unit: Some("°C"),
            },
        );
        capability.decode(&msg);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].observable_uid, observable::TEMPERATURE);
        assert_eq!(log[0].value, Value::Float(15.7));
        assert_eq!(log[0].unit, Some("°C"));
    }

    #[test]
    fn given_message_without_the_entity_then_nothing_is_emitted() {
        let address = SenderAddress::from_number(0x0123_4567).unwrap();
        let (sink, log) = recording_sink();
        let mut capability = ScalarCapability::new(address, sink, observable::TEMPERATURE);

        let mut msg = EepMessage::new(EepId::new(0xA5, 0x02, 0x05));
        msg.sender = Some(address);
        capability.decode(&msg);

        assert!(log.lock().unwrap().is_empty());
    }
}
