//! Cover (blinds/shutter) interpreter with a movement watchdog.
//!
//! D2-05-00 actuators report position while moving but send nothing when
//! they stop mid-travel. The watchdog infers "stopped" from 1.5 s of
//! silence after the last movement report.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::address::SenderAddress;
use crate::capability::{observable, Capability, StateChange, StateChangeSink};
use crate::eep::message::EepMessage;

pub const OPEN: &str = "open";
pub const OPENING: &str = "opening";
pub const CLOSED: &str = "closed";
pub const CLOSING: &str = "closing";
pub const STOPPED: &str = "stopped";

/// Silence after the last movement report before the cover counts as
/// stopped.
pub const COVER_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(1500);

/// The "reply position and angle" telegram of D2-05-00.
const CMD_REPLY_POSITION: u64 = 4;

#[derive(Default)]
struct CoverState {
    previous_position: Option<u64>,
    /// Increments whenever the watchdog is restarted or cancelled, so a
    /// stale timer that already slept past its cancellation fires into
    /// nothing.
    watchdog_generation: u64,
    watchdog: Option<JoinHandle<()>>,
}

/// Emits `position`, `angle` and the derived `cover_state` for blinds.
pub struct CoverCapability {
    device_address: SenderAddress,
    sink: StateChangeSink,
    state: Arc<Mutex<CoverState>>,
}

impl CoverCapability {
    pub fn new(device_address: SenderAddress, sink: StateChangeSink) -> Self {
        CoverCapability {
            device_address,
            sink,
            state: Arc::new(Mutex::new(CoverState::default())),
        }
    }

    /// Movement direction relative to the previous report.
    fn derive_cover_state(previous: Option<u64>, position: u64) -> Option<&'static str> {
        if position == 0 {
            return Some(OPEN);
        }
        if position == 100 {
            return Some(CLOSED);
        }
        let previous = previous?;
        Some(if position > previous {
            CLOSING
        } else if position < previous {
            OPENING
        } else {
            STOPPED
        })
    }

    fn restart_watchdog(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.watchdog.take() {
            task.abort();
        }
        state.watchdog_generation += 1;
        let generation = state.watchdog_generation;

        let shared = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let device_address = self.device_address;
        state.watchdog = Some(tokio::spawn(async move {
            sleep(COVER_WATCHDOG_TIMEOUT).await;
            {
                let mut state = shared.lock().unwrap();
                if state.watchdog_generation != generation {
                    return;
                }
                state.watchdog = None;
            }
            sink(StateChange::new(device_address, observable::COVER_STATE, STOPPED).from_timer());
        }));
    }

    fn cancel_watchdog(&self) {
        let mut state = self.state.lock().unwrap();
        state.watchdog_generation += 1;
        if let Some(task) = state.watchdog.take() {
            task.abort();
        }
    }
}

impl Capability for CoverCapability {
    fn device_address(&self) -> SenderAddress {
        self.device_address
    }

    fn decode_filtered(&mut self, message: &EepMessage) {
        let replied = message
            .message_type
            .as_ref()
            .is_some_and(|t| t.id == CMD_REPLY_POSITION);
        if !replied {
            return;
        }

        if let Some(position) = message.raw("POS") {
            let unit = message.values.get("POS").and_then(|v| v.unit);
            (self.sink)(
                StateChange::new(self.device_address, observable::POSITION, position)
                    .with_unit(unit),
            );

            let previous = self.state.lock().unwrap().previous_position;
            if let Some(cover_state) = Self::derive_cover_state(previous, position) {
                (self.sink)(StateChange::new(
                    self.device_address,
                    observable::COVER_STATE,
                    cover_state,
                ));
                match cover_state {
                    OPENING | CLOSING => self.restart_watchdog(),
                    STOPPED => self.cancel_watchdog(),
                    _ => {}
                }
            }
            self.state.lock().unwrap().previous_position = Some(position);
        }

        if let Some(angle) = message.raw("ANG") {
            let unit = message.values.get("ANG").and_then(|v| v.unit);
            (self.sink)(
                StateChange::new(self.device_address, observable::ANGLE, angle).with_unit(unit),
            );
        }
    }

    fn stop(&mut self) {
        self.cancel_watchdog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::recording_sink;
    use crate::capability::{StateChangeSource, Value};
    use crate::eep::id::EepId;
    use crate::eep::message::EepMessageType;
    use tokio::time::advance;

    fn address() -> SenderAddress {
        SenderAddress::from_number(0x05_0A_3D_6A).unwrap()
    }

    fn reply_message(position: u64, angle: Option<u64>) -> EepMessage {
        let mut msg = EepMessage::new(EepId::new(0xD2, 0x05, 0x00));
        msg.sender = Some(address());
        msg.message_type = Some(EepMessageType {
            id: 4,
            description: "Reply position and angle".to_string(),
        });
        msg.set_raw("POS", position);
        if let Some(angle) = angle {
            msg.set_raw("ANG", angle);
        }
        msg
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn cover_states(log: &std::sync::Mutex<Vec<StateChange>>) -> Vec<(String, StateChangeSource)> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|c| c.observable_uid == observable::COVER_STATE)
            .map(|c| (c.value.to_string(), c.source))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn given_two_movement_reports_then_watchdog_infers_stopped() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        capability.decode(&reply_message(40, None));
        advance(Duration::from_millis(500)).await;
        capability.decode(&reply_message(60, None));
        advance(Duration::from_millis(1500)).await;
        settle().await;

        assert_eq!(
            cover_states(&log),
            vec![
                (CLOSING.to_string(), StateChangeSource::Telegram),
                (STOPPED.to_string(), StateChangeSource::Timer),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn given_decreasing_position_then_state_is_opening() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        capability.decode(&reply_message(80, None));
        advance(Duration::from_millis(500)).await;
        capability.decode(&reply_message(40, None));
        advance(Duration::from_millis(1500)).await;
        settle().await;

        assert_eq!(
            cover_states(&log),
            vec![
                (OPENING.to_string(), StateChangeSource::Telegram),
                (STOPPED.to_string(), StateChangeSource::Timer),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn given_equal_position_report_then_stopped_comes_from_telegram_and_watchdog_dies() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        capability.decode(&reply_message(40, None));
        capability.decode(&reply_message(60, None));
        advance(Duration::from_millis(500)).await;
        capability.decode(&reply_message(60, None));
        advance(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(
            cover_states(&log),
            vec![
                (CLOSING.to_string(), StateChangeSource::Telegram),
                (STOPPED.to_string(), StateChangeSource::Telegram),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn given_end_positions_then_open_and_closed_are_absolute() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        capability.decode(&reply_message(0, None));
        capability.decode(&reply_message(100, None));
        settle().await;

        assert_eq!(
            cover_states(&log),
            vec![
                (OPEN.to_string(), StateChangeSource::Telegram),
                (CLOSED.to_string(), StateChangeSource::Telegram),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn given_first_mid_travel_report_then_no_state_is_derived() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        capability.decode(&reply_message(40, Some(30)));
        settle().await;

        assert!(cover_states(&log).is_empty());
        let log = log.lock().unwrap();
        let uids: Vec<_> = log.iter().map(|c| c.observable_uid).collect();
        assert_eq!(uids, vec![observable::POSITION, observable::ANGLE]);
        assert_eq!(log[0].value, Value::Int(40));
        assert_eq!(log[1].value, Value::Int(30));
    }

    #[tokio::test(start_paused = true)]
    async fn given_other_message_types_then_cover_ignores_them() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        let mut msg = reply_message(40, None);
        msg.message_type = Some(EepMessageType {
            id: 1,
            description: "Go to position and angle".to_string(),
        });
        capability.decode(&msg);
        settle().await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn given_stop_then_watchdog_never_fires() {
        let (sink, log) = recording_sink();
        let mut capability = CoverCapability::new(address(), sink);

        capability.decode(&reply_message(40, None));
        capability.decode(&reply_message(60, None));
        capability.stop();
        advance(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(
            cover_states(&log),
            vec![(CLOSING.to_string(), StateChangeSource::Telegram)]
        );
    }
}
