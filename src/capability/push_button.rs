//! Push-button state machine for F6-02-01/02 rocker switches.
//!
//! Raw rocker telegrams only say "energy bow pressed" / "released". This
//! capability adds the timing semantics applications actually want:
//!
//! - `pushed` / `released` — the raw edge events
//! - `click` — released before the hold threshold
//! - `double-click` — two clicks within the double-click window
//! - `hold` — still pressed when the hold threshold expires (timer-sourced)
//!
//! A release fallback timer covers lost release telegrams. Both rockers
//! pressed together map to a combined button id (`ab0`, `a0b1`, …).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::address::SenderAddress;
use crate::capability::{Capability, StateChange, StateChangeSink, StateChangeSource};
use crate::eep::message::EepMessage;

pub const PUSHED: &str = "pushed";
pub const RELEASED: &str = "released";
pub const CLICK: &str = "click";
pub const DOUBLE_CLICK: &str = "double-click";
pub const HOLD: &str = "hold";

pub const DEFAULT_HOLD_THRESHOLD: Duration = Duration::from_millis(500);
pub const DEFAULT_DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(30);

struct PressedButton {
    pressed_at: Instant,
    held: bool,
    hold_task: JoinHandle<()>,
    release_task: JoinHandle<()>,
}

#[derive(Default)]
struct ButtonStates {
    pressed: HashMap<&'static str, PressedButton>,
    last_click: HashMap<&'static str, Instant>,
}

/// Rocker push-button interpreter with per-button timers.
pub struct PushButtonCapability {
    device_address: SenderAddress,
    sink: StateChangeSink,
    hold_threshold: Duration,
    double_click_window: Duration,
    release_timeout: Duration,
    state: Arc<Mutex<ButtonStates>>,
}

impl PushButtonCapability {
    pub fn new(device_address: SenderAddress, sink: StateChangeSink) -> Self {
        PushButtonCapability {
            device_address,
            sink,
            hold_threshold: DEFAULT_HOLD_THRESHOLD,
            double_click_window: DEFAULT_DOUBLE_CLICK_WINDOW,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
            state: Arc::new(Mutex::new(ButtonStates::default())),
        }
    }

    pub fn with_timing(
        mut self,
        hold_threshold: Duration,
        double_click_window: Duration,
        release_timeout: Duration,
    ) -> Self {
        self.hold_threshold = hold_threshold;
        self.double_click_window = double_click_window;
        self.release_timeout = release_timeout;
        self
    }

    fn emit_event(
        &self,
        button_id: &'static str,
        event: &'static str,
        elapsed: Option<Duration>,
        source: StateChangeSource,
    ) {
        emit(
            &self.sink,
            self.device_address,
            button_id,
            event,
            elapsed,
            source,
        );
    }

    fn button_pressed(&self, button_id: &'static str) {
        let now = Instant::now();
        {
            let mut state = self.state.lock().unwrap();
            // a re-press without release supersedes the old timers
            if let Some(previous) = state.pressed.remove(button_id) {
                previous.hold_task.abort();
                previous.release_task.abort();
            }
            let hold_task = self.spawn_hold_timer(button_id, now);
            let release_task = self.spawn_release_timer(button_id, now);
            state.pressed.insert(
                button_id,
                PressedButton {
                    pressed_at: now,
                    held: false,
                    hold_task,
                    release_task,
                },
            );
        }
        self.emit_event(button_id, PUSHED, None, StateChangeSource::Telegram);
    }

    /// Marks the button held and emits `hold` once the threshold passes.
    /// Checks that the press it was started for is still current.
    fn spawn_hold_timer(&self, button_id: &'static str, pressed_at: Instant) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let device_address = self.device_address;
        let threshold = self.hold_threshold;
        tokio::spawn(async move {
            sleep(threshold).await;
            let elapsed = {
                let mut state = state.lock().unwrap();
                match state.pressed.get_mut(button_id) {
                    Some(button) if button.pressed_at == pressed_at => {
                        button.held = true;
                        Some(pressed_at.elapsed())
                    }
                    _ => None,
                }
            };
            if let Some(elapsed) = elapsed {
                emit(
                    &sink,
                    device_address,
                    button_id,
                    HOLD,
                    Some(elapsed),
                    StateChangeSource::Timer,
                );
            }
        })
    }

    /// Fallback for lost release telegrams: synthesizes `released` after
    /// the timeout and drops the button state.
    fn spawn_release_timer(&self, button_id: &'static str, pressed_at: Instant) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let device_address = self.device_address;
        let timeout = self.release_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            let elapsed = {
                let mut state = state.lock().unwrap();
                let current = state
                    .pressed
                    .get(button_id)
                    .map_or(false, |b| b.pressed_at == pressed_at);
                if current {
                    if let Some(button) = state.pressed.remove(button_id) {
                        button.hold_task.abort();
                    }
                    Some(pressed_at.elapsed())
                } else {
                    None
                }
            };
            if let Some(elapsed) = elapsed {
                emit(
                    &sink,
                    device_address,
                    button_id,
                    RELEASED,
                    Some(elapsed),
                    StateChangeSource::Timer,
                );
            }
        })
    }

    fn button_released(&self, button_id: &'static str, now: Instant) {
        let (click_event, duration) = {
            let mut state = self.state.lock().unwrap();
            let Some(button) = state.pressed.remove(button_id) else {
                drop(state);
                // release without a recorded press
                self.emit_event(button_id, RELEASED, None, StateChangeSource::Telegram);
                return;
            };
            button.hold_task.abort();
            button.release_task.abort();

            let duration = now.duration_since(button.pressed_at);
            let mut click_event = None;
            if !button.held && duration < self.hold_threshold {
                let double = state.last_click.get(button_id).is_some_and(|&last| {
                    now.duration_since(last) <= self.double_click_window
                });
                if double {
                    state.last_click.remove(button_id);
                    click_event = Some(DOUBLE_CLICK);
                } else {
                    state.last_click.insert(button_id, now);
                    click_event = Some(CLICK);
                }
            }
            (click_event, duration)
        };

        if let Some(event) = click_event {
            self.emit_event(button_id, event, Some(duration), StateChangeSource::Telegram);
        }
        self.emit_event(
            button_id,
            RELEASED,
            Some(duration),
            StateChangeSource::Telegram,
        );
    }
}

fn emit(
    sink: &StateChangeSink,
    device_address: SenderAddress,
    button_id: &'static str,
    event: &'static str,
    elapsed: Option<Duration>,
    source: StateChangeSource,
) {
    let mut change = StateChange::new(device_address, button_id, event);
    change.time_elapsed = elapsed;
    change.source = source;
    sink(change);
}

/// Fold an enum label into the canonical button id vocabulary.
fn canonical_button(label: &str) -> &'static str {
    match label {
        "a0" => "a0",
        "a1" => "a1",
        "b0" => "b0",
        "b1" => "b1",
        _ => "unknown",
    }
}

/// Canonical id for a two-button chord.
fn combine_button_ids(first: &'static str, second: &'static str) -> &'static str {
    if first == "unknown" || second == "unknown" {
        return "unknown";
    }
    if first == second {
        return first;
    }
    match (first, second) {
        ("a0", "b0") | ("b0", "a0") => "ab0",
        ("a1", "b1") | ("b1", "a1") => "ab1",
        ("a0", "b1") | ("b1", "a0") => "a0b1",
        ("a1", "b0") | ("b0", "a1") => "a1b0",
        _ => "unknown",
    }
}

impl Capability for PushButtonCapability {
    fn device_address(&self) -> SenderAddress {
        self.device_address
    }

    fn decode_filtered(&mut self, message: &EepMessage) {
        let (Some(r1), Some(eb), Some(r2), Some(sa)) = (
            message.label("R1"),
            message.label("EB"),
            message.label("R2"),
            message.label("SA"),
        ) else {
            return;
        };

        match eb {
            "pressed" => {
                let first = canonical_button(r1);
                let button_id = if sa == "2nd action valid" {
                    combine_button_ids(first, canonical_button(r2))
                } else {
                    first
                };
                self.button_pressed(button_id);
            }
            "released" => {
                let now = Instant::now();
                let pressed: Vec<&'static str> =
                    self.state.lock().unwrap().pressed.keys().copied().collect();
                if pressed.is_empty() {
                    self.emit_event(
                        canonical_button(r1),
                        RELEASED,
                        None,
                        StateChangeSource::Telegram,
                    );
                } else {
                    for button_id in pressed {
                        self.button_released(button_id, now);
                    }
                }
            }
            other => warn!("unexpected energy bow state {other:?} from {}", self.device_address),
        }
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        for (_, button) in state.pressed.drain() {
            button.hold_task.abort();
            button.release_task.abort();
        }
    }
}
