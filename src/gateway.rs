//! The gateway orchestrator.
//!
//! Owns the device registry, drives the inbound pipeline
//! (raw ESP3 → ERP1 → EEP → capabilities → state changes), encodes
//! outbound commands, serializes common commands through the one-in-flight
//! transaction rule, and manages learning mode and the module identity.
//!
//! The gateway is `Clone` (a shared handle) and expects to live on a tokio
//! runtime; inbound dispatch runs on a reader task fed by the transport
//! byte channel. Events from one telegram are delivered in a stable order
//! — raw packet, raw telegram, EEP message, then state changes in
//! capability-list order — before the next telegram is processed.
//!
//! Callbacks run on the dispatch path: they must return promptly and must
//! not call back into registry mutation synchronously.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::address::{BaseAddress, Destination, Eurid, SenderAddress};
use crate::capability::{
    Capability, DeviceCommand, MetaDataCapability, StateChange, StateChangeSink,
};
use crate::command::{
    CommonCommand, ResponseParseError, ResponseTelegram, ReturnCode, VersionInfo,
};
use crate::device::Device;
use crate::eep::handler::EepError;
use crate::eep::{profiles, EepHandler, EepId, EepMessage};
use crate::erp1::{Erp1Telegram, FourBsTeachIn, Rorg};
use crate::esp3::{Esp3Packet, InboundFramer, PacketType};
use crate::ute::{ResponseExpectation, UteMessage, UteQueryType, UteRequest, UteResponseType};

/// ESP3 mandates a response within 500 ms of a command.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// The value `change_base_id` demands as confirmation.
pub const BASE_ID_SAFETY_FLAG: u8 = 0x7B;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport closed")]
    TransportClosed,
    #[error("no response from module within 500 ms")]
    ResponseTimeout,
    #[error("module answered {0:?}")]
    ErrorCode(ReturnCode),
    #[error("response data too short: {0} byte(s)")]
    ShortResponse(usize),
    #[error("module reported an invalid base ID")]
    InvalidBaseId,
    #[error("unknown device {0}")]
    UnknownDevice(SenderAddress),
    #[error("device {0} is already registered")]
    DuplicateDevice(SenderAddress),
    #[error("no profile in the catalog for EEP {0}")]
    UnknownEep(EepId),
    #[error("device {device} ({eep}) does not support action {action:?}")]
    UnknownAction {
        device: SenderAddress,
        eep: EepId,
        action: String,
    },
    #[error("{0} cannot be a destination")]
    InvalidDestination(SenderAddress),
    #[error(transparent)]
    Eep(#[from] EepError),
    #[error(transparent)]
    Response(#[from] ResponseParseError),
}

/// Failure modes of [`Gateway::change_base_id`].
#[derive(Debug, Error)]
pub enum BaseIdChangeError {
    #[error("invalid safety flag 0x{0:02X}; pass 0x7B to confirm you understand the consequences")]
    InvalidSafetyFlag(u8),
    #[error("New base ID is the same as the current base ID")]
    SameAsCurrent,
    #[error("base ID change is not supported by this module")]
    Unsupported,
    #[error("provided base ID is out of the allowed range (FF:80:00:00 to FF:FF:FF:80)")]
    OutOfRange,
    #[error("maximum number of base ID changes reached")]
    WriteCyclesExhausted,
    #[error("module still reports the previous base ID")]
    ChangeRejected,
    #[error("module reports base ID {reported}, neither the old nor the requested one")]
    InconsistentState { reported: BaseAddress },
    #[error("base ID change failed with return code {0:?}")]
    Other(ReturnCode),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Outcome of a sent packet: the module's response, or `None` on timeout.
#[derive(Debug)]
pub struct SendResult {
    pub response: Option<ResponseTelegram>,
    pub duration: Option<Duration>,
}

/// What the gateway does with accepted teach-in requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeachInPolicy {
    /// Only surface teach-in events; an upper layer decides.
    #[default]
    SurfaceOnly,
    /// Register the device (and answer UTE queries) automatically.
    AutoRegister,
}

/// A teach-in request observed while learning mode was active.
#[derive(Debug, Clone)]
pub enum TeachInEvent {
    Ute {
        sender: SenderAddress,
        message: UteMessage,
    },
    FourBs {
        sender: SenderAddress,
        teach_in: FourBsTeachIn,
    },
    /// 1BS teach-in telegrams carry no profile, only the sender.
    OneBs { sender: SenderAddress },
}

type Cb<T> = Arc<dyn Fn(&T) + Send + Sync>;
type FilteredCb<T> = (Option<SenderAddress>, Cb<T>);

#[derive(Default)]
struct Callbacks {
    esp3_received: StdMutex<Vec<Cb<Esp3Packet>>>,
    esp3_send: StdMutex<Vec<Cb<Esp3Packet>>>,
    erp1_received: StdMutex<Vec<FilteredCb<Erp1Telegram>>>,
    new_device: StdMutex<Vec<Cb<SenderAddress>>>,
    ute_received: StdMutex<Vec<Cb<UteMessage>>>,
    eep_message: StdMutex<Vec<FilteredCb<EepMessage>>>,
    state_change: StdMutex<Vec<Cb<StateChange>>>,
    response_received: StdMutex<Vec<Cb<ResponseTelegram>>>,
    parsing_failed: StdMutex<Vec<Arc<dyn Fn(&str) + Send + Sync>>>,
    teach_in: StdMutex<Vec<Cb<TeachInEvent>>>,
}

#[derive(Default)]
struct ModuleIdentity {
    base_id: Option<BaseAddress>,
    remaining_write_cycles: Option<u8>,
    version: Option<VersionInfo>,
}

#[derive(Default)]
struct LearningState {
    active: bool,
    allow_teach_out: bool,
    stop_task: Option<JoinHandle<()>>,
}

struct Shared {
    outbound: mpsc::Sender<Vec<u8>>,
    send_lock: AsyncMutex<()>,
    pending: StdMutex<Option<oneshot::Sender<ResponseTelegram>>>,
    devices: StdMutex<HashMap<SenderAddress, Device>>,
    detected: StdMutex<Vec<SenderAddress>>,
    handlers: StdMutex<HashMap<EepId, EepHandler>>,
    identity: StdMutex<ModuleIdentity>,
    learning: StdMutex<LearningState>,
    teach_in_policy: StdMutex<TeachInPolicy>,
    callbacks: Callbacks,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

/// Shared handle to one EnOcean gateway module.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Shared>,
}

fn snapshot<T: Clone>(list: &StdMutex<Vec<T>>) -> Vec<T> {
    list.lock().unwrap().clone()
}

impl Gateway {
    /// Create a gateway writing framed bytes into `outbound`. Call
    /// [`attach`](Self::attach) to start consuming inbound bytes.
    pub fn new(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Gateway {
            inner: Arc::new(Shared {
                outbound,
                send_lock: AsyncMutex::new(()),
                pending: StdMutex::new(None),
                devices: StdMutex::new(HashMap::new()),
                detected: StdMutex::new(Vec::new()),
                handlers: StdMutex::new(HashMap::new()),
                identity: StdMutex::new(ModuleIdentity::default()),
                learning: StdMutex::new(LearningState::default()),
                teach_in_policy: StdMutex::new(TeachInPolicy::default()),
                callbacks: Callbacks::default(),
                reader: StdMutex::new(None),
            }),
        }
    }

    /// Spawn the reader task that frames and dispatches inbound bytes.
    pub fn attach(&self, mut inbound: mpsc::Receiver<Vec<u8>>) {
        let gateway = self.clone();
        let task = tokio::spawn(async move {
            let mut framer = InboundFramer::new();
            while let Some(chunk) = inbound.recv().await {
                framer.push(&chunk);
                while let Some(packet) = framer.next_packet() {
                    gateway.process_esp3_packet(&packet);
                }
            }
            debug!("transport channel closed, reader task ending");
        });
        if let Some(previous) = self.inner.reader.lock().unwrap().replace(task) {
            previous.abort();
        }
    }

    /// Open a serial port with ESP3 settings and return a running gateway.
    pub fn open(port_name: &str) -> Result<Self, serialport::Error> {
        let link = crate::port::open(port_name)?;
        let gateway = Gateway::new(link.tx);
        gateway.attach(link.rx);
        Ok(gateway)
    }

    /// Stop the reader task, learning mode and all capability timers.
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.reader.lock().unwrap().take() {
            task.abort();
        }
        self.stop_learning();
        let mut devices = self.inner.devices.lock().unwrap();
        for device in devices.values_mut() {
            for capability in device.capabilities.iter_mut() {
                capability.stop();
            }
        }
        self.inner.pending.lock().unwrap().take();
    }

    // ------------------------------------------------------------------
    // callback registration
    // ------------------------------------------------------------------

    pub fn on_esp3_received(&self, f: impl Fn(&Esp3Packet) + Send + Sync + 'static) {
        self.inner.callbacks.esp3_received.lock().unwrap().push(Arc::new(f));
    }

    pub fn on_esp3_send(&self, f: impl Fn(&Esp3Packet) + Send + Sync + 'static) {
        self.inner.callbacks.esp3_send.lock().unwrap().push(Arc::new(f));
    }

    /// `filter` restricts delivery to telegrams from one sender.
    pub fn on_erp1_received(
        &self,
        filter: Option<SenderAddress>,
        f: impl Fn(&Erp1Telegram) + Send + Sync + 'static,
    ) {
        self.inner.callbacks.erp1_received.lock().unwrap().push((filter, Arc::new(f)));
    }

    pub fn on_new_device(&self, f: impl Fn(&SenderAddress) + Send + Sync + 'static) {
        self.inner.callbacks.new_device.lock().unwrap().push(Arc::new(f));
    }

    pub fn on_ute_received(&self, f: impl Fn(&UteMessage) + Send + Sync + 'static) {
        self.inner.callbacks.ute_received.lock().unwrap().push(Arc::new(f));
    }

    pub fn on_eep_message(
        &self,
        filter: Option<SenderAddress>,
        f: impl Fn(&EepMessage) + Send + Sync + 'static,
    ) {
        self.inner.callbacks.eep_message.lock().unwrap().push((filter, Arc::new(f)));
    }

    pub fn on_state_change(&self, f: impl Fn(&StateChange) + Send + Sync + 'static) {
        self.inner.callbacks.state_change.lock().unwrap().push(Arc::new(f));
    }

    pub fn on_response_received(&self, f: impl Fn(&ResponseTelegram) + Send + Sync + 'static) {
        self.inner.callbacks.response_received.lock().unwrap().push(Arc::new(f));
    }

    pub fn on_parsing_failed(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.callbacks.parsing_failed.lock().unwrap().push(Arc::new(f));
    }

    pub fn on_teach_in(&self, f: impl Fn(&TeachInEvent) + Send + Sync + 'static) {
        self.inner.callbacks.teach_in.lock().unwrap().push(Arc::new(f));
    }

    fn parsing_failed(&self, message: String) {
        warn!("{message}");
        for cb in snapshot(&self.inner.callbacks.parsing_failed) {
            cb(&message);
        }
    }

    /// Sink handed to capabilities; holds a weak reference so capabilities
    /// never keep the gateway alive.
    fn state_change_sink(&self) -> StateChangeSink {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |change| {
            if let Some(inner) = weak.upgrade() {
                for cb in snapshot(&inner.callbacks.state_change) {
                    cb(&change);
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // device registry
    // ------------------------------------------------------------------

    /// Register a device so its telegrams decode and it can be commanded.
    pub fn add_device(
        &self,
        address: SenderAddress,
        eep: EepId,
        sender: Option<SenderAddress>,
        name: Option<&str>,
    ) -> Result<(), GatewayError> {
        let spec = profiles::find(&eep).ok_or(GatewayError::UnknownEep(eep))?;

        let mut devices = self.inner.devices.lock().unwrap();
        if devices.contains_key(&address) {
            return Err(GatewayError::DuplicateDevice(address));
        }

        let sink = self.state_change_sink();
        // metadata always dispatches first
        let mut capabilities: Vec<Box<dyn Capability>> =
            vec![Box::new(MetaDataCapability::new(address, Arc::clone(&sink)))];
        for factory in &spec.capability_factories {
            capabilities.push(factory(address, Arc::clone(&sink)));
        }

        devices.insert(
            address,
            Device {
                address,
                eep,
                name: name.map(str::to_string),
                sender,
                capabilities,
            },
        );
        drop(devices);

        self.inner.detected.lock().unwrap().retain(|a| *a != address);
        debug!("registered device {address} as {eep}");
        Ok(())
    }

    pub fn remove_device(&self, address: SenderAddress) -> Result<(), GatewayError> {
        let mut device = self
            .inner
            .devices
            .lock()
            .unwrap()
            .remove(&address)
            .ok_or(GatewayError::UnknownDevice(address))?;
        for capability in device.capabilities.iter_mut() {
            capability.stop();
        }
        debug!("removed device {address}");
        Ok(())
    }

    pub fn has_device(&self, address: SenderAddress) -> bool {
        self.inner.devices.lock().unwrap().contains_key(&address)
    }

    /// Addresses heard on the air that no registered device claims.
    pub fn detected_devices(&self) -> Vec<SenderAddress> {
        self.inner.detected.lock().unwrap().clone()
    }

    fn handler_for(&self, eep: EepId) -> Option<EepHandler> {
        let mut handlers = self.inner.handlers.lock().unwrap();
        if let Some(handler) = handlers.get(&eep) {
            return Some(handler.clone());
        }
        let handler = EepHandler::new(profiles::find(&eep)?);
        handlers.insert(eep, handler.clone());
        Some(handler)
    }

    // ------------------------------------------------------------------
    // inbound dispatch
    // ------------------------------------------------------------------

    /// Dispatch one parsed ESP3 packet through the inbound pipeline.
    pub fn process_esp3_packet(&self, packet: &Esp3Packet) {
        for cb in snapshot(&self.inner.callbacks.esp3_received) {
            cb(packet);
        }

        match packet.packet_type {
            PacketType::Response => self.process_response(packet),
            PacketType::RadioErp1 => self.process_erp1(packet),
            other => debug!("ignoring {other:?} packet"),
        }
    }

    fn process_response(&self, packet: &Esp3Packet) {
        let response = match ResponseTelegram::from_esp3(packet) {
            Ok(response) => response,
            Err(e) => {
                self.parsing_failed(format!("RESPONSE parse failed: {e}"));
                return;
            }
        };

        for cb in snapshot(&self.inner.callbacks.response_received) {
            cb(&response);
        }

        // unexpected responses are broadcast above, then dropped
        if let Some(pending) = self.inner.pending.lock().unwrap().take() {
            let _ = pending.send(response);
        }
    }

    fn process_erp1(&self, packet: &Esp3Packet) {
        let telegram = match Erp1Telegram::from_esp3(packet) {
            Ok(telegram) => telegram,
            Err(e) => {
                self.parsing_failed(format!("ERP1 parse failed: {e}"));
                return;
            }
        };

        for (filter, cb) in snapshot(&self.inner.callbacks.erp1_received) {
            if filter.is_none() || filter == Some(telegram.sender) {
                cb(&telegram);
            }
        }

        // first-contact detection
        if !self.has_device(telegram.sender) {
            let newly_detected = {
                let mut detected = self.inner.detected.lock().unwrap();
                if detected.contains(&telegram.sender) {
                    false
                } else {
                    detected.push(telegram.sender);
                    true
                }
            };
            if newly_detected {
                for cb in snapshot(&self.inner.callbacks.new_device) {
                    cb(&telegram.sender);
                }
            }
        }

        if telegram.rorg == Rorg::Ute {
            match UteMessage::from_erp1(&telegram) {
                Ok(ute) => {
                    for cb in snapshot(&self.inner.callbacks.ute_received) {
                        cb(&ute);
                    }
                    self.handle_ute_teach_in(&telegram, ute);
                }
                Err(e) => self.parsing_failed(format!("UTE parse failed: {e}")),
            }
            return;
        }

        if telegram.is_learning_telegram() {
            self.handle_learning_telegram(&telegram);
            return;
        }

        // resolve the profile: by sender, else by addressed destination
        let eep = {
            let devices = self.inner.devices.lock().unwrap();
            devices.get(&telegram.sender).map(|d| d.eep).or_else(|| {
                match telegram.destination {
                    Some(Destination::Eurid(eurid)) => devices
                        .get(&SenderAddress::Eurid(eurid))
                        .map(|d| d.eep),
                    _ => None,
                }
            })
        };
        let Some(eep) = eep else {
            self.parsing_failed(format!(
                "no EEP known for sender {} (destination {:?})",
                telegram.sender,
                telegram.destination.map(|d| d.to_string())
            ));
            return;
        };

        let Some(handler) = self.handler_for(eep) else {
            self.parsing_failed(format!("no profile in the catalog for EEP {eep}"));
            return;
        };

        let message = match handler.decode(&telegram) {
            Ok(message) => message,
            Err(e) => {
                self.parsing_failed(format!("EEP decode failed for {eep}: {e}"));
                return;
            }
        };

        for (filter, cb) in snapshot(&self.inner.callbacks.eep_message) {
            if filter.is_none() || filter == Some(telegram.sender) {
                cb(&message);
            }
        }

        let mut devices = self.inner.devices.lock().unwrap();
        if let Some(device) = devices.get_mut(&telegram.sender) {
            for capability in device.capabilities.iter_mut() {
                capability.decode(&message);
            }
        }
    }

    // ------------------------------------------------------------------
    // teach-in / learning mode
    // ------------------------------------------------------------------

    /// Accept teach-in requests for `duration`, then stop automatically.
    pub fn start_learning(&self, duration: Duration, allow_teach_out: bool) {
        let mut learning = self.inner.learning.lock().unwrap();
        learning.active = true;
        learning.allow_teach_out = allow_teach_out;
        if let Some(task) = learning.stop_task.take() {
            task.abort();
        }
        let gateway = self.clone();
        learning.stop_task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            gateway.stop_learning();
        }));
        debug!("learning mode enabled for {duration:?} (teach-out: {allow_teach_out})");
    }

    pub fn stop_learning(&self) {
        let mut learning = self.inner.learning.lock().unwrap();
        if learning.active {
            debug!("learning mode disabled");
        }
        learning.active = false;
        if let Some(task) = learning.stop_task.take() {
            task.abort();
        }
    }

    pub fn is_learning(&self) -> bool {
        self.inner.learning.lock().unwrap().active
    }

    pub fn set_teach_in_policy(&self, policy: TeachInPolicy) {
        *self.inner.teach_in_policy.lock().unwrap() = policy;
    }

    fn emit_teach_in(&self, event: TeachInEvent) {
        for cb in snapshot(&self.inner.callbacks.teach_in) {
            cb(&event);
        }
    }

    fn handle_ute_teach_in(&self, telegram: &Erp1Telegram, ute: UteMessage) {
        let (active, allow_teach_out) = {
            let learning = self.inner.learning.lock().unwrap();
            (learning.active, learning.allow_teach_out)
        };
        if !active {
            return;
        }
        let UteRequest::Query(query_type) = ute.request else {
            return;
        };
        if query_type == UteQueryType::TeachInDeletion && !allow_teach_out {
            debug!("ignoring teach-in deletion from {} (teach-out disabled)", telegram.sender);
            return;
        }

        self.emit_teach_in(TeachInEvent::Ute {
            sender: telegram.sender,
            message: ute.clone(),
        });

        if *self.inner.teach_in_policy.lock().unwrap() != TeachInPolicy::AutoRegister {
            return;
        }

        let deletion = match query_type {
            UteQueryType::TeachIn => false,
            UteQueryType::TeachInDeletion => true,
            UteQueryType::TeachInOrDeletion => {
                self.has_device(telegram.sender) && allow_teach_out
            }
            UteQueryType::NotUsed => return,
        };

        let response_type = if deletion {
            match self.remove_device(telegram.sender) {
                Ok(()) => UteResponseType::AcceptedDeletion,
                Err(_) => UteResponseType::NotAccepted,
            }
        } else if !profiles::is_known(&ute.eep) {
            UteResponseType::EepNotSupported
        } else {
            match self.add_device(telegram.sender, ute.eep, None, None) {
                Ok(()) | Err(GatewayError::DuplicateDevice(_)) => UteResponseType::AcceptedTeachIn,
                Err(e) => {
                    warn!("teach-in of {} failed: {e}", telegram.sender);
                    UteResponseType::NotAccepted
                }
            }
        };

        if ute.response_expectation != Some(ResponseExpectation::Expected) {
            return;
        }
        let Ok(response) = UteMessage::response_for_query(&ute, response_type) else {
            return;
        };

        // answering needs the base ID and the send lock, so it cannot run
        // on the dispatch path
        let gateway = self.clone();
        let queried_by = telegram.sender;
        tokio::spawn(async move {
            let base = match gateway.base_id().await {
                Ok(base) => base,
                Err(e) => {
                    warn!("cannot answer teach-in query from {queried_by}: {e}");
                    return;
                }
            };
            let mut reply = response.to_erp1(SenderAddress::Base(base));
            if let SenderAddress::Eurid(eurid) = queried_by {
                reply.destination = Some(Destination::Eurid(eurid));
            }
            if let Err(e) = gateway.send_esp3_packet(&reply.to_esp3()).await {
                warn!("sending teach-in response to {queried_by} failed: {e}");
            }
        });
    }

    fn handle_learning_telegram(&self, telegram: &Erp1Telegram) {
        if !self.is_learning() {
            return;
        }

        match telegram.rorg {
            Rorg::Bs4 => match FourBsTeachIn::from_erp1(telegram) {
                Ok(teach_in) => {
                    self.emit_teach_in(TeachInEvent::FourBs {
                        sender: telegram.sender,
                        teach_in: teach_in.clone(),
                    });
                    let auto =
                        *self.inner.teach_in_policy.lock().unwrap() == TeachInPolicy::AutoRegister;
                    if auto {
                        if let Some(eep) = teach_in.eep {
                            // fall back to the generic profile when no
                            // manufacturer variant is catalogued
                            let generic = EepId::new(eep.rorg, eep.func, eep.ty);
                            let resolved = [eep, generic]
                                .into_iter()
                                .find(profiles::is_known);
                            match resolved {
                                Some(resolved) => {
                                    match self.add_device(telegram.sender, resolved, None, None) {
                                        Ok(()) | Err(GatewayError::DuplicateDevice(_)) => {}
                                        Err(e) => warn!(
                                            "4BS teach-in of {} failed: {e}",
                                            telegram.sender
                                        ),
                                    }
                                }
                                None => debug!(
                                    "4BS teach-in from {} claims unprofiled EEP {eep}",
                                    telegram.sender
                                ),
                            }
                        }
                    }
                }
                Err(e) => self.parsing_failed(format!("4BS teach-in parse failed: {e}")),
            },
            Rorg::Bs1 => {
                // profileless: surface the sender, an upper layer decides
                self.emit_teach_in(TeachInEvent::OneBs {
                    sender: telegram.sender,
                });
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // transaction layer
    // ------------------------------------------------------------------

    /// Send a framed packet and await the module's RESPONSE.
    ///
    /// At most one command is in flight at any time; overlapping callers
    /// are served in submission order. A timeout is not an error: the
    /// result carries `response: None`.
    pub async fn send_esp3_packet(&self, packet: &Esp3Packet) -> Result<SendResult, GatewayError> {
        let _guard = self.inner.send_lock.lock().await;

        let (pending_tx, pending_rx) = oneshot::channel();
        *self.inner.pending.lock().unwrap() = Some(pending_tx);

        // clears the pending slot even if the caller is cancelled mid-await
        struct ClearPending<'a>(&'a Shared);
        impl Drop for ClearPending<'_> {
            fn drop(&mut self) {
                self.0.pending.lock().unwrap().take();
            }
        }
        let clear = ClearPending(&self.inner);

        for cb in snapshot(&self.inner.callbacks.esp3_send) {
            cb(packet);
        }

        self.inner
            .outbound
            .send(packet.to_bytes())
            .await
            .map_err(|_| GatewayError::TransportClosed)?;

        let started = Instant::now();
        let result = match timeout(RESPONSE_TIMEOUT, pending_rx).await {
            Ok(Ok(response)) => SendResult {
                response: Some(response),
                duration: Some(started.elapsed()),
            },
            _ => SendResult {
                response: None,
                duration: None,
            },
        };
        drop(clear);
        Ok(result)
    }

    // ------------------------------------------------------------------
    // outbound commands
    // ------------------------------------------------------------------

    /// Encode and send a command to a registered device.
    ///
    /// The sender resolves caller override → device sender → module base.
    pub async fn send_device_command(
        &self,
        destination: SenderAddress,
        command: DeviceCommand,
        sender: Option<SenderAddress>,
    ) -> Result<SendResult, GatewayError> {
        let (eep, registered_sender) = {
            let devices = self.inner.devices.lock().unwrap();
            let device = devices
                .get(&destination)
                .ok_or(GatewayError::UnknownDevice(destination))?;
            (device.eep, device.sender)
        };

        let spec = profiles::find(&eep).ok_or(GatewayError::UnknownEep(eep))?;
        let encoder = spec
            .command_encoders
            .get(command.action.as_str())
            .copied()
            .ok_or_else(|| GatewayError::UnknownAction {
                device: destination,
                eep,
                action: command.action.clone(),
            })?;

        let sender = match sender.or(registered_sender) {
            Some(sender) => sender,
            None => SenderAddress::Base(self.base_id().await?),
        };
        let destination = match destination {
            SenderAddress::Eurid(eurid) => Destination::Eurid(eurid),
            SenderAddress::Base(_) => {
                return Err(GatewayError::InvalidDestination(destination))
            }
        };

        let mut message = encoder(&command)?;
        message.sender = Some(sender);
        message.destination = Some(destination);

        let handler = self.handler_for(eep).ok_or(GatewayError::UnknownEep(eep))?;
        let telegram = handler.encode(&message)?;
        self.send_esp3_packet(&telegram.to_esp3()).await
    }

    /// [`send_device_command`](Self::send_device_command) with loose
    /// arguments, mirroring the callback-style surface.
    pub async fn send_command(
        &self,
        destination: SenderAddress,
        action: &str,
        values: HashMap<&'static str, u64>,
        sender: Option<SenderAddress>,
    ) -> Result<SendResult, GatewayError> {
        let mut command = DeviceCommand::new(action);
        command.values = values;
        self.send_device_command(destination, command, sender).await
    }

    // ------------------------------------------------------------------
    // module identity
    // ------------------------------------------------------------------

    /// The module base ID, queried once and cached.
    pub async fn base_id(&self) -> Result<BaseAddress, GatewayError> {
        if let Some(base) = self.inner.identity.lock().unwrap().base_id {
            return Ok(base);
        }

        let result = self
            .send_esp3_packet(&CommonCommand::ReadIdBase.to_esp3())
            .await?;
        let response = result.response.ok_or(GatewayError::ResponseTimeout)?;
        if response.return_code != ReturnCode::Ok {
            return Err(GatewayError::ErrorCode(response.return_code));
        }
        if response.response_data.len() < 4 {
            return Err(GatewayError::ShortResponse(response.response_data.len()));
        }

        let base = BaseAddress::from_bytes(response.response_data[..4].try_into().unwrap())
            .map_err(|_| GatewayError::InvalidBaseId)?;

        let mut identity = self.inner.identity.lock().unwrap();
        identity.base_id = Some(base);
        if let Some(&cycles) = response.optional_data.first() {
            identity.remaining_write_cycles = Some(cycles);
        }
        Ok(base)
    }

    /// How many base-ID writes the module still allows, when reported.
    pub async fn base_id_remaining_write_cycles(&self) -> Result<Option<u8>, GatewayError> {
        if self.inner.identity.lock().unwrap().base_id.is_none() {
            self.base_id().await?;
        }
        Ok(self.inner.identity.lock().unwrap().remaining_write_cycles)
    }

    /// Module version report, queried once and cached.
    pub async fn version_info(&self) -> Result<VersionInfo, GatewayError> {
        if let Some(version) = self.inner.identity.lock().unwrap().version.clone() {
            return Ok(version);
        }

        let result = self
            .send_esp3_packet(&CommonCommand::ReadVersion.to_esp3())
            .await?;
        let response = result.response.ok_or(GatewayError::ResponseTimeout)?;
        if response.return_code != ReturnCode::Ok {
            return Err(GatewayError::ErrorCode(response.return_code));
        }
        let version = VersionInfo::from_response(&response)?;
        self.inner.identity.lock().unwrap().version = Some(version.clone());
        Ok(version)
    }

    /// The module's own radio address.
    pub async fn eurid(&self) -> Result<Eurid, GatewayError> {
        Ok(self.version_info().await?.eurid)
    }

    /// Write a new base ID to the module.
    ///
    /// Requires `safety_flag == 0x7B`: modules only allow a handful of
    /// base-ID writes over their lifetime. The module may accept and still
    /// fail to acknowledge, so the result is always verified by re-reading
    /// the base ID afterwards.
    pub async fn change_base_id(
        &self,
        new_base_id: BaseAddress,
        safety_flag: u8,
    ) -> Result<BaseAddress, BaseIdChangeError> {
        if safety_flag != BASE_ID_SAFETY_FLAG {
            return Err(BaseIdChangeError::InvalidSafetyFlag(safety_flag));
        }

        let base_id_before = self.base_id().await.map_err(BaseIdChangeError::Gateway)?;
        if new_base_id == base_id_before {
            return Err(BaseIdChangeError::SameAsCurrent);
        }

        let result = self
            .send_esp3_packet(&CommonCommand::WriteIdBase(new_base_id).to_esp3())
            .await
            .map_err(BaseIdChangeError::Gateway)?;

        if let Some(response) = &result.response {
            match response.return_code {
                ReturnCode::Ok => {}
                ReturnCode::NotSupported => return Err(BaseIdChangeError::Unsupported),
                ReturnCode::BaseIdOutOfRange => return Err(BaseIdChangeError::OutOfRange),
                ReturnCode::BaseIdMaxReached => {
                    return Err(BaseIdChangeError::WriteCyclesExhausted)
                }
                other => return Err(BaseIdChangeError::Other(other)),
            }
        }

        // verify regardless of the response; a timeout may still mean the
        // module accepted the write
        {
            let mut identity = self.inner.identity.lock().unwrap();
            identity.base_id = None;
            identity.remaining_write_cycles = None;
        }
        let reported = self.base_id().await.map_err(BaseIdChangeError::Gateway)?;
        if reported == new_base_id {
            Ok(reported)
        } else if reported == base_id_before {
            Err(BaseIdChangeError::ChangeRejected)
        } else {
            Err(BaseIdChangeError::InconsistentState { reported })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{observable, Value};
    use std::sync::Mutex;

    fn sender(n: u32) -> SenderAddress {
        SenderAddress::from_number(n).unwrap()
    }

    fn eep(s: &str) -> EepId {
        EepId::from_string(s).unwrap()
    }

    fn test_gateway() -> (Gateway, mpsc::Receiver<Vec<u8>>, mpsc::Sender<Vec<u8>>) {
        let (out_tx, out_rx) = mpsc::channel(32);
        let (in_tx, in_rx) = mpsc::channel(32);
        let gateway = Gateway::new(out_tx);
        gateway.attach(in_rx);
        (gateway, out_rx, in_tx)
    }

    fn record_state_changes(gateway: &Gateway) -> Arc<Mutex<Vec<StateChange>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        gateway.on_state_change(move |change| sink.lock().unwrap().push(change.clone()));
        log
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    fn response_frame(code: u8, data: &[u8], optional: &[u8]) -> Vec<u8> {
        let mut payload = vec![code];
        payload.extend_from_slice(data);
        Esp3Packet::new(PacketType::Response, payload, optional.to_vec()).to_bytes()
    }

    /// Minimal USB300 stand-in: answers ID-base reads/writes and confirms
    /// radio sends.
    fn spawn_module(
        mut out_rx: mpsc::Receiver<Vec<u8>>,
        in_tx: mpsc::Sender<Vec<u8>>,
        base: [u8; 4],
        write_cycles: u8,
    ) -> Arc<Mutex<[u8; 4]>> {
        let state = Arc::new(Mutex::new(base));
        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            let mut framer = InboundFramer::new();
            while let Some(bytes) = out_rx.recv().await {
                framer.push(&bytes);
                while let Some(pkt) = framer.next_packet() {
                    let reply = match pkt.packet_type {
                        PacketType::CommonCommand => match pkt.data[0] {
                            0x08 => {
                                let base = *shared.lock().unwrap();
                                Some(response_frame(0, &base, &[write_cycles]))
                            }
                            0x07 => {
                                *shared.lock().unwrap() = pkt.data[1..5].try_into().unwrap();
                                Some(response_frame(0, &[], &[]))
                            }
                            _ => Some(response_frame(2, &[], &[])),
                        },
                        PacketType::RadioErp1 => Some(response_frame(0, &[], &[])),
                        _ => None,
                    };
                    if let Some(reply) = reply {
                        if in_tx.send(reply).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        state
    }

    fn temperature_frame() -> Vec<u8> {
        // A5-02-05, raw TMP=100, learn bit set (data telegram)
        let telegram = Erp1Telegram::new(
            Rorg::Bs4,
            vec![0x00, 0x00, 0x64, 0x08],
            sender(0x0123_4567),
        );
        let pkt = telegram.to_esp3();
        assert_eq!(
            pkt.data,
            vec![0xA5, 0x00, 0x00, 0x64, 0x08, 0x01, 0x23, 0x45, 0x67, 0x00]
        );
        pkt.to_bytes()
    }

    #[tokio::test(start_paused = true)]
    async fn given_temperature_frame_then_state_changes_flow_end_to_end() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        gateway
            .add_device(sender(0x0123_4567), eep("A5-02-05"), None, Some("outside"))
            .unwrap();
        let log = record_state_changes(&gateway);

        in_tx.send(temperature_frame()).await.unwrap();
        settle().await;

        let log = log.lock().unwrap();
        let uids: Vec<_> = log.iter().map(|c| c.observable_uid).collect();
        // metadata first, then the profile's capabilities
        assert_eq!(
            uids,
            vec![
                observable::TELEGRAM_COUNT,
                observable::RSSI,
                observable::LAST_SEEN,
                observable::TEMPERATURE,
            ]
        );
        assert_eq!(log[0].value, Value::Int(1));
        let temperature = &log[3];
        assert!(
            matches!(temperature.value, Value::Float(v) if (v - 15.686).abs() < 0.01),
            "{:?}",
            temperature.value
        );
        assert_eq!(temperature.unit, Some("°C"));
    }

    #[tokio::test(start_paused = true)]
    async fn given_one_telegram_then_events_arrive_in_stable_order() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        gateway
            .add_device(sender(0x0123_4567), eep("A5-02-05"), None, None)
            .unwrap();

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let o = Arc::clone(&order);
        gateway.on_esp3_received(move |_| o.lock().unwrap().push("esp3"));
        let o = Arc::clone(&order);
        gateway.on_erp1_received(None, move |_| o.lock().unwrap().push("erp1"));
        let o = Arc::clone(&order);
        gateway.on_eep_message(None, move |_| o.lock().unwrap().push("eep"));
        let o = Arc::clone(&order);
        gateway.on_state_change(move |_| o.lock().unwrap().push("state"));

        in_tx.send(temperature_frame()).await.unwrap();
        settle().await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["esp3", "erp1", "eep", "state", "state", "state", "state"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn given_unknown_sender_then_new_device_fires_and_decode_fails() {
        let (gateway, _out_rx, in_tx) = test_gateway();

        let detected: Arc<Mutex<Vec<SenderAddress>>> = Arc::new(Mutex::new(Vec::new()));
        let d = Arc::clone(&detected);
        gateway.on_new_device(move |address| d.lock().unwrap().push(*address));
        let failures: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let f = Arc::clone(&failures);
        gateway.on_parsing_failed(move |message| f.lock().unwrap().push(message.to_string()));

        in_tx.send(temperature_frame()).await.unwrap();
        in_tx.send(temperature_frame()).await.unwrap();
        settle().await;

        // first contact only
        assert_eq!(*detected.lock().unwrap(), vec![sender(0x0123_4567)]);
        assert_eq!(gateway.detected_devices(), vec![sender(0x0123_4567)]);
        assert_eq!(failures.lock().unwrap().len(), 2);
        assert!(failures.lock().unwrap()[0].contains("no EEP"));
    }

    #[tokio::test(start_paused = true)]
    async fn given_addressed_telegram_then_eep_resolves_via_destination() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        let device = sender(0x050A_3D6A);
        gateway
            .add_device(device, eep("D2-05-00"), None, None)
            .unwrap();

        let messages: Arc<Mutex<Vec<EepMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let m = Arc::clone(&messages);
        gateway.on_eep_message(None, move |msg| m.lock().unwrap().push(msg.clone()));

        // another controller commanding our blinds: unknown sender, known
        // destination
        let mut telegram = Erp1Telegram::new(
            Rorg::Vld,
            vec![40, 0x00, 0x00, 0x01],
            sender(0x0102_0304),
        );
        telegram.destination = Some(Destination::Eurid(
            Eurid::from_number(0x050A_3D6A).unwrap(),
        ));
        in_tx.send(telegram.to_esp3().to_bytes()).await.unwrap();
        settle().await;

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].eep, eep("D2-05-00"));
        assert_eq!(messages[0].message_type.as_ref().unwrap().id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn given_module_then_base_id_and_write_cycles_are_read_once() {
        let (gateway, out_rx, in_tx) = test_gateway();
        spawn_module(out_rx, in_tx, [0xFF, 0x80, 0x00, 0x00], 10);

        let base = gateway.base_id().await.unwrap();
        assert_eq!(base, BaseAddress::from_number(0xFF80_0000).unwrap());
        assert_eq!(
            gateway.base_id_remaining_write_cycles().await.unwrap(),
            Some(10)
        );
        // second read is served from the cache
        assert_eq!(gateway.base_id().await.unwrap(), base);
    }

    #[tokio::test(start_paused = true)]
    async fn given_silent_module_then_send_times_out_with_empty_result() {
        let (gateway, _out_rx, _in_tx) = test_gateway();
        let result = gateway
            .send_esp3_packet(&CommonCommand::ReadIdBase.to_esp3())
            .await
            .unwrap();
        assert!(result.response.is_none());
        assert!(result.duration.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn given_two_concurrent_sends_then_they_complete_in_submission_order() {
        let (gateway, mut out_rx, in_tx) = test_gateway();

        // replies 1 to the first command, 2 to the second
        tokio::spawn(async move {
            let mut framer = InboundFramer::new();
            let mut counter = 0u8;
            while let Some(bytes) = out_rx.recv().await {
                framer.push(&bytes);
                while let Some(pkt) = framer.next_packet() {
                    if pkt.packet_type == PacketType::CommonCommand {
                        counter += 1;
                        let _ = in_tx.send(response_frame(0, &[counter], &[])).await;
                    }
                }
            }
        });

        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let g = gateway.clone();
        let o = Arc::clone(&order);
        let first = tokio::spawn(async move {
            let result = g
                .send_esp3_packet(&CommonCommand::ReadVersion.to_esp3())
                .await
                .unwrap();
            o.lock().unwrap().push(result.response.unwrap().response_data[0]);
        });
        let g = gateway.clone();
        let o = Arc::clone(&order);
        let second = tokio::spawn(async move {
            let result = g
                .send_esp3_packet(&CommonCommand::ReadIdBase.to_esp3())
                .await
                .unwrap();
            // the second sender never observes the first response
            o.lock().unwrap().push(result.response.unwrap().response_data[0]);
        });

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn given_cancelled_send_then_the_next_transaction_is_not_poisoned() {
        let (gateway, mut out_rx, in_tx) = test_gateway();

        let g = gateway.clone();
        let cancelled = tokio::spawn(async move {
            let _ = g
                .send_esp3_packet(&CommonCommand::ReadVersion.to_esp3())
                .await;
        });
        // let the command go out, then cancel the caller mid-await
        let _ = out_rx.recv().await;
        cancelled.abort();
        settle().await;

        // a late response to the cancelled transaction is dropped
        in_tx.send(response_frame(0, &[1], &[])).await.unwrap();
        settle().await;

        let responder_in = in_tx.clone();
        tokio::spawn(async move {
            let mut framer = InboundFramer::new();
            while let Some(bytes) = out_rx.recv().await {
                framer.push(&bytes);
                while let Some(pkt) = framer.next_packet() {
                    if pkt.packet_type == PacketType::CommonCommand {
                        let _ = responder_in.send(response_frame(0, &[2], &[])).await;
                    }
                }
            }
        });

        let result = gateway
            .send_esp3_packet(&CommonCommand::ReadIdBase.to_esp3())
            .await
            .unwrap();
        assert_eq!(result.response.unwrap().response_data, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn given_unexpected_response_then_it_is_broadcast_and_dropped() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        let responses: Arc<Mutex<Vec<ResponseTelegram>>> = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&responses);
        gateway.on_response_received(move |resp| r.lock().unwrap().push(resp.clone()));

        in_tx
            .send(response_frame(0, &[0xFF, 0x80, 0x00, 0x00], &[10]))
            .await
            .unwrap();
        settle().await;

        let responses = responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].return_code, ReturnCode::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn given_change_base_id_then_module_accepts_and_cache_refreshes() {
        let (gateway, out_rx, in_tx) = test_gateway();
        spawn_module(out_rx, in_tx, [0xFF, 0x80, 0x00, 0x00], 10);

        let new_base = BaseAddress::from_number(0xFF80_0080).unwrap();
        let reported = gateway
            .change_base_id(new_base, BASE_ID_SAFETY_FLAG)
            .await
            .unwrap();
        assert_eq!(reported, new_base);
        assert_eq!(gateway.base_id().await.unwrap(), new_base);

        // asking for the same base again is refused up front
        let again = gateway.change_base_id(new_base, BASE_ID_SAFETY_FLAG).await;
        assert!(matches!(&again, Err(BaseIdChangeError::SameAsCurrent)));
        assert_eq!(
            again.unwrap_err().to_string(),
            "New base ID is the same as the current base ID"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn given_wrong_safety_flag_then_change_base_id_refuses_without_traffic() {
        let (gateway, mut out_rx, _in_tx) = test_gateway();
        let new_base = BaseAddress::from_number(0xFF80_0080).unwrap();
        let result = gateway.change_base_id(new_base, 0x00).await;
        assert!(matches!(
            result,
            Err(BaseIdChangeError::InvalidSafetyFlag(0x00))
        ));
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn given_module_rejects_write_then_error_code_maps_to_variant() {
        let (gateway, mut out_rx, in_tx) = test_gateway();

        // a module that answers reads normally but refuses writes
        tokio::spawn(async move {
            let mut framer = InboundFramer::new();
            while let Some(bytes) = out_rx.recv().await {
                framer.push(&bytes);
                while let Some(pkt) = framer.next_packet() {
                    let reply = match pkt.data[0] {
                        0x08 => response_frame(0, &[0xFF, 0x80, 0x00, 0x00], &[0]),
                        0x07 => response_frame(0x23, &[], &[]),
                        _ => continue,
                    };
                    let _ = in_tx.send(reply).await;
                }
            }
        });

        let new_base = BaseAddress::from_number(0xFF80_0080).unwrap();
        let result = gateway.change_base_id(new_base, BASE_ID_SAFETY_FLAG).await;
        assert!(matches!(
            result,
            Err(BaseIdChangeError::WriteCyclesExhausted)
        ));
    }

    fn ute_query_frame() -> Vec<u8> {
        // bidirectional teach-in query claiming D2-05-00, response expected
        let telegram = Erp1Telegram::new(
            Rorg::Ute,
            vec![0x80, 0x01, 0x46, 0x00, 0x00, 0x05, 0xD2],
            sender(0x050A_3D6A),
        );
        telegram.to_esp3().to_bytes()
    }

    #[tokio::test(start_paused = true)]
    async fn given_learning_mode_with_auto_register_then_ute_query_adds_device_and_replies() {
        let (gateway, out_rx, in_tx) = test_gateway();
        spawn_module(out_rx, in_tx.clone(), [0xFF, 0x80, 0x00, 0x00], 10);
        gateway.set_teach_in_policy(TeachInPolicy::AutoRegister);
        gateway.start_learning(Duration::from_secs(60), false);

        let sent: Arc<Mutex<Vec<Esp3Packet>>> = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&sent);
        gateway.on_esp3_send(move |pkt| s.lock().unwrap().push(pkt.clone()));

        let teach_ins: Arc<Mutex<Vec<TeachInEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let t = Arc::clone(&teach_ins);
        gateway.on_teach_in(move |event| t.lock().unwrap().push(event.clone()));

        in_tx.send(ute_query_frame()).await.unwrap();
        settle().await;

        assert!(gateway.has_device(sender(0x050A_3D6A)));
        assert_eq!(teach_ins.lock().unwrap().len(), 1);

        // the gateway answered with an accepted teach-in response
        let sent = sent.lock().unwrap();
        let reply = sent
            .iter()
            .find(|pkt| pkt.packet_type == PacketType::RadioErp1)
            .expect("no teach-in response sent");
        assert_eq!(reply.data[0], 0xD4);
        assert_eq!(reply.data[1], 0xD1);
    }

    #[tokio::test(start_paused = true)]
    async fn given_learning_mode_off_then_ute_query_is_only_fanned_out() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        gateway.set_teach_in_policy(TeachInPolicy::AutoRegister);

        let utes: Arc<Mutex<Vec<UteMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let u = Arc::clone(&utes);
        gateway.on_ute_received(move |ute| u.lock().unwrap().push(ute.clone()));

        in_tx.send(ute_query_frame()).await.unwrap();
        settle().await;

        assert_eq!(utes.lock().unwrap().len(), 1);
        assert!(!gateway.has_device(sender(0x050A_3D6A)));
    }

    #[tokio::test(start_paused = true)]
    async fn given_learning_timeout_then_learning_stops_by_itself() {
        let (gateway, _out_rx, _in_tx) = test_gateway();
        gateway.start_learning(Duration::from_secs(30), false);
        assert!(gateway.is_learning());
        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert!(!gateway.is_learning());
    }

    #[tokio::test(start_paused = true)]
    async fn given_4bs_teach_in_with_known_profile_then_auto_register_adds_the_device() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        gateway.set_teach_in_policy(TeachInPolicy::AutoRegister);
        gateway.start_learning(Duration::from_secs(60), false);

        // FUNC 0x02 TYPE 0x05, Eltako manufacturer: no Eltako variant in
        // the catalog, the generic A5-02-05 profile applies
        let telegram = Erp1Telegram::new(
            Rorg::Bs4,
            vec![0x08, 0x28, 0x0D, 0x80],
            sender(0x0511_72F7),
        );
        in_tx.send(telegram.to_esp3().to_bytes()).await.unwrap();
        settle().await;

        assert!(gateway.has_device(sender(0x0511_72F7)));
    }

    #[tokio::test(start_paused = true)]
    async fn given_send_command_then_cover_telegram_goes_out_addressed() {
        let (gateway, out_rx, in_tx) = test_gateway();
        spawn_module(out_rx, in_tx, [0xFF, 0x80, 0x00, 0x00], 10);
        let device = sender(0x050A_3D6A);
        gateway
            .add_device(device, eep("D2-05-00"), None, Some("bedroom blinds"))
            .unwrap();

        let sent: Arc<Mutex<Vec<Esp3Packet>>> = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&sent);
        gateway.on_esp3_send(move |pkt| s.lock().unwrap().push(pkt.clone()));

        let result = gateway
            .send_device_command(device, DeviceCommand::set_cover_position(75, 50, 0), None)
            .await
            .unwrap();
        assert!(result.response.is_some());

        let sent = sent.lock().unwrap();
        let radio = sent
            .iter()
            .find(|pkt| pkt.packet_type == PacketType::RadioErp1)
            .expect("no radio packet sent");
        let telegram = Erp1Telegram::from_esp3(radio).unwrap();
        assert_eq!(telegram.rorg, Rorg::Vld);
        // sender fell back to the module base ID
        assert_eq!(telegram.sender, sender(0xFF80_0000));
        assert_eq!(
            telegram.destination,
            Some(Destination::Eurid(Eurid::from_number(0x050A_3D6A).unwrap()))
        );
        assert_eq!(telegram.telegram_data[3] & 0x0F, 1);
        assert_eq!(telegram.bitstring_raw_value(1, 7).unwrap(), 75);
    }

    #[tokio::test(start_paused = true)]
    async fn given_unknown_device_or_action_then_send_command_fails_synchronously() {
        let (gateway, _out_rx, _in_tx) = test_gateway();
        let device = sender(0x050A_3D6A);

        let unknown = gateway
            .send_device_command(device, DeviceCommand::stop_cover(0), None)
            .await;
        assert!(matches!(unknown, Err(GatewayError::UnknownDevice(_))));

        gateway
            .add_device(device, eep("D2-05-00"), None, None)
            .unwrap();
        let unsupported = gateway
            .send_device_command(device, DeviceCommand::dim(128, 0, true), None)
            .await;
        assert!(matches!(
            unsupported,
            Err(GatewayError::UnknownAction { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn given_removed_device_then_its_telegrams_no_longer_decode() {
        let (gateway, _out_rx, in_tx) = test_gateway();
        let address = sender(0x0123_4567);
        gateway
            .add_device(address, eep("A5-02-05"), None, None)
            .unwrap();
        gateway.remove_device(address).unwrap();
        assert!(matches!(
            gateway.remove_device(address),
            Err(GatewayError::UnknownDevice(_))
        ));

        let failures: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let f = Arc::clone(&failures);
        gateway.on_parsing_failed(move |message| f.lock().unwrap().push(message.to_string()));

        in_tx.send(temperature_frame()).await.unwrap();
        settle().await;
        assert_eq!(failures.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn given_sender_filter_then_only_matching_telegrams_are_delivered() {
        let (gateway, _out_rx, in_tx) = test_gateway();

        let matching: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let m = Arc::clone(&matching);
        gateway.on_erp1_received(Some(sender(0x0123_4567)), move |_| {
            *m.lock().unwrap() += 1;
        });
        let other: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let o = Arc::clone(&other);
        gateway.on_erp1_received(Some(sender(0x0765_4321)), move |_| {
            *o.lock().unwrap() += 1;
        });

        in_tx.send(temperature_frame()).await.unwrap();
        settle().await;

        assert_eq!(*matching.lock().unwrap(), 1);
        assert_eq!(*other.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn given_duplicate_or_unprofiled_device_then_add_device_fails() {
        let (gateway, _out_rx, _in_tx) = test_gateway();
        let address = sender(0x0123_4567);
        gateway
            .add_device(address, eep("A5-02-05"), None, None)
            .unwrap();
        assert!(matches!(
            gateway.add_device(address, eep("A5-02-05"), None, None),
            Err(GatewayError::DuplicateDevice(_))
        ));
        assert!(matches!(
            gateway.add_device(sender(0x02), EepId::new(0xA5, 0x7F, 0x7F), None, None),
            Err(GatewayError::UnknownEep(_))
        ));
    }
}
