//! # EnOcean ESP3 gateway for the Rust Programming Language
//!
//! EnOcean ([official website](https://www.enocean.com/en/)) is a family of
//! sub-GHz radio protocols for energy-harvesting Smart Home / Building
//! devices. This crate drives an EnOcean radio gateway module (eg. the
//! [USB300](https://www.enocean.com/en/enocean-modules/details/usb-300-oem/))
//! over the EnOcean Serial Protocol version 3
//! ([ESP3](https://www.enocean.com/esp)) and turns raw radio traffic into
//! device-level state changes and commands.
//!
//! ## Layers
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`esp3`] | byte stream ⇄ CRC-checked ESP3 packets, resynchronization |
//! | [`erp1`] | ESP3 radio packets ⇄ ERP1 telegrams, bitstring accessors |
//! | [`command`] | common commands and RESPONSE decoding |
//! | [`ute`] | Universal Teach-in queries and responses |
//! | [`eep`] | declarative profiles and the generic decode/encode engine |
//! | [`capability`] | per-device interpreters emitting [`StateChange`]s |
//! | [`gateway`] | device registry, dispatch, learning mode, transactions |
//! | [`port`] | serial transport bridge (57600 8N1) |
//!
//! ## Getting started
//!
//! ```no_run
//! use enocean_gateway::{EepId, Gateway, SenderAddress};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::open("/dev/ttyUSB0")?;
//! gateway.add_device(
//!     SenderAddress::from_string("05:11:72:F7")?,
//!     EepId::from_string("A5-04-01")?,
//!     None,
//!     Some("living room climate"),
//! )?;
//! gateway.on_state_change(|change| println!("{change}"));
//! println!("module base ID: {}", gateway.base_id().await?);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod capability;
pub mod command;
pub mod crc8;
pub mod device;
pub mod eep;
pub mod erp1;
pub mod esp3;
pub mod gateway;
pub mod port;
pub mod ute;

pub use address::{Address, AddressError, BaseAddress, Destination, Eurid, SenderAddress};
pub use capability::{
    Capability, DeviceCommand, StateChange, StateChangeSink, StateChangeSource,
};
pub use command::{
    CommonCommand, ResponseTelegram, ReturnCode, VersionIdentifier, VersionInfo,
};
pub use crc8::compute_crc8;
pub use device::{find_device_type, Device, DeviceType, DEVICE_CATALOG};
pub use eep::{EepHandler, EepId, EepMessage, EepSpecification, Manufacturer, Value};
pub use erp1::{Erp1Telegram, FourBsTeachIn, Rorg};
pub use esp3::{Esp3Packet, InboundFramer, PacketType};
pub use gateway::{
    BaseIdChangeError, Gateway, GatewayError, SendResult, TeachInEvent, TeachInPolicy,
};
pub use port::SerialLink;
pub use ute::{UteMessage, UteRequest, UteResponseType};
