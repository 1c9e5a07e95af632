//! Common commands sent to the module and RESPONSE packets coming back.
//!
//! A RESPONSE packet carries a return code, response data and optional
//! data:
//!
//! | Size (Byte) |      1      |        n        |   opt    |
//! |-------------|-------------|-----------------|----------|
//! | Content     | Return code | Response data   | Optional |
//!
//! Only the common commands the gateway needs are modelled; everything
//! else can be sent as a raw [`Esp3Packet`].

use std::fmt;

use num_enum::FromPrimitive;
use thiserror::Error;

use crate::address::{BaseAddress, Eurid};
use crate::esp3::{Esp3Packet, PacketType};

/// Return code of a RESPONSE packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ReturnCode {
    Ok = 0x00,
    Error = 0x01,
    NotSupported = 0x02,
    WrongParam = 0x03,
    OperationDenied = 0x04,
    LockSet = 0x05,
    BufferTooSmall = 0x06,
    NoFreeBuffer = 0x07,
    BaseIdOutOfRange = 0x22,
    BaseIdMaxReached = 0x23,
    #[num_enum(catch_all)]
    Other(u8),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponseParseError {
    #[error("not a RESPONSE packet ({0:?})")]
    WrongPacketType(PacketType),
    #[error("empty RESPONSE packet")]
    Empty,
    #[error("version response too short: {0} bytes")]
    VersionTooShort(usize),
    #[error("invalid chip EURID in version response")]
    InvalidEurid,
}

/// A decoded RESPONSE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTelegram {
    pub return_code: ReturnCode,
    pub response_data: Vec<u8>,
    pub optional_data: Vec<u8>,
}

impl ResponseTelegram {
    pub fn from_esp3(pkt: &Esp3Packet) -> Result<Self, ResponseParseError> {
        if pkt.packet_type != PacketType::Response {
            return Err(ResponseParseError::WrongPacketType(pkt.packet_type));
        }
        let Some(&code) = pkt.data.first() else {
            return Err(ResponseParseError::Empty);
        };
        Ok(ResponseTelegram {
            return_code: ReturnCode::from(code),
            response_data: pkt.data[1..].to_vec(),
            optional_data: pkt.optional.clone(),
        })
    }
}

/// The common commands this crate issues itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonCommand {
    /// `CO_RD_VERSION` (0x03)
    ReadVersion,
    /// `CO_WR_IDBASE` (0x07)
    WriteIdBase(BaseAddress),
    /// `CO_RD_IDBASE` (0x08)
    ReadIdBase,
}

impl CommonCommand {
    pub fn code(&self) -> u8 {
        match self {
            CommonCommand::ReadVersion => 0x03,
            CommonCommand::WriteIdBase(_) => 0x07,
            CommonCommand::ReadIdBase => 0x08,
        }
    }

    pub fn to_esp3(&self) -> Esp3Packet {
        let mut data = vec![self.code()];
        if let CommonCommand::WriteIdBase(base) = self {
            data.extend_from_slice(&base.to_bytes());
        }
        Esp3Packet::new(PacketType::CommonCommand, data, Vec::new())
    }
}

/// One dotted component group of the module version report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionIdentifier {
    pub main: u8,
    pub beta: u8,
    pub alpha: u8,
    pub build: u8,
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.main, self.beta, self.alpha, self.build)
    }
}

/// Decoded `CO_RD_VERSION` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub app_version: VersionIdentifier,
    pub api_version: VersionIdentifier,
    pub eurid: Eurid,
    pub device_version: u8,
    pub app_description: String,
}

impl VersionInfo {
    pub fn from_response(response: &ResponseTelegram) -> Result<Self, ResponseParseError> {
        let d = &response.response_data;
        if d.len() < 32 {
            return Err(ResponseParseError::VersionTooShort(d.len()));
        }

        let eurid = Eurid::from_bytes(d[8..12].try_into().unwrap())
            .map_err(|_| ResponseParseError::InvalidEurid)?;

        let description_bytes: Vec<u8> = d[16..32]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect();
        let app_description = String::from_utf8_lossy(&description_bytes).into_owned();

        Ok(VersionInfo {
            app_version: VersionIdentifier {
                main: d[0],
                beta: d[1],
                alpha: d[2],
                build: d[3],
            },
            api_version: VersionIdentifier {
                main: d[4],
                beta: d[5],
                alpha: d[6],
                build: d[7],
            },
            eurid,
            device_version: d[12],
            app_description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esp3::InboundFramer;

    #[test]
    fn given_common_commands_then_codes_match_the_specification() {
        assert_eq!(CommonCommand::ReadVersion.code(), 0x03);
        assert_eq!(
            CommonCommand::WriteIdBase(BaseAddress::from_number(0xFF80_0000).unwrap()).code(),
            0x07
        );
        assert_eq!(CommonCommand::ReadIdBase.code(), 0x08);
    }

    #[test]
    fn given_read_idbase_then_packet_has_code_only() {
        let pkt = CommonCommand::ReadIdBase.to_esp3();
        assert_eq!(pkt.packet_type, PacketType::CommonCommand);
        assert_eq!(pkt.data, vec![0x08]);
        assert!(pkt.optional.is_empty());
    }

    #[test]
    fn given_write_idbase_then_packet_carries_the_new_base() {
        let base = BaseAddress::from_number(0xFF80_0080).unwrap();
        let pkt = CommonCommand::WriteIdBase(base).to_esp3();
        assert_eq!(pkt.data, vec![0x07, 0xFF, 0x80, 0x00, 0x80]);
    }

    #[test]
    fn given_recorded_idbase_response_then_base_and_write_cycles_decode() {
        // recorded USB300 answer to CO_RD_IDBASE
        let frame = vec![85, 0, 5, 1, 2, 219, 0, 255, 155, 18, 128, 10, 17];
        let mut framer = InboundFramer::new();
        framer.push(&frame);
        let pkt = framer.next_packet().unwrap();
        let response = ResponseTelegram::from_esp3(&pkt).unwrap();
        assert_eq!(response.return_code, ReturnCode::Ok);
        assert_eq!(response.response_data, vec![255, 155, 18, 128]);
        assert_eq!(response.optional_data, vec![10]);
    }

    #[test]
    fn given_unknown_return_code_then_it_is_preserved() {
        let pkt = Esp3Packet::new(PacketType::Response, vec![0x99], vec![]);
        let response = ResponseTelegram::from_esp3(&pkt).unwrap();
        assert_eq!(response.return_code, ReturnCode::Other(0x99));
    }

    #[test]
    fn given_base_id_return_codes_then_they_map_to_variants() {
        assert_eq!(ReturnCode::from(0x22), ReturnCode::BaseIdOutOfRange);
        assert_eq!(ReturnCode::from(0x23), ReturnCode::BaseIdMaxReached);
    }

    #[test]
    fn given_version_response_then_all_fields_decode() {
        let mut data = vec![
            2, 11, 1, 0, // app version
            2, 6, 3, 0, // api version
            0x01, 0x9B, 0x12, 0x80, // chip EURID
            0x45, 0, 0, 0, // chip version
        ];
        data.extend_from_slice(b"GATEWAYCTRL\0\0\0\0\0");
        let response = ResponseTelegram {
            return_code: ReturnCode::Ok,
            response_data: data,
            optional_data: vec![],
        };
        let info = VersionInfo::from_response(&response).unwrap();
        assert_eq!(info.app_version.to_string(), "2.11.1.0");
        assert_eq!(info.api_version.to_string(), "2.6.3.0");
        assert_eq!(info.eurid, Eurid::from_number(0x019B_1280).unwrap());
        assert_eq!(info.device_version, 0x45);
        assert_eq!(info.app_description, "GATEWAYCTRL");
    }

    #[test]
    fn given_short_version_response_then_decode_fails() {
        let response = ResponseTelegram {
            return_code: ReturnCode::Ok,
            response_data: vec![0; 16],
            optional_data: vec![],
        };
        assert_eq!(
            VersionInfo::from_response(&response),
            Err(ResponseParseError::VersionTooShort(16))
        );
    }
}
