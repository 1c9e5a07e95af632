//! Universal Teach-in (UTE) messages, RORG 0xD4.
//!
//! The first telegram data byte carries the flags (bits counted from the
//! most significant bit):
//!
//! | Bits | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | communication during EEP operation (uni/bidirectional) |
//! | 1    | teach-in response expected / not expected           |
//! | 2–3  | request type (query) or response type (response)    |
//! | 4–7  | command: 0 = teach-in query, 1 = teach-in response  |
//!
//! The claimed EEP sits at the end of the telegram data: DB2/DB1/DB0 hold
//! TYPE/FUNC/RORG, DB4 and the low bits of DB3 the manufacturer ID, DB5
//! the channel count.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::address::SenderAddress;
use crate::eep::id::EepId;
use crate::erp1::{Erp1Telegram, Rorg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommunicationMode {
    Unidirectional = 0,
    Bidirectional = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ResponseExpectation {
    Expected = 0,
    NotExpected = 1,
}

/// Request type of a teach-in query (flag bits 2–3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UteQueryType {
    TeachIn = 0,
    TeachInDeletion = 1,
    TeachInOrDeletion = 2,
    NotUsed = 3,
}

/// Response type of a teach-in response (flag bits 2–3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UteResponseType {
    NotAccepted = 0,
    AcceptedTeachIn = 1,
    AcceptedDeletion = 2,
    EepNotSupported = 3,
}

/// What flag bits 2–3 mean depends on the command in bits 4–7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UteRequest {
    Query(UteQueryType),
    Response(UteResponseType),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UteParseError {
    #[error("not a UTE telegram")]
    WrongRorg,
    #[error("UTE telegram data too short: {0} byte(s), expected at least 6")]
    TooShort(usize),
    #[error("unknown UTE command {0}")]
    UnknownCommand(u8),
    #[error("cannot build a response for a message that is not a query")]
    NotAQuery,
}

/// A decoded UTE teach-in query or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UteMessage {
    pub communication_mode: CommunicationMode,
    /// Only meaningful on queries; responses leave it unset.
    pub response_expectation: Option<ResponseExpectation>,
    pub request: UteRequest,
    pub channel_count: u8,
    pub manufacturer_id: u16,
    /// The EEP the device claims to speak.
    pub eep: EepId,
}

impl UteMessage {
    pub fn is_query(&self) -> bool {
        matches!(self.request, UteRequest::Query(_))
    }

    pub fn from_erp1(telegram: &Erp1Telegram) -> Result<Self, UteParseError> {
        if telegram.rorg != Rorg::Ute {
            return Err(UteParseError::WrongRorg);
        }
        if telegram.telegram_data.len() < 6 {
            return Err(UteParseError::TooShort(telegram.telegram_data.len()));
        }

        // length is checked above, the bit accessors cannot fail
        let read = |offset, size| telegram.bitstring_raw_value(offset, size).unwrap_or(0) as u8;
        let byte = |index| telegram.data_byte(index).unwrap_or(0);

        let communication_mode = CommunicationMode::try_from(read(0, 1))
            .unwrap_or(CommunicationMode::Unidirectional);

        let command = read(4, 4);
        let request_bits = read(2, 2);
        let (request, response_expectation) = match command {
            0 => (
                UteRequest::Query(
                    UteQueryType::try_from(request_bits).unwrap_or(UteQueryType::NotUsed),
                ),
                Some(
                    ResponseExpectation::try_from(read(1, 1))
                        .unwrap_or(ResponseExpectation::Expected),
                ),
            ),
            1 => (
                UteRequest::Response(
                    UteResponseType::try_from(request_bits)
                        .unwrap_or(UteResponseType::NotAccepted),
                ),
                None,
            ),
            other => return Err(UteParseError::UnknownCommand(other)),
        };

        Ok(UteMessage {
            communication_mode,
            response_expectation,
            request,
            channel_count: byte(5),
            manufacturer_id: byte(4) as u16 | ((byte(3) as u16 & 0x07) << 8),
            eep: EepId::new(byte(0), byte(1), byte(2)),
        })
    }

    /// Build the response to a teach-in query, echoing its EEP, channel
    /// count and bidirectionality.
    pub fn response_for_query(
        query: &UteMessage,
        response_type: UteResponseType,
    ) -> Result<UteMessage, UteParseError> {
        if !query.is_query() {
            return Err(UteParseError::NotAQuery);
        }
        Ok(UteMessage {
            communication_mode: query.communication_mode,
            response_expectation: None,
            request: UteRequest::Response(response_type),
            channel_count: query.channel_count,
            manufacturer_id: query.manufacturer_id,
            eep: query.eep,
        })
    }

    /// Encode into a UTE radio telegram originating from `sender`.
    pub fn to_erp1(&self, sender: SenderAddress) -> Erp1Telegram {
        let (command, request_bits): (u8, u8) = match self.request {
            UteRequest::Query(q) => (0, q.into()),
            UteRequest::Response(r) => (1, r.into()),
        };
        // a message without a response expectation does not want one
        let expectation_bit: u8 = match self.response_expectation {
            Some(e) => e.into(),
            None => ResponseExpectation::NotExpected.into(),
        };

        let flags = (u8::from(self.communication_mode) << 7)
            | (expectation_bit << 6)
            | (request_bits << 4)
            | command;

        let telegram_data = vec![
            flags,
            self.channel_count,
            (self.manufacturer_id & 0xFF) as u8,
            (self.manufacturer_id >> 8) as u8 & 0x07,
            self.eep.ty,
            self.eep.func,
            self.eep.rorg,
        ];

        Erp1Telegram::new(Rorg::Ute, telegram_data, sender)
    }
}
