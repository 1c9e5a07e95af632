//! ERP1 radio telegrams carried in ESP3 `RadioErp1` packets.
//!
//! Layout of the ESP3 `data` region:
//!
//! | Size (Byte) |      1      |       n        |     4     |    1     |
//! |-------------|-------------|----------------|-----------|----------|
//! | Content     | RORG        | telegram data  | Sender ID | Status   |
//!
//! and of the `optional` region:
//!
//! | Size (Byte) |      1      |        4         |    1     |        1       |
//! |-------------|-------------|------------------|----------|----------------|
//! | Content     | Subtel nb   | Destination ID   | dBm      | Security level |
//!
//! The telegram data length is fixed per RORG. On top of the raw bytes,
//! [`Erp1Telegram`] offers the big-endian bitstring accessors the EEP
//! specifications are written against.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::address::{Destination, SenderAddress};
use crate::eep::id::{EepId, Manufacturer};
use crate::esp3::{Esp3Packet, PacketType};

/// Radio telegram family byte ("radio organization").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Rorg {
    Rps = 0xF6,
    Bs1 = 0xD5,
    Bs4 = 0xA5,
    Vld = 0xD2,
    Ute = 0xD4,
    Msc = 0xD1,
    Adt = 0xA6,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Erp1ParseError {
    #[error("not a RADIO_ERP1 packet ({0:?})")]
    WrongPacketType(PacketType),
    #[error("ERP1 data too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown RORG 0x{0:02X}")]
    UnknownRorg(u8),
    #[error("{rorg:?} telegram data must be {expected} byte(s), got {got}")]
    BadPayloadLength {
        rorg: Rorg,
        expected: &'static str,
        got: usize,
    },
    #[error("invalid sender address {0:08X}")]
    InvalidSender(u32),
    #[error("invalid destination address {0:08X}")]
    InvalidDestination(u32),
    #[error("not a {0} telegram")]
    WrongTelegramKind(&'static str),
}

/// Misuse of the bitstring accessors over `telegram_data`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BitFieldError {
    #[error("bit range {offset}+{size} exceeds telegram size of {total_bits} bits")]
    OutOfRange {
        offset: usize,
        size: usize,
        total_bits: usize,
    },
    #[error("bit field size must be 1..=64, got {0}")]
    BadSize(usize),
    #[error("value {value} does not fit in {size} bits")]
    ValueTooLarge { value: u64, size: usize },
    #[error("scaling requires range_max > range_min and scale_max > scale_min")]
    BadScaleBounds,
    #[error("range_max {range_max} does not fit in {size} bits")]
    RangeTooWide { range_max: u64, size: usize },
    #[error("data byte index {index} out of range for {len} byte(s)")]
    ByteIndex { index: usize, len: usize },
}

/// A decoded ERP1 radio telegram.
#[derive(Debug, Clone, PartialEq)]
pub struct Erp1Telegram {
    pub rorg: Rorg,
    pub telegram_data: Vec<u8>,
    pub sender: SenderAddress,
    pub status: u8,
    pub sub_tel_num: Option<u8>,
    pub rssi: Option<u8>,
    pub sec_level: Option<u8>,
    pub destination: Option<Destination>,
}

impl Erp1Telegram {
    /// Build a telegram for sending. Optional fields are left unset; the
    /// serializer fills in the ESP3 send defaults.
    pub fn new(rorg: Rorg, telegram_data: Vec<u8>, sender: SenderAddress) -> Self {
        Erp1Telegram {
            rorg,
            telegram_data,
            sender,
            status: 0x00,
            sub_tel_num: None,
            rssi: None,
            sec_level: None,
            destination: None,
        }
    }

    /// Data byte counted from the *end* of the telegram data, as EEP
    /// documents do (`DB0` is the last byte).
    pub fn data_byte(&self, index: usize) -> Result<u8, BitFieldError> {
        let len = self.telegram_data.len();
        if index >= len {
            return Err(BitFieldError::ByteIndex { index, len });
        }
        Ok(self.telegram_data[len - 1 - index])
    }

    fn check_bit_range(&self, offset: usize, size: usize) -> Result<(), BitFieldError> {
        if size == 0 || size > 64 {
            return Err(BitFieldError::BadSize(size));
        }
        let total_bits = self.telegram_data.len() * 8;
        if offset + size > total_bits {
            return Err(BitFieldError::OutOfRange {
                offset,
                size,
                total_bits,
            });
        }
        Ok(())
    }

    /// Read `size` bits at bit `offset`, counting from the most significant
    /// bit of the first data byte.
    pub fn bitstring_raw_value(&self, offset: usize, size: usize) -> Result<u64, BitFieldError> {
        self.check_bit_range(offset, size)?;
        let mut value: u64 = 0;
        for bit_index in offset..offset + size {
            let byte = self.telegram_data[bit_index / 8];
            let bit = (byte >> (7 - bit_index % 8)) & 1;
            value = (value << 1) | bit as u64;
        }
        Ok(value)
    }

    /// Write `size` bits at bit `offset`, leaving every other bit untouched.
    pub fn set_bitstring_raw_value(
        &mut self,
        offset: usize,
        size: usize,
        value: u64,
    ) -> Result<(), BitFieldError> {
        self.check_bit_range(offset, size)?;
        if size < 64 && value >= 1u64 << size {
            return Err(BitFieldError::ValueTooLarge { value, size });
        }
        for i in 0..size {
            let bit_index = offset + i;
            let bit = ((value >> (size - 1 - i)) & 1) as u8;
            let byte = &mut self.telegram_data[bit_index / 8];
            let mask = 1u8 << (7 - bit_index % 8);
            if bit != 0 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
        Ok(())
    }

    /// Read a bit field and project `range_min..range_max` linearly onto
    /// `scale_min..scale_max`, per the EEP scaling formula.
    pub fn bitstring_scaled_value(
        &self,
        offset: usize,
        size: usize,
        range_min: u64,
        range_max: u64,
        scale_min: f64,
        scale_max: f64,
    ) -> Result<f64, BitFieldError> {
        if range_max <= range_min || scale_max <= scale_min {
            return Err(BitFieldError::BadScaleBounds);
        }
        if size < 64 && range_max > (1u64 << size) - 1 {
            return Err(BitFieldError::RangeTooWide { range_max, size });
        }
        let raw = self.bitstring_raw_value(offset, size)?;
        let multiplier = (scale_max - scale_min) / (range_max - range_min) as f64;
        Ok(multiplier * (raw as f64 - range_min as f64) + scale_min)
    }

    /// True for 1BS/4BS telegrams whose learning bit reads 0 (the bit
    /// semantics are inverted: 0 means "teach-in").
    pub fn is_learning_telegram(&self) -> bool {
        let learn_bit = match self.rorg {
            Rorg::Bs1 => self.bitstring_raw_value(4, 1),
            Rorg::Bs4 => self.bitstring_raw_value(28, 1),
            _ => return false,
        };
        learn_bit == Ok(0)
    }

    pub fn from_esp3(pkt: &Esp3Packet) -> Result<Self, Erp1ParseError> {
        if pkt.packet_type != PacketType::RadioErp1 {
            return Err(Erp1ParseError::WrongPacketType(pkt.packet_type));
        }

        let data = &pkt.data;
        // RORG + at least no payload + sender + status
        if data.len() < 6 {
            return Err(Erp1ParseError::TooShort(data.len()));
        }

        let rorg =
            Rorg::try_from(data[0]).map_err(|_| Erp1ParseError::UnknownRorg(data[0]))?;
        let telegram_data = data[1..data.len() - 5].to_vec();

        let expected: Option<&'static str> = match (rorg, telegram_data.len()) {
            (Rorg::Rps, 1) | (Rorg::Bs1, 1) | (Rorg::Bs4, 4) => None,
            (Rorg::Rps, _) | (Rorg::Bs1, _) => Some("1"),
            (Rorg::Bs4, _) => Some("4"),
            (Rorg::Vld, 1..=14) | (Rorg::Msc, 1..=14) => None,
            (Rorg::Vld, _) | (Rorg::Msc, _) => Some("1..14"),
            _ => None,
        };
        if let Some(expected) = expected {
            return Err(Erp1ParseError::BadPayloadLength {
                rorg,
                expected,
                got: telegram_data.len(),
            });
        }

        let sender_bytes: [u8; 4] = data[data.len() - 5..data.len() - 1].try_into().unwrap();
        let sender = SenderAddress::from_bytes(sender_bytes)
            .map_err(|_| Erp1ParseError::InvalidSender(u32::from_be_bytes(sender_bytes)))?;
        let status = data[data.len() - 1];

        let opt = &pkt.optional;
        let sub_tel_num = opt.first().copied();
        let destination = if opt.len() > 4 {
            let dest_bytes: [u8; 4] = opt[1..5].try_into().unwrap();
            Some(Destination::from_bytes(dest_bytes).map_err(|_| {
                Erp1ParseError::InvalidDestination(u32::from_be_bytes(dest_bytes))
            })?)
        } else {
            None
        };
        let rssi = opt.get(5).copied();
        let sec_level = opt.get(6).copied();

        Ok(Erp1Telegram {
            rorg,
            telegram_data,
            sender,
            status,
            sub_tel_num,
            rssi,
            sec_level,
            destination,
        })
    }

    /// Wrap as an ESP3 packet, filling unset optional fields with the send
    /// defaults (3 subtelegrams, broadcast, RSSI 0xFF, no security).
    pub fn to_esp3(&self) -> Esp3Packet {
        let mut data = Vec::with_capacity(6 + self.telegram_data.len());
        data.push(self.rorg.into());
        data.extend_from_slice(&self.telegram_data);
        data.extend_from_slice(&self.sender.to_bytes());
        data.push(self.status);

        let mut optional = Vec::with_capacity(7);
        optional.push(self.sub_tel_num.unwrap_or(0x03));
        optional.extend_from_slice(
            &self
                .destination
                .unwrap_or(Destination::Broadcast)
                .to_bytes(),
        );
        optional.push(self.rssi.unwrap_or(0xFF));
        optional.push(self.sec_level.unwrap_or(0x00));

        Esp3Packet::new(PacketType::RadioErp1, data, optional)
    }
}

/// 4BS teach-in variation (bit 24 of the telegram data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum FourBsTeachInVariation {
    /// Variation 1: only the sender address is taught.
    ProfileLess = 0,
    /// Variation 2/3: the telegram carries FUNC/TYPE/manufacturer.
    WithProfile = 1,
}

/// Decoded 4BS teach-in telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FourBsTeachIn {
    pub variation: FourBsTeachInVariation,
    pub eep: Option<EepId>,
}

impl FourBsTeachIn {
    pub fn from_erp1(telegram: &Erp1Telegram) -> Result<Self, Erp1ParseError> {
        if telegram.rorg != Rorg::Bs4 {
            return Err(Erp1ParseError::WrongTelegramKind("4BS"));
        }
        if !telegram.is_learning_telegram() {
            return Err(Erp1ParseError::WrongTelegramKind("4BS teach-in"));
        }

        // the accessors cannot fail on a length-checked 4BS telegram
        let read = |offset, size| telegram.bitstring_raw_value(offset, size).unwrap_or(0);

        let variation = if read(24, 1) == 0 {
            FourBsTeachInVariation::ProfileLess
        } else {
            FourBsTeachInVariation::WithProfile
        };

        let eep = match variation {
            FourBsTeachInVariation::ProfileLess => None,
            FourBsTeachInVariation::WithProfile => {
                let func = read(0, 6) as u8;
                let ty = read(6, 7) as u8;
                let manufacturer = Manufacturer::from_id(read(13, 11) as u16);
                Some(EepId::with_manufacturer(0xA5, func, ty, manufacturer))
            }
        };

        Ok(FourBsTeachIn { variation, eep })
    }
}
