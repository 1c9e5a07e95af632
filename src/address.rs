//! EnOcean 32-bit addresses.
//!
//! Every radio participant is identified by a 32-bit value printed as
//! `XX:XX:XX:XX`. Three disjoint ranges partition the address space:
//!
//! | Range                       | Meaning                                  |
//! |-----------------------------|------------------------------------------|
//! | `00:00:00:00`–`FF:7F:FF:FF` | [`Eurid`], globally unique per device    |
//! | `FF:80:00:00`–`FF:FF:FF:80` | [`BaseAddress`], 128-aligned module base |
//! | `FF:FF:FF:FF`               | broadcast                                |
//!
//! A [`SenderAddress`] is either a EURID or a base address; a telegram
//! destination is either a EURID or broadcast.

use std::fmt;

use thiserror::Error;

const EURID_MAX: u32 = 0xFF7F_FFFF;
const BASE_MIN: u32 = 0xFF80_0000;
const BASE_MAX: u32 = 0xFFFF_FF80;
const BROADCAST: u32 = 0xFFFF_FFFF;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address string {0:?}, expected XX:XX:XX:XX")]
    Malformed(String),
    #[error("{0:08X} is neither a EURID, a base address nor the broadcast address")]
    Unclassifiable(u32),
    #[error("{0:08X} is not a EURID")]
    NotAEurid(u32),
    #[error("base address {0:08X} must lie in FF:80:00:00..FF:FF:FF:80 and be 128-aligned")]
    NotABaseAddress(u32),
    #[error("{0:08X} is not a valid sender address")]
    NotASender(u32),
    #[error("{0:08X} is not a valid destination address")]
    NotADestination(u32),
}

fn format_u32(value: u32, f: &mut fmt::Formatter) -> fmt::Result {
    let b = value.to_be_bytes();
    write!(f, "{:02X}:{:02X}:{:02X}:{:02X}", b[0], b[1], b[2], b[3])
}

fn parse_u32(s: &str) -> Result<u32, AddressError> {
    let malformed = || AddressError::Malformed(s.to_string());
    let mut bytes = [0u8; 4];
    let mut parts = s.split(':');
    for byte in bytes.iter_mut() {
        let part = parts.next().ok_or_else(malformed)?;
        if part.len() != 2 {
            return Err(malformed());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
    }
    if parts.next().is_some() {
        return Err(malformed());
    }
    Ok(u32::from_be_bytes(bytes))
}

/// A raw 32-bit EnOcean address, before range classification.
///
/// `Address` accepts any 32-bit value; use the `is_*` predicates or the
/// typed wrappers ([`Eurid`], [`BaseAddress`], [`SenderAddress`]) when the
/// range matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(u32);

impl Address {
    pub fn from_number(value: u32) -> Self {
        Address(value)
    }

    /// Big-endian byte order, as on the wire.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Address(u32::from_be_bytes(bytes))
    }

    pub fn from_string(s: &str) -> Result<Self, AddressError> {
        parse_u32(s).map(Address)
    }

    pub fn broadcast() -> Self {
        Address(BROADCAST)
    }

    pub fn to_number(self) -> u32 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn is_eurid(self) -> bool {
        self.0 <= EURID_MAX
    }

    /// True only for the reserved base-ID range with the low 7 bits zero.
    pub fn is_base_address(self) -> bool {
        (BASE_MIN..=BASE_MAX).contains(&self.0) && self.0 & 0x7F == 0
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == BROADCAST
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        format_u32(self.0, f)
    }
}

/// EnOcean Unique Radio ID, the factory-assigned per-device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eurid(u32);

impl Eurid {
    pub fn from_number(value: u32) -> Result<Self, AddressError> {
        if value <= EURID_MAX {
            Ok(Eurid(value))
        } else {
            Err(AddressError::NotAEurid(value))
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self, AddressError> {
        Self::from_number(u32::from_be_bytes(bytes))
    }

    pub fn from_string(s: &str) -> Result<Self, AddressError> {
        Self::from_number(parse_u32(s)?)
    }

    pub fn to_number(self) -> u32 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Eurid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        format_u32(self.0, f)
    }
}

/// A module base ID.
///
/// A module owns 128 consecutive virtual sender addresses starting at its
/// base, so a valid base is always 128-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BaseAddress(u32);

impl BaseAddress {
    pub fn from_number(value: u32) -> Result<Self, AddressError> {
        if (BASE_MIN..=BASE_MAX).contains(&value) && value & 0x7F == 0 {
            Ok(BaseAddress(value))
        } else {
            Err(AddressError::NotABaseAddress(value))
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self, AddressError> {
        Self::from_number(u32::from_be_bytes(bytes))
    }

    pub fn from_string(s: &str) -> Result<Self, AddressError> {
        Self::from_number(parse_u32(s)?)
    }

    pub fn to_number(self) -> u32 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for BaseAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        format_u32(self.0, f)
    }
}

/// The address a telegram originates from: a device EURID or a module base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderAddress {
    Eurid(Eurid),
    Base(BaseAddress),
}

impl SenderAddress {
    pub fn from_number(value: u32) -> Result<Self, AddressError> {
        let addr = Address::from_number(value);
        if addr.is_eurid() {
            Ok(SenderAddress::Eurid(Eurid(value)))
        } else if addr.is_base_address() {
            Ok(SenderAddress::Base(BaseAddress(value)))
        } else {
            Err(AddressError::NotASender(value))
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self, AddressError> {
        Self::from_number(u32::from_be_bytes(bytes))
    }

    pub fn from_string(s: &str) -> Result<Self, AddressError> {
        Self::from_number(parse_u32(s)?)
    }

    pub fn to_number(self) -> u32 {
        match self {
            SenderAddress::Eurid(e) => e.to_number(),
            SenderAddress::Base(b) => b.to_number(),
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.to_number().to_be_bytes()
    }
}

impl From<Eurid> for SenderAddress {
    fn from(eurid: Eurid) -> Self {
        SenderAddress::Eurid(eurid)
    }
}

impl From<BaseAddress> for SenderAddress {
    fn from(base: BaseAddress) -> Self {
        SenderAddress::Base(base)
    }
}

impl fmt::Display for SenderAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        format_u32(self.to_number(), f)
    }
}

/// The address a telegram is directed at: a device EURID or everybody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Eurid(Eurid),
    Broadcast,
}

impl Destination {
    pub fn from_number(value: u32) -> Result<Self, AddressError> {
        if value == BROADCAST {
            Ok(Destination::Broadcast)
        } else if value <= EURID_MAX {
            Ok(Destination::Eurid(Eurid(value)))
        } else {
            Err(AddressError::NotADestination(value))
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self, AddressError> {
        Self::from_number(u32::from_be_bytes(bytes))
    }

    pub fn to_number(self) -> u32 {
        match self {
            Destination::Eurid(e) => e.to_number(),
            Destination::Broadcast => BROADCAST,
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.to_number().to_be_bytes()
    }

    pub fn is_broadcast(self) -> bool {
        matches!(self, Destination::Broadcast)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Destination::Broadcast => write!(f, "*"),
            Destination::Eurid(e) => e.fmt(f),
        }
    }
}
