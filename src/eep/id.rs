//! EEP identifiers: the `(RORG, FUNC, TYPE)` triple naming an EnOcean
//! Equipment Profile, optionally tagged with a manufacturer for
//! vendor-specific field layouts.

use std::fmt;

use thiserror::Error;

/// EnOcean manufacturer ID, as carried in teach-in telegrams.
///
/// Only the manufacturers with profile variants in this crate get a named
/// variant; everything else is kept as its raw ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Manufacturer {
    EnOcean,
    Eltako,
    NodOn,
    Unknown(u16),
}

impl Manufacturer {
    pub fn from_id(id: u16) -> Self {
        match id {
            0x00B => Manufacturer::EnOcean,
            0x00D => Manufacturer::Eltako,
            0x046 => Manufacturer::NodOn,
            other => Manufacturer::Unknown(other),
        }
    }

    pub fn id(&self) -> u16 {
        match self {
            Manufacturer::EnOcean => 0x00B,
            Manufacturer::Eltako => 0x00D,
            Manufacturer::NodOn => 0x046,
            Manufacturer::Unknown(id) => *id,
        }
    }

    fn name(&self) -> Option<&'static str> {
        match self {
            Manufacturer::EnOcean => Some("ENOCEAN"),
            Manufacturer::Eltako => Some("ELTAKO"),
            Manufacturer::NodOn => Some("NODON"),
            Manufacturer::Unknown(_) => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ENOCEAN" => Some(Manufacturer::EnOcean),
            "ELTAKO" => Some(Manufacturer::Eltako),
            "NODON" => Some(Manufacturer::NodOn),
            _ => None,
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:03X}", self.id()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid EEP string {0:?}, expected RR-FF-TT or RR-FF-TT.MANUFACTURER")]
pub struct EepIdParseError(String);

/// An EEP identifier, printed `A5-08-01` or `A5-08-01.ELTAKO`.
///
/// Two ids are equal iff RORG, FUNC, TYPE *and* manufacturer tag all match;
/// a manufacturer variant is a different profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EepId {
    pub rorg: u8,
    pub func: u8,
    pub ty: u8,
    pub manufacturer: Option<Manufacturer>,
}

impl EepId {
    pub const fn new(rorg: u8, func: u8, ty: u8) -> Self {
        EepId {
            rorg,
            func,
            ty,
            manufacturer: None,
        }
    }

    pub const fn with_manufacturer(rorg: u8, func: u8, ty: u8, manufacturer: Manufacturer) -> Self {
        EepId {
            rorg,
            func,
            ty,
            manufacturer: Some(manufacturer),
        }
    }

    pub fn from_string(s: &str) -> Result<Self, EepIdParseError> {
        let malformed = || EepIdParseError(s.to_string());

        let (triple, manufacturer) = match s.split_once('.') {
            Some((triple, name)) => (
                triple,
                Some(Manufacturer::from_name(name).ok_or_else(malformed)?),
            ),
            None => (s, None),
        };

        let parts: Vec<&str> = triple.split('-').collect();
        if parts.len() != 3 {
            return Err(malformed());
        }
        let parse = |part: &str| u8::from_str_radix(part, 16).map_err(|_| malformed());
        let (rorg, func, ty) = (parse(parts[0])?, parse(parts[1])?, parse(parts[2])?);

        Ok(EepId {
            rorg,
            func,
            ty,
            manufacturer,
        })
    }
}

impl fmt::Display for EepId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X}-{:02X}-{:02X}", self.rorg, self.func, self.ty)?;
        if let Some(manufacturer) = self.manufacturer {
            write!(f, ".{manufacturer}")?;
        }
        Ok(())
    }
}
