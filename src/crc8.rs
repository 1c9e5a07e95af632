//! CRC-8 as used by ESP3.
//!
//! The EnOcean Serial Protocol covers both the frame header and the
//! data/optional-data region with a CRC-8 using polynomial 0x07,
//! initial value 0x00, no reflection and no final XOR.

const POLYNOMIAL: u8 = 0x07;

/// 256-entry lookup table, computed once at compile time.
static CRC8_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte = 0usize;
    while byte < 256 {
        let mut crc = byte as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

/// Incremental CRC-8 accumulator.
///
/// Useful when the checksummed region is split over several buffers
/// (ESP3 covers `data ‖ optional` with a single CRC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CRC8(u8);

impl CRC8 {
    /// Feed a single byte into the accumulator.
    pub fn update(self, byte: u8) -> Self {
        CRC8(CRC8_TABLE[(self.0 ^ byte) as usize])
    }

    /// Feed a whole buffer into the accumulator.
    pub fn extend(self, data: &[u8]) -> Self {
        data.iter().fold(self, |crc, &byte| crc.update(byte))
    }
}

impl From<&[u8]> for CRC8 {
    fn from(data: &[u8]) -> Self {
        CRC8::default().extend(data)
    }
}

impl From<CRC8> for u8 {
    fn from(crc: CRC8) -> u8 {
        crc.0
    }
}

/// One-shot CRC-8 over a buffer.
pub fn compute_crc8(data: &[u8]) -> u8 {
    CRC8::from(data).into()
}
