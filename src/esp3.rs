//! ESP3 framing: byte stream ⇄ typed packets.
//!
//! An ESP3 frame looks like this on the wire:
//!
//! | Size (Byte) |   1    |       2    |      1     |    1     |     1     | DataLen + OptLen |      1      |
//! |-------------|--------|------------|------------|----------|-----------|------------------|-------------|
//! | Content     | 0x55   | u16DataLen | u8OptLen   | u8Type   | CRC8H     | DATA + OPT DATA  |     CRC8D   |
//!
//! [`InboundFramer`] turns an arbitrarily chunked byte stream into
//! [`Esp3Packet`]s and re-synchronizes after corruption;
//! [`Esp3Packet::to_bytes`] is the inverse.

use log::warn;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::crc8::{compute_crc8, CRC8};

pub const SYNC_BYTE: u8 = 0x55;

/// ESP3 packet type identifier (5th byte of the frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PacketType {
    RadioErp1 = 0x01,
    Response = 0x02,
    RadioSubTel = 0x03,
    Event = 0x04,
    CommonCommand = 0x05,
    SmartAck = 0x06,
    RemoteMan = 0x07,
    RadioMessage = 0x09,
    RadioErp2 = 0x0A,
    Radio802_15_4 = 0x10,
    Command2_4 = 0x11,
}

/// A CRC-checked ESP3 packet.
///
/// The layout of `data` and `optional` depends on `packet_type`; see the
/// [`erp1`](crate::erp1) and [`command`](crate::command) modules for the
/// two layouts this crate interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Esp3Packet {
    pub packet_type: PacketType,
    pub data: Vec<u8>,
    pub optional: Vec<u8>,
}

impl Esp3Packet {
    pub fn new(packet_type: PacketType, data: Vec<u8>, optional: Vec<u8>) -> Self {
        Esp3Packet {
            packet_type,
            data,
            optional,
        }
    }

    /// Serialize into a complete frame, sync byte and CRCs included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = [
            (self.data.len() >> 8) as u8,
            self.data.len() as u8,
            self.optional.len() as u8,
            self.packet_type.into(),
        ];

        let mut frame = Vec::with_capacity(7 + self.data.len() + self.optional.len());
        frame.push(SYNC_BYTE);
        frame.extend_from_slice(&header);
        frame.push(compute_crc8(&header));
        frame.extend_from_slice(&self.data);
        frame.extend_from_slice(&self.optional);
        frame.push(CRC8::from(&self.data[..]).extend(&self.optional).into());
        frame
    }
}

/// Incremental ESP3 frame parser.
///
/// Feed received chunks with [`push`](Self::push), then drain packets with
/// [`next_packet`](Self::next_packet). Partial frames stay in the buffer
/// until completed by later chunks.
///
/// Re-synchronization policy on corruption: scan to the next sync byte,
/// and whenever either CRC check fails drop just the sync byte and rescan.
/// Every iteration consumes at least one byte, so the parser always makes
/// progress and recovers with at most one lost frame per corrupted byte.
#[derive(Debug, Default)]
pub struct InboundFramer {
    buffer: Vec<u8>,
}

impl InboundFramer {
    pub fn new() -> Self {
        InboundFramer::default()
    }

    /// Append a received chunk to the internal buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Try to extract the next complete frame from the buffer.
    ///
    /// Returns `None` when the buffer holds no complete frame (yet).
    pub fn next_packet(&mut self) -> Option<Esp3Packet> {
        loop {
            // synchronize: discard anything before the next sync byte
            match self.buffer.iter().position(|&b| b == SYNC_BYTE) {
                Some(0) => {}
                Some(n) => {
                    self.buffer.drain(..n);
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }

            // sync + header + header CRC
            if self.buffer.len() < 6 {
                return None;
            }

            // a bad header CRC may mean a false sync byte: skip it and rescan
            if compute_crc8(&self.buffer[1..5]) != self.buffer[5] {
                self.buffer.drain(..1);
                continue;
            }

            let data_len = ((self.buffer[1] as usize) << 8) | self.buffer[2] as usize;
            let opt_len = self.buffer[3] as usize;
            let total_len = 7 + data_len + opt_len;

            if self.buffer.len() < total_len {
                return None;
            }

            if compute_crc8(&self.buffer[6..6 + data_len + opt_len]) != self.buffer[total_len - 1]
            {
                self.buffer.drain(..1);
                continue;
            }

            let packet_type = match PacketType::try_from(self.buffer[4]) {
                Ok(pt) => pt,
                Err(_) => {
                    warn!(
                        "dropping frame with unknown packet type 0x{:02X}",
                        self.buffer[4]
                    );
                    self.buffer.drain(..total_len);
                    continue;
                }
            };

            let data = self.buffer[6..6 + data_len].to_vec();
            let optional = self.buffer[6 + data_len..6 + data_len + opt_len].to_vec();
            self.buffer.drain(..total_len);

            return Some(Esp3Packet {
                packet_type,
                data,
                optional,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // recorded telegram of a temperature / humidity sensor (EEP A5-04-01)
    const A5_04_01_FRAME: [u8; 24] = [
        85, 0, 10, 7, 1, 235, 165, 16, 8, 70, 128, 5, 17, 114, 247, 0, 1, 255, 255, 255, 255, 65,
        0, 235,
    ];
    // recorded telegram of a rocker pushbutton (EEP F6-02-01)
    const F6_02_01_FRAME: [u8; 21] = [
        85, 0, 7, 7, 1, 122, 246, 0, 254, 245, 143, 212, 32, 2, 255, 255, 255, 255, 48, 0, 39,
    ];

    fn parse_all(bytes: &[u8]) -> Vec<Esp3Packet> {
        let mut framer = InboundFramer::new();
        framer.push(bytes);
        let mut packets = Vec::new();
        while let Some(pkt) = framer.next_packet() {
            packets.push(pkt);
        }
        packets
    }

    #[test]
    fn given_valid_a50401_frame_then_packet_fields_are_split() {
        let packets = parse_all(&A5_04_01_FRAME);
        assert_eq!(packets.len(), 1);
        let pkt = &packets[0];
        assert_eq!(pkt.packet_type, PacketType::RadioErp1);
        assert_eq!(pkt.data.len(), 10);
        assert_eq!(pkt.optional.len(), 7);
        assert_eq!(pkt.data[0], 0xA5);
    }

    #[test]
    fn given_frame_split_in_two_chunks_then_packet_is_reassembled() {
        let mut framer = InboundFramer::new();
        framer.push(&F6_02_01_FRAME[..9]);
        assert!(framer.next_packet().is_none());
        framer.push(&F6_02_01_FRAME[9..]);
        let pkt = framer.next_packet().unwrap();
        assert_eq!(pkt.packet_type, PacketType::RadioErp1);
        assert_eq!(pkt.data.len(), 7);
    }

    #[test]
    fn given_leading_garbage_then_frame_is_still_found() {
        let mut bytes = vec![0x00, 0x12, 0xAB];
        bytes.extend_from_slice(&A5_04_01_FRAME);
        let packets = parse_all(&bytes);
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn given_corrupted_frame_between_two_valid_frames_then_both_valid_frames_survive() {
        let mut corrupted = F6_02_01_FRAME.to_vec();
        corrupted[20] ^= 0xFF; // break the data CRC
        let mut bytes = A5_04_01_FRAME.to_vec();
        bytes.extend_from_slice(&corrupted);
        bytes.extend_from_slice(&A5_04_01_FRAME);
        let packets = parse_all(&bytes);
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.data.len() == 10));
    }

    #[test]
    fn given_bad_header_crc_then_parser_resynchronizes_on_next_frame() {
        let mut bad = A5_04_01_FRAME.to_vec();
        bad[5] ^= 0x55; // break the header CRC
        let mut bytes = bad;
        bytes.extend_from_slice(&F6_02_01_FRAME);
        let packets = parse_all(&bytes);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data.len(), 7);
    }

    #[test]
    fn given_valid_packet_then_serialize_and_parse_roundtrips() {
        for frame in [&A5_04_01_FRAME[..], &F6_02_01_FRAME[..]] {
            let pkt = parse_all(frame).remove(0);
            assert_eq!(pkt.to_bytes(), frame);
            assert_eq!(parse_all(&pkt.to_bytes()).remove(0), pkt);
        }
    }

    #[test]
    fn given_response_packet_then_serializer_computes_crcs() {
        let pkt = Esp3Packet::new(PacketType::Response, vec![0x00], vec![]);
        let bytes = pkt.to_bytes();
        assert_eq!(bytes[0], SYNC_BYTE);
        assert_eq!(bytes[5], compute_crc8(&bytes[1..5]));
        assert_eq!(*bytes.last().unwrap(), compute_crc8(&[0x00]));
        assert_eq!(parse_all(&bytes).remove(0), pkt);
    }

    #[test]
    fn given_absurd_declared_length_then_header_crc_rejects_it() {
        // 0x55 followed by an absurd length and a wrong header CRC
        let mut bytes = vec![0x55, 0xFF, 0xFF, 0xFF, 0x01];
        bytes.push(compute_crc8(&bytes[1..5]) ^ 0xFF);
        bytes.extend_from_slice(&F6_02_01_FRAME);
        let packets = parse_all(&bytes);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data.len(), 7);
    }
}
