//! Datagram framing for forwarded chunks.
//!
//! ```text
//! 0x7E | 0x43 | channels u16 | samples u32 | seq u64 | timestamp f64 | values f32.. | crc u16 | 0x7E
//! ```
//!
//! All integers and floats are little-endian. Values are channel-major, oldest
//! sample first. The CRC is the GDL90 frame check sequence (CRC-16/CCITT, zero
//! seed) over everything between the opening flag and the CRC. The frame length
//! follows from the header, so the payload is not byte-stuffed.

use bytes::{Buf, BufMut, BytesMut};
use log::*;
use std::io;
use tokio_util::codec;

use crate::chunk::Chunk;

pub const FLAG: u8 = 0x7E;
pub const CHUNK_MESSAGE_ID: u8 = 0x43;

/// Flag, id, channels, samples, seq and timestamp.
pub const HEADER_LEN: usize = 1 + 1 + 2 + 4 + 8 + 8;
/// CRC and closing flag.
pub const TRAILER_LEN: usize = 2 + 1;
/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

const MAX_VALUES: usize = 1 << 24;

pub fn frame_len(channels: usize, samples: usize) -> usize {
    HEADER_LEN + channels * samples * 4 + TRAILER_LEN
}

const FCS_CRC16_TABLE: [u16; 256] = [
    0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50a5, 0x60c6, 0x70e7, 0x8108, 0x9129, 0xa14a, 0xb16b,
    0xc18c, 0xd1ad, 0xe1ce, 0xf1ef, 0x1231, 0x0210, 0x3273, 0x2252, 0x52b5, 0x4294, 0x72f7, 0x62d6,
    0x9339, 0x8318, 0xb37b, 0xa35a, 0xd3bd, 0xc39c, 0xf3ff, 0xe3de, 0x2462, 0x3443, 0x0420, 0x1401,
    0x64e6, 0x74c7, 0x44a4, 0x5485, 0xa56a, 0xb54b, 0x8528, 0x9509, 0xe5ee, 0xf5cf, 0xc5ac, 0xd58d,
    0x3653, 0x2672, 0x1611, 0x0630, 0x76d7, 0x66f6, 0x5695, 0x46b4, 0xb75b, 0xa77a, 0x9719, 0x8738,
    0xf7df, 0xe7fe, 0xd79d, 0xc7bc, 0x48c4, 0x58e5, 0x6886, 0x78a7, 0x0840, 0x1861, 0x2802, 0x3823,
    0xc9cc, 0xd9ed, 0xe98e, 0xf9af, 0x8948, 0x9969, 0xa90a, 0xb92b, 0x5af5, 0x4ad4, 0x7ab7, 0x6a96,
    0x1a71, 0x0a50, 0x3a33, 0x2a12, 0xdbfd, 0xcbdc, 0xfbbf, 0xeb9e, 0x9b79, 0x8b58, 0xbb3b, 0xab1a,
    0x6ca6, 0x7c87, 0x4ce4, 0x5cc5, 0x2c22, 0x3c03, 0x0c60, 0x1c41, 0xedae, 0xfd8f, 0xcdec, 0xddcd,
    0xad2a, 0xbd0b, 0x8d68, 0x9d49, 0x7e97, 0x6eb6, 0x5ed5, 0x4ef4, 0x3e13, 0x2e32, 0x1e51, 0x0e70,
    0xff9f, 0xefbe, 0xdfdd, 0xcffc, 0xbf1b, 0xaf3a, 0x9f59, 0x8f78, 0x9188, 0x81a9, 0xb1ca, 0xa1eb,
    0xd10c, 0xc12d, 0xf14e, 0xe16f, 0x1080, 0x00a1, 0x30c2, 0x20e3, 0x5004, 0x4025, 0x7046, 0x6067,
    0x83b9, 0x9398, 0xa3fb, 0xb3da, 0xc33d, 0xd31c, 0xe37f, 0xf35e, 0x02b1, 0x1290, 0x22f3, 0x32d2,
    0x4235, 0x5214, 0x6277, 0x7256, 0xb5ea, 0xa5cb, 0x95a8, 0x8589, 0xf56e, 0xe54f, 0xd52c, 0xc50d,
    0x34e2, 0x24c3, 0x14a0, 0x0481, 0x7466, 0x6447, 0x5424, 0x4405, 0xa7db, 0xb7fa, 0x8799, 0x97b8,
    0xe75f, 0xf77e, 0xc71d, 0xd73c, 0x26d3, 0x36f2, 0x0691, 0x16b0, 0x6657, 0x7676, 0x4615, 0x5634,
    0xd94c, 0xc96d, 0xf90e, 0xe92f, 0x99c8, 0x89e9, 0xb98a, 0xa9ab, 0x5844, 0x4865, 0x7806, 0x6827,
    0x18c0, 0x08e1, 0x3882, 0x28a3, 0xcb7d, 0xdb5c, 0xeb3f, 0xfb1e, 0x8bf9, 0x9bd8, 0xabbb, 0xbb9a,
    0x4a75, 0x5a54, 0x6a37, 0x7a16, 0x0af1, 0x1ad0, 0x2ab3, 0x3a92, 0xfd2e, 0xed0f, 0xdd6c, 0xcd4d,
    0xbdaa, 0xad8b, 0x9de8, 0x8dc9, 0x7c26, 0x6c07, 0x5c64, 0x4c45, 0x3ca2, 0x2c83, 0x1ce0, 0x0cc1,
    0xef1f, 0xff3e, 0xcf5d, 0xdf7c, 0xaf9b, 0xbfba, 0x8fd9, 0x9ff8, 0x6e17, 0x7e36, 0x4e55, 0x5e74,
    0x2e93, 0x3eb2, 0x0ed1, 0x1ef0,
];

pub fn fcs_crc16_compute(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, b| {
        (FCS_CRC16_TABLE[(crc >> 8) as usize] ^ (crc << 8)) ^ (*b as u16)
    })
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkCodec {}

impl ChunkCodec {
    pub fn new() -> ChunkCodec {
        ChunkCodec {}
    }
}

impl<'a> codec::Encoder<&'a Chunk> for ChunkCodec {
    type Error = io::Error;

    fn encode(&mut self, chunk: &'a Chunk, dst: &mut BytesMut) -> Result<(), io::Error> {
        if chunk.channels() > u16::MAX as usize || chunk.len() > u32::MAX as usize {
            return Err(invalid(format!(
                "chunk too large to frame: {} channels x {} samples",
                chunk.channels(),
                chunk.len()
            )));
        }
        if chunk.data().iter().any(|ch| ch.len() != chunk.len()) {
            return Err(invalid("ragged chunk".to_string()));
        }

        let mut frame = BytesMut::with_capacity(frame_len(chunk.channels(), chunk.len()));
        frame.put_u8(CHUNK_MESSAGE_ID);
        frame.put_u16_le(chunk.channels() as u16);
        frame.put_u32_le(chunk.len() as u32);
        frame.put_u64_le(chunk.seq);
        frame.put_f64_le(chunk.timestamp);
        for channel in chunk.data() {
            for v in channel {
                frame.put_f32_le(*v);
            }
        }

        let crc = fcs_crc16_compute(&frame);

        dst.reserve(frame.len() + 2 + TRAILER_LEN);
        dst.put_u8(FLAG);
        dst.put_slice(&frame);
        dst.put_slice(&crc.to_le_bytes());
        dst.put_u8(FLAG);

        trace!("encoded {} ({} bytes)", chunk, frame.len() + 2 + TRAILER_LEN);
        Ok(())
    }
}

impl codec::Encoder<Chunk> for ChunkCodec {
    type Error = io::Error;

    fn encode(&mut self, chunk: Chunk, dst: &mut BytesMut) -> Result<(), io::Error> {
        codec::Encoder::<&Chunk>::encode(self, &chunk, dst)
    }
}

impl codec::Decoder for ChunkCodec {
    type Item = Chunk;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, io::Error> {
        // skip anything ahead of an opening flag
        match src.iter().position(|b| *b == FLAG) {
            Some(start) => src.advance(start),
            None => {
                src.clear();
                return Ok(None);
            }
        }

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        if src[1] != CHUNK_MESSAGE_ID {
            let id = src[1];
            src.advance(1);
            return Err(invalid(format!("unknown message id {:#x}", id)));
        }

        let channels = u16::from_le_bytes([src[2], src[3]]) as usize;
        let samples = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
        let values = channels.saturating_mul(samples);
        if values > MAX_VALUES {
            src.advance(1);
            return Err(invalid(format!(
                "implausible chunk shape ({}, {})",
                channels, samples
            )));
        }

        let total = frame_len(channels, samples);
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        if frame[total - 1] != FLAG {
            return Err(invalid("missing closing flag".to_string()));
        }

        let crc = u16::from_le_bytes([frame[total - 3], frame[total - 2]]);
        let computed = fcs_crc16_compute(&frame[1..total - 3]);
        if crc != computed {
            debug!("bad frame: {}", hex::encode(&frame[..HEADER_LEN]));
            return Err(invalid(format!(
                "crc mismatch: got {:#06x}, computed {:#06x}",
                crc, computed
            )));
        }

        let mut buf = &frame[8..total - TRAILER_LEN];
        let seq = buf.get_u64_le();
        let timestamp = buf.get_f64_le();
        let mut data = Vec::with_capacity(channels);
        for _ in 0..channels {
            let mut channel = Vec::with_capacity(samples);
            for _ in 0..samples {
                channel.push(buf.get_f32_le());
            }
            data.push(channel);
        }

        Ok(Some(Chunk::new(seq, timestamp, data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::{Decoder, Encoder};

    fn sample_chunk() -> Chunk {
        Chunk::new(
            7,
            12.25,
            vec![
                vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0],
                vec![0.0, 0.0, 10.0, 20.0, 30.0, 40.0],
            ],
        )
    }

    #[test]
    fn crc_matches_gdl90_heartbeat_example() {
        let heartbeat = [0x00, 0x81, 0x41, 0xDB, 0xD0, 0x08, 0x02];
        assert_eq!(fcs_crc16_compute(&heartbeat), 0x8BB3);
    }

    #[test]
    fn frame_layout() {
        let chunk = sample_chunk();
        let mut buf = BytesMut::new();
        ChunkCodec::new().encode(&chunk, &mut buf).unwrap();

        assert_eq!(buf.len(), frame_len(2, 6));
        assert_eq!(buf[0], FLAG);
        assert_eq!(buf[1], CHUNK_MESSAGE_ID);
        assert_eq!(&buf[2..4], &[2, 0]);
        assert_eq!(&buf[4..8], &[6, 0, 0, 0]);
        assert_eq!(buf[buf.len() - 1], FLAG);
    }

    #[test]
    fn decodes_what_it_encodes_with_leading_noise() {
        let chunk = sample_chunk();
        let mut buf = BytesMut::from(&[0x01u8, 0x02][..]);
        ChunkCodec::new().encode(&chunk, &mut buf).unwrap();

        let decoded = ChunkCodec::new().decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(chunk));
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_a_whole_frame() {
        let mut full = BytesMut::new();
        ChunkCodec::new().encode(&sample_chunk(), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 5]);
        assert_eq!(ChunkCodec::new().decode(&mut partial).unwrap(), None);
    }

    #[test]
    fn rejects_corrupted_payload() {
        let mut buf = BytesMut::new();
        ChunkCodec::new().encode(&sample_chunk(), &mut buf).unwrap();
        buf[HEADER_LEN + 3] ^= 0x10;
        assert!(ChunkCodec::new().decode(&mut buf).is_err());
    }
}
