use bytes::{Buf, Bytes, BytesMut};
use crc::{CRC_24_LTE_A, Crc};

use crate::constants::{RTCM_CRC_LEN, RTCM_HEADER_LEN, RTCM_PREAMBLE};

// CRC-24Q: poly 0x864CFB, init 0, no reflection.
const CRC24Q: Crc<u32> = Crc::<u32>::new(&CRC_24_LTE_A);

/// Splits a raw byte stream into complete RTCM 3 frames.
///
/// A frame is `0xD3 | 6 reserved bits | 10 bit length | payload | CRC-24Q`.
/// Anything that does not start a valid frame is skipped one byte at a
/// time until the stream resynchronizes.
#[derive(Debug, Default)]
pub struct RtcmFramer {
    buffer: BytesMut,
    skipped: usize,
}

impl RtcmFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes discarded so far while hunting for a frame boundary.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            match self.buffer.iter().position(|&byte| byte == RTCM_PREAMBLE) {
                Some(pos) => {
                    self.skipped += pos;
                    self.buffer.advance(pos);
                }
                None => {
                    self.skipped += self.buffer.len();
                    self.buffer.clear();
                    return None;
                }
            }

            if self.buffer.len() < RTCM_HEADER_LEN {
                return None;
            }

            if self.buffer[1] & 0xFC != 0 {
                self.discard_one();
                continue;
            }

            let payload_len = payload_len(&self.buffer);
            let body_len = RTCM_HEADER_LEN + payload_len;
            let total = body_len + RTCM_CRC_LEN;
            if self.buffer.len() < total {
                return None;
            }

            let expected = CRC24Q.checksum(&self.buffer[..body_len]);
            let actual = u32::from_be_bytes([
                0,
                self.buffer[body_len],
                self.buffer[body_len + 1],
                self.buffer[body_len + 2],
            ]);

            if expected != actual {
                log::trace!("RTCM CRC mismatch, resynchronizing");
                self.discard_one();
                continue;
            }

            return Some(self.buffer.split_to(total).freeze());
        }
    }

    fn discard_one(&mut self) {
        self.skipped += 1;
        self.buffer.advance(1);
    }
}

fn payload_len(frame: &[u8]) -> usize {
    (((frame[1] & 0x03) as usize) << 8) | frame[2] as usize
}

/// Wraps a payload into a complete RTCM 3 frame.
#[cfg(test)]
pub(crate) fn encode_frame(payload: &[u8]) -> Bytes {
    use crate::constants::RTCM_MAX_PAYLOAD_LEN;
    use bytes::BufMut;

    assert!(payload.len() <= RTCM_MAX_PAYLOAD_LEN, "RTCM payload too long");

    let mut frame = BytesMut::with_capacity(RTCM_HEADER_LEN + payload.len() + RTCM_CRC_LEN);
    frame.put_u8(RTCM_PREAMBLE);
    frame.put_u16(payload.len() as u16);
    frame.put_slice(payload);
    let crc = CRC24Q.checksum(&frame);
    frame.put_slice(&crc.to_be_bytes()[1..]);
    frame.freeze()
}

/// The 12 bit message number of a complete frame, if it carries one.
pub fn message_type(frame: &[u8]) -> Option<u16> {
    if frame.len() < RTCM_HEADER_LEN + 2 || payload_len(frame) < 2 {
        return None;
    }
    Some(((frame[3] as u16) << 4) | (frame[4] as u16 >> 4))
}
