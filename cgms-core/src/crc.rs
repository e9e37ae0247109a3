//! End-to-end CRC
//!
//! The CGM characteristics may carry an end-to-end cyclic redundancy check (E2E-CRC) so that a
//! collector can check a value independently of the link layer. The check is CRC-16/CCITT computed
//! least significant bit first (the reflected form of polynomial `0x1021`) starting from a seed of
//! `0xFFFF`. The CRC is transferred little-endian directly after the value it protects.
//!
//! Whether a CRC is appended or expected is decided by the [`E2eCrc`] feature bit of the server.
//! Verification distinguishes between a value that is missing its CRC and a value with a wrong
//! CRC, as the two map to different ATT error codes.
//!
//! [`E2eCrc`]: crate::Feature::E2eCrc

use alloc::vec::Vec;

/// The initial value of the CRC register
pub const SEED: u16 = 0xFFFF;

/// The reflected CCITT polynomial
const POLYNOMIAL: u16 = 0x8408;

/// The length of an appended CRC
pub const CRC_LEN: usize = 2;

/// Calculate the E2E-CRC of `data`
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = SEED;

    for byte in data {
        let mut bits = *byte;

        for _ in 0..8 {
            if (crc ^ u16::from(bits)) & 1 == 1 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }

            bits >>= 1;
        }
    }

    crc
}

/// Error returned by [`verify`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CrcError {
    /// The value does not have the length of the payload plus a CRC
    #[error("the E2E-CRC is missing")]
    Missing,
    /// The CRC does not match the payload
    #[error("invalid E2E-CRC, calculated {expected:#06x} but received {received:#06x}")]
    Invalid { expected: u16, received: u16 },
}

/// Verify the CRC at the end of `data`
///
/// `payload_len` is the length of the value without the CRC. The check passes only when `data` is
/// exactly `payload_len` plus two bytes long and the trailing two bytes are the CRC of the
/// payload.
pub fn verify(data: &[u8], payload_len: usize) -> Result<(), CrcError> {
    if data.len() != payload_len + CRC_LEN {
        return Err(CrcError::Missing);
    }

    let (payload, crc) = data.split_at(payload_len);

    let received = u16::from_le_bytes([crc[0], crc[1]]);

    let expected = crc16(payload);

    if expected == received {
        Ok(())
    } else {
        Err(CrcError::Invalid { expected, received })
    }
}

/// Append the CRC of the first `payload_len` bytes of `buffer`
///
/// The CRC is written to `buffer[payload_len..payload_len + 2]` when `enabled` is true. The
/// returned value is the length of the value to transfer, this is `payload_len` when the CRC is
/// not enabled.
///
/// # Panic
/// This panics if `enabled` is true and `buffer` is shorter than `payload_len + 2`.
pub fn append(buffer: &mut [u8], payload_len: usize, enabled: bool) -> usize {
    if enabled {
        let crc = crc16(&buffer[..payload_len]);

        buffer[payload_len..payload_len + CRC_LEN].copy_from_slice(&crc.to_le_bytes());

        payload_len + CRC_LEN
    } else {
        payload_len
    }
}

/// Extend `value` with its CRC if `enabled` is true
pub fn extend_with_crc(value: &mut Vec<u8>, enabled: bool) {
    if enabled {
        let crc = crc16(value);

        value.extend_from_slice(&crc.to_le_bytes());
    }
}
