//! Wire codec for settings frames.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! +-------------+-------------+
//! | flags (u8)  | count (u32) |   frame header; flags bit 0 = clear
//! +-------------+-------------+
//! | id (u32) | flags (u8) | value (i32) |   one per entry, ascending ID
//! +----------+------------+-------------+
//! ```
//!
//! Entry flags: bit 0 = persist value, bit 1 = persisted.
//!
//! [`decode`] is incremental: it returns `Ok(None)` until the buffer holds
//! a complete frame, leaving partial input untouched. That is the
//! backpressure signal a decoding stage relays by declining to forward.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{InvalidSettingId, SettingsFrame, SETTINGS_MAX_ID};

/// Frame-level flag: clear previously persisted settings.
const FRAME_FLAG_CLEAR: u8 = 0x01;
/// Entry flag: persist this value on the peer.
const ENTRY_FLAG_PERSIST: u8 = 0x01;
/// Entry flag: this value was restored from prior persistence.
const ENTRY_FLAG_PERSISTED: u8 = 0x02;

/// Frame header length: flag byte + entry count.
const HEADER_LEN: usize = 5;
/// Serialized entry length: ID + flag byte + value.
const ENTRY_LEN: usize = 9;

/// Errors produced while decoding a settings frame from the wire.
#[derive(Debug, Error)]
pub enum SettingsCodecError {
    /// An entry on the wire carried an ID outside the legal range.
    #[error(transparent)]
    InvalidId(#[from] InvalidSettingId),

    /// The declared entry count exceeds what any legal frame can hold.
    #[error("settings frame declares {0} entries, more than the {SETTINGS_MAX_ID} distinct legal IDs")]
    FrameTooLarge(u32),
}

/// Serializes `frame` into `dst`, entries in ascending ID order.
pub fn encode(frame: &SettingsFrame, dst: &mut BytesMut) {
    dst.reserve(HEADER_LEN + frame.len() * ENTRY_LEN);

    let mut flags = 0u8;
    if frame.clear_previously_persisted() {
        flags |= FRAME_FLAG_CLEAR;
    }
    dst.put_u8(flags);
    #[allow(clippy::cast_possible_truncation)]
    dst.put_u32(frame.len() as u32);

    for id in frame.ids() {
        let mut entry_flags = 0u8;
        if frame.persist_value(id) {
            entry_flags |= ENTRY_FLAG_PERSIST;
        }
        if frame.is_persisted(id) {
            entry_flags |= ENTRY_FLAG_PERSISTED;
        }
        dst.put_u32(id);
        dst.put_u8(entry_flags);
        // Presence of the ID is guaranteed by the iteration above.
        dst.put_i32(frame.value(id).unwrap_or_default());
    }
}

/// Serializes `frame` into a fresh buffer.
#[must_use]
pub fn encode_to_bytes(frame: &SettingsFrame) -> Bytes {
    let mut dst = BytesMut::new();
    encode(frame, &mut dst);
    dst.freeze()
}

/// Decodes at most one settings frame from the front of `src`.
///
/// Returns `Ok(None)` when `src` does not yet hold a complete frame; no
/// bytes are consumed in that case. On success exactly one frame's worth
/// of bytes is consumed and any trailing input is left in place.
pub fn decode(src: &mut BytesMut) -> Result<Option<SettingsFrame>, SettingsCodecError> {
    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    // Peek the header without consuming: the frame may still be partial.
    let count = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    // Entries carry unique IDs from 1..=SETTINGS_MAX_ID, so a count above
    // that is structurally impossible; reject it instead of waiting for a
    // body that no conforming peer will ever send.
    if count > SETTINGS_MAX_ID {
        return Err(SettingsCodecError::FrameTooLarge(count));
    }
    let body_len = HEADER_LEN + count as usize * ENTRY_LEN;
    if src.len() < body_len {
        return Ok(None);
    }

    let flags = src.get_u8();
    let _ = src.get_u32(); // count, already read from the peek

    let mut frame = SettingsFrame::new();
    frame.set_clear_previously_persisted(flags & FRAME_FLAG_CLEAR != 0);

    for _ in 0..count {
        let id = src.get_u32();
        let entry_flags = src.get_u8();
        let value = src.get_i32();
        frame.set_value_with_flags(
            id,
            value,
            entry_flags & ENTRY_FLAG_PERSIST != 0,
            entry_flags & ENTRY_FLAG_PERSISTED != 0,
        )?;
    }

    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> SettingsFrame {
        let mut frame = SettingsFrame::new();
        frame.set_value_with_flags(4, 1024, true, false).unwrap();
        frame.set_value_with_flags(1, -7, false, true).unwrap();
        frame.set_clear_previously_persisted(true);
        frame
    }

    #[test]
    fn encode_layout_is_exact() {
        let frame = sample_frame();
        let wire = encode_to_bytes(&frame);

        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x01,                   // frame flags: clear
            0x00, 0x00, 0x00, 0x02, // two entries
            0x00, 0x00, 0x00, 0x01, // id 1
            0x02,                   // persisted
            0xFF, 0xFF, 0xFF, 0xF9, // -7
            0x00, 0x00, 0x00, 0x04, // id 4
            0x01,                   // persist
            0x00, 0x00, 0x04, 0x00, // 1024
        ];
        assert_eq!(&wire[..], expected);
    }

    #[test]
    fn decode_recovers_the_frame() {
        let frame = sample_frame();
        let mut src = BytesMut::from(&encode_to_bytes(&frame)[..]);

        let decoded = decode(&mut src).unwrap().expect("complete frame");
        assert_eq!(decoded, frame);
        assert!(src.is_empty());
    }

    #[test]
    fn partial_input_yields_none_and_consumes_nothing() {
        let wire = encode_to_bytes(&sample_frame());

        // Every proper prefix is insufficient.
        for cut in 0..wire.len() {
            let mut src = BytesMut::from(&wire[..cut]);
            assert!(decode(&mut src).unwrap().is_none(), "cut at {cut}");
            assert_eq!(src.len(), cut, "cut at {cut} consumed bytes");
        }
    }

    #[test]
    fn trailing_bytes_stay_buffered() {
        let mut src = BytesMut::from(&encode_to_bytes(&sample_frame())[..]);
        src.extend_from_slice(b"tail");

        let decoded = decode(&mut src).unwrap();
        assert!(decoded.is_some());
        assert_eq!(&src[..], b"tail");
    }

    #[test]
    fn empty_frame_round_trips() {
        let frame = SettingsFrame::new();
        let mut src = BytesMut::from(&encode_to_bytes(&frame)[..]);
        let decoded = decode(&mut src).unwrap().unwrap();
        assert!(decoded.is_empty());
        assert!(!decoded.clear_previously_persisted());
    }

    #[test]
    fn wire_entry_with_invalid_id_is_rejected() {
        #[rustfmt::skip]
        let wire: &[u8] = &[
            0x00,
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00, // id 0: out of range
            0x00,
            0x00, 0x00, 0x00, 0x2A,
        ];
        let mut src = BytesMut::from(wire);
        let err = decode(&mut src).unwrap_err();
        assert!(matches!(
            err,
            SettingsCodecError::InvalidId(InvalidSettingId(0))
        ));
    }

    #[test]
    fn oversized_count_is_rejected_not_waited_on() {
        // A header declaring u32::MAX entries must fail outright rather
        // than leave the decoder buffering toward a ~36 GiB body.
        let mut src = BytesMut::from(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        let err = decode(&mut src).unwrap_err();
        assert!(matches!(
            err,
            SettingsCodecError::FrameTooLarge(u32::MAX)
        ));

        // Just above the count of distinct legal IDs: still rejected.
        let mut src = BytesMut::new();
        src.put_u8(0x00);
        src.put_u32(SETTINGS_MAX_ID + 1);
        assert!(matches!(
            decode(&mut src).unwrap_err(),
            SettingsCodecError::FrameTooLarge(c) if c == SETTINGS_MAX_ID + 1
        ));

        // The largest legal count is not an error; the decoder simply
        // waits for the body.
        let mut src = BytesMut::new();
        src.put_u8(0x00);
        src.put_u32(SETTINGS_MAX_ID);
        assert!(decode(&mut src).unwrap().is_none());
    }
}
