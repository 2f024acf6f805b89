//! Recognizes one frame at the start of a byte buffer.
//!
//! [decode_frame] sniffs the first byte to decide between a binary sample
//! frame and a JSON control frame, then either parses a whole frame, asks
//! for more bytes, or tells the caller to drop a byte and try again. It
//! holds no state, buffering belongs to the
//! [StreamAssembler](crate::stream_assembler::StreamAssembler).

use crate::error::EmgError;
use crate::protocol::{
    ControlMessage, DecodedFrame, SamplePacket, BINARY_FRAME_LEN, BINARY_MAGIC, CONTROL_CLOSE,
    CONTROL_OPEN, MAX_CONTROL_FRAME_LEN, SAMPLES_PER_PACKET, SAMPLE_PACKET_TYPE,
};

use nom::{
    bytes::complete::tag,
    combinator::map,
    multi::count,
    number::complete::{le_i16, le_u16, le_u32, le_u8},
    sequence::{preceded, tuple},
    IResult,
};

const MAGIC_TAG: &[u8] = &[BINARY_MAGIC];

/// The result of looking for one frame at offset 0.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// A complete frame, occupying the first `consumed` bytes.
    Frame {
        /// The parsed frame
        frame: DecodedFrame,
        /// How many bytes the frame occupied
        consumed: usize,
    },
    /// The buffer holds the start of a frame but not all of it.
    Incomplete,
    /// The first byte cannot start a valid frame, drop it and retry.
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BinaryHeader {
    frame_type: u8,
    timestamp: u32,
    sample_count: u16,
}

fn parse_header(input: &[u8]) -> IResult<&[u8], BinaryHeader> {
    map(
        preceded(tag(MAGIC_TAG), tuple((le_u8, le_u32, le_u16))),
        |(frame_type, timestamp, sample_count)| BinaryHeader {
            frame_type,
            timestamp,
            sample_count,
        },
    )(input)
}

fn parse_samples(input: &[u8]) -> IResult<&[u8], Vec<i16>> {
    count(le_i16, SAMPLES_PER_PACKET)(input)
}

/// Try to recognize exactly one frame starting at `buf[0]`.
///
/// Never consumes a partial frame: on [FrameOutcome::Incomplete] the caller
/// should keep every byte and wait for the next chunk.
pub fn decode_frame(buf: &[u8]) -> FrameOutcome {
    match buf.first() {
        None => FrameOutcome::Incomplete,
        Some(&BINARY_MAGIC) => decode_binary(buf),
        Some(&CONTROL_OPEN) => decode_control(buf),
        Some(_) => FrameOutcome::Malformed,
    }
}

fn decode_binary(buf: &[u8]) -> FrameOutcome {
    if buf.len() < BINARY_FRAME_LEN {
        return FrameOutcome::Incomplete;
    }

    let Ok((rest, header)) = parse_header(&buf[..BINARY_FRAME_LEN]) else {
        return FrameOutcome::Malformed;
    };

    // A count other than 50 usually means we locked onto a 0xAA inside
    // somebody else's payload.
    if header.frame_type != SAMPLE_PACKET_TYPE
        || usize::from(header.sample_count) != SAMPLES_PER_PACKET
    {
        return FrameOutcome::Malformed;
    }

    match parse_samples(rest) {
        Ok((_, values)) => FrameOutcome::Frame {
            frame: DecodedFrame::Samples(SamplePacket::new(header.timestamp, values)),
            consumed: BINARY_FRAME_LEN,
        },
        Err(_) => FrameOutcome::Malformed,
    }
}

/// Finds the end of a brace-balanced object starting at `buf[0]`.
///
/// Returns `Ok(Some(len))` when the object closes, `Ok(None)` when the
/// buffer runs out first, and `Err(())` when the bytes can't belong to a
/// JSON object: the start of a binary frame, a stray control byte, or
/// more than [MAX_CONTROL_FRAME_LEN] bytes without closing.
fn control_frame_len(buf: &[u8]) -> Result<Option<usize>, ()> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        if i >= MAX_CONTROL_FRAME_LEN {
            return Err(());
        }

        if b == BINARY_MAGIC && buf.get(i + 1) == Some(&SAMPLE_PACKET_TYPE) {
            return Err(());
        }

        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                0x00..=0x1F => return Err(()),
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            CONTROL_OPEN => depth += 1,
            CONTROL_CLOSE => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(i + 1));
                }
            }
            b'\t' | b'\n' | b'\r' => {}
            0x00..=0x1F => return Err(()),
            _ => {}
        }
    }

    Ok(None)
}

fn decode_control(buf: &[u8]) -> FrameOutcome {
    let len = match control_frame_len(buf) {
        Ok(Some(len)) => len,
        Ok(None) => return FrameOutcome::Incomplete,
        Err(()) => return FrameOutcome::Malformed,
    };

    match serde_json::from_slice::<serde_json::Value>(&buf[..len]) {
        Ok(body) => FrameOutcome::Frame {
            frame: DecodedFrame::Control(ControlMessage { body }),
            consumed: len,
        },
        Err(_) => FrameOutcome::Malformed,
    }
}

/// Serialize a sample packet into its 108-byte wire form.
///
/// The simulator uses this to produce device-shaped traffic.
pub fn encode_sample_packet(packet: &SamplePacket) -> Result<Vec<u8>, EmgError> {
    if packet.values.len() != SAMPLES_PER_PACKET {
        return Err(EmgError::SampleCount {
            expected: SAMPLES_PER_PACKET,
            found: packet.values.len(),
        });
    }

    let mut out = Vec::with_capacity(BINARY_FRAME_LEN);
    out.push(BINARY_MAGIC);
    out.push(SAMPLE_PACKET_TYPE);
    out.extend_from_slice(&packet.timestamp.to_le_bytes());
    out.extend_from_slice(&(SAMPLES_PER_PACKET as u16).to_le_bytes());
    out.extend(packet.values.iter().flat_map(|v| v.to_le_bytes()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ramp_packet(timestamp: u32) -> SamplePacket {
        SamplePacket::new(
            timestamp,
            (0..SAMPLES_PER_PACKET as i16).map(|i| i * 100 - 2500).collect(),
        )
    }

    #[test]
    fn binary_round_trip() {
        let packet = SamplePacket::new(
            u32::MAX,
            (0..SAMPLES_PER_PACKET)
                .map(|i| if i % 2 == 0 { i16::MIN } else { i16::MAX })
                .collect(),
        );
        let bytes = encode_sample_packet(&packet).unwrap();
        assert_eq!(bytes.len(), BINARY_FRAME_LEN);

        assert_eq!(
            decode_frame(&bytes),
            FrameOutcome::Frame {
                frame: DecodedFrame::Samples(packet),
                consumed: BINARY_FRAME_LEN,
            }
        );
    }

    #[test]
    fn wire_layout_is_little_endian() {
        let bytes = encode_sample_packet(&ramp_packet(0x0403_0201)).unwrap();
        assert_eq!(&bytes[..8], &[0xAA, 0x0D, 0x01, 0x02, 0x03, 0x04, 50, 0]);
        // -2500 as i16 LE
        assert_eq!(&bytes[8..10], &(-2500i16).to_le_bytes());
    }

    #[test]
    fn binary_consumes_exactly_one_frame() {
        let mut bytes = encode_sample_packet(&ramp_packet(1)).unwrap();
        bytes.extend(encode_sample_packet(&ramp_packet(2)).unwrap());

        match decode_frame(&bytes) {
            FrameOutcome::Frame { frame, consumed } => {
                assert_eq!(consumed, BINARY_FRAME_LEN);
                assert_eq!(frame, DecodedFrame::Samples(ramp_packet(1)));
            }
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn short_binary_is_incomplete() {
        let bytes = encode_sample_packet(&ramp_packet(5)).unwrap();
        assert_eq!(decode_frame(&bytes[..1]), FrameOutcome::Incomplete);
        assert_eq!(decode_frame(&bytes[..7]), FrameOutcome::Incomplete);
        assert_eq!(
            decode_frame(&bytes[..BINARY_FRAME_LEN - 1]),
            FrameOutcome::Incomplete
        );
    }

    #[test]
    fn unknown_frame_type_is_malformed() {
        let mut bytes = encode_sample_packet(&ramp_packet(5)).unwrap();
        bytes[1] = 0x0E;
        assert_eq!(decode_frame(&bytes), FrameOutcome::Malformed);
    }

    #[test]
    fn wrong_sample_count_is_malformed() {
        let mut bytes = encode_sample_packet(&ramp_packet(5)).unwrap();
        bytes[6] = 49;
        assert_eq!(decode_frame(&bytes), FrameOutcome::Malformed);
    }

    #[test]
    fn unknown_leading_byte_is_malformed() {
        assert_eq!(decode_frame(&[0xBB, 0xAA, 0x0D]), FrameOutcome::Malformed);
        assert_eq!(decode_frame(b"\r\n"), FrameOutcome::Malformed);
    }

    #[test]
    fn empty_buffer_is_incomplete() {
        assert_eq!(decode_frame(&[]), FrameOutcome::Incomplete);
    }

    #[test]
    fn control_frame_is_decoded() {
        let bytes = b"{\"cd\":3,\"fw\":{\"v\":2}}\r\n";
        match decode_frame(bytes) {
            FrameOutcome::Frame { frame, consumed } => {
                assert_eq!(consumed, bytes.len() - 2);
                assert_eq!(
                    frame,
                    DecodedFrame::Control(ControlMessage {
                        body: json!({"cd": 3, "fw": {"v": 2}}),
                    })
                );
            }
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let bytes = br#"{"msg":"a } b { c"}"#;
        match decode_frame(bytes) {
            FrameOutcome::Frame { consumed, .. } => assert_eq!(consumed, bytes.len()),
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn open_control_frame_is_incomplete() {
        assert_eq!(decode_frame(b"{\"cd\":{\"x\":1}"), FrameOutcome::Incomplete);
        assert_eq!(decode_frame(b"{"), FrameOutcome::Incomplete);
    }

    #[test]
    fn balanced_but_invalid_json_is_malformed() {
        assert_eq!(decode_frame(b"{cd:1}"), FrameOutcome::Malformed);
    }

    #[test]
    fn binary_header_inside_control_frame_is_malformed() {
        let mut bytes = b"{\"cd\":".to_vec();
        bytes.extend(encode_sample_packet(&ramp_packet(9)).unwrap());
        assert_eq!(decode_frame(&bytes), FrameOutcome::Malformed);
    }

    #[test]
    fn runaway_control_frame_is_malformed() {
        let mut bytes = b"{\"pad\":\"".to_vec();
        bytes.resize(MAX_CONTROL_FRAME_LEN + 1, b'x');
        assert_eq!(decode_frame(&bytes), FrameOutcome::Malformed);
    }

    #[test]
    fn encode_rejects_wrong_sample_count() {
        let res = encode_sample_packet(&SamplePacket::new(0, vec![1, 2, 3]));
        assert!(matches!(
            res,
            Err(EmgError::SampleCount {
                expected: 50,
                found: 3
            })
        ));
    }
}
