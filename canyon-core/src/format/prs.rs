//! This module contains the decoder for PRS, the LZ77 variant every ONE archive entry is compressed with
//!
//! Tokens are told apart by control bits. Control bits are packed into bytes, consumed LSB-first,
//!     and the bytes are interleaved with the payload: a new control byte is read from the input
//!     at the moment the previous one runs out, which can be in the middle of a token.
//!
//! ```text
//! control  payload                       token
//! 1        byte                          literal
//! 0 0 h l  byte o                        short match: length hl + 2, offset o - 256 (-256..=-1)
//! 0 1      u16 le f (f != 0)             long match: offset (f >> 3) - 8192 (-8192..=-1),
//!          [byte n if f & 7 == 0]            length f & 7 + 2, or n + 1 when f & 7 == 0
//! 0 1      u16 le 0                      end of stream
//! ```
//!
//! A match copies `length` bytes starting `offset` bytes behind the current end of the output.
//! The length may exceed the distance, so the copy must go byte by byte: bytes produced by the match
//!     itself become the source for its later bytes.
//!
//! Nothing in the stream declares the decoded size, so the output is grown as the stream is decoded.
//! Only decoding is implemented.

use canyon_primitives::buffer::{BufferError, ByteBuffer, OwnedBuffer};
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use tracing::{instrument, trace};

const SHORT_OFFSET_MASK: u32 = 0xffff_ff00;
const LONG_OFFSET_MASK: u32 = 0xffff_e000;

#[derive(Debug, Snafu)]
pub enum PrsError {
    #[snafu(display("PRS stream ended before its terminator"))]
    Truncated { source: BufferError },
    #[snafu(display(
        "back-reference with offset {offset} at output position {position} points before the start of the output"
    ))]
    ReferenceBeforeStart { position: usize, offset: i32 },
    #[snafu(display("writing decoded output"))]
    Output { source: BufferError },
}

enum Token {
    Literal(u8),
    Match { offset: i32, length: usize },
    End,
}

struct ControlBits {
    byte: u8,
    remaining: u32,
}

impl ControlBits {
    fn new() -> Self {
        Self {
            byte: 0,
            remaining: 0,
        }
    }

    fn next(&mut self, input: &mut ByteBuffer) -> Result<bool, PrsError> {
        if self.remaining == 0 {
            self.byte = input.read_u8().context(TruncatedSnafu)?;
            self.remaining = 8;
        }
        let bit = self.byte & 1;
        self.byte >>= 1;
        self.remaining -= 1;
        Ok(bit != 0)
    }
}

struct TokenReader<'a> {
    input: ByteBuffer<'a>,
    bits: ControlBits,
}

impl<'a> TokenReader<'a> {
    fn new(input: ByteBuffer<'a>) -> Self {
        Self {
            input,
            bits: ControlBits::new(),
        }
    }

    fn bit(&mut self) -> Result<bool, PrsError> {
        self.bits.next(&mut self.input)
    }

    fn byte(&mut self) -> Result<u8, PrsError> {
        self.input.read_u8().context(TruncatedSnafu)
    }

    fn next_token(&mut self) -> Result<Token, PrsError> {
        if self.bit()? {
            return Ok(Token::Literal(self.byte()?));
        }

        if self.bit()? {
            let field = self.input.read_u16_le().context(TruncatedSnafu)?;
            if field == 0 {
                return Ok(Token::End);
            }

            let offset = ((field as u32 >> 3) | LONG_OFFSET_MASK) as i32;
            let length = match field & 0b111 {
                0 => self.byte()? as usize + 1,
                selector => selector as usize + 2,
            };
            Ok(Token::Match { offset, length })
        } else {
            let high = self.bit()? as usize;
            let low = self.bit()? as usize;
            let offset = (self.byte()? as u32 | SHORT_OFFSET_MASK) as i32;
            Ok(Token::Match {
                offset,
                length: ((high << 1) | low) + 2,
            })
        }
    }
}

fn copy_match(output: &mut OwnedBuffer, offset: i32, length: usize) -> Result<(), PrsError> {
    let position = output.tell();
    let start = position
        .checked_sub(offset.unsigned_abs() as usize)
        .context(ReferenceBeforeStartSnafu { position, offset })?;

    for i in 0..length {
        // may read a byte this very loop has written
        let byte = output.as_slice()[start + i];
        output.write_u8(byte).context(OutputSnafu)?;
    }
    Ok(())
}

/// Decodes a complete PRS stream.
///
/// Bytes after the terminator are ignored.
pub fn decode(input: &[u8]) -> Result<OwnedBuffer, PrsError> {
    decode_buffer(&ByteBuffer::borrowed(input))
}

/// Decodes the whole content of `compressed`, regardless of its cursor.
///
/// The returned buffer is owned, no longer stretchy, and has its cursor at the start.
#[instrument(level = "trace", skip_all, fields(compressed_len = compressed.size()))]
pub fn decode_buffer(compressed: &ByteBuffer) -> Result<OwnedBuffer, PrsError> {
    let mut tokens = TokenReader::new(compressed.view());
    let mut output = ByteBuffer::stretchy(compressed.size());

    loop {
        match tokens.next_token()? {
            Token::Literal(byte) => output.write_u8(byte).context(OutputSnafu)?,
            Token::Match { offset, length } => copy_match(&mut output, offset, length)?,
            Token::End => break,
        }
    }

    trace!(
        decoded_len = output.size(),
        consumed = tokens.input.tell(),
        "decoded PRS stream"
    );

    output.set_stretchy(false);
    output.rewind();
    Ok(output)
}

/// Computes the decoded size of a PRS stream without producing the output.
///
/// Fails on exactly the same inputs [`decode`] fails on.
pub fn decoded_size(input: &[u8]) -> Result<usize, PrsError> {
    let mut tokens = TokenReader::new(ByteBuffer::borrowed(input));
    let mut size = 0usize;

    loop {
        match tokens.next_token()? {
            Token::Literal(_) => size += 1,
            Token::Match { offset, length } => {
                ensure!(
                    offset.unsigned_abs() as usize <= size,
                    ReferenceBeforeStartSnafu {
                        position: size,
                        offset,
                    }
                );
                size += length;
            }
            Token::End => return Ok(size),
        }
    }
}

#[cfg(test)]
mod test {
    use insta::assert_snapshot;

    use super::{PrsError, decode, decoded_size};

    fn decode_vec(input: &[u8]) -> Vec<u8> {
        let output = decode(input).unwrap();
        assert_eq!(decoded_size(input).unwrap(), output.size());
        output.into_vec()
    }

    /// Lays out tokens the way the decoder expects them, for fixtures too long to write by hand.
    struct StreamWriter {
        out: Vec<u8>,
        control_pos: usize,
        used_bits: u32,
    }

    impl StreamWriter {
        fn new() -> Self {
            Self {
                out: Vec::new(),
                control_pos: 0,
                used_bits: 8,
            }
        }

        fn bit(&mut self, bit: bool) {
            if self.used_bits == 8 {
                self.control_pos = self.out.len();
                self.out.push(0);
                self.used_bits = 0;
            }
            if bit {
                self.out[self.control_pos] |= 1 << self.used_bits;
            }
            self.used_bits += 1;
        }

        fn literals(&mut self, bytes: &[u8]) {
            for &byte in bytes {
                self.bit(true);
                self.out.push(byte);
            }
        }

        fn short_match(&mut self, offset: i32, length: usize) {
            assert!((-256..0).contains(&offset) && (2..=5).contains(&length));
            let selector = length - 2;
            self.bit(false);
            self.bit(false);
            self.bit(selector & 2 != 0);
            self.bit(selector & 1 != 0);
            self.out.push(offset as u8);
        }

        fn long_match(&mut self, offset: i32, length: usize) {
            assert!((-8192..0).contains(&offset) && (1..=256).contains(&length));
            self.bit(false);
            self.bit(true);
            let offset_bits = ((offset as u32) & 0x1fff) << 3;
            if (3..=9).contains(&length) {
                let field = offset_bits as u16 | (length - 2) as u16;
                self.out.extend(field.to_le_bytes());
            } else {
                self.out.extend((offset_bits as u16).to_le_bytes());
                self.out.push((length - 1) as u8);
            }
        }

        fn finish(mut self) -> Vec<u8> {
            self.bit(false);
            self.bit(true);
            self.out.extend([0, 0]);
            self.out
        }
    }

    #[test]
    fn empty_stream() {
        assert_eq!(decode_vec(&[0x02, 0x00, 0x00]), b"");
    }

    #[test]
    fn literals_only() {
        assert_eq!(decode_vec(&[0x17, b'A', b'B', b'C', 0x00, 0x00]), b"ABC");
    }

    #[test]
    fn literals_span_control_bytes() {
        let input = hex::decode("ff414243444546474805490000").unwrap();
        assert_eq!(decode_vec(&input), b"ABCDEFGHI");
    }

    #[test]
    fn short_match_overlapping_run() {
        // "AB", then 4 bytes from 2 behind: the copy reads what it has just written
        let input = [0x93, b'A', b'B', 0xfe, 0x00, 0x00];
        assert_eq!(decode_vec(&input), b"ABABAB");
    }

    #[test]
    fn long_match_with_inline_length() {
        let input = [0x57, b'A', b'B', b'C', 0xe9, 0xff, 0x00, 0x00];
        assert_eq!(decode_vec(&input), b"ABCABC");
    }

    #[test]
    fn long_match_with_extra_length_byte() {
        let input = [0x57, b'A', b'B', b'C', 0xe8, 0xff, 0x04, 0x00, 0x00];
        assert_eq!(decode_vec(&input), b"ABCABCAB");
    }

    #[test]
    fn run_of_one_byte() {
        // classic LZ77 run-length: offset -1, long length
        let mut writer = StreamWriter::new();
        writer.literals(b"z");
        writer.long_match(-1, 200);
        assert_eq!(decode_vec(&writer.finish()), vec![b'z'; 201]);
    }

    #[test]
    fn far_references() {
        let data: Vec<u8> = (0..300u32).map(|i| (i * 7 % 251) as u8).collect();

        let mut writer = StreamWriter::new();
        writer.literals(&data);
        writer.long_match(-300, 10);
        writer.short_match(-256, 5);
        writer.long_match(-8, 3);
        let input = writer.finish();

        let mut expected = data.clone();
        expected.extend_from_slice(&data[..10]);
        let start = expected.len() - 256;
        expected.extend_from_within(start..start + 5);
        let start = expected.len() - 8;
        expected.extend_from_within(start..start + 3);

        assert_eq!(decode_vec(&input), expected);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        assert_eq!(decode_vec(&[0x17, b'A', b'B', b'C', 0x00, 0x00, 0xde, 0xad]), b"ABC");
    }

    #[test]
    fn output_is_rewound_and_frozen() {
        let output = decode(&[0x17, b'A', b'B', b'C', 0x00, 0x00]).unwrap();
        assert_eq!(output.tell(), 0);
        assert!(!output.is_stretchy());
        assert!(output.is_owned());
    }

    #[test]
    fn truncated_stream() {
        let inputs: [&[u8]; 3] = [&[], &[0x17, b'A'], &[0x17, b'A', b'B', b'C', 0x00]];
        for input in inputs {
            assert!(matches!(decode(input), Err(PrsError::Truncated { .. })));
            assert!(matches!(decoded_size(input), Err(PrsError::Truncated { .. })));
        }
    }

    #[test]
    fn reference_before_start() {
        // a short match with offset -1 as the very first token
        let input = [0x00, 0xff];
        let err = decode(&input).unwrap_err();
        assert_snapshot!(err, @"back-reference with offset -1 at output position 0 points before the start of the output");
        assert!(matches!(
            decoded_size(&input),
            Err(PrsError::ReferenceBeforeStart {
                position: 0,
                offset: -1
            })
        ));
    }
}
