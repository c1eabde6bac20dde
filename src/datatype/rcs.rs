//! Restricted character sets (§4.4, §9 GLOSSARY "RCS"): small ordered
//! codepoint tables used by `Lexical` mode to compactly encode the lexical
//! form of a simple XSD type. A codepoint inside the set is emitted as its
//! index; one outside it is emitted as the sentinel `set.len()` followed by
//! the raw codepoint value (§4.4 "characters outside the RCS are emitted as
//! the sentinel N followed by the codepoint as an unsigned integer").

use crate::channel::{ChannelReader, ChannelWriter};
use crate::errors::Result;

use super::Datatype;

/// One of the nine built-in restricted character sets (§4.4), plus the
/// unrestricted fallback used for `xsd:string` and anything without a
/// narrower set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictedCharSet {
    Base64,
    Boolean,
    DateTime,
    Decimal,
    Double,
    HexBinary,
    Integer,
    /// `xsd:string` and anything else: no restricted set, codepoints are
    /// always written as the "outside the set" sentinel form.
    Unrestricted,
}

impl RestrictedCharSet {
    /// Picks the RCS that matches a datatype's lexical space (§4.4).
    pub fn for_datatype(datatype: &Datatype) -> Self {
        match datatype {
            Datatype::Binary(super::BinaryEncoding::Base64) => RestrictedCharSet::Base64,
            Datatype::Binary(super::BinaryEncoding::Hex) => RestrictedCharSet::HexBinary,
            Datatype::Boolean => RestrictedCharSet::Boolean,
            Datatype::DateTime(_) => RestrictedCharSet::DateTime,
            Datatype::Decimal => RestrictedCharSet::Decimal,
            Datatype::Float => RestrictedCharSet::Double,
            Datatype::Integer(_) => RestrictedCharSet::Integer,
            Datatype::String | Datatype::Enumeration(_) | Datatype::List(_) => RestrictedCharSet::Unrestricted,
        }
    }

    /// The ordered codepoint table itself. Empty for [`Self::Unrestricted`]
    /// — every codepoint takes the "outside the set" path.
    fn table(self) -> &'static [char] {
        match self {
            RestrictedCharSet::Base64 => &[
                'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T',
                'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n',
                'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7',
                '8', '9', '+', '/', '=',
            ],
            RestrictedCharSet::Boolean => &['t', 'r', 'u', 'e', 'f', 'a', 'l', 's', '0', '1'],
            RestrictedCharSet::DateTime => &[
                '-', ':', '.', 'T', 'Z', '+', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
            ],
            RestrictedCharSet::Decimal => &['-', '.', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9'],
            RestrictedCharSet::Double => &['-', '.', 'E', 'e', 'I', 'N', 'F', 'n', 'a', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9'],
            RestrictedCharSet::HexBinary => &[
                '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'a', 'b', 'c', 'd',
                'e', 'f',
            ],
            RestrictedCharSet::Integer => &['-', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9'],
            RestrictedCharSet::Unrestricted => &[],
        }
    }

    fn index_of(self, c: char) -> Option<u32> {
        self.table().iter().position(|&t| t == c).map(|i| i as u32)
    }

    fn n_bit_width(self) -> u32 {
        crate::channel::bits_for(self.table().len() as u32 + 1)
    }

    pub fn encode<W: ChannelWriter>(self, writer: &mut W, codepoints: &[u32]) -> Result<()> {
        writer.encode_unsigned_integer(codepoints.len() as u64)?;
        let width = self.n_bit_width();
        let sentinel = self.table().len() as u32;
        for &cp in codepoints {
            match char::from_u32(cp).and_then(|c| self.index_of(c)) {
                Some(idx) => writer.encode_n_bit_unsigned(idx, width)?,
                None => {
                    writer.encode_n_bit_unsigned(sentinel, width)?;
                    writer.encode_unsigned_integer(cp as u64)?;
                }
            }
        }
        Ok(())
    }

    pub fn decode<R: ChannelReader>(self, reader: &mut R) -> Result<Vec<u32>> {
        let len = reader.decode_unsigned_integer()? as usize;
        let width = self.n_bit_width();
        let sentinel = self.table().len() as u32;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            let code = reader.decode_n_bit_unsigned(width)?;
            if code == sentinel {
                out.push(reader.decode_unsigned_integer()? as u32);
            } else {
                out.push(self.table()[code as usize] as u32);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BitPackedReader, BitPackedWriter};

    fn round_trip(set: RestrictedCharSet, text: &str) {
        let codepoints: Vec<u32> = text.chars().map(|c| c as u32).collect();
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            set.encode(&mut w, &codepoints).unwrap();
            w.flush().unwrap();
        }
        let mut r = BitPackedReader::new(buf.as_slice());
        assert_eq!(set.decode(&mut r).unwrap(), codepoints);
    }

    #[test]
    fn integer_set_round_trips_in_set_chars() {
        round_trip(RestrictedCharSet::Integer, "-12345");
    }

    #[test]
    fn unrestricted_set_always_uses_sentinel_path() {
        round_trip(RestrictedCharSet::Unrestricted, "hello world");
    }

    #[test]
    fn out_of_set_codepoint_falls_back_to_sentinel() {
        round_trip(RestrictedCharSet::Integer, "1x2");
    }

    #[test]
    fn for_datatype_picks_matching_set() {
        assert_eq!(RestrictedCharSet::for_datatype(&Datatype::Boolean), RestrictedCharSet::Boolean);
        assert_eq!(RestrictedCharSet::for_datatype(&Datatype::String), RestrictedCharSet::Unrestricted);
    }
}
