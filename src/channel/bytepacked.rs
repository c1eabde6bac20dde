//! Byte-aligned channel implementation: every `n`-bit primitive occupies
//! `ceil(n/8)` whole bytes instead of exactly `n` bits.
//!
//! Implemented as a thin wrapper around [`BitPackedWriter`]/
//! [`BitPackedReader`] — every call here writes/reads a whole number of
//! bytes, so the inner bit-packed channel is always byte-aligned on entry
//! and exit, and [`align`](ChannelWriter::align)/[`flush`](ChannelWriter::flush)
//! simply forward.

use std::io::{Read, Write};

use delegate::delegate;

use super::{BitPackedReader, BitPackedWriter, ChannelReader, ChannelWriter};
use crate::errors::Result;

/// Byte-packed counterpart to [`BitPackedWriter`] (§4.1).
pub struct BytePackedWriter<W> {
    inner: BitPackedWriter<W>,
}

impl<W: Write> BytePackedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: BitPackedWriter::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W: Write> ChannelWriter for BytePackedWriter<W> {
    fn encode_n_bit_unsigned(&mut self, value: u32, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let byte_width = (n + 7) / 8;
        self.inner.encode_n_bit_unsigned(value, byte_width * 8)
    }

    fn encode_boolean(&mut self, value: bool) -> Result<()> {
        self.inner.encode_n_bit_unsigned(value as u32, 8)
    }

    delegate! {
        to self.inner {
            fn align(&mut self) -> Result<()>;
            fn flush(&mut self) -> Result<()>;
        }
    }
}

/// Byte-packed counterpart to [`BitPackedReader`] (§4.1).
pub struct BytePackedReader<R> {
    inner: BitPackedReader<R>,
}

impl<R: Read> BytePackedReader<R> {
    pub fn new(reader: R) -> Self {
        Self { inner: BitPackedReader::new(reader) }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> ChannelReader for BytePackedReader<R> {
    fn decode_n_bit_unsigned(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        let byte_width = (n + 7) / 8;
        self.inner.decode_n_bit_unsigned(byte_width * 8)
    }

    fn decode_boolean(&mut self) -> Result<bool> {
        Ok(self.inner.decode_n_bit_unsigned(8)? != 0)
    }

    delegate! {
        to self.inner {
            fn align(&mut self) -> Result<()>;
            fn look_ahead(&mut self) -> Result<u8>;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_bit_values_occupy_whole_bytes() {
        let mut buf = Vec::new();
        {
            let mut w = BytePackedWriter::new(&mut buf);
            w.encode_n_bit_unsigned(1, 3).unwrap();
            w.encode_boolean(true).unwrap();
            w.encode_n_bit_unsigned(300, 9).unwrap();
            w.flush().unwrap();
        }
        // 1 byte for the 3-bit value, 1 byte for the boolean, 2 bytes for the 9-bit value.
        assert_eq!(buf.len(), 4);

        let mut r = BytePackedReader::new(buf.as_slice());
        assert_eq!(r.decode_n_bit_unsigned(3).unwrap(), 1);
        assert_eq!(r.decode_boolean().unwrap(), true);
        assert_eq!(r.decode_n_bit_unsigned(9).unwrap(), 300);
    }

    #[test]
    fn unsigned_integer_round_trip() {
        let mut buf = Vec::new();
        let values = [0u64, 1, 127, 128, 1_000_000];
        {
            let mut w = BytePackedWriter::new(&mut buf);
            for &v in &values {
                w.encode_unsigned_integer(v).unwrap();
            }
            w.flush().unwrap();
        }
        let mut r = BytePackedReader::new(buf.as_slice());
        for &v in &values {
            assert_eq!(r.decode_unsigned_integer().unwrap(), v);
        }
    }

    #[test]
    fn string_round_trip() {
        let codepoints: Vec<u32> = "byte packed".chars().map(|c| c as u32).collect();
        let mut buf = Vec::new();
        {
            let mut w = BytePackedWriter::new(&mut buf);
            w.encode_string(&codepoints).unwrap();
            w.flush().unwrap();
        }
        let mut r = BytePackedReader::new(buf.as_slice());
        assert_eq!(r.decode_string().unwrap(), codepoints);
    }
}
