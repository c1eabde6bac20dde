//! Type coding (§4.4): converting typed values to/from channel primitives,
//! in three modes — `Typed` (default, each datatype picks its natural
//! channel primitive), `Lexical` (every value routed through a restricted
//! character set coder), and `StringOnly` (always the string partition,
//! used when a value fails schema validity and must fall back per EXI
//! §7.1.7's "deviation" rule).

pub mod dtr;
pub mod rcs;

use std::rc::Rc;

use crate::channel::{ChannelReader, ChannelWriter, DateTimeKind};
use crate::errors::Result;
use crate::name::QNameContext;

/// The built-in EXI datatypes a schema type can resolve to (§3 "Datatype").
/// Distinct from [`crate::grammar::EventType`]'s use of this enum purely as
/// a matching key — here it additionally drives which channel primitive and
/// which [`rcs::RestrictedCharSet`] a value uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    Binary(BinaryEncoding),
    Boolean,
    Decimal,
    Float,
    DateTime(DateTimeKind),
    Integer(IntegerKind),
    String,
    Enumeration(Rc<[Rc<str>]>),
    List(Box<Datatype>),
}

/// How [`Datatype::Binary`] values are shown outside the typed channel
/// encoding — EXI's binary channel primitive is the same either way; this
/// only affects the restricted-character-set coder selected in `Lexical`
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryEncoding {
    Base64,
    Hex,
}

/// Which signedness/width family an `xsd:integer`-derived type belongs to,
/// enough to pick between `encode_unsigned_integer`/`encode_signed_integer`
/// and, in `Typed` mode, an n-bit encoding when the schema bounds the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerKind {
    Unsigned,
    Signed,
    /// Bounded non-negative range `[0, 2^n - 1]`, encoded as an n-bit
    /// unsigned integer (schema facet `minInclusive`/`maxInclusive` derived).
    NBitUnsigned(u32),
}

/// One decoded or to-be-encoded scalar value, tagged by the datatype that
/// produced/will consume it. This is the payload carried by
/// [`crate::event::Event::Characters`] and [`crate::event::Event::Attribute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Binary(Vec<u8>),
    Boolean(bool),
    Decimal(crate::channel::DecimalValue),
    Float(crate::channel::FloatValue),
    DateTime(crate::channel::DateTimeValue),
    UnsignedInteger(u64),
    SignedInteger(i64),
    String(Rc<str>),
    Enumeration(u32),
    List(Vec<Value>),
}

/// The three value-coding modes (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodingMode {
    /// Each datatype's natural channel primitive.
    Typed,
    /// Every value routed through a restricted character set coder
    /// (fidelity option `lexical_values`, or the string-only fallback for
    /// values that fail schema validity — §7.1.7's "deviation").
    Lexical,
    /// Always the string partition, ignoring the schema type entirely.
    StringOnly,
}

/// Encodes one value under a [`ValueCodingMode`], using `datatype` to pick the
/// channel primitive in `Typed`/`Lexical` modes.
pub fn encode_value<W: ChannelWriter>(
    writer: &mut W,
    mode: ValueCodingMode,
    datatype: &Datatype,
    value: &Value,
) -> Result<()> {
    match mode {
        ValueCodingMode::StringOnly => encode_string_only(writer, value),
        ValueCodingMode::Lexical => encode_lexical(writer, datatype, value),
        ValueCodingMode::Typed => encode_typed(writer, datatype, value),
    }
}

/// Decodes one value under a [`ValueCodingMode`], mirroring [`encode_value`].
pub fn decode_value<R: ChannelReader>(
    reader: &mut R,
    mode: ValueCodingMode,
    datatype: &Datatype,
) -> Result<Value> {
    match mode {
        ValueCodingMode::StringOnly => decode_string_only(reader),
        ValueCodingMode::Lexical => decode_lexical(reader, datatype),
        ValueCodingMode::Typed => decode_typed(reader, datatype),
    }
}

fn encode_string_only<W: ChannelWriter>(writer: &mut W, value: &Value) -> Result<()> {
    let codepoints = lexical_codepoints(value);
    writer.encode_string(&codepoints)
}

fn decode_string_only<R: ChannelReader>(reader: &mut R) -> Result<Value> {
    let codepoints = reader.decode_string()?;
    Ok(Value::String(codepoints_to_rc_str(&codepoints)))
}

fn encode_lexical<W: ChannelWriter>(writer: &mut W, datatype: &Datatype, value: &Value) -> Result<()> {
    let set = rcs::RestrictedCharSet::for_datatype(datatype);
    let codepoints = lexical_codepoints(value);
    set.encode(writer, &codepoints)
}

fn decode_lexical<R: ChannelReader>(reader: &mut R, datatype: &Datatype) -> Result<Value> {
    let set = rcs::RestrictedCharSet::for_datatype(datatype);
    let codepoints = set.decode(reader)?;
    Ok(Value::String(codepoints_to_rc_str(&codepoints)))
}

fn encode_typed<W: ChannelWriter>(writer: &mut W, datatype: &Datatype, value: &Value) -> Result<()> {
    match (datatype, value) {
        (Datatype::Boolean, Value::Boolean(b)) => writer.encode_boolean(*b),
        (Datatype::Decimal, Value::Decimal(d)) => writer.encode_decimal(d),
        (Datatype::Float, Value::Float(f)) => writer.encode_float(*f),
        (Datatype::DateTime(kind), Value::DateTime(d)) => writer.encode_date_time(*kind, d),
        (Datatype::Binary(_), Value::Binary(b)) => writer.encode_binary(b),
        (Datatype::Integer(IntegerKind::Unsigned), Value::UnsignedInteger(v)) => writer.encode_unsigned_integer(*v),
        (Datatype::Integer(IntegerKind::Signed), Value::SignedInteger(v)) => writer.encode_signed_integer(*v),
        (Datatype::Integer(IntegerKind::NBitUnsigned(n)), Value::UnsignedInteger(v)) => {
            writer.encode_n_bit_unsigned(*v as u32, *n)
        }
        (Datatype::String, Value::String(s)) => {
            let codepoints: Vec<u32> = s.chars().map(|c| c as u32).collect();
            writer.encode_string(&codepoints)
        }
        (Datatype::Enumeration(variants), Value::Enumeration(idx)) => {
            let n = crate::channel::bits_for(variants.len() as u32);
            writer.encode_n_bit_unsigned(*idx, n)
        }
        (Datatype::List(item_type), Value::List(items)) => {
            writer.encode_unsigned_integer(items.len() as u64)?;
            for item in items {
                encode_typed(writer, item_type, item)?;
            }
            Ok(())
        }
        _ => encode_string_only(writer, value),
    }
}

fn decode_typed<R: ChannelReader>(reader: &mut R, datatype: &Datatype) -> Result<Value> {
    Ok(match datatype {
        Datatype::Boolean => Value::Boolean(reader.decode_boolean()?),
        Datatype::Decimal => Value::Decimal(reader.decode_decimal()?),
        Datatype::Float => Value::Float(reader.decode_float()?),
        Datatype::DateTime(kind) => Value::DateTime(reader.decode_date_time(*kind)?),
        Datatype::Binary(_) => Value::Binary(reader.decode_binary()?),
        Datatype::Integer(IntegerKind::Unsigned) => Value::UnsignedInteger(reader.decode_unsigned_integer()?),
        Datatype::Integer(IntegerKind::Signed) => Value::SignedInteger(reader.decode_signed_integer()?),
        Datatype::Integer(IntegerKind::NBitUnsigned(n)) => {
            Value::UnsignedInteger(reader.decode_n_bit_unsigned(*n)? as u64)
        }
        Datatype::String => {
            let codepoints = reader.decode_string()?;
            Value::String(codepoints_to_rc_str(&codepoints))
        }
        Datatype::Enumeration(variants) => {
            let n = crate::channel::bits_for(variants.len() as u32);
            Value::Enumeration(reader.decode_n_bit_unsigned(n)?)
        }
        Datatype::List(item_type) => {
            let len = reader.decode_unsigned_integer()?;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(decode_typed(reader, item_type)?);
            }
            Value::List(items)
        }
    })
}

/// Renders any [`Value`] to its lexical (string) codepoint form, for use by
/// `Lexical`/`StringOnly` coding and by the `AttributeInvalidValue`/
/// `CharactersGenericUndeclared` deviation paths (§7.1.7).
fn lexical_codepoints(value: &Value) -> Vec<u32> {
    match value {
        Value::String(s) => s.chars().map(|c| c as u32).collect(),
        Value::Boolean(b) => (if *b { "true" } else { "false" }).chars().map(|c| c as u32).collect(),
        Value::UnsignedInteger(v) => v.to_string().chars().map(|c| c as u32).collect(),
        Value::SignedInteger(v) => v.to_string().chars().map(|c| c as u32).collect(),
        Value::Enumeration(idx) => idx.to_string().chars().map(|c| c as u32).collect(),
        Value::Decimal(d) => format!("{:?}", d).chars().map(|c| c as u32).collect(),
        Value::Float(f) => format!("{:?}", f).chars().map(|c| c as u32).collect(),
        Value::DateTime(d) => format!("{:?}", d).chars().map(|c| c as u32).collect(),
        Value::Binary(b) => b.iter().flat_map(|byte| format!("{:02x}", byte).chars().collect::<Vec<_>>()).map(|c| c as u32).collect(),
        Value::List(items) => items.iter().flat_map(lexical_codepoints).collect(),
    }
}

fn codepoints_to_rc_str(codepoints: &[u32]) -> Rc<str> {
    codepoints
        .iter()
        .filter_map(|&cp| char::from_u32(cp))
        .collect::<String>()
        .into()
}

/// A datatype qualified by the schema type name it was declared against, so
/// a [`dtr::DatatypeRepresentationMap`] lookup can redirect it (§4.4).
#[derive(Debug, Clone)]
pub struct SchemaType {
    pub qname: Rc<QNameContext>,
    pub base: Option<Box<SchemaType>>,
    pub built_in_datatype: Datatype,
}

impl SchemaType {
    /// Walks the base-type chain, applying `map` at each level, stopping at
    /// the first hit (§4.4 "construction of the effective datatype...walks
    /// up the base-type chain until a mapping is found").
    pub fn effective_datatype(&self, map: &dtr::DatatypeRepresentationMap) -> Datatype {
        let mut current = self;
        loop {
            if let Some(mapped) = map.lookup(&current.qname) {
                return mapped;
            }
            match &current.base {
                Some(base) => current = base,
                None => return self.built_in_datatype.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BitPackedReader, BitPackedWriter};

    #[test]
    fn typed_boolean_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            encode_value(&mut w, ValueCodingMode::Typed, &Datatype::Boolean, &Value::Boolean(true)).unwrap();
            w.flush().unwrap();
        }
        let mut r = BitPackedReader::new(buf.as_slice());
        let decoded = decode_value(&mut r, ValueCodingMode::Typed, &Datatype::Boolean).unwrap();
        assert_eq!(decoded, Value::Boolean(true));
    }

    #[test]
    fn string_only_ignores_datatype() {
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            encode_value(&mut w, ValueCodingMode::StringOnly, &Datatype::Boolean, &Value::Boolean(false)).unwrap();
            w.flush().unwrap();
        }
        let mut r = BitPackedReader::new(buf.as_slice());
        let decoded = decode_value(&mut r, ValueCodingMode::StringOnly, &Datatype::Boolean).unwrap();
        assert_eq!(decoded, Value::String("false".into()));
    }

    #[test]
    fn list_round_trip() {
        let datatype = Datatype::List(Box::new(Datatype::Integer(IntegerKind::Unsigned)));
        let value = Value::List(vec![Value::UnsignedInteger(1), Value::UnsignedInteger(2), Value::UnsignedInteger(3)]);
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            encode_value(&mut w, ValueCodingMode::Typed, &datatype, &value).unwrap();
            w.flush().unwrap();
        }
        let mut r = BitPackedReader::new(buf.as_slice());
        assert_eq!(decode_value(&mut r, ValueCodingMode::Typed, &datatype).unwrap(), value);
    }
}
