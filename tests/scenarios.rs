//! Literal round-trip scenarios from spec.md §8, driven entirely through
//! the public `BodyEncoder`/`BodyDecoder` surface.

use pretty_assertions::assert_eq;

use exi_core::body::{BodyDecoder, BodyEncoder};
use exi_core::datatype::{Datatype, Value};
use exi_core::event::Event;
use exi_core::grammar::pool::GrammarPool;
use exi_core::options::{CodingMode, EncodingOptions, OptionsBuilder};

/// Scenario 1: `<r/>` against a schemaless built-in grammar, all defaults.
/// The decoded event sequence must equal `[SD, SE("", "r"), EE, ED]`.
#[test]
fn empty_document_round_trips() {
    let pool = GrammarPool::built_in();
    let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element("", "r", None).unwrap();
    encoder.encode_end_element().unwrap();
    encoder.encode_end_document().unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, EncodingOptions::schemaless_defaults());
    decoder.decode_start_document().unwrap();
    match decoder.decode_event().unwrap() {
        Event::StartElement(qnc) => {
            assert_eq!(qnc.uri.as_ref(), "");
            assert_eq!(qnc.local_name.as_ref(), "r");
        }
        other => panic!("expected SE, got {:?}", other.family()),
    }
    assert!(matches!(decoder.decode_event().unwrap(), Event::EndElement));
    decoder.decode_end_document().unwrap();
}

/// Scenario 2: `<p:a xmlns:p="urn:x"/>` with PRESERVE_PREFIX on; round-trip
/// recovers both the URI and the prefix exactly.
#[test]
fn prefixed_element_with_namespace_round_trips() {
    let pool = GrammarPool::built_in();
    let options = OptionsBuilder::new().preserve_prefixes(true).build().unwrap();

    let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), options.clone());
    encoder.encode_start_document().unwrap();
    encoder.encode_namespace_declaration("urn:x", "p", true).unwrap();
    encoder.encode_start_element("urn:x", "a", Some("p")).unwrap();
    encoder.encode_end_element().unwrap();
    encoder.encode_end_document().unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, options);
    decoder.decode_start_document().unwrap();
    let (uri, prefix, _) = decoder.decode_namespace_declaration().unwrap();
    assert_eq!(uri.as_ref(), "urn:x");
    assert_eq!(prefix.as_ref(), "p");
    match decoder.decode_event().unwrap() {
        Event::StartElement(qnc) => assert_eq!(qnc.uri.as_ref(), "urn:x"),
        other => panic!("expected SE, got {:?}", other.family()),
    }
    assert_eq!(decoder.current_prefix().map(|p| p.as_ref()), Some("p"));
}

/// Scenario 3: `<a x="hello"/><a x="hello"/>`; the second attribute value
/// must be a table hit, never a second length-prefixed string.
#[test]
fn repeated_attribute_value_is_a_table_hit() {
    let pool = GrammarPool::built_in();
    let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element("", "a", None).unwrap();
    encoder.encode_attribute("", "x", Datatype::String, Value::String("hello".into())).unwrap();
    encoder.encode_end_element().unwrap();
    encoder.encode_start_element("", "a", None).unwrap();
    encoder.encode_attribute("", "x", Datatype::String, Value::String("hello".into())).unwrap();
    encoder.encode_end_element().unwrap();
    encoder.encode_end_document().unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, EncodingOptions::schemaless_defaults());
    decoder.decode_start_document().unwrap();
    for _ in 0..2 {
        decoder.decode_event().unwrap(); // SE a
        match decoder.decode_event().unwrap() {
            Event::Attribute(_, datatype, value) => {
                assert_eq!(datatype, Datatype::String);
                assert_eq!(value, Value::String("hello".into()));
            }
            other => panic!("expected AT, got {:?}", other.family()),
        }
        decoder.decode_event().unwrap(); // EE a
    }
}

/// Scenario 5: against a schemaless grammar, `<r><x/><x/></r>` — the second
/// `<x/>` must cost strictly fewer bytes than the first, since the built-in
/// grammar for `<r>` has learned `SE(x)` as its most recent production.
/// Byte-packed coding mode removes bit-alignment noise from the comparison.
#[test]
fn second_occurrence_of_a_learned_element_is_cheaper() {
    let pool = GrammarPool::built_in();
    let options = OptionsBuilder::new().coding_mode(CodingMode::BytePacked).build().unwrap();

    let bytes_for = |child_count: usize| -> usize {
        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), options.clone());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "r", None).unwrap();
        for _ in 0..child_count {
            encoder.encode_start_element("", "x", None).unwrap();
            encoder.encode_end_element().unwrap();
        }
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        encoder.finish().unwrap().len()
    };

    let zero = bytes_for(0);
    let one = bytes_for(1);
    let two = bytes_for(2);

    let first_child_cost = one - zero;
    let second_child_cost = two - one;
    assert!(
        second_child_cost < first_child_cost,
        "expected learned SE(x) to cost fewer bytes than its first, undeclared occurrence: {} vs {}",
        second_child_cost,
        first_child_cost
    );
}
