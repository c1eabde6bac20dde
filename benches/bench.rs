use criterion::{black_box, criterion_group, criterion_main, Criterion};

use exi_core::body::BodyEncoder;
use exi_core::channel::{bits_for, BitPackedReader, BitPackedWriter, ChannelReader, ChannelWriter};
use exi_core::datatype::{Datatype, Value};
use exi_core::grammar::pool::GrammarPool;
use exi_core::options::EncodingOptions;

/// Benchmarks the bit-packed channel's n-bit unsigned integer primitive in
/// isolation, with no grammar/string-table overhead above it.
fn n_bit_unsigned_roundtrip(c: &mut Criterion) {
    c.bench_function("n_bit_unsigned_roundtrip", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            {
                let mut w = BitPackedWriter::new(&mut buf);
                for v in 0..1000u32 {
                    w.encode_n_bit_unsigned(black_box(v & 0x3ff), 10).unwrap();
                }
                w.flush().unwrap();
            }
            let mut r = BitPackedReader::new(buf.as_slice());
            let mut sum = 0u64;
            for _ in 0..1000 {
                sum += r.decode_n_bit_unsigned(10).unwrap() as u64;
            }
            black_box(sum)
        })
    });
}

fn bits_for_table(c: &mut Criterion) {
    c.bench_function("bits_for", |b| {
        b.iter(|| {
            let mut total = 0u32;
            for n in 0..10_000u32 {
                total = total.wrapping_add(bits_for(black_box(n)));
            }
            black_box(total)
        })
    });
}

/// Benchmarks encoding a small document with a mix of learned and repeated
/// start elements and attribute values, exercising the grammar-learning
/// path and the value-partition hit path together (§4.3, §4.2).
fn encode_small_document(c: &mut Criterion) {
    let pool = GrammarPool::built_in();
    c.bench_function("encode_small_document", |b| {
        b.iter(|| {
            let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
            encoder.encode_start_document().unwrap();
            encoder.encode_start_element("", "root", None).unwrap();
            for _ in 0..20 {
                encoder.encode_start_element("", "item", None).unwrap();
                encoder.encode_attribute("", "id", Datatype::String, Value::String("hello".into())).unwrap();
                encoder.encode_end_element().unwrap();
            }
            encoder.encode_end_element().unwrap();
            encoder.encode_end_document().unwrap();
            black_box(encoder.finish().unwrap())
        })
    });
}

criterion_group!(benches, n_bit_unsigned_roundtrip, bits_for_table, encode_small_document);
criterion_main!(benches);
