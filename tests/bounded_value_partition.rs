//! Scenario 4 (spec.md §8): with a capacity-2 global value partition,
//! encoding three distinct values at the same qname displaces the first by
//! round-robin, and a decoder with the same capacity recovers the correct
//! current values.

use pretty_assertions::assert_eq;

use exi_core::channel::{BitPackedReader, BitPackedWriter, ChannelWriter};
use exi_core::string_table::ValueTable;

#[test]
fn third_distinct_value_displaces_the_first_by_round_robin() {
    const QNAME: (u32, u32) = (1, 0);

    let mut write_table = ValueTable::new(Some(2), None);
    let mut buf = Vec::new();
    {
        let mut w = BitPackedWriter::new(&mut buf);
        write_table.encode_value(&mut w, QNAME, "a").unwrap();
        write_table.encode_value(&mut w, QNAME, "b").unwrap();
        write_table.encode_value(&mut w, QNAME, "c").unwrap();
        // "a" was displaced by "c" (round-robin of globalId mod capacity);
        // re-encoding it is a fresh miss, not a table hit.
        write_table.encode_value(&mut w, QNAME, "a").unwrap();
        // "c" and "b" are both still live; re-encoding either is a hit.
        write_table.encode_value(&mut w, QNAME, "c").unwrap();
        w.flush().unwrap();
    }

    let mut read_table = ValueTable::new(Some(2), None);
    let mut r = BitPackedReader::new(buf.as_slice());
    assert_eq!(read_table.decode_value(&mut r, QNAME).unwrap().as_ref(), "a");
    assert_eq!(read_table.decode_value(&mut r, QNAME).unwrap().as_ref(), "b");
    assert_eq!(read_table.decode_value(&mut r, QNAME).unwrap().as_ref(), "c");
    assert_eq!(read_table.decode_value(&mut r, QNAME).unwrap().as_ref(), "a");
    assert_eq!(read_table.decode_value(&mut r, QNAME).unwrap().as_ref(), "c");
}
