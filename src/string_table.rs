//! String tables (§4.2): the URI/local-name/prefix partitions (built on
//! [`crate::name::RuntimeUriContext`]) plus the value partitions this module
//! owns outright — a local partition per qname and one global partition,
//! with optional bounded capacity and round-robin displacement.

use std::collections::HashMap;
use std::rc::Rc;

use crate::channel::{bits_for, ChannelReader, ChannelWriter};
use crate::errors::Result;
use crate::name::{GrammarUriContext, LocalNameId, QNameContext, RuntimeUriContext, UriId};

/// The ordered URI table, indexed by [`UriId`] (§3 "Grammar URI context",
/// "Runtime URI context"). Wraps one [`RuntimeUriContext`] per known URI and
/// implements the miss/hit wire encoding from §4.2.
#[derive(Debug, Default)]
pub struct UriTable {
    uris: Vec<RuntimeUriContext>,
}

impl UriTable {
    pub fn new() -> Self {
        Self { uris: Vec::new() }
    }

    /// Seeds the table from schema-built [`GrammarUriContext`]s, in
    /// ascending URI-id order (§3 "Assigned a URI id in schema order").
    pub fn from_grammar_contexts(contexts: &[Rc<GrammarUriContext>]) -> Self {
        Self { uris: contexts.iter().cloned().map(RuntimeUriContext::new).collect() }
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn get(&self, id: UriId) -> Option<&RuntimeUriContext> {
        self.uris.get(id as usize)
    }

    pub fn get_mut(&mut self, id: UriId) -> Option<&mut RuntimeUriContext> {
        self.uris.get_mut(id as usize)
    }

    pub fn find(&self, uri: &str) -> Option<UriId> {
        self.uris.iter().position(|ctx| &*ctx.grammar.uri == uri).map(|i| i as UriId)
    }

    /// Appends a runtime-learned URI, wrapping a fresh, empty
    /// [`GrammarUriContext`] for it.
    fn add(&mut self, uri: Rc<str>) -> UriId {
        let id = self.uris.len() as UriId;
        let grammar = Rc::new(GrammarUriContext::new(id, uri));
        self.uris.push(RuntimeUriContext::new(grammar));
        id
    }

    /// Discards every runtime-learned portion, keeping the schema-seeded
    /// URIs (and their runtime-learned local names/prefixes are themselves
    /// cleared individually — see [`crate::name::RuntimeUriContext::init_for_each_run`]).
    /// The URI table itself never shrinks: URIs, once learned, remain known
    /// for the life of the codec instance per §3's "Runtime URI contexts are
    /// reset...per document" (the reset is of the *name* partitions they
    /// own, not of the URI table's membership, since EXI does not allow
    /// "forgetting" a URI mid-process).
    pub fn init_for_each_run(&mut self) {
        for ctx in &mut self.uris {
            ctx.init_for_each_run();
        }
    }

    /// Encodes a URI reference (§4.2): `(id+1)` as a `ceil(log2(n+1))`-bit
    /// unsigned integer on a hit, else `0` followed by the URI string; on
    /// miss the URI is appended to the table.
    pub fn encode_uri<W: ChannelWriter>(&mut self, writer: &mut W, uri: &str) -> Result<UriId> {
        let width = bits_for(self.uris.len() as u32 + 1);
        match self.find(uri) {
            Some(id) => {
                writer.encode_n_bit_unsigned(id + 1, width)?;
                Ok(id)
            }
            None => {
                writer.encode_n_bit_unsigned(0, width)?;
                let codepoints: Vec<u32> = uri.chars().map(|c| c as u32).collect();
                writer.encode_string(&codepoints)?;
                Ok(self.add(Rc::from(uri)))
            }
        }
    }

    /// Decodes a URI reference, mirroring [`Self::encode_uri`].
    pub fn decode_uri<R: ChannelReader>(&mut self, reader: &mut R) -> Result<UriId> {
        let width = bits_for(self.uris.len() as u32 + 1);
        let code = reader.decode_n_bit_unsigned(width)?;
        if code == 0 {
            let codepoints = reader.decode_string()?;
            let uri: Rc<str> = codepoints
                .iter()
                .filter_map(|&cp| char::from_u32(cp))
                .collect::<String>()
                .into();
            Ok(self.add(uri))
        } else {
            Ok(code - 1)
        }
    }

    /// Encodes a local-name reference within `uri_id`'s partition (§4.2): a
    /// single unsigned-integer field is the marker itself — `0` then an
    /// n-bit index on a hit, else `(len+1)` then the string (with no
    /// further length prefix of its own) on a miss, appended to that URI's
    /// runtime local names afterward.
    pub fn encode_local_name<W: ChannelWriter>(&mut self, writer: &mut W, uri_id: UriId, local: &str) -> Result<(LocalNameId, Rc<QNameContext>)> {
        let ctx = self.uris.get_mut(uri_id as usize).expect("unknown uri id");
        if let Some(qnc) = ctx.find_local_name(local).cloned() {
            writer.encode_unsigned_integer(0)?;
            let n = bits_for(ctx.local_name_count() as u32);
            writer.encode_n_bit_unsigned(qnc.local_id, n)?;
            return Ok((qnc.local_id, qnc));
        }
        let codepoints: Vec<u32> = local.chars().map(|c| c as u32).collect();
        writer.encode_unsigned_integer(codepoints.len() as u64 + 1)?;
        writer.encode_string_only(&codepoints)?;
        Ok(ctx.add_local_name(uri_id, Rc::from(local)))
    }

    /// Encodes a prefix reference within `uri_id`'s prefix partition (§4.2,
    /// §4.5 "If preserve-prefix, encode the prefix via the URI's prefix
    /// partition"): a miss/hit boolean, then either the string (miss) or an
    /// n-bit index into the partition (hit). Used by `NS` events and, when
    /// `PRESERVE_PREFIX` is on, every `SE` occurrence.
    pub fn encode_prefix<W: ChannelWriter>(&mut self, writer: &mut W, uri_id: UriId, prefix: &str) -> Result<()> {
        let ctx = self.uris.get_mut(uri_id as usize).expect("unknown uri id");
        match ctx.find_prefix(prefix) {
            Some(id) => {
                writer.encode_boolean(false)?;
                let n = bits_for(ctx.prefix_count() as u32);
                writer.encode_n_bit_unsigned(id, n)
            }
            None => {
                writer.encode_boolean(true)?;
                let codepoints: Vec<u32> = prefix.chars().map(|c| c as u32).collect();
                writer.encode_string(&codepoints)?;
                ctx.add_prefix(Rc::from(prefix));
                Ok(())
            }
        }
    }

    /// Decodes a prefix reference, mirroring [`Self::encode_prefix`].
    pub fn decode_prefix<R: ChannelReader>(&mut self, reader: &mut R, uri_id: UriId) -> Result<Rc<str>> {
        let ctx = self.uris.get_mut(uri_id as usize).expect("unknown uri id");
        let miss = reader.decode_boolean()?;
        if miss {
            let codepoints = reader.decode_string()?;
            let prefix: Rc<str> = codepoints
                .iter()
                .filter_map(|&cp| char::from_u32(cp))
                .collect::<String>()
                .into();
            ctx.add_prefix(prefix.clone());
            Ok(prefix)
        } else {
            let n = bits_for(ctx.prefix_count() as u32);
            let id = reader.decode_n_bit_unsigned(n)?;
            ctx.prefix_by_id(id).cloned().ok_or(crate::errors::Error::PartitionIndexOutOfBounds { partition: "prefix", index: id })
        }
    }

    /// Decodes a local-name reference, mirroring [`Self::encode_local_name`].
    pub fn decode_local_name<R: ChannelReader>(&mut self, reader: &mut R, uri_id: UriId) -> Result<(LocalNameId, Rc<QNameContext>)> {
        let ctx = self.uris.get_mut(uri_id as usize).expect("unknown uri id");
        let marker = reader.decode_unsigned_integer()?;
        if marker == 0 {
            let n = bits_for(ctx.local_name_count() as u32);
            let id = reader.decode_n_bit_unsigned(n)?;
            let qnc = ctx.local_name_by_id(id).cloned().ok_or(crate::errors::Error::PartitionIndexOutOfBounds { partition: "local-name", index: id })?;
            Ok((id, qnc))
        } else {
            let len = (marker - 1) as usize;
            let codepoints = reader.decode_string_only(len)?;
            let local: Rc<str> = codepoints
                .iter()
                .filter_map(|&cp| char::from_u32(cp))
                .collect::<String>()
                .into();
            Ok(ctx.add_local_name(uri_id, local))
        }
    }
}

/// One stored value plus the qname it was last seen under (§3 "String value
/// container"). Bookkeeping entry for [`ValueTable`]'s global partition.
#[derive(Debug, Clone)]
struct GlobalValueEntry {
    value: Rc<str>,
}

/// The value partitions (§4.2): one local partition per qname, one global
/// partition shared across all qnames, with optional bounded capacity and
/// round-robin displacement (§3 Invariants: "displaces exactly one previous
/// entry by round-robin of `globalID mod capacity`").
#[derive(Debug, Default)]
pub struct ValueTable {
    /// Global partition, indexed by global value id. `None` marks a slot
    /// whose owning local partition was tombstoned after a round-robin
    /// displacement (read-side placeholder so ids stay stable).
    global: Vec<Option<GlobalValueEntry>>,
    /// `string -> global id`, the structure that makes the "look up by
    /// string identity" hit path O(1).
    global_lookup: HashMap<Rc<str>, u32>,
    /// Local partitions, keyed by `(uri_id, local_id)`: each is an ordered
    /// list of global ids whose values were added under that qname. A slot
    /// whose global entry was displaced by round-robin eviction is
    /// tombstoned to `None` in place rather than removed, so every
    /// surviving local-value-id keeps its position (§3 Invariants).
    local: HashMap<(UriId, LocalNameId), Vec<Option<u32>>>,
    /// `None` = unbounded; `Some(c)` = ring of exactly `c` slots.
    capacity: Option<u32>,
    max_length: Option<u32>,
    next_global_id: u32,
}

impl ValueTable {
    pub fn new(capacity: Option<u32>, max_length: Option<u32>) -> Self {
        Self {
            global: Vec::new(),
            global_lookup: HashMap::new(),
            local: HashMap::new(),
            capacity,
            max_length,
            next_global_id: 0,
        }
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.global_lookup.clear();
        self.local.clear();
        self.next_global_id = 0;
    }

    fn local_size(&self, qname: (UriId, LocalNameId)) -> usize {
        self.local.get(&qname).map_or(0, Vec::len)
    }

    fn global_size(&self) -> usize {
        match self.capacity {
            Some(cap) => (self.next_global_id as usize).min(cap as usize),
            None => self.global.len(),
        }
    }

    /// Encodes an attribute/characters value (§4.2 "Value partitions"): hit
    /// in the local partition, hit only in the global partition, or miss.
    pub fn encode_value<W: ChannelWriter>(
        &mut self,
        writer: &mut W,
        qname: (UriId, LocalNameId),
        value: &str,
    ) -> Result<()> {
        if let Some(&global_id) = self.global_lookup.get(value) {
            let local_ids = self.local.entry(qname).or_default();
            if let Some(local_idx) = local_ids.iter().position(|&id| id == Some(global_id)) {
                writer.encode_unsigned_integer(0)?;
                let n = bits_for(local_ids.len() as u32);
                writer.encode_n_bit_unsigned(local_idx as u32, n)?;
            } else {
                writer.encode_unsigned_integer(1)?;
                let n = bits_for(self.global_size() as u32);
                writer.encode_n_bit_unsigned(global_id, n)?;
            }
            return Ok(());
        }

        let codepoints: Vec<u32> = value.chars().map(|c| c as u32).collect();
        writer.encode_unsigned_integer(codepoints.len() as u64 + 2)?;
        writer.encode_string_only(&codepoints)?;

        if self.max_length.map_or(true, |max| codepoints.len() as u32 <= max) {
            self.add(qname, value);
        }
        Ok(())
    }

    /// Decodes an attribute/characters value, mirroring [`Self::encode_value`].
    pub fn decode_value<R: ChannelReader>(&mut self, reader: &mut R, qname: (UriId, LocalNameId)) -> Result<Rc<str>> {
        let marker = reader.decode_unsigned_integer()?;
        match marker {
            0 => {
                let local_ids = self.local.entry(qname).or_default();
                let n = bits_for(local_ids.len() as u32);
                let idx = reader.decode_n_bit_unsigned(n)? as usize;
                let global_id = local_ids
                    .get(idx)
                    .copied()
                    .flatten()
                    .ok_or(crate::errors::Error::PartitionIndexOutOfBounds { partition: "value-local", index: idx as u32 })?;
                self.global
                    .get(global_id as usize)
                    .and_then(|slot| slot.as_ref())
                    .map(|e| e.value.clone())
                    .ok_or(crate::errors::Error::PartitionIndexOutOfBounds { partition: "value-global", index: global_id })
            }
            1 => {
                let n = bits_for(self.global_size() as u32);
                let global_id = reader.decode_n_bit_unsigned(n)?;
                self.global
                    .get(global_id as usize)
                    .and_then(|slot| slot.as_ref())
                    .map(|e| e.value.clone())
                    .ok_or(crate::errors::Error::PartitionIndexOutOfBounds { partition: "value-global", index: global_id })
            }
            len_plus_2 => {
                let len = (len_plus_2 - 2) as usize;
                let codepoints = reader.decode_string_only(len)?;
                let value: Rc<str> = codepoints
                    .iter()
                    .filter_map(|&cp| char::from_u32(cp))
                    .collect::<String>()
                    .into();
                if self.max_length.map_or(true, |max| len as u32 <= max) {
                    self.add(qname, &value);
                }
                Ok(value)
            }
        }
    }

    /// Adds `value` to both the local partition for `qname` and the global
    /// partition, applying round-robin displacement when bounded (§3
    /// Invariants).
    fn add(&mut self, qname: (UriId, LocalNameId), value: &str) {
        let value: Rc<str> = Rc::from(value);
        let global_id = match self.capacity {
            Some(cap) if self.next_global_id >= cap => {
                let slot = self.next_global_id % cap;
                if let Some(displaced) = self.global.get_mut(slot as usize).and_then(Option::take) {
                    self.global_lookup.remove(&displaced.value);
                    for ids in self.local.values_mut() {
                        for id in ids.iter_mut() {
                            if *id == Some(slot) {
                                *id = None;
                            }
                        }
                    }
                }
                self.global[slot as usize] = Some(GlobalValueEntry { value: value.clone() });
                slot
            }
            _ => {
                let slot = self.global.len() as u32;
                self.global.push(Some(GlobalValueEntry { value: value.clone() }));
                slot
            }
        };
        self.global_lookup.insert(value, global_id);
        self.local.entry(qname).or_default().push(Some(global_id));
        self.next_global_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BitPackedReader, BitPackedWriter};

    #[test]
    fn uri_table_hit_then_miss_round_trips() {
        let mut write_table = UriTable::new();
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            write_table.encode_uri(&mut w, "urn:a").unwrap();
            write_table.encode_uri(&mut w, "urn:a").unwrap();
            write_table.encode_uri(&mut w, "urn:b").unwrap();
            w.flush().unwrap();
        }
        let mut read_table = UriTable::new();
        let mut r = BitPackedReader::new(buf.as_slice());
        let a1 = read_table.decode_uri(&mut r).unwrap();
        let a2 = read_table.decode_uri(&mut r).unwrap();
        let b = read_table.decode_uri(&mut r).unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn value_table_second_encoding_is_not_longer() {
        let mut table = ValueTable::new(None, None);
        let mut buf1 = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf1);
            table.encode_value(&mut w, (1, 0), "hello").unwrap();
            w.flush().unwrap();
        }
        let mut buf2 = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf2);
            table.encode_value(&mut w, (1, 0), "hello").unwrap();
            w.flush().unwrap();
        }
        assert!(buf2.len() <= buf1.len());
    }

    #[test]
    fn bounded_global_partition_displaces_round_robin() {
        let mut table = ValueTable::new(Some(2), None);
        table.add((1, 0), "a");
        table.add((1, 0), "b");
        table.add((1, 0), "c");

        assert_eq!(table.global[0].as_ref().unwrap().value.as_ref(), "c");
        assert_eq!(table.global[1].as_ref().unwrap().value.as_ref(), "b");
        assert_eq!(table.global.len(), 2);
    }

    #[test]
    fn prefix_hit_then_miss_round_trips() {
        let mut write_table = UriTable::new();
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            let uid = write_table.encode_uri(&mut w, "urn:a").unwrap();
            write_table.encode_prefix(&mut w, uid, "p").unwrap();
            write_table.encode_prefix(&mut w, uid, "p").unwrap();
            write_table.encode_prefix(&mut w, uid, "q").unwrap();
            w.flush().unwrap();
        }
        let mut read_table = UriTable::new();
        let mut r = BitPackedReader::new(buf.as_slice());
        let uid = read_table.decode_uri(&mut r).unwrap();
        let p1 = read_table.decode_prefix(&mut r, uid).unwrap();
        let p2 = read_table.decode_prefix(&mut r, uid).unwrap();
        let q = read_table.decode_prefix(&mut r, uid).unwrap();
        assert_eq!(p1.as_ref(), "p");
        assert_eq!(p2.as_ref(), "p");
        assert_eq!(q.as_ref(), "q");
    }

    #[test]
    fn value_table_round_trip_through_channel() {
        let mut write_table = ValueTable::new(None, None);
        let mut buf = Vec::new();
        {
            let mut w = BitPackedWriter::new(&mut buf);
            write_table.encode_value(&mut w, (1, 0), "hello").unwrap();
            write_table.encode_value(&mut w, (1, 0), "hello").unwrap();
            w.flush().unwrap();
        }
        let mut read_table = ValueTable::new(None, None);
        let mut r = BitPackedReader::new(buf.as_slice());
        assert_eq!(read_table.decode_value(&mut r, (1, 0)).unwrap().as_ref(), "hello");
        assert_eq!(read_table.decode_value(&mut r, (1, 0)).unwrap().as_ref(), "hello");
    }
}
