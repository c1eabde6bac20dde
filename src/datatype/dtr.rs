//! Datatype representation map (§4.4, §9 GLOSSARY "DTR"): an optional
//! user-supplied table that reroutes a schema type, by qname, to a
//! different built-in EXI representation than its default.

use std::collections::HashMap;

use crate::name::{LocalNameId, UriId};

use super::Datatype;

/// Maps `(uri_id, local_id)` of a schema type to the EXI datatype it should
/// be coded as, overriding the type's own built-in datatype.
#[derive(Debug, Clone, Default)]
pub struct DatatypeRepresentationMap {
    entries: HashMap<(UriId, LocalNameId), Datatype>,
}

impl DatatypeRepresentationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a redirect for the schema type named `(uri_id, local_id)`.
    /// A later call for the same qname replaces the earlier one.
    pub fn insert(&mut self, uri_id: UriId, local_id: LocalNameId, datatype: Datatype) {
        self.entries.insert((uri_id, local_id), datatype);
    }

    /// Looks up a redirect for one schema type qname, without walking its
    /// base-type chain — that walk is [`super::SchemaType::effective_datatype`]'s
    /// job, which calls this once per ancestor.
    pub fn lookup(&self, qname: &crate::name::QNameContext) -> Option<Datatype> {
        self.entries.get(&(qname.uri_id, qname.local_id)).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::IntegerKind;
    use crate::name::QNameContext;
    use std::rc::Rc;

    #[test]
    fn unmapped_type_falls_through() {
        let map = DatatypeRepresentationMap::new();
        let uri: Rc<str> = Rc::from("urn:x");
        let qc = QNameContext::new(5, 0, uri, Rc::from("myInt"));
        assert!(map.lookup(&qc).is_none());
    }

    #[test]
    fn mapped_type_overrides() {
        let mut map = DatatypeRepresentationMap::new();
        map.insert(5, 0, Datatype::String);
        let uri: Rc<str> = Rc::from("urn:x");
        let qc = QNameContext::new(5, 0, uri, Rc::from("myInt"));
        assert_eq!(map.lookup(&qc), Some(Datatype::String));
    }

    #[test]
    fn effective_datatype_walks_base_chain() {
        let uri: Rc<str> = Rc::from("urn:x");
        let base = crate::datatype::SchemaType {
            qname: Rc::new(QNameContext::new(5, 0, uri.clone(), Rc::from("base"))),
            base: None,
            built_in_datatype: Datatype::Integer(IntegerKind::Signed),
        };
        let derived = crate::datatype::SchemaType {
            qname: Rc::new(QNameContext::new(5, 1, uri, Rc::from("derived"))),
            base: Some(Box::new(base)),
            built_in_datatype: Datatype::Integer(IntegerKind::Signed),
        };
        let mut map = DatatypeRepresentationMap::new();
        map.insert(5, 0, Datatype::String);
        assert_eq!(derived.effective_datatype(&map), Datatype::String);
    }
}
