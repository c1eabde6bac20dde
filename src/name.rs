//! QName identity and the URI-scoped contexts that own it (§3 "QName
//! context", "Grammar URI context", "Runtime URI context").
//!
//! Generalizes a `QName`/`LocalName`/namespace-resolver triple from "a slice
//! into the raw tag bytes" to "a pair of small integer ids plus the owning
//! strings", which is what the grammar engine and string tables need.

use std::rc::Rc;

use crate::grammar::GrammarId;

/// Stable identity for one namespace URI within a document: an index into
/// the URI partition (§4.2). `0` is always the empty namespace `""`.
pub type UriId = u32;

/// Stable identity for one local name within a URI's local-name partition.
/// The id space is `[grammar part | runtime part]` concatenated (§3).
pub type LocalNameId = u32;

/// A (namespace-URI-id, local-name-id) pair together with the owning
/// strings and the optional schema-time back-pointers described in §3.
///
/// Identity is value identity over `(uri_id, local_id)`: two `QNameContext`s
/// with the same ids always refer to the same name, so they are compared
/// and hashed by those ids alone.
#[derive(Debug, Clone)]
pub struct QNameContext {
    pub uri_id: UriId,
    pub local_id: LocalNameId,
    pub uri: Rc<str>,
    pub local_name: Rc<str>,
    /// The global `StartElement` production grammar for this name, once a
    /// `StartElement` event has been seen anywhere for it. Set once at
    /// schema-build time for schema-informed names, or lazily on first
    /// runtime sighting for built-in names (§4.5 `runtime_global_elements`).
    pub global_start_element_grammar: Option<GrammarId>,
    /// Set when this qname denotes a global attribute declaration.
    pub is_global_attribute: bool,
    /// The type grammar for this name, when it denotes an XSD type (used by
    /// `xsi:type`). Schema-build-time only; `None` in schemaless mode.
    pub type_grammar: Option<GrammarId>,
}

impl QNameContext {
    pub fn new(uri_id: UriId, local_id: LocalNameId, uri: Rc<str>, local_name: Rc<str>) -> Self {
        Self {
            uri_id,
            local_id,
            uri,
            local_name,
            global_start_element_grammar: None,
            is_global_attribute: false,
            type_grammar: None,
        }
    }

    /// A synthesized default prefix for this URI, used when `PRESERVE_PREFIX`
    /// is off and no explicit prefix context applies (§4.5 "Prefix policy").
    pub fn default_prefix(&self) -> String {
        if self.uri_id == 0 {
            return String::new();
        }
        format!("ns{}", self.uri_id)
    }
}

impl PartialEq for QNameContext {
    fn eq(&self, other: &Self) -> bool {
        self.uri_id == other.uri_id && self.local_id == other.local_id
    }
}
impl Eq for QNameContext {}

/// The well-known URI ids assigned in schema order (§3): `0 = ""`,
/// `1 = XML`, `2 = XSI`, `3 = XSD` when schema-informed.
pub mod well_known_uri {
    use super::UriId;

    pub const EMPTY: UriId = 0;
    pub const XML: UriId = 1;
    pub const XSI: UriId = 2;
    pub const XSD: UriId = 3;

    pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XSI_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const XSD_URI: &str = "http://www.w3.org/2001/XMLSchema";
}

/// Well-known local-name ids within the XSI namespace. `xsi:type` and
/// `xsi:nil` are kept as distinct local ids rather than aliased.
pub mod well_known_local {
    use super::LocalNameId;

    pub const XSI_TYPE: LocalNameId = 0;
    pub const XSI_NIL: LocalNameId = 1;
}

/// The static, schema-derived partition for one namespace (§3): an ordered
/// list of qnames and an ordered list of prefixes. Immutable once built,
/// shared read-only by every codec instance that uses this schema (§5, §9).
#[derive(Debug, Clone, Default)]
pub struct GrammarUriContext {
    pub uri_id: UriId,
    pub uri: Rc<str>,
    pub qnames: Vec<Rc<QNameContext>>,
    pub prefixes: Vec<Rc<str>>,
}

impl GrammarUriContext {
    pub fn new(uri_id: UriId, uri: impl Into<Rc<str>>) -> Self {
        Self { uri_id, uri: uri.into(), qnames: Vec::new(), prefixes: Vec::new() }
    }

    pub fn local_name_by_id(&self, id: LocalNameId) -> Option<&Rc<QNameContext>> {
        self.qnames.get(id as usize)
    }

    pub fn find_local_name(&self, local: &str) -> Option<&Rc<QNameContext>> {
        self.qnames.iter().find(|q| &*q.local_name == local)
    }
}

/// Wraps a [`GrammarUriContext`] and appends runtime-learned qnames and
/// prefixes (§3). Exclusively owned by one codec instance; reset (with
/// backing arrays retained) between documents via [`Self::init_for_each_run`].
#[derive(Debug, Clone)]
pub struct RuntimeUriContext {
    pub grammar: Rc<GrammarUriContext>,
    pub runtime_qnames: Vec<Rc<QNameContext>>,
    pub runtime_prefixes: Vec<Rc<str>>,
}

impl RuntimeUriContext {
    pub fn new(grammar: Rc<GrammarUriContext>) -> Self {
        Self { grammar, runtime_qnames: Vec::new(), runtime_prefixes: Vec::new() }
    }

    /// Total count of known local names: grammar part plus runtime part.
    pub fn local_name_count(&self) -> usize {
        self.grammar.qnames.len() + self.runtime_qnames.len()
    }

    pub fn prefix_count(&self) -> usize {
        self.grammar.prefixes.len() + self.runtime_prefixes.len()
    }

    pub fn local_name_by_id(&self, id: LocalNameId) -> Option<&Rc<QNameContext>> {
        let grammar_len = self.grammar.qnames.len();
        if (id as usize) < grammar_len {
            self.grammar.qnames.get(id as usize)
        } else {
            self.runtime_qnames.get(id as usize - grammar_len)
        }
    }

    pub fn find_local_name(&self, local: &str) -> Option<&Rc<QNameContext>> {
        self.grammar
            .find_local_name(local)
            .or_else(|| self.runtime_qnames.iter().find(|q| &*q.local_name == local))
    }

    pub fn prefix_by_id(&self, id: u32) -> Option<&Rc<str>> {
        let grammar_len = self.grammar.prefixes.len();
        if (id as usize) < grammar_len {
            self.grammar.prefixes.get(id as usize)
        } else {
            self.runtime_prefixes.get(id as usize - grammar_len)
        }
    }

    pub fn find_prefix(&self, prefix: &str) -> Option<u32> {
        self.grammar
            .prefixes
            .iter()
            .position(|p| &**p == prefix)
            .or_else(|| {
                self.runtime_prefixes
                    .iter()
                    .position(|p| &**p == prefix)
                    .map(|i| i + self.grammar.prefixes.len())
            })
            .map(|i| i as u32)
    }

    /// Adds a runtime-learned local name, returning its assigned id.
    pub fn add_local_name(&mut self, uri_id: UriId, local_name: Rc<str>) -> (LocalNameId, Rc<QNameContext>) {
        let id = self.local_name_count() as LocalNameId;
        let uri = self.grammar.uri.clone();
        let qnc = Rc::new(QNameContext::new(uri_id, id, uri, local_name));
        self.runtime_qnames.push(qnc.clone());
        (id, qnc)
    }

    pub fn add_prefix(&mut self, prefix: Rc<str>) -> u32 {
        let id = self.prefix_count() as u32;
        self.runtime_prefixes.push(prefix);
        id
    }

    /// Resets the runtime-learned portion for a new document, retaining the
    /// backing `Vec` allocations (§3 lifecycles: `initForEachRun`).
    pub fn init_for_each_run(&mut self) {
        self.runtime_qnames.clear();
        self.runtime_prefixes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grammar_context() -> Rc<GrammarUriContext> {
        let mut ctx = GrammarUriContext::new(5, "urn:example");
        ctx.qnames.push(Rc::new(QNameContext::new(5, 0, ctx.uri.clone(), Rc::from("a"))));
        ctx.qnames.push(Rc::new(QNameContext::new(5, 1, ctx.uri.clone(), Rc::from("b"))));
        ctx.prefixes.push(Rc::from("ex"));
        Rc::new(ctx)
    }

    #[test]
    fn runtime_context_concatenates_id_space() {
        let mut rtc = RuntimeUriContext::new(sample_grammar_context());
        assert_eq!(rtc.local_name_count(), 2);
        let (id, _) = rtc.add_local_name(5, Rc::from("c"));
        assert_eq!(id, 2);
        assert_eq!(rtc.local_name_by_id(0).unwrap().local_name.as_ref(), "a");
        assert_eq!(rtc.local_name_by_id(2).unwrap().local_name.as_ref(), "c");
    }

    #[test]
    fn init_for_each_run_clears_runtime_part_only() {
        let mut rtc = RuntimeUriContext::new(sample_grammar_context());
        rtc.add_local_name(5, Rc::from("c"));
        rtc.add_prefix(Rc::from("y"));
        assert_eq!(rtc.local_name_count(), 3);
        rtc.init_for_each_run();
        assert_eq!(rtc.local_name_count(), 2);
        assert_eq!(rtc.prefix_count(), 1);
    }

    #[test]
    fn find_prefix_spans_grammar_and_runtime() {
        let mut rtc = RuntimeUriContext::new(sample_grammar_context());
        assert_eq!(rtc.find_prefix("ex"), Some(0));
        rtc.add_prefix(Rc::from("extra"));
        assert_eq!(rtc.find_prefix("extra"), Some(1));
        assert_eq!(rtc.find_prefix("missing"), None);
    }
}
