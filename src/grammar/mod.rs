//! The grammar engine (§4.3): a graph of grammars, each a sorted list of
//! productions, driving which event codes are legal at each point in a
//! document.
//!
//! Grammars live in one of two arenas (§9 "Cyclic graph of grammars"):
//! schema-informed grammars are built once, before any document is coded,
//! into a [`SchemaArena`] that is shared read-only across every codec
//! instance (§5); built-in grammars are learned per document into a
//! [`RuntimeArena`] owned exclusively by one [`crate::body::encoder::BodyEncoder`]/
//! [`crate::body::decoder::BodyDecoder`]. A [`GrammarRef`] tags which arena
//! a production's `next` pointer resolves against, which is what lets the
//! graph be cyclic (an element's own grammar can be its own successor)
//! without reference counting.

pub mod built_in;
pub mod pool;
pub mod schema_informed;

use std::rc::Rc;

use crate::channel::bits_for;
use crate::datatype::Datatype;
use crate::name::QNameContext;

/// Index into whichever [`GrammarRef`] arena a production's `next` pointer
/// names.
pub type GrammarId = u32;

/// Disambiguates which arena a [`GrammarId`] indexes into (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarRef {
    /// Index into the shared, read-only [`SchemaArena`].
    Schema(GrammarId),
    /// Index into the per-instance, mutable [`RuntimeArena`].
    Runtime(GrammarId),
}

/// The structural tag on a grammar node (§3 "Grammar"). Schema-informed and
/// built-in grammars share a `Grammar` representation but differ in how
/// their production list is populated and how event codes are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarKind {
    Document,
    DocContent,
    DocEnd,
    Fragment,
    FragmentContent,
    FirstStartTag,
    StartTag,
    ElementContent,
    BuiltInDocContent,
    BuiltInFragmentContent,
    BuiltInStartTagContent,
    BuiltInElementContent,
}

impl GrammarKind {
    pub fn is_built_in(self) -> bool {
        matches!(
            self,
            GrammarKind::BuiltInDocContent
                | GrammarKind::BuiltInFragmentContent
                | GrammarKind::BuiltInStartTagContent
                | GrammarKind::BuiltInElementContent
        )
    }
}

/// The matching key stored on a [`Production`]: the shape of event a
/// production fires for, carrying just enough data (a qname, a datatype) to
/// disambiguate it from sibling productions. This is distinct from
/// [`crate::event::Event`], which carries the actual decoded/to-be-encoded
/// value of one concrete occurrence.
#[derive(Debug, Clone)]
pub enum EventType {
    StartDocument,
    EndDocument,
    StartElement(Rc<QNameContext>),
    StartElementNs(crate::name::UriId),
    StartElementGeneric,
    EndElement,
    EndElementUndeclared,
    Attribute(Rc<QNameContext>, Datatype),
    AttributeNs(crate::name::UriId),
    AttributeGeneric,
    AttributeInvalidValue,
    AttributeAnyInvalidValue,
    AttributeXsiType,
    AttributeXsiNil,
    Characters(Datatype),
    CharactersGeneric,
    CharactersGenericUndeclared,
    NamespaceDeclaration,
    SelfContained,
    DocType,
    EntityReference,
    Comment,
    ProcessingInstruction,
}

impl EventType {
    /// A short, stable name for this event type's "family" — used both for
    /// the canonical schema-informed ordering (§3 Invariants) and for error
    /// messages.
    pub fn family(&self) -> &'static str {
        match self {
            EventType::StartDocument => "SD",
            EventType::EndDocument => "ED",
            EventType::StartElement(_) => "SE",
            EventType::StartElementNs(_) => "SE(ns)",
            EventType::StartElementGeneric => "SE(*)",
            EventType::EndElement => "EE",
            EventType::EndElementUndeclared => "EE(undeclared)",
            EventType::Attribute(_, _) => "AT",
            EventType::AttributeNs(_) => "AT(ns)",
            EventType::AttributeGeneric => "AT(*)",
            EventType::AttributeInvalidValue => "AT(invalid)",
            EventType::AttributeAnyInvalidValue => "AT(*,invalid)",
            EventType::AttributeXsiType => "AT(xsi:type)",
            EventType::AttributeXsiNil => "AT(xsi:nil)",
            EventType::Characters(_) => "CH",
            EventType::CharactersGeneric => "CH(*)",
            EventType::CharactersGenericUndeclared => "CH(*,undeclared)",
            EventType::NamespaceDeclaration => "NS",
            EventType::SelfContained => "SC",
            EventType::DocType => "DT",
            EventType::EntityReference => "ER",
            EventType::Comment => "CM",
            EventType::ProcessingInstruction => "PI",
        }
    }

    pub fn matches_start_element(&self, uri_id: crate::name::UriId, local_id: crate::name::LocalNameId) -> bool {
        matches!(self, EventType::StartElement(q) if q.uri_id == uri_id && q.local_id == local_id)
    }

    pub fn matches_start_element_ns(&self, uri_id: crate::name::UriId) -> bool {
        matches!(self, EventType::StartElementNs(u) if *u == uri_id)
    }

    pub fn matches_attribute(&self, uri_id: crate::name::UriId, local_id: crate::name::LocalNameId) -> bool {
        matches!(self, EventType::Attribute(q, _) if q.uri_id == uri_id && q.local_id == local_id)
    }

    pub fn matches_attribute_ns(&self, uri_id: crate::name::UriId) -> bool {
        matches!(self, EventType::AttributeNs(u) if *u == uri_id)
    }
}

/// One `(event, next-grammar, event-code)` triple (§3 "Production"). The
/// event code is not stored here for built-in grammars — it is always
/// `N - 1 - index`, recomputed from the current production count — but it
/// *is* stable (and stored implicitly by position) for schema-informed
/// grammars, since those never mutate after construction.
#[derive(Debug, Clone)]
pub struct Production {
    pub event_type: EventType,
    pub next: GrammarRef,
}

/// A node in the grammar graph (§3 "Grammar").
#[derive(Debug, Clone)]
pub struct Grammar {
    pub kind: GrammarKind,
    pub productions: Vec<Production>,
    pub has_end_element: bool,
    pub is_type_castable: bool,
    pub is_nillable: bool,
    /// Once `true`, productions are still appended (so decoders can still
    /// resolve previously-assigned slots) but are invisible to encode-side
    /// lookup — the EXI-profile "ghost production" mechanism (§4.3).
    pub stop_learning: bool,
    /// Number of productions that existed when `stop_learning` fired;
    /// `None` while still learning. Productions appended at or after this
    /// index are ghosts — present for decode, invisible to encode matching.
    pub ghost_boundary: Option<usize>,
    /// Index of the first `Attribute`/`AttributeNs`/`AttributeGeneric`
    /// production in `productions`, cached for schema-informed grammars so
    /// encode doesn't need to rescan for the lowest attribute event code.
    pub least_attribute_event_code: Option<u32>,
}

impl Grammar {
    pub fn new(kind: GrammarKind) -> Self {
        Self {
            kind,
            productions: Vec::new(),
            has_end_element: false,
            is_type_castable: false,
            is_nillable: false,
            stop_learning: false,
            ghost_boundary: None,
            least_attribute_event_code: None,
        }
    }

    /// Marks learning as stopped from this point on (EXI-profile limit
    /// reached, §4.3). Any production appended afterwards is a ghost.
    pub fn stop_learning(&mut self) {
        if !self.stop_learning {
            self.stop_learning = true;
            self.ghost_boundary = Some(self.productions.len());
        }
    }

    /// Number of productions currently visible to matching (excludes ghost
    /// productions appended after `stop_learning` became `true`... note:
    /// ghost productions are only ever appended on built-in grammars, and
    /// this method returns the *total* length; callers doing encode-side
    /// matching should use [`Self::visible_productions`] instead).
    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    /// Productions visible for matching on encode: all of them unless
    /// learning has stopped, in which case only the ones present before
    /// `stop_learning` fired are matchable (later ones are ghosts, decode-only).
    pub fn visible_len(&self) -> usize {
        if self.stop_learning {
            self.ghost_boundary.unwrap_or(self.productions.len())
        } else {
            self.productions.len()
        }
    }

    /// `ceil(log2(n))`, the 1st-level event code length when there is no
    /// "one past the end" fallback code (used by built-in grammars, whose
    /// 1st level always has an implicit fallback to 2nd level).
    pub fn code_length(&self) -> u32 {
        bits_for(self.visible_len() as u32)
    }

    /// `ceil(log2(n+1))`, the 1st-level code length when a fallback to the
    /// 2nd level must also be representable (schema-informed grammars,
    /// §4.3 "computes the two cached code-lengths").
    pub fn code_length_with_fallback(&self) -> u32 {
        bits_for(self.visible_len() as u32 + 1)
    }
}

/// Grammar nodes built once from schema (or the always-available built-in
/// starting grammars) and shared read-only by every codec instance (§5, §9).
#[derive(Debug, Default)]
pub struct SchemaArena {
    grammars: Vec<Grammar>,
}

impl SchemaArena {
    pub fn alloc(&mut self, grammar: Grammar) -> GrammarId {
        self.grammars.push(grammar);
        (self.grammars.len() - 1) as GrammarId
    }

    pub fn get(&self, id: GrammarId) -> &Grammar {
        &self.grammars[id as usize]
    }

    pub fn get_mut(&mut self, id: GrammarId) -> &mut Grammar {
        &mut self.grammars[id as usize]
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

/// Built-in grammars learned at runtime, owned exclusively by one codec
/// instance, reset (or recreated) per document (§3, §5).
#[derive(Debug, Default)]
pub struct RuntimeArena {
    grammars: Vec<Grammar>,
}

impl RuntimeArena {
    pub fn alloc(&mut self, grammar: Grammar) -> GrammarId {
        self.grammars.push(grammar);
        (self.grammars.len() - 1) as GrammarId
    }

    pub fn get(&self, id: GrammarId) -> &Grammar {
        &self.grammars[id as usize]
    }

    pub fn get_mut(&mut self, id: GrammarId) -> &mut Grammar {
        &mut self.grammars[id as usize]
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    /// Drops every learned grammar, for reuse across documents without
    /// reallocating the backing `Vec` capacity.
    pub fn clear(&mut self) {
        self.grammars.clear();
    }
}

/// Resolves a [`GrammarRef`] against the pair of arenas that can contain it.
pub struct GrammarRefContext<'a> {
    pub schema: &'a SchemaArena,
    pub runtime: &'a RuntimeArena,
}

impl<'a> GrammarRefContext<'a> {
    pub fn get(&self, r: GrammarRef) -> &'a Grammar {
        match r {
            GrammarRef::Schema(id) => self.schema.get(id),
            GrammarRef::Runtime(id) => self.runtime.get(id),
        }
    }
}
