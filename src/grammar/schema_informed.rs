//! Construction and lookup of schema-informed grammars (§4.3).
//!
//! Schema-informed grammars are assumed to arrive fully built from an
//! external schema-ingestion collaborator (out of scope per spec.md §1);
//! what lives here is the canonical production ordering and the lookup
//! operations the body coder drives against a finished grammar, plus a
//! small builder so tests (and this crate's own built-in "no schema"
//! starting grammars) can assemble one without a real schema.

use crate::channel::bits_for;
use crate::name::{LocalNameId, UriId};

use super::{EventType, Grammar, GrammarKind, GrammarRef, Production};

/// Builds one schema-informed [`Grammar`], enforcing the canonical
/// production order from §3's Invariants: `EndElement` first (if present),
/// then `Attribute`s in `(uri, local)` order, then `StartElement`s in
/// schema declaration order, then `Characters`, then the generic
/// productions (`AT(*)`, `SE(*)`, `CH(*)`) last.
pub struct SchemaGrammarBuilder {
    kind: GrammarKind,
    end_element: Option<GrammarRef>,
    attributes: Vec<(UriId, LocalNameId, Production)>,
    start_elements: Vec<Production>,
    characters: Option<Production>,
    generic_attribute: Option<Production>,
    generic_start_element: Option<Production>,
    generic_characters: Option<Production>,
    is_type_castable: bool,
    is_nillable: bool,
}

impl SchemaGrammarBuilder {
    pub fn new(kind: GrammarKind) -> Self {
        Self {
            kind,
            end_element: None,
            attributes: Vec::new(),
            start_elements: Vec::new(),
            characters: None,
            generic_attribute: None,
            generic_start_element: None,
            generic_characters: None,
            is_type_castable: false,
            is_nillable: false,
        }
    }

    pub fn end_element(mut self, next: GrammarRef) -> Self {
        self.end_element = Some(next);
        self
    }

    pub fn attribute(mut self, uri_id: UriId, local_id: LocalNameId, event_type: EventType, next: GrammarRef) -> Self {
        self.attributes.push((uri_id, local_id, Production { event_type, next }));
        self
    }

    pub fn start_element(mut self, event_type: EventType, next: GrammarRef) -> Self {
        self.start_elements.push(Production { event_type, next });
        self
    }

    pub fn characters(mut self, event_type: EventType, next: GrammarRef) -> Self {
        self.characters = Some(Production { event_type, next });
        self
    }

    pub fn generic_attribute(mut self, next: GrammarRef) -> Self {
        self.generic_attribute = Some(Production { event_type: EventType::AttributeGeneric, next });
        self
    }

    pub fn generic_start_element(mut self, next: GrammarRef) -> Self {
        self.generic_start_element = Some(Production { event_type: EventType::StartElementGeneric, next });
        self
    }

    pub fn generic_characters(mut self, next: GrammarRef) -> Self {
        self.generic_characters = Some(Production { event_type: EventType::CharactersGeneric, next });
        self
    }

    pub fn nillable(mut self, val: bool) -> Self {
        self.is_nillable = val;
        self
    }

    pub fn type_castable(mut self, val: bool) -> Self {
        self.is_type_castable = val;
        self
    }

    /// Finalizes the grammar: sorts attributes into `(uri, local)` order,
    /// lays out the canonical production sequence, and caches the code
    /// lengths and `least_attribute_event_code` (§4.3 "Event-code
    /// assignment").
    pub fn finish(mut self) -> Grammar {
        self.attributes.sort_by_key(|(uri, local, _)| (*uri, *local));

        let mut grammar = Grammar::new(self.kind);
        grammar.is_nillable = self.is_nillable;
        grammar.is_type_castable = self.is_type_castable;

        if let Some(next) = self.end_element {
            grammar.has_end_element = true;
            grammar.productions.push(Production { event_type: EventType::EndElement, next });
        }

        if !self.attributes.is_empty() || self.generic_attribute.is_some() {
            grammar.least_attribute_event_code = Some(grammar.productions.len() as u32);
        }
        for (_, _, production) in self.attributes {
            grammar.productions.push(production);
        }
        if let Some(production) = self.generic_attribute {
            grammar.productions.push(production);
        }

        for production in self.start_elements {
            grammar.productions.push(production);
        }
        if let Some(production) = self.generic_start_element {
            grammar.productions.push(production);
        }

        if let Some(production) = self.characters {
            grammar.productions.push(production);
        }
        if let Some(production) = self.generic_characters {
            grammar.productions.push(production);
        }

        grammar
    }
}

impl Grammar {
    /// Linear scan for the production matching `event_type`'s family and
    /// qname (§4.3 "lists are tiny, typically ≤ 10"). Used on decode, where
    /// the event code was already read and narrowed the search to a single
    /// candidate index — this is the encode-side counterpart, searching by
    /// shape instead of by code.
    pub fn find_start_element_production(&self, uri_id: UriId, local_id: LocalNameId) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| p.event_type.matches_start_element(uri_id, local_id))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_start_element_ns_production(&self, uri_id: UriId) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| p.event_type.matches_start_element_ns(uri_id))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_generic_start_element_production(&self) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::StartElementGeneric))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_attribute_production(&self, uri_id: UriId, local_id: LocalNameId) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| p.event_type.matches_attribute(uri_id, local_id))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_attribute_ns_production(&self, uri_id: UriId) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| p.event_type.matches_attribute_ns(uri_id))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_generic_attribute_production(&self) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::AttributeGeneric))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_end_element_production(&self) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::EndElement))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_characters_production(&self) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::Characters(_)))
            .map(|(i, p)| (i as u32, p))
    }

    pub fn find_generic_characters_production(&self) -> Option<(u32, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::CharactersGeneric))
            .map(|(i, p)| (i as u32, p))
    }

    /// Decode-side lookup: the production sitting at exactly this 1st-level
    /// event code.
    pub fn production_by_event_code(&self, code: u32) -> Option<&Production> {
        self.productions.get(code as usize)
    }
}

/// `ceil(log2(n))` for a schema-informed grammar's current production
/// count, re-exposed here for callers that only have a count, not a
/// [`Grammar`] (e.g. while the builder is still assembling one).
pub fn code_length_for(production_count: u32) -> u32 {
    bits_for(production_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarRef;

    #[test]
    fn canonical_order_places_end_element_first() {
        let grammar = SchemaGrammarBuilder::new(GrammarKind::ElementContent)
            .end_element(GrammarRef::Schema(1))
            .characters(EventType::CharactersGeneric, GrammarRef::Schema(0))
            .finish();
        assert!(matches!(grammar.productions[0].event_type, EventType::EndElement));
    }

    #[test]
    fn least_attribute_event_code_tracks_first_attribute_slot() {
        let grammar = SchemaGrammarBuilder::new(GrammarKind::StartTag)
            .end_element(GrammarRef::Schema(1))
            .generic_attribute(GrammarRef::Schema(2))
            .finish();
        assert_eq!(grammar.least_attribute_event_code, Some(1));
    }

    #[test]
    fn attributes_sort_by_uri_then_local() {
        use crate::name::QNameContext;
        use std::rc::Rc;
        let uri: Rc<str> = Rc::from("urn:x");
        let qc_b = Rc::new(QNameContext::new(1, 1, uri.clone(), Rc::from("b")));
        let qc_a = Rc::new(QNameContext::new(1, 0, uri.clone(), Rc::from("a")));
        let dt = crate::datatype::Datatype::String;
        let grammar = SchemaGrammarBuilder::new(GrammarKind::StartTag)
            .attribute(1, 1, EventType::Attribute(qc_b, dt.clone()), GrammarRef::Schema(0))
            .attribute(1, 0, EventType::Attribute(qc_a, dt), GrammarRef::Schema(0))
            .finish();
        match &grammar.productions[0].event_type {
            EventType::Attribute(q, _) => assert_eq!(q.local_id, 0),
            _ => panic!("expected attribute production"),
        }
    }
}
