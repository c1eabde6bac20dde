//! Built-in (schemaless) grammars (§4.3): mutable, append-only production
//! lists that *learn* new productions as a document is processed, as
//! opposed to schema-informed grammars' fixed, pre-built shape.
//!
//! Event codes for a built-in grammar are never stored — they are always
//! `N - 1 - index`, recomputed from the current visible production count, so
//! the most recently learned production is always code 0 (§3 "built-in
//! productions use reverse indexing").

use std::rc::Rc;

use crate::datatype::Datatype;
use crate::name::QNameContext;

use super::{EventType, Grammar, GrammarId, GrammarKind, GrammarRef, Production};

/// Allocates the four always-present built-in starting grammars (§4.3) into
/// `arena`, returning their ids. Every schemaless codec instance starts from
/// these; `BuiltInElementContent` instances for individual element names are
/// allocated lazily as elements are first seen (§4.5 `runtime_global_elements`).
pub fn alloc_starting_grammars(arena: &mut super::RuntimeArena) -> StartingGrammars {
    let doc_content = arena.alloc(Grammar::new(GrammarKind::BuiltInDocContent));
    let fragment_content = arena.alloc(Grammar::new(GrammarKind::BuiltInFragmentContent));
    StartingGrammars { doc_content, fragment_content }
}

/// The two document-level built-in grammars every schemaless run shares;
/// everything below the document root is learned fresh (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct StartingGrammars {
    pub doc_content: GrammarId,
    pub fragment_content: GrammarId,
}

/// Allocates a fresh `(StartTagContent, ElementContent)` pair for an element
/// seen for the first time, wired to transition into each other the way
/// §4.3 describes: StartTagContent's learned StartElement transitions into
/// the owning element's own ElementContent; ElementContent's learned
/// StartElement stays in the same grammar.
pub fn alloc_element_grammars(arena: &mut super::RuntimeArena) -> (GrammarId, GrammarId) {
    let start_tag = arena.alloc(Grammar::new(GrammarKind::BuiltInStartTagContent));
    let element_content = arena.alloc(Grammar::new(GrammarKind::BuiltInElementContent));
    (start_tag, element_content)
}

/// Learning operations shared by every built-in grammar kind. Each `learn_*`
/// method is a no-op if the grammar has already stopped learning (§4.3
/// "ghost production" — callers needing the ghost appended regardless call
/// [`Grammar::stop_learning`] themselves first, then append directly).
impl Grammar {
    fn learn(&mut self, event_type: EventType, next: GrammarRef) {
        self.productions.push(Production { event_type, next });
    }

    /// `BuiltInStartTagContent`/`BuiltInFragmentContent`/`BuiltInDocContent`:
    /// learns `EndElement`, transitioning out of the element entirely. Only
    /// ever learned once per grammar — callers should check
    /// [`Grammar::has_end_element`] first.
    pub fn learn_end_element(&mut self, next: GrammarRef) {
        debug_assert!(!self.has_end_element, "EndElement already learned on this grammar");
        self.has_end_element = true;
        self.learn(EventType::EndElement, next);
    }

    /// `BuiltInStartTagContent` only: learns an `Attribute(qname, datatype)`,
    /// staying in the same grammar (attributes don't change `ElementContent`).
    pub fn learn_attribute(&mut self, qname: Rc<QNameContext>, datatype: Datatype, next: GrammarRef) {
        self.learn(EventType::Attribute(qname, datatype), next);
    }

    /// `BuiltInStartTagContent` only: learns a `NamespaceDeclaration`.
    pub fn learn_namespace(&mut self, next: GrammarRef) {
        self.learn(EventType::NamespaceDeclaration, next);
    }

    /// Learns `Characters(datatype)`. `BuiltInStartTagContent` learns this at
    /// most once before any StartElement (schemaless documents type
    /// character data as `xsd:string` at learn time); `BuiltInElementContent`
    /// may learn it repeatedly interleaved with learned `StartElement`s.
    pub fn learn_characters(&mut self, datatype: Datatype, next: GrammarRef) {
        self.learn(EventType::Characters(datatype), next);
    }

    /// Learns a concrete `StartElement(qname)`, transitioning to `next` (the
    /// owning element's `ElementContent` grammar for `BuiltInStartTagContent`,
    /// or back to `self` for `BuiltInElementContent` — callers pass the
    /// appropriate `GrammarRef` either way).
    pub fn learn_start_element(&mut self, qname: Rc<QNameContext>, next: GrammarRef) {
        self.learn(EventType::StartElement(qname), next);
    }

    /// The reverse-indexed event code built-in grammars assign to their
    /// production at `index` (§3, §4.3): the most recently learned
    /// production (highest index) is always code 0.
    pub fn built_in_event_code(&self, index: usize) -> u32 {
        (self.visible_len() - 1 - index) as u32
    }

    /// Inverse of [`Self::built_in_event_code`]: which production index a
    /// decoded 1st-level code names.
    pub fn built_in_production_index(&self, code: u32) -> usize {
        self.visible_len() - 1 - code as usize
    }

    /// Linear scan for a learned `StartElement(uri, local)` production,
    /// returning its reverse-indexed event code alongside it.
    pub fn find_learned_start_element(&self, uri_id: crate::name::UriId, local_id: crate::name::LocalNameId) -> Option<(u32, &Production)> {
        let visible = self.visible_len();
        self.productions[..visible]
            .iter()
            .enumerate()
            .find(|(_, p)| p.event_type.matches_start_element(uri_id, local_id))
            .map(|(i, p)| (self.built_in_event_code(i), p))
    }

    pub fn find_learned_attribute(&self, uri_id: crate::name::UriId, local_id: crate::name::LocalNameId) -> Option<(u32, &Production)> {
        let visible = self.visible_len();
        self.productions[..visible]
            .iter()
            .enumerate()
            .find(|(_, p)| p.event_type.matches_attribute(uri_id, local_id))
            .map(|(i, p)| (self.built_in_event_code(i), p))
    }

    pub fn find_learned_end_element(&self) -> Option<(u32, &Production)> {
        let visible = self.visible_len();
        self.productions[..visible]
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::EndElement))
            .map(|(i, p)| (self.built_in_event_code(i), p))
    }

    pub fn find_learned_characters(&self) -> Option<(u32, &Production)> {
        let visible = self.visible_len();
        self.productions[..visible]
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::Characters(_)))
            .map(|(i, p)| (self.built_in_event_code(i), p))
    }

    pub fn find_learned_namespace_declaration(&self) -> Option<(u32, &Production)> {
        let visible = self.visible_len();
        self.productions[..visible]
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.event_type, EventType::NamespaceDeclaration))
            .map(|(i, p)| (self.built_in_event_code(i), p))
    }

    /// Decode-side: the production occupying reverse-indexed 1st-level
    /// `code`, or `None` if `code` falls through to the 2nd level.
    pub fn learned_production_by_code(&self, code: u32) -> Option<&Production> {
        let visible = self.visible_len();
        if code as usize >= visible {
            return None;
        }
        self.productions.get(self.built_in_production_index(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::RuntimeArena;

    #[test]
    fn most_recently_learned_production_has_code_zero() {
        let mut arena = RuntimeArena::default();
        let g = arena.alloc(Grammar::new(GrammarKind::BuiltInElementContent));
        let uri: Rc<str> = Rc::from("");
        let qc_x = Rc::new(QNameContext::new(0, 0, uri.clone(), Rc::from("x")));
        let qc_y = Rc::new(QNameContext::new(0, 1, uri, Rc::from("y")));
        let grammar = arena.get_mut(g);
        grammar.learn_start_element(qc_x, GrammarRef::Runtime(g));
        grammar.learn_start_element(qc_y.clone(), GrammarRef::Runtime(g));

        let (code, production) = grammar.find_learned_start_element(0, 1).unwrap();
        assert_eq!(code, 0);
        assert!(production.event_type.matches_start_element(0, 1));
    }

    #[test]
    fn ghost_productions_are_invisible_to_encode_matching() {
        let mut arena = RuntimeArena::default();
        let g = arena.alloc(Grammar::new(GrammarKind::BuiltInElementContent));
        let uri: Rc<str> = Rc::from("");
        let qc_x = Rc::new(QNameContext::new(0, 0, uri.clone(), Rc::from("x")));
        let qc_y = Rc::new(QNameContext::new(0, 1, uri, Rc::from("y")));
        let grammar = arena.get_mut(g);
        grammar.learn_start_element(qc_x, GrammarRef::Runtime(g));
        grammar.stop_learning();
        grammar.learn_start_element(qc_y, GrammarRef::Runtime(g));

        assert!(grammar.find_learned_start_element(0, 1).is_none());
        assert!(grammar.find_learned_start_element(0, 0).is_some());
        assert_eq!(grammar.len(), 2);
        assert_eq!(grammar.visible_len(), 1);
    }
}
