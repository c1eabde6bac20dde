//! The body coder (§4.5): the orchestrator tying the channel, string
//! tables, grammar engine and type coder together, one event at a time.

pub mod context;
pub mod decoder;
pub mod encoder;

pub use context::{ElementContext, ElementContextStack};
pub use decoder::BodyDecoder;
pub use encoder::BodyEncoder;

use crate::channel::bits_for;
use crate::grammar::{EventType, Grammar, GrammarId, GrammarKind, GrammarRef, Production};
use crate::name::{LocalNameId, UriId};
use crate::options::FidelityOptions;

/// The pair of built-in grammars allocated the first time an element name is
/// seen anywhere in a document (§4.5 `runtime_global_elements`): every later
/// occurrence of the same qname, at any nesting depth, reuses this same pair,
/// which is what "built-in grammars are learned per element name" means in
/// practice.
#[derive(Debug, Clone, Copy)]
pub struct GlobalElementGrammars {
    pub start_tag: GrammarId,
    pub element_content: GrammarId,
}

/// The 2nd-level event kinds a built-in grammar's fallback slot can name
/// (§4.3 "The 2nd-level event set depends on grammar kind and active
/// fidelity options"). Ordered; position in [`second_level_event_order`]'s
/// returned list *is* the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondLevelKind {
    EndElementUndeclared,
    AttributeUndeclared,
    NamespaceDeclaration,
    CharactersUndeclared,
    StartElementUndeclared,
    SelfContained,
    Comment,
    ProcessingInstruction,
}

impl SecondLevelKind {
    /// Short event-family label for error messages, matching
    /// [`crate::grammar::EventType::family`]/[`crate::event::Event::family`].
    pub fn label(self) -> &'static str {
        match self {
            SecondLevelKind::EndElementUndeclared => "EE",
            SecondLevelKind::AttributeUndeclared => "AT",
            SecondLevelKind::NamespaceDeclaration => "NS",
            SecondLevelKind::CharactersUndeclared => "CH",
            SecondLevelKind::StartElementUndeclared => "SE",
            SecondLevelKind::SelfContained => "SC",
            SecondLevelKind::Comment => "CM",
            SecondLevelKind::ProcessingInstruction => "PI",
        }
    }
}

/// Builds the ordered 2nd-level event set for `grammar` under `fidelity`
/// (§4.3). Only events that can legally occur from this grammar kind and
/// that have not already been learned onto the 1st level are included, so
/// the list — and therefore the bit width needed to index it — shrinks as a
/// grammar learns.
pub fn second_level_event_order(grammar: &Grammar, fidelity: &FidelityOptions) -> Vec<SecondLevelKind> {
    let mut order = Vec::new();
    let can_have_attributes = matches!(grammar.kind, GrammarKind::BuiltInStartTagContent | GrammarKind::StartTag);
    let can_have_children = matches!(
        grammar.kind,
        GrammarKind::BuiltInStartTagContent
            | GrammarKind::BuiltInElementContent
            | GrammarKind::BuiltInDocContent
            | GrammarKind::BuiltInFragmentContent
            | GrammarKind::ElementContent
            | GrammarKind::DocContent
            | GrammarKind::FragmentContent
    );

    if !grammar.has_end_element && matches!(grammar.kind, GrammarKind::BuiltInStartTagContent | GrammarKind::BuiltInElementContent) {
        order.push(SecondLevelKind::EndElementUndeclared);
    }
    if can_have_attributes {
        order.push(SecondLevelKind::AttributeUndeclared);
        if fidelity.preserve_prefixes {
            order.push(SecondLevelKind::NamespaceDeclaration);
        }
    }
    if can_have_children {
        order.push(SecondLevelKind::CharactersUndeclared);
        order.push(SecondLevelKind::StartElementUndeclared);
        if fidelity.self_contained {
            order.push(SecondLevelKind::SelfContained);
        }
    }
    if fidelity.preserve_comments {
        order.push(SecondLevelKind::Comment);
    }
    if fidelity.preserve_pis {
        order.push(SecondLevelKind::ProcessingInstruction);
    }
    order
}

/// The 1st-level event-code bit width for `grammar` (§4.3 "computes the two
/// cached code-lengths"). The three synthetic single-production document
/// roots (`Document`/`DocEnd`/`Fragment`) never learn and never fall back to
/// a 2nd level, so they use the plain, fallback-free width (always `0`);
/// every other grammar kind in active use here — schema-informed or
/// built-in — can always fall through to an undeclared/learned production,
/// so it reserves the one extra code that requires.
pub(crate) fn first_level_code_length(grammar: &Grammar) -> u32 {
    if matches!(grammar.kind, GrammarKind::Document | GrammarKind::DocEnd | GrammarKind::Fragment) {
        grammar.code_length()
    } else {
        grammar.code_length_with_fallback()
    }
}

/// Dispatches a `StartElement(uri, local)` lookup to the built-in
/// (reverse-indexed, learned) or schema-informed (forward-indexed, declared)
/// scan depending on `grammar.kind` (§4.3, §4.5). Used identically by encode
/// (matching a concrete occurrence) and decode (after the code is already
/// known, to confirm/derive the qname) call sites.
pub(crate) fn find_start_element(grammar: &Grammar, uri_id: UriId, local_id: LocalNameId) -> Option<(u32, GrammarRef)> {
    if grammar.kind.is_built_in() {
        grammar.find_learned_start_element(uri_id, local_id).map(|(c, p)| (c, p.next))
    } else {
        grammar.find_start_element_production(uri_id, local_id).map(|(c, p)| (c, p.next))
    }
}

pub(crate) fn find_attribute(grammar: &Grammar, uri_id: UriId, local_id: LocalNameId) -> Option<(u32, GrammarRef)> {
    if grammar.kind.is_built_in() {
        grammar.find_learned_attribute(uri_id, local_id).map(|(c, p)| (c, p.next))
    } else {
        grammar.find_attribute_production(uri_id, local_id).map(|(c, p)| (c, p.next))
    }
}

pub(crate) fn find_end_element(grammar: &Grammar) -> Option<(u32, GrammarRef)> {
    if grammar.kind.is_built_in() {
        grammar.find_learned_end_element().map(|(c, p)| (c, p.next))
    } else {
        grammar.find_end_element_production().map(|(c, p)| (c, p.next))
    }
}

pub(crate) fn find_characters(grammar: &Grammar) -> Option<(u32, GrammarRef)> {
    if grammar.kind.is_built_in() {
        grammar.find_learned_characters().map(|(c, p)| (c, p.next))
    } else {
        grammar.find_characters_production().map(|(c, p)| (c, p.next))
    }
}

/// A learned `NamespaceDeclaration` production, once one exists on a
/// built-in grammar, moves NS events onto the 1st level the same way a
/// learned StartElement/Attribute does. Schema-informed grammars never
/// declare NS productions here (schema ingestion is out of scope).
pub(crate) fn find_namespace_declaration(grammar: &Grammar) -> Option<(u32, GrammarRef)> {
    if grammar.kind.is_built_in() {
        grammar.find_learned_namespace_declaration().map(|(c, p)| (c, p.next))
    } else {
        None
    }
}

/// Decode-side counterpart: the production sitting at 1st-level `code`,
/// dispatched the same way as the `find_*` lookups above.
pub(crate) fn production_at_code(grammar: &Grammar, code: u32) -> Option<&Production> {
    if grammar.kind.is_built_in() {
        grammar.learned_production_by_code(code)
    } else {
        grammar.production_by_event_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    #[test]
    fn start_tag_grammar_offers_attributes_and_end_element_first() {
        let grammar = Grammar::new(GrammarKind::BuiltInStartTagContent);
        let order = second_level_event_order(&grammar, &FidelityOptions::default_options());
        assert_eq!(order[0], SecondLevelKind::EndElementUndeclared);
        assert!(order.contains(&SecondLevelKind::AttributeUndeclared));
    }

    #[test]
    fn fidelity_flags_extend_the_order() {
        let grammar = Grammar::new(GrammarKind::BuiltInElementContent);
        let mut fidelity = FidelityOptions::default_options();
        fidelity.preserve_comments = true;
        let order = second_level_event_order(&grammar, &fidelity);
        assert!(order.contains(&SecondLevelKind::Comment));
    }
}
