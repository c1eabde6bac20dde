//! [`GrammarPool`] (§3 Supplemented features): a shareable, read-only
//! handle on schema-informed grammars and their URI contexts, so multiple
//! [`crate::body::encoder::BodyEncoder`]/[`crate::body::decoder::BodyDecoder`]
//! instances can borrow the same schema without cloning it (§5 "Shared vs
//! exclusive ownership").

use std::rc::Rc;
use std::sync::Arc;

use crate::name::GrammarUriContext;

use super::built_in::{self, StartingGrammars};
use super::{Grammar, GrammarId, GrammarKind, RuntimeArena, SchemaArena};

/// Owns the shared, read-only schema-informed grammar arena plus the
/// per-URI grammar contexts, and names the always-available built-in
/// starting points (§3 Supplemented features).
pub struct GrammarPool {
    pub schema_arena: SchemaArena,
    pub uri_contexts: Vec<Rc<GrammarUriContext>>,
    pub document: GrammarId,
    pub doc_content: GrammarId,
    pub doc_end: GrammarId,
    pub fragment: GrammarId,
    pub fragment_content: GrammarId,
}

impl GrammarPool {
    /// Builds the always-available schemaless/fragment starting grammars, so
    /// the crate is useful without a schema-ingestion collaborator (§3
    /// Supplemented features).
    pub fn built_in() -> Arc<GrammarPool> {
        let mut arena = SchemaArena::default();

        let doc_end = arena.alloc(Grammar::new(GrammarKind::DocEnd));
        let doc_content = arena.alloc(Grammar::new(GrammarKind::BuiltInDocContent));
        let document = arena.alloc(Grammar::new(GrammarKind::Document));
        {
            let g = arena.get_mut(document);
            g.productions.push(super::Production {
                event_type: super::EventType::StartDocument,
                next: super::GrammarRef::Schema(doc_content),
            });
        }
        {
            let g = arena.get_mut(doc_end);
            g.productions.push(super::Production {
                event_type: super::EventType::EndDocument,
                next: super::GrammarRef::Schema(doc_end),
            });
        }

        let fragment_content = arena.alloc(Grammar::new(GrammarKind::BuiltInFragmentContent));
        let fragment = arena.alloc(Grammar::new(GrammarKind::Fragment));
        {
            let g = arena.get_mut(fragment);
            g.productions.push(super::Production {
                event_type: super::EventType::StartDocument,
                next: super::GrammarRef::Schema(fragment_content),
            });
        }

        Arc::new(GrammarPool {
            schema_arena: arena,
            uri_contexts: default_uri_contexts(),
            document,
            doc_content,
            doc_end,
            fragment,
            fragment_content,
        })
    }

    pub fn grammar(&self, id: GrammarId) -> &Grammar {
        self.schema_arena.get(id)
    }
}

/// The three well-known URI contexts every codec starts with: `""`, XML,
/// XSI (§3 "Assigned a URI id in schema order").
fn default_uri_contexts() -> Vec<Rc<GrammarUriContext>> {
    use crate::name::well_known_uri::*;
    vec![
        Rc::new(GrammarUriContext::new(EMPTY, "")),
        Rc::new(GrammarUriContext::new(XML, XML_URI)),
        Rc::new(GrammarUriContext::new(XSI, XSI_URI)),
    ]
}

/// Per-document mutable state layered on top of a shared [`GrammarPool`]:
/// the runtime grammar arena into which built-in element grammars are
/// learned, reset (capacity retained) between documents (§3 Lifecycles,
/// §9 "reset for each run is an O(1) pointer swap").
#[derive(Default)]
pub struct RuntimeGrammars {
    pub arena: RuntimeArena,
    pub starting: Option<StartingGrammars>,
}

impl RuntimeGrammars {
    pub fn init_for_each_run(&mut self) {
        self.arena.clear();
        self.starting = Some(built_in::alloc_starting_grammars(&mut self.arena));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_pool_has_default_uri_contexts() {
        let pool = GrammarPool::built_in();
        assert_eq!(pool.uri_contexts.len(), 3);
        assert_eq!(pool.uri_contexts[0].uri.as_ref(), "");
    }

    #[test]
    fn runtime_grammars_reset_reallocates_starting_points() {
        let mut runtime = RuntimeGrammars::default();
        runtime.init_for_each_run();
        let first_len = runtime.arena.len();
        runtime.init_for_each_run();
        assert_eq!(runtime.arena.len(), first_len);
    }
}
