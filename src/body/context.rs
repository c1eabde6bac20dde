//! The element context stack (§3 "Element context", §4.5): one frame per
//! open element, growing from a start capacity of 16 by ×4 when full.

use std::rc::Rc;

use crate::grammar::GrammarRef;
use crate::name::QNameContext;

/// One open element's bookkeeping (§3 "Element context"): its own qname
/// (`None` only for the two synthetic root frames, Document/Fragment),
/// the grammar currently driving it (advances as productions fire), the
/// prefix it was written/read with, the namespaces it declared, and an
/// `xml:space` override.
#[derive(Debug, Clone)]
pub struct ElementContext {
    pub qname: Option<Rc<QNameContext>>,
    pub grammar: GrammarRef,
    pub prefix: Option<Rc<str>>,
    pub declared_namespaces: Vec<(Rc<str>, Rc<str>)>,
    pub xml_space_preserve: Option<bool>,
    /// For a built-in `StartTagContent` frame, the `ElementContent` grammar
    /// the element transitions into once its start tag ends — this frame's
    /// own, fixed for its lifetime (§4.3 "StartTagContent's learned
    /// StartElement transitions into the owning element's ElementContent").
    /// `None` for schema-informed frames and the two document-level roots.
    pub built_in_element_content: Option<GrammarRef>,
}

impl ElementContext {
    pub fn root(grammar: GrammarRef) -> Self {
        Self {
            qname: None,
            grammar,
            prefix: None,
            declared_namespaces: Vec::new(),
            xml_space_preserve: None,
            built_in_element_content: None,
        }
    }

    pub fn for_element(qname: Rc<QNameContext>, grammar: GrammarRef, inherited_space: Option<bool>) -> Self {
        Self {
            qname: Some(qname),
            grammar,
            prefix: None,
            declared_namespaces: Vec::new(),
            xml_space_preserve: inherited_space,
            built_in_element_content: None,
        }
    }
}

/// Stack of open [`ElementContext`]s (§4.5 "Element context stack (start
/// capacity 16, grow by ×4 when full)").
#[derive(Debug, Default)]
pub struct ElementContextStack {
    frames: Vec<ElementContext>,
}

impl ElementContextStack {
    pub const START_CAPACITY: usize = 16;
    pub const GROWTH_FACTOR: usize = 4;

    pub fn new() -> Self {
        Self { frames: Vec::with_capacity(Self::START_CAPACITY) }
    }

    pub fn push(&mut self, frame: ElementContext) {
        if self.frames.len() == self.frames.capacity() {
            self.frames.reserve(self.frames.capacity().max(1) * (Self::GROWTH_FACTOR - 1));
        }
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ElementContext> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&ElementContext> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ElementContext> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops every frame, retaining the backing allocation (reused across
    /// documents, the same discipline as [`crate::grammar::RuntimeArena::clear`]).
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Effective `xml:space` setting at the current depth: the nearest
    /// enclosing frame's explicit value, or the schema/global default.
    pub fn effective_space_preserve(&self) -> bool {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.xml_space_preserve)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarRef;

    #[test]
    fn starts_empty_with_reserved_capacity() {
        let stack = ElementContextStack::new();
        assert_eq!(stack.depth(), 0);
        assert!(stack.frames.capacity() >= ElementContextStack::START_CAPACITY);
    }

    #[test]
    fn push_pop_tracks_depth() {
        let mut stack = ElementContextStack::new();
        stack.push(ElementContext::root(GrammarRef::Schema(0)));
        stack.push(ElementContext::root(GrammarRef::Schema(1)));
        assert_eq!(stack.depth(), 2);
        stack.pop();
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn space_preserve_inherits_from_nearest_enclosing_frame() {
        let mut stack = ElementContextStack::new();
        let mut outer = ElementContext::root(GrammarRef::Schema(0));
        outer.xml_space_preserve = Some(true);
        stack.push(outer);
        stack.push(ElementContext::root(GrammarRef::Schema(1)));
        assert!(stack.effective_space_preserve());
    }
}
