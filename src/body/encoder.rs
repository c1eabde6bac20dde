//! The encode side of the body coder (§4.5): turns a stream of [`Event`]s
//! into an EXI bitstream, driving the grammar engine, string tables and type
//! coder one event at a time.

use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use crate::channel::{bits_for, BitPackedWriter, BytePackedWriter, ChannelWriter};
use crate::datatype::{self, Datatype, Value};
use crate::errors::{CollectingErrorHandler, Error, ErrorHandler, NoopErrorHandler, Result, WarningKind};
use crate::event::Event;
use crate::grammar::built_in;
use crate::grammar::pool::{GrammarPool, RuntimeGrammars};
use crate::grammar::{Grammar, GrammarRef};
use crate::name::{LocalNameId, QNameContext, UriId};
use crate::options::{CodingMode, EncodingOptions};
use crate::profile::{learning_limit_action, LearningLimitAction};
use crate::string_table::{UriTable, ValueTable};

use super::{
    find_attribute, find_characters, find_end_element, find_namespace_declaration, find_start_element,
    first_level_code_length, second_level_event_order, ElementContext, ElementContextStack, GlobalElementGrammars,
    SecondLevelKind,
};

/// Either channel layout, dispatched manually the way
/// [`crate::channel::ChannelWriter`]'s two implementors differ only in their
/// four required methods (§4.1).
enum Channel<W: Write> {
    BitPacked(BitPackedWriter<W>),
    BytePacked(BytePackedWriter<W>),
}

impl<W: Write> Channel<W> {
    fn for_mode(mode: CodingMode, writer: W) -> Self {
        if mode.is_byte_aligned() {
            Channel::BytePacked(BytePackedWriter::new(writer))
        } else {
            Channel::BitPacked(BitPackedWriter::new(writer))
        }
    }

    fn into_inner(self) -> W {
        match self {
            Channel::BitPacked(w) => w.into_inner(),
            Channel::BytePacked(w) => w.into_inner(),
        }
    }
}

impl<W: Write> ChannelWriter for Channel<W> {
    fn encode_n_bit_unsigned(&mut self, value: u32, n: u32) -> Result<()> {
        match self {
            Channel::BitPacked(w) => w.encode_n_bit_unsigned(value, n),
            Channel::BytePacked(w) => w.encode_n_bit_unsigned(value, n),
        }
    }

    fn encode_boolean(&mut self, value: bool) -> Result<()> {
        match self {
            Channel::BitPacked(w) => w.encode_boolean(value),
            Channel::BytePacked(w) => w.encode_boolean(value),
        }
    }

    fn align(&mut self) -> Result<()> {
        match self {
            Channel::BitPacked(w) => w.align(),
            Channel::BytePacked(w) => w.align(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Channel::BitPacked(w) => w.flush(),
            Channel::BytePacked(w) => w.flush(),
        }
    }
}

/// Drives one EXI document's worth of encoding against a shared
/// [`GrammarPool`] (§4.5, §5 "Shared vs exclusive ownership").
///
/// Owns everything exclusive to one document: the runtime grammar arena, the
/// string tables, the open-element stack and the per-qname global element
/// grammar cache (`runtime_global_elements`, §4.5).
pub struct BodyEncoder<W: Write> {
    channel: Channel<W>,
    pool: Arc<GrammarPool>,
    runtime: RuntimeGrammars,
    uris: UriTable,
    values: ValueTable,
    stack: ElementContextStack,
    global_elements: HashMap<(UriId, LocalNameId), GlobalElementGrammars>,
    options: EncodingOptions,
    error_handler: Box<dyn ErrorHandler>,
}

impl<W: Write> BodyEncoder<W> {
    pub fn new(writer: W, pool: Arc<GrammarPool>, options: EncodingOptions) -> Self {
        let uris = UriTable::from_grammar_contexts(&pool.uri_contexts);
        let values = ValueTable::new(options.value_partition_capacity, options.value_max_length);
        Self {
            channel: Channel::for_mode(options.coding_mode, writer),
            pool,
            runtime: RuntimeGrammars::default(),
            uris,
            values,
            stack: ElementContextStack::new(),
            global_elements: HashMap::new(),
            options,
            error_handler: Box::new(NoopErrorHandler),
        }
    }

    pub fn set_error_handler(&mut self, handler: impl ErrorHandler + 'static) {
        self.error_handler = Box::new(handler);
    }

    /// Convenience for tests/diagnostics: an encoder that collects its
    /// warnings instead of discarding them.
    pub fn with_collecting_error_handler(writer: W, pool: Arc<GrammarPool>, options: EncodingOptions) -> Self {
        let mut encoder = Self::new(writer, pool, options);
        encoder.set_error_handler(CollectingErrorHandler::default());
        encoder
    }

    /// Flushes the channel and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.channel.flush()?;
        Ok(self.channel.into_inner())
    }

    fn grammar(&self, r: GrammarRef) -> &Grammar {
        match r {
            GrammarRef::Schema(id) => self.pool.schema_arena.get(id),
            GrammarRef::Runtime(id) => self.runtime.arena.get(id),
        }
    }

    /// Only runtime grammars are mutable; schema-informed grammars are built
    /// once and shared read-only, so extending one is not supported by this
    /// core (schema ingestion/extension is out of scope).
    fn grammar_mut(&mut self, r: GrammarRef) -> Result<&mut Grammar> {
        match r {
            GrammarRef::Runtime(id) => Ok(self.runtime.arena.get_mut(id)),
            GrammarRef::Schema(_) => Err(Error::EventNotPermitted("schema-informed grammar is not runtime-extensible")),
        }
    }

    /// Applies an EXI-profile learning limit check before appending a
    /// production (§4.3 "Grammar-learning limits"): folds
    /// `DisableWithXsiType` into `GhostProduction`'s `stop_learning`
    /// behavior, since constructing the fixed xsi:type element-fragment
    /// grammar the profile prefers needs schema-ingestion machinery this
    /// core does not have.
    fn learn_with_profile<F>(&mut self, grammar_ref: GrammarRef, right_after_se_or_ns: bool, learn_fn: F) -> Result<()>
    where
        F: FnOnce(&mut Grammar),
    {
        let params = self.options.profile;
        let current_productions = self.grammar(grammar_ref).len() as u32;
        let current_element_grammars = self.global_elements.len() as u32;
        let action = learning_limit_action(params, current_element_grammars, current_productions, right_after_se_or_ns);

        let grammar = self.grammar_mut(grammar_ref)?;
        if matches!(action, LearningLimitAction::GhostProduction | LearningLimitAction::DisableWithXsiType) {
            grammar.stop_learning();
        }
        learn_fn(grammar);
        Ok(())
    }

    /// Gets or lazily allocates the built-in `(StartTagContent, ElementContent)`
    /// pair for an element name seen anywhere in the document so far (§4.5
    /// `runtime_global_elements`).
    fn global_element_grammars(&mut self, uri_id: UriId, local_id: LocalNameId) -> GlobalElementGrammars {
        if let Some(existing) = self.global_elements.get(&(uri_id, local_id)) {
            return *existing;
        }
        let (start_tag, element_content) = built_in::alloc_element_grammars(&mut self.runtime.arena);
        let grammars = GlobalElementGrammars { start_tag, element_content };
        self.global_elements.insert((uri_id, local_id), grammars);
        grammars
    }

    /// Pushes a new open-element frame for `qnc`, wiring
    /// `built_in_element_content` for built-in frames so later learn
    /// operations on this element don't need to re-derive its content
    /// grammar (§4.5).
    fn push_element_frame(&mut self, qnc: Rc<QNameContext>) {
        let inherited_space = self.stack.effective_space_preserve();
        let mut frame = if let Some(schema_start_tag) = qnc.global_start_element_grammar {
            ElementContext::for_element(qnc, GrammarRef::Schema(schema_start_tag), Some(inherited_space))
        } else {
            let globals = self.global_element_grammars(qnc.uri_id, qnc.local_id);
            let mut frame = ElementContext::for_element(qnc, GrammarRef::Runtime(globals.start_tag), Some(inherited_space));
            frame.built_in_element_content = Some(GrammarRef::Runtime(globals.element_content));
            frame
        };
        frame.xml_space_preserve = None;
        self.stack.push(frame);
    }

    /// The `next` a learned `Attribute`/`NamespaceDeclaration` production
    /// uses: these stay within the current (`StartTagContent`) grammar.
    fn attribute_next(&self) -> GrammarRef {
        self.stack.top().expect("open element required").grammar
    }

    /// The `next` a learned `StartElement`/`Characters` production uses:
    /// the owning element's own `ElementContent` grammar, fixed at push time
    /// (§4.3 "StartTagContent's learned StartElement transitions into the
    /// owning element's ElementContent"). Falls back to the current grammar
    /// for document/fragment-root frames, which have no such transition.
    fn content_next(&self) -> GrammarRef {
        let top = self.stack.top().expect("open element required");
        top.built_in_element_content.unwrap_or(top.grammar)
    }

    fn value_coding_mode(&self) -> datatype::ValueCodingMode {
        if self.options.fidelity.preserve_lexical_values {
            datatype::ValueCodingMode::Lexical
        } else {
            datatype::ValueCodingMode::Typed
        }
    }

    /// Resolves the wire position of `kind` in the current 2nd-level event
    /// set, and the bit width needed to address it (§4.3).
    fn second_level_position(&self, grammar: &Grammar, kind: SecondLevelKind) -> Result<(u32, u32)> {
        let order = second_level_event_order(grammar, &self.options.fidelity);
        let width = bits_for(order.len() as u32);
        let pos = order.iter().position(|k| *k == kind).ok_or(Error::EventNotPermitted(kind.label()))?;
        Ok((pos as u32, width))
    }

    pub fn encode_start_document(&mut self) -> Result<()> {
        self.runtime.init_for_each_run();
        self.uris.init_for_each_run();
        self.values.clear();
        self.stack.clear();
        self.global_elements.clear();

        let root_ref = if self.options.fragment {
            GrammarRef::Schema(self.pool.fragment)
        } else {
            GrammarRef::Schema(self.pool.document)
        };
        self.stack.push(ElementContext::root(root_ref));

        let width = first_level_code_length(self.grammar(root_ref));
        self.channel.encode_n_bit_unsigned(0, width)?;

        let starting = self.runtime.starting.expect("init_for_each_run just ran");
        let content_ref = if self.options.fragment {
            GrammarRef::Runtime(starting.fragment_content)
        } else {
            GrammarRef::Runtime(starting.doc_content)
        };
        self.stack.top_mut().expect("root frame just pushed").grammar = content_ref;
        Ok(())
    }

    /// Coded unconditionally as the lone production of the terminal
    /// `DocEnd` grammar (§4.3): this core does not track a built-in
    /// `DocContent`'s own learned transition into `DocEnd`, a schema-level
    /// elaboration out of scope here.
    pub fn encode_end_document(&mut self) -> Result<()> {
        let width = first_level_code_length(self.grammar(GrammarRef::Schema(self.pool.doc_end)));
        self.channel.encode_n_bit_unsigned(0, width)?;
        self.stack.pop().ok_or(Error::UnbalancedElementStack)?;
        Ok(())
    }

    pub fn encode_start_element(&mut self, uri: &str, local: &str, prefix: Option<&str>) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let uri_id = self.uris.find(uri);
        let local_match = uri_id.and_then(|uid| self.uris.get(uid).and_then(|ctx| ctx.find_local_name(local).cloned()));

        let declared = {
            let grammar = self.grammar(frame_grammar_ref);
            match (uri_id, &local_match) {
                (Some(uid), Some(qnc)) => find_start_element(grammar, uid, qnc.local_id),
                _ => None,
            }
        };

        if let Some((code, parent_next)) = declared {
            let width = first_level_code_length(self.grammar(frame_grammar_ref));
            self.channel.encode_n_bit_unsigned(code, width)?;
            let qnc = local_match.expect("declared match implies a known qname");
            let uri_id = qnc.uri_id;
            self.stack.top_mut().expect("checked above").grammar = parent_next;
            self.push_element_frame(qnc);
            self.encode_start_tag_prefix(uri_id, prefix)?;
            return Ok(());
        }

        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::StartElementUndeclared)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;

        let uid = self.uris.encode_uri(&mut self.channel, uri)?;
        let (_, qnc) = self.uris.encode_local_name(&mut self.channel, uid, local)?;

        let next = self.content_next();
        self.learn_with_profile(frame_grammar_ref, true, |g| g.learn_start_element(qnc.clone(), next))?;

        self.stack.top_mut().expect("checked above").grammar = next;
        self.push_element_frame(qnc);
        self.encode_start_tag_prefix(uid, prefix)?;
        Ok(())
    }

    /// Writes the per-occurrence prefix for the just-pushed element frame
    /// when `PRESERVE_PREFIX` is on (§4.5 step 5): hit/miss via the URI's
    /// prefix partition, falling back to a synthesized default (with a
    /// warning) when the caller supplied none. A no-op, storing only the
    /// caller's hint in memory, when prefix preservation is off (§4.5
    /// "Prefix policy").
    fn encode_start_tag_prefix(&mut self, uri_id: UriId, prefix: Option<&str>) -> Result<()> {
        if !self.options.fidelity.preserve_prefixes {
            self.stack.top_mut().expect("frame just pushed").prefix = prefix.map(Rc::from);
            return Ok(());
        }
        let resolved: Rc<str> = match prefix {
            Some(p) => Rc::from(p),
            None => {
                let uri = self.uris.get(uri_id).map(|ctx| ctx.grammar.uri.to_string()).unwrap_or_default();
                self.error_handler.warning(WarningKind::PrefixMissing { uri: uri.clone() });
                let default = self
                    .stack
                    .top()
                    .and_then(|f| f.qname.as_ref())
                    .map(|q| q.default_prefix())
                    .unwrap_or_default();
                Rc::from(default)
            }
        };
        self.uris.encode_prefix(&mut self.channel, uri_id, &resolved)?;
        self.stack.top_mut().expect("frame just pushed").prefix = Some(resolved);
        Ok(())
    }

    pub fn encode_end_element(&mut self) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;

        let declared = {
            let grammar = self.grammar(frame_grammar_ref);
            find_end_element(grammar)
        };

        if let Some((code, _next)) = declared {
            let width = first_level_code_length(self.grammar(frame_grammar_ref));
            self.channel.encode_n_bit_unsigned(code, width)?;
        } else {
            let (width, visible, second_pos, second_width) = {
                let grammar = self.grammar(frame_grammar_ref);
                let width = first_level_code_length(grammar);
                let visible = grammar.visible_len() as u32;
                let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::EndElementUndeclared)?;
                (width, visible, pos, second_width)
            };
            self.channel.encode_n_bit_unsigned(visible, width)?;
            self.channel.encode_n_bit_unsigned(second_pos, second_width)?;
            self.learn_with_profile(frame_grammar_ref, false, |g| g.learn_end_element(frame_grammar_ref))?;
        }
        self.stack.pop().ok_or(Error::UnbalancedElementStack)?;
        Ok(())
    }

    pub fn encode_attribute(&mut self, uri: &str, local: &str, datatype: Datatype, value: Value) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let uri_id = self.uris.find(uri);
        let local_match = uri_id.and_then(|uid| self.uris.get(uid).and_then(|ctx| ctx.find_local_name(local).cloned()));

        let declared = {
            let grammar = self.grammar(frame_grammar_ref);
            match (uri_id, &local_match) {
                (Some(uid), Some(qnc)) => find_attribute(grammar, uid, qnc.local_id),
                _ => None,
            }
        };

        if let Some((code, _next)) = declared {
            let width = first_level_code_length(self.grammar(frame_grammar_ref));
            self.channel.encode_n_bit_unsigned(code, width)?;
            let qnc = local_match.expect("declared match implies a known qname");
            self.encode_attribute_value(qnc.uri_id, qnc.local_id, &datatype, &value)?;
            return Ok(());
        }

        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::AttributeUndeclared)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;

        let uid = self.uris.encode_uri(&mut self.channel, uri)?;
        let (local_id, qnc) = self.uris.encode_local_name(&mut self.channel, uid, local)?;

        let next = self.attribute_next();
        let dt = datatype.clone();
        self.learn_with_profile(frame_grammar_ref, false, |g| g.learn_attribute(qnc, dt, next))?;

        self.encode_attribute_value(uid, local_id, &datatype, &value)?;
        Ok(())
    }

    /// Routes string-valued attributes through the value partition (§4.2);
    /// every other datatype is rendered directly by the type coder. Full
    /// lexical-mode partition integration for non-string datatypes would
    /// require threading every datatype's lexical rendering through the
    /// value tables, judged disproportionate to this core's scope.
    fn encode_attribute_value(&mut self, uri_id: UriId, local_id: LocalNameId, datatype: &Datatype, value: &Value) -> Result<()> {
        match (datatype, value) {
            (Datatype::String, Value::String(s)) => self.values.encode_value(&mut self.channel, (uri_id, local_id), s),
            _ => datatype::encode_value(&mut self.channel, self.value_coding_mode(), datatype, value),
        }
    }

    /// Schema-invalid-value deviation path (§7.1.7): tries the grammar's
    /// declared `AT(invalid)`/`AT(*,invalid)` production first, falling
    /// back to the ordinary undeclared-attribute path (schemaless built-in
    /// grammars never learn an invalid-value production, so this is the
    /// only reachable branch for them).
    pub fn encode_attribute_invalid_value(&mut self, uri: &str, local: &str, raw: &str) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;

        let (width, invalid_code) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let invalid_code = grammar
                .productions
                .iter()
                .position(|p| matches!(p.event_type, crate::grammar::EventType::AttributeInvalidValue | crate::grammar::EventType::AttributeAnyInvalidValue));
            (width, invalid_code)
        };

        if let Some(code) = invalid_code {
            self.channel.encode_n_bit_unsigned(code as u32, width)?;
        } else {
            let (visible, second_pos, second_width) = {
                let grammar = self.grammar(frame_grammar_ref);
                let visible = grammar.visible_len() as u32;
                let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::AttributeUndeclared)?;
                (visible, pos, second_width)
            };
            self.channel.encode_n_bit_unsigned(visible, width)?;
            self.channel.encode_n_bit_unsigned(second_pos, second_width)?;
            let uid = self.uris.encode_uri(&mut self.channel, uri)?;
            self.uris.encode_local_name(&mut self.channel, uid, local)?;
        }

        let codepoints: Vec<u32> = raw.chars().map(|c| c as u32).collect();
        self.channel.encode_string(&codepoints)?;
        self.error_handler.warning(WarningKind::SchemaInvalidValue { qname: format!("{{{}}}{}", uri, local) });
        Ok(())
    }

    /// Only reachable when the current grammar is schema-informed and
    /// `is_type_castable` (§4.4): built-in grammars never learn an
    /// `AttributeXsiType` production, so this always errors for them.
    pub fn encode_attribute_xsi_type(&mut self, type_uri: &str, type_local: &str) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let (width, code) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let code = grammar.productions.iter().position(|p| matches!(p.event_type, crate::grammar::EventType::AttributeXsiType));
            (width, code)
        };
        let code = code.ok_or(Error::EventNotPermitted("AT(xsi:type)"))?;
        self.channel.encode_n_bit_unsigned(code as u32, width)?;
        let uid = self.uris.encode_uri(&mut self.channel, type_uri)?;
        self.uris.encode_local_name(&mut self.channel, uid, type_local)?;
        Ok(())
    }

    /// Only reachable when the current grammar is schema-informed and
    /// `is_nillable` (§4.4); see [`Self::encode_attribute_xsi_type`].
    pub fn encode_attribute_xsi_nil(&mut self, nil: bool) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let (width, code) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let code = grammar.productions.iter().position(|p| matches!(p.event_type, crate::grammar::EventType::AttributeXsiNil));
            (width, code)
        };
        let code = code.ok_or(Error::EventNotPermitted("AT(xsi:nil)"))?;
        self.channel.encode_n_bit_unsigned(code as u32, width)?;
        self.channel.encode_boolean(nil)?;
        Ok(())
    }

    pub fn encode_characters(&mut self, datatype: Datatype, value: Value) -> Result<()> {
        if let Value::String(s) = &value {
            if is_whitespace_only(s) && self.has_learned_element_child() {
                self.error_handler.warning(WarningKind::WhitespaceDropped);
                return Ok(());
            }
        }

        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;

        let declared = {
            let grammar = self.grammar(frame_grammar_ref);
            find_characters(grammar)
        };

        if let Some((code, next)) = declared {
            let width = first_level_code_length(self.grammar(frame_grammar_ref));
            self.channel.encode_n_bit_unsigned(code, width)?;
            self.stack.top_mut().expect("checked above").grammar = next;
            self.encode_characters_value(&datatype, &value)?;
            return Ok(());
        }

        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::CharactersUndeclared)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;

        let next = self.content_next();
        let dt = datatype.clone();
        self.learn_with_profile(frame_grammar_ref, false, |g| g.learn_characters(dt, next))?;
        self.stack.top_mut().expect("checked above").grammar = next;
        self.encode_characters_value(&datatype, &value)?;
        Ok(())
    }

    /// The schemaless "simple content" whitespace heuristic (§3 Invariants):
    /// a whitespace-only text node is only a drop candidate once the
    /// enclosing element has already learned a `StartElement` production,
    /// i.e. looks like it carries structured children rather than simple
    /// text content. A real schema-driven content model would decide this
    /// precisely; this is this core's schemaless approximation of it.
    fn has_learned_element_child(&self) -> bool {
        let Some(top) = self.stack.top() else { return false };
        let grammar = self.grammar(top.grammar);
        grammar.productions[..grammar.visible_len()]
            .iter()
            .any(|p| matches!(p.event_type, crate::grammar::EventType::StartElement(_)))
    }

    /// Value partitions key characters values by the *enclosing element's*
    /// qname (§4.2), unlike attribute values, which key by the attribute's
    /// own qname.
    fn encode_characters_value(&mut self, datatype: &Datatype, value: &Value) -> Result<()> {
        let qname = self
            .stack
            .top()
            .and_then(|f| f.qname.as_ref())
            .map(|q| (q.uri_id, q.local_id))
            .unwrap_or((0, 0));
        match (datatype, value) {
            (Datatype::String, Value::String(s)) => self.values.encode_value(&mut self.channel, qname, s),
            _ => datatype::encode_value(&mut self.channel, self.value_coding_mode(), datatype, value),
        }
    }

    pub fn encode_namespace_declaration(&mut self, uri: &str, prefix: &str, is_local_element_ns: bool) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;

        let declared = {
            let grammar = self.grammar(frame_grammar_ref);
            find_namespace_declaration(grammar)
        };

        if let Some((code, _next)) = declared {
            let width = first_level_code_length(self.grammar(frame_grammar_ref));
            self.channel.encode_n_bit_unsigned(code, width)?;
            let uid = self.uris.encode_uri(&mut self.channel, uri)?;
            self.uris.encode_prefix(&mut self.channel, uid, prefix)?;
            self.channel.encode_boolean(is_local_element_ns)?;
            if let Some(top) = self.stack.top_mut() {
                top.declared_namespaces.push((Rc::from(uri), Rc::from(prefix)));
            }
            return Ok(());
        }

        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::NamespaceDeclaration)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;

        let uid = self.uris.encode_uri(&mut self.channel, uri)?;
        self.uris.encode_prefix(&mut self.channel, uid, prefix)?;
        self.channel.encode_boolean(is_local_element_ns)?;

        let next = self.attribute_next();
        self.learn_with_profile(frame_grammar_ref, true, |g| g.learn_namespace(next))?;

        if let Some(top) = self.stack.top_mut() {
            top.declared_namespaces.push((Rc::from(uri), Rc::from(prefix)));
        }
        Ok(())
    }

    pub fn encode_comment(&mut self, text: &str) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::Comment)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;
        let codepoints: Vec<u32> = text.chars().map(|c| c as u32).collect();
        self.channel.encode_string(&codepoints)
    }

    pub fn encode_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::ProcessingInstruction)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;
        let target_cp: Vec<u32> = target.chars().map(|c| c as u32).collect();
        self.channel.encode_string(&target_cp)?;
        let data_cp: Vec<u32> = data.chars().map(|c| c as u32).collect();
        self.channel.encode_string(&data_cp)
    }

    /// DocType/EntityReference bypass the grammar/event-code system entirely
    /// (§4.3's 2nd-level event set has no slot for either): they are only
    /// reachable at all under `preserve_dtds`, and are coded as a simple
    /// out-of-band run of presence-tagged strings rather than being woven
    /// into the production/event-code machinery that every other event uses.
    pub fn encode_doc_type(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>, text: &str) -> Result<()> {
        if !self.options.fidelity.preserve_dtds {
            return Err(Error::EventNotPermitted("DT"));
        }
        self.encode_opt_string(Some(name))?;
        self.encode_opt_string(public_id)?;
        self.encode_opt_string(system_id)?;
        self.encode_opt_string(Some(text))?;
        Ok(())
    }

    pub fn encode_entity_reference(&mut self, name: &str) -> Result<()> {
        if !self.options.fidelity.preserve_dtds {
            return Err(Error::EventNotPermitted("ER"));
        }
        let codepoints: Vec<u32> = name.chars().map(|c| c as u32).collect();
        self.channel.encode_string(&codepoints)
    }

    fn encode_opt_string(&mut self, value: Option<&str>) -> Result<()> {
        self.channel.encode_boolean(value.is_some())?;
        if let Some(s) = value {
            let codepoints: Vec<u32> = s.chars().map(|c| c as u32).collect();
            self.channel.encode_string(&codepoints)?;
        }
        Ok(())
    }

    /// The self-contained-element recursion (§3 Supplemented features):
    /// writes the `SC` event code, byte-aligns, then hands control to
    /// `body` to encode the nested subtree against the same channel and
    /// grammar pool. Does not implement the skippable byte-length prefix
    /// the EXI spec uses to let a reader skip over an `SC` fragment without
    /// decoding it — that framing is independent of the coding algorithm
    /// itself and is left to an external collaborator, consistent with this
    /// core's I/O-framing non-goal.
    pub fn encode_self_contained<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let (width, visible, second_pos, second_width) = {
            let grammar = self.grammar(frame_grammar_ref);
            let width = first_level_code_length(grammar);
            let visible = grammar.visible_len() as u32;
            let (pos, second_width) = self.second_level_position(grammar, SecondLevelKind::SelfContained)?;
            (width, visible, pos, second_width)
        };
        self.channel.encode_n_bit_unsigned(visible, width)?;
        self.channel.encode_n_bit_unsigned(second_pos, second_width)?;
        self.channel.align()?;
        body(self)
    }

    /// Convenience dispatcher from the owned [`Event`] enum to the
    /// corresponding `encode_*` method, for callers that would rather
    /// construct one value than call one of fourteen methods.
    pub fn encode_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::StartDocument => self.encode_start_document(),
            Event::EndDocument => self.encode_end_document(),
            Event::StartElement(qnc) => {
                let uri = qnc.uri.to_string();
                let local = qnc.local_name.to_string();
                self.encode_start_element(&uri, &local, None)
            }
            Event::EndElement => self.encode_end_element(),
            Event::Attribute(qnc, datatype, value) => {
                let uri = qnc.uri.to_string();
                let local = qnc.local_name.to_string();
                self.encode_attribute(&uri, &local, datatype, value)
            }
            Event::AttributeInvalidValue(qnc, raw) => self.encode_attribute_invalid_value(&qnc.uri, &qnc.local_name, &raw),
            Event::AttributeXsiType(qnc) => self.encode_attribute_xsi_type(&qnc.uri, &qnc.local_name),
            Event::AttributeXsiNil(nil) => self.encode_attribute_xsi_nil(nil),
            Event::Characters(datatype, value) => self.encode_characters(datatype, value),
            Event::NamespaceDeclaration { uri, prefix, is_local_element_ns } => {
                self.encode_namespace_declaration(&uri, &prefix, is_local_element_ns)
            }
            Event::SelfContained => self.encode_self_contained(|_| Ok(())),
            Event::DocType { name, public_id, system_id, text } => {
                self.encode_doc_type(&name, public_id.as_deref(), system_id.as_deref(), &text)
            }
            Event::EntityReference(name) => self.encode_entity_reference(&name),
            Event::Comment(text) => self.encode_comment(&text),
            Event::ProcessingInstruction { target, data } => self.encode_processing_instruction(&target, &data),
        }
    }
}

/// Per §3 Invariants: whitespace means the XML space characters only
/// (`\x20\t\n\r`), not full Unicode whitespace.
fn is_whitespace_only(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::pool::GrammarPool;
    use crate::options::EncodingOptions;

    #[test]
    fn empty_document_round_trips_through_encoder_and_decoder() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "r", None).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = super::super::decoder::BodyDecoder::new(bytes.as_slice(), pool, EncodingOptions::schemaless_defaults());
        decoder.decode_start_document().unwrap();
        match decoder.decode_event().unwrap() {
            Event::StartElement(qnc) => assert_eq!(qnc.local_name.as_ref(), "r"),
            other => panic!("expected StartElement, got {:?}", other.family()),
        }
        match decoder.decode_event().unwrap() {
            Event::EndElement => {}
            other => panic!("expected EndElement, got {:?}", other.family()),
        }
        decoder.decode_end_document().unwrap();
    }

    #[test]
    fn root_element_and_end_document_produce_a_non_empty_body() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::new(Vec::new(), pool, EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "root", None).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn second_child_with_same_name_is_declared_on_second_occurrence() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::new(Vec::new(), pool, EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "root", None).unwrap();
        encoder.encode_start_element("", "child", None).unwrap();
        encoder.encode_end_element().unwrap();
        // Second "child" under the same parent should now match the learned
        // production instead of falling through to the undeclared path.
        encoder.encode_start_element("", "child", None).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
    }

    #[test]
    fn whitespace_is_dropped_only_after_an_element_child_is_learned() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::with_collecting_error_handler(Vec::new(), pool, EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "root", None).unwrap();
        // No element child learned yet: whitespace is kept as real content.
        encoder.encode_characters(Datatype::String, Value::String("  ".into())).unwrap();
        encoder.encode_start_element("", "child", None).unwrap();
        encoder.encode_end_element().unwrap();
        // Now root has learned a StartElement production: whitespace drops.
        encoder.encode_characters(Datatype::String, Value::String("\n  ".into())).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
    }
}
