//! The decode side of the body coder (§4.5): mirrors [`super::encoder::BodyEncoder`]
//! method-for-method, reading 1st/2nd-level event codes off the channel and
//! reconstructing one owned [`Event`] at a time, pulled by the caller rather
//! than pushed.

use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;

use crate::channel::{bits_for, BitPackedReader, BytePackedReader, ChannelReader};
use crate::datatype::{self, Datatype, Value};
use crate::errors::{Error, ErrorHandler, NoopErrorHandler, Result};
use crate::event::Event;
use crate::grammar::built_in;
use crate::grammar::pool::{GrammarPool, RuntimeGrammars};
use crate::grammar::{EventType, Grammar, GrammarRef, Production};
use crate::name::{LocalNameId, QNameContext, UriId};
use crate::options::{CodingMode, EncodingOptions};
use crate::profile::{learning_limit_action, LearningLimitAction};
use crate::string_table::{UriTable, ValueTable};

use super::{
    find_attribute, find_characters, find_end_element, find_namespace_declaration, find_start_element,
    first_level_code_length, production_at_code, second_level_event_order, ElementContext, ElementContextStack,
    GlobalElementGrammars, SecondLevelKind,
};

/// Either channel layout, dispatched manually the way
/// [`crate::channel::ChannelReader`]'s two implementors differ only in their
/// four required methods (§4.1).
enum Channel<R: Read> {
    BitPacked(BitPackedReader<R>),
    BytePacked(BytePackedReader<R>),
}

impl<R: Read> Channel<R> {
    fn for_mode(mode: CodingMode, reader: R) -> Self {
        if mode.is_byte_aligned() {
            Channel::BytePacked(BytePackedReader::new(reader))
        } else {
            Channel::BitPacked(BitPackedReader::new(reader))
        }
    }

    fn into_inner(self) -> R {
        match self {
            Channel::BitPacked(r) => r.into_inner(),
            Channel::BytePacked(r) => r.into_inner(),
        }
    }
}

impl<R: Read> ChannelReader for Channel<R> {
    fn decode_n_bit_unsigned(&mut self, n: u32) -> Result<u32> {
        match self {
            Channel::BitPacked(r) => r.decode_n_bit_unsigned(n),
            Channel::BytePacked(r) => r.decode_n_bit_unsigned(n),
        }
    }

    fn decode_boolean(&mut self) -> Result<bool> {
        match self {
            Channel::BitPacked(r) => r.decode_boolean(),
            Channel::BytePacked(r) => r.decode_boolean(),
        }
    }

    fn align(&mut self) -> Result<()> {
        match self {
            Channel::BitPacked(r) => r.align(),
            Channel::BytePacked(r) => r.align(),
        }
    }

    fn look_ahead(&mut self) -> Result<u8> {
        match self {
            Channel::BitPacked(r) => r.look_ahead(),
            Channel::BytePacked(r) => r.look_ahead(),
        }
    }
}

/// Drives one EXI document's worth of decoding against a shared
/// [`GrammarPool`] (§4.5, §5 "Shared vs exclusive ownership"), mirroring
/// [`super::encoder::BodyEncoder`] field for field.
pub struct BodyDecoder<R: Read> {
    channel: Channel<R>,
    pool: Arc<GrammarPool>,
    runtime: RuntimeGrammars,
    uris: UriTable,
    values: ValueTable,
    stack: ElementContextStack,
    global_elements: HashMap<(UriId, LocalNameId), GlobalElementGrammars>,
    options: EncodingOptions,
    error_handler: Box<dyn ErrorHandler>,
}

impl<R: Read> BodyDecoder<R> {
    pub fn new(reader: R, pool: Arc<GrammarPool>, options: EncodingOptions) -> Self {
        let uris = UriTable::from_grammar_contexts(&pool.uri_contexts);
        let values = ValueTable::new(options.value_partition_capacity, options.value_max_length);
        Self {
            channel: Channel::for_mode(options.coding_mode, reader),
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

    /// Hands back the underlying reader.
    pub fn finish(self) -> R {
        self.channel.into_inner()
    }

    /// Prefix this element's content was decoded with, once `decode_start_element`
    /// has been called for it (or the symmetric dispatch inside `decode_event`).
    pub fn current_prefix(&self) -> Option<&Rc<str>> {
        self.stack.top().and_then(|f| f.prefix.as_ref())
    }

    fn grammar(&self, r: GrammarRef) -> &Grammar {
        match r {
            GrammarRef::Schema(id) => self.pool.schema_arena.get(id),
            GrammarRef::Runtime(id) => self.runtime.arena.get(id),
        }
    }

    fn grammar_mut(&mut self, r: GrammarRef) -> Result<&mut Grammar> {
        match r {
            GrammarRef::Runtime(id) => Ok(self.runtime.arena.get_mut(id)),
            GrammarRef::Schema(_) => Err(Error::EventNotPermitted("schema-informed grammar is not runtime-extensible")),
        }
    }

    /// Decode-side counterpart to [`super::encoder::BodyEncoder::learn_with_profile`]:
    /// the profile check is symmetric since it depends only on the running
    /// grammar/production counts, not on which side is coding.
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

    fn global_element_grammars(&mut self, uri_id: UriId, local_id: LocalNameId) -> GlobalElementGrammars {
        if let Some(existing) = self.global_elements.get(&(uri_id, local_id)) {
            return *existing;
        }
        let (start_tag, element_content) = built_in::alloc_element_grammars(&mut self.runtime.arena);
        let grammars = GlobalElementGrammars { start_tag, element_content };
        self.global_elements.insert((uri_id, local_id), grammars);
        grammars
    }

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

    fn attribute_next(&self) -> GrammarRef {
        self.stack.top().expect("open element required").grammar
    }

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

    pub fn decode_start_document(&mut self) -> Result<()> {
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
        let code = self.channel.decode_n_bit_unsigned(width)?;
        if code != 0 {
            return Err(Error::IllegalEventCode { grammar: "Document", code });
        }

        let starting = self.runtime.starting.expect("init_for_each_run just ran");
        let content_ref = if self.options.fragment {
            GrammarRef::Runtime(starting.fragment_content)
        } else {
            GrammarRef::Runtime(starting.doc_content)
        };
        self.stack.top_mut().expect("root frame just pushed").grammar = content_ref;
        Ok(())
    }

    pub fn decode_end_document(&mut self) -> Result<()> {
        let width = first_level_code_length(self.grammar(GrammarRef::Schema(self.pool.doc_end)));
        let code = self.channel.decode_n_bit_unsigned(width)?;
        if code != 0 {
            return Err(Error::IllegalEventCode { grammar: "DocEnd", code });
        }
        self.stack.pop().ok_or(Error::UnbalancedElementStack)?;

        if let Some(max) = self.options.profile.max_built_in_element_grammars {
            let evolved = self.global_elements.len() as u64;
            if evolved > max as u64 {
                return Err(Error::ProfileLimitExceeded { limit: "maxBuiltInElementGrammars", value: evolved });
            }
        }
        Ok(())
    }

    /// Reads the next event against the current grammar (§4.5 "Decode one
    /// event"): a concrete 1st-level code is looked up directly; anything
    /// that falls through decodes the 2nd-level selector and, for an
    /// Undeclared event, learns the new production before returning it so a
    /// later occurrence of the same shape hits the 1st level.
    pub fn decode_event(&mut self) -> Result<Event> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let width = first_level_code_length(self.grammar(frame_grammar_ref));
        let code = self.channel.decode_n_bit_unsigned(width)?;
        let visible = self.grammar(frame_grammar_ref).visible_len() as u32;

        if code < visible {
            let production = production_at_code(self.grammar(frame_grammar_ref), code)
                .cloned()
                .ok_or(Error::IllegalEventCode { grammar: "current", code })?;
            return self.decode_matched_production(production);
        }

        let second_kind = {
            let grammar = self.grammar(frame_grammar_ref);
            let order = second_level_event_order(grammar, &self.options.fidelity);
            let second_width = bits_for(order.len() as u32);
            let pos = self.channel.decode_n_bit_unsigned(second_width)? as usize;
            *order
                .get(pos)
                .ok_or(Error::IllegalEventCode { grammar: "2nd-level", code: pos as u32 })?
        };

        match second_kind {
            SecondLevelKind::EndElementUndeclared => self.decode_end_element_undeclared(frame_grammar_ref),
            SecondLevelKind::AttributeUndeclared => self.decode_attribute_undeclared(frame_grammar_ref),
            SecondLevelKind::NamespaceDeclaration => self.decode_namespace_declaration_undeclared(frame_grammar_ref),
            SecondLevelKind::CharactersUndeclared => self.decode_characters_undeclared(frame_grammar_ref),
            SecondLevelKind::StartElementUndeclared => self.decode_start_element_undeclared(frame_grammar_ref),
            SecondLevelKind::SelfContained => {
                self.channel.align()?;
                Ok(Event::SelfContained)
            }
            SecondLevelKind::Comment => self.decode_comment(),
            SecondLevelKind::ProcessingInstruction => self.decode_processing_instruction(),
        }
    }

    /// Dispatches an already-resolved production (declared in the schema, or
    /// previously learned) to the concrete decode it names. Grammar
    /// transitions are only recorded here for `SE`/`CH` — the same
    /// asymmetry [`super::encoder::BodyEncoder`] follows, since `AT`/`NS`
    /// productions stay within the current grammar.
    fn decode_matched_production(&mut self, production: Production) -> Result<Event> {
        match production.event_type {
            EventType::StartElement(qnc) => {
                let uri_id = qnc.uri_id;
                self.stack.top_mut().expect("open element required").grammar = production.next;
                self.push_element_frame(qnc.clone());
                self.decode_start_tag_prefix(uri_id)?;
                Ok(Event::StartElement(qnc))
            }
            EventType::StartElementNs(uri_id) => {
                let (_, qnc) = self.uris.decode_local_name(&mut self.channel, uri_id)?;
                self.stack.top_mut().expect("open element required").grammar = production.next;
                self.push_element_frame(qnc.clone());
                self.decode_start_tag_prefix(uri_id)?;
                Ok(Event::StartElement(qnc))
            }
            EventType::StartElementGeneric => {
                let uid = self.uris.decode_uri(&mut self.channel)?;
                let (_, qnc) = self.uris.decode_local_name(&mut self.channel, uid)?;
                self.stack.top_mut().expect("open element required").grammar = production.next;
                self.push_element_frame(qnc.clone());
                self.decode_start_tag_prefix(uid)?;
                Ok(Event::StartElement(qnc))
            }
            EventType::EndElement => {
                self.stack.pop().ok_or(Error::UnbalancedElementStack)?;
                Ok(Event::EndElement)
            }
            EventType::Attribute(qnc, datatype) => {
                let uri_id = qnc.uri_id;
                let local_id = qnc.local_id;
                let value = self.decode_attribute_value(uri_id, local_id, &datatype)?;
                Ok(Event::Attribute(qnc, datatype, value))
            }
            EventType::AttributeNs(uri_id) => {
                let (local_id, qnc) = self.uris.decode_local_name(&mut self.channel, uri_id)?;
                let datatype = Datatype::String;
                let value = self.decode_attribute_value(uri_id, local_id, &datatype)?;
                Ok(Event::Attribute(qnc, datatype, value))
            }
            EventType::AttributeGeneric => {
                let uid = self.uris.decode_uri(&mut self.channel)?;
                let (local_id, qnc) = self.uris.decode_local_name(&mut self.channel, uid)?;
                let datatype = Datatype::String;
                let value = self.decode_attribute_value(uid, local_id, &datatype)?;
                Ok(Event::Attribute(qnc, datatype, value))
            }
            EventType::AttributeXsiType => {
                let uid = self.uris.decode_uri(&mut self.channel)?;
                let (_, type_qnc) = self.uris.decode_local_name(&mut self.channel, uid)?;
                Ok(Event::AttributeXsiType(type_qnc))
            }
            EventType::AttributeXsiNil => Ok(Event::AttributeXsiNil(self.channel.decode_boolean()?)),
            EventType::Characters(datatype) => {
                self.stack.top_mut().expect("open element required").grammar = production.next;
                let value = self.decode_characters_value(&datatype)?;
                Ok(Event::Characters(datatype, value))
            }
            EventType::CharactersGeneric => {
                self.stack.top_mut().expect("open element required").grammar = production.next;
                let datatype = Datatype::String;
                let value = self.decode_characters_value(&datatype)?;
                Ok(Event::Characters(datatype, value))
            }
            EventType::NamespaceDeclaration => {
                let (uri, prefix, is_local_element_ns) = self.decode_namespace_declaration_body()?;
                Ok(Event::NamespaceDeclaration { uri, prefix, is_local_element_ns })
            }
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    /// Writes the per-occurrence prefix for the just-pushed element frame
    /// when `PRESERVE_PREFIX` is on, mirroring
    /// [`super::encoder::BodyEncoder::encode_start_tag_prefix`]. Off, the
    /// frame's prefix stays `None` until a later `NS` event patches it in
    /// (§9 "Open questions": `decodeQNamePrefix` silently returns the empty
    /// prefix before any NS event establishes one).
    fn decode_start_tag_prefix(&mut self, uri_id: UriId) -> Result<()> {
        if !self.options.fidelity.preserve_prefixes {
            return Ok(());
        }
        let prefix = self.uris.decode_prefix(&mut self.channel, uri_id)?;
        self.stack.top_mut().expect("frame just pushed").prefix = Some(prefix);
        Ok(())
    }

    /// Convenience wrapper over [`Self::decode_event`] for a caller that
    /// already knows the next event is an `EndElement`.
    pub fn decode_end_element(&mut self) -> Result<()> {
        match self.decode_event()? {
            Event::EndElement => Ok(()),
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    fn decode_end_element_undeclared(&mut self, frame_grammar_ref: GrammarRef) -> Result<Event> {
        self.learn_with_profile(frame_grammar_ref, false, |g| g.learn_end_element(frame_grammar_ref))?;
        self.stack.pop().ok_or(Error::UnbalancedElementStack)?;
        Ok(Event::EndElement)
    }

    fn decode_start_element_undeclared(&mut self, frame_grammar_ref: GrammarRef) -> Result<Event> {
        let uid = self.uris.decode_uri(&mut self.channel)?;
        let (_, qnc) = self.uris.decode_local_name(&mut self.channel, uid)?;

        let next = self.content_next();
        let learned_qnc = qnc.clone();
        self.learn_with_profile(frame_grammar_ref, true, |g| g.learn_start_element(learned_qnc, next))?;

        self.stack.top_mut().expect("checked above").grammar = next;
        self.push_element_frame(qnc.clone());
        self.decode_start_tag_prefix(uid)?;
        Ok(Event::StartElement(qnc))
    }

    /// Routes string-valued attributes through the value partition (§4.2);
    /// every other datatype is read directly by the type coder. Mirrors
    /// [`super::encoder::BodyEncoder::encode_attribute_value`].
    fn decode_attribute_value(&mut self, uri_id: UriId, local_id: LocalNameId, datatype: &Datatype) -> Result<Value> {
        match datatype {
            Datatype::String => Ok(Value::String(self.values.decode_value(&mut self.channel, (uri_id, local_id))?)),
            _ => datatype::decode_value(&mut self.channel, self.value_coding_mode(), datatype),
        }
    }

    fn decode_characters_value(&mut self, datatype: &Datatype) -> Result<Value> {
        let qname = self
            .stack
            .top()
            .and_then(|f| f.qname.as_ref())
            .map(|q| (q.uri_id, q.local_id))
            .unwrap_or((0, 0));
        match datatype {
            Datatype::String => Ok(Value::String(self.values.decode_value(&mut self.channel, qname)?)),
            _ => datatype::decode_value(&mut self.channel, self.value_coding_mode(), datatype),
        }
    }

    pub fn decode_attribute(&mut self) -> Result<(Rc<QNameContext>, Datatype, Value)> {
        match self.decode_event()? {
            Event::Attribute(qnc, datatype, value) => Ok((qnc, datatype, value)),
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    /// Undeclared `AT`: schemaless decode has no schema type to recover the
    /// original datatype from, so — mirroring the schemaless convention
    /// [`super::encoder::BodyEncoder::has_learned_element_child`] documents
    /// for `CH` — this always reads the value as `xsd:string`. Non-string
    /// attribute values round-trip correctly only under `Lexical`/
    /// `StringOnly` coding or with a real schema (out of scope here).
    fn decode_attribute_undeclared(&mut self, frame_grammar_ref: GrammarRef) -> Result<Event> {
        let uid = self.uris.decode_uri(&mut self.channel)?;
        let (local_id, qnc) = self.uris.decode_local_name(&mut self.channel, uid)?;

        let next = self.attribute_next();
        let datatype = Datatype::String;
        let learned_qnc = qnc.clone();
        let learned_dt = datatype.clone();
        self.learn_with_profile(frame_grammar_ref, false, |g| g.learn_attribute(learned_qnc, learned_dt, next))?;

        let value = self.decode_attribute_value(uid, local_id, &datatype)?;
        Ok(Event::Attribute(qnc, datatype, value))
    }

    /// Schema-invalid-value deviation path (§7.1.7), symmetric to
    /// [`super::encoder::BodyEncoder::encode_attribute_invalid_value`]: only
    /// reachable when the current grammar declares an `AT(invalid)`/
    /// `AT(*,invalid)` production, which schemaless built-in grammars never
    /// learn, so callers drive this explicitly once they already know (from
    /// external validation) that the next attribute took the deviation path.
    pub fn decode_attribute_invalid_value(&mut self, _uri: &str, _local: &str) -> Result<Rc<str>> {
        let frame_grammar_ref = self.stack.top().ok_or(Error::UnbalancedElementStack)?.grammar;
        let width = first_level_code_length(self.grammar(frame_grammar_ref));
        let _code = self.channel.decode_n_bit_unsigned(width)?;
        let codepoints = self.channel.decode_string()?;
        Ok(codepoints.iter().filter_map(|&cp| char::from_u32(cp)).collect::<String>().into())
    }

    pub fn decode_attribute_xsi_type(&mut self) -> Result<Rc<QNameContext>> {
        match self.decode_event()? {
            Event::AttributeXsiType(qnc) => Ok(qnc),
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    pub fn decode_attribute_xsi_nil(&mut self) -> Result<bool> {
        match self.decode_event()? {
            Event::AttributeXsiNil(nil) => Ok(nil),
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    pub fn decode_characters(&mut self) -> Result<(Datatype, Value)> {
        match self.decode_event()? {
            Event::Characters(datatype, value) => Ok((datatype, value)),
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    fn decode_characters_undeclared(&mut self, frame_grammar_ref: GrammarRef) -> Result<Event> {
        let next = self.content_next();
        let datatype = Datatype::String;
        let learned_dt = datatype.clone();
        self.learn_with_profile(frame_grammar_ref, false, |g| g.learn_characters(learned_dt, next))?;
        self.stack.top_mut().expect("checked above").grammar = next;
        let value = self.decode_characters_value(&datatype)?;
        Ok(Event::Characters(datatype, value))
    }

    pub fn decode_namespace_declaration(&mut self) -> Result<(Rc<str>, Rc<str>, bool)> {
        match self.decode_event()? {
            Event::NamespaceDeclaration { uri, prefix, is_local_element_ns } => Ok((uri, prefix, is_local_element_ns)),
            other => Err(Error::EventNotPermitted(other.family())),
        }
    }

    /// Shared body for both the declared (1st-level, matched-production) and
    /// undeclared (2nd-level) `NS` paths.
    fn decode_namespace_declaration_body(&mut self) -> Result<(Rc<str>, Rc<str>, bool)> {
        let uid = self.uris.decode_uri(&mut self.channel)?;
        let prefix = self.uris.decode_prefix(&mut self.channel, uid)?;
        let is_local_element_ns = self.channel.decode_boolean()?;
        let uri = self.uris.get(uid).map(|ctx| ctx.grammar.uri.clone()).unwrap_or_else(|| Rc::from(""));
        if let Some(top) = self.stack.top_mut() {
            top.declared_namespaces.push((uri.clone(), prefix.clone()));
        }
        Ok((uri, prefix, is_local_element_ns))
    }

    fn decode_namespace_declaration_undeclared(&mut self, frame_grammar_ref: GrammarRef) -> Result<Event> {
        let (uri, prefix, is_local_element_ns) = self.decode_namespace_declaration_body()?;
        let next = self.attribute_next();
        self.learn_with_profile(frame_grammar_ref, true, |g| g.learn_namespace(next))?;
        Ok(Event::NamespaceDeclaration { uri, prefix, is_local_element_ns })
    }

    pub fn decode_comment(&mut self) -> Result<Event> {
        let codepoints = self.channel.decode_string()?;
        let text: Rc<str> = codepoints.iter().filter_map(|&cp| char::from_u32(cp)).collect::<String>().into();
        Ok(Event::Comment(text))
    }

    pub fn decode_processing_instruction(&mut self) -> Result<Event> {
        let target_cp = self.channel.decode_string()?;
        let target: Rc<str> = target_cp.iter().filter_map(|&cp| char::from_u32(cp)).collect::<String>().into();
        let data_cp = self.channel.decode_string()?;
        let data: Rc<str> = data_cp.iter().filter_map(|&cp| char::from_u32(cp)).collect::<String>().into();
        Ok(Event::ProcessingInstruction { target, data })
    }

    /// DocType/EntityReference bypass the grammar/event-code system entirely,
    /// mirroring [`super::encoder::BodyEncoder::encode_doc_type`]: callers
    /// drive these directly, only under `preserve_dtds`.
    pub fn decode_doc_type(&mut self) -> Result<Event> {
        if !self.options.fidelity.preserve_dtds {
            return Err(Error::EventNotPermitted("DT"));
        }
        let name = self.decode_opt_string()?.unwrap_or_default();
        let public_id = self.decode_opt_string()?;
        let system_id = self.decode_opt_string()?;
        let text = self.decode_opt_string()?.unwrap_or_default();
        Ok(Event::DocType {
            name: Rc::from(name),
            public_id: public_id.map(Rc::from),
            system_id: system_id.map(Rc::from),
            text: Rc::from(text),
        })
    }

    pub fn decode_entity_reference(&mut self) -> Result<Rc<str>> {
        if !self.options.fidelity.preserve_dtds {
            return Err(Error::EventNotPermitted("ER"));
        }
        let codepoints = self.channel.decode_string()?;
        Ok(codepoints.iter().filter_map(|&cp| char::from_u32(cp)).collect::<String>().into())
    }

    fn decode_opt_string(&mut self) -> Result<Option<String>> {
        if self.channel.decode_boolean()? {
            let codepoints = self.channel.decode_string()?;
            Ok(Some(codepoints.iter().filter_map(|&cp| char::from_u32(cp)).collect()))
        } else {
            Ok(None)
        }
    }

    /// The self-contained-element recursion counterpart to
    /// [`super::encoder::BodyEncoder::encode_self_contained`]: reads the
    /// `SC` code, byte-aligns, then hands control to `body` to decode the
    /// nested subtree off the same channel and grammar pool.
    pub fn decode_self_contained<F, T>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.channel.align()?;
        body(self)
    }
}

#[cfg(test)]
mod tests {
    use super::super::encoder::BodyEncoder;
    use super::*;
    use crate::grammar::pool::GrammarPool;
    use crate::options::EncodingOptions;

    #[test]
    fn single_element_document_round_trips() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "root", None).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, EncodingOptions::schemaless_defaults());
        decoder.decode_start_document().unwrap();
        match decoder.decode_event().unwrap() {
            Event::StartElement(qnc) => assert_eq!(qnc.local_name.as_ref(), "root"),
            other => panic!("expected StartElement, got {:?}", other.family()),
        }
        match decoder.decode_event().unwrap() {
            Event::EndElement => {}
            other => panic!("expected EndElement, got {:?}", other.family()),
        }
        decoder.decode_end_document().unwrap();
    }

    #[test]
    fn prefixed_element_and_namespace_round_trip() {
        let pool = GrammarPool::built_in();
        let mut options = EncodingOptions::schemaless_defaults();
        options.fidelity.preserve_prefixes = true;

        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), options.clone());
        encoder.encode_start_document().unwrap();
        encoder.encode_namespace_declaration("urn:example", "ex", true).unwrap();
        encoder.encode_start_element("urn:example", "root", Some("ex")).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, options);
        decoder.decode_start_document().unwrap();
        match decoder.decode_event().unwrap() {
            Event::NamespaceDeclaration { uri, prefix, is_local_element_ns } => {
                assert_eq!(uri.as_ref(), "urn:example");
                assert_eq!(prefix.as_ref(), "ex");
                assert!(is_local_element_ns);
            }
            other => panic!("expected NamespaceDeclaration, got {:?}", other.family()),
        }
        match decoder.decode_event().unwrap() {
            Event::StartElement(qnc) => {
                assert_eq!(qnc.uri.as_ref(), "urn:example");
                assert_eq!(decoder.current_prefix().map(|p| p.as_ref()), Some("ex"));
            }
            other => panic!("expected StartElement, got {:?}", other.family()),
        }
    }

    #[test]
    fn attribute_value_round_trips_through_decoder() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "root", None).unwrap();
        encoder.encode_attribute("", "a", Datatype::String, Value::String("hello".into())).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, EncodingOptions::schemaless_defaults());
        decoder.decode_start_document().unwrap();
        decoder.decode_event().unwrap(); // root
        match decoder.decode_event().unwrap() {
            Event::Attribute(qnc, datatype, value) => {
                assert_eq!(qnc.local_name.as_ref(), "a");
                assert_eq!(datatype, Datatype::String);
                assert_eq!(value, Value::String("hello".into()));
            }
            other => panic!("expected Attribute, got {:?}", other.family()),
        }
    }

    #[test]
    fn learned_start_element_is_declared_on_second_occurrence() {
        let pool = GrammarPool::built_in();
        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), EncodingOptions::schemaless_defaults());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "root", None).unwrap();
        encoder.encode_start_element("", "child", None).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_start_element("", "child", None).unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = BodyDecoder::new(bytes.as_slice(), pool, EncodingOptions::schemaless_defaults());
        decoder.decode_start_document().unwrap();
        decoder.decode_event().unwrap(); // root
        decoder.decode_event().unwrap(); // first child (undeclared, learns)
        decoder.decode_event().unwrap(); // EE
        match decoder.decode_event().unwrap() {
            Event::StartElement(qnc) => assert_eq!(qnc.local_name.as_ref(), "child"),
            other => panic!("expected StartElement, got {:?}", other.family()),
        }
    }
}
