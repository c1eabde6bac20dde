//! `exi-core`: the coupled triple of grammar engine, bit-level coding
//! channel and string/value partition tables that make up the hard part of
//! an [Efficient XML Interchange (EXI)][exi] 1.0 codec, plus the body coder
//! that ties them together into one event at a time.
//!
//! This crate does not read XML Schemas, does not parse the EXI header
//! options document, and does not adapt to a SAX/DOM surface — it starts
//! from an already-built [`grammar::pool::GrammarPool`] and an
//! [`options::EncodingOptions`], and drives [`event::Event`]s through
//! [`body::BodyEncoder`]/[`body::BodyDecoder`].
//!
//! ```
//! use exi_core::body::BodyEncoder;
//! use exi_core::grammar::pool::GrammarPool;
//! use exi_core::options::EncodingOptions;
//!
//! let pool = GrammarPool::built_in();
//! let mut encoder = BodyEncoder::new(Vec::new(), pool, EncodingOptions::schemaless_defaults());
//! encoder.encode_start_document().unwrap();
//! encoder.encode_start_element("", "root", None).unwrap();
//! encoder.encode_end_element().unwrap();
//! encoder.encode_end_document().unwrap();
//! let bytes = encoder.finish().unwrap();
//! assert!(!bytes.is_empty());
//! ```
//!
//! [exi]: https://www.w3.org/TR/exi/
//!
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(feature = "document-features", doc = "## Features")]
#![cfg_attr(feature = "document-features", doc = document_features::document_features!())]

pub mod body;
pub mod channel;
pub mod datatype;
pub mod errors;
pub mod event;
pub mod grammar;
pub mod name;
pub mod options;
pub mod profile;
pub mod string_table;

pub use errors::{Error, Result};
pub use event::{BorrowedEvent, Event};
