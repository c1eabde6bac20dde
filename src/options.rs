//! Fidelity options, coding mode selection and the EXI profile parameters
//! that together configure a [`crate::body::encoder::BodyEncoder`] or
//! [`crate::body::decoder::BodyDecoder`] (§6).

/// Which channel layout the body is coded against (§6 "Coding modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CodingMode {
    /// Arbitrary N-bit fields packed with no alignment.
    BitPacked,
    /// Every N-bit field padded out to a whole byte.
    BytePacked,
    /// Byte-packed, additionally laid out in blocks meant for external
    /// DEFLATE compression without the `FLUSH` boundary per block.
    PreCompression,
    /// Byte-packed, laid out in blocks and compressed with DEFLATE
    /// (delegated to an external [`Deflate`] collaborator).
    Compression,
}

impl Default for CodingMode {
    fn default() -> Self {
        CodingMode::BitPacked
    }
}

impl CodingMode {
    /// `true` for the two modes whose primitives are whole-byte aligned.
    pub fn is_byte_aligned(self) -> bool {
        !matches!(self, CodingMode::BitPacked)
    }

    /// `true` for the two modes that require an external DEFLATE pass.
    pub fn needs_deflate(self) -> bool {
        matches!(self, CodingMode::PreCompression | CodingMode::Compression)
    }
}

/// External collaborator for the two compression coding modes (§4 Non-goals:
/// DEFLATE itself is out of scope for this crate).
pub trait Deflate {
    /// Compress `block` in place, returning the compressed bytes.
    fn deflate(&mut self, block: &[u8]) -> std::io::Result<Vec<u8>>;
    /// Decompress `block`, returning the original bytes.
    fn inflate(&mut self, block: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Fidelity bitset (§6). Each flag preserves one infoset feature that is
/// otherwise dropped in the default, maximally-compact encoding.
///
/// `STRICT` is mutually exclusive with every other flag except
/// `LEXICAL_VALUES`; [`FidelityOptions::validate`] enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FidelityOptions {
    pub preserve_comments: bool,
    pub preserve_pis: bool,
    pub preserve_dtds: bool,
    pub preserve_prefixes: bool,
    pub preserve_lexical_values: bool,
    pub self_contained: bool,
    pub strict: bool,
}

impl FidelityOptions {
    /// The all-default, maximally compact fidelity setting.
    pub const fn default_options() -> Self {
        Self {
            preserve_comments: false,
            preserve_pis: false,
            preserve_dtds: false,
            preserve_prefixes: false,
            preserve_lexical_values: false,
            self_contained: false,
            strict: false,
        }
    }

    /// Checks the mutual-exclusion rule between `strict` and every flag
    /// other than `preserve_lexical_values`.
    pub fn validate(&self) -> bool {
        if !self.strict {
            return true;
        }
        !(self.preserve_comments
            || self.preserve_pis
            || self.preserve_dtds
            || self.preserve_prefixes
            || self.self_contained)
    }

    /// `true` if any fidelity-preserving flag beyond the default set is on
    /// (used to pick the 2nd-level event set in the grammar engine, §4.3).
    pub fn any_preserved(&self) -> bool {
        self.preserve_comments
            || self.preserve_pis
            || self.preserve_dtds
            || self.preserve_prefixes
            || self.self_contained
    }
}

/// EXI profile grammar-learning limits (§4.3 "Grammar-learning limits").
///
/// `None` means unbounded for either knob, matching the `0` encodes-as-
/// unbounded convention from §9's p-value note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfileParameters {
    pub max_built_in_element_grammars: Option<u32>,
    pub max_built_in_productions: Option<u32>,
}

impl ProfileParameters {
    /// No grammar-learning limits: ordinary built-in grammar behavior.
    pub const fn unbounded() -> Self {
        Self {
            max_built_in_element_grammars: None,
            max_built_in_productions: None,
        }
    }
}

/// The full set of options a caller derives from an (externally parsed)
/// EXI options document (§6), plus the pieces that configure the string
/// tables and type coder.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodingOptions {
    pub coding_mode: CodingMode,
    pub fidelity: FidelityOptions,
    pub fragment: bool,
    pub schema_id: Option<String>,
    pub value_max_length: Option<u32>,
    pub value_partition_capacity: Option<u32>,
    pub block_size: u32,
    pub profile: ProfileParameters,
}

impl EncodingOptions {
    /// EXI's documented default `blockSize` when none is configured (§6).
    pub const DEFAULT_BLOCK_SIZE: u32 = 1_000_000;

    /// Schemaless, bit-packed, all-default fidelity: the configuration used
    /// by scenario 1 in §8.
    pub fn schemaless_defaults() -> Self {
        Self {
            coding_mode: CodingMode::BitPacked,
            fidelity: FidelityOptions::default_options(),
            fragment: false,
            schema_id: None,
            value_max_length: None,
            value_partition_capacity: None,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            profile: ProfileParameters::unbounded(),
        }
    }
}

/// Chained builder for [`EncodingOptions`]: every setter consumes and
/// returns `Self`.
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    inner: EncodingOptions,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionsBuilder {
    /// Starts from [`EncodingOptions::schemaless_defaults`].
    pub fn new() -> Self {
        Self {
            inner: EncodingOptions::schemaless_defaults(),
        }
    }

    pub fn coding_mode(mut self, mode: CodingMode) -> Self {
        self.inner.coding_mode = mode;
        self
    }

    pub fn preserve_comments(mut self, val: bool) -> Self {
        self.inner.fidelity.preserve_comments = val;
        self
    }

    pub fn preserve_pis(mut self, val: bool) -> Self {
        self.inner.fidelity.preserve_pis = val;
        self
    }

    pub fn preserve_dtds(mut self, val: bool) -> Self {
        self.inner.fidelity.preserve_dtds = val;
        self
    }

    pub fn preserve_prefixes(mut self, val: bool) -> Self {
        self.inner.fidelity.preserve_prefixes = val;
        self
    }

    pub fn preserve_lexical_values(mut self, val: bool) -> Self {
        self.inner.fidelity.preserve_lexical_values = val;
        self
    }

    pub fn self_contained(mut self, val: bool) -> Self {
        self.inner.fidelity.self_contained = val;
        self
    }

    pub fn strict(mut self, val: bool) -> Self {
        self.inner.fidelity.strict = val;
        self
    }

    pub fn fragment(mut self, val: bool) -> Self {
        self.inner.fragment = val;
        self
    }

    pub fn schema_id(mut self, id: impl Into<String>) -> Self {
        self.inner.schema_id = Some(id.into());
        self
    }

    pub fn value_max_length(mut self, len: u32) -> Self {
        self.inner.value_max_length = Some(len);
        self
    }

    pub fn value_partition_capacity(mut self, cap: u32) -> Self {
        self.inner.value_partition_capacity = Some(cap);
        self
    }

    pub fn block_size(mut self, size: u32) -> Self {
        self.inner.block_size = size;
        self
    }

    pub fn profile(mut self, profile: ProfileParameters) -> Self {
        self.inner.profile = profile;
        self
    }

    /// Builds the final [`EncodingOptions`], validating the `STRICT`
    /// mutual-exclusion rule.
    pub fn build(self) -> Result<EncodingOptions, &'static str> {
        if !self.inner.fidelity.validate() {
            return Err("STRICT fidelity is mutually exclusive with every flag except LEXICAL_VALUES");
        }
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_rejects_other_flags() {
        let result = OptionsBuilder::new().strict(true).preserve_comments(true).build();
        assert!(result.is_err());
    }

    #[test]
    fn strict_allows_lexical_values() {
        let result = OptionsBuilder::new()
            .strict(true)
            .preserve_lexical_values(true)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn default_options_round_trip_builder() {
        let opts = OptionsBuilder::new().build().unwrap();
        assert_eq!(opts.coding_mode, CodingMode::BitPacked);
        assert_eq!(opts.block_size, EncodingOptions::DEFAULT_BLOCK_SIZE);
    }
}
