//! Scenario 6 (spec.md §8), as actually implemented (see DESIGN.md's Open
//! Question decisions: `DisableWithXsiType` is folded into the ghost-
//! production path absent a schema-informed element-fragment grammar to
//! fall back to). With `maxBuiltInProductions` exhausted, the body coder
//! stops learning new productions on that grammar — every further
//! occurrence of an undeclared event costs the same, rather than the
//! second-occurrence discount `tests/scenarios.rs` demonstrates when
//! learning is unbounded.

use pretty_assertions::assert_eq;

use exi_core::body::BodyEncoder;
use exi_core::grammar::pool::GrammarPool;
use exi_core::options::{CodingMode, OptionsBuilder, ProfileParameters};

#[test]
fn exhausted_production_limit_disables_further_learning() {
    let pool = GrammarPool::built_in();
    let options = OptionsBuilder::new()
        .coding_mode(CodingMode::BytePacked)
        .profile(ProfileParameters { max_built_in_element_grammars: None, max_built_in_productions: Some(0) })
        .build()
        .unwrap();

    let bytes_for = |child_count: usize| -> usize {
        let mut encoder = BodyEncoder::new(Vec::new(), pool.clone(), options.clone());
        encoder.encode_start_document().unwrap();
        encoder.encode_start_element("", "r", None).unwrap();
        for _ in 0..child_count {
            encoder.encode_start_element("", "x", None).unwrap();
            encoder.encode_end_element().unwrap();
        }
        encoder.encode_end_element().unwrap();
        encoder.encode_end_document().unwrap();
        encoder.finish().unwrap().len()
    };

    let zero = bytes_for(0);
    let one = bytes_for(1);
    let two = bytes_for(2);

    let first_child_cost = one - zero;
    let second_child_cost = two - one;
    assert_eq!(
        first_child_cost, second_child_cost,
        "maxBuiltInProductions=0 should keep every occurrence of x undeclared, so neither ever gets cheaper"
    );
}
