//! EXI profile grammar-learning limits (§4.3 "Grammar-learning limits", §9
//! p-value encoding note, §3 Supplemented features): the decimal-encoding
//! functions for [`crate::options::ProfileParameters`] and the decision
//! logic the body coder consults when a learning limit is reached.

use crate::channel::DecimalValue;
use crate::options::ProfileParameters;

/// What the body coder should do when a learning limit is about to be
/// exceeded (§4.3 "Grammar-learning limits").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningLimitAction {
    /// No limit configured, or the limit has not been reached: learn normally.
    AllowLearning,
    /// Insert `AT(xsi:type)=xsd:anyType` and switch to the fixed
    /// schema-informed element-fragment grammar, preferred right after an
    /// `SE` or `NS` event.
    DisableWithXsiType,
    /// Keep appending productions but mark the grammar `stopLearning`; the
    /// extra productions become ghosts (decode-only, invisible to encode
    /// matching).
    GhostProduction,
}

/// Decides how to handle learning a new production on a built-in grammar
/// that already has `current_productions` productions and belongs to an
/// element-grammar population of `current_element_grammars` grammars, under
/// `params` (§4.3).
///
/// `right_after_se_or_ns` picks the xsi:type path (preferred by the profile)
/// over the ghost-production path when both become available at once.
pub fn learning_limit_action(
    params: ProfileParameters,
    current_element_grammars: u32,
    current_productions: u32,
    right_after_se_or_ns: bool,
) -> LearningLimitAction {
    let grammars_exceeded = params
        .max_built_in_element_grammars
        .map_or(false, |max| current_element_grammars >= max);
    let productions_exceeded = params
        .max_built_in_productions
        .map_or(false, |max| current_productions >= max);

    if !grammars_exceeded && !productions_exceeded {
        return LearningLimitAction::AllowLearning;
    }
    if right_after_se_or_ns {
        LearningLimitAction::DisableWithXsiType
    } else {
        LearningLimitAction::GhostProduction
    }
}

/// Encodes `params` as the options-document `p` decimal value (§9): the
/// integral part is `maxBuiltInElementGrammars + 1` (`0` meaning unbounded),
/// and the fractional part is `maxBuiltInProductions + 1` written with its
/// digits reversed (least significant digit first). Preserved exactly as
/// the source does it, despite looking backwards, since the options
/// document reader/writer this value round-trips against is an external
/// collaborator out of scope for this crate (§1 Non-goals) and must still
/// agree bit-for-bit with whatever produced/consumes it.
pub fn encode_profile_parameter(params: ProfileParameters) -> DecimalValue {
    let integral = match params.max_built_in_element_grammars {
        Some(n) => n as u64 + 1,
        None => 0,
    };
    let productions_plus_one = match params.max_built_in_productions {
        Some(n) => n as u64 + 1,
        None => 0,
    };
    DecimalValue {
        negative: false,
        integral,
        fractional_digits: reversed_digits(productions_plus_one),
    }
}

/// Decodes a `p` decimal value back into [`ProfileParameters`], the inverse
/// of [`encode_profile_parameter`].
pub fn decode_profile_parameter(value: &DecimalValue) -> ProfileParameters {
    let max_built_in_element_grammars = if value.integral == 0 { None } else { Some((value.integral - 1) as u32) };
    let productions_plus_one = digits_to_value(&value.fractional_digits);
    let max_built_in_productions = if productions_plus_one == 0 { None } else { Some((productions_plus_one - 1) as u32) };
    ProfileParameters { max_built_in_element_grammars, max_built_in_productions }
}

/// Decomposes `n` into decimal digits, least significant first (so the
/// digit sequence, read left to right, is `n` written backwards).
fn reversed_digits(mut n: u64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push((n % 10) as u8);
        n /= 10;
    }
    digits
}

/// Inverse of [`reversed_digits`]: reconstructs the value from a
/// least-significant-first digit sequence.
fn digits_to_value(digits: &[u8]) -> u64 {
    let mut value = 0u64;
    let mut place = 1u64;
    for &digit in digits {
        value += digit as u64 * place;
        place *= 10;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_round_trips_as_zero() {
        let params = ProfileParameters::unbounded();
        let encoded = encode_profile_parameter(params);
        assert_eq!(encoded.integral, 0);
        assert!(encoded.fractional_digits.is_empty());
        assert_eq!(decode_profile_parameter(&encoded), params);
    }

    #[test]
    fn bounded_round_trips_with_reversed_fractional_digits() {
        let params = ProfileParameters {
            max_built_in_element_grammars: Some(5),
            max_built_in_productions: Some(123),
        };
        let encoded = encode_profile_parameter(params);
        assert_eq!(encoded.integral, 6);
        // 124 reversed is 421 -> digits [4, 2, 1] least-significant-first.
        assert_eq!(encoded.fractional_digits, vec![4, 2, 1]);
        assert_eq!(decode_profile_parameter(&encoded), params);
    }

    #[test]
    fn zero_productions_limit_is_distinguishable_from_unbounded() {
        let params = ProfileParameters { max_built_in_element_grammars: None, max_built_in_productions: Some(0) };
        let encoded = encode_profile_parameter(params);
        assert_eq!(encoded.fractional_digits, vec![1]);
        assert_eq!(decode_profile_parameter(&encoded), params);
    }

    #[test]
    fn exceeded_limit_right_after_se_prefers_xsi_type_disabling() {
        let params = ProfileParameters { max_built_in_element_grammars: None, max_built_in_productions: Some(0) };
        let action = learning_limit_action(params, 1, 1, true);
        assert_eq!(action, LearningLimitAction::DisableWithXsiType);
    }

    #[test]
    fn exceeded_limit_elsewhere_falls_back_to_ghost_production() {
        let params = ProfileParameters { max_built_in_element_grammars: None, max_built_in_productions: Some(0) };
        let action = learning_limit_action(params, 1, 1, false);
        assert_eq!(action, LearningLimitAction::GhostProduction);
    }

    #[test]
    fn within_limits_allows_learning() {
        let params = ProfileParameters { max_built_in_element_grammars: Some(10), max_built_in_productions: Some(10) };
        assert_eq!(learning_limit_action(params, 1, 1, false), LearningLimitAction::AllowLearning);
    }
}
