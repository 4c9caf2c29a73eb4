//! # Expression Reduction
//!
//! Turns a flattened infix string into a sequence of [`Symbol`]s and collapses it one
//! wave at a time. Every wave replaces each currently-eligible `operand operator operand`
//! triple with a calculation placeholder; once the placeholders carry results the sequence is
//! re-rendered to text and tokenized again, until a single literal remains.
//!
//! Precedence is structural: a multiplicative operator is only reduced when the operator
//! before it is additive (or absent), and an additive operator only when neither neighbour is
//! multiplicative. A `-` in front of an additive calculation flips that calculation's operator,
//! so `a-b-c-d` reduces as `(a-b) - (c+d)`.

pub mod reducer;
pub mod symbol;
pub mod tokenizer;

pub use reducer::ExpressionReducer;
pub use symbol::{Operator, Symbol, SymbolKind};
pub use tokenizer::{tokenize, Tokenized};

use thiserror::Error;

/// Errors raised while tokenizing or reducing an expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReductionError {
    #[error("malformed expression '{expression}': {reason}")]
    Malformed { expression: String, reason: String },
    #[error("reduction made no progress on '{expression}'")]
    Stalled { expression: String },
    #[error("wave over '{expression}' is still waiting on {pending} calculation(s)")]
    IncompleteWave { expression: String, pending: usize },
    #[error("a wave is already in flight over '{expression}'")]
    WaveInProgress { expression: String },
    #[error("no pending calculation with id {id}")]
    UnknownSymbol { id: usize },
}

/// Numeric value of a literal, accepting the parenthesized signed form `(-5)`
pub fn parse_literal(text: &str) -> Option<f64> {
    let trimmed = text.trim_start_matches('(').trim_end_matches(')');
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Text form of a computed value: shortest round-trip decimal, never exponent notation
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        // collapses -0 as well
        return "0".to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_parse_with_and_without_sign_parens() {
        assert_eq!(parse_literal("12.5"), Some(12.5));
        assert_eq!(parse_literal("(-3)"), Some(-3.0));
        assert_eq!(parse_literal("-3"), Some(-3.0));
        assert_eq!(parse_literal("()"), None);
        assert_eq!(parse_literal("abc"), None);
    }

    #[test]
    fn values_format_without_exponent() {
        assert_eq!(format_value(10.0), "10");
        assert_eq!(format_value(-0.0), "0");
        assert_eq!(format_value(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_value(1e21), "1000000000000000000000");
        assert_eq!(format_value(-2.5), "-2.5");
    }
}
