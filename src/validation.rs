//! Input validation for submitted expressions
//!
//! An expression is accepted only if it is a flat chain of decimal literals joined by the
//! four binary operators, optionally starting with a sign, and never divides by a literal zero.
//!
//! Every literal must also be representable as a finite `f64`, and no intermediate value the
//! reduction can produce may leave the finite range. Multiplicative chains reduce strictly left
//! to right and divisors are always submitted literals, so replaying each term's running
//! product yields exactly the values workers will compute. Additive regrouping never exceeds
//! the summed magnitude of the terms.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CalcflowError, Result};
use crate::expression::parse_literal;

static EDGE_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[*/+]|[*/+\-]$").expect("edge operator pattern is valid"));

static DIVISION_BY_ZERO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/-?0+(\.0+)?([+\-*/]|$)").expect("division pattern is valid")
});

static GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(\.\d+)?([+\-*/]-?\d+(\.\d+)?)*$").expect("grammar pattern is valid")
});

static HEAD_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?").expect("head literal pattern is valid"));

static OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+\-*/])(-?\d+(?:\.\d+)?)").expect("operation pattern is valid")
});

/// Largest summed term magnitude; keeps every additive regrouping finite
const MAX_TERM_MAGNITUDE: f64 = f64::MAX / 2.0;

/// Strip every whitespace character from a submission
pub fn normalize_expression(expression: &str) -> String {
    expression.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Validate a whitespace-stripped expression
pub fn validate_expression(expression: &str) -> Result<()> {
    if expression.is_empty() {
        return Err(invalid("expression is empty"));
    }
    if EDGE_OPERATOR.is_match(expression) {
        return Err(invalid("expression starts or ends with an operator"));
    }
    if DIVISION_BY_ZERO.is_match(expression) {
        return Err(invalid("division by zero"));
    }
    if !GRAMMAR.is_match(expression) {
        return Err(invalid("only numbers and + - * / are allowed"));
    }
    check_range(expression)
}

/// Replay the running products and quotients of every additive term in `f64`
fn check_range(expression: &str) -> Result<()> {
    let head = HEAD_LITERAL
        .find(expression)
        .ok_or_else(|| invalid("only numbers and + - * / are allowed"))?;
    let mut term = literal_value(head.as_str())?;
    let mut magnitude = 0.0_f64;

    for operation in OPERATION.captures_iter(&expression[head.end()..]) {
        let value = literal_value(&operation[2])?;
        match &operation[1] {
            "*" => term *= value,
            "/" => {
                if value == 0.0 {
                    return Err(invalid("division by zero"));
                }
                term /= value;
            }
            _ => {
                magnitude += term.abs();
                term = value;
            }
        }
        if !term.is_finite() {
            return Err(invalid("intermediate result is out of range"));
        }
    }

    magnitude += term.abs();
    if magnitude > MAX_TERM_MAGNITUDE {
        return Err(invalid("intermediate result is out of range"));
    }
    Ok(())
}

fn literal_value(literal: &str) -> Result<f64> {
    parse_literal(literal).ok_or_else(|| invalid(&format!("number {literal} is out of range")))
}

/// Validate a stored `last_step` snapshot before resuming it.
///
/// Snapshots write sign-folded literals as `(-n)`; dropping the parentheses gives the
/// equivalent flat expression.
pub fn validate_snapshot(snapshot: &str) -> Result<()> {
    let flat: String = snapshot.chars().filter(|c| !matches!(c, '(' | ')')).collect();
    validate_expression(&flat)
}

pub fn is_valid_expression(expression: &str) -> bool {
    validate_expression(&normalize_expression(expression)).is_ok()
}

fn invalid(reason: &str) -> CalcflowError {
    CalcflowError::Validation(format!("invalid expression: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_arithmetic() {
        for expression in ["5+5", "2*3+4", "-5+3", "1.5/0.5", "10-2-3", "4*-2", "3--1", "42"] {
            assert!(is_valid_expression(expression), "{expression} should be valid");
        }
    }

    #[test]
    fn rejects_division_by_literal_zero() {
        for expression in ["1/0", "1/0.0", "1/-0", "2+1/0*3", "5/00", "5/-000.00+1"] {
            let err = validate_expression(expression).unwrap_err();
            assert_eq!(
                err,
                CalcflowError::Validation("invalid expression: division by zero".into()),
                "{expression}"
            );
        }
    }

    #[test]
    fn allows_divisors_that_merely_contain_zero() {
        for expression in ["1/0.5", "1/10", "1/0.05", "1/-0.01"] {
            assert!(is_valid_expression(expression), "{expression} should be valid");
        }
    }

    #[test]
    fn rejects_leading_and_trailing_operators() {
        for expression in ["+1", "*2", "/3", "1+", "1-", "1*", "1/"] {
            assert!(!is_valid_expression(expression), "{expression} should be invalid");
        }
    }

    #[test]
    fn rejects_non_arithmetic_characters() {
        for expression in ["2^3", "(1+2)*3", "abc", "1e5+1", "1..2", "1.+2", "", "1++2", "1**2"] {
            assert!(!is_valid_expression(expression), "{expression} should be invalid");
        }
    }

    #[test]
    fn rejects_literals_outside_the_float_range() {
        let huge = format!("1{}+1", "0".repeat(400));
        let err = validate_expression(&huge).unwrap_err();
        assert!(matches!(err, CalcflowError::Validation(ref m) if m.contains("out of range")), "{err}");
        assert!(is_valid_expression(&format!("1{}+1", "0".repeat(300))));
    }

    #[test]
    fn rejects_divisors_that_underflow_to_zero() {
        let tiny = format!("1/0.{}1", "0".repeat(400));
        assert_eq!(
            validate_expression(&tiny).unwrap_err(),
            CalcflowError::Validation("invalid expression: division by zero".into())
        );
        assert!(is_valid_expression(&format!("1/0.{}1", "0".repeat(20))));
    }

    #[test]
    fn rejects_products_and_sums_that_overflow() {
        let nines = "9".repeat(200);
        for expression in [
            format!("{nines}*{nines}"),
            format!("2-{nines}/0.{}1*{nines}", "0".repeat(150)),
            format!("1{}+1{}", "0".repeat(308), "0".repeat(308)),
        ] {
            let err = validate_expression(&expression).unwrap_err();
            assert!(matches!(err, CalcflowError::Validation(_)), "{err}");
        }
        assert!(is_valid_expression(&format!("{nines}*2+{nines}")));
    }

    #[test]
    fn snapshots_with_sign_folded_literals_validate() {
        assert!(validate_snapshot("(-5)*3+4-(-2.5)").is_ok());
        assert!(validate_snapshot("4/0").is_err());
        let nines = "9".repeat(200);
        assert!(validate_snapshot(&format!("(-{nines})*{nines}")).is_err());
    }

    #[test]
    fn whitespace_is_stripped_before_validation() {
        assert_eq!(normalize_expression(" 2 *\t3 + 4\n"), "2*3+4");
        assert!(is_valid_expression(" 2 * 3 "));
    }
}
