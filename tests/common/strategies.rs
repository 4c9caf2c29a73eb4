//! Proptest strategies and a reference evaluator for arithmetic expressions.

use calcflow_core::expression::{format_value, parse_literal, ExpressionReducer};
use proptest::prelude::*;

/// Unsigned decimal text: an integer part with an optional one to three digit fraction
fn magnitude_strategy(integers: std::ops::RangeInclusive<u32>) -> impl Strategy<Value = String> {
    (integers, prop::option::of(prop::string::string_regex("[0-9]{1,3}").unwrap()))
        .prop_map(|(int, fraction)| match fraction {
            Some(fraction) => format!("{int}.{fraction}"),
            None => int.to_string(),
        })
}

fn is_zero(literal: &str) -> bool {
    literal.chars().all(|c| c == '0' || c == '.')
}

fn signed(negative: bool, magnitude: String) -> String {
    if negative && !is_zero(&magnitude) {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}

/// One generated term: an optionally negative integer or decimal literal
fn literal_strategy() -> impl Strategy<Value = String> {
    (any::<bool>(), magnitude_strategy(0..=999)).prop_map(|(negative, m)| signed(negative, m))
}

/// Divisors are never zero but may be fractions such as `0.05` or `2.5`
fn divisor_strategy() -> impl Strategy<Value = String> {
    let nonzero = prop_oneof![
        magnitude_strategy(1..=99),
        prop::string::string_regex("0\\.0{0,2}[1-9][0-9]{0,2}").unwrap(),
    ];
    (any::<bool>(), nonzero).prop_map(|(negative, m)| signed(negative, m))
}

/// Literals near the edges of the float range: long digit runs and tiny fractions
fn extreme_literal_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        literal_strategy(),
        (1usize..=320).prop_map(|digits| format!("9{}", "9".repeat(digits - 1))),
        (1usize..=320).prop_map(|digits| format!("1{}", "0".repeat(digits))),
        (0usize..=400).prop_map(|zeros| format!("0.{}1", "0".repeat(zeros))),
    ]
}

/// A flat expression of up to eight operators
pub fn expression_strategy() -> impl Strategy<Value = String> {
    let step = prop_oneof![
        literal_strategy().prop_map(|lit| format!("+{lit}")),
        literal_strategy().prop_map(|lit| format!("-{lit}")),
        literal_strategy().prop_map(|lit| format!("*{lit}")),
        divisor_strategy().prop_map(|lit| format!("/{lit}")),
    ];
    (literal_strategy(), prop::collection::vec(step, 0..8))
        .prop_map(|(head, tail)| std::iter::once(head).chain(tail).collect())
}

/// Like [`expression_strategy`] but with literals that may overflow or underflow
pub fn extreme_expression_strategy() -> impl Strategy<Value = String> {
    let step = (
        prop_oneof![Just('+'), Just('-'), Just('*'), Just('/')],
        extreme_literal_strategy(),
    )
        .prop_map(|(op, lit)| format!("{op}{lit}"));
    (extreme_literal_strategy(), prop::collection::vec(step, 0..4))
        .prop_map(|(head, tail)| std::iter::once(head).chain(tail).collect())
}

/// Standard precedence evaluation: products first, then sums, both left to right.
///
/// Also returns the summed magnitude of the additive terms, which bounds the rounding error
/// of any other association order.
pub fn reference_eval(expression: &str) -> (f64, f64) {
    let bytes: Vec<char> = expression.chars().collect();
    let mut terms: Vec<f64> = Vec::new();
    let mut additive: Vec<char> = Vec::new();
    let mut index = 0;

    let read_number = |index: &mut usize| -> f64 {
        let start = *index;
        if bytes[*index] == '-' {
            *index += 1;
        }
        while *index < bytes.len() && (bytes[*index].is_ascii_digit() || bytes[*index] == '.') {
            *index += 1;
        }
        bytes[start..*index]
            .iter()
            .collect::<String>()
            .parse()
            .expect("literal")
    };

    let mut term = read_number(&mut index);
    while index < bytes.len() {
        let op = bytes[index];
        index += 1;
        let value = read_number(&mut index);
        match op {
            '*' => term *= value,
            '/' => term /= value,
            '+' | '-' => {
                terms.push(term);
                additive.push(op);
                term = value;
            }
            other => panic!("unexpected operator {other}"),
        }
    }
    terms.push(term);

    let mut total = terms[0];
    for (op, value) in additive.iter().zip(&terms[1..]) {
        if *op == '+' {
            total += value;
        } else {
            total -= value;
        }
    }
    let scale = terms.iter().map(|term| term.abs()).sum();
    (total, scale)
}

/// Reduce to completion with inline evaluation, returning the result and each inter-wave snapshot
pub fn reduce_with_snapshots(expression: &str) -> (String, Vec<String>) {
    let mut reducer = ExpressionReducer::new(expression).expect("tokenizes");
    let mut snapshots = Vec::new();
    while !reducer.is_done() {
        reducer.reduce_wave().expect("wave makes progress");
        let work: Vec<(usize, f64)> = reducer
            .calculations()
            .map(|symbol| {
                let op = symbol.op.expect("calculation operator");
                let (left, right) = symbol.operands.clone().expect("calculation operands");
                let value = op.apply(
                    parse_literal(&left).expect("left operand"),
                    parse_literal(&right).expect("right operand"),
                );
                (symbol.id, value)
            })
            .collect();
        for (id, value) in work {
            reducer.apply_result(id, format_value(value)).expect("pending calculation");
        }
        reducer.advance().expect("wave complete");
        snapshots.push(reducer.render());
    }
    (
        reducer.result().expect("done reducer has a result").to_string(),
        snapshots,
    )
}

pub fn approx_eq(actual: f64, expected: f64, scale: f64) -> bool {
    (actual - expected).abs() <= 1e-9 * scale.max(1.0)
}
