//! Splits flattened infix text into an alternating `number operator number ...` sequence.

use super::symbol::{Operator, Symbol};
use super::{parse_literal, ReductionError};

/// Output of [`tokenize`]
#[derive(Debug, Clone, PartialEq)]
pub struct Tokenized {
    pub symbols: Vec<Symbol>,
    /// False when the sequence is a single literal, i.e. there is nothing left to reduce
    pub needs_reduction: bool,
}

/// Tokenize `expression` into symbols.
///
/// A `-` at the very start, or one following anything but a digit or `)` and followed by a
/// digit, is a sign: it folds into the next literal as `(-…)`. Parentheses only ever appear
/// around such signed literals; a literal opened with `(` is closed automatically.
pub fn tokenize(expression: &str) -> Result<Tokenized, ReductionError> {
    let chars: Vec<char> = expression.chars().filter(|c| !c.is_whitespace()).collect();
    let malformed = |reason: String| ReductionError::Malformed {
        expression: expression.to_string(),
        reason,
    };

    let mut symbols: Vec<Symbol> = Vec::new();
    let mut pending = String::new();

    for (index, &c) in chars.iter().enumerate() {
        if c == '-' && is_sign(&chars, index) {
            pending.push_str("(-");
            continue;
        }
        if let Some(operator) = Operator::from_char(c) {
            flush_literal(&mut symbols, &mut pending);
            symbols.push(Symbol::operator(symbols.len(), operator));
            continue;
        }
        match c {
            '(' => {}
            ')' | '.' => pending.push(c),
            digit if digit.is_ascii_digit() => pending.push(digit),
            other => return Err(malformed(format!("unexpected character '{other}'"))),
        }
    }
    flush_literal(&mut symbols, &mut pending);

    check_shape(&symbols).map_err(malformed)?;

    let needs_reduction = symbols.len() > 1;
    Ok(Tokenized {
        symbols,
        needs_reduction,
    })
}

fn is_sign(chars: &[char], index: usize) -> bool {
    if index == 0 {
        return true;
    }
    let prev = chars[index - 1];
    let next_is_digit = chars
        .get(index + 1)
        .is_some_and(|next| next.is_ascii_digit() || *next == '.');
    next_is_digit && !prev.is_ascii_digit() && prev != ')'
}

fn flush_literal(symbols: &mut Vec<Symbol>, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    let mut literal = std::mem::take(pending);
    if literal.starts_with('(') && !literal.ends_with(')') {
        literal.push(')');
    }
    symbols.push(Symbol::number(symbols.len(), literal));
}

/// Symbols must alternate number/operator, starting and ending with a number
fn check_shape(symbols: &[Symbol]) -> Result<(), String> {
    if symbols.is_empty() {
        return Err("expression is empty".to_string());
    }
    for (index, symbol) in symbols.iter().enumerate() {
        let expect_number = index % 2 == 0;
        if expect_number != symbol.is_number() {
            return Err(format!(
                "'{}' at position {index} breaks operand/operator alternation",
                symbol.value
            ));
        }
        if symbol.is_number() && parse_literal(&symbol.value).is_none() {
            return Err(format!("'{}' is not a number", symbol.value));
        }
    }
    if symbols.len() % 2 == 0 {
        return Err("expression ends with an operator".to_string());
    }
    Ok(())
}
