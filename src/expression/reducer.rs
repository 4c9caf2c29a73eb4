//! Wave-by-wave reduction of one expression.

use super::symbol::{Operator, Symbol};
use super::tokenizer::tokenize;
use super::ReductionError;

/// Owns the symbol sequence of a single expression while it is being reduced.
///
/// Each wave is an arena-style rebuild: [`reduce_wave`](Self::reduce_wave) produces a fresh,
/// contiguously numbered sequence in which every eligible triple became one calculation.
/// Results are attached with [`apply_result`](Self::apply_result), and
/// [`advance`](Self::advance) renders the sequence back to text and tokenizes it for the
/// next wave.
#[derive(Debug, Clone)]
pub struct ExpressionReducer {
    symbols: Vec<Symbol>,
    done: bool,
    result: Option<String>,
}

impl ExpressionReducer {
    pub fn new(expression: &str) -> Result<Self, ReductionError> {
        let mut reducer = Self {
            symbols: Vec::new(),
            done: false,
            result: None,
        };
        reducer.update(expression)?;
        Ok(reducer)
    }

    /// Replace the current sequence with a fresh tokenization of `expression`
    pub fn update(&mut self, expression: &str) -> Result<(), ReductionError> {
        let tokenized = tokenize(expression)?;
        if !tokenized.needs_reduction {
            self.done = true;
            self.result = tokenized
                .symbols
                .first()
                .map(|s| s.value.trim_start_matches('(').trim_end_matches(')').to_string());
        }
        self.symbols = tokenized.symbols;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Final scalar without sign parentheses, only set once the reducer is done
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Calculations produced by the current wave
    pub fn calculations(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_calculation())
    }

    /// Calculations of the current wave that have no result yet
    pub fn pending_count(&self) -> usize {
        self.calculations().filter(|s| s.result.is_none()).count()
    }

    /// Render the sequence back to infix text, substituting results where present
    pub fn render(&self) -> String {
        self.symbols.iter().map(Symbol::rendered).collect()
    }

    /// Collapse every currently eligible triple into a calculation and return how many
    /// calculations the wave produced.
    ///
    /// Returns `Ok(0)` only when the reducer is already done; any other wave that makes no
    /// progress is reported as [`ReductionError::Stalled`].
    pub fn reduce_wave(&mut self) -> Result<usize, ReductionError> {
        if self.done {
            return Ok(0);
        }
        if self.symbols.iter().any(Symbol::is_calculation) {
            return Err(ReductionError::WaveInProgress {
                expression: self.render(),
            });
        }

        let source = &self.symbols;
        let mut next: Vec<Symbol> = Vec::with_capacity(source.len());
        let mut produced = 0;
        let mut index = 0;

        while index < source.len() {
            let symbol = &source[index];
            if symbol.is_number() && index + 2 < source.len() && self.is_eligible(index + 1) {
                let operator = self.operator_at(index + 1)?;
                let right = &source[index + 2];
                let effective = if !operator.is_priority()
                    && self.previous_operator(index + 1) == Some(Operator::Minus)
                {
                    operator.inverted()
                } else {
                    operator
                };
                next.push(Symbol::calculation(
                    next.len(),
                    format!("{}{}{}", symbol.value, operator.symbol(), right.value),
                    effective,
                    symbol.value.clone(),
                    right.value.clone(),
                ));
                produced += 1;
                index += 3;

                // the operator right after a consumed triple lost its left operand this wave
                if let Some(following) = source.get(index) {
                    next.push(following.renumbered(next.len()));
                    index += 1;
                }
                continue;
            }
            next.push(symbol.renumbered(next.len()));
            index += 1;
        }

        if produced == 0 {
            return Err(ReductionError::Stalled {
                expression: self.render(),
            });
        }
        self.symbols = next;
        Ok(produced)
    }

    /// Attach a worker's result to the calculation with `id`
    pub fn apply_result(&mut self, id: usize, result: impl Into<String>) -> Result<(), ReductionError> {
        let symbol = self
            .symbols
            .iter_mut()
            .find(|s| s.id == id && s.is_calculation() && s.result.is_none())
            .ok_or(ReductionError::UnknownSymbol { id })?;
        symbol.result = Some(result.into());
        Ok(())
    }

    /// Fold the completed wave back into text and tokenize it for the next wave
    pub fn advance(&mut self) -> Result<(), ReductionError> {
        let pending = self.pending_count();
        if pending > 0 {
            return Err(ReductionError::IncompleteWave {
                expression: self.render(),
                pending,
            });
        }
        let rendered = self.render();
        self.update(&rendered)
    }

    fn operator_at(&self, index: usize) -> Result<Operator, ReductionError> {
        self.symbols
            .get(index)
            .and_then(Symbol::operator_kind)
            .ok_or_else(|| ReductionError::Malformed {
                expression: self.render(),
                reason: format!("expected an operator at position {index}"),
            })
    }

    fn previous_operator(&self, index: usize) -> Option<Operator> {
        index
            .checked_sub(2)
            .and_then(|prev| self.symbols.get(prev))
            .and_then(Symbol::operator_kind)
    }

    fn following_operator(&self, index: usize) -> Option<Operator> {
        self.symbols.get(index + 2).and_then(Symbol::operator_kind)
    }

    fn is_eligible(&self, index: usize) -> bool {
        let Some(operator) = self.symbols.get(index).and_then(Symbol::operator_kind) else {
            return false;
        };
        let prev_is_priority = self
            .previous_operator(index)
            .is_some_and(|op| op.is_priority());
        if operator.is_priority() {
            return !prev_is_priority;
        }
        let next_is_priority = self
            .following_operator(index)
            .is_some_and(|op| op.is_priority());
        !prev_is_priority && !next_is_priority
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::expression::{format_value, parse_literal};

    /// Drive a reducer to completion, evaluating calculations inline.
    /// Returns the final result and the snapshot rendered after each wave.
    pub(crate) fn reduce_fully(expression: &str) -> (String, Vec<String>) {
        let mut reducer = ExpressionReducer::new(expression).unwrap();
        let mut snapshots = Vec::new();
        while !reducer.is_done() {
            reducer.reduce_wave().unwrap();
            let work: Vec<(usize, Operator, (String, String))> = reducer
                .calculations()
                .map(|s| (s.id, s.op.unwrap(), s.operands.clone().unwrap()))
                .collect();
            for (id, op, (left, right)) in work {
                let value = op.apply(parse_literal(&left).unwrap(), parse_literal(&right).unwrap());
                reducer.apply_result(id, format_value(value)).unwrap();
            }
            snapshots.push(reducer.render());
            reducer.advance().unwrap();
        }
        (reducer.result().unwrap().to_string(), snapshots)
    }

    fn calc_values(reducer: &ExpressionReducer) -> Vec<String> {
        reducer.calculations().map(|s| s.value.clone()).collect()
    }

    #[test]
    fn multiplication_reduces_before_addition() {
        let mut reducer = ExpressionReducer::new("2+3*4").unwrap();
        assert_eq!(reducer.reduce_wave().unwrap(), 1);
        assert_eq!(calc_values(&reducer), ["3*4"]);
        let (result, snapshots) = reduce_fully("2+3*4");
        assert_eq!(result, "14");
        assert_eq!(snapshots, ["2+12", "14"]);
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(reduce_fully("10-2-3").0, "5");
        assert_eq!(reduce_fully("10-2-3-1").0, "4");
    }

    #[test]
    fn division_is_left_associative() {
        assert_eq!(reduce_fully("8/2/2").0, "2");
        assert_eq!(reduce_fully("64/4/2/2").0, "4");
    }

    #[test]
    fn independent_products_share_a_wave() {
        let mut reducer = ExpressionReducer::new("2*3+4*5").unwrap();
        assert_eq!(reducer.reduce_wave().unwrap(), 2);
        assert_eq!(calc_values(&reducer), ["2*3", "4*5"]);
        assert_eq!(reduce_fully("2*3+4*5").0, "26");
    }

    #[test]
    fn chained_products_wait_for_their_left_neighbour() {
        let mut reducer = ExpressionReducer::new("1+2*3*4-5").unwrap();
        reducer.reduce_wave().unwrap();
        assert_eq!(calc_values(&reducer), ["2*3"]);
        assert_eq!(reduce_fully("1+2*3*4-5").0, "20");
    }

    #[test]
    fn double_negative_rewrites_the_right_calculation() {
        let mut reducer = ExpressionReducer::new("10-1-2-3").unwrap();
        reducer.reduce_wave().unwrap();
        let calcs: Vec<(String, Option<Operator>)> = reducer
            .calculations()
            .map(|s| (s.value.clone(), s.op))
            .collect();
        assert_eq!(
            calcs,
            [
                ("10-1".to_string(), Some(Operator::Minus)),
                ("2-3".to_string(), Some(Operator::Plus)),
            ]
        );
        // pending calculations keep their original text, so the snapshot is still valid
        assert_eq!(reducer.render(), "10-1-2-3");
        assert_eq!(reduce_fully("10-1-2-3").0, "4");
    }

    #[test]
    fn plus_after_minus_flips_to_minus() {
        assert_eq!(reduce_fully("10-1-2+3").0, "10");
        assert_eq!(reduce_fully("2*3-4+5").0, "7");
    }

    #[test]
    fn negative_intermediate_results_are_re_tokenized() {
        assert_eq!(reduce_fully("2-5*3").0, "-13");
        assert_eq!(reduce_fully("4-2*-3").0, "10");
        assert_eq!(reduce_fully("1-3-7*2").0, "-16");
    }

    #[test]
    fn signed_leading_literal() {
        assert_eq!(reduce_fully("-5+3").0, "-2");
        assert_eq!(ExpressionReducer::new("-7").unwrap().result(), Some("-7"));
        assert_eq!(reduce_fully("-2*-3").0, "6");
    }

    #[test]
    fn single_literal_is_done_immediately() {
        let mut reducer = ExpressionReducer::new("42").unwrap();
        assert!(reducer.is_done());
        assert_eq!(reducer.result(), Some("42"));
        assert_eq!(reducer.reduce_wave().unwrap(), 0);
    }

    #[test]
    fn second_wave_before_advance_is_rejected() {
        let mut reducer = ExpressionReducer::new("1+2").unwrap();
        reducer.reduce_wave().unwrap();
        assert!(matches!(
            reducer.reduce_wave(),
            Err(ReductionError::WaveInProgress { .. })
        ));
    }

    #[test]
    fn advance_requires_every_result() {
        let mut reducer = ExpressionReducer::new("1+2+3+4").unwrap();
        assert_eq!(reducer.reduce_wave().unwrap(), 2);
        reducer.apply_result(0, "3").unwrap();
        assert_eq!(
            reducer.advance(),
            Err(ReductionError::IncompleteWave {
                expression: "3+3+4".to_string(),
                pending: 1
            })
        );
    }

    #[test]
    fn results_attach_once_per_calculation() {
        let mut reducer = ExpressionReducer::new("1+2").unwrap();
        reducer.reduce_wave().unwrap();
        reducer.apply_result(0, "3").unwrap();
        assert_eq!(
            reducer.apply_result(0, "3"),
            Err(ReductionError::UnknownSymbol { id: 0 })
        );
        assert_eq!(
            reducer.apply_result(9, "3"),
            Err(ReductionError::UnknownSymbol { id: 9 })
        );
    }

    #[test]
    fn mid_wave_snapshots_keep_the_value() {
        let mut reducer = ExpressionReducer::new("10-1-2-3").unwrap();
        reducer.reduce_wave().unwrap();
        let second = reducer.calculations().nth(1).map(|s| s.id).unwrap();
        reducer.apply_result(second, "5").unwrap();
        let snapshot = reducer.render();
        assert_eq!(snapshot, "10-1-5");
        assert_eq!(reduce_fully(&snapshot).0, "4");
    }
}
