use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four supported binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Plus,
    Minus,
    Multiplication,
    Division,
}

impl Operator {
    pub const ALL: [Operator; 4] = [
        Operator::Plus,
        Operator::Minus,
        Operator::Multiplication,
        Operator::Division,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Plus),
            '-' => Some(Self::Minus),
            '*' => Some(Self::Multiplication),
            '/' => Some(Self::Division),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Self::Plus => '+',
            Self::Minus => '-',
            Self::Multiplication => '*',
            Self::Division => '/',
        }
    }

    /// Name used to key the delay table
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plus => "plus",
            Self::Minus => "minus",
            Self::Multiplication => "multiplication",
            Self::Division => "division",
        }
    }

    /// Multiplicative operators bind tighter than additive ones
    pub fn is_priority(&self) -> bool {
        matches!(self, Self::Multiplication | Self::Division)
    }

    /// Additive operator with its sign flipped; multiplicative operators are unchanged
    pub fn inverted(&self) -> Self {
        match self {
            Self::Plus => Self::Minus,
            Self::Minus => Self::Plus,
            other => *other,
        }
    }

    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            Self::Plus => left + right,
            Self::Minus => left - right,
            Self::Multiplication => left * right,
            Self::Division => left / right,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("Unknown operator: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Number,
    Operator,
    Calculation,
}

/// One token or reduced node of an expression's current representation.
///
/// For a `Calculation`, `value` is the infix text the calculation replaced (exactly as it
/// appeared in the expression), `op` and `operands` describe what is actually evaluated
/// (which differs from `value` after a double-negative rewrite), and `result` is filled in
/// once a worker reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: usize,
    pub value: String,
    pub kind: SymbolKind,
    pub is_priority: bool,
    pub op: Option<Operator>,
    pub operands: Option<(String, String)>,
    pub result: Option<String>,
}

impl Symbol {
    pub fn number(id: usize, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
            kind: SymbolKind::Number,
            is_priority: false,
            op: None,
            operands: None,
            result: None,
        }
    }

    pub fn operator(id: usize, operator: Operator) -> Self {
        Self {
            id,
            value: operator.symbol().to_string(),
            kind: SymbolKind::Operator,
            is_priority: operator.is_priority(),
            op: None,
            operands: None,
            result: None,
        }
    }

    pub fn calculation(
        id: usize,
        source: impl Into<String>,
        operator: Operator,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            id,
            value: source.into(),
            kind: SymbolKind::Calculation,
            is_priority: false,
            op: Some(operator),
            operands: Some((left.into(), right.into())),
            result: None,
        }
    }

    pub fn is_number(&self) -> bool {
        self.kind == SymbolKind::Number
    }

    pub fn is_calculation(&self) -> bool {
        self.kind == SymbolKind::Calculation
    }

    /// Operator carried by an `Operator` symbol
    pub fn operator_kind(&self) -> Option<Operator> {
        if self.kind != SymbolKind::Operator {
            return None;
        }
        self.value.chars().next().and_then(Operator::from_char)
    }

    /// Text this symbol contributes when the sequence is rendered back to a string
    pub fn rendered(&self) -> &str {
        self.result.as_deref().unwrap_or(&self.value)
    }

    pub(crate) fn renumbered(&self, id: usize) -> Self {
        Self { id, ..self.clone() }
    }
}
