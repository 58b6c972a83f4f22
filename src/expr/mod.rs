//! Sandboxed condition expressions for While loops.
//!
//! The language is a small subset of JavaScript expressions: literals,
//! variables, member access, arithmetic, comparisons and boolean
//! operators. Identifiers resolve only against the `Bindings` passed in;
//! there is no ambient scope, no calls and no assignment.

mod eval;
mod lexer;
mod parser;

use std::collections::BTreeSet;
use thiserror::Error;

use crate::error::LoopError;

pub use eval::Bindings;
use parser::Expr;

/// Parse or evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unexpected {found} at position {pos}, expected {expected}")]
    Unexpected { found: String, expected: String, pos: usize },

    #[error("Expression is nested too deeply")]
    TooDeep,

    #[error("{0} is not defined")]
    Reference(String),

    #[error("Cannot read properties of {target} (reading '{property}')")]
    NullAccess { target: String, property: String },
}

/// A parsed expression, reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse `source`.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        Ok(Self {
            source: source.to_string(),
            ast: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate and coerce the result to a boolean.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<bool, ExprError> {
        eval::eval(&self.ast, bindings).map(|v| v.truthy())
    }

    /// Names of the variables the expression reads.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_variables(&self.ast, &mut names);
        names
    }
}

fn collect_variables(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Variable(name) => {
            names.insert(name.clone());
        }
        Expr::Literal(_) | Expr::Undefined => {}
        Expr::Array(elements) => elements.iter().for_each(|e| collect_variables(e, names)),
        Expr::Member(target, _) => collect_variables(target, names),
        Expr::Index(target, index) => {
            collect_variables(target, names);
            collect_variables(index, names);
        }
        Expr::Unary(_, operand) => collect_variables(operand, names),
        Expr::Binary(_, lhs, rhs) => {
            collect_variables(lhs, names);
            collect_variables(rhs, names);
        }
    }
}

/// Evaluates user-authored loop conditions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Parse and evaluate `expression` in one step.
    pub fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<bool, LoopError> {
        let parsed = Self::compile(expression)?;
        self.evaluate_compiled(&parsed, bindings)
    }

    /// Parse `expression`, reporting failures as condition errors.
    pub fn compile(expression: &str) -> Result<Expression, LoopError> {
        Expression::parse(expression).map_err(|e| LoopError::ConditionEvaluation(e.to_string()))
    }

    /// Evaluate an already parsed expression.
    pub fn evaluate_compiled(&self, expression: &Expression, bindings: &Bindings) -> Result<bool, LoopError> {
        expression
            .evaluate(bindings)
            .map_err(|e| LoopError::ConditionEvaluation(e.to_string()))
    }
}
