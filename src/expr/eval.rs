//! Tree-walking evaluator with JavaScript-style coercions.
//!
//! Arrays and objects compare structurally rather than by identity.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::ExprError;
use super::parser::{BinaryOp, Expr, UnaryOp};

/// Read-only variables visible to an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vars: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a binding.
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Build bindings from the keys of a JSON object.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            vars: object.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// Runtime value during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl Val {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Val::Null,
            Value::Bool(b) => Val::Bool(*b),
            Value::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Val::Str(s.clone()),
            Value::Array(items) => Val::Array(items.clone()),
            Value::Object(map) => Val::Object(map.clone()),
        }
    }

    fn into_json(self) -> Value {
        match self {
            Val::Undefined | Val::Null => Value::Null,
            Val::Bool(b) => Value::Bool(b),
            Val::Num(n) => serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            Val::Str(s) => Value::String(s),
            Val::Array(items) => Value::Array(items),
            Val::Object(map) => Value::Object(map),
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::Array(_) | Val::Object(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => f64::from(u8::from(*b)),
            Val::Num(n) => *n,
            Val::Str(s) => {
                let s = s.trim();
                if s.is_empty() { 0.0 } else { s.parse().unwrap_or(f64::NAN) }
            }
            Val::Array(_) | Val::Object(_) => f64::NAN,
        }
    }

    fn to_display(&self) -> String {
        match self {
            Val::Undefined => "undefined".to_string(),
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_number(*n),
            Val::Str(s) => s.clone(),
            Val::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    other => Val::from_json(other).to_display(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Val::Object(_) => "[object Object]".to_string(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Null => "null",
            _ => "value",
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Evaluate `expr` against `bindings`.
pub(crate) fn eval(expr: &Expr, bindings: &Bindings) -> Result<Val, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(Val::from_json(value)),
        Expr::Undefined => Ok(Val::Undefined),
        Expr::Variable(name) => bindings
            .get(name)
            .map(Val::from_json)
            .ok_or_else(|| ExprError::Reference(name.clone())),
        Expr::Array(elements) => {
            let items = elements
                .iter()
                .map(|e| eval(e, bindings).map(Val::into_json))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Val::Array(items))
        }
        Expr::Member(target, property) => {
            let target = eval(target, bindings)?;
            member(target, property)
        }
        Expr::Index(target, index) => {
            let target = eval(target, bindings)?;
            let key = eval(index, bindings)?.to_display();
            member(target, &key)
        }
        Expr::Unary(op, operand) => {
            let value = eval(operand, bindings)?;
            Ok(match op {
                UnaryOp::Not => Val::Bool(!value.truthy()),
                UnaryOp::Neg => Val::Num(-value.to_number()),
                UnaryOp::Plus => Val::Num(value.to_number()),
            })
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let left = eval(lhs, bindings)?;
            if left.truthy() { Ok(left) } else { eval(rhs, bindings) }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let left = eval(lhs, bindings)?;
            if left.truthy() { eval(rhs, bindings) } else { Ok(left) }
        }
        Expr::Binary(op, lhs, rhs) => {
            let left = eval(lhs, bindings)?;
            let right = eval(rhs, bindings)?;
            Ok(binary(*op, left, right))
        }
    }
}

fn member(target: Val, property: &str) -> Result<Val, ExprError> {
    match target {
        Val::Undefined | Val::Null => Err(ExprError::NullAccess {
            target: target.type_name().to_string(),
            property: property.to_string(),
        }),
        Val::Str(s) => Ok(if property == "length" {
            Val::Num(s.chars().count() as f64)
        } else {
            property
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Val::Str(c.to_string()))
                .unwrap_or(Val::Undefined)
        }),
        Val::Array(items) => Ok(if property == "length" {
            Val::Num(items.len() as f64)
        } else {
            property
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .map(Val::from_json)
                .unwrap_or(Val::Undefined)
        }),
        Val::Object(map) => Ok(map.get(property).map(Val::from_json).unwrap_or(Val::Undefined)),
        Val::Bool(_) | Val::Num(_) => Ok(Val::Undefined),
    }
}

fn binary(op: BinaryOp, left: Val, right: Val) -> Val {
    match op {
        BinaryOp::Eq => Val::Bool(loose_eq(&left, &right)),
        BinaryOp::NotEq => Val::Bool(!loose_eq(&left, &right)),
        BinaryOp::StrictEq => Val::Bool(strict_eq(&left, &right)),
        BinaryOp::StrictNotEq => Val::Bool(!strict_eq(&left, &right)),
        BinaryOp::Lt => Val::Bool(compare(&left, &right, |o| o.is_lt())),
        BinaryOp::Le => Val::Bool(compare(&left, &right, |o| o.is_le())),
        BinaryOp::Gt => Val::Bool(compare(&left, &right, |o| o.is_gt())),
        BinaryOp::Ge => Val::Bool(compare(&left, &right, |o| o.is_ge())),
        BinaryOp::Add => match (&left, &right) {
            (Val::Str(_), _) | (_, Val::Str(_)) | (Val::Array(_), _) | (_, Val::Array(_)) => {
                Val::Str(format!("{}{}", left.to_display(), right.to_display()))
            }
            _ => Val::Num(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Val::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Val::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Val::Num(left.to_number() / right.to_number()),
        BinaryOp::Rem => Val::Num(left.to_number() % right.to_number()),
        // short-circuit operators are handled in eval
        BinaryOp::Or | BinaryOp::And => Val::Undefined,
    }
}

fn strict_eq(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Num(a), Val::Num(b)) => a == b,
        (Val::Array(a), Val::Array(b)) => json_eq_all(a, b),
        (Val::Object(a), Val::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| strict_eq(&Val::from_json(v), &Val::from_json(w))))
        }
        _ => left == right,
    }
}

fn json_eq_all(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| strict_eq(&Val::from_json(x), &Val::from_json(y)))
}

fn loose_eq(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Undefined | Val::Null, Val::Undefined | Val::Null) => true,
        (Val::Undefined | Val::Null, _) | (_, Val::Undefined | Val::Null) => false,
        (Val::Num(_), Val::Str(_)) | (Val::Str(_), Val::Num(_)) | (Val::Bool(_), _) | (_, Val::Bool(_)) => {
            left.to_number() == right.to_number()
        }
        _ => strict_eq(left, right),
    }
}

fn compare(left: &Val, right: &Val, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Val::Str(a), Val::Str(b)) = (left, right) {
        return accept(a.cmp(b));
    }
    left.to_number()
        .partial_cmp(&right.to_number())
        .is_some_and(accept)
}
