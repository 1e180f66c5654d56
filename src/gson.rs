use indexmap::IndexMap;

/// Intermediate value model shared by the AST-literal and runtime-variable
/// filter paths. `Absent` distinguishes "argument not provided" from an
/// explicit null; `Param` is a runtime parameter reference that serializes
/// as `$name` rather than a literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Absent,
    Null,
    Number(Number),
    String(String),
    Boolean(bool),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Param(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(Number::Integer(x)) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(x) => Some(x),
            _ => None,
        }
    }
}
