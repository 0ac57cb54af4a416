use std::{cmp::Ordering, fmt::Display, hash::{Hash, Hasher}};

use itertools::Itertools;

use crate::error::{ExecutionError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    // Pointer sized identifiers (hashes, addresses) that never leave the engine
    Hash,
    Pointer,
    Float,
    Double,
    Varchar,
    Struct(Vec<(String, LogicalType)>),
    List(Box<LogicalType>),
}

impl LogicalType {
    // Size of one slot in a standard buffer. Varchar slots hold a 16 byte string descriptor,
    // list slots an (offset, length) pair. Structs keep their data in child vectors only.
    pub fn element_size(&self) -> usize {
        match self {
            LogicalType::Boolean | LogicalType::TinyInt => 1,
            LogicalType::SmallInt => 2,
            LogicalType::Integer | LogicalType::Float => 4,
            LogicalType::BigInt | LogicalType::Hash | LogicalType::Double => 8,
            LogicalType::Pointer => std::mem::size_of::<usize>(),
            LogicalType::Varchar | LogicalType::List(_) => 16,
            LogicalType::Struct(_) => 0,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, LogicalType::Float | LogicalType::Double)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, LogicalType::Struct(_) | LogicalType::List(_))
    }

    pub fn is_comparable_to(&self, other: &LogicalType) -> bool {
        match (self, other) {
            (a, b) if a.is_integral() && b.is_integral() => true,
            (LogicalType::Float | LogicalType::Double, LogicalType::Float | LogicalType::Double) => true,
            (LogicalType::Struct(a), LogicalType::Struct(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|((_, a), (_, b))| a.is_comparable_to(b))
            },
            (LogicalType::List(a), LogicalType::List(b)) => a.is_comparable_to(b),
            (a, b) => a == b,
        }
    }
}

impl Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalType::Boolean => write!(f, "BOOLEAN"),
            LogicalType::TinyInt => write!(f, "TINYINT"),
            LogicalType::SmallInt => write!(f, "SMALLINT"),
            LogicalType::Integer => write!(f, "INTEGER"),
            LogicalType::BigInt => write!(f, "BIGINT"),
            LogicalType::Hash => write!(f, "HASH"),
            LogicalType::Pointer => write!(f, "POINTER"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Varchar => write!(f, "VARCHAR"),
            LogicalType::Struct(children) => {
                write!(f, "STRUCT<{}>", children.iter().map(|(name, t)| format!("{}: {}", name, t)).join(", "))
            },
            LogicalType::List(child) => write!(f, "LIST<{}>", child),
        }
    }
}

/*
    A single typed value. Values are only used for literals and single cell access
    (GetValue/SetValue style), bulk data always lives in vectors.
    NULL still carries the type it is a NULL of so that e.g. a constant NULL vector
    can be created from it.
 */
#[derive(Debug, Clone)]
pub enum Value {
    Null(LogicalType),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Hash(u64),
    Pointer(usize),
    Float(f32),
    Double(f64),
    Varchar(String),
    Struct(Vec<(String, Value)>),
    // The child type is kept so that empty lists are still typed
    List(LogicalType, Vec<Value>),
}

impl Value {
    pub fn null(logical_type: LogicalType) -> Value {
        Value::Null(logical_type)
    }

    pub fn varchar(value: impl Into<String>) -> Value {
        Value::Varchar(value.into())
    }

    pub fn logical_type(&self) -> LogicalType {
        match self {
            Value::Null(t) => t.clone(),
            Value::Boolean(_) => LogicalType::Boolean,
            Value::TinyInt(_) => LogicalType::TinyInt,
            Value::SmallInt(_) => LogicalType::SmallInt,
            Value::Integer(_) => LogicalType::Integer,
            Value::BigInt(_) => LogicalType::BigInt,
            Value::Hash(_) => LogicalType::Hash,
            Value::Pointer(_) => LogicalType::Pointer,
            Value::Float(_) => LogicalType::Float,
            Value::Double(_) => LogicalType::Double,
            Value::Varchar(_) => LogicalType::Varchar,
            Value::Struct(children) => {
                LogicalType::Struct(children.iter().map(|(name, v)| (name.clone(), v.logical_type())).collect())
            },
            Value::List(child, _) => LogicalType::List(Box::new(child.clone())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    // Integer view of all integral values, None for everything else
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(*v as i64),
            Value::SmallInt(v) => Some(*v as i64),
            Value::Integer(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    // Builds an integral value of the given type, failing if it doesn't fit
    pub fn integral(logical_type: &LogicalType, value: i64) -> Result<Value> {
        let out_of_range = || ExecutionError::InvalidCast {
            from: LogicalType::BigInt,
            to: logical_type.clone(),
            value: value.to_string(),
        };
        Ok(match logical_type {
            LogicalType::TinyInt => Value::TinyInt(i8::try_from(value).map_err(|_| out_of_range())?),
            LogicalType::SmallInt => Value::SmallInt(i16::try_from(value).map_err(|_| out_of_range())?),
            LogicalType::Integer => Value::Integer(i32::try_from(value).map_err(|_| out_of_range())?),
            LogicalType::BigInt => Value::BigInt(value),
            LogicalType::Hash => Value::Hash(u64::try_from(value).map_err(|_| out_of_range())?),
            LogicalType::Pointer => Value::Pointer(usize::try_from(value).map_err(|_| out_of_range())?),
            LogicalType::Float => Value::Float(value as f32),
            LogicalType::Double => Value::Double(value as f64),
            _ => return Err(out_of_range()),
        })
    }

    pub fn cast_as(&self, target: &LogicalType) -> Result<Value> {
        if &self.logical_type() == target {
            return Ok(self.clone());
        }
        let invalid = || ExecutionError::InvalidCast {
            from: self.logical_type(),
            to: target.clone(),
            value: self.to_string(),
        };
        match (self, target) {
            (Value::Null(_), _) => Ok(Value::Null(target.clone())),
            (_, LogicalType::Varchar) if !self.logical_type().is_nested() => Ok(Value::Varchar(self.render())),
            (Value::Boolean(b), t) if t.is_numeric() => Value::integral(t, *b as i64),
            (v, LogicalType::Boolean) if v.as_i64().is_some() => Ok(Value::Boolean(v.as_i64() != Some(0))),
            (Value::Hash(h), t) => i64::try_from(*h).map_err(|_| invalid()).and_then(|h| Value::integral(t, h)).map_err(|_| invalid()),
            (Value::Pointer(p), t) => i64::try_from(*p).map_err(|_| invalid()).and_then(|p| Value::integral(t, p)).map_err(|_| invalid()),
            (v, LogicalType::Float) if v.as_f64().is_some() => Ok(Value::Float(v.as_f64().unwrap_or_default() as f32)),
            (v, LogicalType::Double) if v.as_f64().is_some() => Ok(Value::Double(v.as_f64().unwrap_or_default())),
            (v, t) if v.as_i64().is_some() => Value::integral(t, v.as_i64().unwrap_or_default()).map_err(|_| invalid()),
            (Value::Float(_) | Value::Double(_), t) if t.is_integral() || matches!(t, LogicalType::Hash | LogicalType::Pointer) => {
                let f = self.as_f64().unwrap_or_default().round();
                if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
                    return Err(invalid());
                }
                Value::integral(t, f as i64).map_err(|_| invalid())
            },
            (Value::Varchar(s), LogicalType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(invalid()),
            },
            (Value::Varchar(s), t) if t.is_integral() || matches!(t, LogicalType::Hash | LogicalType::Pointer) => {
                let parsed = s.trim().parse::<i64>().map_err(|_| invalid())?;
                Value::integral(t, parsed).map_err(|_| invalid())
            },
            (Value::Varchar(s), LogicalType::Float | LogicalType::Double) => {
                let parsed = s.trim().parse::<f64>().map_err(|_| invalid())?;
                Value::Double(parsed).cast_as(target)
            },
            (Value::Struct(children), LogicalType::Struct(types)) if children.len() == types.len() => {
                let cast = children.iter().zip(types.iter())
                    .map(|((_, v), (name, t))| Ok((name.clone(), v.cast_as(t)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Struct(cast))
            },
            (Value::List(_, values), LogicalType::List(child)) => {
                let cast = values.iter().map(|v| v.cast_as(child)).collect::<Result<Vec<_>>>()?;
                Ok(Value::List((**child).clone(), cast))
            },
            _ => Err(invalid()),
        }
    }

    // Plain rendering without the quoting Display applies to strings
    pub fn render(&self) -> String {
        match self {
            Value::Varchar(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /*
        Ordering used by sorts and comparisons. Numeric values of different widths compare by
        value (like bigint with smallint), floats use a total order so that NaN sorts consistently.
        NULLs are not ordered here, callers apply their own NULL policy first.
     */
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null(_), _) | (_, Value::Null(_)) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Hash(a), Value::Hash(b)) => Some(a.cmp(b)),
            (Value::Pointer(a), Value::Pointer(b)) => Some(a.cmp(b)),
            (Value::Float(_) | Value::Double(_), Value::Float(_) | Value::Double(_)) => {
                Some(self.as_f64()?.total_cmp(&other.as_f64()?))
            },
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Struct(a), Value::Struct(b)) => {
                for ((_, a), (_, b)) in a.iter().zip(b.iter()) {
                    match compare_nulls_last(a, b)? {
                        Ordering::Equal => continue,
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            },
            (Value::List(_, a), Value::List(_, b)) => {
                for (a, b) in a.iter().zip(b.iter()) {
                    match compare_nulls_last(a, b)? {
                        Ordering::Equal => continue,
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            },
            (a, b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        }
    }
}

// Nested values order NULL children after everything else
fn compare_nulls_last(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.is_null(), b.is_null()) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Greater),
        (false, true) => Some(Ordering::Less),
        (false, false) => a.compare(b),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null(_), Value::Null(_)) => true,
            (Value::Null(_), _) | (_, Value::Null(_)) => false,
            (Value::Struct(a), Value::Struct(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|((_, a), (_, b))| a == b),
            (Value::List(_, a), Value::List(_, b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl Eq for Value {}

// Must agree with PartialEq: all integral widths hash as i64, both float widths as f64 bits.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null(_) => 0u8.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Integer(_) | Value::BigInt(_) => {
                self.as_i64().hash(state)
            },
            Value::Hash(h) => h.hash(state),
            Value::Pointer(p) => p.hash(state),
            Value::Float(_) | Value::Double(_) => self.as_f64().map(f64::to_bits).hash(state),
            Value::Varchar(s) => s.hash(state),
            Value::Struct(children) => {
                for (_, child) in children {
                    child.hash(state);
                }
            },
            Value::List(_, values) => values.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null(_) => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::TinyInt(i) => write!(f, "{}", i),
            Value::SmallInt(i) => write!(f, "{}", i),
            Value::Integer(i) => write!(f, "{}", i),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::Hash(h) => write!(f, "{}", h),
            Value::Pointer(p) => write!(f, "{:#x}", p),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Varchar(s) => write!(f, "\"{}\"", s.escape_debug()),
            Value::Struct(children) => {
                write!(f, "{{{}}}", children.iter().map(|(name, v)| format!("'{}': {}", name, v)).join(", "))
            },
            Value::List(_, values) => write!(f, "[{}]", values.iter().join(", ")),
        }
    }
}
