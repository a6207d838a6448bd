//! Dynamic property values and their types
//!
//! A [`Value`] is what an accessor table hands back when a property is read
//! by name, and what filter descriptors carry as their comparison constant.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ParseFailure;
use crate::error::{BinderyError, Result};
use crate::inspect::PropertyDescriptor;

/// A dynamically typed property value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Enum(EnumValue),
}

/// A unit enum variant captured as a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub variant: String,
    pub discriminant: i64,
}

impl Value {
    /// Returns true if the value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or an empty string
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Name of the value's variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Enum(_) => "enum",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Enum(e) => Some(e.discriminant),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Order two values of compatible kinds.
    ///
    /// Integers and floats compare numerically, enums compare by discriminant
    /// (also against plain integers), text compares ordinally. Anything
    /// involving `Null` or mismatched kinds has no ordering.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) => Some(a.discriminant.cmp(&b.discriminant)),
            (Value::Enum(a), Value::Int(b)) => Some(a.discriminant.cmp(b)),
            (Value::Int(a), Value::Enum(b)) => Some(a.cmp(&b.discriminant)),
            _ => None,
        }
    }

    /// Equality with nullable semantics: `null == null`, `null != x`
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Enum(e) => write!(f, "{}", e.variant),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One variant of a [`PropertyEnum`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: &'static str,
    pub discriminant: i64,
}

impl EnumVariant {
    pub const fn new(name: &'static str, discriminant: i64) -> Self {
        Self { name, discriminant }
    }
}

/// The shape of a property as seen by the rule and filter builders
#[derive(Clone, Copy)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    /// Unit enum; holds the variant table
    Enum(fn() -> &'static [EnumVariant]),
    /// Nested inspectable object; holds its descriptor table
    Object(fn() -> &'static [PropertyDescriptor]),
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Enum(_) => "enum",
            ValueKind::Object(_) => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Float | ValueKind::Enum(_))
    }

    /// The value a null is coalesced to before comparisons
    pub fn default_value(&self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int | ValueKind::Enum(_) => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::Object(_) => Value::Null,
        }
    }
}

impl fmt::Debug for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind plus nullability
#[derive(Debug, Clone, Copy)]
pub struct PropertyType {
    pub kind: ValueKind,
    pub nullable: bool,
}

impl PropertyType {
    pub const fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }

    /// Type of a nested inspectable object
    pub fn object<T: crate::inspect::Inspect>(nullable: bool) -> Self {
        Self {
            kind: ValueKind::Object(T::descriptors),
            nullable,
        }
    }

    /// Convert a constant so it can be compared against this property.
    ///
    /// Enum-typed properties are converted to their underlying integer,
    /// numeric strings are parsed culture-invariantly. What happens when a
    /// numeric string does not parse is decided by `on_parse_failure`.
    pub fn coerce(
        &self,
        property: &str,
        value: &Value,
        on_parse_failure: ParseFailure,
    ) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || BinderyError::TypeMismatch {
            property: property.to_string(),
            expected: self.kind.name().to_string(),
            found: value.kind_name().to_string(),
        };

        match (self.kind, value) {
            (ValueKind::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (ValueKind::Bool, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => parse_failed(property, s, on_parse_failure, Value::Bool(false)),
            },
            (ValueKind::Int, Value::Int(i)) => Ok(Value::Int(*i)),
            (ValueKind::Int, Value::Float(f)) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            (ValueKind::Int, Value::Enum(e)) => Ok(Value::Int(e.discriminant)),
            (ValueKind::Int, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => parse_failed(property, s, on_parse_failure, Value::Int(0)),
            },
            (ValueKind::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (ValueKind::Float, Value::Float(f)) => Ok(Value::Float(*f)),
            (ValueKind::Float, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => parse_failed(property, s, on_parse_failure, Value::Float(0.0)),
            },
            (ValueKind::Text, Value::Text(s)) => Ok(Value::Text(s.clone())),
            (ValueKind::Text, Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
                Ok(Value::Text(value.to_string()))
            }
            (ValueKind::Text, Value::Enum(e)) => Ok(Value::Text(e.variant.clone())),
            (ValueKind::Enum(_), Value::Int(i)) => Ok(Value::Int(*i)),
            (ValueKind::Enum(_), Value::Enum(e)) => Ok(Value::Int(e.discriminant)),
            (ValueKind::Enum(variants), Value::Text(s)) => {
                let name = s.trim();
                if let Some(v) = variants().iter().find(|v| v.name == name) {
                    return Ok(Value::Int(v.discriminant));
                }
                match name.parse::<i64>() {
                    Ok(i) => Ok(Value::Int(i)),
                    Err(_) => Err(BinderyError::invalid_value(
                        property,
                        format!("'{}' is not a variant of this enum", name),
                    )),
                }
            }
            _ => Err(mismatch()),
        }
    }
}

fn parse_failed(
    property: &str,
    raw: &str,
    policy: ParseFailure,
    fallback: Value,
) -> Result<Value> {
    match policy {
        ParseFailure::Reject => Err(BinderyError::invalid_value(
            property,
            format!("cannot parse '{}'", raw),
        )),
        ParseFailure::DefaultToZero => {
            tracing::warn!(property, raw, fallback = %fallback, "Unparseable constant replaced by default");
            Ok(fallback)
        }
    }
}

/// Types that can be exposed as an inspectable property
///
/// Implemented for the primitive scalars, `String`, `Option<T>` and (through
/// `#[derive(PropertyEnum)]`) unit enums.
pub trait PropertyValue {
    fn property_type() -> PropertyType;
    fn to_value(&self) -> Value;
}

/// Unit enums usable as property types
///
/// Use `#[derive(PropertyEnum)]` from `bindery-macros` to implement this
/// together with [`PropertyValue`].
pub trait PropertyEnum: Sized {
    fn variants() -> &'static [EnumVariant];
    fn variant_name(&self) -> &'static str;
    fn discriminant(&self) -> i64;

    fn to_enum_value(&self) -> Value {
        Value::Enum(EnumValue {
            variant: self.variant_name().to_string(),
            discriminant: self.discriminant(),
        })
    }
}

impl PropertyValue for bool {
    fn property_type() -> PropertyType {
        PropertyType::new(ValueKind::Bool)
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! int_property {
    ($($t:ty),*) => {
        $(
            impl PropertyValue for $t {
                fn property_type() -> PropertyType {
                    PropertyType::new(ValueKind::Int)
                }

                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }
        )*
    };
}

int_property!(i8, i16, i32, i64, u8, u16, u32);

/// Unsigned types wider than `i64` read as `Int` and saturate at
/// `i64::MAX`: every value above it reads as `i64::MAX`, so filters and
/// rules cannot tell such values apart from each other or from `i64::MAX`.
macro_rules! saturating_int_property {
    ($($t:ty),*) => {
        $(
            impl PropertyValue for $t {
                fn property_type() -> PropertyType {
                    PropertyType::new(ValueKind::Int)
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::try_from(*self).unwrap_or(i64::MAX))
                }
            }
        )*
    };
}

saturating_int_property!(u64, usize);

impl PropertyValue for f32 {
    fn property_type() -> PropertyType {
        PropertyType::new(ValueKind::Float)
    }

    fn to_value(&self) -> Value {
        Value::Float(*self as f64)
    }
}

impl PropertyValue for f64 {
    fn property_type() -> PropertyType {
        PropertyType::new(ValueKind::Float)
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl PropertyValue for String {
    fn property_type() -> PropertyType {
        PropertyType::new(ValueKind::Text)
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl PropertyValue for char {
    fn property_type() -> PropertyType {
        PropertyType::new(ValueKind::Text)
    }

    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl<T: PropertyValue> PropertyValue for Option<T> {
    fn property_type() -> PropertyType {
        PropertyType::nullable(T::property_type().kind)
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}
