//! Property accessor tables
//!
//! Rules and filters address properties by name (`"address.city"`), so every
//! validated or filtered type exposes a table of its properties once, and a
//! by-name reader. Use `#[derive(Inspect)]` from `bindery-macros` rather than
//! implementing the trait by hand.

use crate::error::{BinderyError, Result};
use crate::value::{PropertyType, Value, ValueKind};

/// Name and type of one inspectable property
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub ty: PropertyType,
}

impl PropertyDescriptor {
    pub const fn new(name: &'static str, ty: PropertyType) -> Self {
        Self { name, ty }
    }
}

/// Types whose properties can be read by name
///
/// # Example
///
/// ```
/// use bindery_core::{Inspect, PropertyDescriptor, PropertyValue, Value};
///
/// struct Tag {
///     label: String,
/// }
///
/// impl Inspect for Tag {
///     fn descriptors() -> &'static [PropertyDescriptor] {
///         static TABLE: std::sync::OnceLock<Vec<PropertyDescriptor>> = std::sync::OnceLock::new();
///         TABLE.get_or_init(|| vec![PropertyDescriptor::new("label", String::property_type())])
///     }
///
///     fn read(&self, property: &str) -> Option<Value> {
///         match property {
///             "label" => Some(self.label.to_value()),
///             _ => None,
///         }
///     }
///
///     fn nested(&self, _property: &str) -> Option<&dyn Inspect> {
///         None
///     }
/// }
///
/// let tag = Tag { label: "urgent".into() };
/// assert_eq!(tag.read("label"), Some(Value::from("urgent")));
/// ```
pub trait Inspect {
    /// The accessor table, built once per type
    fn descriptors() -> &'static [PropertyDescriptor]
    where
        Self: Sized;

    /// Read a scalar property
    fn read(&self, property: &str) -> Option<Value>;

    /// Borrow a nested object property; `None` when it is null or unknown
    fn nested(&self, property: &str) -> Option<&dyn Inspect>;
}

/// A dotted property path resolved against an accessor table
///
/// Resolution happens once, when a rule or filter is built. A missing
/// intermediate object at evaluation time reads as [`Value::Null`].
#[derive(Debug, Clone)]
pub struct PropertyPath {
    path: String,
    segments: Vec<&'static str>,
    leaf: PropertyType,
}

impl PropertyPath {
    /// Resolve `path` against the properties of `T`
    pub fn resolve<T: Inspect>(path: &str) -> Result<Self> {
        Self::resolve_in(std::any::type_name::<T>(), T::descriptors(), path)
    }

    /// Resolve `path` against an explicit descriptor table
    pub fn resolve_in(
        type_name: &'static str,
        descriptors: &'static [PropertyDescriptor],
        path: &str,
    ) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(BinderyError::EmptyPath(path.to_string()));
        }

        let parts: Vec<&str> = trimmed.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(BinderyError::EmptyPath(path.to_string()));
        }

        let mut table = descriptors;
        let mut segments = Vec::with_capacity(parts.len());
        let mut through_nullable = false;
        let mut leaf = None;

        for (i, part) in parts.iter().enumerate() {
            let descriptor = table
                .iter()
                .find(|d| d.name == *part)
                .ok_or_else(|| BinderyError::UnknownProperty {
                    type_name,
                    property: parts[..=i].join("."),
                })?;
            segments.push(descriptor.name);

            if i + 1 == parts.len() {
                leaf = Some(descriptor.ty);
                break;
            }

            match descriptor.ty.kind {
                ValueKind::Object(next) => {
                    through_nullable |= descriptor.ty.nullable;
                    table = next();
                }
                _ => return Err(BinderyError::NotAnObject(parts[..=i].join("."))),
            }
        }

        let mut leaf = leaf.ok_or_else(|| BinderyError::EmptyPath(path.to_string()))?;
        leaf.nullable |= through_nullable;

        Ok(Self {
            path: segments.join("."),
            segments,
            leaf,
        })
    }

    /// The normalized dotted path
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[&'static str] {
        &self.segments
    }

    /// Type of the final segment (nullable if any step may be null)
    pub fn leaf(&self) -> PropertyType {
        self.leaf
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// True when the path ends at a nested object rather than a scalar
    pub fn is_object(&self) -> bool {
        matches!(self.leaf.kind, ValueKind::Object(_))
    }

    /// Walk to the object holding the final segment
    fn parent<'a>(&self, instance: &'a dyn Inspect) -> Option<&'a dyn Inspect> {
        let mut current = instance;
        for segment in &self.segments[..self.segments.len() - 1] {
            current = current.nested(segment)?;
        }
        Some(current)
    }

    /// Read the scalar at this path, `Null` if any step is missing
    pub fn read(&self, instance: &dyn Inspect) -> Value {
        let Some(last) = self.segments.last() else {
            return Value::Null;
        };
        self.parent(instance)
            .and_then(|parent| parent.read(last))
            .unwrap_or(Value::Null)
    }

    /// Borrow the object at this path (for object-typed leaves)
    pub fn object<'a>(&self, instance: &'a dyn Inspect) -> Option<&'a dyn Inspect> {
        let last = self.segments.last()?;
        self.parent(instance)?.nested(last)
    }

    /// Whether the path currently holds something other than null
    pub fn is_present(&self, instance: &dyn Inspect) -> bool {
        if self.is_object() {
            self.object(instance).is_some()
        } else {
            !self.read(instance).is_null()
        }
    }
}

impl PartialEq for PropertyPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for PropertyPath {}

impl std::fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-written accessor tables shared by the crate's unit tests

    use std::sync::OnceLock;

    use super::*;
    use crate::value::{EnumVariant, PropertyEnum, PropertyValue};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Status {
        Draft = 0,
        Active = 1,
        Archived = 2,
    }

    impl PropertyEnum for Status {
        fn variants() -> &'static [EnumVariant] {
            static VARIANTS: &[EnumVariant] = &[
                EnumVariant::new("Draft", 0),
                EnumVariant::new("Active", 1),
                EnumVariant::new("Archived", 2),
            ];
            VARIANTS
        }

        fn variant_name(&self) -> &'static str {
            match self {
                Status::Draft => "Draft",
                Status::Active => "Active",
                Status::Archived => "Archived",
            }
        }

        fn discriminant(&self) -> i64 {
            *self as i64
        }
    }

    impl PropertyValue for Status {
        fn property_type() -> PropertyType {
            PropertyType::new(ValueKind::Enum(Status::variants))
        }

        fn to_value(&self) -> Value {
            self.to_enum_value()
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct Address {
        pub city: String,
        pub zip: Option<i32>,
    }

    impl Inspect for Address {
        fn descriptors() -> &'static [PropertyDescriptor] {
            static TABLE: OnceLock<Vec<PropertyDescriptor>> = OnceLock::new();
            TABLE.get_or_init(|| {
                vec![
                    PropertyDescriptor::new("city", String::property_type()),
                    PropertyDescriptor::new("zip", Option::<i32>::property_type()),
                ]
            })
        }

        fn read(&self, property: &str) -> Option<Value> {
            match property {
                "city" => Some(self.city.to_value()),
                "zip" => Some(self.zip.to_value()),
                _ => None,
            }
        }

        fn nested(&self, _property: &str) -> Option<&dyn Inspect> {
            None
        }
    }

    #[derive(Debug, Clone)]
    pub struct Customer {
        pub name: Option<String>,
        pub age: i32,
        pub score: Option<f64>,
        pub status: Status,
        pub address: Option<Address>,
    }

    impl Default for Customer {
        fn default() -> Self {
            Self {
                name: None,
                age: 0,
                score: None,
                status: Status::Draft,
                address: None,
            }
        }
    }

    impl Customer {
        pub fn named(name: &str) -> Self {
            Self {
                name: Some(name.to_string()),
                ..Default::default()
            }
        }
    }

    impl Inspect for Customer {
        fn descriptors() -> &'static [PropertyDescriptor] {
            static TABLE: OnceLock<Vec<PropertyDescriptor>> = OnceLock::new();
            TABLE.get_or_init(|| {
                vec![
                    PropertyDescriptor::new("name", Option::<String>::property_type()),
                    PropertyDescriptor::new("age", i32::property_type()),
                    PropertyDescriptor::new("score", Option::<f64>::property_type()),
                    PropertyDescriptor::new("status", Status::property_type()),
                    PropertyDescriptor::new("address", PropertyType::object::<Address>(true)),
                ]
            })
        }

        fn read(&self, property: &str) -> Option<Value> {
            match property {
                "name" => Some(self.name.to_value()),
                "age" => Some(self.age.to_value()),
                "score" => Some(self.score.to_value()),
                "status" => Some(self.status.to_value()),
                _ => None,
            }
        }

        fn nested(&self, property: &str) -> Option<&dyn Inspect> {
            match property {
                "address" => self.address.as_ref().map(|a| a as &dyn Inspect),
                _ => None,
            }
        }
    }
}
