//! Host-side values exchanged with the runtime.

use super::class::Class;
use super::encoding::AggregateLayout;
use super::object::Id;
use std::fmt;
use std::sync::Arc;

/// A value passed to or returned from a native call.
///
/// Which variant a result takes is decided by the return type encoding:
/// objects and classes become [`Value::Object`], selectors their name, C
/// strings an owned string, structs a [`StructValue`] and null pointers of
/// every kind [`Value::Nil`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null object or pointer, or the result of a `void` call.
    #[default]
    Nil,
    /// A `B` value.
    Bool(bool),
    /// Any signed integer.
    Int(i64),
    /// Any unsigned integer.
    UInt(u64),
    /// `f` or `d`.
    Float(f64),
    /// An object or class reference.
    Object(Id),
    /// A selector, by name.
    Selector(String),
    /// A C string.
    Str(String),
    /// A raw address.
    Pointer(usize),
    /// A struct, passed by value or through a pointer to a registered layout.
    Struct(StructValue),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "signed integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Object(_) => "object",
            Value::Selector(_) => "selector",
            Value::Str(_) => "string",
            Value::Pointer(_) => "pointer",
            Value::Struct(_) => "struct",
        }
    }

    /// True for [`Value::Nil`].
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness of booleans and integers.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            Value::Int(i) => Some(i != 0),
            Value::UInt(u) => Some(u != 0),
            _ => None,
        }
    }

    /// Integer value, if it fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::UInt(u) => i64::try_from(u).ok(),
            Value::Bool(b) => Some(i64::from(b)),
            _ => None,
        }
    }

    /// Integer value, if it is non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(u) => Some(u),
            Value::Int(i) => u64::try_from(i).ok(),
            Value::Bool(b) => Some(u64::from(b)),
            _ => None,
        }
    }

    /// Floating value; integers convert.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            Value::UInt(u) => Some(u as f64),
            _ => None,
        }
    }

    /// The wrapped object.
    pub fn as_object(&self) -> Option<&Id> {
        match self {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Takes the wrapped object. The result is itself [`Dispatchable`], with
    /// nil semantics for anything that is not an object.
    ///
    /// [`Dispatchable`]: super::object::Dispatchable
    pub fn into_object(self) -> Option<Id> {
        match self {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }

    /// The wrapped object as a class, if it is one.
    pub fn as_class(&self) -> Option<Class> {
        self.as_object().and_then(|id| Class::try_from(id.clone()).ok())
    }

    /// String or selector name.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Selector(s) => Some(s),
            _ => None,
        }
    }

    /// The struct payload.
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Object(id) => write!(f, "{id:?}"),
            Value::Selector(s) => write!(f, "@selector({s})"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Pointer(p) => write!(f, "{p:#x}"),
            Value::Struct(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u64::from(u))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Object(id)
    }
}

impl From<&Id> for Value {
    fn from(id: &Id) -> Self {
        Value::Object(id.clone())
    }
}

impl From<Class> for Value {
    fn from(cls: Class) -> Self {
        Value::Object(cls.into())
    }
}

impl From<&Class> for Value {
    fn from(cls: &Class) -> Self {
        Value::Object(cls.as_id().clone())
    }
}

impl From<Option<Id>> for Value {
    fn from(id: Option<Id>) -> Self {
        id.map_or(Value::Nil, Value::Object)
    }
}

impl From<StructValue> for Value {
    fn from(s: StructValue) -> Self {
        Value::Struct(s)
    }
}

/// A decoded struct: its layout plus one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    layout: Arc<AggregateLayout>,
    fields: Vec<Value>,
}

impl StructValue {
    /// Builds a struct value. Missing trailing fields default to zero.
    pub fn new(layout: Arc<AggregateLayout>, mut fields: Vec<Value>) -> Self {
        fields.resize(layout.fields().len(), Value::Nil);
        StructValue { layout, fields }
    }

    /// The struct layout.
    pub fn layout(&self) -> &Arc<AggregateLayout> {
        &self.layout
    }

    /// Field values in declaration order.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Field by position.
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// Field by name, when the layout names its fields.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layout.field_index(name).and_then(|i| self.fields.get(i))
    }

    /// Replaces the field called `name`; returns false if there is none.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.layout.field_index(name) {
            Some(i) => {
                self.fields[i] = value.into();
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.layout.name())?;
        for (i, (field, value)) in self.layout.fields().iter().zip(&self.fields).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &field.name {
                Some(name) => write!(f, "{name}: {value}")?,
                None => write!(f, "{value}")?,
            }
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::encoding::translate;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int(-3).as_i64(), Some(-3));
        assert_eq!(Value::Int(-3).as_u64(), None);
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::Bool(true).as_u64(), Some(1));
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert!(Value::Nil.is_nil());
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
    }

    #[test]
    fn test_struct_fields_by_name() {
        let point = translate("{Point=\"x\"d\"y\"d}").unwrap();
        let layout = point.layout().unwrap().clone();
        let mut value = StructValue::new(layout, vec![Value::Float(1.5)]);

        assert_eq!(value.get("x"), Some(&Value::Float(1.5)));
        assert_eq!(value.get("y"), Some(&Value::Nil));
        assert!(value.set("y", 2.5));
        assert!(!value.set("z", 0.0));
        assert_eq!(value.field(1), Some(&Value::Float(2.5)));
        assert_eq!(value.to_string(), "Point { x: 1.5, y: 2.5 }");
    }
}
