use std::fmt;

use crate::objects::{object::{Object, ObjectRef}, object_manager::ObjectManager};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    #[default]
    Nil,
    Number(f64),
    Object(ObjectRef),
}

impl Value {
    #[inline(always)]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline(always)]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    #[inline(always)]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline(always)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(boolean) => Some(*boolean),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(object) => Some(*object),
            _ => None,
        }
    }

    /// `nil` and `false` are falsey; every other value is truthy.
    #[inline(always)]
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn display<'a>(&self, objects: &'a ObjectManager) -> DisplayValue<'a> {
        DisplayValue {
            value: *self,
            objects,
        }
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Self {
        Value::Bool(boolean)
    }
}

pub type ValueArray = Vec<Value>;

/// Canonical decimal text of a number, shared by `print` and string coercion.
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "nan".to_string()
    } else {
        number.to_string()
    }
}

pub struct DisplayValue<'a> {
    value: Value,
    objects: &'a ObjectManager,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Number(number) => f.write_str(&format_number(number)),
            Value::Bool(boolean) => write!(f, "{}", boolean),
            Value::Nil => f.write_str("nil"),
            Value::Object(object) => print_object(f, self.objects, object),
        }
    }
}

fn print_object(f: &mut fmt::Formatter<'_>, objects: &ObjectManager, object: ObjectRef) -> fmt::Result {
    match objects.get(object) {
        Some(Object::String(string)) => f.write_str(string.as_str()),
        Some(Object::Function(function)) => match function.name.and_then(|name| objects.as_string(name)) {
            Some(name) => write!(f, "<fn {}>", name.as_str()),
            None => f.write_str("<script>"),
        },
        Some(Object::NativeFunction(native)) => write!(f, "<native fn {}>", native.name),
        None => f.write_str("<dangling object>"),
    }
}
