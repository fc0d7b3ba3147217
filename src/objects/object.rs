use crate::objects::{
    object_function::ObjectFunction,
    object_native_function::ObjectNativeFunction,
    object_string::ObjectString,
};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    ObjString,
    ObjFunction,
    ObjNativeFunction,
}

/// Handle to a heap object owned by an `ObjectManager`.
///
/// Two handles compare equal exactly when they name the same object, which is
/// what makes identity comparison of interned strings sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(usize);

impl ObjectRef {
    pub(crate) fn new(index: usize) -> Self {
        ObjectRef(index)
    }

    #[inline(always)]
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

pub enum Object {
    String(ObjectString),
    Function(ObjectFunction),
    NativeFunction(ObjectNativeFunction),
}

impl Object {
    pub fn obj_type(&self) -> ObjectType {
        match self {
            Object::String(_) => ObjectType::ObjString,
            Object::Function(_) => ObjectType::ObjFunction,
            Object::NativeFunction(_) => ObjectType::ObjNativeFunction,
        }
    }
}

/// A host-provided callable. `args` holds exactly as many values as the
/// native was registered with; the VM checks arity before calling `run`.
pub trait NativeObject {
    fn run(&self, args: &[Value]) -> Result<Value, String>;
}
