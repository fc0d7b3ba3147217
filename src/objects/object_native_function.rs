use crate::{objects::object::NativeObject, value::Value};

pub struct ObjectNativeFunction {
    pub name: String,
    pub arity: u8,
    pub native_object: Box<dyn NativeObject>,
}

impl ObjectNativeFunction {
    pub fn new(name: String, arity: u8, native_object: impl NativeObject + 'static) -> Self {
        ObjectNativeFunction {
            name,
            arity,
            native_object: Box::new(native_object),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        if args.len() != self.arity as usize {
            return Err(format!("Expect {} arguments but got {}.", self.arity, args.len()));
        }
        self.native_object.run(args)
    }
}
