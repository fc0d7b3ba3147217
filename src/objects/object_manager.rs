use crate::objects::{
    object::{NativeObject, Object, ObjectRef, ObjectType},
    object_function::ObjectFunction,
    object_native_function::ObjectNativeFunction,
    object_string::{hash_string, ObjectString, StringKey},
};
use crate::table::Table;
use crate::value::Value;

/// Owns every heap object created by one VM. Objects are never freed
/// individually; the whole list is released when the manager is dropped.
#[derive(Default)]
pub struct ObjectManager {
    objects: Vec<Object>,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    fn push_object(&mut self, object: Object) -> ObjectRef {
        let object_ref = ObjectRef::new(self.objects.len());
        debug_feature::trace_alloc(&object, object_ref);
        self.objects.push(object);
        object_ref
    }

    /// Interns a copy of `chars`, returning the existing string when one with
    /// the same content has already been interned.
    pub fn copy_string(&mut self, strings: &mut Table, chars: &str) -> StringKey {
        let hash = hash_string(chars);
        if let Some(interned) = strings.find_string(self, chars, hash) {
            return StringKey { object: interned, hash };
        }
        self.intern(strings, chars.to_owned(), hash)
    }

    /// Interns `chars`, adopting the buffer when no equal string exists yet.
    pub fn take_string(&mut self, strings: &mut Table, chars: String) -> StringKey {
        let hash = hash_string(&chars);
        if let Some(interned) = strings.find_string(self, &chars, hash) {
            return StringKey { object: interned, hash };
        }
        self.intern(strings, chars, hash)
    }

    fn intern(&mut self, strings: &mut Table, chars: String, hash: u32) -> StringKey {
        let object = self.push_object(Object::String(ObjectString::with_hash(chars, hash)));
        let key = StringKey { object, hash };
        strings.set(key, Value::Nil);
        key
    }

    pub fn alloc_function(&mut self, function: ObjectFunction) -> ObjectRef {
        self.push_object(Object::Function(function))
    }

    pub fn alloc_native_function<T: NativeObject + 'static>(
        &mut self,
        name: String,
        arity: u8,
        native_obj: T,
    ) -> ObjectRef {
        self.push_object(Object::NativeFunction(ObjectNativeFunction::new(name, arity, native_obj)))
    }

    #[inline(always)]
    pub fn get(&self, object: ObjectRef) -> Option<&Object> {
        self.objects.get(object.index())
    }

    pub fn obj_type(&self, object: ObjectRef) -> Option<ObjectType> {
        self.get(object).map(Object::obj_type)
    }

    #[inline(always)]
    pub fn as_string(&self, object: ObjectRef) -> Option<&ObjectString> {
        match self.get(object) {
            Some(Object::String(string)) => Some(string),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_function(&self, object: ObjectRef) -> Option<&ObjectFunction> {
        match self.get(object) {
            Some(Object::Function(function)) => Some(function),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_native_function(&self, object: ObjectRef) -> Option<&ObjectNativeFunction> {
        match self.get(object) {
            Some(Object::NativeFunction(native)) => Some(native),
            _ => None,
        }
    }

    /// The string behind `value`, if it is a string object.
    pub fn string_value(&self, value: &Value) -> Option<&ObjectString> {
        value.as_object().and_then(|object| self.as_string(object))
    }

    pub fn string_key(&self, object: ObjectRef) -> Option<StringKey> {
        self.as_string(object).map(|string| StringKey {
            object,
            hash: string.hash(),
        })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over all managed objects in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (ObjectRef::new(index), object))
    }

    /// Deallocate all objects (VM shutdown).
    pub fn free_all(&mut self) {
        debug_feature::trace_free(self.objects.len());
        self.objects.clear();
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        self.free_all();
    }
}

#[cfg(feature = "debug_trace_object")]
mod debug_feature {
    use super::*;

    pub fn trace_alloc(object: &Object, object_ref: ObjectRef) {
        match object {
            Object::String(string) => {
                eprintln!("[object] alloc #{} string '{}'", object_ref.index(), string.as_str())
            }
            Object::Function(function) => {
                eprintln!("[object] alloc #{} function arity={}", object_ref.index(), function.arity)
            }
            Object::NativeFunction(native) => {
                eprintln!("[object] alloc #{} native fn {}", object_ref.index(), native.name)
            }
        }
    }

    pub fn trace_free(count: usize) {
        if count > 0 {
            eprintln!("[object] free {} objects", count);
        }
    }
}

#[cfg(not(feature = "debug_trace_object"))]
mod debug_feature {
    use super::*;

    #[inline(always)]
    pub fn trace_alloc(_object: &Object, _object_ref: ObjectRef) {}

    #[inline(always)]
    pub fn trace_free(_count: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_and_take_share_identity() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();

        let copied = object_manager.copy_string(&mut intern_strings, "ab");
        let mut built = String::from("a");
        built.push('b');
        let taken = object_manager.take_string(&mut intern_strings, built);

        assert_eq!(copied, taken);
        assert_eq!(object_manager.len(), 1);
        assert_eq!(intern_strings.len(), 1);
    }

    #[test]
    fn test_distinct_content_gets_distinct_objects() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();

        let a = object_manager.copy_string(&mut intern_strings, "a");
        let b = object_manager.copy_string(&mut intern_strings, "b");
        assert_ne!(a.object, b.object);
        assert_eq!(object_manager.as_string(a.object).map(ObjectString::as_str), Some("a"));
        assert_eq!(object_manager.obj_type(b.object), Some(ObjectType::ObjString));
    }

    #[test]
    fn test_object_count_never_shrinks() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut last = 0;
        for i in 0..20 {
            object_manager.copy_string(&mut intern_strings, &format!("s{}", i % 5));
            object_manager.alloc_function(ObjectFunction::new(0, None));
            assert!(object_manager.len() >= last);
            last = object_manager.len();
        }
        assert_eq!(object_manager.len(), 5 + 20);
    }
}
