use crate::{chunk::Chunk, objects::object::ObjectRef};

pub struct ObjectFunction {
    pub arity: u8,
    pub chunk: Chunk,
    /// Interned name; `None` for the top-level script.
    pub name: Option<ObjectRef>,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: Option<ObjectRef>) -> Self {
        ObjectFunction {
            arity,
            chunk: Chunk::new(),
            name,
        }
    }

    pub fn with_chunk(arity: u8, name: Option<ObjectRef>, chunk: Chunk) -> Self {
        ObjectFunction { arity, chunk, name }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}
