use crate::objects::object::ObjectRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectString {
    content: Box<str>,
    hash: u32,
}

impl ObjectString {
    pub fn new(content: String) -> Self {
        let hash = hash_string(&content);
        Self::with_hash(content, hash)
    }

    pub(crate) fn with_hash(content: String, hash: u32) -> Self {
        ObjectString {
            content: content.into_boxed_str(),
            hash,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.content
    }

    #[inline(always)]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Key of an interned string: its identity plus the cached hash, so tables
/// can probe without touching the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringKey {
    pub object: ObjectRef,
    pub hash: u32,
}

/// 32-bit FNV-1a.
pub fn hash_string(content: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in content.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
