use crate::constants::TABLE_MAX_LOAD;
use crate::memory::grow_capacity;
use crate::objects::{object::ObjectRef, object_manager::ObjectManager, object_string::StringKey};
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
enum Entry {
    Empty,
    /// A deleted entry. Probing walks past it so later keys in the chain stay reachable.
    Tombstone,
    Occupied { key: StringKey, value: Value },
}

/// Open-addressing hash map keyed by interned string identity.
///
/// `count` includes tombstones so the load factor also bounds probe chains
/// through deleted entries; `live` is the number of reachable keys.
pub struct Table {
    count: usize,
    live: usize,
    entries: Vec<Entry>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Table {
        Table {
            count: 0,
            live: 0,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: StringKey) -> Option<Value> {
        if self.live == 0 {
            return None;
        }

        match self.entries[find_entry(&self.entries, key)] {
            Entry::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Inserts or overwrites `key`. Returns true when the key was not present before.
    pub fn set(&mut self, key: StringKey, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD {
            let capacity = grow_capacity!(self.capacity());
            self.adjust_capacity(capacity);
        }

        let index = find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        let is_new_key = !matches!(entry, Entry::Occupied { .. });
        if matches!(entry, Entry::Empty) {
            self.count += 1;
        }
        if is_new_key {
            self.live += 1;
        }

        *entry = Entry::Occupied { key, value };
        is_new_key
    }

    pub fn delete(&mut self, key: StringKey) -> bool {
        if self.live == 0 {
            return false;
        }

        let index = find_entry(&self.entries, key);
        match self.entries[index] {
            Entry::Occupied { .. } => {
                self.entries[index] = Entry::Tombstone;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn add_all(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.set(key, value);
        }
    }

    /// Content lookup used while interning, before the candidate string has an identity.
    pub fn find_string(&self, objects: &ObjectManager, chars: &str, hash: u32) -> Option<ObjectRef> {
        if self.live == 0 {
            return None;
        }

        let mask = self.capacity() - 1;
        let mut index = hash as usize & mask;
        loop {
            match self.entries[index] {
                Entry::Empty => return None,
                Entry::Tombstone => {}
                Entry::Occupied { key, .. } => {
                    if key.hash == hash
                        && objects
                            .as_string(key.object)
                            .is_some_and(|string| string.as_str() == chars)
                    {
                        return Some(key.object);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringKey, Value)> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Occupied { key, value } => Some((*key, *value)),
            _ => None,
        })
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let mut entries = vec![Entry::Empty; capacity];

        // Tombstones are dropped here, so the count is rebuilt from live entries only.
        self.count = 0;
        for entry in &self.entries {
            if let Entry::Occupied { key, value } = *entry {
                let index = find_entry(&entries, key);
                entries[index] = Entry::Occupied { key, value };
                self.count += 1;
            }
        }
        self.live = self.count;
        self.entries = entries;
    }
}

/// Returns the slot holding `key`, or the slot an insert of `key` should use:
/// the first tombstone passed on the way, else the empty slot ending the chain.
fn find_entry(entries: &[Entry], key: StringKey) -> usize {
    let mask = entries.len() - 1;
    let mut index = key.hash as usize & mask;
    let mut tombstone = None;

    loop {
        match entries[index] {
            Entry::Empty => return tombstone.unwrap_or(index),
            Entry::Tombstone => {
                if tombstone.is_none() {
                    tombstone = Some(index);
                }
            }
            Entry::Occupied { key: existing, .. } => {
                if existing.object == key.object {
                    return index;
                }
            }
        }
        index = (index + 1) & mask;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    fn make_keys(count: usize) -> (ObjectManager, Table, Vec<StringKey>) {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let keys = (0..count)
            .map(|i| object_manager.copy_string(&mut intern_strings, &format!("key{}", i)))
            .collect();
        (object_manager, intern_strings, keys)
    }

    #[test]
    fn test_set_get_overwrite() {
        let (_objects, _strings, keys) = make_keys(2);
        let mut table = Table::new();

        assert!(table.set(keys[0], Value::Number(1.0)));
        assert!(!table.set(keys[0], Value::Number(2.0)));
        assert_eq!(table.get(keys[0]), Some(Value::Number(2.0)));
        assert_eq!(table.get(keys[1]), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_leaves_tombstone_reusable() {
        let (_objects, _strings, keys) = make_keys(3);
        let mut table = Table::new();
        for (i, key) in keys.iter().enumerate() {
            table.set(*key, Value::Number(i as f64));
        }

        assert!(table.delete(keys[1]));
        assert!(!table.delete(keys[1]));
        assert_eq!(table.get(keys[1]), None);
        assert_eq!(table.get(keys[0]), Some(Value::Number(0.0)));
        assert_eq!(table.get(keys[2]), Some(Value::Number(2.0)));
        assert_eq!(table.len(), 2);

        let capacity = table.capacity();
        assert!(table.set(keys[1], Value::Bool(true)));
        assert_eq!(table.get(keys[1]), Some(Value::Bool(true)));
        assert_eq!(table.capacity(), capacity);
    }

    #[test]
    fn test_probe_chain_survives_delete() {
        let (_objects, _strings, keys) = make_keys(6);
        let mut table = Table::new();
        for key in &keys {
            table.set(*key, Value::Nil);
        }
        for key in keys.iter().step_by(2) {
            assert!(table.delete(*key));
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(*key).is_some(), i % 2 == 1);
        }
    }

    #[test]
    fn test_growth_keeps_entries() {
        let (_objects, _strings, keys) = make_keys(100);
        let mut table = Table::new();
        let mut growths = 0;
        let mut capacity = table.capacity();
        for (i, key) in keys.iter().enumerate() {
            table.set(*key, Value::Number(i as f64));
            if table.capacity() != capacity {
                growths += 1;
                capacity = table.capacity();
            }
            assert!(table.len() as f64 <= table.capacity() as f64 * TABLE_MAX_LOAD);
        }

        assert!(growths >= 2);
        assert_eq!(table.len(), 100);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(*key), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn test_growth_drops_tombstones() {
        let (_objects, _strings, keys) = make_keys(12);
        let mut table = Table::new();
        for key in &keys[..6] {
            table.set(*key, Value::Nil);
        }
        for key in &keys[..5] {
            table.delete(*key);
        }
        for key in &keys[6..] {
            table.set(*key, Value::Bool(true));
        }

        assert_eq!(table.len(), 7);
        assert_eq!(table.iter().count(), 7);
        assert_eq!(table.get(keys[0]), None);
        assert_eq!(table.get(keys[5]), Some(Value::Nil));
    }

    #[test]
    fn test_find_string_by_content() {
        let (objects, strings, keys) = make_keys(3);
        let hash = crate::objects::object_string::hash_string("key1");
        assert_eq!(strings.find_string(&objects, "key1", hash), Some(keys[1].object));
        let missing = crate::objects::object_string::hash_string("nope");
        assert_eq!(strings.find_string(&objects, "nope", missing), None);
    }

    #[test]
    fn test_add_all() {
        let (_objects, _strings, keys) = make_keys(4);
        let mut from = Table::new();
        let mut to = Table::new();
        from.set(keys[0], Value::Number(1.0));
        from.set(keys[1], Value::Number(2.0));
        to.set(keys[1], Value::Nil);
        to.set(keys[2], Value::Nil);

        from.add_all(&mut to);
        assert_eq!(to.len(), 3);
        assert_eq!(to.get(keys[1]), Some(Value::Number(2.0)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(usize, f64),
        Delete(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..40usize, -1000.0..1000.0f64).prop_map(|(k, v)| Op::Set(k, v)),
            (0..40usize).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_hashmap_model(ops in prop::collection::vec(op_strategy(), 0..300)) {
            let (_objects, _strings, keys) = make_keys(40);
            let mut table = Table::new();
            let mut model: HashMap<usize, f64> = HashMap::new();

            for op in ops {
                match op {
                    Op::Set(k, v) => {
                        let is_new = table.set(keys[k], Value::Number(v));
                        prop_assert_eq!(is_new, model.insert(k, v).is_none());
                    }
                    Op::Delete(k) => {
                        prop_assert_eq!(table.delete(keys[k]), model.remove(&k).is_some());
                    }
                }
            }

            prop_assert_eq!(table.len(), model.len());
            for (k, key) in keys.iter().enumerate() {
                prop_assert_eq!(table.get(*key), model.get(&k).map(|v| Value::Number(*v)));
            }
        }
    }
}
