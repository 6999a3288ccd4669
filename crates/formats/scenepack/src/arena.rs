/// Typed `u32` handles into an [`Arena`].
pub trait EntityRef: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    fn new(index: u32) -> Self;
    fn index(self) -> u32;
}

/// Define a typed entity reference (a newtype over `u32`).
///
/// ```ignore
/// define_entity!(ObjId);
/// ```
#[macro_export]
macro_rules! define_entity {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(u32);

        impl $crate::arena::EntityRef for $name {
            fn new(index: u32) -> Self {
                Self(index)
            }
            fn index(self) -> u32 {
                self.0
            }
        }
    };
}

/// Slot arena keyed by entity references.
///
/// Keys stay valid until their slot is removed; removed slots are never
/// reused, so a stale key can only ever miss.
#[derive(Debug, Clone)]
pub struct Arena<K: EntityRef, V> {
    elems: Vec<Option<V>>,
    live: usize,
    _phantom: std::marker::PhantomData<K>,
}

impl<K: EntityRef, V> Default for Arena<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> Arena<K, V> {
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            live: 0,
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn push(&mut self, value: V) -> K {
        let key = K::new(self.elems.len() as u32);
        self.elems.push(Some(value));
        self.live += 1;
        key
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        let value = self.elems.get_mut(key.index() as usize)?.take();
        if value.is_some() {
            self.live -= 1;
        }
        value
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.elems
            .get(key.index() as usize)
            .and_then(|v| v.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.elems
            .get_mut(key.index() as usize)
            .and_then(|v| v.as_mut())
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (K::new(i as u32), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.elems
            .iter_mut()
            .enumerate()
            .filter_map(|(i, v)| v.as_mut().map(|v| (K::new(i as u32), v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_entity!(TestId);

    #[test]
    fn removed_keys_are_not_reused() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.push("a");
        let b = arena.push("b");
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        let c = arena.push("c");
        assert_ne!(a, c);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.keys().collect::<Vec<_>>(), vec![b, c]);
    }
}
