use lumen_core::collections::hashmap::HashMap;

/// Items addressed by name and by a stable index.
///
/// Inserting an existing name replaces the item in place and keeps its index.
#[derive(Debug, Clone)]
pub(crate) struct Registry<T> {
    items: Vec<(String, T)>,
    indices: HashMap<String, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            indices: HashMap::default(),
        }
    }
}

impl<T> Registry<T> {
    /// Returns the index of `name` and whether a new entry was created.
    pub fn insert(&mut self, name: &str, item: T) -> (usize, bool) {
        if let Some(&index) = self.indices.get(name) {
            self.items[index].1 = item;
            return (index, false);
        }
        let index = self.items.len();
        self.items.push((name.to_owned(), item));
        self.indices.insert(name.to_owned(), index);
        (index, true)
    }

    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index_of(name).map(|index| &self.items[index].1)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &T)> {
        self.items.get(index).map(|(name, item)| (name.as_str(), item))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overwrite_keeps_index() {
        let mut registry = Registry::default();
        assert_eq!(registry.insert("a", 1), (0, true));
        assert_eq!(registry.insert("b", 2), (1, true));
        assert_eq!(registry.insert("a", 3), (0, false));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a"), Some(&3));
        assert_eq!(registry.get_index(1), Some(("b", &2)));
        assert_eq!(registry.index_of("c"), None);
    }
}
