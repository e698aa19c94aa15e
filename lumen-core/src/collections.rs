//! Collection aliases used across the workspace.

pub mod hashmap {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, foldhash::fast::RandomState>;
}
