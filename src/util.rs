//! Tiny grab bag of utilities.

use fnv::FnvHashMap;
use fnv::FnvHashSet;
use std::hash::Hash;

/// The hash map used throughout the crate.
///
/// FNV beats SipHash handily on the short `Path` and `&str` keys which make
/// up all of our tables, and we have no reason to fear collision flooding
/// from a trusted source file.
pub type HashMap<K, V> = FnvHashMap<K, V>;

/// The hash set used throughout the crate; see `HashMap`.
pub type HashSet<K> = FnvHashSet<K>;

/// Constructs a new `HashMap`.
pub fn new_map<K: Hash + Eq, V>() -> HashMap<K, V> {
    HashMap::default()
}

/// Constructs a new `HashSet`.
pub fn new_set<K: Hash + Eq>() -> HashSet<K> {
    HashSet::default()
}
