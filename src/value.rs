use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use strum_macros::Display;

use crate::commands::CommandError;
use crate::zset::SortedSet;

pub type List = VecDeque<String>;
pub type Hash = HashMap<String, String>;
pub type Set = HashSet<String>;

/// The payload of a key. The variant chosen when a key is created never changes while the key
/// lives, only an overwrite such as `SET` replaces it.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    String(Bytes),
    List(List),
    Hash(Hash),
    Set(Set),
    ZSet(SortedSet),
}

/// Type names as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    String,
    List,
    Hash,
    Set,
    ZSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: Data,
    /// Absolute expiry in milliseconds since the Unix epoch.
    pub expires_at: Option<u64>,
}

macro_rules! accessors {
    ($variant:ident, $ty:ty, $get:ident, $get_mut:ident) => {
        pub fn $get(&self) -> Result<&$ty, CommandError> {
            match &self.data {
                Data::$variant(inner) => Ok(inner),
                _ => Err(CommandError::WrongType),
            }
        }

        pub fn $get_mut(&mut self) -> Result<&mut $ty, CommandError> {
            match &mut self.data {
                Data::$variant(inner) => Ok(inner),
                _ => Err(CommandError::WrongType),
            }
        }
    };
}

impl Value {
    pub fn new(data: Data) -> Value {
        Value {
            data,
            expires_at: None,
        }
    }

    pub fn string(data: impl Into<Bytes>) -> Value {
        Value::new(Data::String(data.into()))
    }

    pub fn value_type(&self) -> ValueType {
        match self.data {
            Data::String(_) => ValueType::String,
            Data::List(_) => ValueType::List,
            Data::Hash(_) => ValueType::Hash,
            Data::Set(_) => ValueType::Set,
            Data::ZSet(_) => ValueType::ZSet,
        }
    }

    /// Containers without elements must not stay in the keyspace. Strings are never "empty" in
    /// that sense, `SET k ""` is a valid value.
    pub fn is_empty_container(&self) -> bool {
        match &self.data {
            Data::String(_) => false,
            Data::List(list) => list.is_empty(),
            Data::Hash(hash) => hash.is_empty(),
            Data::Set(set) => set.is_empty(),
            Data::ZSet(zset) => zset.is_empty(),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    accessors!(String, Bytes, as_string, as_string_mut);
    accessors!(List, List, as_list, as_list_mut);
    accessors!(Hash, Hash, as_hash, as_hash_mut);
    accessors!(Set, Set, as_set, as_set_mut);
    accessors!(ZSet, SortedSet, as_zset, as_zset_mut);
}

/// Clamps a Redis style inclusive index range to `len`, resolving negative indexes. Returns
/// `None` when the range selects nothing.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(Value::string("a").value_type().to_string(), "string");
        assert_eq!(
            Value::new(Data::ZSet(SortedSet::new())).value_type().to_string(),
            "zset"
        );
        assert_eq!(Value::new(Data::Hash(Hash::new())).value_type().to_string(), "hash");
    }

    #[test]
    fn accessors_check_the_variant() {
        let mut value = Value::new(Data::List(List::from(vec!["a".to_string()])));

        assert!(value.as_list().is_ok());
        assert!(matches!(value.as_set_mut(), Err(CommandError::WrongType)));
        assert!(matches!(value.as_string(), Err(CommandError::WrongType)));
    }

    #[test]
    fn empty_containers() {
        assert!(Value::new(Data::Set(Set::new())).is_empty_container());
        assert!(!Value::string("").is_empty_container());
    }

    #[test]
    fn index_ranges() {
        assert_eq!(normalize_range(0, -1, 3), Some((0, 2)));
        assert_eq!(normalize_range(-100, 100, 3), Some((0, 2)));
        assert_eq!(normalize_range(2, 1, 3), None);
        assert_eq!(normalize_range(0, -1, 0), None);
        assert_eq!(normalize_range(5, 10, 3), None);
    }

    #[test]
    fn expiry() {
        let mut value = Value::string("a");
        assert!(!value.is_expired(u64::MAX));

        value.expires_at = Some(100);
        assert!(value.is_expired(100));
        assert!(!value.is_expired(99));
    }
}
