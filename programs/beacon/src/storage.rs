//! Keyed per-record storage ("boxes").
//!
//! Each record lives under its own key as serialized bytes and locks a
//! storage deposit computed by the host [`CostModel`] from the key and value
//! sizes actually stored.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::costs::CostModel;

/// Byte length of a box key (`u64` big-endian).
pub const BOX_KEY_LEN: usize = 8;

/// Fixed-size value stored in a box.
pub trait BoxValue: Sized {
    /// Serialized size in bytes.
    const ENCODED_LEN: usize;

    fn encode(&self) -> Vec<u8>;

    /// Rebuild a value from its box. Fields that live in the key are
    /// restored from `id`.
    fn decode(id: u64, bytes: &[u8]) -> Option<Self>;
}

pub fn box_key(id: u64) -> [u8; BOX_KEY_LEN] {
    id.to_be_bytes()
}

fn key_id(key: &[u8; BOX_KEY_LEN]) -> u64 {
    u64::from_be_bytes(*key)
}

/// Collection of boxes addressed by `u64`.
#[derive(Debug, Clone)]
pub struct BoxMap<V> {
    boxes: BTreeMap<[u8; BOX_KEY_LEN], Vec<u8>>,
    _value: PhantomData<V>,
}

impl<V> Default for BoxMap<V> {
    fn default() -> Self {
        Self {
            boxes: BTreeMap::new(),
            _value: PhantomData,
        }
    }
}

impl<V: BoxValue> BoxMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<V> {
        self.boxes.get(&box_key(id)).and_then(|bytes| V::decode(id, bytes))
    }

    /// Create a box. Returns `false` if the key is already taken.
    pub fn insert(&mut self, id: u64, value: &V) -> bool {
        let key = box_key(id);
        if self.boxes.contains_key(&key) {
            return false;
        }
        self.boxes.insert(key, value.encode());
        true
    }

    pub fn remove(&mut self, id: u64) -> Option<V> {
        self.boxes.remove(&box_key(id)).and_then(|bytes| V::decode(id, &bytes))
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Live entries in key order. Big-endian keys sort like their ids.
    pub fn iter(&self) -> impl Iterator<Item = (u64, V)> + '_ {
        self.boxes.iter().filter_map(|(key, bytes)| {
            let id = key_id(key);
            V::decode(id, bytes).map(|value| (id, value))
        })
    }

    /// Storage deposit of a single box of this type.
    pub fn box_mbr(model: &dyn CostModel) -> u64 {
        model.box_mbr(BOX_KEY_LEN, V::ENCODED_LEN)
    }

    /// Deposit currently locked by all live boxes.
    pub fn storage_mbr(&self, model: &dyn CostModel) -> u64 {
        self.boxes
            .iter()
            .map(|(key, bytes)| model.box_mbr(key.len(), bytes.len()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::StandardCostModel;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        id: u64,
        count: u64,
    }

    impl BoxValue for Counter {
        const ENCODED_LEN: usize = 8;

        fn encode(&self) -> Vec<u8> {
            self.count.to_be_bytes().to_vec()
        }

        fn decode(id: u64, bytes: &[u8]) -> Option<Self> {
            Some(Counter {
                id,
                count: u64::from_be_bytes(bytes.try_into().ok()?),
            })
        }
    }

    fn counter(id: u64, count: u64) -> Counter {
        Counter { id, count }
    }

    #[test]
    fn insert_refuses_existing_key() {
        let mut boxes = BoxMap::new();
        assert!(boxes.insert(1, &counter(1, 10)));
        assert!(!boxes.insert(1, &counter(1, 11)));
        assert_eq!(boxes.get(1), Some(counter(1, 10)));
        assert_eq!(boxes.get(2), None);
    }

    #[test]
    fn values_come_back_with_their_key() {
        let mut boxes = BoxMap::new();
        boxes.insert(300, &counter(0, 7));
        boxes.insert(2, &counter(0, 9));

        let all: Vec<_> = boxes.iter().collect();
        assert_eq!(all, vec![(2, counter(2, 9)), (300, counter(300, 7))]);
        assert_eq!(boxes.remove(300), Some(counter(300, 7)));
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn storage_mbr_tracks_live_boxes() {
        let model = StandardCostModel::default();
        let mut boxes = BoxMap::new();
        boxes.insert(1, &counter(1, 1));
        boxes.insert(2, &counter(2, 2));
        let one = BoxMap::<Counter>::box_mbr(&model);
        assert_eq!(one, 2_500 + 400 * 16);
        assert_eq!(boxes.storage_mbr(&model), 2 * one);

        boxes.remove(1);
        assert_eq!(boxes.storage_mbr(&model), one);
        assert!(boxes.remove(1).is_none());
        assert!(!boxes.is_empty());
    }

    #[test]
    fn box_key_is_big_endian() {
        assert_eq!(box_key(1), [0, 0, 0, 0, 0, 0, 0, 1]);
    }
}
