use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use bytemuck::Pod;
use serde::Serialize;
use tracing::trace;

/// Default number of slots allocated up front.
pub const DEFAULT_CAPACITY: usize = 64;

/// Size and occupancy of one packed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryReport {
    pub count: usize,
    pub capacity: usize,
    pub element_size: usize,
    /// Bytes in the active `[0, count)` range
    pub bytes_used: usize,
    /// Bytes in the whole backing buffer
    pub bytes_allocated: usize,
}

impl MemoryReport {
    /// Fraction of the allocated slots in use.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.count as f64 / self.capacity as f64
    }
}

/// Contiguous, keyed storage for fixed-layout render records.
///
/// Occupied slots are always `[0, count)`. Removal moves the last element into
/// the vacated slot, so slot order is not insertion order.
#[derive(Debug, Clone)]
pub struct PackedArray<K, T> {
    /// Backing buffer. Its length is the capacity; slots past `count` are zeroed.
    data: Vec<T>,
    count: usize,
    id_to_index: HashMap<K, usize>,
    /// Length is always `count`.
    index_to_id: Vec<K>,
}

impl<K, T> Default for PackedArray<K, T>
where
    K: Hash + Eq + Clone,
    T: Pod,
{
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<K, T> PackedArray<K, T>
where
    K: Hash + Eq + Clone,
    T: Pod,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PackedArray {
            data: vec![T::zeroed(); capacity],
            count: 0,
            id_to_index: HashMap::with_capacity(capacity),
            index_to_id: Vec::with_capacity(capacity),
        }
    }

    /// Store `item` under `id` in the next free slot and return the slot.
    /// An id that is already present is overwritten in place.
    pub fn add(&mut self, id: K, item: T) -> usize {
        if let Some(&index) = self.id_to_index.get(&id) {
            self.data[index] = item;
            return index;
        }

        if self.count == self.data.len() {
            self.grow();
        }
        let index = self.count;
        self.data[index] = item;
        self.id_to_index.insert(id.clone(), index);
        self.index_to_id.push(id);
        self.count += 1;
        index
    }

    /// Overwrite the record for `id`, adding it if unknown.
    pub fn update(&mut self, id: K, item: T) -> usize {
        match self.id_to_index.get(&id) {
            Some(&index) => {
                self.data[index] = item;
                index
            }
            None => self.add(id, item),
        }
    }

    /// Remove `id` by moving the last record into its slot. Unknown ids are
    /// ignored. Returns the removed record.
    pub fn remove<Q>(&mut self, id: &Q) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.id_to_index.remove(id)?;
        assert!(
            index < self.count,
            "packed array slot {index} outside active range {}",
            self.count
        );

        let last = self.count - 1;
        let removed = self.data[index];
        if index != last {
            self.data[index] = self.data[last];
            let moved = self.index_to_id[last].clone();
            self.id_to_index.insert(moved, index);
            trace!("moved slot {last} into {index}");
        }
        self.index_to_id.swap_remove(index);
        self.data[last] = T::zeroed();
        self.count = last;
        Some(removed)
    }

    fn grow(&mut self) {
        let capacity = self.data.len().max(1) * 2;
        trace!("growing packed array from {} to {capacity}", self.data.len());
        self.data.resize(capacity, T::zeroed());
    }

    /// The dense live range, ready for a single bulk upload.
    pub fn active_view(&self) -> &[T] {
        &self.data[..self.count]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.active_view())
    }

    pub fn get<Q>(&self, id: &Q) -> Option<&T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.id_to_index.get(id).map(|&index| &self.data[index])
    }

    pub fn contains<Q>(&self, id: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.id_to_index.contains_key(id)
    }

    pub fn index_of<Q>(&self, id: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.id_to_index.get(id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<&K> {
        self.index_to_id.get(index)
    }

    /// Ids in slot order.
    pub fn ids(&self) -> &[K] {
        &self.index_to_id
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Drop every record but keep the allocation.
    pub fn clear(&mut self) {
        self.data[..self.count].fill(T::zeroed());
        self.count = 0;
        self.id_to_index.clear();
        self.index_to_id.clear();
    }

    pub fn memory_report(&self) -> MemoryReport {
        let element_size = std::mem::size_of::<T>();
        MemoryReport {
            count: self.count,
            capacity: self.data.len(),
            element_size,
            bytes_used: self.count * element_size,
            bytes_allocated: self.data.len() * element_size,
        }
    }

    /// Panics if the two mappings disagree or leave the dense prefix.
    pub fn assert_invariants(&self) {
        assert!(self.count <= self.data.len());
        assert_eq!(self.index_to_id.len(), self.count);
        assert_eq!(self.id_to_index.len(), self.count);
        for (index, id) in self.index_to_id.iter().enumerate() {
            assert_eq!(self.id_to_index.get(id), Some(&index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    struct Sample {
        position: [f32; 2],
        value: f32,
        _pad: f32,
    }

    fn sample(value: f32) -> Sample {
        Sample {
            position: [value, -value],
            value,
            _pad: 0.0,
        }
    }

    #[test]
    fn remove_middle_moves_last() {
        let mut array: PackedArray<String, Sample> = PackedArray::with_capacity(4);
        array.add("A".into(), sample(1.0));
        array.add("B".into(), sample(2.0));
        array.add("C".into(), sample(3.0));

        let removed = array.remove("B");
        assert_eq!(removed, Some(sample(2.0)));
        assert_eq!(array.len(), 2);
        assert_eq!(array.active_view().len(), 2);
        assert!(!array.contains("B"));
        assert_eq!(array.index_of("A"), Some(0));
        assert_eq!(array.index_of("C"), Some(1));
        assert_eq!(array.id_at(2), None);
        assert_eq!(array.active_view()[1], sample(3.0));
        array.assert_invariants();
    }

    #[test]
    fn relocated_element_is_bit_identical() {
        let mut array: PackedArray<u32, Sample> = PackedArray::with_capacity(8);
        let odd = Sample {
            position: [f32::MIN_POSITIVE, -0.0],
            value: f32::from_bits(0x7fc0_0001),
            _pad: 1.5,
        };
        array.add(1, sample(1.0));
        array.add(2, sample(2.0));
        array.add(3, odd);
        let before = bytemuck::bytes_of(&odd).to_vec();

        array.remove(&1);
        let slot = array.index_of(&3).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(bytemuck::bytes_of(&array.active_view()[slot]), &before[..]);
        // The untouched element keeps its slot.
        assert_eq!(array.index_of(&2), Some(1));
    }

    #[test]
    fn remove_last_and_unknown() {
        let mut array: PackedArray<u32, Sample> = PackedArray::new();
        array.add(1, sample(1.0));
        array.add(2, sample(2.0));
        assert_eq!(array.remove(&2), Some(sample(2.0)));
        assert_eq!(array.remove(&2), None);
        assert_eq!(array.remove(&99), None);
        assert_eq!(array.len(), 1);
        array.assert_invariants();
    }

    #[test]
    fn update_overwrites_in_place() {
        let mut array: PackedArray<u32, Sample> = PackedArray::with_capacity(2);
        array.add(7, sample(1.0));
        array.add(8, sample(2.0));
        let slot = array.update(7, sample(9.0));
        assert_eq!(slot, 0);
        assert_eq!(array.get(&7), Some(&sample(9.0)));
        assert_eq!(array.len(), 2);
        assert_eq!(array.capacity(), 2);

        // Unknown id behaves as add.
        let slot = array.update(9, sample(3.0));
        assert_eq!(slot, 2);
        assert_eq!(array.len(), 3);
        array.assert_invariants();
    }

    #[test]
    fn capacity_doubles_and_keeps_records() {
        let mut array: PackedArray<u32, Sample> = PackedArray::with_capacity(2);
        for id in 0..5 {
            array.add(id, sample(id as f32));
        }
        assert_eq!(array.capacity(), 8);
        for id in 0..5 {
            assert_eq!(array.get(&id), Some(&sample(id as f32)));
        }
        let report = array.memory_report();
        assert_eq!(report.element_size, 16);
        assert_eq!(report.bytes_used, 5 * 16);
        assert_eq!(report.bytes_allocated, 8 * 16);
        assert_eq!(report.utilization(), 0.625);
        assert_eq!(array.as_bytes().len(), 5 * 16);
    }

    #[test]
    fn density_holds_under_churn() {
        let mut array: PackedArray<u32, Sample> = PackedArray::with_capacity(1);
        let mut state = 0x2545_f491_u32;
        for _ in 0..2000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let id = state % 50;
            match state % 3 {
                0 => {
                    array.add(id, sample(id as f32));
                }
                1 => {
                    array.update(id, sample(id as f32 + 0.5));
                }
                _ => {
                    array.remove(&id);
                }
            }
            array.assert_invariants();
            assert_eq!(array.active_view().len(), array.len());
        }
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut array: PackedArray<u32, Sample> = PackedArray::with_capacity(4);
        array.add(1, sample(1.0));
        array.clear();
        assert!(array.is_empty());
        assert_eq!(array.capacity(), 4);
        assert!(array.active_view().is_empty());
        array.assert_invariants();
    }
}
