//! Open-addressing hash table with tombstone deletion.
//!
//! The table backing the key-value server:
//! - Linear probing over a power-of-two slot array
//! - Tombstones so deletions do not break probe chains
//! - Capacity fixed at creation, no rehashing

use std::fmt;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x100000001b3;

/// Hash key bytes with FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A single table slot.
///
/// Key and value buffers are owned by the slot and exist only while it
/// is `Occupied`. A `Tombstone` owns nothing but keeps probe chains
/// intact: lookups skip it, and only `Empty` stops a scan.
#[derive(Debug)]
enum Slot {
    Empty,
    Occupied { key: Box<[u8]>, value: Box<[u8]> },
    Tombstone,
}

/// Table operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The slot array or a key/value copy could not be allocated.
    AllocationFailed,
    /// No empty slot left on the probe path for a new distinct key.
    CapacityExhausted,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::AllocationFailed => write!(f, "allocation failed"),
            TableError::CapacityExhausted => write!(f, "table capacity exhausted"),
        }
    }
}

impl std::error::Error for TableError {}

/// Open-addressing key-value table with a capacity fixed at creation.
pub struct Table {
    slots: Box<[Slot]>,
    occupied: usize,
}

impl Table {
    /// Create a table with a fixed slot count.
    ///
    /// The count is rounded up to the next power of two so probe
    /// indices fold with a mask instead of a division.
    pub fn fixed(capacity: usize) -> Result<Self, TableError> {
        let capacity = capacity
            .max(1)
            .checked_next_power_of_two()
            .ok_or(TableError::AllocationFailed)?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| TableError::AllocationFailed)?;
        slots.resize_with(capacity, || Slot::Empty);
        Ok(Table {
            slots: slots.into_boxed_slice(),
            occupied: 0,
        })
    }

    /// Create a table sized for an expected number of items.
    ///
    /// Capacity is `next_power_of_two(2 * expected + 1)`: the headroom
    /// keeps the load factor at or below ~50% so probe chains stay
    /// short.
    pub fn with_expected_items(expected: usize) -> Result<Self, TableError> {
        let target = expected
            .checked_mul(2)
            .and_then(|n| n.checked_add(1))
            .ok_or(TableError::AllocationFailed)?;
        Self::fixed(target)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Total slot count. Always a power of two.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn start_index(&self, key: &[u8]) -> usize {
        (fnv1a(key) & (self.slots.len() as u64 - 1)) as usize
    }

    /// Store a key-value pair, replacing any existing value in place.
    ///
    /// The first tombstone seen on the probe path is preferred over the
    /// terminating empty slot, keeping chains short. A full probe pass
    /// with no empty slot and no matching key means the table cannot
    /// accept the key; the caller decides what to do with the failure.
    /// On an allocation failure the target slot is left untouched.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        let mask = self.slots.len() - 1;
        let start = self.start_index(key);
        let mut first_tomb = None;

        for i in 0..self.slots.len() {
            let idx = (start + i) & mask;
            match &self.slots[idx] {
                Slot::Empty => {
                    let entry = Slot::Occupied {
                        key: copy_bytes(key)?,
                        value: copy_bytes(value)?,
                    };
                    self.slots[first_tomb.unwrap_or(idx)] = entry;
                    self.occupied += 1;
                    return Ok(());
                }
                Slot::Tombstone => {
                    if first_tomb.is_none() {
                        first_tomb = Some(idx);
                    }
                }
                Slot::Occupied { key: k, .. } if k.as_ref() == key => {
                    let value = copy_bytes(value)?;
                    if let Slot::Occupied { value: v, .. } = &mut self.slots[idx] {
                        *v = value;
                    }
                    return Ok(());
                }
                Slot::Occupied { .. } => {}
            }
        }

        Err(TableError::CapacityExhausted)
    }

    /// Look up a key. Not-found is a normal outcome, not an error.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let mask = self.slots.len() - 1;
        let start = self.start_index(key);

        for i in 0..self.slots.len() {
            match &self.slots[(start + i) & mask] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied { key: k, value } if k.as_ref() == key => {
                    return Some(value);
                }
                Slot::Occupied { .. } => {}
            }
        }

        None
    }

    /// Remove a key if present. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) {
        let mask = self.slots.len() - 1;
        let start = self.start_index(key);

        for i in 0..self.slots.len() {
            let idx = (start + i) & mask;
            match &self.slots[idx] {
                Slot::Empty => return,
                Slot::Tombstone => {}
                Slot::Occupied { key: k, .. } if k.as_ref() == key => {
                    // Overwriting the entry drops its owned buffers.
                    self.slots[idx] = Slot::Tombstone;
                    self.occupied -= 1;
                    return;
                }
                Slot::Occupied { .. } => {}
            }
        }
    }
}

/// Copy bytes into a fresh owned buffer, surfacing allocation failure
/// instead of aborting.
fn copy_bytes(src: &[u8]) -> Result<Box<[u8]>, TableError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())
        .map_err(|_| TableError::AllocationFailed)?;
    buf.extend_from_slice(src);
    Ok(buf.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Find `n` distinct keys that all hash to `bucket` under `mask`.
    fn colliding_keys(mask: usize, bucket: usize, n: usize) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        let mut i = 0u64;
        while keys.len() < n {
            let candidate = format!("c{i}").into_bytes();
            if (fnv1a(&candidate) & mask as u64) as usize == bucket {
                keys.push(candidate);
            }
            i += 1;
        }
        keys
    }

    fn tombstone_count(table: &Table) -> usize {
        table
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Tombstone))
            .count()
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut table = Table::fixed(16).unwrap();
        table.set(b"key1", b"value1").unwrap();
        assert_eq!(table.get(b"key1"), Some(&b"value1"[..]));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let table = Table::fixed(16).unwrap();
        assert_eq!(table.get(b"nonexistent"), None);
    }

    #[test]
    fn test_update_in_place() {
        let mut table = Table::fixed(16).unwrap();
        table.set(b"key1", b"v1").unwrap();
        table.set(b"key1", b"v2").unwrap();
        assert_eq!(table.get(b"key1"), Some(&b"v2"[..]));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut table = Table::fixed(16).unwrap();
        table.set(b"key1", b"v1").unwrap();
        table.delete(b"key1");
        assert_eq!(table.get(b"key1"), None);
        assert_eq!(table.len(), 0);

        // Second delete of the same key is a no-op.
        table.delete(b"key1");
        assert_eq!(table.get(b"key1"), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let mut table = Table::fixed(16).unwrap();
        table.set(b"other", b"v").unwrap();
        table.delete(b"missing");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(b"other"), Some(&b"v"[..]));
    }

    #[test]
    fn test_tombstone_does_not_break_probe_chain() {
        let mut table = Table::fixed(8).unwrap();
        let keys = colliding_keys(table.capacity() - 1, 0, 3);

        for key in &keys {
            table.set(key, b"v").unwrap();
        }
        // Delete the head of the chain; the later entries must stay
        // reachable through the tombstone.
        table.delete(&keys[0]);
        assert_eq!(table.get(&keys[1]), Some(&b"v"[..]));
        assert_eq!(table.get(&keys[2]), Some(&b"v"[..]));
    }

    #[test]
    fn test_insert_reuses_first_tombstone() {
        let mut table = Table::fixed(8).unwrap();
        let keys = colliding_keys(table.capacity() - 1, 0, 3);

        table.set(&keys[0], b"a").unwrap();
        table.set(&keys[1], b"b").unwrap();
        table.delete(&keys[0]);
        assert_eq!(tombstone_count(&table), 1);

        // The new colliding key probes past the tombstone to the empty
        // slot, then lands back in the tombstone.
        table.set(&keys[2], b"c").unwrap();
        assert_eq!(tombstone_count(&table), 0);
        assert_eq!(table.get(&keys[2]), Some(&b"c"[..]));
        assert_eq!(table.get(&keys[1]), Some(&b"b"[..]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_update_does_not_move_entry_past_tombstone() {
        let mut table = Table::fixed(8).unwrap();
        let keys = colliding_keys(table.capacity() - 1, 0, 2);

        table.set(&keys[0], b"a").unwrap();
        table.set(&keys[1], b"b").unwrap();
        table.delete(&keys[0]);

        // keys[1] still exists later in the chain; updating it must hit
        // the existing slot, not resurrect the tombstone.
        table.set(&keys[1], b"b2").unwrap();
        assert_eq!(tombstone_count(&table), 1);
        assert_eq!(table.get(&keys[1]), Some(&b"b2"[..]));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_exhaustion_drops_new_key() {
        let mut table = Table::fixed(4).unwrap();
        assert_eq!(table.capacity(), 4);

        let mut stored = Vec::new();
        let mut i = 0;
        while table.len() < table.capacity() {
            let key = format!("k{i}").into_bytes();
            table.set(&key, b"v").unwrap();
            stored.push(key);
            i += 1;
        }

        let err = table.set(b"one-too-many", b"x").unwrap_err();
        assert_eq!(err, TableError::CapacityExhausted);
        assert_eq!(table.get(b"one-too-many"), None);
        assert_eq!(table.len(), table.capacity());
        for key in &stored {
            assert_eq!(table.get(key), Some(&b"v"[..]));
        }
    }

    #[test]
    fn test_update_still_works_on_full_table() {
        let mut table = Table::fixed(4).unwrap();
        let mut i = 0;
        let mut last = Vec::new();
        while table.len() < table.capacity() {
            last = format!("k{i}").into_bytes();
            table.set(&last, b"v").unwrap();
            i += 1;
        }

        table.set(&last, b"updated").unwrap();
        assert_eq!(table.get(&last), Some(&b"updated"[..]));
        assert_eq!(table.len(), table.capacity());
    }

    #[test]
    fn test_no_empty_slot_rejects_even_with_tombstone() {
        // Only an empty slot terminates an insert scan; a table that is
        // all occupied and tombstone slots still rejects new keys.
        let mut table = Table::fixed(4).unwrap();
        let mut i = 0;
        let mut first = Vec::new();
        while table.len() < table.capacity() {
            let key = format!("k{i}").into_bytes();
            if first.is_empty() {
                first = key.clone();
            }
            table.set(&key, b"v").unwrap();
            i += 1;
        }
        table.delete(&first);

        let err = table.set(b"fresh", b"x").unwrap_err();
        assert_eq!(err, TableError::CapacityExhausted);
        assert_eq!(table.get(b"fresh"), None);
    }

    #[test]
    fn test_sized_capacity_arithmetic() {
        assert_eq!(Table::with_expected_items(1024).unwrap().capacity(), 4096);
        assert_eq!(Table::with_expected_items(3).unwrap().capacity(), 8);
        assert_eq!(Table::with_expected_items(0).unwrap().capacity(), 1);
    }

    #[test]
    fn test_fixed_rounds_to_power_of_two() {
        assert_eq!(Table::fixed(1000).unwrap().capacity(), 1024);
        assert_eq!(Table::fixed(1024).unwrap().capacity(), 1024);
        assert_eq!(Table::fixed(0).unwrap().capacity(), 1);
    }

    #[test]
    fn test_probe_wraps_around_array_end() {
        let mut table = Table::fixed(8).unwrap();
        // Two keys hashing to the last slot: the second must wrap to
        // index 0.
        let keys = colliding_keys(table.capacity() - 1, table.capacity() - 1, 2);
        table.set(&keys[0], b"a").unwrap();
        table.set(&keys[1], b"b").unwrap();
        assert_eq!(table.get(&keys[0]), Some(&b"a"[..]));
        assert_eq!(table.get(&keys[1]), Some(&b"b"[..]));
    }

    #[test]
    fn test_binary_keys_and_values() {
        let mut table = Table::fixed(16).unwrap();
        table.set(b"\x00bin\xffkey", b"\x01\x02\x00").unwrap();
        assert_eq!(table.get(b"\x00bin\xffkey"), Some(&b"\x01\x02\x00"[..]));

        table.set(b"empty-value", b"").unwrap();
        assert_eq!(table.get(b"empty-value"), Some(&b""[..]));
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x85944171f73967e8);
    }
}
