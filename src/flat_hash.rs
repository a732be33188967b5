//! Fixed-capacity open-addressed hash map for integral keys.
//!
//! The book's level and order indexes live inside a monotonic arena, so the
//! tables must never grow: a rehash into a larger allocation would leave the
//! old table stranded in the region. Instead the map is sized once, probes
//! linearly, marks erasures with tombstones, and compacts tombstones by
//! rehashing in place at the same capacity. Running out of room after a
//! compaction means the table was mis-sized for the workload and is a fatal
//! configuration bug.

use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use crate::arena::Arena;

/// Integral key hashed with a MurmurHash3 finalizer.
///
/// The finalizers are fully deterministic, a requirement for replayable
/// simulations; no per-process hash seeding.
pub trait FlatKey: Copy + Eq {
    fn hash(self) -> usize;
}

impl FlatKey for u64 {
    #[inline]
    fn hash(self) -> usize {
        let mut x = self;
        x ^= x >> 33;
        x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
        x ^= x >> 33;
        x = x.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
        x ^= x >> 33;
        x as usize
    }
}

impl FlatKey for i64 {
    #[inline]
    fn hash(self) -> usize {
        (self as u64).hash()
    }
}

impl FlatKey for u32 {
    #[inline]
    fn hash(self) -> usize {
        let mut x = self;
        x ^= x >> 16;
        x = x.wrapping_mul(0x7FEB_352D);
        x ^= x >> 15;
        x = x.wrapping_mul(0x846C_A68B);
        x ^= x >> 16;
        x as usize
    }
}

impl FlatKey for i32 {
    #[inline]
    fn hash(self) -> usize {
        (self as u32).hash()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
enum Slot {
    Empty = 0,
    Filled = 1,
    Tomb = 2,
}

struct Entry<K, V> {
    state: Slot,
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
}

/// Open-addressed, linear-probe map from integral key to POD value.
///
/// Table and compaction scratch are both allocated from the arena up front;
/// the map never allocates afterwards.
pub struct FlatHashMap<'a, K: FlatKey, V: Copy> {
    table: NonNull<Entry<K, V>>,
    scratch: NonNull<Entry<K, V>>,
    mask: usize,
    size: usize,
    tombs: usize,
    _arena: PhantomData<&'a Arena>,
}

impl<'a, K: FlatKey, V: Copy> FlatHashMap<'a, K, V> {
    /// Build a map with room for `capacity` entries, rounded up to a power
    /// of two (minimum 8).
    pub fn new(arena: &'a Arena, capacity: usize) -> Self {
        let cap = capacity.max(8).next_power_of_two();
        let table = arena.alloc_array::<Entry<K, V>>(cap);
        let scratch = arena.alloc_array::<Entry<K, V>>(cap);
        // Safety: both blocks hold `cap` entries; only the state field is
        // initialized here, key/value stay uninit until a slot is filled.
        unsafe {
            for i in 0..cap {
                (*table.as_ptr().add(i)).state = Slot::Empty;
                (*scratch.as_ptr().add(i)).state = Slot::Empty;
            }
        }
        Self {
            table,
            scratch,
            mask: cap - 1,
            size: 0,
            tombs: 0,
            _arena: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn tombs(&self) -> usize {
        self.tombs
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    fn entry(&self, i: usize) -> &Entry<K, V> {
        debug_assert!(i <= self.mask);
        // Safety: i is within the table and states are always initialized.
        unsafe { &*self.table.as_ptr().add(i) }
    }

    #[inline]
    fn entry_mut(&mut self, i: usize) -> &mut Entry<K, V> {
        debug_assert!(i <= self.mask);
        // Safety: as above; &mut self is exclusive.
        unsafe { &mut *self.table.as_ptr().add(i) }
    }

    fn find_index(&self, key: K) -> Option<usize> {
        let mut idx = key.hash() & self.mask;
        loop {
            let e = self.entry(idx);
            match e.state {
                Slot::Empty => return None,
                // Safety: Filled entries have an initialized key.
                Slot::Filled if unsafe { e.key.assume_init() } == key => return Some(idx),
                _ => idx = (idx + 1) & self.mask,
            }
        }
    }

    /// Look up `key`, copying the value out.
    #[inline]
    pub fn get(&self, key: K) -> Option<V> {
        // Safety: Filled entries have an initialized value.
        self.find_index(key)
            .map(|i| unsafe { self.entry(i).value.assume_init() })
    }

    /// Look up `key`, returning a mutable reference to the value.
    #[inline]
    pub fn find_mut(&mut self, key: K) -> Option<&mut V> {
        let idx = self.find_index(key)?;
        // Safety: Filled entries have an initialized value.
        Some(unsafe { self.entry_mut(idx).value.assume_init_mut() })
    }

    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.find_index(key).is_some()
    }

    /// Insert `key → value`. Returns `false` without updating if the key is
    /// already present.
    ///
    /// # Panics
    ///
    /// Panics if the table is still at or beyond 80 % occupancy after
    /// tombstone compaction — the table is mis-sized for the workload.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.maybe_compact();
        let cap = self.mask + 1;
        if (self.size + self.tombs) * 10 >= cap * 8 {
            self.die_capacity();
        }

        let mut idx = key.hash() & self.mask;
        let mut first_tomb = None;
        loop {
            match self.entry(idx).state {
                Slot::Empty => {
                    let ins = first_tomb.unwrap_or(idx);
                    let dst = self.entry_mut(ins);
                    dst.key = MaybeUninit::new(key);
                    dst.value = MaybeUninit::new(value);
                    dst.state = Slot::Filled;
                    self.size += 1;
                    if first_tomb.is_some() {
                        self.tombs -= 1;
                    }
                    return true;
                }
                Slot::Tomb => {
                    if first_tomb.is_none() {
                        first_tomb = Some(idx);
                    }
                    idx = (idx + 1) & self.mask;
                }
                // Safety: Filled entries have an initialized key.
                Slot::Filled if unsafe { self.entry(idx).key.assume_init() } == key => {
                    return false;
                }
                Slot::Filled => idx = (idx + 1) & self.mask,
            }
        }
    }

    /// Mark the entry for `key` as a tombstone. Returns `false` if absent.
    pub fn erase(&mut self, key: K) -> bool {
        match self.find_index(key) {
            Some(idx) => {
                self.entry_mut(idx).state = Slot::Tomb;
                self.size -= 1;
                self.tombs += 1;
                true
            }
            None => false,
        }
    }

    /// Rehash in place when tombstones have degraded probing. Triggers
    /// purely on counts, keeping behavior deterministic.
    fn maybe_compact(&mut self) {
        if self.tombs == 0 {
            return;
        }
        let cap = self.mask + 1;
        if self.tombs > cap / 4 || (self.size + self.tombs) * 10 >= cap * 7 {
            self.rehash_same_capacity();
        }
    }

    fn rehash_same_capacity(&mut self) {
        let cap = self.mask + 1;
        // Safety: scratch holds `cap` entries; every source entry read is
        // Filled and therefore fully initialized.
        unsafe {
            for i in 0..cap {
                (*self.scratch.as_ptr().add(i)).state = Slot::Empty;
            }
            let mut new_size = 0;
            for i in 0..cap {
                let src = &*self.table.as_ptr().add(i);
                if src.state != Slot::Filled {
                    continue;
                }
                let key = src.key.assume_init();
                let mut idx = key.hash() & self.mask;
                loop {
                    let dst = &mut *self.scratch.as_ptr().add(idx);
                    if dst.state == Slot::Empty {
                        dst.key = MaybeUninit::new(key);
                        dst.value = MaybeUninit::new(src.value.assume_init());
                        dst.state = Slot::Filled;
                        new_size += 1;
                        break;
                    }
                    idx = (idx + 1) & self.mask;
                }
            }
            std::mem::swap(&mut self.table, &mut self.scratch);
            self.size = new_size;
            self.tombs = 0;
        }
        if (self.size + self.tombs) * 10 >= cap * 8 {
            self.die_capacity();
        }
    }

    #[cold]
    fn die_capacity(&self) -> ! {
        panic!(
            "flat hash table mis-sized for workload: size={} tombs={} cap={} (80% threshold)",
            self.size,
            self.tombs,
            self.mask + 1
        );
    }
}
