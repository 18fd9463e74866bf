use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use castor_core::repr::Move;

use crate::score::Eval;

const BYTES_IN_MIB: usize = 1 << 20;

/// The largest storable search depth; six bits in the node payload.
pub const MAX_DEPTH: u8 = (1 << 6) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a stored evaluation relates to the true score of its position.
pub enum Bound {
    /// The search window contained the score; it is exact.
    Exact,
    /// The score beat the window; the true score is at least this.
    Lower,
    /// The score fell below the window; the true score is at most this.
    Upper,
}

#[derive(Debug, Clone, Copy)]
/// The unpacked payload of a table node.
pub struct NodeData {
    pub eval: Eval,
    pub best_move: Move,
    pub depth: u8,
    pub bound: Bound,
    pub generation: u8,
    pub in_use: bool,
}

impl NodeData {
    // Payload layout: eval (32) | best_move (16) | depth (6) | bound (2) |
    // generation (7) | in_use (1).
    fn pack(self) -> u64 {
        self.eval as u32 as u64
            | (self.best_move.as_bits() as u64) << 32
            | (self.depth.min(MAX_DEPTH) as u64) << 48
            | (self.bound as u64) << 54
            | ((self.generation & 0x7F) as u64) << 56
            | (self.in_use as u64) << 63
    }

    fn unpack(bits: u64) -> Self {
        Self {
            eval: bits as u32 as i32,
            best_move: Move::from_bits((bits >> 32) as u16),
            depth: (bits >> 48 & 0x3F) as u8,
            bound: match bits >> 54 & 0b11 {
                0 => Bound::Exact,
                1 => Bound::Lower,
                _ => Bound::Upper,
            },
            generation: (bits >> 56 & 0x7F) as u8,
            in_use: bits >> 63 != 0,
        }
    }

    /// The replacement ordering: stale generations go first, then shallow
    /// searches.
    fn is_worse_than(&self, other: &Self) -> bool {
        if self.generation != other.generation {
            self.generation < other.generation
        } else {
            self.depth < other.depth
        }
    }
}

/// One table slot. The key word holds the full position hash (zero marks an
/// empty slot); the data word holds the packed payload and is published with
/// a single store, so a reader sees either the old or the new payload in
/// full. All accesses are relaxed; a reader that observes `in_use` treats
/// the payload as absent.
#[derive(Default)]
struct Node {
    key: AtomicU64,
    data: AtomicU64,
}

const NODES_IN_BUCKET: usize = 4;

/// A cache-line-sized group of four nodes; lookup within it is a linear
/// scan.
#[derive(Default)]
#[repr(align(64))]
struct Bucket([Node; NODES_IN_BUCKET]);

/// A fixed-capacity concurrent map from position hashes to search results,
/// with depth-preferred replacement and generation aging.
pub struct TranspositionTable {
    buckets: Box<[Bucket]>,
    generation: AtomicU64,
    filled: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation {
    Hit,
    Empty,
    Replace,
}

/// A scoped reservation of one node. Writes accumulate in a buffer and only
/// [`Writer::flush`] publishes them; a writer that goes away without
/// flushing restores the node it found.
pub struct Writer<'a> {
    node: &'a Node,
    table: &'a TranspositionTable,
    original_key: u64,
    original_data: u64,
    buffer: NodeData,
    reservation: Reservation,
    dirty: bool,
    finished: bool,
}

impl<'a> Writer<'a> {
    fn reserve(table: &'a TranspositionTable, node: &'a Node, hash: u64) -> Self {
        let original_key = node.key.load(Ordering::Relaxed);
        let original_data = node.data.load(Ordering::Relaxed);

        let reservation = if original_key == 0 {
            Reservation::Empty
        } else if original_key == hash {
            Reservation::Hit
        } else {
            Reservation::Replace
        };

        // Claim the slot before anything else: deeper recursion into the
        // same position sees the reservation and knows the payload is
        // tentative.
        node.data.store(original_data | 1 << 63, Ordering::Relaxed);
        node.key.store(hash, Ordering::Relaxed);

        let mut buffer = NodeData::unpack(original_data);
        buffer.generation = table.generation();
        buffer.in_use = false;

        Self {
            node,
            table,
            original_key,
            original_data,
            buffer,
            reservation,
            dirty: false,
            finished: false,
        }
    }

    /// Whether the node already held this position with a committed (not
    /// merely reserved) payload.
    pub fn is_hit(&self) -> bool {
        self.reservation == Reservation::Hit && !NodeData::unpack(self.original_data).in_use
    }

    pub fn was_empty(&self) -> bool {
        self.reservation == Reservation::Empty
    }

    /// The previously stored bound and evaluation. Only meaningful after
    /// [`Writer::is_hit`] returned true.
    pub fn original_eval(&self) -> (Bound, Eval) {
        debug_assert!(self.is_hit());

        let original = NodeData::unpack(self.original_data);

        (original.bound, original.eval)
    }

    pub fn original_move(&self) -> Move {
        debug_assert!(self.is_hit());

        NodeData::unpack(self.original_data).best_move
    }

    pub fn original_depth(&self) -> u8 {
        debug_assert!(self.is_hit());

        NodeData::unpack(self.original_data).depth
    }

    /// Stages a depth-zero exact entry holding a static evaluation.
    pub fn write_static_eval(&mut self, eval: Eval) {
        self.buffer.eval = eval;
        self.buffer.bound = Bound::Exact;
        self.buffer.depth = 0;
        self.dirty = true;
    }

    /// Stages a full search result.
    pub fn write_eval(&mut self, bound: Bound, depth: u8, eval: Eval, best_move: Move) {
        self.buffer.bound = bound;
        self.buffer.depth = depth;
        self.buffer.eval = eval;
        self.buffer.best_move = best_move;
        self.dirty = true;
    }

    /// Stages a refresh of the node's generation, leaving the payload as it
    /// was. Used when a hit is served without re-searching.
    pub fn update_generation(&mut self) {
        self.dirty = true;
    }

    /// Publishes the staged payload in a single store and releases the
    /// reservation.
    pub fn flush(&mut self) {
        self.node.data.store(self.buffer.pack(), Ordering::Relaxed);
        self.finished = true;

        if self.reservation == Reservation::Empty {
            self.table.filled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Discards the staged payload, restoring the node to what the
    /// reservation found.
    pub fn abort(&mut self) {
        self.node.key.store(self.original_key, Ordering::Relaxed);
        self.node.data.store(self.original_data, Ordering::Relaxed);
        self.finished = true;
    }
}

impl Drop for Writer<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        if self.dirty {
            tracing::debug!("table writer dropped with staged writes; discarding them");
        }

        self.node.key.store(self.original_key, Ordering::Relaxed);
        self.node.data.store(self.original_data, Ordering::Relaxed);
    }
}

impl TranspositionTable {
    /// Allocates a table of the given size; every slot starts empty.
    pub fn new(size_mib: usize) -> Self {
        let num_buckets = (size_mib * BYTES_IN_MIB / std::mem::size_of::<Bucket>()).max(1);

        Self {
            buckets: (0..num_buckets).map(|_| Bucket::default()).collect(),
            generation: AtomicU64::new(0),
            filled: AtomicUsize::new(0),
        }
    }

    pub fn size_mib(&self) -> usize {
        self.buckets.len() * std::mem::size_of::<Bucket>() / BYTES_IN_MIB
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len() * NODES_IN_BUCKET
    }

    fn bucket(&self, hash: u64) -> &Bucket {
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    /// The current aging generation. Bumped once per iterative-deepening
    /// step; wraps within its seven payload bits.
    pub fn generation(&self) -> u8 {
        (self.generation.load(Ordering::Relaxed) & 0x7F) as u8
    }

    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Finds the committed or tentative entry for `hash`, if present.
    pub fn lookup(&self, hash: u64) -> Option<NodeData> {
        self.bucket(hash)
            .0
            .iter()
            .find(|node| node.key.load(Ordering::Relaxed) == hash)
            .map(|node| NodeData::unpack(node.data.load(Ordering::Relaxed)))
    }

    /// Reserves a node for `hash` and returns a writer over it. An existing
    /// entry with this hash is reused; otherwise an empty slot, then the
    /// worst non-reserved slot, is taken. With every slot of the bucket
    /// reserved by the callstack above, one is overwritten anyway and the
    /// deeper result is lost.
    pub fn reserve(&self, hash: u64) -> Writer<'_> {
        let bucket = self.bucket(hash);

        if let Some(node) = bucket
            .0
            .iter()
            .find(|node| node.key.load(Ordering::Relaxed) == hash)
        {
            return Writer::reserve(self, node, hash);
        }

        if let Some(node) = bucket
            .0
            .iter()
            .find(|node| node.key.load(Ordering::Relaxed) == 0)
        {
            return Writer::reserve(self, node, hash);
        }

        let mut victim: Option<(&Node, NodeData)> = None;

        for node in &bucket.0 {
            let data = NodeData::unpack(node.data.load(Ordering::Relaxed));

            if data.in_use {
                continue;
            }

            match victim {
                Some((_, best)) if !data.is_worse_than(&best) => {}
                _ => victim = Some((node, data)),
            }
        }

        match victim {
            Some((node, _)) => Writer::reserve(self, node, hash),
            None => {
                tracing::warn!(hash, "bucket fully reserved; overwriting an in-use entry");

                Writer::reserve(self, &bucket.0[0], hash)
            }
        }
    }

    /// Zeroes every slot.
    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            for node in &bucket.0 {
                node.key.store(0, Ordering::Relaxed);
                node.data.store(0, Ordering::Relaxed);
            }
        }

        self.filled.store(0, Ordering::Relaxed);
        self.generation.store(0, Ordering::Relaxed);
    }

    /// How full the table is, in permille of its capacity, from the
    /// incrementally maintained fill counter.
    pub fn fill_permille(&self) -> u32 {
        (self.filled.load(Ordering::Relaxed) * 1000 / self.capacity()) as u32
    }

    /// Counts the non-empty slots by scanning the whole table.
    pub fn calculate_num_full(&self) -> usize {
        self.buckets
            .iter()
            .flat_map(|bucket| &bucket.0)
            .filter(|node| node.key.load(Ordering::Relaxed) != 0)
            .count()
    }

    /// Builds a resized copy holding every non-empty node of this table.
    /// Not a concurrent operation; the caller quiesces searches and swaps
    /// tables. Shrinking can overfill a destination bucket, in which case
    /// its worst node is dropped.
    pub fn resized(&self, size_mib: usize) -> Self {
        let resized = Self::new(size_mib);
        resized
            .generation
            .store(self.generation.load(Ordering::Relaxed), Ordering::Relaxed);

        for bucket in self.buckets.iter() {
            for node in &bucket.0 {
                let key = node.key.load(Ordering::Relaxed);

                if key == 0 {
                    continue;
                }

                let data = node.data.load(Ordering::Relaxed);
                let target_bucket = resized.bucket(key);

                let slot = match target_bucket
                    .0
                    .iter()
                    .find(|slot| slot.key.load(Ordering::Relaxed) == 0)
                {
                    Some(slot) => {
                        resized.filled.fetch_add(1, Ordering::Relaxed);

                        slot
                    }
                    None => {
                        tracing::warn!(key, "bucket overflow while resizing; evicting");

                        target_bucket
                            .0
                            .iter()
                            .min_by_key(|slot| {
                                let data =
                                    NodeData::unpack(slot.data.load(Ordering::Relaxed));

                                (data.generation, data.depth)
                            })
                            .unwrap()
                    }
                };

                slot.key.store(key, Ordering::Relaxed);
                slot.data.store(data, Ordering::Relaxed);
            }
        }

        resized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hashes that all land in bucket zero of a one-MiB table.
    fn colliding_hashes(table: &TranspositionTable, count: usize) -> Vec<u64> {
        (1..=count as u64)
            .map(|index| index * table.buckets.len() as u64)
            .collect()
    }

    fn committed(table: &TranspositionTable, hash: u64, depth: u8, eval: Eval) {
        let mut writer = table.reserve(hash);
        writer.write_eval(Bound::Exact, depth, eval, Move::NULL);
        writer.flush();
    }

    #[test]
    fn payloads_survive_packing() {
        let data = NodeData {
            eval: -123_456,
            best_move: Move::from_bits(0xBEEF),
            depth: 17,
            bound: Bound::Upper,
            generation: 99,
            in_use: true,
        };

        let unpacked = NodeData::unpack(data.pack());

        assert_eq!(unpacked.eval, data.eval);
        assert_eq!(unpacked.best_move, data.best_move);
        assert_eq!(unpacked.depth, data.depth);
        assert_eq!(unpacked.bound, data.bound);
        assert_eq!(unpacked.generation, data.generation & 0x7F);
        assert!(unpacked.in_use);
    }

    #[test]
    fn buckets_are_cache_line_sized() {
        assert_eq!(std::mem::size_of::<Bucket>(), 64);
    }

    #[test]
    fn committed_nodes_in_one_bucket_are_all_retrievable() {
        let table = TranspositionTable::new(1);

        for (index, hash) in colliding_hashes(&table, 4).into_iter().enumerate() {
            committed(&table, hash, index as u8, index as Eval * 100);
        }

        for (index, hash) in colliding_hashes(&table, 4).into_iter().enumerate() {
            let node = table.lookup(hash).unwrap();

            assert_eq!(node.eval, index as Eval * 100);
            assert_eq!(node.depth, index as u8);
            assert!(!node.in_use);
        }

        assert_eq!(table.calculate_num_full(), 4);
    }

    #[test]
    fn replacement_picks_the_shallowest_entry() {
        let table = TranspositionTable::new(1);
        let hashes = colliding_hashes(&table, 5);

        committed(&table, hashes[0], 9, 0);
        committed(&table, hashes[1], 3, 0);
        committed(&table, hashes[2], 7, 0);
        committed(&table, hashes[3], 5, 0);

        // A fifth hash in the same generation must evict the depth-3 entry.
        committed(&table, hashes[4], 1, 0);

        assert!(table.lookup(hashes[1]).is_none());
        assert!(table.lookup(hashes[0]).is_some());
        assert!(table.lookup(hashes[4]).is_some());
    }

    #[test]
    fn reservation_reuses_the_matching_slot() {
        let table = TranspositionTable::new(1);
        let hashes = colliding_hashes(&table, 4);

        for &hash in &hashes {
            committed(&table, hash, 10, 42);
        }

        // Re-reserving a stored hash must not evict anything else.
        let mut writer = table.reserve(hashes[2]);
        assert!(writer.is_hit());
        assert_eq!(writer.original_depth(), 10);
        writer.write_eval(Bound::Exact, 12, 7, Move::NULL);
        writer.flush();

        for &hash in &hashes {
            assert!(table.lookup(hash).is_some());
        }

        assert_eq!(table.lookup(hashes[2]).unwrap().depth, 12);
    }

    #[test]
    fn aborting_restores_the_previous_entry() {
        let table = TranspositionTable::new(1);

        committed(&table, 1234, 8, 500);

        let mut writer = table.reserve(1234);
        writer.write_eval(Bound::Lower, 9, -1, Move::NULL);
        writer.abort();

        let node = table.lookup(1234).unwrap();
        assert_eq!(node.eval, 500);
        assert_eq!(node.depth, 8);
        assert!(!node.in_use);
    }

    #[test]
    fn dropping_an_unflushed_writer_restores_the_slot() {
        let table = TranspositionTable::new(1);

        {
            let mut writer = table.reserve(99);
            writer.write_static_eval(123);
            // No flush.
        }

        assert!(table.lookup(99).is_none());
        assert_eq!(table.calculate_num_full(), 0);
    }

    #[test]
    fn reservations_are_visible_as_in_use() {
        let table = TranspositionTable::new(1);

        let writer = table.reserve(4321);
        let node = table.lookup(4321).unwrap();

        assert!(node.in_use);
        drop(writer);

        assert!(table.lookup(4321).is_none());
    }

    #[test]
    fn resizing_preserves_the_fill() {
        let table = TranspositionTable::new(1);

        for hash in [3u64, 55, 1_000_003, 77_777_777, 987_654_321] {
            committed(&table, hash, 4, 10);
        }

        let before = table.calculate_num_full();
        let grown = table.resized(20);

        assert_eq!(grown.calculate_num_full(), before);
        assert_eq!(grown.size_mib(), 20);

        for hash in [3u64, 55, 1_000_003, 77_777_777, 987_654_321] {
            assert_eq!(grown.lookup(hash).unwrap().depth, 4);
        }
    }

    #[test]
    fn clearing_empties_every_slot() {
        let table = TranspositionTable::new(1);

        committed(&table, 10, 1, 1);
        committed(&table, 20, 2, 2);
        table.clear();

        assert_eq!(table.calculate_num_full(), 0);
        assert_eq!(table.fill_permille(), 0);
        assert!(table.lookup(10).is_none());
    }
}
