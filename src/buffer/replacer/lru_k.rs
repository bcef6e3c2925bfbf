//! LRU-K replacement policy.
//!
//! Each frame remembers the timestamps of its last K accesses. The victim is
//! the evictable frame with the largest *backward k-distance*: the time
//! since its K-th most recent access. Frames seen fewer than K times have
//! an infinite distance and are evicted first, oldest first, so one-off
//! scans cannot push out pages that are used repeatedly.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::FrameId;

/// Access history of one frame.
#[derive(Debug)]
struct FrameHistory {
    /// The last (at most K) access timestamps, oldest at the front.
    history: VecDeque<u64>,
    evictable: bool,
}

#[derive(Debug)]
struct ReplacerState {
    /// Logical clock, bumped on every recorded access.
    current_timestamp: u64,
    frames: HashMap<FrameId, FrameHistory>,
    evictable_count: usize,
}

/// LRU-K eviction policy over a fixed number of frames.
///
/// All methods take `&self`; the state sits behind its own lock so the
/// replacer can be queried independently of the buffer pool's latch.
///
/// # Example
/// ```
/// use pagecore::{FrameId, LruKReplacer};
///
/// let replacer = LruKReplacer::new(2, 2);
/// let (a, b) = (FrameId::new(0), FrameId::new(1));
///
/// replacer.record_access(a);
/// replacer.record_access(b);
/// replacer.record_access(a);
/// replacer.set_evictable(a, true);
/// replacer.set_evictable(b, true);
///
/// // B has fewer than K accesses, so its distance is infinite.
/// assert_eq!(replacer.evict(), Some(b));
/// ```
#[derive(Debug)]
pub struct LruKReplacer {
    k: usize,
    num_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Create a replacer tracking up to `num_frames` frames.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k > 0, "k must be > 0");

        Self {
            k,
            num_frames,
            state: Mutex::new(ReplacerState {
                current_timestamp: 0,
                frames: HashMap::with_capacity(num_frames),
                evictable_count: 0,
            }),
        }
    }

    /// The K in LRU-K.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Record an access to `frame_id` at the current logical time.
    ///
    /// A frame seen for the first time starts out non-evictable.
    ///
    /// # Panics
    /// Panics if `frame_id` is outside the replacer's frame range.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!(
            frame_id.0 < self.num_frames,
            "{} out of range for replacer of {} frames",
            frame_id,
            self.num_frames
        );

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let now = state.current_timestamp;

        let entry = state.frames.entry(frame_id).or_insert_with(|| FrameHistory {
            history: VecDeque::with_capacity(self.k),
            evictable: false,
        });
        if entry.history.len() == self.k {
            entry.history.pop_front();
        }
        entry.history.push_back(now);
    }

    /// Mark a frame as eligible (or not) for eviction.
    ///
    /// Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut state = self.state.lock();
        let Some(entry) = state.frames.get_mut(&frame_id) else {
            return;
        };

        if entry.evictable == evictable {
            return;
        }
        entry.evictable = evictable;
        if evictable {
            state.evictable_count += 1;
        } else {
            state.evictable_count -= 1;
        }
    }

    /// Same as `set_evictable(frame_id, false)`.
    #[inline]
    pub fn pin(&self, frame_id: FrameId) {
        self.set_evictable(frame_id, false);
    }

    /// Same as `set_evictable(frame_id, true)`.
    #[inline]
    pub fn unpin(&self, frame_id: FrameId) {
        self.set_evictable(frame_id, true);
    }

    /// Choose the frame [`evict`](Self::evict) would return, without
    /// changing any state.
    pub fn victim(&self) -> Option<FrameId> {
        let state = self.state.lock();
        self.select(&state)
    }

    /// Select a victim and forget its history.
    ///
    /// Returns `None` if no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let victim = self.select(&state)?;
        state.frames.remove(&victim);
        state.evictable_count -= 1;
        Some(victim)
    }

    /// Forget a frame's history, whatever its evictable state.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.frames.remove(&frame_id) {
            if entry.evictable {
                state.evictable_count -= 1;
            }
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }

    /// Whether `frame_id` is tracked and evictable.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.state
            .lock()
            .frames
            .get(&frame_id)
            .is_some_and(|entry| entry.evictable)
    }

    /// Maximum backward k-distance wins.
    ///
    /// With the history capped at K entries, the front timestamp is the K-th
    /// most recent access when the history is full, and the oldest access
    /// otherwise. So the ordering key is: partial histories (infinite
    /// distance) before full ones, then the smallest front timestamp.
    fn select(&self, state: &ReplacerState) -> Option<FrameId> {
        state
            .frames
            .iter()
            .filter(|(_, entry)| entry.evictable)
            .min_by_key(|(frame_id, entry)| {
                let full = entry.history.len() >= self.k;
                let oldest = entry.history.front().copied().unwrap_or(0);
                (full, oldest, **frame_id)
            })
            .map(|(frame_id, _)| *frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fid(n: usize) -> FrameId {
        FrameId::new(n)
    }

    #[test]
    fn test_empty_replacer() {
        let replacer = LruKReplacer::new(2, 4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_new_frames_are_not_evictable() {
        let replacer = LruKReplacer::new(2, 4);
        replacer.record_access(fid(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_frequent_frame_survives() {
        let replacer = LruKReplacer::new(2, 2);
        let (a, b) = (fid(0), fid(1));

        replacer.record_access(a);
        replacer.record_access(b);
        replacer.record_access(a);
        replacer.set_evictable(a, true);
        replacer.set_evictable(b, true);

        assert_eq!(replacer.evict(), Some(b));
        assert_eq!(replacer.evict(), Some(a));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_ties_break_on_oldest_access() {
        let replacer = LruKReplacer::new(3, 4);
        for n in [2, 0, 1] {
            replacer.record_access(fid(n));
        }
        for n in 0..3 {
            replacer.unpin(fid(n));
        }

        assert_eq!(replacer.evict(), Some(fid(2)));
        assert_eq!(replacer.evict(), Some(fid(0)));
        assert_eq!(replacer.evict(), Some(fid(1)));
    }

    #[test]
    fn test_finite_distance_uses_kth_most_recent_access() {
        let replacer = LruKReplacer::new(2, 3);
        // Timestamps: a=1, b=2, a=3, b=4, a=5 -> a keeps [3,5], b keeps [2,4].
        for n in [0, 1, 0, 1, 0] {
            replacer.record_access(fid(n));
        }
        replacer.unpin(fid(0));
        replacer.unpin(fid(1));

        // b's 2nd most recent access (2) is older than a's (3).
        assert_eq!(replacer.evict(), Some(fid(1)));
    }

    #[test]
    fn test_bustub_sequence() {
        let replacer = LruKReplacer::new(2, 7);

        // Frames 1..=6 get one access each; 1 gets a second one.
        for n in 1..=6 {
            replacer.record_access(fid(n));
        }
        for n in 1..=5 {
            replacer.set_evictable(fid(n), true);
        }
        replacer.set_evictable(fid(6), false);
        assert_eq!(replacer.size(), 5);
        replacer.record_access(fid(1));

        // Infinite-distance frames go first, oldest first.
        assert_eq!(replacer.evict(), Some(fid(2)));
        assert_eq!(replacer.evict(), Some(fid(3)));
        assert_eq!(replacer.evict(), Some(fid(4)));
        assert_eq!(replacer.size(), 2);

        // 3 and 4 come back; 5 gets a second access.
        replacer.record_access(fid(3));
        replacer.record_access(fid(4));
        replacer.record_access(fid(5));
        replacer.record_access(fid(4));
        replacer.set_evictable(fid(3), true);
        replacer.set_evictable(fid(4), true);
        assert_eq!(replacer.size(), 4);

        // 3 has a single access: infinite distance.
        assert_eq!(replacer.evict(), Some(fid(3)));
        assert_eq!(replacer.size(), 3);

        // 6 becomes evictable with a single access.
        replacer.set_evictable(fid(6), true);
        assert_eq!(replacer.size(), 4);
        assert_eq!(replacer.evict(), Some(fid(6)));
        assert_eq!(replacer.size(), 3);

        // Remaining full histories: 1=[1,7], 5=[5,10], 4=[9,11].
        replacer.set_evictable(fid(1), false);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(fid(5)));
        assert_eq!(replacer.size(), 1);

        replacer.record_access(fid(1));
        replacer.record_access(fid(1));
        replacer.set_evictable(fid(1), true);
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.evict(), Some(fid(4)));
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_victim_does_not_remove() {
        let replacer = LruKReplacer::new(2, 2);
        replacer.record_access(fid(0));
        replacer.unpin(fid(0));

        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(fid(0)));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_evicted_frame_starts_fresh() {
        let replacer = LruKReplacer::new(2, 2);
        let (a, b) = (fid(0), fid(1));

        replacer.record_access(a);
        replacer.record_access(a);
        replacer.unpin(a);
        assert_eq!(replacer.evict(), Some(a));

        // a returns with a single access, b has two: a is the victim again.
        replacer.record_access(b);
        replacer.record_access(b);
        replacer.record_access(a);
        replacer.unpin(a);
        replacer.unpin(b);
        assert_eq!(replacer.evict(), Some(a));
    }

    #[test]
    fn test_remove_and_set_evictable_are_idempotent() {
        let replacer = LruKReplacer::new(2, 3);
        replacer.record_access(fid(0));
        replacer.record_access(fid(1));

        replacer.unpin(fid(0));
        replacer.unpin(fid(0));
        assert_eq!(replacer.size(), 1);

        replacer.pin(fid(0));
        replacer.pin(fid(0));
        assert_eq!(replacer.size(), 0);

        replacer.unpin(fid(1));
        replacer.remove(fid(1));
        replacer.remove(fid(1));
        assert_eq!(replacer.size(), 0);
        assert!(!replacer.is_evictable(fid(1)));

        // Untracked frames are ignored.
        replacer.unpin(fid(2));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_record_access_out_of_range() {
        let replacer = LruKReplacer::new(2, 2);
        replacer.record_access(fid(2));
    }

    proptest! {
        /// The victim always has the maximum backward k-distance among the
        /// evictable frames.
        #[test]
        fn prop_victim_has_max_backward_distance(
            k in 1usize..4,
            accesses in prop::collection::vec(0usize..6, 1..60),
            evictable_mask in any::<u8>(),
        ) {
            let replacer = LruKReplacer::new(k, 6);
            let mut histories: HashMap<usize, Vec<u64>> = HashMap::new();
            for (t, &frame) in accesses.iter().enumerate() {
                replacer.record_access(fid(frame));
                histories.entry(frame).or_default().push(t as u64 + 1);
            }

            let mut candidates = Vec::new();
            for &frame in histories.keys() {
                if evictable_mask & (1 << frame) != 0 {
                    replacer.unpin(fid(frame));
                    candidates.push(frame);
                }
            }
            prop_assert_eq!(replacer.size(), candidates.len());

            let now = accesses.len() as u64 + 1;
            let distance = |frame: usize| -> (u64, u64) {
                let history = &histories[&frame];
                if history.len() < k {
                    (u64::MAX, now - history[0])
                } else {
                    (now - history[history.len() - k], 0)
                }
            };

            match replacer.evict() {
                None => prop_assert!(candidates.is_empty()),
                Some(victim) => {
                    prop_assert!(candidates.contains(&victim.0));
                    let best = candidates.iter().map(|&f| distance(f)).max();
                    prop_assert_eq!(Some(distance(victim.0)), best);
                }
            }
        }
    }
}
