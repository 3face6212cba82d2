use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// History of access timestamps (most recent at back), at most k entries
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently evictable
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Records an access at the given timestamp
    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from `now`.
    /// Returns None if this frame has fewer than k accesses (meaning +inf distance)
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            // With the history capped at k, the front is the kth most recent access
            Some(now - self.history[self.history.len() - k])
        }
    }

    /// Returns the earliest retained access timestamp
    fn earliest_timestamp(&self) -> Timestamp {
        self.history.front().copied().unwrap_or(Timestamp::MAX)
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    nodes: HashMap<FrameId, LruKNode>,
    /// Logical clock, advanced by every replacer call
    current_timestamp: Timestamp,
    /// Number of evictable frames
    curr_size: usize,
}

impl ReplacerState {
    fn tick(&mut self) -> Timestamp {
        let ts = self.current_timestamp;
        self.current_timestamp += 1;
        ts
    }
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts a frame whose backward k-distance is the maximum
/// of all frames in the replacer. Backward k-distance is computed as the difference
/// in time between the current timestamp and the timestamp of kth previous access.
///
/// A frame with fewer than k historical accesses is given +inf as its backward k-distance.
/// If multiple frames have +inf backward k-distance, the replacer evicts the frame
/// with the earliest overall timestamp.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    fn check_frame(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.max_frames,
            "{} out of range for replacer of {} frames",
            frame_id,
            self.max_frames
        );
    }

    /// Evicts the evictable frame with the largest backward k-distance and forgets its history.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let now = state.tick();

        if state.curr_size == 0 {
            return None;
        }

        // +inf frames beat finite ones; among +inf the earliest first access goes,
        // among finite the largest distance goes
        let mut victim: Option<(FrameId, Option<Timestamp>, Timestamp)> = None;

        for (&frame_id, node) in state.nodes.iter() {
            if !node.is_evictable {
                continue;
            }

            let k_dist = node.k_distance(now, self.k);
            let earliest = node.earliest_timestamp();

            let better = match victim {
                None => true,
                Some((_, v_dist, v_earliest)) => match (v_dist, k_dist) {
                    (None, Some(_)) => false,
                    (Some(_), None) => true,
                    (None, None) => earliest < v_earliest,
                    (Some(v), Some(c)) => c > v,
                },
            };

            if better {
                victim = Some((frame_id, k_dist, earliest));
            }
        }

        let (frame_id, _, _) = victim?;
        state.nodes.remove(&frame_id);
        state.curr_size -= 1;
        Some(frame_id)
    }

    /// Records that the given frame was accessed at the current timestamp.
    pub fn record_access(&self, frame_id: FrameId) {
        self.check_frame(frame_id);

        let mut state = self.state.lock();
        let ts = state.tick();
        state
            .nodes
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(ts, self.k);
    }

    /// Sets whether a frame is evictable. Frames with no recorded access are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        self.check_frame(frame_id);

        let mut state = self.state.lock();
        state.tick();

        let delta = match state.nodes.get_mut(&frame_id) {
            Some(node) if node.is_evictable != is_evictable => {
                node.is_evictable = is_evictable;
                if is_evictable {
                    1isize
                } else {
                    -1
                }
            }
            _ => 0,
        };

        state.curr_size = state.curr_size.wrapping_add_signed(delta);
    }

    /// Removes an evictable frame and its history from the replacer.
    ///
    /// # Panics
    /// Panics if the frame is tracked but not evictable.
    pub fn remove(&self, frame_id: FrameId) {
        self.check_frame(frame_id);

        let mut state = self.state.lock();
        state.tick();

        if let Some(node) = state.nodes.get(&frame_id) {
            assert!(
                node.is_evictable,
                "cannot remove non-evictable {} from replacer",
                frame_id
            );
            state.nodes.remove(&frame_id);
            state.curr_size -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
