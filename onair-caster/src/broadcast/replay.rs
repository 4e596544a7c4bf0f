//! Replay buffer: the last N chunks broadcast, oldest evicted first

use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct ReplayBuffer {
    chunks: VecDeque<Bytes>,
    capacity: usize,
    bytes: usize,
}

impl ReplayBuffer {
    /// A capacity of zero disables replay
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
            bytes: 0,
        }
    }

    pub fn push(&mut self, chunk: Bytes) {
        if self.capacity == 0 {
            return;
        }
        while self.chunks.len() >= self.capacity {
            if let Some(evicted) = self.chunks.pop_front() {
                self.bytes -= evicted.len();
            }
        }
        self.bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total payload bytes currently held
    pub fn byte_len(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut replay = ReplayBuffer::new(3);
        for n in 1..=5u8 {
            replay.push(Bytes::from(vec![n]));
        }

        let held: Vec<u8> = replay.iter().map(|c| c[0]).collect();
        assert_eq!(held, vec![3, 4, 5]);
        assert_eq!(replay.len(), 3);
        assert_eq!(replay.byte_len(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut replay = ReplayBuffer::new(0);
        replay.push(Bytes::from_static(b"abc"));
        assert!(replay.is_empty());
        assert_eq!(replay.byte_len(), 0);
    }
}
