use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::lock;

/// Bounded byte buffer that keeps only the most recent `cap` bytes.
#[derive(Debug)]
pub struct RingBytes {
    inner: Mutex<VecDeque<u8>>,
    cap: usize,
}

impl RingBytes {
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        })
    }

    pub fn push(&self, data: &[u8]) {
        if self.cap == 0 {
            return;
        }
        let mut g = lock(&self.inner);
        let data = if data.len() > self.cap {
            &data[data.len() - self.cap..]
        } else {
            data
        };
        let overflow = g.len().saturating_add(data.len()).saturating_sub(self.cap);
        if overflow > 0 {
            g.drain(..overflow);
        }
        g.extend(data);
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let g = lock(&self.inner);
        let mut vec = Vec::with_capacity(g.len());
        vec.extend(g.iter().copied());
        vec
    }

    /// Retained bytes as text; a code point cut by eviction is replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }
}
