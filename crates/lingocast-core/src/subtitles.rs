use std::collections::VecDeque;

pub const DEFAULT_TRANSCRIPT_LINES: usize = 10;

/// Scrolling transcript of the most recent translated lines.
#[derive(Debug, Clone)]
pub struct SubtitleLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl SubtitleLog {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    pub fn reset(&mut self) {
        self.lines.clear();
    }

    /// Oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SubtitleLog {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSCRIPT_LINES)
    }
}
