// src/hub/buffer.rs

/// Per-process output buffer with a byte budget.
///
/// On overflow the oldest text is dropped: at least a fifth of the budget,
/// and at least enough to get back under it. The cut is moved forward to
/// the next UTF-8 character boundary, so the buffer always holds valid text
/// and its length never exceeds the budget once `append` returns.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    text: String,
    cap: usize,
}

impl LogBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            text: String::new(),
            cap,
        }
    }

    /// Append a chunk, trimming old content if needed.
    ///
    /// Returns how many bytes were dropped from the front.
    pub fn append(&mut self, chunk: &str) -> usize {
        self.text.push_str(chunk);
        if self.text.len() <= self.cap {
            return 0;
        }

        let over = self.text.len() - self.cap;
        let mut cut = over.max(self.cap / 5).min(self.text.len());
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
        cut
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
