//! Byte ring buffer holding variable-length entries that never straddle the
//! wrap point.
//!
//! Each entry is stored as a little-endian `u32` length header followed by
//! the payload. If an entry does not fit in the space left before the end of
//! the buffer it is placed at the start instead, and the skipped tail is
//! marked with [`WRAP`] (or left implicit when fewer than four bytes
//! remain). An entry that fits nowhere contiguously is rejected.
//!
//! Not synchronised; the logger wraps it in a lock.

const HEADER: usize = 4;
const WRAP: u32 = u32::MAX;

#[derive(Debug)]
pub struct ByteRing {
    buf: Box<[u8]>,
    /// Next write offset.
    head: usize,
    /// Next read offset.
    tail: usize,
    /// Bytes in use, including headers and skipped tails.
    used: usize,
    items: usize,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            used: 0,
            items: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Largest payload a single entry may carry.
    pub fn max_item(&self) -> usize {
        (self.capacity() / 2).saturating_sub(HEADER)
    }

    /// Bytes occupied by unread entries.
    pub fn pending_bytes(&self) -> usize {
        self.used
    }

    pub fn len(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Append one entry. Returns `false` (leaving the ring untouched) if it
    /// does not fit contiguously.
    pub fn push(&mut self, payload: &[u8]) -> bool {
        if payload.len() > self.max_item() {
            return false;
        }
        let need = HEADER + payload.len();
        let cap = self.capacity();

        let at = if self.items == 0 {
            0
        } else if self.head > self.tail {
            if need <= cap - self.head {
                self.head
            } else if need <= self.tail {
                let skipped = cap - self.head;
                if skipped >= HEADER {
                    self.write_header(self.head, WRAP);
                }
                self.used += skipped;
                0
            } else {
                return false;
            }
        } else if self.head < self.tail && need <= self.tail - self.head {
            self.head
        } else {
            // head == tail with items present: full.
            return false;
        };

        self.write_header(at, payload.len() as u32);
        self.buf[at + HEADER..at + need].copy_from_slice(payload);
        self.head = (at + need) % cap;
        self.used += need;
        self.items += 1;
        true
    }

    /// Move the oldest entry into `out` (replacing its contents).
    /// Returns `false` if the ring is empty.
    pub fn pop_into(&mut self, out: &mut Vec<u8>) -> bool {
        if self.items == 0 {
            return false;
        }
        let cap = self.capacity();

        if cap - self.tail < HEADER || self.read_header(self.tail) == WRAP {
            self.used -= cap - self.tail;
            self.tail = 0;
        }

        let len = self.read_header(self.tail) as usize;
        let start = self.tail + HEADER;
        out.clear();
        out.extend_from_slice(&self.buf[start..start + len]);

        self.tail = (start + len) % cap;
        self.used -= HEADER + len;
        self.items -= 1;
        if self.items == 0 {
            self.head = 0;
            self.tail = 0;
            self.used = 0;
        }
        true
    }

    fn write_header(&mut self, at: usize, value: u32) {
        self.buf[at..at + HEADER].copy_from_slice(&value.to_le_bytes());
    }

    fn read_header(&self, at: usize) -> u32 {
        let mut raw = [0u8; HEADER];
        raw.copy_from_slice(&self.buf[at..at + HEADER]);
        u32::from_le_bytes(raw)
    }
}
