//! Fixed-capacity window over the most recent items of a forward scan.

/// Keeps the last `capacity` items pushed into it.
///
/// Slots are written at `written % capacity`; once the window has wrapped,
/// the oldest retained item sits at that same index.
#[derive(Debug)]
pub(crate) struct RingWindow<T> {
    slots: Vec<T>,
    capacity: usize,
    written: u64,
}

impl<T> RingWindow<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            // Grows on demand so huge counts don't allocate up front.
            slots: Vec::new(),
            capacity,
            written: 0,
        }
    }

    pub(crate) fn push(&mut self, item: T) {
        if self.capacity == 0 {
            self.written += 1;
            return;
        }
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            let slot = self.cursor();
            self.slots[slot] = item;
        }
        self.written += 1;
    }

    /// Total number of items ever pushed.
    #[cfg(test)]
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Retained items, oldest first.
    pub(crate) fn into_vec(mut self) -> Vec<T> {
        if self.slots.len() == self.capacity && self.capacity > 0 {
            let start = self.cursor();
            self.slots.rotate_left(start);
        }
        self.slots
    }

    fn cursor(&self) -> usize {
        (self.written % self.capacity as u64) as usize
    }
}

impl<T: Copy> RingWindow<T> {
    /// Pushes a run of items with bulk copies instead of one slot at a time.
    pub(crate) fn extend_from_slice(&mut self, items: &[T]) {
        if self.capacity == 0 {
            self.written += items.len() as u64;
            return;
        }

        let fill = (self.capacity - self.slots.len()).min(items.len());
        self.slots.extend_from_slice(&items[..fill]);
        self.written += fill as u64;
        let mut rest = &items[fill..];

        // Anything beyond one full lap would be overwritten in this call anyway.
        if rest.len() > self.capacity {
            let skip = rest.len() - self.capacity;
            self.written += skip as u64;
            rest = &rest[skip..];
        }

        while !rest.is_empty() {
            let start = self.cursor();
            let n = (self.capacity - start).min(rest.len());
            self.slots[start..start + n].copy_from_slice(&rest[..n]);
            self.written += n as u64;
            rest = &rest[n..];
        }
    }
}
