use crate::canvas::Snapshot;

/// Maximum number of snapshots kept for undo.
pub const HISTORY_LIMIT: usize = 20;

// ============================================================================
// HISTORY STACK: bounded ring buffer of full-canvas snapshots
// ============================================================================

/// Linear undo over full snapshots.
///
/// Slots form a ring: `head` is the physical slot of the oldest entry and
/// logical index `i` lives at `(head + i) % capacity`. Evicting the oldest
/// entry is a head bump, not a shift.
pub struct HistoryStack {
    slots: Vec<Option<Snapshot>>,
    head: usize,
    len: usize,
    /// Logical index of the current entry; `None` only while empty.
    cursor: Option<usize>,
}

impl HistoryStack {
    /// History holding just `initial` (the blank canvas), so undo starts disabled.
    pub fn new(initial: Snapshot) -> Self {
        Self::with_capacity(initial, HISTORY_LIMIT)
    }

    pub fn with_capacity(initial: Snapshot, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut history = Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            cursor: None,
        };
        history.push(initial);
        history
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    fn slot(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }

    /// Record a new state. Anything after the cursor (the redo branch) is
    /// dropped first; at capacity the oldest entry is evicted.
    pub fn push(&mut self, snapshot: Snapshot) {
        // Discard the redo branch
        let keep = self.cursor.map_or(0, |c| c + 1);
        for logical in keep..self.len {
            let idx = self.slot(logical);
            self.slots[idx] = None;
        }
        self.len = keep;

        if self.len == self.slots.len() {
            self.slots[self.head] = None;
            self.head = (self.head + 1) % self.slots.len();
            self.len -= 1;
        }

        let idx = self.slot(self.len);
        self.slots[idx] = Some(snapshot);
        self.len += 1;
        self.cursor = Some(self.len - 1);
    }

    /// Step back one entry and return the snapshot to restore.
    /// `None` when already at the oldest entry.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        let cursor = self.cursor.filter(|c| *c > 0)? - 1;
        self.cursor = Some(cursor);
        self.slots[self.slot(cursor)].as_ref()
    }

    /// The snapshot [`undo`](Self::undo) would return, without moving the cursor.
    pub fn previous(&self) -> Option<&Snapshot> {
        let cursor = self.cursor.filter(|c| *c > 0)? - 1;
        self.slots[self.slot(cursor)].as_ref()
    }

    /// Snapshot under the cursor.
    pub fn current(&self) -> Option<&Snapshot> {
        let cursor = self.cursor?;
        self.slots[self.slot(cursor)].as_ref()
    }

    /// Bytes held by all stored snapshots.
    pub fn memory_size(&self) -> usize {
        self.slots.iter().flatten().map(Snapshot::memory_size).sum()
    }
}
