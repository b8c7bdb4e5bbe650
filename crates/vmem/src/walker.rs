use crate::manager::VirtualMemory;
use crate::{Word, OFFSET_WIDTH, PAGE_SIZE, TABLES_DEPTH, VIRTUAL_ADDRESS_WIDTH};

impl VirtualMemory {
    /// Walk `depth` levels of the table tree for `addr_bits` and return the
    /// frame reached, allocating frames along the way on faults.
    ///
    /// A full translation passes the virtual address with
    /// `depth == TABLES_DEPTH` and ends on the data frame. The eviction
    /// path re-walks with the page number and `depth == TABLES_DEPTH - 1`
    /// to end on the parent table of a leaf.
    ///
    /// `None` only for an address outside the virtual address space.
    pub(crate) fn translate(&mut self, addr_bits: u64, depth: usize) -> Option<Word> {
        if addr_bits >> VIRTUAL_ADDRESS_WIDTH != 0 {
            return None;
        }
        let page = addr_bits >> OFFSET_WIDTH;

        // Frames committed to this walk so far; none of them may be handed
        // out again while the walk is in progress.
        let mut path = [0 as Word; TABLES_DEPTH];
        let mut frame: Word = 0;

        for level in 0..depth {
            let index = (addr_bits >> (OFFSET_WIDTH * (depth - level) as u64)) & (PAGE_SIZE - 1);
            let next = self.entry(frame, index);
            let next = if next != 0 {
                next
            } else {
                self.stats.faults += 1;
                let acquired = self.acquire_frame(page, &path)?;
                self.set_entry(frame, index, acquired);
                if level == TABLES_DEPTH - 1 {
                    // Data level of a full walk: bring the page in.
                    self.pm.restore(acquired, page);
                    self.stats.restores += 1;
                } else {
                    // A fresh table starts with every entry unmapped.
                    self.clear_frame(acquired);
                }
                acquired
            };
            path[level] = next;
            frame = next;
        }
        Some(frame)
    }
}
