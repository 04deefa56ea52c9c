//! Dense bit matrices for dependency and guard relations.

use std::fmt;

const WORD: usize = 64;

/// One row of a [`DepMatrix`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DepRow {
    words: Vec<u64>,
    len: usize,
}

impl DepRow {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD)],
            len,
        }
    }

    pub fn full(len: usize) -> Self {
        let mut row = Self::new(len);
        for i in 0..len {
            row.set(i);
        }
        row
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> bool {
        i < self.len && self.words[i / WORD] & (1 << (i % WORD)) != 0
    }

    /// Set bit `i`. Out of range indices are ignored.
    pub fn set(&mut self, i: usize) {
        if i < self.len {
            self.words[i / WORD] |= 1 << (i % WORD);
        }
    }

    pub fn unset(&mut self, i: usize) {
        if i < self.len {
            self.words[i / WORD] &= !(1 << (i % WORD));
        }
    }

    /// In-place union with a row of the same width.
    pub fn or_with(&mut self, other: &DepRow) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    pub fn intersects(&self, other: &DepRow) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of the set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.get(i))
    }
}

impl fmt::Debug for DepRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// A rows x cols bit matrix.
#[derive(Clone, PartialEq, Eq)]
pub struct DepMatrix {
    rows: Vec<DepRow>,
    cols: usize,
}

impl DepMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![DepRow::new(cols); rows],
            cols,
        }
    }

    /// A matrix with every bit set: the conservative answer for every
    /// relation in this crate.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![DepRow::full(cols); rows],
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.rows.get(row).is_some_and(|r| r.get(col))
    }

    pub fn set(&mut self, row: usize, col: usize) {
        if let Some(r) = self.rows.get_mut(row) {
            r.set(col);
        }
    }

    pub fn unset(&mut self, row: usize, col: usize) {
        if let Some(r) = self.rows.get_mut(row) {
            r.unset(col);
        }
    }

    /// Row `row`.
    ///
    /// # Panics
    ///
    /// If `row >= self.rows()`. Use [`DepMatrix::get_row`] for ids from
    /// outside the model.
    pub fn row(&self, row: usize) -> &DepRow {
        &self.rows[row]
    }

    /// # Panics
    ///
    /// If `row >= self.rows()`.
    pub fn row_mut(&mut self, row: usize) -> &mut DepRow {
        &mut self.rows[row]
    }

    pub fn get_row(&self, row: usize) -> Option<&DepRow> {
        self.rows.get(row)
    }

    /// OR `src` into row `row`.
    pub fn or_row(&mut self, row: usize, src: &DepRow) {
        if let Some(r) = self.rows.get_mut(row) {
            r.or_with(src);
        }
    }

    pub fn count(&self) -> usize {
        self.rows.iter().map(DepRow::count).sum()
    }

    /// Number of cleared bits.
    pub fn zeros(&self) -> usize {
        self.rows.len() * self.cols - self.count()
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &DepRow> {
        self.rows.iter()
    }
}

impl fmt::Debug for DepMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows.iter().enumerate() {
            writeln!(f, "{:4}: {:?}", i, row)?;
        }
        Ok(())
    }
}

/// Read, may-write and must-write relation of rows (transitions or labels)
/// over state vector slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RWMatrix {
    pub read: DepMatrix,
    pub may_write: DepMatrix,
    pub must_write: DepMatrix,
}

impl RWMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            read: DepMatrix::new(rows, cols),
            may_write: DepMatrix::new(rows, cols),
            must_write: DepMatrix::new(rows, cols),
        }
    }

    pub fn rows(&self) -> usize {
        self.read.rows()
    }

    pub fn cols(&self) -> usize {
        self.read.cols()
    }

    /// Union of read and may-write for `row`.
    pub fn touched(&self, row: usize) -> DepRow {
        let mut r = self.read.row(row).clone();
        r.or_with(self.may_write.row(row));
        r
    }

    /// Slots `a` reads that `b` may write, or the other way round, or both
    /// write.
    pub fn dependent(&self, a: usize, b: usize) -> bool {
        self.read.row(a).intersects(self.may_write.row(b))
            || self.may_write.row(a).intersects(self.read.row(b))
            || self.may_write.row(a).intersects(self.may_write.row(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_across_word_boundary() {
        let mut row = DepRow::new(130);
        row.set(0);
        row.set(64);
        row.set(129);
        row.set(500);
        assert_eq!(row.ones().collect::<Vec<_>>(), vec![0, 64, 129]);
        row.unset(64);
        assert_eq!(row.count(), 2);
        assert_eq!(format!("{:?}", DepRow::full(3)), "111");
    }

    #[test]
    fn test_or_row() {
        let mut m = DepMatrix::new(2, 4);
        let mut src = DepRow::new(4);
        src.set(1);
        src.set(3);
        m.or_row(1, &src);
        assert!(m.get(1, 1) && m.get(1, 3));
        assert!(!m.get(0, 1));
        assert_eq!(m.zeros(), 6);
        assert_eq!(m.get_row(1).map(DepRow::count), Some(2));
        assert!(m.get_row(2).is_none());
        assert!(!m.get(7, 0));
    }

    #[test]
    fn test_dependent() {
        let mut rw = RWMatrix::new(2, 3);
        rw.read.set(0, 1);
        rw.may_write.set(1, 1);
        assert!(rw.dependent(0, 1));
        assert!(rw.dependent(1, 0));
        rw.may_write.unset(1, 1);
        assert!(!rw.dependent(0, 1));
    }
}
