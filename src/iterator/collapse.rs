use crate::error::Result;
use crate::types::{Cell, Key};

/// Collapses runs of cells sharing a key, keeping the first of each run.
///
/// Fed by a merge that orders equal keys newest first, this resolves
/// multi-version conflicts: the highest timestamp wins.
pub struct CollapseEquals<I> {
    inner: I,
    last_key: Option<Key>,
}

impl<I> CollapseEquals<I> {
    pub fn new(inner: I) -> Self {
        CollapseEquals {
            inner,
            last_key: None,
        }
    }
}

impl<I> Iterator for CollapseEquals<I>
where
    I: Iterator<Item = Result<Cell>>,
{
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cell = match self.inner.next()? {
                Ok(cell) => cell,
                Err(e) => return Some(Err(e)),
            };
            if self.last_key.as_deref() == Some(cell.key.as_slice()) {
                continue;
            }
            self.last_key = Some(cell.key.clone());
            return Some(Ok(cell));
        }
    }
}
