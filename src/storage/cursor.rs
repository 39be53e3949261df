//! Ascending, duplicate-free cursors and the sort-merge combinators built on them.

use std::marker::PhantomData;

use crate::types::{Result, ThingId, TypeId, Vertex};

/// Streaming interface over sorted, unique items.
///
/// Every implementation yields items in strictly ascending order. Combinators
/// rely on that to merge and intersect without buffering.
pub trait SortedCursor {
    /// Item yielded by the cursor.
    type Item: Copy + Ord;

    /// Returns the next item without consuming it.
    fn peek(&mut self) -> Result<Option<Self::Item>>;

    /// Consumes and returns the next item.
    fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Advances past every item strictly less than `target`.
    fn seek(&mut self, target: Self::Item) -> Result<()> {
        while let Some(head) = self.peek()? {
            if head >= target {
                break;
            }
            self.next()?;
        }
        Ok(())
    }
}

impl<C: SortedCursor + ?Sized> SortedCursor for Box<C> {
    type Item = C::Item;

    fn peek(&mut self) -> Result<Option<Self::Item>> {
        (**self).peek()
    }

    fn next(&mut self) -> Result<Option<Self::Item>> {
        (**self).next()
    }

    fn seek(&mut self, target: Self::Item) -> Result<()> {
        (**self).seek(target)
    }
}

/// Boxed cursor borrowed from a graph or a procedure for `'a`.
pub type BoxCursor<'a, T> = Box<dyn SortedCursor<Item = T> + 'a>;

/// Drains a cursor into a vector.
pub fn collect<C: SortedCursor + ?Sized>(cursor: &mut C) -> Result<Vec<C::Item>> {
    let mut out = Vec::new();
    while let Some(item) = cursor.next()? {
        out.push(item);
    }
    Ok(out)
}

/// Cursor that yields no results.
#[derive(Debug)]
pub struct EmptyCursor<T>(PhantomData<T>);

impl<T> EmptyCursor<T> {
    /// Creates an empty cursor.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for EmptyCursor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Ord> SortedCursor for EmptyCursor<T> {
    type Item = T;

    fn peek(&mut self) -> Result<Option<T>> {
        Ok(None)
    }

    fn next(&mut self) -> Result<Option<T>> {
        Ok(None)
    }
}

/// Cursor over an owned, sorted vector.
#[derive(Clone, Debug)]
pub struct VecCursor<T> {
    items: Vec<T>,
    pos: usize,
}

impl<T: Copy + Ord> VecCursor<T> {
    /// Wraps items that are already ascending and unique.
    pub fn from_sorted(items: Vec<T>) -> Self {
        debug_assert!(items.windows(2).all(|w| w[0] < w[1]));
        Self { items, pos: 0 }
    }

    /// Sorts and deduplicates `items` before wrapping them.
    pub fn from_unsorted(mut items: Vec<T>) -> Self {
        items.sort_unstable();
        items.dedup();
        Self { items, pos: 0 }
    }

    /// Cursor yielding exactly one item.
    pub fn single(item: T) -> Self {
        Self {
            items: vec![item],
            pos: 0,
        }
    }

    /// Number of items not yet consumed.
    pub fn remaining(&self) -> usize {
        self.items.len() - self.pos
    }
}

impl<T: Copy + Ord> SortedCursor for VecCursor<T> {
    type Item = T;

    fn peek(&mut self) -> Result<Option<T>> {
        Ok(self.items.get(self.pos).copied())
    }

    fn next(&mut self) -> Result<Option<T>> {
        let item = self.items.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        Ok(item)
    }

    fn seek(&mut self, target: T) -> Result<()> {
        let rest = &self.items[self.pos..];
        self.pos += rest.partition_point(|item| *item < target);
        Ok(())
    }
}

/// Keeps the items of `inner` accepted by a fallible predicate.
pub struct FilterCursor<C: SortedCursor, F> {
    inner: C,
    predicate: F,
    accepted: Option<C::Item>,
}

impl<C, F> FilterCursor<C, F>
where
    C: SortedCursor,
    F: FnMut(C::Item) -> Result<bool>,
{
    /// Wraps `inner`, dropping items for which `predicate` returns `false`.
    pub fn new(inner: C, predicate: F) -> Self {
        Self {
            inner,
            predicate,
            accepted: None,
        }
    }
}

impl<C, F> SortedCursor for FilterCursor<C, F>
where
    C: SortedCursor,
    F: FnMut(C::Item) -> Result<bool>,
{
    type Item = C::Item;

    fn peek(&mut self) -> Result<Option<C::Item>> {
        if let Some(item) = self.accepted {
            return Ok(Some(item));
        }
        while let Some(item) = self.inner.peek()? {
            if (self.predicate)(item)? {
                self.accepted = Some(item);
                return Ok(Some(item));
            }
            self.inner.next()?;
        }
        Ok(None)
    }

    fn next(&mut self) -> Result<Option<C::Item>> {
        let item = self.peek()?;
        if item.is_some() {
            self.inner.next()?;
            self.accepted = None;
        }
        Ok(item)
    }

    fn seek(&mut self, target: C::Item) -> Result<()> {
        match self.accepted {
            Some(item) if item >= target => Ok(()),
            _ => {
                self.accepted = None;
                self.inner.seek(target)
            }
        }
    }
}

/// Ascending union of several cursors, yielding each item once.
pub struct MergeCursor<C> {
    inputs: Vec<C>,
}

impl<C: SortedCursor> MergeCursor<C> {
    /// Merges `inputs` into one ascending stream.
    pub fn new(inputs: Vec<C>) -> Self {
        Self { inputs }
    }
}

impl<C: SortedCursor> SortedCursor for MergeCursor<C> {
    type Item = C::Item;

    fn peek(&mut self) -> Result<Option<C::Item>> {
        let mut min = None;
        for input in self.inputs.iter_mut() {
            if let Some(head) = input.peek()? {
                min = Some(match min {
                    Some(current) if current <= head => current,
                    _ => head,
                });
            }
        }
        Ok(min)
    }

    fn next(&mut self) -> Result<Option<C::Item>> {
        let Some(min) = self.peek()? else {
            return Ok(None);
        };
        for input in self.inputs.iter_mut() {
            if input.peek()? == Some(min) {
                input.next()?;
            }
        }
        Ok(Some(min))
    }

    fn seek(&mut self, target: C::Item) -> Result<()> {
        for input in self.inputs.iter_mut() {
            input.seek(target)?;
        }
        Ok(())
    }
}

/// Lazy k-way sort-merge intersection.
///
/// Heads are aligned on demand: the largest head becomes the seek target for
/// every other input until all heads agree or one input runs dry.
pub struct IntersectCursor<C> {
    inputs: Vec<C>,
}

impl<C: SortedCursor> IntersectCursor<C> {
    /// Intersects `inputs`. An empty input list yields nothing.
    pub fn new(inputs: Vec<C>) -> Self {
        Self { inputs }
    }

    /// The intersected inputs, in registration order.
    pub fn inputs(&self) -> &[C] {
        &self.inputs
    }

    /// Mutable access to the intersected inputs.
    pub fn inputs_mut(&mut self) -> &mut [C] {
        &mut self.inputs
    }
}

impl<C: SortedCursor> SortedCursor for IntersectCursor<C> {
    type Item = C::Item;

    fn peek(&mut self) -> Result<Option<C::Item>> {
        if self.inputs.is_empty() {
            return Ok(None);
        }
        loop {
            let mut target = None;
            let mut all_equal = true;
            for input in self.inputs.iter_mut() {
                let Some(head) = input.peek()? else {
                    return Ok(None);
                };
                match target {
                    None => target = Some(head),
                    Some(current) => {
                        if head != current {
                            all_equal = false;
                        }
                        if head > current {
                            target = Some(head);
                        }
                    }
                }
            }
            let Some(target) = target else {
                return Ok(None);
            };
            if all_equal {
                return Ok(Some(target));
            }
            for input in self.inputs.iter_mut() {
                input.seek(target)?;
            }
        }
    }

    fn next(&mut self) -> Result<Option<C::Item>> {
        let item = self.peek()?;
        if item.is_some() {
            for input in self.inputs.iter_mut() {
                input.next()?;
            }
        }
        Ok(item)
    }

    fn seek(&mut self, target: C::Item) -> Result<()> {
        for input in self.inputs.iter_mut() {
            input.seek(target)?;
        }
        Ok(())
    }
}

/// Presents a type cursor as a cursor of [`Vertex::Type`] values.
pub struct TypeVertexCursor<C>(pub C);

impl<C: SortedCursor<Item = TypeId>> SortedCursor for TypeVertexCursor<C> {
    type Item = Vertex;

    fn peek(&mut self) -> Result<Option<Vertex>> {
        Ok(self.0.peek()?.map(Vertex::Type))
    }

    fn next(&mut self) -> Result<Option<Vertex>> {
        Ok(self.0.next()?.map(Vertex::Type))
    }

    fn seek(&mut self, target: Vertex) -> Result<()> {
        match target {
            Vertex::Type(ty) => self.0.seek(ty),
            // every type sorts before every thing
            Vertex::Thing(_) => {
                while self.0.next()?.is_some() {}
                Ok(())
            }
        }
    }
}

/// Presents a thing cursor as a cursor of [`Vertex::Thing`] values.
pub struct ThingVertexCursor<C>(pub C);

impl<C: SortedCursor<Item = ThingId>> SortedCursor for ThingVertexCursor<C> {
    type Item = Vertex;

    fn peek(&mut self) -> Result<Option<Vertex>> {
        Ok(self.0.peek()?.map(Vertex::Thing))
    }

    fn next(&mut self) -> Result<Option<Vertex>> {
        Ok(self.0.next()?.map(Vertex::Thing))
    }

    fn seek(&mut self, target: Vertex) -> Result<()> {
        match target {
            Vertex::Thing(thing) => self.0.seek(thing),
            Vertex::Type(_) => Ok(()),
        }
    }
}
