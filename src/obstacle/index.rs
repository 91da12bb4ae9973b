// Uniform hash-grid spatial index over obstacle entries.

use crate::error::{PlacementError, Result, try_push};
use crate::geometry::{Point, QueryRect, Rect};
use crate::model::{FeatureId, LabelId};
use std::collections::HashMap;

/// Entries whose envelope would touch more cells than this are kept in a
/// flat list instead of being spread over the grid.
const MAX_CELLS_PER_ENTRY: u128 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Polygon(Vec<Point>),
    Polyline(Vec<Point>),
    /// A point symbol; `radius` is half its drawn size.
    Point { at: Point, radius: f64 },
    /// A placed label part or symbol footprint.
    Box(QueryRect),
}

impl Shape {
    pub fn envelope(&self) -> Option<Rect> {
        match self {
            Shape::Polygon(points) | Shape::Polyline(points) => {
                Rect::from_points(points.iter().copied())
            }
            Shape::Point { at, radius } => {
                Some(Rect::new(at.x, at.y, at.x, at.y).inflate(*radius))
            }
            Shape::Box(rect) => Some(rect.envelope()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    AreaFeature,
    LineFeature,
    PointFeature,
    PlacedText,
    PlacedSymbol,
    Leader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerRef {
    Feature(FeatureId),
    Label(LabelId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub shape: Shape,
    pub kind: OwnerKind,
    pub owner: OwnerRef,
    pub layer: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

#[cfg(test)]
impl EntryId {
    pub(crate) fn for_tests(index: usize) -> Self {
        EntryId(index)
    }
}

/// Read side of a spatial index as seen by the obstacle detector.
pub trait ObstacleIndex {
    /// Entries whose envelope intersects `envelope`, ordered by id.
    fn query(&self, envelope: &Rect) -> Result<Vec<(EntryId, &IndexEntry)>>;
}

#[derive(Debug)]
struct Slot {
    entry: IndexEntry,
    envelope: Rect,
    oversized: bool,
}

type CellRange = (i64, i64, i64, i64);

fn cells_in(range: CellRange) -> u128 {
    let (x0, y0, x1, y1) = range;
    let width = (i128::from(x1) - i128::from(x0) + 1).max(0) as u128;
    let height = (i128::from(y1) - i128::from(y0) + 1).max(0) as u128;
    width.saturating_mul(height)
}

fn in_range(key: (i64, i64), range: CellRange) -> bool {
    let (x0, y0, x1, y1) = range;
    (x0..=x1).contains(&key.0) && (y0..=y1).contains(&key.1)
}

#[derive(Debug)]
pub struct GridIndex {
    cell: f64,
    /// Maps grid cell (ix, iy) to the entries touching it.
    cells: HashMap<(i64, i64), Vec<EntryId>>,
    /// Entries too large for the grid, scanned on every query.
    oversized: Vec<EntryId>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    len: usize,
}

impl GridIndex {
    pub fn new(cell: f64) -> Self {
        Self {
            cell: if cell.is_finite() { cell.max(1.0) } else { 64.0 },
            cells: HashMap::new(),
            oversized: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: EntryId) -> Option<&IndexEntry> {
        self.slots
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .map(|slot| &slot.entry)
    }

    fn cell_range(&self, rect: &Rect) -> CellRange {
        (
            (rect.min_x / self.cell).floor() as i64,
            (rect.min_y / self.cell).floor() as i64,
            (rect.max_x / self.cell).floor() as i64,
            (rect.max_y / self.cell).floor() as i64,
        )
    }

    pub fn insert(&mut self, entry: IndexEntry) -> Result<EntryId> {
        let envelope = entry
            .shape
            .envelope()
            .ok_or_else(|| PlacementError::IllegalOperation("index entry has no extent".into()))?;
        let range = self.cell_range(&envelope);
        let oversized = cells_in(range) > MAX_CELLS_PER_ENTRY;
        if oversized {
            self.oversized
                .try_reserve(1)
                .map_err(PlacementError::exhausted("oversized index entry"))?;
        }
        let slot = Slot {
            entry,
            envelope,
            oversized,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                EntryId(index)
            }
            None => {
                try_push(&mut self.slots, Some(slot), "spatial index slot")?;
                EntryId(self.slots.len() - 1)
            }
        };
        if oversized {
            self.oversized.push(id);
        } else if let Err(err) = self.spread(id, range) {
            self.unspread(id, range);
            self.slots[id.0] = None;
            self.free.push(id.0);
            return Err(err);
        }
        self.len += 1;
        Ok(id)
    }

    fn spread(&mut self, id: EntryId, (x0, y0, x1, y1): CellRange) -> Result<()> {
        for ix in x0..=x1 {
            for iy in y0..=y1 {
                try_push(self.cells.entry((ix, iy)).or_default(), id, "index cell")?;
            }
        }
        Ok(())
    }

    fn unspread(&mut self, id: EntryId, (x0, y0, x1, y1): CellRange) {
        for ix in x0..=x1 {
            for iy in y0..=y1 {
                if let Some(ids) = self.cells.get_mut(&(ix, iy)) {
                    ids.retain(|other| *other != id);
                    if ids.is_empty() {
                        self.cells.remove(&(ix, iy));
                    }
                }
            }
        }
    }

    /// Removes an entry. Cells left empty are dropped so long sessions of
    /// place/unplace do not accumulate dead buckets.
    pub fn remove(&mut self, id: EntryId) -> Option<IndexEntry> {
        let slot = self.slots.get_mut(id.0)?.take()?;
        if slot.oversized {
            self.oversized.retain(|other| *other != id);
        } else {
            let range = self.cell_range(&slot.envelope);
            self.unspread(id, range);
        }
        self.free.push(id.0);
        self.len -= 1;
        Some(slot.entry)
    }

    /// Removes every entry owned by `owner`, returning how many went.
    pub fn remove_owner(&mut self, owner: OwnerRef) -> usize {
        let ids: Vec<EntryId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref()
                    .filter(|slot| slot.entry.owner == owner)
                    .map(|_| EntryId(i))
            })
            .collect();
        ids.into_iter().filter_map(|id| self.remove(id)).count()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn oversized_count(&self) -> usize {
        self.oversized.len()
    }
}

impl ObstacleIndex for GridIndex {
    fn query(&self, envelope: &Rect) -> Result<Vec<(EntryId, &IndexEntry)>> {
        let range = self.cell_range(envelope);
        let mut ids: Vec<EntryId> = Vec::new();
        ids.try_reserve(self.oversized.len())
            .map_err(PlacementError::exhausted("index query"))?;
        ids.extend_from_slice(&self.oversized);
        // A window wider than the occupied grid walks the occupied cells instead.
        if cells_in(range) > self.cells.len() as u128 {
            for (key, bucket) in &self.cells {
                if in_range(*key, range) {
                    ids.try_reserve(bucket.len())
                        .map_err(PlacementError::exhausted("index query"))?;
                    ids.extend_from_slice(bucket);
                }
            }
        } else {
            let (x0, y0, x1, y1) = range;
            for ix in x0..=x1 {
                for iy in y0..=y1 {
                    if let Some(bucket) = self.cells.get(&(ix, iy)) {
                        ids.try_reserve(bucket.len())
                            .map_err(PlacementError::exhausted("index query"))?;
                        ids.extend_from_slice(bucket);
                    }
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();

        let mut hits = Vec::new();
        for id in ids {
            if let Some(Some(slot)) = self.slots.get(id.0) {
                if slot.envelope.intersects(envelope) {
                    try_push(&mut hits, (id, &slot.entry), "index query")?;
                }
            }
        }
        Ok(hits)
    }
}
