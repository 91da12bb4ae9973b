// Tried positions for one label and the resumable cursors over them.

use crate::error::{PlacementError, Result, try_push};
use crate::geometry::{Point, QueryRect};
use crate::model::LabelId;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Justification {
    #[default]
    Left,
    Center,
    Right,
}

/// Immutable snapshot of one trial placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePosition {
    label: LabelId,
    lower_left: Point,
    angle: f64,
    justification: Justification,
}

impl CandidatePosition {
    pub fn new(label: LabelId, lower_left: Point, angle: f64, justification: Justification) -> Self {
        Self {
            label,
            lower_left,
            angle,
            justification,
        }
    }

    pub fn label(&self) -> LabelId {
        self.label
    }

    pub fn lower_left(&self) -> Point {
        self.lower_left
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn justification(&self) -> Justification {
        self.justification
    }

    pub fn footprint(&self, width: f64, height: f64) -> QueryRect {
        QueryRect::from_lower_left(self.lower_left, width, height, self.angle)
    }
}

/// Slot around a point feature, in cartographic preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointPosition {
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
    North,
    South,
    East,
    West,
}

impl PointPosition {
    pub const ALL: [PointPosition; 8] = [
        PointPosition::NorthEast,
        PointPosition::NorthWest,
        PointPosition::SouthEast,
        PointPosition::SouthWest,
        PointPosition::North,
        PointPosition::South,
        PointPosition::East,
        PointPosition::West,
    ];

    /// Lower-left corner of a `width` x `height` box placed in this slot
    /// around `anchor`, `offset` away from it.
    pub fn lower_left(self, anchor: Point, width: f64, height: f64, offset: f64) -> Point {
        let east = anchor.x + offset;
        let west = anchor.x - offset - width;
        let north = anchor.y + offset;
        let south = anchor.y - offset - height;
        let (x, y) = match self {
            PointPosition::NorthEast => (east, north),
            PointPosition::NorthWest => (west, north),
            PointPosition::SouthEast => (east, south),
            PointPosition::SouthWest => (west, south),
            PointPosition::North => (anchor.x - width / 2.0, north),
            PointPosition::South => (anchor.x - width / 2.0, south),
            PointPosition::East => (east, anchor.y - height / 2.0),
            PointPosition::West => (west, anchor.y - height / 2.0),
        };
        Point::new(x, y)
    }

    pub fn justification(self) -> Justification {
        match self {
            PointPosition::NorthEast | PointPosition::SouthEast | PointPosition::East => {
                Justification::Left
            }
            PointPosition::NorthWest | PointPosition::SouthWest | PointPosition::West => {
                Justification::Right
            }
            PointPosition::North | PointPosition::South => Justification::Center,
        }
    }
}

/// Which relaxation loop a bookmark belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookmarkKind {
    Offset,
    Overline,
    Bump,
}

impl BookmarkKind {
    fn slot(self) -> usize {
        match self {
            BookmarkKind::Offset => 0,
            BookmarkKind::Overline => 1,
            BookmarkKind::Bump => 2,
        }
    }
}

/// Position of a candidate inside one specific list generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateCursor {
    list: u64,
    generation: u32,
    index: usize,
}

impl CandidateCursor {
    pub fn index(&self) -> usize {
        self.index
    }
}

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct CandidatePositions {
    id: u64,
    generation: u32,
    positions: Vec<CandidatePosition>,
    bookmarks: [Option<usize>; 3],
}

impl Default for CandidatePositions {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidatePositions {
    pub fn new() -> Self {
        Self {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            positions: Vec::new(),
            bookmarks: [None; 3],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidatePosition> {
        self.positions.iter()
    }

    fn cursor(&self, index: usize) -> CandidateCursor {
        CandidateCursor {
            list: self.id,
            generation: self.generation,
            index,
        }
    }

    pub fn push(&mut self, position: CandidatePosition) -> Result<CandidateCursor> {
        try_push(&mut self.positions, position, "candidate position")?;
        Ok(self.cursor(self.positions.len() - 1))
    }

    fn check(&self, cursor: CandidateCursor) -> Result<usize> {
        if cursor.list != self.id {
            return Err(PlacementError::IllegalOperation(
                "candidate cursor belongs to another list".into(),
            ));
        }
        if cursor.generation != self.generation || cursor.index >= self.positions.len() {
            return Err(PlacementError::IllegalOperation(
                "candidate cursor outlived a clear".into(),
            ));
        }
        Ok(cursor.index)
    }

    pub fn get(&self, cursor: CandidateCursor) -> Result<&CandidatePosition> {
        let index = self.check(cursor)?;
        Ok(&self.positions[index])
    }

    pub fn bookmark(&self, kind: BookmarkKind) -> Option<CandidateCursor> {
        self.bookmarks[kind.slot()].map(|index| self.cursor(index))
    }

    /// Candidates after the stored bookmark, or all of them when unset.
    pub fn bookmarked(
        &self,
        kind: BookmarkKind,
    ) -> impl Iterator<Item = (CandidateCursor, &CandidatePosition)> {
        let start = self.bookmarks[kind.slot()].map_or(0, |index| index + 1);
        self.positions
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, position)| (self.cursor(index), position))
    }

    /// Records `cursor` as the last candidate examined by `kind`'s loop.
    pub fn set_bookmark(&mut self, kind: BookmarkKind, cursor: CandidateCursor) -> Result<()> {
        let index = self.check(cursor)?;
        self.bookmarks[kind.slot()] = Some(index);
        Ok(())
    }

    /// Empties the list and every bookmark together. Outstanding cursors
    /// become invalid.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.bookmarks = [None; 3];
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(x: f64) -> CandidatePosition {
        CandidatePosition::new(LabelId(1), Point::new(x, 0.0), 0.0, Justification::Left)
    }

    fn filled(n: usize) -> CandidatePositions {
        let mut list = CandidatePositions::new();
        for i in 0..n {
            list.push(position(i as f64)).expect("push");
        }
        list
    }

    #[test]
    fn unset_bookmark_starts_at_beginning() {
        let list = filled(3);
        assert_eq!(list.bookmarked(BookmarkKind::Offset).count(), 3);
    }

    #[test]
    fn bookmarks_resume_independently() {
        let mut list = filled(5);
        let cursor = list
            .bookmarked(BookmarkKind::Offset)
            .nth(1)
            .map(|(c, _)| c)
            .expect("second candidate");
        list.set_bookmark(BookmarkKind::Offset, cursor).expect("valid");
        let resumed: Vec<f64> = list
            .bookmarked(BookmarkKind::Offset)
            .map(|(_, p)| p.lower_left().x)
            .collect();
        assert_eq!(resumed, vec![2.0, 3.0, 4.0]);
        assert_eq!(list.bookmarked(BookmarkKind::Bump).count(), 5);
        assert_eq!(list.bookmarked(BookmarkKind::Overline).count(), 5);
    }

    #[test]
    fn clear_drops_bookmarks_and_invalidates_cursors() {
        let mut list = filled(3);
        let cursor = list.bookmarked(BookmarkKind::Bump).last().map(|(c, _)| c).expect("last");
        list.set_bookmark(BookmarkKind::Bump, cursor).expect("valid");
        assert_eq!(list.bookmarked(BookmarkKind::Bump).count(), 0);
        list.clear();
        assert!(list.bookmark(BookmarkKind::Bump).is_none());
        list.push(position(9.0)).expect("push");
        assert!(matches!(
            list.set_bookmark(BookmarkKind::Bump, cursor),
            Err(PlacementError::IllegalOperation(_))
        ));
        assert_eq!(list.bookmarked(BookmarkKind::Bump).count(), 1);
    }

    #[test]
    fn cursor_from_other_list_is_rejected() {
        let a = filled(2);
        let mut b = filled(2);
        let foreign = a.bookmarked(BookmarkKind::Offset).next().map(|(c, _)| c).expect("first");
        assert!(b.set_bookmark(BookmarkKind::Offset, foreign).is_err());
        assert!(b.get(foreign).is_err());
    }

    #[test]
    fn point_slots_clear_the_anchor() {
        let anchor = Point::new(0.0, 0.0);
        for slot in PointPosition::ALL {
            let ll = slot.lower_left(anchor, 10.0, 4.0, 2.0);
            let rect = QueryRect::from_lower_left(ll, 10.0, 4.0, 0.0);
            assert!(!rect.contains(anchor), "{slot:?} covers its anchor");
        }
        assert_eq!(
            PointPosition::NorthWest.lower_left(anchor, 10.0, 4.0, 2.0),
            Point::new(-12.0, 2.0)
        );
    }

    #[test]
    fn footprint_uses_lower_left_and_angle() {
        let p = CandidatePosition::new(LabelId(1), Point::new(1.0, 2.0), 0.0, Justification::Center);
        let rect = p.footprint(10.0, 4.0);
        assert!(rect.center().distance(Point::new(6.0, 4.0)) < 1e-9);
    }
}
