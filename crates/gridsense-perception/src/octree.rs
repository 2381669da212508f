//! Broad-phase spatial index over object bounds.
//!
//! Partitions 3-D space using a recursive **Octree** whose entries are
//! bounding boxes rather than points.  An entry is stored in the deepest node
//! whose bounds fully contain it; entries straddling a split plane stay at the
//! parent.  Queries visit every entry whose box overlaps a probe box.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aabb`]     | An axis-aligned bounding box.                     |
//! | [`Octree`]   | Spatial index; insert boxes, visit overlaps.      |
//!
//! # Example
//!
//! ```rust
//! use gridsense_perception::octree::{Aabb, Octree};
//! use gridsense_perception::transform::Vec3;
//!
//! let bounds = Aabb::new(Vec3::new(-10.0, -10.0, -10.0),
//!                        Vec3::new( 10.0,  10.0,  10.0));
//! let mut tree: Octree<u32> = Octree::new(bounds, 8);
//!
//! tree.insert(Aabb::from_center(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 0.5, 0.5)), 7);
//!
//! let probe = Aabb::new(Vec3::new(0.0, 1.0, 2.0), Vec3::new(1.0, 2.0, 3.0));
//! let mut hits = Vec::new();
//! tree.visit_overlapping(&probe, &mut |_, &id| { hits.push(id); true });
//! assert_eq!(hits, vec![7]);
//! ```

use crate::transform::Vec3;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Box centred on `center` extending `half_extents` along each axis.
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        let h = half_extents.abs();
        Self::new(center.sub(h), center.add(h))
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    /// Half the size of the box along each axis.
    pub fn half_extents(&self) -> Vec3 {
        self.max.sub(self.min).scale(0.5)
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &Aabb) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// The point of the box nearest to `p` (`p` itself when inside).
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vec3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vec3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// The box grown by `margin` on every side.
    pub fn expanded(&self, margin: f32) -> Aabb {
        let m = Vec3::new(margin, margin, margin);
        Aabb::new(self.min.sub(m), self.max.add(m))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

/// A recursive spatial index that subdivides 3-D space into eight octants.
///
/// Each entry is a bounding box with an attached value.  Subdividing stops
/// when either
/// - the number of entries in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
///
/// Construct with [`Octree::new`], insert boxes with [`Octree::insert`], then
/// query with [`Octree::visit_overlapping`].
#[derive(Debug)]
pub struct Octree<T> {
    root: OctreeNode<T>,
    max_depth: usize,
}

impl<T> Octree<T> {
    /// Create an empty octree covering `bounds`.
    ///
    /// - `capacity` – maximum entries per leaf before subdivision is attempted.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self::with_max_depth(bounds, capacity, 8)
    }

    /// Create an empty octree with an explicit maximum subdivision depth.
    pub fn with_max_depth(bounds: Aabb, capacity: usize, max_depth: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity.max(1)),
            max_depth,
        }
    }

    /// The region covered by the tree.
    pub fn bounds(&self) -> Aabb {
        self.root.bounds
    }

    /// Insert an entry.
    ///
    /// Returns `false` (and drops the entry) when `bounds` is not fully
    /// inside the root bounding box.
    pub fn insert(&mut self, bounds: Aabb, value: T) -> bool {
        if !self.root.bounds.contains_box(&bounds) {
            return false;
        }
        self.root.insert(Entry { bounds, value }, self.max_depth, 0);
        true
    }

    /// Return the total number of entries stored in the tree.
    pub fn len(&self) -> usize {
        self.root.count()
    }

    /// True when the tree contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `visit` for every entry whose box overlaps `region`.
    ///
    /// Traversal stops early as soon as `visit` returns `false`.  Returns
    /// `false` when traversal was stopped.
    pub fn visit_overlapping<F>(&self, region: &Aabb, visit: &mut F) -> bool
    where
        F: FnMut(&Aabb, &T) -> bool,
    {
        self.root.visit_overlapping(region, visit)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry<T> {
    bounds: Aabb,
    value: T,
}

#[derive(Debug)]
struct OctreeNode<T> {
    bounds: Aabb,
    capacity: usize,
    /// Entries stored at this node: every entry of a leaf, or the entries
    /// that straddle the children of an internal node.
    entries: Vec<Entry<T>>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode<T>; 8]>>,
}

impl<T> OctreeNode<T> {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            entries: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        let own = self.entries.len();
        match &self.children {
            Some(children) => own + children.iter().map(|c| c.count()).sum::<usize>(),
            None => own,
        }
    }

    fn insert(&mut self, entry: Entry<T>, max_depth: usize, depth: usize) {
        if let Some(children) = self.children.as_mut() {
            match children.iter_mut().find(|c| c.bounds.contains_box(&entry.bounds)) {
                Some(child) => child.insert(entry, max_depth, depth + 1),
                None => self.entries.push(entry),
            }
            return;
        }

        self.entries.push(entry);
        // Subdivide when over capacity and depth budget remains.
        if self.entries.len() > self.capacity && depth < max_depth {
            self.subdivide(max_depth, depth);
        }
    }

    fn visit_overlapping<F>(&self, region: &Aabb, visit: &mut F) -> bool
    where
        F: FnMut(&Aabb, &T) -> bool,
    {
        if !self.bounds.overlaps(region) {
            return true;
        }
        for entry in &self.entries {
            if entry.bounds.overlaps(region) && !visit(&entry.bounds, &entry.value) {
                return false;
            }
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                if !child.visit_overlapping(region, visit) {
                    return false;
                }
            }
        }
        true
    }

    /// Split this leaf into eight children and push down every entry that
    /// fits entirely inside one of them.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        let octants = [
            Aabb::new(min, c),
            Aabb::new(Vec3::new(c.x, min.y, min.z), Vec3::new(max.x, c.y, c.z)),
            Aabb::new(Vec3::new(min.x, c.y, min.z), Vec3::new(c.x, max.y, c.z)),
            Aabb::new(Vec3::new(c.x, c.y, min.z), Vec3::new(max.x, max.y, c.z)),
            Aabb::new(Vec3::new(min.x, min.y, c.z), Vec3::new(c.x, c.y, max.z)),
            Aabb::new(Vec3::new(c.x, min.y, c.z), Vec3::new(max.x, c.y, max.z)),
            Aabb::new(Vec3::new(min.x, c.y, c.z), Vec3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            match children.iter_mut().find(|c| c.bounds.contains_box(&entry.bounds)) {
                Some(child) => child.insert(entry, max_depth, depth + 1),
                None => self.entries.push(entry),
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tree(capacity: usize) -> Octree<usize> {
        Octree::new(Aabb::new(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0)), capacity)
    }

    fn small_box(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::from_center(Vec3::new(x, y, z), Vec3::new(0.01, 0.01, 0.01))
    }

    fn collect(tree: &Octree<usize>, region: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        tree.visit_overlapping(region, &mut |_, &v| {
            out.push(v);
            true
        });
        out.sort_unstable();
        out
    }

    // ── Aabb ────────────────────────────────────────────────────────────────

    #[test]
    fn aabb_contains_boundary_point() {
        let b = Aabb::new(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        assert!(b.contains_point(Vec3::zero()));
        assert!(b.contains_point(Vec3::new(1.0, 1.0, 1.0)));
        assert!(!b.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn aabb_overlaps_touching_boxes() {
        let a = Aabb::new(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let c = Aabb::new(Vec3::new(2.5, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn aabb_normalises_min_max() {
        let b = Aabb::new(Vec3::new(2.0, 2.0, 2.0), Vec3::zero());
        assert_eq!(b.min, Vec3::zero());
        assert_eq!(b.max, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn aabb_closest_point_clamps_outside_points() {
        let b = Aabb::from_center(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(b.closest_point(Vec3::new(5.0, 0.5, -3.0)), Vec3::new(1.0, 0.5, -1.0));
        assert_eq!(b.closest_point(Vec3::new(0.2, 0.1, 0.0)), Vec3::new(0.2, 0.1, 0.0));
    }

    #[test]
    fn aabb_union_and_expand() {
        let a = Aabb::new(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vec3::new(-2.0, 0.5, 0.5), Vec3::new(-1.0, 3.0, 0.6));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(u.max, Vec3::new(1.0, 3.0, 1.0));
        let e = a.expanded(1.0);
        assert_eq!(e.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(e.half_extents(), Vec3::new(1.5, 1.5, 1.5));
    }

    // ── Octree ──────────────────────────────────────────────────────────────

    #[test]
    fn empty_tree_reports_nothing() {
        let tree = unit_tree(4);
        assert!(tree.is_empty());
        assert!(collect(&tree, &tree.bounds()).is_empty());
    }

    #[test]
    fn insert_outside_bounds_is_rejected() {
        let mut tree = unit_tree(4);
        assert!(!tree.insert(small_box(5.0, 5.0, 5.0), 1));
        // Partially outside is rejected too.
        assert!(!tree.insert(Aabb::new(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.5, 0.6, 0.6)), 2));
        assert!(tree.is_empty());
    }

    #[test]
    fn subdivision_preserves_all_entries() {
        let mut tree = unit_tree(2);
        let centres = [(0.1, 0.1, 0.1), (0.9, 0.9, 0.9), (0.2, 0.8, 0.3), (0.7, 0.2, 0.6)];
        for (i, &(x, y, z)) in centres.iter().enumerate() {
            assert!(tree.insert(small_box(x, y, z), i));
        }
        assert_eq!(tree.len(), 4);
        assert_eq!(collect(&tree, &tree.bounds()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn straddling_entry_is_found_from_either_side() {
        let mut tree = unit_tree(1);
        // Crosses the x = 0.5 split plane.
        tree.insert(Aabb::new(Vec3::new(0.4, 0.1, 0.1), Vec3::new(0.6, 0.2, 0.2)), 9);
        tree.insert(small_box(0.1, 0.1, 0.1), 1);
        tree.insert(small_box(0.9, 0.9, 0.9), 2);

        let left = Aabb::new(Vec3::new(0.3, 0.0, 0.0), Vec3::new(0.45, 0.3, 0.3));
        let right = Aabb::new(Vec3::new(0.55, 0.0, 0.0), Vec3::new(0.7, 0.3, 0.3));
        assert_eq!(collect(&tree, &left), vec![9]);
        assert_eq!(collect(&tree, &right), vec![9]);
    }

    #[test]
    fn visit_stops_when_callback_returns_false() {
        let mut tree = unit_tree(2);
        for i in 0..10 {
            tree.insert(small_box(0.05 + i as f32 * 0.09, 0.5, 0.5), i);
        }
        let mut seen = 0;
        let finished = tree.visit_overlapping(&tree.bounds(), &mut |_, _| {
            seen += 1;
            seen < 3
        });
        assert!(!finished);
        assert_eq!(seen, 3);
    }

    #[test]
    fn many_insertions_query_local_region() {
        let bounds = Aabb::new(Vec3::zero(), Vec3::new(100.0, 100.0, 100.0));
        let mut tree = Octree::new(bounds, 4);
        let mut id = 0usize;
        for ix in 0..5 {
            for iy in 0..5 {
                for iz in 0..5 {
                    let c = Vec3::new(ix as f32 * 10.0 + 5.0, iy as f32 * 10.0 + 5.0, iz as f32 * 10.0 + 5.0);
                    tree.insert(Aabb::from_center(c, Vec3::new(1.0, 1.0, 1.0)), id);
                    id += 1;
                }
            }
        }
        assert_eq!(tree.len(), 125);

        let probe = Aabb::from_center(Vec3::new(5.0, 5.0, 5.0), Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(collect(&tree, &probe), vec![0]);
    }
}
