//! Spatial query seam between the grid sensor and the world.
//!
//! The sensor never walks the world itself; it asks a [`SpatialQuery`]
//! implementation for the objects overlapping one cell volume at a time.
//! Queries write into a caller-owned, fixed-capacity slice and report how
//! many slots they filled, so a result count equal to the slice length means
//! "possibly truncated".
//!
//! [`SpatialIndex`] is an in-memory implementation: an [`Octree`] broad phase
//! over object bounds followed by an exact oriented-box test.

use std::collections::HashMap;

use gridsense_types::{LayerMask, ObjectId};

use crate::octree::{Aabb, Octree};
use crate::transform::{Quaternion, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Query volume
// ────────────────────────────────────────────────────────────────────────────

/// A box with arbitrary orientation: the query volume of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rotation: Quaternion,
}

impl OrientedBox {
    pub fn new(center: Vec3, half_extents: Vec3, rotation: Quaternion) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
            rotation,
        }
    }

    /// Smallest axis-aligned box enclosing this volume.
    pub fn bounding_box(&self) -> Aabb {
        let [ax, ay, az] = self.rotation.axes();
        let h = self.half_extents;
        let reach = ax.abs().scale(h.x).add(ay.abs().scale(h.y)).add(az.abs().scale(h.z));
        Aabb::new(self.center.sub(reach), self.center.add(reach))
    }

    /// Separating-axis test against an axis-aligned box.  Touching boxes
    /// count as overlapping.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let a_axes = self.rotation.axes();
        let a_half = [self.half_extents.x, self.half_extents.y, self.half_extents.z];
        let b_axes = [Vec3::X, Vec3::Y, Vec3::Z];
        let bh = aabb.half_extents();
        let b_half = [bh.x, bh.y, bh.z];
        let t = aabb.centre().sub(self.center);

        let separated = |axis: Vec3| -> bool {
            // Cross product of (nearly) parallel edges: no information.
            if axis.length_squared() < 1e-10 {
                return false;
            }
            let ra: f32 = (0..3).map(|i| a_half[i] * a_axes[i].dot(axis).abs()).sum();
            let rb: f32 = (0..3).map(|i| b_half[i] * b_axes[i].dot(axis).abs()).sum();
            t.dot(axis).abs() > ra + rb
        };

        if a_axes.iter().chain(b_axes.iter()).any(|&axis| separated(axis)) {
            return false;
        }
        for a in a_axes {
            for b in b_axes {
                if separated(a.cross(b)) {
                    return false;
                }
            }
        }
        true
    }
}

// ────────────────────────────────────────────────────────────────────────────
// World objects
// ────────────────────────────────────────────────────────────────────────────

/// An object the sensor can detect.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub id: ObjectId,
    /// Human-readable name, used in validation errors.
    pub name: String,
    /// Category tag matched against the sensor's detectable tags.
    pub tag: String,
    /// Layer number (`0..32`) matched against the query mask.
    pub layer: u8,
    pub bounds: Aabb,
    /// Free-form per-object values available to feature extractors.
    pub attributes: Vec<f32>,
}

impl WorldObject {
    /// Create an object on layer 0 with a fresh id and no attributes.
    pub fn new(name: impl Into<String>, tag: impl Into<String>, bounds: Aabb) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            tag: tag.into(),
            layer: 0,
            bounds,
            attributes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<f32>) -> Self {
        self.attributes = attributes;
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SpatialQuery
// ────────────────────────────────────────────────────────────────────────────

/// Read-only spatial query service used by the grid sensor.
pub trait SpatialQuery {
    /// Write the ids of objects on a layer selected by `mask` that overlap
    /// `volume` into `results`, returning how many slots were filled.
    ///
    /// Must not allocate per call and must never write past
    /// `results.len()`.  A return value equal to `results.len()` tells the
    /// caller the result may have been truncated.
    fn overlap_box(&self, volume: &OrientedBox, mask: LayerMask, results: &mut [ObjectId]) -> usize;

    /// Look up an object previously reported by [`overlap_box`][Self::overlap_box].
    fn object(&self, id: ObjectId) -> Option<&WorldObject>;
}

// ────────────────────────────────────────────────────────────────────────────
// SpatialIndex
// ────────────────────────────────────────────────────────────────────────────

/// In-memory [`SpatialQuery`] implementation backed by an [`Octree`].
///
/// # Example
///
/// ```rust
/// use gridsense_perception::octree::Aabb;
/// use gridsense_perception::spatial::{OrientedBox, SpatialIndex, SpatialQuery, WorldObject};
/// use gridsense_perception::transform::{Quaternion, Vec3};
/// use gridsense_types::{LayerMask, ObjectId};
///
/// let mut world = SpatialIndex::new(Aabb::new(Vec3::new(-50.0, -50.0, -50.0),
///                                             Vec3::new( 50.0,  50.0,  50.0)));
/// let apple = WorldObject::new("apple", "food",
///     Aabb::from_center(Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.2, 0.2, 0.2)));
/// let apple_id = apple.id;
/// assert!(world.insert(apple));
///
/// let probe = OrientedBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5),
///                              Quaternion::identity());
/// let mut slots = [ObjectId::default(); 4];
/// let found = world.overlap_box(&probe, LayerMask::ALL, &mut slots);
/// assert_eq!(found, 1);
/// assert_eq!(slots[0], apple_id);
/// ```
#[derive(Debug)]
pub struct SpatialIndex {
    tree: Octree<ObjectId>,
    objects: HashMap<ObjectId, WorldObject>,
}

impl SpatialIndex {
    /// Create an empty index covering `bounds`.
    pub fn new(bounds: Aabb) -> Self {
        Self::with_node_capacity(bounds, 8)
    }

    /// Create an empty index with an explicit octree leaf capacity.
    pub fn with_node_capacity(bounds: Aabb, capacity: usize) -> Self {
        Self {
            tree: Octree::new(bounds, capacity),
            objects: HashMap::new(),
        }
    }

    /// The region the index covers.
    pub fn bounds(&self) -> Aabb {
        self.tree.bounds()
    }

    /// Add an object.
    ///
    /// Returns `false` when an object with the same id already exists or when
    /// the object's bounds are not fully inside the index bounds.
    pub fn insert(&mut self, object: WorldObject) -> bool {
        if self.objects.contains_key(&object.id) {
            return false;
        }
        if !self.tree.insert(object.bounds, object.id) {
            return false;
        }
        self.objects.insert(object.id, object);
        true
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over every stored object in no particular order.
    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.values()
    }
}

impl SpatialQuery for SpatialIndex {
    fn overlap_box(&self, volume: &OrientedBox, mask: LayerMask, results: &mut [ObjectId]) -> usize {
        if results.is_empty() {
            return 0;
        }
        let broad = volume.bounding_box();
        let mut count = 0;
        self.tree.visit_overlapping(&broad, &mut |bounds, id| {
            if let Some(object) = self.objects.get(id)
                && mask.contains(object.layer)
                && volume.intersects_aabb(bounds)
            {
                results[count] = *id;
                count += 1;
            }
            count < results.len()
        });
        count
    }

    fn object(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
