//! Reduce a cell's candidates to the single object it reports.

use gridsense_types::ObjectId;

use crate::spatial::{SpatialQuery, WorldObject};
use crate::transform::Vec3;

/// The object chosen to represent one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedObject {
    pub id: ObjectId,
    /// Position of the object's tag in the detectable tag list.
    pub tag_index: usize,
    /// Distance from the observer scaled by the grid's inverse sphere radius.
    pub normalized_distance: f32,
}

impl DetectedObject {
    /// Category value reported for this object: `tag_index + 1`, leaving 0
    /// for "nothing detected".
    pub fn category(&self) -> f32 {
        (self.tag_index + 1) as f32
    }
}

/// Index of the first detectable tag matching `object`.
pub fn tag_index(object: &WorldObject, tags: &[String]) -> Option<usize> {
    tags.iter().position(|t| *t == object.tag)
}

/// Pick the detectable candidate closest to the observer.
///
/// The observer's own object (`root`) is skipped, as are candidates whose
/// tag is not in `tags` or that the world no longer knows.  Distance is
/// measured from `observer` to the point of the candidate's bounds nearest
/// `cell_center`.  On equal distances the earlier candidate wins.
pub fn select_closest<W>(
    world: &W,
    candidates: &[ObjectId],
    tags: &[String],
    root: Option<ObjectId>,
    observer: Vec3,
    cell_center: Vec3,
    inverse_sphere_radius: f32,
) -> Option<DetectedObject>
where
    W: SpatialQuery + ?Sized,
{
    let mut best: Option<(ObjectId, usize)> = None;
    let mut min_distance_squared = f32::MAX;

    for &id in candidates {
        if root == Some(id) {
            continue;
        }
        let Some(object) = world.object(id) else {
            continue;
        };
        let Some(index) = tag_index(object, tags) else {
            continue;
        };
        let closest = object.bounds.closest_point(cell_center);
        let distance_squared = closest.sub(observer).length_squared();
        if distance_squared < min_distance_squared {
            min_distance_squared = distance_squared;
            best = Some((id, index));
        }
    }

    best.map(|(id, tag_index)| DetectedObject {
        id,
        tag_index,
        normalized_distance: min_distance_squared.sqrt() * inverse_sphere_radius,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::Aabb;
    use crate::spatial::SpatialIndex;

    fn tags() -> Vec<String> {
        vec!["food".to_string(), "wall".to_string()]
    }

    fn world_with(objects: Vec<WorldObject>) -> (SpatialIndex, Vec<ObjectId>) {
        let mut world =
            SpatialIndex::new(Aabb::new(Vec3::new(-50.0, -50.0, -50.0), Vec3::new(50.0, 50.0, 50.0)));
        let ids = objects.iter().map(|o| o.id).collect();
        for o in objects {
            assert!(world.insert(o));
        }
        (world, ids)
    }

    fn cube(name: &str, tag: &str, x: f32, z: f32) -> WorldObject {
        WorldObject::new(name, tag, Aabb::from_center(Vec3::new(x, 0.0, z), Vec3::new(0.25, 0.25, 0.25)))
    }

    #[test]
    fn nearest_detectable_wins() {
        let (world, ids) = world_with(vec![
            cube("far", "food", 4.0, 0.0),
            cube("near", "wall", 2.0, 0.0),
        ]);
        let hit = select_closest(&world, &ids, &tags(), None, Vec3::zero(), Vec3::new(3.0, 0.0, 0.0), 1.0)
            .unwrap();
        assert_eq!(hit.id, ids[1]);
        assert_eq!(hit.tag_index, 1);
        assert_eq!(hit.category(), 2.0);
        // Closest bounds point of "near" to (3,0,0) is (2.25,0,0).
        assert!((hit.normalized_distance - 2.25).abs() < 1e-5);
    }

    #[test]
    fn undetectable_tags_are_ignored() {
        let (world, ids) = world_with(vec![cube("rock", "scenery", 1.0, 0.0)]);
        assert!(select_closest(&world, &ids, &tags(), None, Vec3::zero(), Vec3::zero(), 1.0).is_none());
    }

    #[test]
    fn observer_object_is_skipped() {
        let (world, ids) = world_with(vec![
            cube("self", "food", 0.0, 0.0),
            cube("other", "food", 3.0, 0.0),
        ]);
        let hit = select_closest(&world, &ids, &tags(), Some(ids[0]), Vec3::zero(), Vec3::zero(), 1.0)
            .unwrap();
        assert_eq!(hit.id, ids[1]);
    }

    #[test]
    fn equal_distances_pick_one_of_the_tied() {
        let (world, ids) = world_with(vec![
            cube("left", "food", -2.0, 0.0),
            cube("right", "wall", 2.0, 0.0),
        ]);
        let hit = select_closest(&world, &ids, &tags(), None, Vec3::zero(), Vec3::zero(), 1.0).unwrap();
        assert!(ids.contains(&hit.id));
        assert!((hit.normalized_distance - 1.75).abs() < 1e-5);
    }

    #[test]
    fn distance_is_scaled_by_inverse_radius() {
        let (world, ids) = world_with(vec![cube("a", "food", 0.0, 3.75)]);
        let hit = select_closest(&world, &ids, &tags(), None, Vec3::zero(), Vec3::new(0.0, 0.0, 5.0), 0.5)
            .unwrap();
        assert!((hit.normalized_distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn first_matching_tag_defines_index() {
        let duplicated = vec!["food".to_string(), "food".to_string()];
        let (world, ids) = world_with(vec![cube("a", "food", 1.0, 0.0)]);
        let hit = select_closest(&world, &ids, &duplicated, None, Vec3::zero(), Vec3::zero(), 1.0).unwrap();
        assert_eq!(hit.tag_index, 0);
    }
}
