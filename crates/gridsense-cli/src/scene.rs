//! Scene files – TOML descriptions of an observer and the objects around it.
//!
//! ```toml
//! [observer]
//! position = [0.0, 0.0, 0.0]
//! yaw_degrees = 90.0
//! body = "agent"          # optional: object the sensor must ignore
//!
//! [[objects]]
//! name = "apple"
//! tag = "food"
//! center = [2.0, 0.0, 1.0]
//! half_extents = [0.3, 0.3, 0.3]
//! attributes = [1.0]
//! ```

use gridsense_perception::octree::Aabb;
use gridsense_perception::sensor::Observer;
use gridsense_perception::spatial::{SpatialIndex, WorldObject};
use gridsense_perception::transform::{Pose, Quaternion, Vec3};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Space left around the scene's content when sizing the spatial index.
const INDEX_MARGIN: f32 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ObserverSpec {
    #[serde(default)]
    pub position: [f32; 3],
    /// Heading about +y, in degrees; positive turns +z towards +x.
    #[serde(default)]
    pub yaw_degrees: f32,
    /// Name of the object representing the observer itself.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectSpec {
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub layer: u8,
    pub center: [f32; 3],
    #[serde(default = "default_half_extents")]
    pub half_extents: [f32; 3],
    #[serde(default)]
    pub attributes: Vec<f32>,
}

fn default_half_extents() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub observer: ObserverSpec,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
}

fn vec3(v: [f32; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

impl Scene {
    /// Parse a scene document.
    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("Failed to parse scene: {}", e))
    }

    /// Read and parse a scene file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scene at {}: {}", path.display(), e))?;
        Self::parse(&raw)
    }

    /// Build the spatial index and observer described by this scene.
    pub fn build(&self) -> Result<(SpatialIndex, Observer), String> {
        let position = vec3(self.observer.position);
        let pose = Pose::new(position, Quaternion::from_yaw(self.observer.yaw_degrees.to_radians()));

        let objects: Vec<WorldObject> = self
            .objects
            .iter()
            .map(|entry| {
                WorldObject::new(
                    entry.name.clone(),
                    entry.tag.clone(),
                    Aabb::from_center(vec3(entry.center), vec3(entry.half_extents)),
                )
                .with_layer(entry.layer)
                .with_attributes(entry.attributes.clone())
            })
            .collect();

        let bounds = objects
            .iter()
            .fold(Aabb::new(position, position), |acc, o| acc.union(&o.bounds))
            .expanded(INDEX_MARGIN);

        let mut observer = Observer::new(pose);
        if let Some(body) = &self.observer.body {
            let id = objects
                .iter()
                .find(|o| o.name == *body)
                .map(|o| o.id)
                .ok_or_else(|| format!("Observer body '{}' is not an object in the scene", body))?;
            observer = observer.with_root(id);
        }

        let mut index = SpatialIndex::new(bounds);
        for object in objects {
            let name = object.name.clone();
            if !index.insert(object) {
                return Err(format!("Object '{}' could not be indexed (invalid bounds?)", name));
            }
        }
        Ok((index, observer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsense_perception::sensor::ObserverTransform;

    const SCENE: &str = r#"
        [observer]
        position = [1.0, 0.0, 2.0]
        yaw_degrees = 90.0
        body = "agent"

        [[objects]]
        name = "agent"
        tag = "agent"
        center = [1.0, 0.0, 2.0]

        [[objects]]
        name = "apple"
        tag = "food"
        layer = 3
        center = [4.0, 0.0, 2.0]
        half_extents = [0.2, 0.2, 0.2]
        attributes = [0.5]
    "#;

    #[test]
    fn parse_reads_observer_and_objects() {
        let scene = Scene::parse(SCENE).expect("parse");
        assert_eq!(scene.observer.position, [1.0, 0.0, 2.0]);
        assert_eq!(scene.observer.body.as_deref(), Some("agent"));
        assert_eq!(scene.objects.len(), 2);
        assert_eq!(scene.objects[0].half_extents, [0.5, 0.5, 0.5]);
        assert_eq!(scene.objects[1].layer, 3);
    }

    #[test]
    fn build_indexes_every_object() {
        let (index, observer) = Scene::parse(SCENE).expect("parse").build().expect("build");
        assert_eq!(index.len(), 2);

        let body = index.objects().find(|o| o.name == "agent").expect("agent");
        assert_eq!(observer.root(), Some(body.id));

        let apple = index.objects().find(|o| o.name == "apple").expect("apple");
        assert_eq!(apple.layer, 3);
        assert_eq!(apple.attributes, vec![0.5]);
        assert!(index.bounds().contains_box(&apple.bounds));
    }

    #[test]
    fn build_applies_yaw() {
        let (_, observer) = Scene::parse(SCENE).expect("parse").build().expect("build");
        let forward = observer.pose().transform_point(Vec3::new(0.0, 0.0, 1.0));
        assert!((forward.x - 2.0).abs() < 1e-5);
        assert!((forward.z - 2.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_body_is_an_error() {
        let scene = Scene::parse("[observer]\nbody = \"ghost\"\n").expect("parse");
        let err = scene.build().unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[test]
    fn empty_scene_builds_empty_index() {
        let (index, observer) = Scene::default().build().expect("build");
        assert!(index.is_empty());
        assert_eq!(observer.root(), None);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let err = Scene::parse("[[objects]]\nname = \"x\"\n").unwrap_err();
        assert!(err.contains("Failed to parse scene"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("scene.toml");
        std::fs::write(&path, SCENE).expect("write");
        assert_eq!(Scene::load(&path).expect("load").objects.len(), 2);
        assert!(Scene::load(&dir.path().join("missing.toml")).is_err());
    }
}
