// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Renderable tile output.
//!
//! A [`SceneNode`] is what the pager hands to the renderer and what the
//! tile cache stores. Fields marked `#[serde(skip)]` are render-time
//! attachments; they never reach the cache.

use serde::{Deserialize, Serialize};
use skyline_core::FeatureId;
use skyline_geometry::{BoundingBox3, Matrix4, Mesh, Point3};

/// Names of the groups inside a tile graph
pub const GEODES_ROOT: &str = "_skl_geo";
pub const EXTERNALS_ROOT: &str = "_skl_ext";
pub const INSTANCES_ROOT: &str = "_skl_inr";
pub const DEBUG_ROOT: &str = "_skl_deb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Primitive {
    #[default]
    Triangles,
    LineLoop,
}

/// Texture binding of a drawable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureRef {
    pub uri: String,
    /// Release the image once uploaded. Cached graphs share images across
    /// tiles, so this is always cleared before caching.
    #[serde(default)]
    pub unref_after_apply: bool,
}

impl TextureRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            unref_after_apply: true,
        }
    }
}

/// One batch of geometry with uniform appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawable {
    pub mesh: Mesh,
    pub color: [f32; 4],
    #[serde(default)]
    pub texture: Option<TextureRef>,
    #[serde(default)]
    pub primitive: Primitive,
    /// Feature that produced this drawable, while it is still unmerged
    #[serde(skip)]
    pub user_data: Option<FeatureId>,
}

impl Drawable {
    pub fn new(mesh: Mesh, color: [f32; 4]) -> Self {
        Self {
            mesh,
            color,
            texture: None,
            primitive: Primitive::Triangles,
            user_data: None,
        }
    }

    pub fn with_texture(mut self, texture: Option<TextureRef>) -> Self {
        self.texture = texture;
        self
    }

    pub fn line_loop(mut self) -> Self {
        self.primitive = Primitive::LineLoop;
        self
    }

    /// Same look, so the two can share one merged batch
    pub fn same_state(&self, other: &Drawable) -> bool {
        self.color == other.color
            && self.primitive == other.primitive
            && self.texture.as_ref().map(|t| &t.uri) == other.texture.as_ref().map(|t| &t.uri)
    }
}

/// Drawables of one tag, visible up to `max_range`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodBucket {
    pub tag: String,
    pub min_range: f64,
    pub max_range: f64,
    pub drawables: Vec<Drawable>,
}

/// Loaded model used for instancing and external buildings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNode {
    pub name: String,
    pub drawables: Vec<Drawable>,
}

impl ModelNode {
    pub fn new(name: impl Into<String>, drawables: Vec<Drawable>) -> Self {
        Self {
            name: name.into(),
            drawables,
        }
    }

    pub fn bounds(&self) -> BoundingBox3 {
        let mut bounds = BoundingBox3::empty();
        for d in &self.drawables {
            bounds.expand_by_box(&d.mesh.bounds());
        }
        bounds
    }
}

/// One copy of a model placed at many transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub model: ModelNode,
    pub matrices: Vec<Matrix4<f64>>,
    pub max_range: f64,
}

impl InstanceGroup {
    /// Bounds of every placed copy
    pub fn bounds(&self) -> BoundingBox3 {
        let mut bbox = BoundingBox3::empty();
        let model = self.model.bounds();
        if !model.is_valid() {
            return bbox;
        }
        for m in &self.matrices {
            for corner in box_corners(&model) {
                bbox.expand(&m.transform_point(&corner));
            }
        }
        bbox
    }
}

/// A model standing in for a whole building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalModel {
    pub uri: String,
    pub matrix: Matrix4<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn is_valid(&self) -> bool {
        self.radius >= 0.0
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            radius: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    pub local_to_world: Matrix4<f64>,
    pub geodes: Vec<LodBucket>,
    pub externals: Vec<ExternalModel>,
    pub instances: Vec<InstanceGroup>,
    pub debug: Vec<Drawable>,
    /// Bounds in the tile's local frame
    pub bound: BoundingSphere,
    /// Render state installed by post-processing
    #[serde(skip)]
    pub attachments: Vec<String>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, local_to_world: Matrix4<f64>) -> Self {
        Self {
            name: name.into(),
            local_to_world,
            geodes: Vec::new(),
            externals: Vec::new(),
            instances: Vec::new(),
            debug: Vec::new(),
            bound: BoundingSphere::default(),
            attachments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.geodes.is_empty() && self.externals.is_empty() && self.instances.is_empty()
    }

    pub fn drawable_count(&self) -> usize {
        self.geodes.iter().map(|b| b.drawables.len()).sum()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.iter().map(|g| g.matrices.len()).sum()
    }

    pub fn bucket(&self, tag: &str) -> Option<&LodBucket> {
        self.geodes.iter().find(|b| b.tag == tag)
    }

    pub fn is_post_processed(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Recompute `bound` from every drawable, instance and external
    pub fn compute_bound(&mut self) {
        let mut bbox = BoundingBox3::empty();
        for d in self.geodes.iter().flat_map(|b| &b.drawables).chain(&self.debug) {
            bbox.expand_by_box(&d.mesh.bounds());
        }
        for group in &self.instances {
            let group_box = group.bounds();
            if group_box.is_valid() {
                bbox.expand_by_box(&group_box);
            }
        }
        for ext in &self.externals {
            bbox.expand(&ext.matrix.transform_point(&Point3::origin()));
        }

        self.bound = if bbox.is_valid() {
            BoundingSphere {
                center: bbox.center(),
                radius: bbox.radius(),
            }
        } else {
            BoundingSphere::default()
        };
    }

    /// Strip anything that must not be persisted
    pub fn prepare_for_caching(&mut self) {
        self.attachments.clear();
        let drawables = self
            .geodes
            .iter_mut()
            .flat_map(|b| b.drawables.iter_mut())
            .chain(self.debug.iter_mut())
            .chain(
                self.instances
                    .iter_mut()
                    .flat_map(|g| g.model.drawables.iter_mut()),
            );
        for d in drawables {
            d.user_data = None;
            if let Some(t) = &mut d.texture {
                t.unref_after_apply = false;
            }
        }
    }
}

fn box_corners(b: &BoundingBox3) -> [Point3<f64>; 8] {
    [
        Point3::new(b.min.x, b.min.y, b.min.z),
        Point3::new(b.max.x, b.min.y, b.min.z),
        Point3::new(b.min.x, b.max.y, b.min.z),
        Point3::new(b.max.x, b.max.y, b.min.z),
        Point3::new(b.min.x, b.min.y, b.max.z),
        Point3::new(b.max.x, b.min.y, b.max.z),
        Point3::new(b.min.x, b.max.y, b.max.z),
        Point3::new(b.max.x, b.max.y, b.max.z),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyline_geometry::transform::translation;
    use skyline_geometry::Vector3;

    fn unit_quad() -> Mesh {
        let mut mesh = Mesh::new();
        let n = Vector3::z();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0), n);
        let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0), n);
        let c = mesh.add_vertex(Point3::new(1.0, 1.0, 0.0), n);
        let d = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0), n);
        mesh.add_triangle(a, b, c);
        mesh.add_triangle(a, c, d);
        mesh
    }

    #[test]
    fn test_prepare_for_caching_strips_transients() {
        let mut node = SceneNode::new("t", Matrix4::identity());
        let mut d = Drawable::new(unit_quad(), [1.0; 4]).with_texture(Some(TextureRef::new("a.png")));
        d.user_data = Some(7);
        node.geodes.push(LodBucket {
            tag: String::new(),
            min_range: 0.0,
            max_range: f64::MAX,
            drawables: vec![d],
        });
        node.attachments.push("shader".into());

        node.prepare_for_caching();
        let d = &node.geodes[0].drawables[0];
        assert!(d.user_data.is_none());
        assert!(!d.texture.as_ref().unwrap().unref_after_apply);
        assert!(!node.is_post_processed());
    }

    #[test]
    fn test_serde_skips_attachments() {
        let mut node = SceneNode::new("t", translation(1.0, 2.0, 3.0));
        node.attachments.push("shader".into());
        let json = serde_json::to_string(&node).unwrap();
        let back: SceneNode = serde_json::from_str(&json).unwrap();
        assert!(back.attachments.is_empty());
        assert_eq!(back.local_to_world, node.local_to_world);
    }

    #[test]
    fn test_bound_includes_instances() {
        let mut node = SceneNode::new("t", Matrix4::identity());
        node.instances.push(InstanceGroup {
            model: ModelNode::new("m", vec![Drawable::new(unit_quad(), [1.0; 4])]),
            matrices: vec![translation(10.0, 0.0, 0.0)],
            max_range: 100.0,
        });
        node.compute_bound();
        assert!(node.bound.is_valid());
        assert!((node.bound.center.x - 10.5).abs() < 1e-9);
        assert_eq!(node.instance_count(), 1);
    }
}
