//! Engine-side scene graph.
//!
//! Spatial objects (nodes, cameras, geometries) are stored in a [`Registry`]
//! and linked by parent/child keys. The graph itself never deletes anything
//! on its own: removal only happens through [`SceneGraph::remove_subtree`],
//! which the [`Engine`](crate::Engine) calls when an owner deletes an object.

use std::collections::BTreeMap;

use glam::Mat4;

use crate::engine::ObjectClass;
use crate::error::BindingError;
use crate::feature::FeatureId;
use crate::registry::{Key, Registry};

/// Handle of a spatial object inside the scene graph.
pub type SpatialId = Key<Spatial>;

/// Camera-specific state.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub projection: Mat4,
    pub orthogonal_projection_hint: bool,
}

/// Geometry-specific state: the geometry type used by render stages to pick
/// the geometries they draw, and the features put on the geometry per role.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryState {
    pub geometry_type: u32,
    pub(crate) features: BTreeMap<u32, FeatureId>,
}

impl GeometryState {
    /// Features keyed by role.
    pub fn features(&self) -> &BTreeMap<u32, FeatureId> {
        &self.features
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpatialKind {
    Node,
    Camera(CameraState),
    Geometry(GeometryState),
}

/// A spatial object of the scene graph.
#[derive(Debug, Clone)]
pub struct Spatial {
    kind: SpatialKind,
    parent: Option<SpatialId>,
    children: Vec<SpatialId>,
    tag: String,
    movable: bool,
    local_transform: Mat4,
    world_transform: Mat4,
}

impl Spatial {
    fn with_kind(kind: SpatialKind, tag: &str) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            tag: tag.to_owned(),
            movable: true,
            local_transform: Mat4::IDENTITY,
            world_transform: Mat4::IDENTITY,
        }
    }

    pub fn node(tag: &str) -> Self {
        Self::with_kind(SpatialKind::Node, tag)
    }

    pub fn camera() -> Self {
        Self::with_kind(
            SpatialKind::Camera(CameraState {
                projection: Mat4::IDENTITY,
                orthogonal_projection_hint: false,
            }),
            "",
        )
    }

    pub fn geometry(geometry_type: u32, tag: &str) -> Self {
        Self::with_kind(
            SpatialKind::Geometry(GeometryState {
                geometry_type,
                features: BTreeMap::new(),
            }),
            tag,
        )
    }

    pub fn class(&self) -> ObjectClass {
        match self.kind {
            SpatialKind::Node => ObjectClass::Node,
            SpatialKind::Camera(_) => ObjectClass::Camera,
            SpatialKind::Geometry(_) => ObjectClass::Geometry,
        }
    }

    pub fn kind(&self) -> &SpatialKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut SpatialKind {
        &mut self.kind
    }

    pub fn parent(&self) -> Option<SpatialId> {
        self.parent
    }

    pub fn children(&self) -> &[SpatialId] {
        &self.children
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    pub fn is_movable(&self) -> bool {
        self.movable
    }

    pub fn set_movable(&mut self, movable: bool) {
        self.movable = movable;
    }

    pub fn local_transform(&self) -> Mat4 {
        self.local_transform
    }

    pub fn set_local_transform(&mut self, transform: Mat4) {
        self.local_transform = transform;
    }

    /// World transform as of the last [`SceneGraph::update_world_transform`].
    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }
}

/// Arena of spatial objects with parent/child links.
#[derive(Default)]
pub struct SceneGraph {
    spatials: Registry<Spatial>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, spatial: Spatial) -> SpatialId {
        self.spatials.insert(spatial)
    }

    /// Returns the spatial object, or `StaleObject` if it was deleted.
    pub fn get(&self, id: SpatialId) -> Result<&Spatial, BindingError> {
        self.spatials
            .get(id)
            .ok_or(BindingError::StaleObject("spatial"))
    }

    pub fn get_mut(&mut self, id: SpatialId) -> Result<&mut Spatial, BindingError> {
        self.spatials
            .get_mut(id)
            .ok_or(BindingError::StaleObject("spatial"))
    }

    pub fn contains(&self, id: SpatialId) -> bool {
        self.spatials.contains(id)
    }

    /// Number of live spatial objects.
    pub fn len(&self) -> usize {
        self.spatials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spatials.is_empty()
    }

    pub fn has_parent(&self, id: SpatialId) -> Result<bool, BindingError> {
        Ok(self.get(id)?.parent.is_some())
    }

    /// Links `child` below `parent`.
    ///
    /// The parent must be a node, the child must be free, and the link must
    /// not close a cycle. Nothing is modified when a check fails.
    pub fn attach_child(&mut self, parent: SpatialId, child: SpatialId) -> Result<(), BindingError> {
        let parent_class = self.get(parent)?.class();
        if parent_class != ObjectClass::Node {
            return Err(BindingError::KindMismatch {
                expected: "node",
                found: parent_class.name(),
            });
        }
        if self.has_parent(child)? {
            return Err(BindingError::AlreadyOwned {
                object: "spatial",
                owner: "node",
            });
        }
        if parent == child || self.is_descendant(child, parent)? {
            return Err(BindingError::CircularRelation);
        }

        self.get_mut(child)?.parent = Some(parent);
        self.get_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Unlinks `id` from its parent. Does nothing if it has none.
    pub fn detach_from_parent(&mut self, id: SpatialId) -> Result<(), BindingError> {
        let Some(parent) = self.get_mut(id)?.parent.take() else {
            return Ok(());
        };
        if let Ok(parent) = self.get_mut(parent) {
            parent.children.retain(|&c| c != id);
        }
        Ok(())
    }

    /// Calls `f` for the children of `id` in depth-first pre-order.
    ///
    /// With `recursive == false` only the direct children are visited.
    pub fn visit_children(
        &self,
        id: SpatialId,
        recursive: bool,
        mut f: impl FnMut(SpatialId),
    ) -> Result<(), BindingError> {
        let mut stack: Vec<SpatialId> = self.get(id)?.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            f(current);
            if recursive {
                stack.extend(self.get(current)?.children.iter().rev().copied());
            }
        }
        Ok(())
    }

    /// Whether `candidate` lies somewhere below `ancestor`.
    pub fn is_descendant(&self, ancestor: SpatialId, candidate: SpatialId) -> Result<bool, BindingError> {
        let mut found = false;
        self.visit_children(ancestor, true, |id| found |= id == candidate)?;
        Ok(found)
    }

    /// Follows parent links up to the topmost ancestor.
    pub fn root_of(&self, id: SpatialId) -> Result<SpatialId, BindingError> {
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Recomputes world transforms for `id` and its whole subtree.
    ///
    /// The world transform of `id` itself is its parent's (possibly stale)
    /// world transform times its local transform.
    pub fn update_world_transform(&mut self, id: SpatialId) -> Result<(), BindingError> {
        let base = match self.get(id)?.parent {
            Some(parent) => self.get(parent)?.world_transform,
            None => Mat4::IDENTITY,
        };

        let mut stack = vec![(id, base)];
        while let Some((current, parent_world)) = stack.pop() {
            let spatial = self.get_mut(current)?;
            spatial.world_transform = parent_world * spatial.local_transform;
            let world = spatial.world_transform;
            stack.extend(spatial.children.iter().map(|&c| (c, world)));
        }
        Ok(())
    }

    /// Detaches `id` and removes it together with all of its descendants.
    ///
    /// Returns the removed objects in post-order (children before parents).
    pub(crate) fn remove_subtree(&mut self, id: SpatialId) -> Result<Vec<(SpatialId, Spatial)>, BindingError> {
        self.detach_from_parent(id)?;

        let mut order = vec![id];
        self.visit_children(id, true, |child| order.push(child))?;

        Ok(order
            .into_iter()
            .rev()
            .filter_map(|key| self.spatials.remove(key).map(|s| (key, s)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn graph_with_chain() -> (SceneGraph, SpatialId, SpatialId, SpatialId) {
        let mut graph = SceneGraph::new();
        let a = graph.insert(Spatial::node("a"));
        let b = graph.insert(Spatial::node("b"));
        let c = graph.insert(Spatial::node("c"));
        graph.attach_child(a, b).unwrap();
        graph.attach_child(b, c).unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn new_spatial_has_identity_transform_and_defaults() {
        let node = Spatial::node("root");
        assert_eq!(node.tag(), "root");
        assert!(node.is_movable());
        assert_eq!(node.local_transform(), Mat4::IDENTITY);
        assert!(node.parent().is_none());
    }

    #[test]
    fn attach_child_links_both_directions() {
        let (graph, a, b, _) = graph_with_chain();
        assert_eq!(graph.get(b).unwrap().parent(), Some(a));
        assert_eq!(graph.get(a).unwrap().children(), &[b]);
    }

    #[test]
    fn attach_to_non_node_is_rejected() {
        let mut graph = SceneGraph::new();
        let camera = graph.insert(Spatial::camera());
        let node = graph.insert(Spatial::node(""));
        let result = graph.attach_child(camera, node);
        assert!(matches!(
            result,
            Err(BindingError::KindMismatch { expected: "node", .. })
        ));
    }

    #[test]
    fn attach_already_parented_child_fails() {
        let (mut graph, _, _, c) = graph_with_chain();
        let other = graph.insert(Spatial::node(""));
        let result = graph.attach_child(other, c);
        assert!(matches!(result, Err(BindingError::AlreadyOwned { .. })));
    }

    #[test]
    fn attach_ancestor_below_descendant_is_circular() {
        let (mut graph, a, _, c) = graph_with_chain();
        let result = graph.attach_child(c, a);
        assert!(matches!(result, Err(BindingError::CircularRelation)));
        assert!(graph.get(c).unwrap().children().is_empty());
    }

    #[test]
    fn attach_to_self_is_circular() {
        let mut graph = SceneGraph::new();
        let a = graph.insert(Spatial::node(""));
        assert!(matches!(
            graph.attach_child(a, a),
            Err(BindingError::CircularRelation)
        ));
    }

    #[test]
    fn detach_is_idempotent() {
        let (mut graph, a, b, _) = graph_with_chain();
        graph.detach_from_parent(b).unwrap();
        graph.detach_from_parent(b).unwrap();
        assert!(!graph.has_parent(b).unwrap());
        assert!(graph.get(a).unwrap().children().is_empty());
    }

    #[test]
    fn visit_children_is_preorder() {
        let mut graph = SceneGraph::new();
        let root = graph.insert(Spatial::node("root"));
        let left = graph.insert(Spatial::node("left"));
        let leaf = graph.insert(Spatial::node("leaf"));
        let right = graph.insert(Spatial::node("right"));
        graph.attach_child(root, left).unwrap();
        graph.attach_child(left, leaf).unwrap();
        graph.attach_child(root, right).unwrap();

        let mut visited = Vec::new();
        graph.visit_children(root, true, |id| visited.push(id)).unwrap();
        assert_eq!(visited, vec![left, leaf, right]);

        let mut direct = Vec::new();
        graph.visit_children(root, false, |id| direct.push(id)).unwrap();
        assert_eq!(direct, vec![left, right]);
    }

    #[test]
    fn root_of_follows_parents() {
        let (graph, a, _, c) = graph_with_chain();
        assert_eq!(graph.root_of(c).unwrap(), a);
        assert_eq!(graph.root_of(a).unwrap(), a);
    }

    #[test]
    fn update_world_transform_composes_parents() {
        let (mut graph, a, b, c) = graph_with_chain();
        graph
            .get_mut(a)
            .unwrap()
            .set_local_transform(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        graph
            .get_mut(b)
            .unwrap()
            .set_local_transform(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        graph.update_world_transform(a).unwrap();

        let world = graph.get(c).unwrap().world_transform();
        assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn remove_subtree_returns_children_first() {
        let (mut graph, a, b, c) = graph_with_chain();
        let removed: Vec<SpatialId> = graph
            .remove_subtree(b)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(removed, vec![c, b]);
        assert!(graph.contains(a));
        assert!(!graph.contains(b));
        assert!(graph.get(a).unwrap().children().is_empty());
    }

    #[test]
    fn stale_id_reports_stale_object() {
        let mut graph = SceneGraph::new();
        let a = graph.insert(Spatial::node(""));
        graph.remove_subtree(a).unwrap();
        assert!(matches!(graph.get(a), Err(BindingError::StaleObject(_))));
    }
}
