//! Views over scene graph objects: nodes, cameras and geometries.
//!
//! A spatial view is owned by the node view it is attached to. Attaching
//! transfers deletion duty to the parent; detaching hands it back.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Mat4;
use log::warn;

use crate::engine::EngineRef;
use crate::error::BindingError;
use crate::feature::FeatureView;
use crate::ownership::{Locks, Managed, View};
use crate::scene::{CameraState, Spatial, SpatialId, SpatialKind};

/// Engine-side handle of a spatial object.
pub struct SpatialHandle {
    engine: EngineRef,
    id: SpatialId,
}

impl SpatialHandle {
    fn create(engine: &EngineRef, spatial: Spatial) -> Self {
        let id = engine.borrow_mut().create_spatial(spatial);
        Self {
            engine: Rc::clone(engine),
            id,
        }
    }

    pub fn id(&self) -> SpatialId {
        self.id
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    fn read<R>(&self, f: impl FnOnce(&Spatial) -> R) -> Result<R, BindingError> {
        Ok(f(self.engine.borrow().scene().get(self.id)?))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Spatial) -> R) -> Result<R, BindingError> {
        Ok(f(self.engine.borrow_mut().scene_mut().get_mut(self.id)?))
    }

    pub fn has_parent(&self) -> Result<bool, BindingError> {
        self.read(|s| s.parent().is_some())
    }

    pub fn tag(&self) -> Result<String, BindingError> {
        self.read(|s| s.tag().to_owned())
    }

    pub fn set_tag(&self, tag: &str) -> Result<(), BindingError> {
        self.write(|s| s.set_tag(tag))
    }

    pub fn is_movable(&self) -> Result<bool, BindingError> {
        self.read(Spatial::is_movable)
    }

    pub fn set_movable(&self, movable: bool) -> Result<(), BindingError> {
        self.write(|s| s.set_movable(movable))
    }

    pub fn local_transform(&self) -> Result<Mat4, BindingError> {
        self.read(Spatial::local_transform)
    }

    pub fn set_local_transform(&self, transform: Mat4) -> Result<(), BindingError> {
        self.write(|s| s.set_local_transform(transform))
    }

    pub fn update_world_transform(&self) -> Result<(), BindingError> {
        self.engine.borrow_mut().scene_mut().update_world_transform(self.id)
    }

    pub fn world_transform(&self) -> Result<Mat4, BindingError> {
        self.read(Spatial::world_transform)
    }

    fn delete(&self, kind: &str) {
        if let Err(err) = self.engine.borrow_mut().delete_spatial(self.id) {
            warn!("deleting {kind} failed: {err}");
        }
    }
}

impl fmt::Debug for SpatialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialHandle").field("id", &self.id).finish()
    }
}

/// Access to the spatial handle of a node, camera or geometry.
pub trait AsSpatial {
    fn spatial(&self) -> &SpatialHandle;
}

#[derive(Debug)]
pub struct Node {
    spatial: SpatialHandle,
    locks: RefCell<Locks>,
}

#[derive(Debug)]
pub struct Camera {
    spatial: SpatialHandle,
}

#[derive(Debug)]
pub struct Geometry {
    spatial: SpatialHandle,
}

pub type NodeView = View<Node>;
pub type CameraView = View<Camera>;
pub type GeometryView = View<Geometry>;

impl AsSpatial for Node {
    fn spatial(&self) -> &SpatialHandle {
        &self.spatial
    }
}

impl AsSpatial for Camera {
    fn spatial(&self) -> &SpatialHandle {
        &self.spatial
    }
}

impl AsSpatial for Geometry {
    fn spatial(&self) -> &SpatialHandle {
        &self.spatial
    }
}

impl Managed for Node {
    type Owner = NodeView;
    const KIND: &'static str = "node";
    const OWNER_KIND: &'static str = "node";

    fn delete(&self) {
        self.spatial.delete(Self::KIND);
    }

    /// An owned node hands its locks to its parent, which outlives the
    /// engine object they protect.
    fn retire(&self, owner: Option<&Rc<NodeView>>) {
        if let Some(owner) = owner {
            let locks = std::mem::take(&mut *self.locks.borrow_mut());
            owner.object().locks.borrow_mut().absorb(locks);
        }
    }
}

impl Managed for Camera {
    type Owner = NodeView;
    const KIND: &'static str = "camera";
    const OWNER_KIND: &'static str = "node";

    fn delete(&self) {
        self.spatial.delete(Self::KIND);
    }
}

impl Managed for Geometry {
    type Owner = NodeView;
    const KIND: &'static str = "geometry";
    const OWNER_KIND: &'static str = "node";

    fn delete(&self) {
        self.spatial.delete(Self::KIND);
    }
}

/// Operations shared by every spatial view.
impl<T> View<T>
where
    T: Managed<Owner = NodeView> + AsSpatial,
{
    pub fn id(&self) -> SpatialId {
        self.object().spatial().id()
    }

    pub fn engine(&self) -> &EngineRef {
        self.object().spatial().engine()
    }

    pub fn spatial(&self) -> &SpatialHandle {
        self.object().spatial()
    }

    pub fn has_parent(&self) -> Result<bool, BindingError> {
        self.spatial().has_parent()
    }

    /// Detaches from the parent node and takes back deletion duty.
    /// Does nothing if there is no parent.
    pub fn detach_from_parent(&self) -> Result<(), BindingError> {
        self.release(|| self.engine().borrow_mut().detach_from_parent(self.id()))
    }
}

impl View<Node> {
    pub fn create(engine: &EngineRef, tag: &str) -> Rc<Self> {
        View::new(Node {
            spatial: SpatialHandle::create(engine, Spatial::node(tag)),
            locks: RefCell::new(Locks::new()),
        })
    }

    /// Attaches `child` below this node.
    ///
    /// Fails with `AlreadyOwned` if the child already has a parent and with
    /// `CircularRelation` if this node is the child or lies in its subtree.
    pub fn attach_child<T>(self: &Rc<Self>, child: &View<T>) -> Result<(), BindingError>
    where
        T: Managed<Owner = NodeView> + AsSpatial,
    {
        if !Rc::ptr_eq(self.engine(), child.engine()) {
            return Err(BindingError::EngineMismatch);
        }
        let (parent_id, child_id) = (self.id(), child.id());
        {
            let engine = self.engine().borrow();
            let scene = engine.scene();
            if scene.has_parent(child_id)? {
                return Err(BindingError::AlreadyOwned {
                    object: T::KIND,
                    owner: T::OWNER_KIND,
                });
            }
            if parent_id == child_id || scene.is_descendant(child_id, parent_id)? {
                return Err(BindingError::CircularRelation);
            }
        }
        child.adopt(self, || {
            self.engine().borrow_mut().attach_child(parent_id, child_id)
        })
    }

    /// Number of direct children.
    pub fn children(&self) -> Result<usize, BindingError> {
        self.spatial().read(|s| s.children().len())
    }

    /// Keeps `lock` alive for as long as this node's engine object exists.
    pub fn lock(&self, lock: Rc<dyn Any>) -> bool {
        self.object().locks.borrow_mut().insert(lock)
    }

    pub fn locks_count(&self) -> usize {
        self.object().locks.borrow().len()
    }

    pub fn holds_lock(&self, lock: &Rc<dyn Any>) -> bool {
        self.object().locks.borrow().contains(lock)
    }
}

impl View<Camera> {
    pub fn create(engine: &EngineRef) -> Rc<Self> {
        View::new(Camera {
            spatial: SpatialHandle::create(engine, Spatial::camera()),
        })
    }

    fn camera<R>(&self, f: impl FnOnce(&mut CameraState) -> R) -> Result<R, BindingError> {
        self.spatial()
            .write(|s| match s.kind_mut() {
                SpatialKind::Camera(camera) => Some(f(camera)),
                _ => None,
            })?
            .ok_or(BindingError::KindMismatch {
                expected: "camera",
                found: "spatial",
            })
    }

    pub fn projection(&self) -> Result<Mat4, BindingError> {
        self.camera(|c| c.projection)
    }

    pub fn set_projection(&self, projection: Mat4) -> Result<(), BindingError> {
        self.camera(|c| c.projection = projection)
    }

    pub fn orthogonal_projection_hint(&self) -> Result<bool, BindingError> {
        self.camera(|c| c.orthogonal_projection_hint)
    }

    pub fn set_orthogonal_projection_hint(&self, hint: bool) -> Result<(), BindingError> {
        self.camera(|c| c.orthogonal_projection_hint = hint)
    }

    /// Inverse of the world transform.
    pub fn view_transform(&self) -> Result<Mat4, BindingError> {
        Ok(self.spatial().world_transform()?.inverse())
    }
}

impl View<Geometry> {
    pub fn create(engine: &EngineRef, geometry_type: u32, tag: &str) -> Rc<Self> {
        View::new(Geometry {
            spatial: SpatialHandle::create(engine, Spatial::geometry(geometry_type, tag)),
        })
    }

    fn check_engine(&self, feature: &FeatureView) -> Result<(), BindingError> {
        if Rc::ptr_eq(self.engine(), feature.engine()) {
            Ok(())
        } else {
            Err(BindingError::EngineMismatch)
        }
    }

    pub fn geometry_type(&self) -> Result<u32, BindingError> {
        Ok(self.engine().borrow().geometry(self.id())?.geometry_type)
    }

    pub fn features_count(&self) -> Result<usize, BindingError> {
        Ok(self.engine().borrow().geometry(self.id())?.features().len())
    }

    pub fn put_feature(&self, role: u32, feature: &FeatureView) -> Result<(), BindingError> {
        self.check_engine(feature)?;
        self.engine()
            .borrow_mut()
            .put_feature(self.id(), role, feature.id())
    }

    pub fn remove_feature(&self, role: u32) -> Result<bool, BindingError> {
        self.engine().borrow_mut().remove_feature(self.id(), role)
    }

    pub fn remove_feature_instance(&self, feature: &FeatureView) -> Result<usize, BindingError> {
        self.check_engine(feature)?;
        self.engine()
            .borrow_mut()
            .remove_feature_instance(self.id(), feature.id())
    }

    pub fn clear_features(&self) -> Result<(), BindingError> {
        self.engine().borrow_mut().clear_features(self.id())
    }

    pub fn has_feature(&self, role: u32) -> Result<bool, BindingError> {
        Ok(self
            .engine()
            .borrow()
            .geometry(self.id())?
            .features()
            .contains_key(&role))
    }

    pub fn has_feature_instance(&self, feature: &FeatureView) -> Result<bool, BindingError> {
        let id = feature.id();
        Ok(self
            .engine()
            .borrow()
            .geometry(self.id())?
            .features()
            .values()
            .any(|&f| f == id))
    }
}

/// A view of any spatial kind, for hosts that dispatch at runtime.
#[derive(Clone)]
pub enum SpatialRef {
    Node(Rc<NodeView>),
    Camera(Rc<CameraView>),
    Geometry(Rc<GeometryView>),
}

impl SpatialRef {
    pub fn spatial(&self) -> &SpatialHandle {
        match self {
            SpatialRef::Node(view) => view.spatial(),
            SpatialRef::Camera(view) => view.spatial(),
            SpatialRef::Geometry(view) => view.spatial(),
        }
    }

    pub fn owner(&self) -> Option<Rc<NodeView>> {
        match self {
            SpatialRef::Node(view) => view.owner(),
            SpatialRef::Camera(view) => view.owner(),
            SpatialRef::Geometry(view) => view.owner(),
        }
    }

    pub fn detach_from_parent(&self) -> Result<(), BindingError> {
        match self {
            SpatialRef::Node(view) => view.detach_from_parent(),
            SpatialRef::Camera(view) => view.detach_from_parent(),
            SpatialRef::Geometry(view) => view.detach_from_parent(),
        }
    }

    /// Attaches this view below `parent`.
    pub fn attach_to(&self, parent: &Rc<NodeView>) -> Result<(), BindingError> {
        match self {
            SpatialRef::Node(view) => parent.attach_child(view.as_ref()),
            SpatialRef::Camera(view) => parent.attach_child(view.as_ref()),
            SpatialRef::Geometry(view) => parent.attach_child(view.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineEvent, ObjectClass, ObjectRef};
    use glam::Vec3;
    use proptest::prelude::*;

    fn deleted(engine: &EngineRef) -> Vec<ObjectRef> {
        engine
            .borrow_mut()
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Deleted(obj) => Some(obj),
                EngineEvent::Created(_) => None,
            })
            .collect()
    }

    #[test]
    fn new_views_have_engine_defaults() {
        let engine = Engine::new_ref();
        let node = NodeView::create(&engine, "root");
        assert_eq!(node.spatial().tag().unwrap(), "root");
        assert!(node.spatial().is_movable().unwrap());
        assert_eq!(node.spatial().local_transform().unwrap(), Mat4::IDENTITY);
        assert!(!node.has_parent().unwrap());
        assert!(!node.is_owned());
    }

    #[test]
    fn attach_sets_owner_and_engine_parent() {
        let engine = Engine::new_ref();
        let root = NodeView::create(&engine, "root");
        let camera = CameraView::create(&engine);
        root.attach_child(camera.as_ref()).unwrap();

        assert!(camera.has_parent().unwrap());
        let owner = camera.owner().expect("camera should be owned");
        assert!(Rc::ptr_eq(&owner, &root));
        assert_eq!(root.children().unwrap(), 1);
    }

    #[test]
    fn attach_already_parented_child_raises() {
        let engine = Engine::new_ref();
        let first = NodeView::create(&engine, "first");
        let second = NodeView::create(&engine, "second");
        let child = GeometryView::create(&engine, 0, "child");
        first.attach_child(child.as_ref()).unwrap();

        let err = second.attach_child(child.as_ref()).unwrap_err();
        assert!(matches!(err, BindingError::AlreadyOwned { .. }));
        assert_eq!(second.children().unwrap(), 0);
        assert!(Rc::ptr_eq(&child.owner().unwrap(), &first));
    }

    #[test]
    fn attach_circular_raises_and_changes_nothing() {
        let engine = Engine::new_ref();
        let a = NodeView::create(&engine, "a");
        let b = NodeView::create(&engine, "b");
        a.attach_child(b.as_ref()).unwrap();

        let err = b.attach_child(a.as_ref()).unwrap_err();
        assert!(matches!(err, BindingError::CircularRelation));
        assert!(!a.has_parent().unwrap());
        assert!(!a.is_owned());

        let err = a.attach_child(a.as_ref()).unwrap_err();
        assert!(matches!(err, BindingError::CircularRelation));
    }

    #[test]
    fn attach_across_engines_is_rejected() {
        let root = NodeView::create(&Engine::new_ref(), "");
        let other = NodeView::create(&Engine::new_ref(), "");
        assert!(matches!(
            root.attach_child(other.as_ref()),
            Err(BindingError::EngineMismatch)
        ));
    }

    #[test]
    fn dropping_owned_child_does_not_delete_it() {
        let engine = Engine::new_ref();
        let root = NodeView::create(&engine, "root");
        let child = NodeView::create(&engine, "child");
        root.attach_child(child.as_ref()).unwrap();
        engine.borrow_mut().take_events();

        drop(child);
        assert!(deleted(&engine).is_empty());
        assert_eq!(root.children().unwrap(), 1);
    }

    #[test]
    fn dropping_root_deletes_subtree_once() {
        let engine = Engine::new_ref();
        let root = NodeView::create(&engine, "root");
        let child = GeometryView::create(&engine, 1, "child");
        let (root_id, child_id) = (root.id(), child.id());
        root.attach_child(child.as_ref()).unwrap();
        drop(child);
        engine.borrow_mut().take_events();

        drop(root);
        assert_eq!(
            deleted(&engine),
            vec![
                ObjectRef::new(ObjectClass::Geometry, child_id),
                ObjectRef::new(ObjectClass::Node, root_id),
            ]
        );
    }

    #[test]
    fn owned_child_keeps_parent_view_alive() {
        let engine = Engine::new_ref();
        let root = NodeView::create(&engine, "root");
        let child = CameraView::create(&engine);
        root.attach_child(child.as_ref()).unwrap();
        engine.borrow_mut().take_events();

        drop(root);
        assert!(deleted(&engine).is_empty(), "child still references root");
        drop(child);
        assert_eq!(deleted(&engine).len(), 2);
    }

    #[test]
    fn detach_restores_deletion_duty() {
        let engine = Engine::new_ref();
        let root = NodeView::create(&engine, "root");
        let child = NodeView::create(&engine, "child");
        let child_id = child.id();
        root.attach_child(child.as_ref()).unwrap();
        child.detach_from_parent().unwrap();
        child.detach_from_parent().unwrap();
        assert!(!child.is_owned());
        assert_eq!(root.children().unwrap(), 0);
        engine.borrow_mut().take_events();

        drop(child);
        assert_eq!(
            deleted(&engine),
            vec![ObjectRef::new(ObjectClass::Node, child_id)]
        );
    }

    #[test]
    fn locks_move_to_owner_when_owned_node_is_dropped() {
        let engine = Engine::new_ref();
        let parent = NodeView::create(&engine, "parent");
        let child = NodeView::create(&engine, "child");
        let lock: Rc<dyn Any> = Rc::new(vec![0_u16; 8]);
        child.lock(Rc::clone(&lock));
        parent.attach_child(child.as_ref()).unwrap();

        drop(child);
        assert!(parent.holds_lock(&lock));
        assert_eq!(parent.locks_count(), 1);
    }

    #[test]
    fn locks_are_dropped_with_unowned_node() {
        let engine = Engine::new_ref();
        let node = NodeView::create(&engine, "");
        let lock: Rc<dyn Any> = Rc::new(42_u32);
        node.lock(Rc::clone(&lock));
        assert_eq!(Rc::strong_count(&lock), 2);
        drop(node);
        assert_eq!(Rc::strong_count(&lock), 1);
    }

    #[test]
    fn camera_view_transform_is_inverse_world() {
        let engine = Engine::new_ref();
        let camera = CameraView::create(&engine);
        let local = Mat4::from_translation(Vec3::new(0.0, 0.0, 250.0));
        camera.spatial().set_local_transform(local).unwrap();
        camera.spatial().update_world_transform().unwrap();
        let view = camera.view_transform().unwrap();
        assert!(view.abs_diff_eq(local.inverse(), 1e-6));
        camera.set_orthogonal_projection_hint(true).unwrap();
        assert!(camera.orthogonal_projection_hint().unwrap());
    }

    #[test]
    fn geometry_feature_roles() {
        let engine = Engine::new_ref();
        let geometry = GeometryView::create(&engine, 7, "");
        let mesh = FeatureView::create_box(&engine, 1.0, 2.0, 3.0);
        let material = FeatureView::material(&engine, "solid");
        geometry.put_feature(0, &mesh).unwrap();
        geometry.put_feature(1, &material).unwrap();

        assert_eq!(geometry.geometry_type().unwrap(), 7);
        assert_eq!(geometry.features_count().unwrap(), 2);
        assert!(geometry.has_feature(1).unwrap());
        assert!(geometry.has_feature_instance(&mesh).unwrap());

        assert_eq!(geometry.remove_feature_instance(&mesh).unwrap(), 1);
        assert!(!geometry.has_feature(0).unwrap());
        geometry.clear_features().unwrap();
        assert_eq!(geometry.features_count().unwrap(), 0);
        assert_eq!(material.references().unwrap(), 1);
    }

    #[test]
    fn spatial_ref_dispatches_attach_and_detach() {
        let engine = Engine::new_ref();
        let root = NodeView::create(&engine, "");
        let child = SpatialRef::Camera(CameraView::create(&engine));
        child.attach_to(&root).unwrap();
        assert!(child.owner().is_some());
        child.detach_from_parent().unwrap();
        assert!(child.owner().is_none());
        assert!(!child.spatial().has_parent().unwrap());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Attach(usize, usize),
        Detach(usize),
    }

    fn op_strategy(n: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..n, 0..n).prop_map(|(p, c)| Op::Attach(p, c)),
            (0..n).prop_map(Op::Detach),
        ]
    }

    proptest! {
        #[test]
        fn engine_parents_mirror_view_owners(ops in prop::collection::vec(op_strategy(5), 0..40)) {
            let engine = Engine::new_ref();
            let nodes: Vec<Rc<NodeView>> = (0..5)
                .map(|i| NodeView::create(&engine, &i.to_string()))
                .collect();

            for op in ops {
                match op {
                    Op::Attach(p, c) => {
                        let _ = nodes[p].attach_child(nodes[c].as_ref());
                    }
                    Op::Detach(c) => {
                        nodes[c].detach_from_parent().unwrap();
                    }
                }

                for node in &nodes {
                    let engine_parent = engine.borrow().scene().get(node.id()).unwrap().parent();
                    let owner_id = node.owner().map(|owner| owner.id());
                    prop_assert_eq!(engine_parent, owner_id);
                }
            }
        }
    }
}
