//! Geometry features: materials, meshes and volume textures.
//!
//! Unlike spatials, features are shared: the engine counts references and
//! deletes a feature when the count reaches zero. A [`FeatureView`] holds one
//! reference, and a geometry holds one per role the feature is put under.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use glam::{Vec2, Vec3, Vec4};
use log::warn;

use crate::engine::{Engine, EngineEvent, EngineRef, ObjectClass, ObjectRef};
use crate::error::BindingError;
use crate::ownership::{Managed, View};
use crate::registry::Key;
use crate::scene::{GeometryState, SpatialId, SpatialKind};

/// Handle of a geometry feature inside the engine.
pub type FeatureId = Key<FeatureEntry>;

/// Value of a material shader parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<Vec2> for ParameterValue {
    fn from(value: Vec2) -> Self {
        ParameterValue::Vec2(value)
    }
}

impl From<Vec3> for ParameterValue {
    fn from(value: Vec3) -> Self {
        ParameterValue::Vec3(value)
    }
}

impl From<Vec4> for ParameterValue {
    fn from(value: Vec4) -> Self {
        ParameterValue::Vec4(value)
    }
}

/// A named shader together with its uniform values.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    shader_name: String,
    parameters: BTreeMap<String, ParameterValue>,
}

impl Material {
    pub fn new(shader_name: &str) -> Self {
        Self {
            shader_name: shader_name.to_owned(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn shader_name(&self) -> &str {
        &self.shader_name
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParameterValue>) {
        self.parameters.insert(name.to_owned(), value.into());
    }

    /// Returns `true` if the parameter existed.
    pub fn remove_parameter(&mut self, name: &str) -> bool {
        self.parameters.remove(name).is_some()
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn parameter(&self, name: &str) -> Option<ParameterValue> {
        self.parameters.get(name).copied()
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParameterValue> {
        &self.parameters
    }
}

/// Shape of a mesh feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshShape {
    Box { width: f32, height: f32, depth: f32 },
    Ball { radius: f32, degree: u32 },
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChannel {
    Intensities,
    Normals,
}

/// One channel of one volume segment, uploaded as a 3D texture.
///
/// The voxel data itself is not owned by the engine; it lives in the
/// [`VolumeGrid`](crate::volume::VolumeGrid) that the volume node locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeTexture {
    pub segment: usize,
    pub channel: VolumeChannel,
    pub resolution: [u32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryFeature {
    Material(Material),
    Mesh(MeshShape),
    Volume(VolumeTexture),
}

impl GeometryFeature {
    pub fn kind_name(&self) -> &'static str {
        match self {
            GeometryFeature::Material(_) => "material",
            GeometryFeature::Mesh(_) => "mesh",
            GeometryFeature::Volume(_) => "volume texture",
        }
    }
}

/// A feature together with its reference count.
#[derive(Debug)]
pub struct FeatureEntry {
    feature: GeometryFeature,
    references: usize,
}

impl Engine {
    /// Stores a feature with one reference, held by the caller.
    pub fn create_feature(&mut self, feature: GeometryFeature) -> FeatureId {
        let id = self.features.insert(FeatureEntry {
            feature,
            references: 1,
        });
        self.record(EngineEvent::Created(ObjectRef::new(ObjectClass::Feature, id)));
        id
    }

    fn feature_entry_mut(&mut self, id: FeatureId) -> Result<&mut FeatureEntry, BindingError> {
        self.features
            .get_mut(id)
            .ok_or(BindingError::StaleObject("geometry feature"))
    }

    pub fn feature(&self, id: FeatureId) -> Result<&GeometryFeature, BindingError> {
        self.features
            .get(id)
            .map(|entry| &entry.feature)
            .ok_or(BindingError::StaleObject("geometry feature"))
    }

    pub fn feature_mut(&mut self, id: FeatureId) -> Result<&mut GeometryFeature, BindingError> {
        Ok(&mut self.feature_entry_mut(id)?.feature)
    }

    pub fn feature_references(&self, id: FeatureId) -> Result<usize, BindingError> {
        self.features
            .get(id)
            .map(|entry| entry.references)
            .ok_or(BindingError::StaleObject("geometry feature"))
    }

    pub fn acquire_feature(&mut self, id: FeatureId) -> Result<(), BindingError> {
        self.feature_entry_mut(id)?.references += 1;
        Ok(())
    }

    /// Drops one reference and deletes the feature at zero.
    pub fn release_feature(&mut self, id: FeatureId) -> Result<(), BindingError> {
        let entry = self.feature_entry_mut(id)?;
        entry.references = entry.references.saturating_sub(1);
        if entry.references == 0 {
            self.features.remove(id);
            self.record(EngineEvent::Deleted(ObjectRef::new(ObjectClass::Feature, id)));
        }
        Ok(())
    }

    pub fn geometry(&self, id: SpatialId) -> Result<&GeometryState, BindingError> {
        let spatial = self.scene.get(id)?;
        match spatial.kind() {
            SpatialKind::Geometry(geometry) => Ok(geometry),
            _ => Err(BindingError::KindMismatch {
                expected: "geometry",
                found: spatial.class().name(),
            }),
        }
    }

    fn geometry_mut(&mut self, id: SpatialId) -> Result<&mut GeometryState, BindingError> {
        let spatial = self.scene.get_mut(id)?;
        let found = spatial.class().name();
        match spatial.kind_mut() {
            SpatialKind::Geometry(geometry) => Ok(geometry),
            _ => Err(BindingError::KindMismatch {
                expected: "geometry",
                found,
            }),
        }
    }

    /// Puts `feature` under `role`, replacing and releasing the previous one.
    pub fn put_feature(&mut self, geometry: SpatialId, role: u32, feature: FeatureId) -> Result<(), BindingError> {
        self.geometry(geometry)?;
        self.acquire_feature(feature)?;
        let previous = self.geometry_mut(geometry)?.features.insert(role, feature);
        if let Some(previous) = previous {
            self.release_feature(previous)?;
        }
        Ok(())
    }

    /// Removes the feature under `role`. Returns `false` if there was none.
    pub fn remove_feature(&mut self, geometry: SpatialId, role: u32) -> Result<bool, BindingError> {
        match self.geometry_mut(geometry)?.features.remove(&role) {
            Some(feature) => {
                self.release_feature(feature)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes `feature` from every role it is put under.
    pub fn remove_feature_instance(&mut self, geometry: SpatialId, feature: FeatureId) -> Result<usize, BindingError> {
        let features = &mut self.geometry_mut(geometry)?.features;
        let before = features.len();
        features.retain(|_, &mut f| f != feature);
        let removed = before - features.len();
        for _ in 0..removed {
            self.release_feature(feature)?;
        }
        Ok(removed)
    }

    pub fn clear_features(&mut self, geometry: SpatialId) -> Result<(), BindingError> {
        let features = std::mem::take(&mut self.geometry_mut(geometry)?.features);
        for feature in features.into_values() {
            self.release_feature(feature)?;
        }
        Ok(())
    }
}

/// Engine-side handle of a geometry feature.
pub struct Feature {
    engine: EngineRef,
    id: FeatureId,
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature").field("id", &self.id).finish()
    }
}

/// Features are never owned by another view; geometries count references
/// instead.
impl Managed for Feature {
    type Owner = Infallible;
    const KIND: &'static str = "geometry feature";
    const OWNER_KIND: &'static str = "geometry";

    fn delete(&self) {
        if let Err(err) = self.engine.borrow_mut().release_feature(self.id) {
            warn!("releasing geometry feature failed: {err}");
        }
    }
}

pub type FeatureView = View<Feature>;

impl View<Feature> {
    pub fn create(engine: &EngineRef, feature: GeometryFeature) -> Rc<Self> {
        let id = engine.borrow_mut().create_feature(feature);
        View::new(Feature {
            engine: Rc::clone(engine),
            id,
        })
    }

    pub fn material(engine: &EngineRef, shader_name: &str) -> Rc<Self> {
        Self::create(engine, GeometryFeature::Material(Material::new(shader_name)))
    }

    pub fn create_box(engine: &EngineRef, width: f32, height: f32, depth: f32) -> Rc<Self> {
        Self::create(
            engine,
            GeometryFeature::Mesh(MeshShape::Box {
                width,
                height,
                depth,
            }),
        )
    }

    pub fn create_ball(engine: &EngineRef, radius: f32, degree: u32) -> Rc<Self> {
        Self::create(engine, GeometryFeature::Mesh(MeshShape::Ball { radius, degree }))
    }

    pub fn create_point(engine: &EngineRef) -> Rc<Self> {
        Self::create(engine, GeometryFeature::Mesh(MeshShape::Point))
    }

    pub fn id(&self) -> FeatureId {
        self.object().id
    }

    pub fn engine(&self) -> &EngineRef {
        &self.object().engine
    }

    /// Current engine-side reference count.
    pub fn references(&self) -> Result<usize, BindingError> {
        self.engine().borrow().feature_references(self.id())
    }

    pub fn kind_name(&self) -> Result<&'static str, BindingError> {
        Ok(self.engine().borrow().feature(self.id())?.kind_name())
    }

    /// Runs `f` on the material, or fails if this feature is not one.
    pub fn with_material<R>(&self, f: impl FnOnce(&mut Material) -> R) -> Result<R, BindingError> {
        let mut engine = self.engine().borrow_mut();
        match engine.feature_mut(self.id())? {
            GeometryFeature::Material(material) => Ok(f(material)),
            other => Err(BindingError::KindMismatch {
                expected: "material",
                found: other.kind_name(),
            }),
        }
    }
}
