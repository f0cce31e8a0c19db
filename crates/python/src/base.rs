//! `libcarna.base`: spatial views, geometry features, render stages, the
//! frame renderer and surfaces.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use glam::{Vec2, Vec3, Vec4};
use libcarna_core::render::{FrameRenderer, GlContext, StageView};
use libcarna_core::{
    BindingError, CameraView, Color, FeatureView, GeometryView, NodeView, ParameterValue, SpatialRef,
};
use libcarna_egl::Surface;
use ndarray::Array3;
use numpy::{IntoPyArray, PyArray2, PyArray3, PyReadonlyArray2};
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::pyclass_init::PyClassInitializer;

use crate::egl::PyEglContext;
use crate::{engine, mat4_from_py, mat4_to_py, OrRaise};

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__doc__", "Views, geometry features, renderer and surfaces.")?;
    m.add_class::<PyColor>()?;
    m.add_class::<PySpatial>()?;
    m.add_class::<PyNode>()?;
    m.add_class::<PyCamera>()?;
    m.add_class::<PyGeometry>()?;
    m.add_class::<PyGeometryFeature>()?;
    m.add_class::<PyMaterial>()?;
    m.add_class::<PyMeshFactory>()?;
    m.add_class::<PyRenderStage>()?;
    m.add_class::<PyFrameRenderer>()?;
    m.add_class::<PySurface>()?;
    Ok(())
}

/// RGBA color with 8 bits per channel.
#[pyclass(name = "Color", module = "libcarna.base", frozen, eq)]
#[derive(Clone, Copy, PartialEq)]
pub(crate) struct PyColor(pub(crate) Color);

#[allow(non_snake_case)]
#[pymethods]
impl PyColor {
    #[new]
    #[pyo3(signature = (r, g, b, a = 255))]
    fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(Color::rgba(r, g, b, a))
    }

    #[staticmethod]
    fn from_hex(hex: &str) -> PyResult<Self> {
        Color::from_hex(hex).map(Self).or_raise()
    }

    #[classattr]
    fn BLACK_NO_ALPHA() -> Self {
        Self(Color::BLACK_NO_ALPHA)
    }

    #[classattr]
    fn WHITE_NO_ALPHA() -> Self {
        Self(Color::WHITE_NO_ALPHA)
    }

    #[classattr]
    fn BLACK() -> Self {
        Self(Color::BLACK)
    }

    #[classattr]
    fn WHITE() -> Self {
        Self(Color::WHITE)
    }

    #[classattr]
    fn RED() -> Self {
        Self(Color::RED)
    }

    #[classattr]
    fn GREEN() -> Self {
        Self(Color::GREEN)
    }

    #[classattr]
    fn BLUE() -> Self {
        Self(Color::BLUE)
    }

    #[getter]
    fn r(&self) -> u8 {
        self.0.r
    }

    #[getter]
    fn g(&self) -> u8 {
        self.0.g
    }

    #[getter]
    fn b(&self) -> u8 {
        self.0.b
    }

    #[getter]
    fn a(&self) -> u8 {
        self.0.a
    }

    fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    fn __repr__(&self) -> String {
        format!("Color({}, {}, {}, {})", self.0.r, self.0.g, self.0.b, self.0.a)
    }
}

/// Anything scripts may pass where a color is expected.
#[derive(FromPyObject)]
pub(crate) enum ColorArg {
    Color(PyColor),
    Hex(String),
    Rgba(u8, u8, u8, u8),
    Rgb(u8, u8, u8),
}

impl ColorArg {
    pub(crate) fn resolve(self) -> Result<Color, BindingError> {
        match self {
            ColorArg::Color(color) => Ok(color.0),
            ColorArg::Hex(hex) => Color::from_hex(&hex),
            ColorArg::Rgba(r, g, b, a) => Ok(Color::rgba(r, g, b, a)),
            ColorArg::Rgb(r, g, b) => Ok(Color::rgb(r, g, b)),
        }
    }
}

/// Common base of nodes, cameras and geometries.
#[pyclass(name = "Spatial", module = "libcarna.base", subclass, unsendable)]
pub(crate) struct PySpatial {
    pub(crate) inner: SpatialRef,
}

#[pymethods]
impl PySpatial {
    #[getter]
    fn has_parent(&self) -> PyResult<bool> {
        self.inner.spatial().has_parent().or_raise()
    }

    fn detach_from_parent(&self) -> PyResult<()> {
        self.inner.detach_from_parent().or_raise()
    }

    #[getter]
    fn is_movable(&self) -> PyResult<bool> {
        self.inner.spatial().is_movable().or_raise()
    }

    #[setter]
    fn set_is_movable(&self, movable: bool) -> PyResult<()> {
        self.inner.spatial().set_movable(movable).or_raise()
    }

    #[getter]
    fn tag(&self) -> PyResult<String> {
        self.inner.spatial().tag().or_raise()
    }

    #[setter]
    fn set_tag(&self, tag: &str) -> PyResult<()> {
        self.inner.spatial().set_tag(tag).or_raise()
    }

    #[getter]
    fn local_transform<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let transform = self.inner.spatial().local_transform().or_raise()?;
        Ok(mat4_to_py(py, transform))
    }

    #[setter]
    fn set_local_transform(&self, transform: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        let transform = mat4_from_py(transform)?;
        self.inner.spatial().set_local_transform(transform).or_raise()
    }

    fn update_world_transform(&self) -> PyResult<()> {
        self.inner.spatial().update_world_transform().or_raise()
    }

    #[getter]
    fn world_transform<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let transform = self.inner.spatial().world_transform().or_raise()?;
        Ok(mat4_to_py(py, transform))
    }
}

/// Lock objects keyed by the identity of the host object they wrap.
#[derive(Default)]
struct IdentityLocks {
    by_address: HashMap<usize, Rc<dyn Any>>,
}

impl IdentityLocks {
    /// The lock for `address`, wrapping the object with `make` on first use.
    fn get_or_wrap(&mut self, address: usize, make: impl FnOnce() -> Rc<dyn Any>) -> Rc<dyn Any> {
        Rc::clone(self.by_address.entry(address).or_insert_with(make))
    }
}

/// Spatial object that groups children.
#[pyclass(name = "Node", module = "libcarna.base", extends = PySpatial, unsendable)]
pub(crate) struct PyNode {
    pub(crate) view: Rc<NodeView>,
    locks: IdentityLocks,
}

impl PyNode {
    fn parts(view: Rc<NodeView>) -> (Self, PySpatial) {
        let inner = SpatialRef::Node(Rc::clone(&view));
        (
            Self {
                view,
                locks: IdentityLocks::default(),
            },
            PySpatial { inner },
        )
    }

    pub(crate) fn wrap(py: Python<'_>, view: Rc<NodeView>) -> PyResult<Py<Self>> {
        let (node, spatial) = Self::parts(view);
        Py::new(py, PyClassInitializer::from(spatial).add_subclass(node))
    }
}

#[pymethods]
impl PyNode {
    #[new]
    #[pyo3(signature = (tag = ""))]
    fn new(tag: &str) -> (Self, PySpatial) {
        Self::parts(NodeView::create(&engine(), tag))
    }

    fn attach_child(&self, child: PyRef<'_, PySpatial>) -> PyResult<()> {
        child.inner.attach_to(&self.view).or_raise()
    }

    fn children(&self) -> PyResult<usize> {
        self.view.children().or_raise()
    }

    /// Keeps `obj` alive for as long as this node, or whatever node ends up
    /// owning it, is alive.
    fn lock(&mut self, obj: PyObject) {
        let address = obj.as_ptr() as usize;
        let lock = self.locks.get_or_wrap(address, || Rc::new(obj) as Rc<dyn Any>);
        self.view.lock(lock);
    }

    #[getter]
    fn locks_count(&self) -> usize {
        self.view.locks_count()
    }
}

/// Point of view of a rendered frame.
#[pyclass(name = "Camera", module = "libcarna.base", extends = PySpatial, unsendable)]
pub(crate) struct PyCamera {
    pub(crate) view: Rc<CameraView>,
}

#[pymethods]
impl PyCamera {
    #[new]
    fn new() -> (Self, PySpatial) {
        let view = CameraView::create(&engine());
        let inner = SpatialRef::Camera(Rc::clone(&view));
        (Self { view }, PySpatial { inner })
    }

    #[getter]
    fn projection<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let projection = self.view.projection().or_raise()?;
        Ok(mat4_to_py(py, projection))
    }

    #[setter]
    fn set_projection(&self, projection: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        let projection = mat4_from_py(projection)?;
        self.view.set_projection(projection).or_raise()
    }

    #[getter]
    fn orthogonal_projection_hint(&self) -> PyResult<bool> {
        self.view.orthogonal_projection_hint().or_raise()
    }

    #[setter]
    fn set_orthogonal_projection_hint(&self, hint: bool) -> PyResult<()> {
        self.view.set_orthogonal_projection_hint(hint).or_raise()
    }

    #[getter]
    fn view_transform<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let transform = self.view.view_transform().or_raise()?;
        Ok(mat4_to_py(py, transform))
    }
}

/// A feature given either by its role or by the instance itself.
#[derive(FromPyObject)]
enum FeatureArg<'py> {
    Instance(PyRef<'py, PyGeometryFeature>),
    Role(u32),
}

/// Spatial object that is rendered through its features.
#[pyclass(name = "Geometry", module = "libcarna.base", extends = PySpatial, unsendable)]
pub(crate) struct PyGeometry {
    view: Rc<GeometryView>,
}

#[pymethods]
impl PyGeometry {
    #[new]
    #[pyo3(signature = (geometry_type, tag = ""))]
    fn new(geometry_type: u32, tag: &str) -> (Self, PySpatial) {
        let view = GeometryView::create(&engine(), geometry_type, tag);
        let inner = SpatialRef::Geometry(Rc::clone(&view));
        (Self { view }, PySpatial { inner })
    }

    #[getter]
    fn geometry_type(&self) -> PyResult<u32> {
        self.view.geometry_type().or_raise()
    }

    #[getter]
    fn features_count(&self) -> PyResult<usize> {
        self.view.features_count().or_raise()
    }

    fn put_feature(&self, role: u32, feature: PyRef<'_, PyGeometryFeature>) -> PyResult<()> {
        self.view.put_feature(role, &feature.view).or_raise()
    }

    fn remove_feature(&self, feature: FeatureArg<'_>) -> PyResult<()> {
        match feature {
            FeatureArg::Instance(feature) => self.view.remove_feature_instance(&feature.view).map(drop),
            FeatureArg::Role(role) => self.view.remove_feature(role).map(drop),
        }
        .or_raise()
    }

    fn clear_features(&self) -> PyResult<()> {
        self.view.clear_features().or_raise()
    }

    fn has_feature(&self, feature: FeatureArg<'_>) -> PyResult<bool> {
        match feature {
            FeatureArg::Instance(feature) => self.view.has_feature_instance(&feature.view),
            FeatureArg::Role(role) => self.view.has_feature(role),
        }
        .or_raise()
    }
}

/// Shared, reference-counted geometry attribute such as a mesh or material.
#[pyclass(name = "GeometryFeature", module = "libcarna.base", subclass, unsendable)]
pub(crate) struct PyGeometryFeature {
    pub(crate) view: Rc<FeatureView>,
}

#[pymethods]
impl PyGeometryFeature {
    #[getter]
    fn kind(&self) -> PyResult<&'static str> {
        self.view.kind_name().or_raise()
    }

    /// Number of engine-side references: this object plus one per geometry
    /// role the feature is put under.
    #[getter]
    fn references(&self) -> PyResult<usize> {
        self.view.references().or_raise()
    }
}

/// Material parameter value as passed from Python.
#[derive(FromPyObject)]
enum ParameterArg {
    Float(f32),
    Vec2(f32, f32),
    Vec3(f32, f32, f32),
    Vec4(f32, f32, f32, f32),
}

impl From<ParameterArg> for ParameterValue {
    fn from(value: ParameterArg) -> Self {
        match value {
            ParameterArg::Float(x) => ParameterValue::Float(x),
            ParameterArg::Vec2(x, y) => ParameterValue::Vec2(Vec2::new(x, y)),
            ParameterArg::Vec3(x, y, z) => ParameterValue::Vec3(Vec3::new(x, y, z)),
            ParameterArg::Vec4(x, y, z, w) => ParameterValue::Vec4(Vec4::new(x, y, z, w)),
        }
    }
}

fn parameter_to_py(py: Python<'_>, value: ParameterValue) -> PyResult<PyObject> {
    let object = match value {
        ParameterValue::Float(x) => x.into_pyobject(py)?.into_any(),
        ParameterValue::Vec2(v) => v.to_array().into_pyobject(py)?.into_any(),
        ParameterValue::Vec3(v) => v.to_array().into_pyobject(py)?.into_any(),
        ParameterValue::Vec4(v) => v.to_array().into_pyobject(py)?.into_any(),
    };
    Ok(object.unbind())
}

/// Named shader with uniform parameters.
#[pyclass(name = "Material", module = "libcarna.base", extends = PyGeometryFeature, unsendable)]
pub(crate) struct PyMaterial;

#[pymethods]
impl PyMaterial {
    #[new]
    fn new(shader_name: &str) -> (Self, PyGeometryFeature) {
        let view = FeatureView::material(&engine(), shader_name);
        (Self, PyGeometryFeature { view })
    }

    #[getter]
    fn shader_name(slf: PyRef<'_, Self>) -> PyResult<String> {
        let base = slf.as_super();
        base.view
            .with_material(|material| material.shader_name().to_owned())
            .or_raise()
    }

    fn set_parameter(slf: PyRef<'_, Self>, name: &str, value: ParameterArg) -> PyResult<()> {
        let value = ParameterValue::from(value);
        slf.as_super()
            .view
            .with_material(|material| material.set_parameter(name, value))
            .or_raise()
    }

    fn remove_parameter(slf: PyRef<'_, Self>, name: &str) -> PyResult<bool> {
        slf.as_super()
            .view
            .with_material(|material| material.remove_parameter(name))
            .or_raise()
    }

    fn has_parameter(slf: PyRef<'_, Self>, name: &str) -> PyResult<bool> {
        slf.as_super()
            .view
            .with_material(|material| material.has_parameter(name))
            .or_raise()
    }

    fn parameter(slf: PyRef<'_, Self>, name: &str) -> PyResult<Option<PyObject>> {
        let py = slf.py();
        let value = slf
            .as_super()
            .view
            .with_material(|material| material.parameter(name))
            .or_raise()?;
        value.map(|value| parameter_to_py(py, value)).transpose()
    }

    fn clear_parameters(slf: PyRef<'_, Self>) -> PyResult<()> {
        slf.as_super()
            .view
            .with_material(|material| material.clear_parameters())
            .or_raise()
    }
}

/// Factory of mesh features.
#[pyclass(name = "MeshFactory", module = "libcarna.base", frozen)]
pub(crate) struct PyMeshFactory;

#[pymethods]
impl PyMeshFactory {
    #[staticmethod]
    fn create_box(width: f32, height: f32, depth: f32) -> PyGeometryFeature {
        PyGeometryFeature {
            view: FeatureView::create_box(&engine(), width, height, depth),
        }
    }

    #[staticmethod]
    #[pyo3(signature = (radius, degree = 3))]
    fn create_ball(radius: f32, degree: u32) -> PyGeometryFeature {
        PyGeometryFeature {
            view: FeatureView::create_ball(&engine(), radius, degree),
        }
    }

    #[staticmethod]
    fn create_point() -> PyGeometryFeature {
        PyGeometryFeature {
            view: FeatureView::create_point(&engine()),
        }
    }
}

/// Base class of render stages.
#[pyclass(name = "RenderStage", module = "libcarna.base", subclass, unsendable)]
pub(crate) struct PyRenderStage {
    pub(crate) view: Rc<StageView>,
}

#[pymethods]
impl PyRenderStage {
    #[getter]
    fn name(&self) -> PyResult<&'static str> {
        self.view.name().or_raise()
    }

    #[getter]
    fn enabled(&self) -> PyResult<bool> {
        self.view.is_enabled().or_raise()
    }

    #[setter]
    fn set_enabled(&self, enabled: bool) -> PyResult<()> {
        self.view.set_enabled(enabled).or_raise()
    }
}

/// Renders frames through an ordered list of stages.
#[pyclass(name = "FrameRenderer", module = "libcarna.base", unsendable)]
pub(crate) struct PyFrameRenderer {
    pub(crate) inner: Rc<FrameRenderer>,
    /// Host objects of the appended stages, in render order.
    pub(crate) stages: Vec<Py<PyRenderStage>>,
}

#[pymethods]
impl PyFrameRenderer {
    #[new]
    #[pyo3(signature = (context, width, height, fit_square = false))]
    fn new(context: PyRef<'_, PyEglContext>, width: u32, height: u32, fit_square: bool) -> PyResult<Self> {
        let gl: Rc<dyn GlContext> = context.inner.clone();
        let inner = FrameRenderer::new(gl, &engine(), width, height, fit_square).or_raise()?;
        Ok(Self {
            inner,
            stages: Vec::new(),
        })
    }

    fn append_stage(&mut self, stage: Bound<'_, PyRenderStage>) -> PyResult<()> {
        self.inner.append_stage(&stage.borrow().view).or_raise()?;
        self.stages.push(stage.unbind());
        Ok(())
    }

    /// The stage appended at position `index`.
    fn stage_at(&self, py: Python<'_>, index: usize) -> PyResult<Py<PyRenderStage>> {
        let id = self.inner.stage_at(index).or_raise()?;
        self.stages
            .iter()
            .find(|stage| stage.borrow(py).view.id() == id)
            .map(|stage| stage.clone_ref(py))
            .ok_or_else(|| PyRuntimeError::new_err("render stage has no host object"))
    }

    /// Deletes every stage. Stage objects still referenced by the script
    /// raise on further use.
    fn clear_stages(&mut self) -> PyResult<()> {
        self.inner.clear_stages().or_raise()?;
        self.stages.clear();
        Ok(())
    }

    #[pyo3(signature = (camera, root = None))]
    fn render(&self, camera: PyRef<'_, PyCamera>, root: Option<PyRef<'_, PyNode>>) -> PyResult<()> {
        let root = root.as_ref().map(|root| root.view.as_ref());
        self.inner.render(&camera.view, root).or_raise()
    }

    fn reshape(&self, width: u32, height: u32) -> PyResult<()> {
        self.inner.reshape(width, height).or_raise()
    }

    fn set_fit_square(&self, fit_square: bool) {
        self.inner.set_fit_square(fit_square);
    }

    fn set_background_color(&self, color: ColorArg) -> PyResult<()> {
        self.inner.set_background_color(color.resolve().or_raise()?);
        Ok(())
    }

    #[getter]
    fn width(&self) -> u32 {
        self.inner.width()
    }

    #[getter]
    fn height(&self) -> u32 {
        self.inner.height()
    }

    #[getter]
    fn stages_count(&self) -> usize {
        self.inner.stages_count()
    }
}

/// Off-screen render target. `end()` returns the frame as a
/// `(height, width, 3)` uint8 array, top row first.
#[pyclass(name = "Surface", module = "libcarna.base", unsendable)]
pub(crate) struct PySurface {
    inner: Surface,
}

#[pymethods]
impl PySurface {
    #[new]
    fn new(context: PyRef<'_, PyEglContext>, width: u32, height: u32) -> PyResult<Self> {
        let inner = Surface::new(Rc::clone(&context.inner), width, height).or_raise()?;
        Ok(Self { inner })
    }

    fn begin(&self) -> PyResult<()> {
        self.inner.begin().or_raise()
    }

    fn end<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let frame = self.inner.end().or_raise()?;
        let pixels = Array3::from_shape_vec(frame.shape(), frame.to_top_down()).or_raise()?;
        Ok(pixels.into_pyarray(py))
    }

    #[getter]
    fn width(&self) -> u32 {
        self.inner.width()
    }

    #[getter]
    fn height(&self) -> u32 {
        self.inner.height()
    }

    #[getter]
    fn size(&self) -> usize {
        self.inner.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_args_resolve_in_every_form() {
        assert_eq!(ColorArg::Color(PyColor(Color::BLUE)).resolve().unwrap(), Color::BLUE);
        assert_eq!(ColorArg::Hex("#00ff00".into()).resolve().unwrap(), Color::GREEN);
        assert_eq!(ColorArg::Rgb(255, 0, 0).resolve().unwrap(), Color::RED);
        assert_eq!(
            ColorArg::Rgba(1, 2, 3, 4).resolve().unwrap(),
            Color::rgba(1, 2, 3, 4)
        );
    }

    #[test]
    fn bad_hex_color_is_an_invalid_color() {
        assert!(matches!(
            ColorArg::Hex("#12345".into()).resolve(),
            Err(BindingError::InvalidColor(_))
        ));
    }

    #[test]
    fn locks_are_reused_per_identity() {
        let mut locks = IdentityLocks::default();
        let first = locks.get_or_wrap(0x10, || Rc::new(1_u8) as Rc<dyn Any>);
        let again = locks.get_or_wrap(0x10, || Rc::new(2_u8) as Rc<dyn Any>);
        let other = locks.get_or_wrap(0x20, || Rc::new(1_u8) as Rc<dyn Any>);
        assert!(Rc::ptr_eq(&first, &again));
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(again.downcast_ref::<u8>(), Some(&1));
    }

    #[test]
    fn node_lock_is_counted_once_per_object() {
        let view = NodeView::create(&libcarna_core::Engine::new_ref(), "root");
        let mut locks = IdentityLocks::default();
        for _ in 0..2 {
            view.lock(locks.get_or_wrap(0x10, || Rc::new("payload") as Rc<dyn Any>));
        }
        view.lock(locks.get_or_wrap(0x20, || Rc::new("payload") as Rc<dyn Any>));
        assert_eq!(view.locks_count(), 2);
    }
}
