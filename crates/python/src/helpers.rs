//! `libcarna.helpers`: stage batching and volume grids.

use glam::{UVec3, Vec3};
use libcarna_core::render::FrameRendererHelper;
use libcarna_core::volume::{DEFAULT_MAX_SEGMENT_BYTESIZE, DEFAULT_ROLE_INTENSITIES, DEFAULT_ROLE_NORMALS};
use libcarna_core::{Extent, VolumeGridHelper};
use numpy::PyReadonlyArray3;
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;

use crate::base::{PyFrameRenderer, PyNode, PyRenderStage};
use crate::convert::samples_x_fastest;
use crate::{engine, OrRaise};

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("DEFAULT_MAX_SEGMENT_BYTESIZE", DEFAULT_MAX_SEGMENT_BYTESIZE)?;
    m.add("DEFAULT_ROLE_INTENSITIES", DEFAULT_ROLE_INTENSITIES)?;
    m.add("DEFAULT_ROLE_NORMALS", DEFAULT_ROLE_NORMALS)?;
    m.add_class::<PyFrameRendererHelper>()?;
    m.add_class::<PyVolumeGridHelper>()?;
    Ok(())
}

/// Queues stages and appends them to a renderer all at once.
#[pyclass(name = "FrameRendererHelper", module = "libcarna.helpers", unsendable)]
pub(crate) struct PyFrameRendererHelper {
    inner: FrameRendererHelper,
    renderer: Py<PyFrameRenderer>,
    queued: Vec<Py<PyRenderStage>>,
}

#[pymethods]
impl PyFrameRendererHelper {
    #[new]
    fn new(renderer: Bound<'_, PyFrameRenderer>) -> Self {
        Self {
            inner: FrameRendererHelper::new(renderer.borrow().inner.clone()),
            renderer: renderer.unbind(),
            queued: Vec::new(),
        }
    }

    fn add_stage(&mut self, stage: Bound<'_, PyRenderStage>) {
        self.inner.add_stage(stage.borrow().view.clone());
        self.queued.push(stage.unbind());
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.queued.clear();
    }

    /// Appends every queued stage, or none if any of them is already owned.
    fn commit(&self, py: Python<'_>) -> PyResult<()> {
        self.inner.commit().or_raise()?;
        let mut renderer = self.renderer.borrow_mut(py);
        renderer
            .stages
            .extend(self.queued.iter().map(|stage| stage.clone_ref(py)));
        Ok(())
    }
}

/// Partitions a volume into segments and builds a node with one geometry
/// per segment.
#[pyclass(name = "VolumeGridHelper", module = "libcarna.helpers", unsendable)]
pub(crate) struct PyVolumeGridHelper {
    inner: VolumeGridHelper,
}

fn samples_from_array<T>(array: PyReadonlyArray3<'_, T>, native: UVec3, cast: impl Fn(T) -> f32) -> PyResult<Vec<f32>>
where
    T: numpy::Element + Copy,
{
    samples_x_fastest(array.as_array(), native, cast).map_err(PyValueError::new_err)
}

fn samples_from_callable(f: &Bound<'_, PyAny>, native: UVec3) -> PyResult<Vec<f32>> {
    let mut samples = Vec::with_capacity(native.x as usize * native.y as usize * native.z as usize);
    for z in 0..native.z {
        for y in 0..native.y {
            for x in 0..native.x {
                samples.push(f.call1(((x, y, z),))?.extract::<f32>()?);
            }
        }
    }
    Ok(samples)
}

#[pymethods]
impl PyVolumeGridHelper {
    #[new]
    #[pyo3(signature = (native_resolution, max_segment_bytesize = DEFAULT_MAX_SEGMENT_BYTESIZE, normals = false))]
    fn new(native_resolution: (u32, u32, u32), max_segment_bytesize: usize, normals: bool) -> PyResult<Self> {
        let (x, y, z) = native_resolution;
        let mut inner = VolumeGridHelper::new(&engine(), UVec3::new(x, y, z), max_segment_bytesize).or_raise()?;
        if normals {
            inner = inner.with_normals();
        }
        Ok(Self { inner })
    }

    #[getter]
    fn native_resolution(&self) -> (u32, u32, u32) {
        self.inner.native_resolution().into()
    }

    #[getter]
    fn segment_counts(&self) -> (u32, u32, u32) {
        self.inner.segment_counts().into()
    }

    #[getter]
    fn max_segment_bytesize(&self) -> usize {
        self.inner.max_segment_bytesize()
    }

    #[getter]
    fn intensities_role(&self) -> u32 {
        self.inner.intensities_role()
    }

    #[setter]
    fn set_intensities_role(&mut self, role: u32) {
        self.inner.set_intensities_role(role);
    }

    #[getter]
    fn normals_role(&self) -> Option<u32> {
        self.inner.normals_role()
    }

    #[setter]
    fn set_normals_role(&mut self, role: Option<u32>) {
        self.inner.set_normals_role(role);
    }

    /// Loads intensities from an array of the native resolution, indexed
    /// `[x, y, z]`, or from a callable that maps `(x, y, z)` to an intensity.
    /// Intensities are clamped to `[0, 1]`.
    fn load_intensities(&mut self, data: &Bound<'_, PyAny>) -> PyResult<()> {
        let native = self.inner.native_resolution();
        let samples = if let Ok(array) = data.extract::<PyReadonlyArray3<'_, f32>>() {
            samples_from_array(array, native, |v| v)?
        } else if let Ok(array) = data.extract::<PyReadonlyArray3<'_, f64>>() {
            samples_from_array(array, native, |v| v as f32)?
        } else if data.is_callable() {
            samples_from_callable(data, native)?
        } else {
            return Err(PyTypeError::new_err(
                "expected a float32/float64 array or a callable",
            ));
        };
        self.inner.load_intensity_buffer(&samples).or_raise()
    }

    /// Drops the helper's references to the segment textures, so they are
    /// freed once no geometry uses them.
    fn release_geometry_features(&self) {
        self.inner.release_geometry_features();
    }

    /// Creates a node with one geometry of `geometry_type` per segment.
    /// Exactly one of `spacing` (between voxel centers) and `dimensions` (of
    /// the whole volume) must be given.
    #[pyo3(signature = (geometry_type, spacing = None, dimensions = None))]
    fn create_node(
        &self,
        py: Python<'_>,
        geometry_type: u32,
        spacing: Option<(f32, f32, f32)>,
        dimensions: Option<(f32, f32, f32)>,
    ) -> PyResult<Py<PyNode>> {
        let extent = match (spacing, dimensions) {
            (Some(s), None) => Extent::Spacing(Vec3::from(s)),
            (None, Some(d)) => Extent::Dimensions(Vec3::from(d)),
            _ => {
                return Err(PyValueError::new_err(
                    "exactly one of spacing and dimensions must be given",
                ))
            }
        };
        let node = self.inner.create_node(geometry_type, extent).or_raise()?;
        PyNode::wrap(py, node)
    }
}
