//! `libcarna.presets`: render stages that ship with the binding.

use std::rc::Rc;

use libcarna_core::render::{FillStage, LayerView, MipLayer, MipStage, Region, StageView};
use pyo3::prelude::*;

use crate::base::{ColorArg, PyColor, PyRenderStage};
use crate::{engine, OrRaise};

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFillStage>()?;
    m.add_class::<PyMipLayer>()?;
    m.add_class::<PyMipStage>()?;
    Ok(())
}

/// Fills the viewport, or the `(x, y, width, height)` region of it measured
/// from the top-left corner, with a solid color.
#[pyclass(name = "FillStage", module = "libcarna.presets", extends = PyRenderStage, unsendable)]
pub(crate) struct PyFillStage;

#[pymethods]
impl PyFillStage {
    #[new]
    #[pyo3(signature = (color, region = None))]
    fn new(color: ColorArg, region: Option<(u32, u32, u32, u32)>) -> PyResult<(Self, PyRenderStage)> {
        let mut stage = FillStage::new(color.resolve().or_raise()?);
        if let Some((x, y, width, height)) = region {
            stage = stage.with_region(Region { x, y, width, height });
        }
        let view = StageView::create(&engine(), stage);
        Ok((Self, PyRenderStage { view }))
    }
}

/// Maps the intensity range `[min_intensity, max_intensity]` to a color.
#[pyclass(name = "MIPLayer", module = "libcarna.presets", unsendable)]
pub(crate) struct PyMipLayer {
    view: Rc<LayerView>,
}

#[pymethods]
impl PyMipLayer {
    #[new]
    fn new(min_intensity: f32, max_intensity: f32, color: ColorArg) -> PyResult<Self> {
        let layer = MipLayer::new(min_intensity, max_intensity, color.resolve().or_raise()?);
        Ok(Self {
            view: LayerView::create(&engine(), layer),
        })
    }

    #[getter]
    fn min_intensity(&self) -> PyResult<f32> {
        Ok(self.view.settings().or_raise()?.min_intensity)
    }

    #[getter]
    fn max_intensity(&self) -> PyResult<f32> {
        Ok(self.view.settings().or_raise()?.max_intensity)
    }

    #[getter]
    fn color(&self) -> PyResult<PyColor> {
        Ok(PyColor(self.view.settings().or_raise()?.color))
    }

    #[setter]
    fn set_color(&self, color: ColorArg) -> PyResult<()> {
        self.view.set_color(color.resolve().or_raise()?).or_raise()
    }

    /// Whether a stage owns this layer.
    #[getter]
    fn is_owned(&self) -> bool {
        self.view.is_owned()
    }
}

/// Renders maximum intensity projections of the volume geometries of
/// `geometry_type`, one projection per layer.
#[pyclass(name = "MIPStage", module = "libcarna.presets", extends = PyRenderStage, unsendable)]
pub(crate) struct PyMipStage;

#[allow(non_snake_case)]
#[pymethods]
impl PyMipStage {
    #[new]
    fn new(geometry_type: u32) -> (Self, PyRenderStage) {
        let view = StageView::create(&engine(), MipStage::new(geometry_type));
        (Self, PyRenderStage { view })
    }

    #[classattr]
    fn ROLE_INTENSITIES() -> u32 {
        MipStage::ROLE_INTENSITIES
    }

    /// Appends `layer`; the stage deletes it from then on. Raises if another
    /// stage already owns the layer.
    fn append_layer(slf: PyRef<'_, Self>, layer: PyRef<'_, PyMipLayer>) -> PyResult<()> {
        slf.as_super().view.append_layer(&layer.view).or_raise()
    }

    /// Hands `layer` back to the script. No-op if this stage does not own it.
    fn remove_layer(slf: PyRef<'_, Self>, layer: PyRef<'_, PyMipLayer>) -> PyResult<()> {
        slf.as_super().view.remove_layer(&layer.view).or_raise()
    }

    #[getter]
    fn layers_count(slf: PyRef<'_, Self>) -> PyResult<usize> {
        Ok(slf.as_super().view.layers_count().or_raise()?.unwrap_or(0))
    }
}
