//! Python extension module `libcarna`.
//!
//! Submodules mirror the package layout scripts import from:
//! `libcarna.base` (views, features, renderer, surface), `libcarna.egl`
//! (headless contexts), `libcarna.presets` (render stages) and
//! `libcarna.helpers` (stage batching, volume grids).
//!
//! Every class is `unsendable`: views are reference counted with `Rc` and the
//! GL context is bound to the thread that made it current.

use std::fmt::Display;

use glam::Mat4;
use libcarna_core::{Engine, EngineRef};
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

mod base;
mod convert;
mod egl;
mod helpers;
mod presets;

thread_local! {
    static ENGINE: EngineRef = Engine::new_ref();
}

/// The engine of the calling thread. All objects created from Python on a
/// thread live in the same engine.
pub(crate) fn engine() -> EngineRef {
    ENGINE.with(EngineRef::clone)
}

/// Raises any displayable error as `RuntimeError`.
pub(crate) trait OrRaise<T> {
    fn or_raise(self) -> PyResult<T>;
}

impl<T, E: Display> OrRaise<T> for Result<T, E> {
    fn or_raise(self) -> PyResult<T> {
        self.map_err(|err| PyRuntimeError::new_err(err.to_string()))
    }
}

/// Converts a matrix to a row-major `(4, 4)` float64 array.
pub(crate) fn mat4_to_py(py: Python<'_>, matrix: Mat4) -> Bound<'_, PyArray2<f64>> {
    convert::mat4_to_rows(matrix).into_pyarray(py)
}

pub(crate) fn mat4_from_py(array: PyReadonlyArray2<'_, f64>) -> PyResult<Mat4> {
    convert::mat4_from_rows(array.as_array()).map_err(PyRuntimeError::new_err)
}

/// Drains the engine event log of the calling thread, oldest first.
#[pyfunction]
fn debug_events() -> Vec<String> {
    let engine = engine();
    let events = engine.borrow_mut().take_events();
    events.iter().map(ToString::to_string).collect()
}

fn add_submodule(
    parent: &Bound<'_, PyModule>,
    name: &str,
    register: fn(&Bound<'_, PyModule>) -> PyResult<()>,
) -> PyResult<()> {
    let py = parent.py();
    let module = PyModule::new(py, name)?;
    register(&module)?;
    parent.add_submodule(&module)?;
    py.import("sys")?
        .getattr("modules")?
        .set_item(format!("libcarna.{name}"), &module)?;
    Ok(())
}

#[pymodule]
fn libcarna(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = env_logger::try_init();
    m.add_function(wrap_pyfunction!(debug_events, m)?)?;
    add_submodule(m, "base", base::register)?;
    add_submodule(m, "egl", egl::register)?;
    add_submodule(m, "presets", presets::register)?;
    add_submodule(m, "helpers", helpers::register)?;
    Ok(())
}
