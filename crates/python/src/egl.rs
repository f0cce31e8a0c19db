//! `libcarna.egl`: headless OpenGL contexts.

use std::rc::Rc;

use libcarna_egl::OffscreenContext;
use pyo3::prelude::*;

use crate::OrRaise;

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyEglContext>()?;
    Ok(())
}

/// OpenGL context on an EGL pbuffer. Current on creation.
#[pyclass(name = "EGLContext", module = "libcarna.egl", unsendable)]
pub(crate) struct PyEglContext {
    pub(crate) inner: Rc<OffscreenContext>,
}

#[pymethods]
impl PyEglContext {
    #[new]
    fn new() -> PyResult<Self> {
        let inner = OffscreenContext::create().or_raise()?;
        Ok(Self { inner: Rc::new(inner) })
    }

    fn activate(&self) -> PyResult<()> {
        self.inner.activate().or_raise()
    }

    #[getter]
    fn vendor(&self) -> &str {
        self.inner.vendor()
    }

    #[getter]
    fn renderer(&self) -> &str {
        self.inner.renderer()
    }

    fn __repr__(&self) -> String {
        format!(
            "EGLContext(vendor={:?}, renderer={:?}, source={:?})",
            self.inner.vendor(),
            self.inner.renderer(),
            self.inner.source().to_string(),
        )
    }
}
