//! Headless OpenGL contexts on EGL pbuffer surfaces.
//!
//! A context is created against the default EGL display or, when that fails
//! (typically on machines without a display server), against the first GPU
//! device that `EGL_EXT_device_enumeration` reports and that initializes.
//!
//! All live contexts of the process are kept in a registry. A new context
//! shares its GL object namespace with the oldest live one, so textures and
//! buffers created in one context are usable in the others.

use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use khronos_egl as egl;
use libcarna_core::render::{check_gl, GlContext};
use libcarna_core::BindingError;
use log::{debug, info, warn};

use crate::config::ContextConfig;
use crate::error::EglError;

/// `EGL_PLATFORM_DEVICE_EXT` from `EGL_EXT_platform_device`.
const PLATFORM_DEVICE_EXT: egl::Enum = 0x313F;

type QueryDevicesExt = unsafe extern "system" fn(egl::Int, *mut *mut c_void, *mut egl::Int) -> egl::Boolean;
type GetPlatformDisplayExt = unsafe extern "system" fn(egl::Enum, *mut c_void, *const egl::Int) -> *mut c_void;

type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

/// Lifecycle of an [`OffscreenContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    DisplaySelected,
    Initialized,
    /// Current on the calling thread.
    Active,
    /// Alive, but another context (or none) is current on the calling thread.
    Inactive,
    Destroyed,
}

/// Where the display of a context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySource {
    Default,
    /// Index into the list returned by `eglQueryDevicesEXT`.
    Device(usize),
}

impl fmt::Display for DisplaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplaySource::Default => f.write_str("default display"),
            DisplaySource::Device(index) => write!(f, "device {index}"),
        }
    }
}

struct LiveContext {
    id: u64,
    display: usize,
    context: usize,
}

static LIVE_CONTEXTS: Mutex<Vec<LiveContext>> = Mutex::new(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<Option<u64>> = const { Cell::new(None) };
}

fn live_contexts() -> MutexGuard<'static, Vec<LiveContext>> {
    LIVE_CONTEXTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Number of contexts currently alive in this process.
pub fn live_context_count() -> usize {
    live_contexts().len()
}

#[track_caller]
fn checked<T>(operation: &'static str, result: Result<T, egl::Error>) -> Result<T, EglError> {
    let location = Location::caller();
    result.map_err(|err| EglError::Call {
        operation,
        code: err.native(),
        location,
    })
}

/// Tries the default display first, then every enumerated device in order.
///
/// `enumerate` returns `None` when device enumeration is unavailable. The
/// first display that initializes wins.
fn select_display<D, Dev>(
    try_default: impl FnOnce() -> Option<D>,
    enumerate: impl FnOnce() -> Option<Vec<Dev>>,
    mut try_device: impl FnMut(&Dev) -> Option<D>,
) -> Result<(D, DisplaySource), EglError> {
    if let Some(display) = try_default() {
        return Ok((display, DisplaySource::Default));
    }
    warn!("EGL_DEFAULT_DISPLAY initialization failed");

    let Some(devices) = enumerate() else {
        warn!("EGL device enumeration is not available");
        return Err(EglError::NoDisplay { devices: 0 });
    };
    debug!("{} EGL device(s) found", devices.len());

    for (index, device) in devices.iter().enumerate() {
        if let Some(display) = try_device(device) {
            debug!("EGL device {index} initialized");
            return Ok((display, DisplaySource::Device(index)));
        }
        debug!("EGL device {index} initialization failed");
    }
    Err(EglError::NoDisplay {
        devices: devices.len(),
    })
}

/// An OpenGL context bound to a minimal pbuffer surface.
pub struct OffscreenContext {
    id: u64,
    egl: EglInstance,
    display: egl::Display,
    surface: egl::Surface,
    context: egl::Context,
    source: DisplaySource,
    gl: glow::Context,
    vendor: String,
    renderer: String,
}

impl OffscreenContext {
    /// Creates a context with the default configuration and makes it current.
    pub fn create() -> Result<Self, EglError> {
        Self::with_config(&ContextConfig::from_env())
    }

    #[allow(unsafe_code)]
    pub fn with_config(config: &ContextConfig) -> Result<Self, EglError> {
        if config.unset_display {
            std::env::remove_var("DISPLAY");
        }

        // SAFETY: loads libEGL and resolves the EGL 1.4 entry points.
        let egl = unsafe { EglInstance::load_required() }.map_err(|err| EglError::Library(err.to_string()))?;

        let initialize = |display: egl::Display| match egl.initialize(display) {
            Ok((major, minor)) => {
                debug!("EGL {major}.{minor} initialized");
                true
            }
            Err(err) => {
                debug!("eglInitialize failed: {err}");
                false
            }
        };

        let (display, source) = select_display(
            // SAFETY: DEFAULT_DISPLAY is always a valid native display id.
            || unsafe { egl.get_display(egl::DEFAULT_DISPLAY) }.filter(|&d| initialize(d)),
            || query_devices(&egl, config.max_devices),
            |&device| {
                let display = get_platform_display(&egl, device)?;
                initialize(display).then_some(display)
            },
        )?;
        debug!("{:?} via {source}", ContextState::DisplaySelected);

        checked("eglBindAPI", egl.bind_api(egl::OPENGL_API))?;

        let egl_config = checked(
            "eglChooseConfig",
            egl.choose_first_config(display, &config.config_attributes()),
        )?
        .ok_or(EglError::NoConfig)?;

        let surface = checked(
            "eglCreatePbufferSurface",
            egl.create_pbuffer_surface(display, egl_config, &config.pbuffer_attributes()),
        )?;

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let context = {
            let mut live = live_contexts();
            let share = live.first().and_then(|first| {
                if first.display == display.as_ptr() as usize {
                    // SAFETY: the registry only holds contexts that are alive;
                    // entries are removed before their context is destroyed.
                    Some(unsafe { egl::Context::from_ptr(first.context as egl::EGLContext) })
                } else {
                    warn!("oldest live context is on another display, not sharing");
                    None
                }
            });
            let context = match egl.create_context(display, egl_config, share, &[egl::NONE]) {
                Ok(context) => context,
                Err(err) => {
                    let _ = egl.destroy_surface(display, surface);
                    return Err(EglError::call("eglCreateContext", err.native()));
                }
            };
            live.push(LiveContext {
                id,
                display: display.as_ptr() as usize,
                context: context.as_ptr() as usize,
            });
            debug!("context {id} created, sharing: {}", share.is_some());
            context
        };

        // glow queries GL_VERSION while loading, so the context must be
        // current first.
        if let Err(err) = egl.make_current(display, Some(surface), Some(surface), Some(context)) {
            live_contexts().retain(|live| live.id != id);
            let _ = egl.destroy_context(display, context);
            let _ = egl.destroy_surface(display, surface);
            return Err(EglError::call("eglMakeCurrent", err.native()));
        }
        CURRENT.with(|current| current.set(Some(id)));

        // From here on, Drop cleans up.
        let gl = unsafe {
            // SAFETY: the context is current; the loader resolves GL symbols
            // of the current EGL client.
            glow::Context::from_loader_function(|name| {
                egl.get_proc_address(name)
                    .map_or(std::ptr::null(), |f| f as *const c_void)
            })
        };
        let mut this = Self {
            id,
            egl,
            display,
            surface,
            context,
            source,
            gl,
            vendor: String::new(),
            renderer: String::new(),
        };
        debug!("{:?}", ContextState::Initialized);

        {
            use glow::HasContext;
            // SAFETY: the context is current.
            unsafe {
                this.vendor = this.gl.get_parameter_string(glow::VENDOR);
                this.renderer = this.gl.get_parameter_string(glow::RENDERER);
            }
        }
        check_gl(&this.gl, "get_parameter_string")?;
        info!("OpenGL context {id}: {} / {}", this.vendor, this.renderer);
        Ok(this)
    }

    /// Makes this context current on the calling thread. Repeatable.
    pub fn activate(&self) -> Result<(), EglError> {
        checked(
            "eglMakeCurrent",
            self.egl.make_current(
                self.display,
                Some(self.surface),
                Some(self.surface),
                Some(self.context),
            ),
        )?;
        CURRENT.with(|current| current.set(Some(self.id)));
        Ok(())
    }

    pub fn state(&self) -> ContextState {
        if CURRENT.with(Cell::get) == Some(self.id) {
            ContextState::Active
        } else {
            ContextState::Inactive
        }
    }

    /// `GL_VENDOR`, queried once at creation.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// `GL_RENDERER`, queried once at creation.
    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    pub fn source(&self) -> DisplaySource {
        self.source
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}

#[allow(unsafe_code)]
fn query_devices(egl: &EglInstance, max_devices: usize) -> Option<Vec<*mut c_void>> {
    let address = egl.get_proc_address("eglQueryDevicesEXT")?;
    // SAFETY: the symbol has the signature from EGL_EXT_device_enumeration.
    let query: QueryDevicesExt = unsafe { std::mem::transmute(address) };

    let mut devices = vec![std::ptr::null_mut(); max_devices];
    let mut count: egl::Int = 0;
    let max = egl::Int::try_from(max_devices).unwrap_or(egl::Int::MAX);
    // SAFETY: `devices` has room for `max` handles.
    let ok = unsafe { query(max, devices.as_mut_ptr(), &mut count) };
    if ok != egl::TRUE {
        warn!("eglQueryDevicesEXT failed");
        return None;
    }
    devices.truncate(usize::try_from(count).unwrap_or(0));
    Some(devices)
}

#[allow(unsafe_code)]
fn get_platform_display(egl: &EglInstance, device: *mut c_void) -> Option<egl::Display> {
    let address = egl.get_proc_address("eglGetPlatformDisplayEXT")?;
    // SAFETY: the symbol has the signature from EGL_EXT_platform_base.
    let get_display: GetPlatformDisplayExt = unsafe { std::mem::transmute(address) };
    // SAFETY: `device` came from eglQueryDevicesEXT; the attribute list is
    // empty.
    let display = unsafe { get_display(PLATFORM_DEVICE_EXT, device, std::ptr::null()) };
    if display.is_null() {
        return None;
    }
    // SAFETY: non-null handle returned by EGL.
    Some(unsafe { egl::Display::from_ptr(display) })
}

impl GlContext for OffscreenContext {
    fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn make_current(&self) -> Result<(), BindingError> {
        self.activate()
            .map_err(|err| BindingError::Context(err.to_string()))
    }
}

impl Drop for OffscreenContext {
    fn drop(&mut self) {
        live_contexts().retain(|live| live.id != self.id);
        CURRENT.with(|current| {
            if current.get() == Some(self.id) {
                current.set(None);
            }
        });
        if let Err(err) = self.egl.destroy_context(self.display, self.context) {
            warn!("eglDestroyContext failed: {err}");
        }
        if let Err(err) = self.egl.destroy_surface(self.display, self.surface) {
            warn!("eglDestroySurface failed: {err}");
        }
        debug!("context {} {:?}", self.id, ContextState::Destroyed);
    }
}

impl fmt::Debug for OffscreenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffscreenContext")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("vendor", &self.vendor)
            .field("renderer", &self.renderer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn default_display_wins_without_enumeration() {
        let enumerated = Cell::new(false);
        let result = select_display(
            || Some("default"),
            || {
                enumerated.set(true);
                Some(vec![0])
            },
            |_| Some("device"),
        );
        let (display, source) = result.unwrap();
        assert_eq!((display, source), ("default", DisplaySource::Default));
        assert!(!enumerated.get());
    }

    #[test]
    fn devices_are_tried_in_order_until_one_succeeds() {
        let tried = RefCell::new(Vec::new());
        let (display, source) = select_display(
            || None,
            || Some(vec![10, 11, 12, 13]),
            |&device| {
                tried.borrow_mut().push(device);
                (device == 12).then_some(device)
            },
        )
        .unwrap();
        assert_eq!(display, 12);
        assert_eq!(source, DisplaySource::Device(2));
        assert_eq!(*tried.borrow(), vec![10, 11, 12]);
    }

    #[test]
    fn all_devices_failing_is_no_display() {
        let result = select_display(|| None::<u8>, || Some(vec![1, 2]), |_| None);
        assert!(matches!(result, Err(EglError::NoDisplay { devices: 2 })));
    }

    #[test]
    fn missing_enumeration_is_no_display() {
        let result = select_display(|| None::<u8>, || None::<Vec<u8>>, |_| Some(0));
        assert!(matches!(result, Err(EglError::NoDisplay { devices: 0 })));
    }

    #[test]
    fn display_source_formats_readably() {
        assert_eq!(DisplaySource::Device(3).to_string(), "device 3");
        assert_eq!(DisplaySource::Default.to_string(), "default display");
    }
}
