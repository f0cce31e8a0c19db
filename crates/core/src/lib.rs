#![deny(unsafe_code)]
//! Core of the LibCarna binding layer.
//!
//! Provides the engine object store (`Engine`, `SceneGraph`, geometry
//! features), the reference-counted `View` ownership protocol that bridges it
//! to a scripting host, the volume grid helper, `Color`, the flipped
//! `FrameView`, and configuration helpers. The `render` feature adds the GL
//! side: framebuffers, render stages and the frame renderer.

pub mod color;
pub mod engine;
pub mod error;
pub mod feature;
pub mod frame;
pub mod ownership;
pub mod params;
pub mod registry;
pub mod scene;
pub mod spatial;
pub mod volume;

#[cfg(feature = "render")]
pub mod render;

pub use color::Color;
pub use engine::{Engine, EngineEvent, EngineRef, ObjectClass, ObjectRef};
pub use error::BindingError;
pub use feature::{FeatureId, FeatureView, GeometryFeature, Material, MeshShape, ParameterValue};
pub use frame::FrameView;
pub use ownership::{Locks, Managed, Ownership, View};
pub use registry::{Key, Registry};
pub use scene::{SceneGraph, Spatial, SpatialId, SpatialKind};
pub use spatial::{CameraView, GeometryView, NodeView, SpatialHandle, SpatialRef};
pub use volume::{Extent, VolumeGrid, VolumeGridHelper};
