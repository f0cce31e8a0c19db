//! Volume grid helper: partitions volume data into segments and builds the
//! scene node that represents it.
//!
//! The voxel data is owned by a [`VolumeGrid`] behind an `Rc`. The node created
//! by [`VolumeGridHelper::create_node`] locks that grid, so the data stays alive
//! for as long as the node's engine object does, even after the helper is gone.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, UVec3, Vec3};
use log::debug;

use crate::engine::EngineRef;
use crate::error::BindingError;
use crate::feature::{FeatureView, GeometryFeature, VolumeChannel, VolumeTexture};
use crate::spatial::{GeometryView, NodeView};

/// Default upper bound for the memory size of a single segment.
pub const DEFAULT_MAX_SEGMENT_BYTESIZE: usize = 100 * 1024 * 1024;

/// Default role of the intensity textures.
pub const DEFAULT_ROLE_INTENSITIES: u32 = 0;

/// Default role of the normal map textures.
pub const DEFAULT_ROLE_NORMALS: u32 = 1;

const BYTES_PER_VOXEL: usize = std::mem::size_of::<u16>();

/// Spatial size of the volume in millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    /// Distance between two adjacent voxel centers.
    Spacing(Vec3),
    /// Size of the whole dataset.
    Dimensions(Vec3),
}

impl Extent {
    fn spacing(self, native_resolution: UVec3) -> Vec3 {
        match self {
            Extent::Spacing(spacing) => spacing,
            Extent::Dimensions(dimensions) => {
                let steps = (native_resolution.max(UVec3::splat(2)) - UVec3::ONE).as_vec3();
                dimensions / steps
            }
        }
    }
}

/// One segment of the partitioned volume.
#[derive(Debug, Clone)]
pub struct VolumeSegment {
    origin: UVec3,
    resolution: UVec3,
    intensities: Vec<u16>,
    normals: Option<Vec<[i8; 3]>>,
}

impl VolumeSegment {
    /// Position of the segment's first voxel in the native grid.
    pub fn origin(&self) -> UVec3 {
        self.origin
    }

    pub fn resolution(&self) -> UVec3 {
        self.resolution
    }

    fn offset(&self, voxel: UVec3) -> usize {
        linear_index(voxel, self.resolution)
    }

    /// Intensity at a voxel given in segment-local coordinates.
    pub fn intensity(&self, voxel: UVec3) -> u16 {
        self.intensities[self.offset(voxel)]
    }

    pub fn normal(&self, voxel: UVec3) -> Option<[i8; 3]> {
        self.normals.as_ref().map(|n| n[self.offset(voxel)])
    }

    pub fn intensities(&self) -> &[u16] {
        &self.intensities
    }

    pub fn normals(&self) -> Option<&[[i8; 3]]> {
        self.normals.as_deref()
    }

    pub fn bytesize(&self) -> usize {
        self.intensities.len() * BYTES_PER_VOXEL
    }
}

/// Loaded volume data, partitioned into a regular grid of segments.
#[derive(Debug)]
pub struct VolumeGrid {
    native_resolution: UVec3,
    segment_counts: UVec3,
    segments: Vec<VolumeSegment>,
}

impl VolumeGrid {
    pub fn native_resolution(&self) -> UVec3 {
        self.native_resolution
    }

    pub fn segment_counts(&self) -> UVec3 {
        self.segment_counts
    }

    /// Segments in x-fastest order.
    pub fn segments(&self) -> &[VolumeSegment] {
        &self.segments
    }
}

/// Number of voxels in a grid of `resolution`, if its 16-bit samples are
/// addressable on this platform.
fn voxel_count(resolution: UVec3) -> Result<usize, BindingError> {
    let [x, y, z] = resolution.to_array().map(|n| n as usize);
    x.checked_mul(y)
        .and_then(|xy| xy.checked_mul(z))
        .filter(|count| count.checked_mul(BYTES_PER_VOXEL).is_some())
        .ok_or_else(|| {
            BindingError::InvalidVolume(format!(
                "resolution {}x{}x{} is too large",
                resolution.x, resolution.y, resolution.z
            ))
        })
}

/// Offset of `voxel` in an x-fastest buffer of `resolution`.
///
/// Only valid for resolutions that passed [`voxel_count`].
fn linear_index(voxel: UVec3, resolution: UVec3) -> usize {
    let (nx, ny) = (resolution.x as usize, resolution.y as usize);
    voxel.x as usize + nx * (voxel.y as usize + ny * voxel.z as usize)
}

fn div_ceil(a: UVec3, b: UVec3) -> UVec3 {
    UVec3::new(a.x.div_ceil(b.x), a.y.div_ceil(b.y), a.z.div_ceil(b.z))
}

/// Finds the coarsest regular grid whose segments fit into `max_bytesize`.
///
/// Returns the segment resolution and the number of segments per axis.
fn partition(native: UVec3, max_bytesize: usize) -> Result<(UVec3, UVec3), BindingError> {
    if native.min_element() == 0 {
        return Err(BindingError::InvalidVolume(format!(
            "native resolution {}x{}x{} is empty",
            native.x, native.y, native.z
        )));
    }
    voxel_count(native)?;
    if max_bytesize < BYTES_PER_VOXEL {
        return Err(BindingError::InvalidVolume(format!(
            "max segment bytesize {max_bytesize} is smaller than one voxel"
        )));
    }

    let mut counts = UVec3::ONE;
    loop {
        let resolution = div_ceil(native, counts);
        // Bounded by the native voxel count, which was checked above.
        let bytes = voxel_count(resolution)? * BYTES_PER_VOXEL;
        if bytes <= max_bytesize {
            let counts = div_ceil(native, resolution);
            return Ok((resolution, counts));
        }
        let axis = if resolution.z >= resolution.x && resolution.z >= resolution.y {
            2
        } else if resolution.y >= resolution.x {
            1
        } else {
            0
        };
        counts[axis] += 1;
    }
}

fn quantize(intensity: f32) -> u16 {
    (intensity.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
}

/// Central-difference gradient, normalized and scaled to `i8`.
fn normal_at(samples: &[u16], native: UVec3, voxel: UVec3) -> [i8; 3] {
    let at = |v: UVec3| f32::from(samples[linear_index(v, native)]);
    let mut gradient = Vec3::ZERO;
    for axis in 0..3 {
        let mut lo = voxel;
        let mut hi = voxel;
        lo[axis] = voxel[axis].saturating_sub(1);
        hi[axis] = (voxel[axis] + 1).min(native[axis] - 1);
        gradient[axis] = at(hi) - at(lo);
    }
    let normal = gradient.normalize_or_zero() * 127.0;
    [normal.x as i8, normal.y as i8, normal.z as i8]
}

/// Textures of one segment, shared by every node the helper creates.
#[derive(Clone)]
struct SegmentTextures {
    intensities: Rc<FeatureView>,
    normals: Option<Rc<FeatureView>>,
}

/// Prepares the partitioning of a volume and builds its scene node.
pub struct VolumeGridHelper {
    engine: EngineRef,
    native_resolution: UVec3,
    voxel_count: usize,
    max_segment_bytesize: usize,
    segment_resolution: UVec3,
    segment_counts: UVec3,
    intensities_role: u32,
    normals_role: Option<u32>,
    grid: Option<Rc<VolumeGrid>>,
    textures: RefCell<Vec<SegmentTextures>>,
}

impl VolumeGridHelper {
    /// Prepares the partitioning for data of `native_resolution`.
    pub fn new(engine: &EngineRef, native_resolution: UVec3, max_segment_bytesize: usize) -> Result<Self, BindingError> {
        let (segment_resolution, segment_counts) = partition(native_resolution, max_segment_bytesize)?;
        let voxel_count = voxel_count(native_resolution)?;
        debug!(
            "volume grid {native_resolution} split into {segment_counts} segments of {segment_resolution}"
        );
        Ok(Self {
            engine: Rc::clone(engine),
            native_resolution,
            voxel_count,
            max_segment_bytesize,
            segment_resolution,
            segment_counts,
            intensities_role: DEFAULT_ROLE_INTENSITIES,
            normals_role: None,
            grid: None,
            textures: RefCell::new(Vec::new()),
        })
    }

    /// Also computes a normal map when loading, put under [`DEFAULT_ROLE_NORMALS`].
    pub fn with_normals(mut self) -> Self {
        self.normals_role = Some(DEFAULT_ROLE_NORMALS);
        self
    }

    pub fn native_resolution(&self) -> UVec3 {
        self.native_resolution
    }

    pub fn max_segment_bytesize(&self) -> usize {
        self.max_segment_bytesize
    }

    /// Resolution of the interior segments; border segments may be smaller.
    pub fn segment_resolution(&self) -> UVec3 {
        self.segment_resolution
    }

    pub fn segment_counts(&self) -> UVec3 {
        self.segment_counts
    }

    pub fn intensities_role(&self) -> u32 {
        self.intensities_role
    }

    pub fn set_intensities_role(&mut self, role: u32) {
        self.intensities_role = role;
    }

    pub fn normals_role(&self) -> Option<u32> {
        self.normals_role
    }

    pub fn set_normals_role(&mut self, role: Option<u32>) {
        self.normals_role = role;
    }

    pub fn grid(&self) -> Option<&Rc<VolumeGrid>> {
        self.grid.as_ref()
    }

    /// Samples `intensity` at every voxel of the native grid.
    ///
    /// Values are clamped to `[0, 1]` and quantized to 16 bits. Loading again
    /// replaces the data; nodes created earlier keep the data they locked.
    pub fn load_intensities(&mut self, mut intensity: impl FnMut(UVec3) -> f32) {
        let native = self.native_resolution;
        let mut samples = Vec::with_capacity(self.voxel_count);
        for z in 0..native.z {
            for y in 0..native.y {
                for x in 0..native.x {
                    samples.push(quantize(intensity(UVec3::new(x, y, z))));
                }
            }
        }

        let with_normals = self.normals_role.is_some();
        let counts = self.segment_counts;
        let mut segments = Vec::with_capacity(counts.x as usize * counts.y as usize * counts.z as usize);
        for sz in 0..counts.z {
            for sy in 0..counts.y {
                for sx in 0..counts.x {
                    let origin = UVec3::new(sx, sy, sz) * self.segment_resolution;
                    let resolution = (native - origin).min(self.segment_resolution);
                    let mut intensities =
                        Vec::with_capacity(resolution.x as usize * resolution.y as usize * resolution.z as usize);
                    let mut normals = Vec::new();
                    for z in 0..resolution.z {
                        for y in 0..resolution.y {
                            for x in 0..resolution.x {
                                let voxel = origin + UVec3::new(x, y, z);
                                intensities.push(samples[linear_index(voxel, native)]);
                                if with_normals {
                                    normals.push(normal_at(&samples, native, voxel));
                                }
                            }
                        }
                    }
                    segments.push(VolumeSegment {
                        origin,
                        resolution,
                        intensities,
                        normals: with_normals.then_some(normals),
                    });
                }
            }
        }

        self.release_geometry_features();
        self.grid = Some(Rc::new(VolumeGrid {
            native_resolution: native,
            segment_counts: counts,
            segments,
        }));
    }

    /// Loads intensities from an x-fastest buffer of the native resolution.
    pub fn load_intensity_buffer(&mut self, data: &[f32]) -> Result<(), BindingError> {
        let native = self.native_resolution;
        let expected = self.voxel_count;
        if data.len() != expected {
            return Err(BindingError::InvalidVolume(format!(
                "expected {expected} voxels, got {}",
                data.len()
            )));
        }
        self.load_intensities(|v| data[linear_index(v, native)]);
        Ok(())
    }

    /// Drops the helper's references to the segment textures.
    ///
    /// Nodes created earlier keep theirs; the next node gets fresh textures.
    pub fn release_geometry_features(&self) {
        let released = std::mem::take(&mut *self.textures.borrow_mut());
        if !released.is_empty() {
            debug!("released textures of {} volume segment(s)", released.len());
        }
    }

    /// Textures per segment, created on first use.
    fn segment_textures(&self, grid: &VolumeGrid) -> Vec<SegmentTextures> {
        let mut textures = self.textures.borrow_mut();
        if textures.is_empty() {
            for (index, segment) in grid.segments().iter().enumerate() {
                let texture = |channel| {
                    FeatureView::create(
                        &self.engine,
                        GeometryFeature::Volume(VolumeTexture {
                            segment: index,
                            channel,
                            resolution: segment.resolution.to_array(),
                        }),
                    )
                };
                textures.push(SegmentTextures {
                    intensities: texture(VolumeChannel::Intensities),
                    normals: segment.normals().map(|_| texture(VolumeChannel::Normals)),
                });
            }
        }
        textures.clone()
    }

    /// Creates a node with one geometry of `geometry_type` per segment.
    ///
    /// Each geometry is scaled to the segment's size and placed relative to
    /// the volume center. Nodes share the segment textures until
    /// [`release_geometry_features`](Self::release_geometry_features) is
    /// called. The node locks the loaded data.
    pub fn create_node(&self, geometry_type: u32, extent: Extent) -> Result<Rc<NodeView>, BindingError> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| BindingError::InvalidVolume("intensities have not been loaded".into()))?;

        let spacing = extent.spacing(self.native_resolution);
        let center = (self.native_resolution.as_vec3() - Vec3::ONE) / 2.0;
        let textures = self.segment_textures(grid);
        let node = NodeView::create(&self.engine, "Volume Grid");

        for (segment, textures) in grid.segments().iter().zip(&textures) {
            let geometry = GeometryView::create(&self.engine, geometry_type, "");
            let segment_center = segment.origin.as_vec3() + (segment.resolution.as_vec3() - Vec3::ONE) / 2.0;
            let transform = Mat4::from_translation((segment_center - center) * spacing)
                * Mat4::from_scale(segment.resolution.as_vec3() * spacing);
            geometry.spatial().set_local_transform(transform)?;

            geometry.put_feature(self.intensities_role, &textures.intensities)?;
            if let (Some(role), Some(normals)) = (self.normals_role, &textures.normals) {
                geometry.put_feature(role, normals)?;
            }
            node.attach_child(geometry.as_ref())?;
        }

        let lock: Rc<dyn Any> = Rc::clone(grid) as Rc<dyn Any>;
        node.lock(lock);
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn small_volume_fits_one_segment() {
        let (resolution, counts) = partition(UVec3::new(16, 16, 16), DEFAULT_MAX_SEGMENT_BYTESIZE).unwrap();
        assert_eq!(counts, UVec3::ONE);
        assert_eq!(resolution, UVec3::splat(16));
    }

    #[test]
    fn partition_respects_byte_limit_and_covers_volume() {
        let native = UVec3::new(64, 48, 30);
        let max = 8 * 1024;
        let (resolution, counts) = partition(native, max).unwrap();
        let bytes = (resolution.x * resolution.y * resolution.z) as usize * BYTES_PER_VOXEL;
        assert!(bytes <= max, "{bytes} > {max}");
        assert!((resolution * counts).cmpge(native).all());
        assert!(((counts - UVec3::ONE) * resolution).cmplt(native).all(), "no empty segments");
    }

    #[test]
    fn partition_rejects_empty_volume() {
        assert!(matches!(
            partition(UVec3::new(0, 4, 4), DEFAULT_MAX_SEGMENT_BYTESIZE),
            Err(BindingError::InvalidVolume(_))
        ));
        assert!(partition(UVec3::ONE, 1).is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn voxel_count_uses_native_word_size() {
        assert_eq!(voxel_count(UVec3::new(65536, 65536, 2)).ok(), Some(1 << 33));
        assert!(matches!(
            voxel_count(UVec3::splat(u32::MAX)),
            Err(BindingError::InvalidVolume(_))
        ));
        assert_eq!(linear_index(UVec3::new(1, 0, 1), UVec3::new(65536, 65536, 2)), (1 << 32) + 1);
    }

    #[test]
    fn oversized_resolution_is_rejected_up_front() {
        let engine = Engine::new_ref();
        assert!(matches!(
            VolumeGridHelper::new(&engine, UVec3::splat(u32::MAX), DEFAULT_MAX_SEGMENT_BYTESIZE),
            Err(BindingError::InvalidVolume(_))
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn short_buffer_for_large_volume_is_an_error() {
        // 2^33 voxels: the product wraps in 32 bits.
        let engine = Engine::new_ref();
        let mut helper =
            VolumeGridHelper::new(&engine, UVec3::new(65536, 65536, 2), DEFAULT_MAX_SEGMENT_BYTESIZE).unwrap();
        assert!(matches!(
            helper.load_intensity_buffer(&[0.0; 4]),
            Err(BindingError::InvalidVolume(_))
        ));
        assert!(helper.grid().is_none());
    }

    #[test]
    fn intensities_are_clamped_and_quantized() {
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(2.0), u16::MAX);
        assert_eq!(quantize(0.5), 32768);
    }

    #[test]
    fn load_intensities_splits_into_segments() {
        let engine = Engine::new_ref();
        let mut helper = VolumeGridHelper::new(&engine, UVec3::new(4, 4, 4), 4 * 4 * 2 * 2).unwrap();
        assert_eq!(helper.segment_counts(), UVec3::new(1, 1, 2));
        helper.load_intensities(|v| if v.z >= 2 { 1.0 } else { 0.0 });

        let grid = helper.grid().unwrap();
        assert_eq!(grid.segments().len(), 2);
        assert_eq!(grid.segments()[0].intensity(UVec3::ZERO), 0);
        assert_eq!(grid.segments()[1].intensity(UVec3::ZERO), u16::MAX);
        assert_eq!(grid.segments()[1].origin(), UVec3::new(0, 0, 2));
    }

    #[test]
    fn buffer_length_must_match_resolution() {
        let engine = Engine::new_ref();
        let mut helper = VolumeGridHelper::new(&engine, UVec3::new(2, 2, 2), DEFAULT_MAX_SEGMENT_BYTESIZE).unwrap();
        assert!(helper.load_intensity_buffer(&[0.0; 7]).is_err());
        helper.load_intensity_buffer(&[0.25; 8]).unwrap();
        assert!(helper.grid().is_some());
    }

    #[test]
    fn normals_point_along_gradient() {
        let engine = Engine::new_ref();
        let mut helper = VolumeGridHelper::new(&engine, UVec3::new(3, 3, 3), DEFAULT_MAX_SEGMENT_BYTESIZE)
            .unwrap()
            .with_normals();
        helper.load_intensities(|v| v.x as f32 / 2.0);
        let segment = &helper.grid().unwrap().segments()[0];
        assert_eq!(segment.normal(UVec3::ONE), Some([127, 0, 0]));
    }

    #[test]
    fn create_node_requires_loaded_data() {
        let engine = Engine::new_ref();
        let helper = VolumeGridHelper::new(&engine, UVec3::splat(2), DEFAULT_MAX_SEGMENT_BYTESIZE).unwrap();
        assert!(helper
            .create_node(1, Extent::Spacing(Vec3::ONE))
            .is_err());
    }

    #[test]
    fn nodes_share_textures_until_released() {
        let engine = Engine::new_ref();
        let mut helper = VolumeGridHelper::new(&engine, UVec3::new(4, 4, 4), 4 * 4 * 2 * 2).unwrap();
        helper.load_intensities(|_| 0.5);
        let first = helper.create_node(2, Extent::Spacing(Vec3::ONE)).unwrap();
        let second = helper.create_node(2, Extent::Spacing(Vec3::ONE)).unwrap();

        // two segments: 2 nodes + 4 geometries + 2 shared textures
        assert_eq!(engine.borrow().live_objects(), 8);

        drop((first, second));
        assert_eq!(engine.borrow().live_objects(), 2, "helper still holds the textures");

        let third = helper.create_node(2, Extent::Spacing(Vec3::ONE)).unwrap();
        helper.release_geometry_features();
        assert_eq!(engine.borrow().live_objects(), 5, "node keeps its textures");
        drop(third);
        assert_eq!(engine.borrow().live_objects(), 0);
    }

    #[test]
    fn node_locks_volume_data() {
        let engine = Engine::new_ref();
        let mut helper = VolumeGridHelper::new(&engine, UVec3::new(4, 4, 4), 4 * 4 * 2 * 2)
            .unwrap()
            .with_normals();
        helper.load_intensities(|_| 0.5);
        let node = helper
            .create_node(2, Extent::Dimensions(Vec3::splat(3.0)))
            .unwrap();

        assert_eq!(node.children().unwrap(), 2);
        assert_eq!(node.locks_count(), 1);

        let grid = Rc::clone(helper.grid().unwrap());
        drop(helper);
        assert_eq!(Rc::strong_count(&grid), 2, "node keeps the data alive");
        drop(node);
        assert_eq!(Rc::strong_count(&grid), 1);
        assert_eq!(engine.borrow().live_objects(), 0);
    }
}
