use crate::enums::ReformatAxis;
use crate::surface::PlaneSource;
use crate::volume::Volume;

use ndarray::ArrayView2;
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;
use web_time::Instant;

#[derive(Debug, Clone, Error)]
pub enum ReformatError {
    #[error("index {index} is outside [0, {extent}) on the {axis:?} axis")]
    IndexOutOfRange {
        axis: ReformatAxis,
        index: usize,
        extent: usize,
    },

    #[error("slice {slice} pixel buffer does not match the volume dimensions")]
    CorruptSlice { slice: usize },
}

/// A reconstructed sagittal or coronal plane.
///
/// Carries the same display metadata a native slice does, so any
/// [`RenderSurface`](crate::surface::RenderSurface) can show it without
/// knowing it is synthetic. Derived data: cached per volume, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReformattedPlane {
    pub axis: ReformatAxis,
    pub index: usize,
    pub width: usize,
    pub height: usize,
    /// Row-major samples, `width * height` values.
    pub pixels: Vec<u16>,
    pub min_value: u16,
    pub max_value: u16,
    pub rescale_slope: f32,
    pub rescale_intercept: f32,
    pub window_center: f32,
    pub window_width: f32,
}

impl PlaneSource for ReformattedPlane {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    fn min_value(&self) -> u16 {
        self.min_value
    }

    fn max_value(&self) -> u16 {
        self.max_value
    }

    fn rescale_slope(&self) -> f32 {
        self.rescale_slope
    }

    fn rescale_intercept(&self) -> f32 {
        self.rescale_intercept
    }

    fn window_center(&self) -> f32 {
        self.window_center
    }

    fn window_width(&self) -> f32 {
        self.window_width
    }
}

/// Resamples a volume along an axis orthogonal to how it was acquired.
pub struct ReformattingEngine;

impl ReformattingEngine {
    /// Reconstruct the plane at `index` along `axis`.
    ///
    /// Sagittal planes are `height x depth`, coronal planes `width x depth`.
    /// Rows run from the superior end of the stack downwards: output row `z`
    /// reads acquisition slice `depth - 1 - z`. Coronal planes additionally
    /// sample pixel row `height - 1 - index` so the anterior side ends up on
    /// top, which together give conventional radiological orientation.
    ///
    /// Display metadata is seeded from the volume's first slice, with the
    /// window defaulting to the full value range.
    ///
    /// This is the O(width * height * depth) hot path; callers are expected
    /// to memoize results per `(axis, index)` via
    /// [`PlaneCache`](crate::plane_cache::PlaneCache).
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is outside the axis extent or any source
    /// slice's pixel buffer disagrees with the volume dimensions.
    pub fn reformat(
        volume: &Volume,
        axis: ReformatAxis,
        index: usize,
    ) -> Result<ReformattedPlane, ReformatError> {
        let started = Instant::now();
        let (width, height, depth) = (volume.width(), volume.height(), volume.depth());

        let extent = match axis {
            ReformatAxis::Sagittal => width,
            ReformatAxis::Coronal => height,
        };
        if index >= extent {
            return Err(ReformatError::IndexOutOfRange {
                axis,
                index,
                extent,
            });
        }

        let views = Self::slice_views(volume)?;
        let pixels: Vec<u16> = match axis {
            ReformatAxis::Sagittal => (0..depth)
                .into_par_iter()
                .flat_map(|z| {
                    let source = &views[depth - 1 - z];
                    (0..height)
                        .map(|y| source[[y, index]])
                        .collect::<Vec<u16>>()
                })
                .collect(),
            ReformatAxis::Coronal => {
                let row = height - 1 - index;
                (0..depth)
                    .into_par_iter()
                    .flat_map(|z| {
                        let source = &views[depth - 1 - z];
                        (0..width).map(|x| source[[row, x]]).collect::<Vec<u16>>()
                    })
                    .collect()
            }
        };

        let (out_width, out_height) = match axis {
            ReformatAxis::Sagittal => (height, depth),
            ReformatAxis::Coronal => (width, depth),
        };
        let reference = volume.reference_slice();

        debug!(
            ?axis,
            index,
            out_width,
            out_height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reformatted plane"
        );

        Ok(ReformattedPlane {
            axis,
            index,
            width: out_width,
            height: out_height,
            pixels,
            min_value: reference.min_value,
            max_value: reference.max_value,
            rescale_slope: reference.rescale_slope,
            rescale_intercept: reference.rescale_intercept,
            window_center: reference.max_value as f32 / 2.0,
            window_width: reference.max_value as f32,
        })
    }

    fn slice_views(volume: &Volume) -> Result<Vec<ArrayView2<'_, u16>>, ReformatError> {
        volume
            .slices()
            .iter()
            .enumerate()
            .map(|(slice, buffer)| {
                buffer
                    .view()
                    .ok_or(ReformatError::CorruptSlice { slice })
            })
            .collect()
    }
}
