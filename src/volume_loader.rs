use crate::slice::SliceBuffer;
use crate::volume::{Spacing, Volume};

use futures::{Stream, StreamExt, pin_mut};
use thiserror::Error;
use tracing::debug;
use web_time::Instant;

/// Fewest slices that still give a meaningful three-plane view.
pub const MIN_VOLUME_DEPTH: usize = 3;

/// Inter-slice distance assumed when the series carries no position or
/// thickness information.
pub const DEFAULT_SLICE_SPACING: f32 = 1.0;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("no slices provided")]
    EmptyVolume,

    #[error("volume depth {depth} is below the required minimum of {required}")]
    InsufficientDepth { depth: usize, required: usize },

    #[error(
        "slice {index} has dimensions {found_width}x{found_height}, expected {expected_width}x{expected_height}"
    )]
    InconsistentDimensions {
        index: usize,
        found_width: usize,
        found_height: usize,
        expected_width: usize,
        expected_height: usize,
    },
}

/// Builds validated [`Volume`]s from decoded slices.
///
/// The loader owns the admission policy for a series: ordering, dimension
/// consistency, the minimum depth, and spacing derivation. It never touches
/// any cache.
pub struct VolumeLoader {
    min_depth: usize,
}

impl Default for VolumeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeLoader {
    pub fn new() -> Self {
        Self {
            min_depth: MIN_VOLUME_DEPTH,
        }
    }

    /// Override the minimum slice count admitted by [`build`](Self::build).
    pub fn with_min_depth(min_depth: usize) -> Self {
        Self { min_depth }
    }

    /// Build a volume from decoded slices
    ///
    /// Slices are ordered by their acquisition index before validation.
    ///
    /// # Errors
    ///
    /// Returns an error if no slices are given, the stack is shallower than
    /// the configured minimum, or any slice disagrees with the first one on
    /// in-plane dimensions.
    pub fn build(&self, mut slices: Vec<SliceBuffer>) -> Result<Volume, VolumeLoaderError> {
        if slices.is_empty() {
            return Err(VolumeLoaderError::EmptyVolume);
        }
        if slices.len() < self.min_depth {
            return Err(VolumeLoaderError::InsufficientDepth {
                depth: slices.len(),
                required: self.min_depth,
            });
        }

        Self::sort_slices(&mut slices);
        Self::validate_dimensions(&slices)?;

        let spacing = Self::get_spacing(&slices);
        debug!(
            depth = slices.len(),
            width = slices[0].width,
            height = slices[0].height,
            spacing_z = spacing.z,
            "built volume"
        );

        Ok(Volume::new(slices, spacing))
    }

    /// Await the ingestion side's slice stream, then build the volume.
    ///
    /// `progress` is invoked after each received slice with the number of
    /// slices loaded so far and the expected total, when the stream knows
    /// one. This is the only asynchronous boundary of the engine.
    pub async fn load_from_stream<S, F>(
        &self,
        stream: S,
        mut progress: F,
    ) -> Result<Volume, VolumeLoaderError>
    where
        S: Stream<Item = SliceBuffer>,
        F: FnMut(usize, Option<usize>),
    {
        let started = Instant::now();
        pin_mut!(stream);

        let mut slices = Vec::new();
        while let Some(slice) = stream.next().await {
            slices.push(slice);
            let total = stream.size_hint().1.map(|upper| slices.len() + upper);
            progress(slices.len(), total);
        }
        debug!(
            count = slices.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingested slice data"
        );

        self.build(slices)
    }

    fn sort_slices(slices: &mut [SliceBuffer]) {
        slices.sort_by_key(|slice| slice.acquisition_index);
    }

    fn validate_dimensions(slices: &[SliceBuffer]) -> Result<(), VolumeLoaderError> {
        let (expected_width, expected_height) = slices[0].dims();
        match slices
            .iter()
            .enumerate()
            .find(|(_, slice)| slice.dims() != (expected_width, expected_height))
        {
            Some((index, slice)) => Err(VolumeLoaderError::InconsistentDimensions {
                index,
                found_width: slice.width,
                found_height: slice.height,
                expected_width,
                expected_height,
            }),
            None => Ok(()),
        }
    }

    fn get_spacing(slices: &[SliceBuffer]) -> Spacing {
        let first = &slices[0];
        Spacing {
            x: first.pixel_spacing_x,
            y: first.pixel_spacing_y,
            z: Self::get_slice_spacing(slices),
        }
    }

    /// Derive the inter-slice distance.
    ///
    /// Prefers the 3D distance between the first two slices' spatial
    /// positions, falls back to the first declared slice thickness, then to
    /// [`DEFAULT_SLICE_SPACING`]. An approximation of the scanner geometry,
    /// not a strict DICOM computation — orientation cosines are ignored.
    fn get_slice_spacing(slices: &[SliceBuffer]) -> f32 {
        let positional = match (
            slices.first().and_then(|s| s.spatial_position),
            slices.get(1).and_then(|s| s.spatial_position),
        ) {
            (Some(a), Some(b)) => {
                let distance = (0..3)
                    .map(|i| (b[i] - a[i]) * (b[i] - a[i]))
                    .sum::<f32>()
                    .sqrt();
                (distance.is_finite() && distance > 0.0).then_some(distance)
            }
            _ => None,
        };

        positional
            .or_else(|| slices.iter().find_map(|slice| slice.slice_thickness))
            .unwrap_or(DEFAULT_SLICE_SPACING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_slice(index: u32, width: usize, height: usize) -> SliceBuffer {
        SliceBuffer {
            identifier: format!("slice-{index}"),
            pixels: vec![0; width * height],
            width,
            height,
            min_value: 0,
            max_value: 4095,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            window_center: 2048.0,
            window_width: 4096.0,
            pixel_spacing_x: 0.5,
            pixel_spacing_y: 0.5,
            spatial_position: None,
            slice_thickness: None,
            acquisition_index: index,
        }
    }

    fn make_stack(depth: usize) -> Vec<SliceBuffer> {
        (0..depth as u32).map(|i| make_slice(i, 4, 4)).collect()
    }

    #[test]
    fn empty_input_is_rejected() {
        let result = VolumeLoader::new().build(Vec::new());
        assert!(matches!(result, Err(VolumeLoaderError::EmptyVolume)));
    }

    #[test]
    fn shallow_stacks_are_rejected() {
        for depth in [1, 2] {
            let result = VolumeLoader::new().build(make_stack(depth));
            assert!(matches!(
                result,
                Err(VolumeLoaderError::InsufficientDepth { depth: d, required: 3 }) if d == depth
            ));
        }
    }

    #[test]
    fn min_depth_is_configurable() {
        let volume = VolumeLoader::with_min_depth(2).build(make_stack(2)).unwrap();
        assert_eq!(volume.depth(), 2);
    }

    #[test]
    fn inconsistent_dimensions_name_the_offender() {
        let mut slices = make_stack(4);
        slices[2] = make_slice(2, 8, 4);

        let result = VolumeLoader::new().build(slices);
        assert!(matches!(
            result,
            Err(VolumeLoaderError::InconsistentDimensions {
                index: 2,
                found_width: 8,
                ..
            })
        ));
    }

    #[test]
    fn slices_are_ordered_by_acquisition_index() {
        let mut slices = make_stack(4);
        slices.reverse();

        let volume = VolumeLoader::new().build(slices).unwrap();
        let order: Vec<u32> = volume
            .slices()
            .iter()
            .map(|slice| slice.acquisition_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn spacing_prefers_spatial_positions() {
        let mut slices = make_stack(3);
        slices[0].spatial_position = Some([0.0, 0.0, 0.0]);
        slices[1].spatial_position = Some([0.0, 3.0, 4.0]);
        slices[0].slice_thickness = Some(9.0);

        let volume = VolumeLoader::new().build(slices).unwrap();
        assert_eq!(volume.spacing().z, 5.0);
        assert_eq!(volume.spacing().x, 0.5);
    }

    #[test]
    fn spacing_falls_back_to_thickness_then_default() {
        let mut slices = make_stack(3);
        slices[1].slice_thickness = Some(2.5);
        let volume = VolumeLoader::new().build(slices).unwrap();
        assert_eq!(volume.spacing().z, 2.5);

        let volume = VolumeLoader::new().build(make_stack(3)).unwrap();
        assert_eq!(volume.spacing().z, DEFAULT_SLICE_SPACING);
    }

    #[tokio::test]
    async fn stream_loading_reports_progress() {
        let mut reports = Vec::new();
        let volume = VolumeLoader::new()
            .load_from_stream(futures::stream::iter(make_stack(3)), |loaded, total| {
                reports.push((loaded, total));
            })
            .await
            .unwrap();

        assert_eq!(volume.depth(), 3);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0], (1, Some(3)));
        assert_eq!(reports[2], (3, Some(3)));
    }
}
