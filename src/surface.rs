use image::ImageBuffer;
use image::Luma;
use rayon::prelude::*;
use thiserror::Error;

/// Capabilities a buffer must offer so a rendering surface can display it.
///
/// Native axial slices and reconstructed planes both implement this trait,
/// which is the whole point: the renderer cannot tell a synthetic plane from
/// an acquired one.
pub trait PlaneSource {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// Row-major pixel samples, `width * height` values.
    fn pixels(&self) -> &[u16];

    fn min_value(&self) -> u16;
    fn max_value(&self) -> u16;
    fn rescale_slope(&self) -> f32;
    fn rescale_intercept(&self) -> f32;
    fn window_center(&self) -> f32;
    fn window_width(&self) -> f32;

    /// Sample at `(x, y)` without bounds checking beyond the slice index.
    fn pixel(&self, x: usize, y: usize) -> u16 {
        self.pixels()[y * self.width() + x]
    }

    /// Raw native-endian bytes of the pixel buffer, for hosts that upload
    /// 16-bit textures directly.
    fn pixel_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.pixels())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    #[error("surface is not enabled")]
    NotEnabled,

    #[error("surface backend error: {0}")]
    Backend(String),
}

/// A drawing target supplied by the host.
///
/// The session drives one surface per viewing plane: it enables the surface
/// on activation, pushes a [`PlaneSource`] plus crosshair line positions on
/// every render, and disables the surface on deactivation. Window-level
/// state lives on the surface so the host's own controls keep working.
pub trait RenderSurface {
    fn enable(&mut self) -> Result<(), SurfaceError>;
    fn disable(&mut self) -> Result<(), SurfaceError>;

    /// Display a buffer on this surface.
    fn display(&mut self, plane: &dyn PlaneSource) -> Result<(), SurfaceError>;

    fn set_windowing(&mut self, center: f32, width: f32) -> Result<(), SurfaceError>;
    fn get_windowing(&self) -> Result<(f32, f32), SurfaceError>;

    /// Position the crosshair overlay. Both coordinates are normalized to
    /// `[0,1]`: `horizontal` is the vertical line's offset from the left
    /// edge, `vertical` the horizontal line's offset from the top.
    fn draw_crosshair(&mut self, horizontal: f32, vertical: f32) -> Result<(), SurfaceError>;
}

impl<T: RenderSurface + ?Sized> RenderSurface for &mut T {
    fn enable(&mut self) -> Result<(), SurfaceError> {
        (**self).enable()
    }

    fn disable(&mut self) -> Result<(), SurfaceError> {
        (**self).disable()
    }

    fn display(&mut self, plane: &dyn PlaneSource) -> Result<(), SurfaceError> {
        (**self).display(plane)
    }

    fn set_windowing(&mut self, center: f32, width: f32) -> Result<(), SurfaceError> {
        (**self).set_windowing(center, width)
    }

    fn get_windowing(&self) -> Result<(f32, f32), SurfaceError> {
        (**self).get_windowing()
    }

    fn draw_crosshair(&mut self, horizontal: f32, vertical: f32) -> Result<(), SurfaceError> {
        (**self).draw_crosshair(horizontal, vertical)
    }
}

/// Apply modality rescale and a linear window to produce 8-bit display data.
///
/// Values at or below `center - width/2` map to 0, values at or above
/// `center + width/2` map to 255, with a linear ramp in between.
pub fn apply_window(plane: &dyn PlaneSource, center: f32, width: f32) -> Vec<u8> {
    let slope = plane.rescale_slope();
    let intercept = plane.rescale_intercept();

    // A degenerate window collapses to full-range normalization.
    let (center, width) = if width > 0.0 {
        (center, width)
    } else {
        let lo = plane.min_value() as f32 * slope + intercept;
        let hi = plane.max_value() as f32 * slope + intercept;
        ((lo + hi) / 2.0, (hi - lo).max(1.0))
    };
    let lower = center - width / 2.0;

    plane
        .pixels()
        .par_iter()
        .map(|&raw| {
            let value = raw as f32 * slope + intercept;
            let normalized = ((value - lower) / width).clamp(0.0, 1.0);
            (normalized * 255.0) as u8
        })
        .collect()
}

/// In-process rendering surface without any GPU or DOM behind it.
///
/// Renders into an [`ImageBuffer`] by applying the plane's (or an
/// overridden) window, and records the crosshair position it was last asked
/// to draw. Useful for tests and for hosts that only need software frames.
#[derive(Default)]
pub struct SoftwareSurface {
    enabled: bool,
    /// Host-set window overriding whatever the displayed plane declares.
    windowing: Option<(f32, f32)>,
    /// Window actually used by the most recent display.
    applied: Option<(f32, f32)>,
    frame: Option<ImageBuffer<Luma<u8>, Vec<u8>>>,
    crosshair: Option<(f32, f32)>,
}

impl SoftwareSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The most recently displayed frame, if any.
    pub fn frame(&self) -> Option<&ImageBuffer<Luma<u8>, Vec<u8>>> {
        self.frame.as_ref()
    }

    /// The most recently drawn crosshair position, if any.
    pub fn crosshair(&self) -> Option<(f32, f32)> {
        self.crosshair
    }
}

impl RenderSurface for SoftwareSurface {
    fn enable(&mut self) -> Result<(), SurfaceError> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), SurfaceError> {
        self.enabled = false;
        self.frame = None;
        self.crosshair = None;
        self.applied = None;
        Ok(())
    }

    fn display(&mut self, plane: &dyn PlaneSource) -> Result<(), SurfaceError> {
        if !self.enabled {
            return Err(SurfaceError::NotEnabled);
        }

        let (center, width) = self
            .windowing
            .unwrap_or((plane.window_center(), plane.window_width()));
        let pixel_data = apply_window(plane, center, width);
        self.applied = Some((center, width));
        self.frame = ImageBuffer::from_raw(plane.width() as u32, plane.height() as u32, pixel_data);
        match self.frame {
            Some(_) => Ok(()),
            None => Err(SurfaceError::Backend(
                "pixel buffer does not match plane dimensions".into(),
            )),
        }
    }

    fn set_windowing(&mut self, center: f32, width: f32) -> Result<(), SurfaceError> {
        self.windowing = Some((center, width));
        Ok(())
    }

    fn get_windowing(&self) -> Result<(f32, f32), SurfaceError> {
        self.windowing
            .or(self.applied)
            .ok_or(SurfaceError::NotEnabled)
    }

    fn draw_crosshair(&mut self, horizontal: f32, vertical: f32) -> Result<(), SurfaceError> {
        if !self.enabled {
            return Err(SurfaceError::NotEnabled);
        }
        self.crosshair = Some((horizontal, vertical));
        Ok(())
    }
}
