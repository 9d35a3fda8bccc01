use crate::crosshair::{CROSSHAIR_STEP, CrosshairState, slice_index};
use crate::enums::{Axis, Plane, ReformatAxis, SessionState};
use crate::plane_cache::{PlaneCache, PlaneKey};
use crate::reformat::{ReformatError, ReformattingEngine};
use crate::slice::SliceBuffer;
use crate::surface::{RenderSurface, SurfaceError};
use crate::volume::Volume;
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

use futures::Stream;
use thiserror::Error;
use tracing::{debug, warn};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Volume(#[from] VolumeLoaderError),

    #[error(transparent)]
    Reformat(#[from] ReformatError),

    #[error("surface binding failed for the {plane:?} plane: {source}")]
    SurfaceBindingFailed {
        plane: Plane,
        source: SurfaceError,
    },

    #[error(transparent)]
    Render(#[from] RenderFailures),

    #[error("activation superseded by a newer load")]
    Superseded,

    #[error("no active volume")]
    NotActive,
}

/// The set of per-plane failures from one render pass.
///
/// A failing plane never prevents the other two from rendering; callers get
/// every failure, not just the first.
#[derive(Debug, Error)]
#[error("{} of 3 planes failed to render", .failures.len())]
pub struct RenderFailures {
    pub failures: Vec<(Plane, SessionError)>,
}

/// One viewing plane bound to an externally supplied rendering surface.
pub struct ViewportBinding<S> {
    plane: Plane,
    surface: S,
    current_index: Option<usize>,
}

impl<S> ViewportBinding<S> {
    fn new(plane: Plane, surface: S) -> Self {
        Self {
            plane,
            surface,
            current_index: None,
        }
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// The slice index shown by the last successful render of this plane.
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

/// The three drawing targets a session renders into.
pub struct PlaneSurfaces<S> {
    pub axial: S,
    pub sagittal: S,
    pub coronal: S,
}

impl<S> PlaneSurfaces<S> {
    pub fn new(axial: S, sagittal: S, coronal: S) -> Self {
        Self {
            axial,
            sagittal,
            coronal,
        }
    }
}

/// Orchestrates one multi-planar reconstruction session.
///
/// Owns the volume, the plane cache, the crosshair and the three viewport
/// bindings; everything that was ambient state in a typical viewer
/// implementation is constructed on [`activate`](Self::activate) and torn
/// down on [`deactivate`](Self::deactivate). All input sources funnel
/// through [`handle_interaction`](Self::handle_interaction) and
/// [`step_crosshair`](Self::step_crosshair), so clamping and re-rendering
/// behave identically for pointer and keyboard.
pub struct MprSession<S> {
    state: SessionState,
    volume: Option<Volume>,
    cache: PlaneCache,
    crosshair: CrosshairState,
    viewports: Option<[ViewportBinding<S>; 3]>,
    loader: VolumeLoader,
    crosshair_step: f32,
    generation: u64,
}

impl<S> Default for MprSession<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MprSession<S> {
    pub fn new() -> Self {
        Self {
            state: SessionState::Inactive,
            volume: None,
            cache: PlaneCache::new(),
            crosshair: CrosshairState::new(),
            viewports: None,
            loader: VolumeLoader::new(),
            crosshair_step: CROSSHAIR_STEP,
            generation: 0,
        }
    }

    /// Replace the volume admission policy.
    pub fn with_loader(mut self, loader: VolumeLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the normalized distance of one keyboard nudge.
    pub fn with_crosshair_step(mut self, step: f32) -> Self {
        self.crosshair_step = step;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn crosshair(&self) -> &CrosshairState {
        &self.crosshair
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn viewport(&self, plane: Plane) -> Option<&ViewportBinding<S>> {
        self.viewports
            .as_ref()
            .and_then(|viewports| viewports.iter().find(|binding| binding.plane == plane))
    }

    /// The slice indices the crosshair projects onto, as
    /// `(axial, sagittal, coronal)`.
    pub fn plane_indices(&self) -> Option<(usize, usize, usize)> {
        let volume = self.volume.as_ref()?;
        let (x, y, z) = self.crosshair.position();
        Some((
            slice_index(z, volume.depth()),
            slice_index(x, volume.width()),
            slice_index(y, volume.height()),
        ))
    }
}

impl<S: RenderSurface> MprSession<S> {
    /// Load a series and bring the session to `Active`.
    ///
    /// Awaits the ingestion stream (reporting progress per slice), builds
    /// and validates the volume, binds the three surfaces, clears the plane
    /// cache, centers the crosshair and performs the initial render. Any
    /// failure rolls the session fully back to `Inactive` — no partial
    /// volume, no stale bindings — so a retry starts clean.
    ///
    /// A session re-activated while a previous load is still in flight wins
    /// over it: the stale load detects the newer generation and reports
    /// [`SessionError::Superseded`] without committing anything.
    pub async fn activate<St, F>(
        &mut self,
        slices: St,
        surfaces: PlaneSurfaces<S>,
        progress: F,
    ) -> Result<(), SessionError>
    where
        St: Stream<Item = SliceBuffer>,
        F: FnMut(usize, Option<usize>),
    {
        self.deactivate();
        self.generation += 1;
        let generation = self.generation;
        self.state = SessionState::Loading;
        let started = Instant::now();

        let loaded = self.loader.load_from_stream(slices, progress).await;
        if self.generation != generation {
            return Err(SessionError::Superseded);
        }
        let volume = match loaded {
            Ok(volume) => volume,
            Err(error) => {
                self.state = SessionState::Inactive;
                return Err(error.into());
            }
        };

        let mut viewports = [
            ViewportBinding::new(Plane::Axial, surfaces.axial),
            ViewportBinding::new(Plane::Sagittal, surfaces.sagittal),
            ViewportBinding::new(Plane::Coronal, surfaces.coronal),
        ];
        for bound in 0..viewports.len() {
            if let Err(source) = viewports[bound].surface.enable() {
                let plane = viewports[bound].plane;
                for binding in &mut viewports[..bound] {
                    let _ = binding.surface.disable();
                }
                self.state = SessionState::Inactive;
                return Err(SessionError::SurfaceBindingFailed { plane, source });
            }
        }

        // The one place the cache may be cleared for a new volume.
        self.cache.clear();
        self.volume = Some(volume);
        self.viewports = Some(viewports);
        self.crosshair = CrosshairState::new();
        self.state = SessionState::Active;

        if let Err(error) = self.render() {
            self.deactivate();
            return Err(error);
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session active"
        );
        Ok(())
    }

    /// Render all three planes at the current crosshair position.
    ///
    /// Each plane renders independently: the axial slice straight from the
    /// volume, sagittal and coronal through the plane cache. Failures are
    /// collected per plane and reported together so one bad surface cannot
    /// blank the other two views.
    pub fn render(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }
        let volume = self.volume.as_ref().ok_or(SessionError::NotActive)?;
        let viewports = self.viewports.as_mut().ok_or(SessionError::NotActive)?;

        let (x, y, z) = self.crosshair.position();
        let failures: Vec<(Plane, SessionError)> = viewports
            .iter_mut()
            .filter_map(|binding| {
                let index = match binding.plane {
                    Plane::Axial => slice_index(z, volume.depth()),
                    Plane::Sagittal => slice_index(x, volume.width()),
                    Plane::Coronal => slice_index(y, volume.height()),
                };
                let overlay = self.crosshair.overlay(binding.plane);
                Self::render_plane(volume, &mut self.cache, binding, index, overlay)
                    .err()
                    .map(|error| {
                        warn!(plane = ?binding.plane, %error, "plane render failed");
                        (binding.plane, error)
                    })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RenderFailures { failures }.into())
        }
    }

    fn render_plane(
        volume: &Volume,
        cache: &mut PlaneCache,
        binding: &mut ViewportBinding<S>,
        index: usize,
        overlay: (f32, f32),
    ) -> Result<(), SessionError> {
        match binding.plane {
            Plane::Axial => {
                let slice = volume
                    .axial_slice(index)
                    .ok_or(SessionError::NotActive)?;
                if slice.view().is_none() {
                    return Err(ReformatError::CorruptSlice { slice: index }.into());
                }
                binding
                    .surface
                    .display(slice)
                    .map_err(|source| SessionError::SurfaceBindingFailed {
                        plane: binding.plane,
                        source,
                    })?;
            }
            Plane::Sagittal | Plane::Coronal => {
                let axis = if binding.plane == Plane::Sagittal {
                    ReformatAxis::Sagittal
                } else {
                    ReformatAxis::Coronal
                };
                let plane = cache.get_or_compute(PlaneKey::new(axis, index), || {
                    ReformattingEngine::reformat(volume, axis, index)
                })?;
                binding
                    .surface
                    .display(&*plane)
                    .map_err(|source| SessionError::SurfaceBindingFailed {
                        plane: binding.plane,
                        source,
                    })?;
            }
        }

        binding
            .surface
            .draw_crosshair(overlay.0, overlay.1)
            .map_err(|source| SessionError::SurfaceBindingFailed {
                plane: binding.plane,
                source,
            })?;
        binding.current_index = Some(index);
        Ok(())
    }

    /// React to a click at normalized `(click_x, click_y)` on `plane`.
    ///
    /// Idempotent: repeating the same click leaves the crosshair, the cache
    /// and all three displays unchanged.
    pub fn handle_interaction(
        &mut self,
        plane: Plane,
        click_x: f32,
        click_y: f32,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }
        self.crosshair.update_from_click(plane, click_x, click_y);
        self.render()
    }

    /// Nudge the crosshair along one axis by `signed_steps` keyboard steps.
    ///
    /// Shares the click path's clamping and re-render, so a nudge behaves
    /// exactly like a click at the resulting position.
    pub fn step_crosshair(&mut self, axis: Axis, signed_steps: i32) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }
        self.crosshair
            .step(axis, signed_steps as f32 * self.crosshair_step);
        self.render()
    }

    /// Copy `from`'s window-level to the other two surfaces, then re-render
    /// so all three planes display with the shared window.
    ///
    /// Readback-based so host-side window controls keep working.
    pub fn sync_windowing(&mut self, from: Plane) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }
        let viewports = self.viewports.as_mut().ok_or(SessionError::NotActive)?;

        let (center, width) = viewports
            .iter()
            .find(|binding| binding.plane == from)
            .ok_or(SessionError::NotActive)?
            .surface
            .get_windowing()
            .map_err(|source| SessionError::SurfaceBindingFailed {
                plane: from,
                source,
            })?;

        for binding in viewports.iter_mut().filter(|binding| binding.plane != from) {
            binding
                .surface
                .set_windowing(center, width)
                .map_err(|source| SessionError::SurfaceBindingFailed {
                    plane: binding.plane,
                    source,
                })?;
        }
        self.render()
    }

    /// Tear the session down to `Inactive`.
    ///
    /// Safe to call from any state; calling it twice is a no-op the second
    /// time. Surface disable failures are logged, not raised — teardown
    /// always completes.
    pub fn deactivate(&mut self) {
        if let Some(mut viewports) = self.viewports.take() {
            for binding in &mut viewports {
                if let Err(error) = binding.surface.disable() {
                    warn!(plane = ?binding.plane, %error, "failed to disable surface");
                }
            }
        }
        self.cache.clear();
        self.volume = None;
        if self.state != SessionState::Inactive {
            debug!("session deactivated");
        }
        self.state = SessionState::Inactive;
    }
}
