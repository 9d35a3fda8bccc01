//! # MPR-volume library
//!
//! This crate implements a multi-planar reconstruction (MPR) engine for
//! volumetric medical image series.
//!
//! Given an ordered stack of decoded cross-sectional images acquired along
//! one anatomical axis, the engine validates them into a [`Volume`],
//! synthesizes the two orthogonal views on demand and keeps the three views
//! consistent around one shared crosshair. Reconstruction uses
//! nearest-slice lookup with the conventional radiological orientation:
//!  - Axial (the native acquisition plane, served as-is)
//!  - Sagittal (reconstructed, superior end up)
//!  - Coronal (reconstructed, superior end up, anterior side up)
//!
//! Reconstructed planes satisfy the same display contract as native slices
//! via [`PlaneSource`], are memoized per `(axis, index)` for the lifetime of
//! the loaded volume, and are recomputed only when a new series replaces it.
//! Decoding (DICOM or otherwise) and the actual drawing targets stay outside
//! the engine: ingestion hands in [`SliceBuffer`] records through an async
//! stream, and hosts implement [`RenderSurface`] per viewport. Where the
//! environment supports it the reslice inner loop is parallelized using
//! rayon.
//!
//! # Examples
//!
//! ## Activating a three-plane session
//!
//! Feed an ordered series into a session bound to three software surfaces,
//! then move the crosshair from a click on the axial view.
//!
//! ```no_run
//! # use mpr_volume::{MprSession, Plane, PlaneSurfaces, SliceBuffer, SoftwareSurface};
//! # async fn run(slices: Vec<SliceBuffer>) {
//! let mut session = MprSession::new();
//! let surfaces = PlaneSurfaces::new(
//!     SoftwareSurface::new(),
//!     SoftwareSurface::new(),
//!     SoftwareSurface::new(),
//! );
//! session
//!     .activate(futures::stream::iter(slices), surfaces, |loaded, total| {
//!         println!("loading slice {loaded}/{}", total.unwrap_or(0));
//!     })
//!     .await
//!     .expect("should have activated the session");
//! session
//!     .handle_interaction(Plane::Axial, 0.25, 0.75)
//!     .expect("should have re-rendered all three planes");
//! # }
//! ```

pub mod crosshair;
pub mod enums;
pub mod plane_cache;
pub mod reformat;
pub mod session;
pub mod slice;
pub mod surface;
pub mod volume;
pub mod volume_loader;

pub use crosshair::{CROSSHAIR_STEP, CrosshairState};
pub use enums::{Axis, Plane, ReformatAxis, SessionState};
pub use plane_cache::{PlaneCache, PlaneKey};
pub use reformat::{ReformatError, ReformattedPlane, ReformattingEngine};
pub use session::{MprSession, PlaneSurfaces, RenderFailures, SessionError, ViewportBinding};
pub use slice::SliceBuffer;
pub use surface::{PlaneSource, RenderSurface, SoftwareSurface, SurfaceError};
pub use volume::{Spacing, Volume};
pub use volume_loader::{
    DEFAULT_SLICE_SPACING, MIN_VOLUME_DEPTH, VolumeLoader, VolumeLoaderError,
};
