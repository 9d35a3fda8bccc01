/// The three standard anatomical viewing planes.
///
/// Axial is the native acquisition plane; Sagittal and Coronal are
/// reconstructed from the axial stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Axial,
    Sagittal,
    Coronal,
}

/// The two planes that have to be reconstructed from an axial stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReformatAxis {
    Sagittal,
    Coronal,
}

impl From<ReformatAxis> for Plane {
    fn from(axis: ReformatAxis) -> Self {
        match axis {
            ReformatAxis::Sagittal => Plane::Sagittal,
            ReformatAxis::Coronal => Plane::Coronal,
        }
    }
}

/// Volume axes addressed by crosshair stepping.
///
/// `X` runs left-right (width), `Y` anterior-posterior (height),
/// `Z` superior-inferior (depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Lifecycle states of an [`MprSession`](crate::session::MprSession).
///
/// Load and render failures are reported through the returned `Result` and
/// roll the session back to `Inactive`; there is no resting error state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Inactive,
    Loading,
    Active,
}
