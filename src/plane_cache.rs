use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::enums::ReformatAxis;
use crate::reformat::ReformattedPlane;

/// Cache key for reconstructed planes: one cell per `(axis, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneKey {
    pub axis: ReformatAxis,
    pub index: usize,
}

impl PlaneKey {
    pub fn new(axis: ReformatAxis, index: usize) -> Self {
        Self { axis, index }
    }
}

/// Memoizes reformatted planes for the lifetime of one loaded volume.
///
/// Entries are created lazily and never evicted — the session bounds memory
/// by clearing the whole cache when its volume is replaced. That clear is
/// the sole invalidation rule; a cache outliving its volume would serve
/// planes from the previous study.
#[derive(Default)]
pub struct PlaneCache {
    planes: HashMap<PlaneKey, Arc<ReformattedPlane>>,
}

impl PlaneCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized plane for `key`, or compute, store and return it.
    ///
    /// Failed computations are returned as-is and not cached.
    pub fn get_or_compute<F, E>(
        &mut self,
        key: PlaneKey,
        compute: F,
    ) -> Result<Arc<ReformattedPlane>, E>
    where
        F: FnOnce() -> Result<ReformattedPlane, E>,
    {
        if let Some(plane) = self.planes.get(&key) {
            return Ok(Arc::clone(plane));
        }

        debug!(axis = ?key.axis, index = key.index, "plane cache miss");
        let plane = Arc::new(compute()?);
        self.planes.insert(key, Arc::clone(&plane));
        Ok(plane)
    }

    pub fn contains(&self, key: &PlaneKey) -> bool {
        self.planes.contains_key(key)
    }

    /// Drop every cached plane. Called exactly once per volume replacement.
    pub fn clear(&mut self) {
        if !self.planes.is_empty() {
            debug!(dropped = self.planes.len(), "cleared plane cache");
        }
        self.planes.clear();
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_plane(axis: ReformatAxis, index: usize, fill: u16) -> ReformattedPlane {
        ReformattedPlane {
            axis,
            index,
            width: 2,
            height: 2,
            pixels: vec![fill; 4],
            min_value: 0,
            max_value: 100,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            window_center: 50.0,
            window_width: 100.0,
        }
    }

    #[test]
    fn compute_runs_once_per_key() {
        let mut cache = PlaneCache::new();
        let key = PlaneKey::new(ReformatAxis::Sagittal, 3);
        let mut calls = 0;

        for _ in 0..3 {
            let plane = cache
                .get_or_compute(key, || {
                    calls += 1;
                    Ok::<_, ()>(make_plane(ReformatAxis::Sagittal, 3, 7))
                })
                .unwrap();
            assert_eq!(plane.pixels, vec![7; 4]);
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hits_share_the_same_allocation() {
        let mut cache = PlaneCache::new();
        let key = PlaneKey::new(ReformatAxis::Coronal, 0);

        let first = cache
            .get_or_compute(key, || Ok::<_, ()>(make_plane(ReformatAxis::Coronal, 0, 1)))
            .unwrap();
        let second = cache
            .get_or_compute(key, || Ok::<_, ()>(make_plane(ReformatAxis::Coronal, 0, 2)))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn axes_do_not_collide() {
        let mut cache = PlaneCache::new();
        cache
            .get_or_compute(PlaneKey::new(ReformatAxis::Sagittal, 1), || {
                Ok::<_, ()>(make_plane(ReformatAxis::Sagittal, 1, 1))
            })
            .unwrap();
        cache
            .get_or_compute(PlaneKey::new(ReformatAxis::Coronal, 1), || {
                Ok::<_, ()>(make_plane(ReformatAxis::Coronal, 1, 2))
            })
            .unwrap();

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache = PlaneCache::new();
        let key = PlaneKey::new(ReformatAxis::Sagittal, 0);

        let result: Result<_, &str> = cache.get_or_compute(key, || Err("backing store gone"));
        assert!(result.is_err());
        assert!(cache.is_empty());

        let plane = cache
            .get_or_compute(key, || Ok::<_, ()>(make_plane(ReformatAxis::Sagittal, 0, 9)))
            .unwrap();
        assert_eq!(plane.pixels, vec![9; 4]);
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = PlaneCache::new();
        let key = PlaneKey::new(ReformatAxis::Sagittal, 2);
        cache
            .get_or_compute(key, || Ok::<_, ()>(make_plane(ReformatAxis::Sagittal, 2, 3)))
            .unwrap();

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains(&key));
    }
}
