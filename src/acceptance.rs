use serde::{Deserialize, Serialize};

use crate::event::{Event, Track};
use crate::fit::WidthCurve;
use crate::info::{ClusterInfo, TrackInfo};

/// Inclusive `[min, max]` window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }
}

fn within<T: PartialOrd + Copy>(range: &Option<Range<T>>, value: T) -> bool {
    range.as_ref().map_or(true, |r| r.contains(value))
}

/// Track acceptance. Fields left as `None` are not checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackAccept {
    pub n_mvtx_layer: Option<Range<u32>>,
    pub n_intt_layer: Option<Range<u32>>,
    pub n_tpc_layer: Option<Range<u32>>,
    pub pt: Option<Range<f64>>,
    pub eta: Option<Range<f64>>,
    pub dca_xy: Option<Range<f64>>,
    pub dca_z: Option<Range<f64>>,
    pub pt_err: Option<Range<f64>>,
    pub quality: Option<Range<f64>>,
}

impl TrackAccept {
    pub fn unbounded() -> Self {
        Self {
            n_mvtx_layer: None,
            n_intt_layer: None,
            n_tpc_layer: None,
            pt: None,
            eta: None,
            dca_xy: None,
            dca_z: None,
            pt_err: None,
            quality: None,
        }
    }
    pub fn accepts(&self, info: &TrackInfo) -> bool {
        within(&self.n_mvtx_layer, info.n_mvtx_layer)
            && within(&self.n_intt_layer, info.n_intt_layer)
            && within(&self.n_tpc_layer, info.n_tpc_layer)
            && within(&self.pt, info.pt)
            && within(&self.eta, info.eta)
            && within(&self.dca_xy, info.dca_xy)
            && within(&self.dca_z, info.dca_z)
            && within(&self.pt_err, info.pt_err)
            && within(&self.quality, info.quality)
    }
}

impl Default for TrackAccept {
    fn default() -> Self {
        Self {
            n_mvtx_layer: Some(Range::new(2, 100)),
            n_intt_layer: Some(Range::new(1, 100)),
            n_tpc_layer: Some(Range::new(24, 100)),
            pt: Some(Range::new(0.2, 100.0)),
            eta: Some(Range::new(-1.1, 1.1)),
            dca_xy: Some(Range::new(-5.0, 5.0)),
            dca_z: Some(Range::new(-5.0, 5.0)),
            pt_err: Some(Range::new(0.0, 0.5)),
            quality: Some(Range::new(0.0, 10.0)),
        }
    }
}

/// Calorimeter-cluster acceptance. Fields left as `None` are not checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterAccept {
    pub ene: Option<Range<f64>>,
    pub eta: Option<Range<f64>>,
}

impl ClusterAccept {
    pub fn accepts(&self, info: &ClusterInfo) -> bool {
        within(&self.ene, info.ene) && within(&self.eta, info.eta)
    }
}

impl Default for ClusterAccept {
    fn default() -> Self {
        Self {
            ene: Some(Range::new(0.1, 100.0)),
            eta: Some(Range::new(-1.1, 1.1)),
        }
    }
}

/// Transverse-momentum and pseudorapidity window for jets and their constituents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicAccept {
    pub pt: Option<Range<f64>>,
    pub eta: Option<Range<f64>>,
}

impl KinematicAccept {
    pub fn accepts(&self, pt: f64, eta: f64) -> bool {
        within(&self.pt, pt) && within(&self.eta, eta)
    }
}

/// Momentum-dependent cut on the impact-parameter significance.
///
/// Tuple pairs are ordered `(xy, z)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigmaDcaCut {
    pub n_sigma: (f64, f64),
    pub pt_fit_max: (f64, f64),
    pub width_xy: WidthCurve,
    pub width_z: WidthCurve,
}

impl SigmaDcaCut {
    pub fn max_dca(&self, pt: f64) -> (f64, f64) {
        //! Largest accepted $`|DCA_{xy}|`$ and $`|DCA_z|`$ at transverse momentum `pt`.
        //!
        //! Momenta above the fit window are evaluated at its upper edge.
        (
            self.n_sigma.0 * self.width_xy.eval(pt.min(self.pt_fit_max.0)),
            self.n_sigma.1 * self.width_z.eval(pt.min(self.pt_fit_max.1)),
        )
    }
    pub fn accepts(&self, info: &TrackInfo) -> bool {
        let (max_xy, max_z) = self.max_dca(info.pt);
        info.dca_xy.abs() <= max_xy && info.dca_z.abs() <= max_z
    }
}

impl Default for SigmaDcaCut {
    fn default() -> Self {
        Self {
            n_sigma: (3.0, 3.0),
            pt_fit_max: (15.0, 15.0),
            width_xy: WidthCurve::new("fFitWidthXY", vec![0.002, -0.005, 0.005], (1.0, 15.0)),
            width_z: WidthCurve::new("fFitWidthZ", vec![0.002, -0.005, 0.005], (1.0, 15.0)),
        }
    }
}

pub fn is_from_primary_vertex(track: &Track, event: &Event) -> bool {
    track.vertex_id == event.primary_vertex_id
}

pub fn is_good_track_seed(track: &Track, require_si_seed: bool) -> bool {
    //! With `require_si_seed` both the silicon and TPC seeds must exist, otherwise either will do.
    if require_si_seed {
        track.silicon_seed.is_some() && track.tpc_seed.is_some()
    } else {
        track.silicon_seed.is_some() || track.tpc_seed.is_some()
    }
}

/// The full track selection shared by the track plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSelection {
    pub do_dca_sig_cut: bool,
    pub require_si_seed: bool,
    pub use_only_prim_vtx: bool,
    pub accept: TrackAccept,
    pub sigma_dca: SigmaDcaCut,
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self {
            do_dca_sig_cut: false,
            require_si_seed: true,
            use_only_prim_vtx: true,
            accept: TrackAccept::default(),
            sigma_dca: SigmaDcaCut::default(),
        }
    }
}

impl TrackSelection {
    pub fn is_good_track(&self, track: &Track, info: &TrackInfo, event: &Event) -> bool {
        let is_in_dca_sigma = !self.do_dca_sig_cut || self.sigma_dca.accepts(info);
        let is_from_prim_vtx = !self.use_only_prim_vtx || is_from_primary_vertex(track, event);
        let is_seed_good = is_good_track_seed(track, self.require_si_seed);
        is_from_prim_vtx && is_in_dca_sigma && is_seed_good && self.accept.accepts(info)
    }
}
