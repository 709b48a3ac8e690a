use std::collections::HashSet;

use itertools::Itertools;

use crate::acceptance::TrackSelection;
use crate::config::TrackPairsConfig;
use crate::error::QaError;
use crate::event::{ClusterKey, Event, Track};
use crate::four_momentum::{delta_phi, delta_r};
use crate::hist::{Axis, Hist1D, Hist2D};
use crate::info::TrackInfo;
use crate::leaves;
use crate::plugin::{PluginBase, PluginConfig, QaPlugin};
use crate::store::OutputStore;
use crate::tuple::{interleaved_leaf_names, interleaved_leaf_values, Leaves, Tuple};

leaves! {
    /// One side of a track pair.
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct PairedTrack {
        pub id: u32 => "trkid",
        pub pt: f64 => "pt",
        pub eta: f64 => "eta",
        pub phi: f64 => "phi",
        pub ene: f64 => "ene",
        pub dca_xy: f64 => "dcaxy",
        pub dca_z: f64 => "dcaz",
        pub vtx_x: f64 => "vtxx",
        pub vtx_y: f64 => "vtxy",
        pub vtx_z: f64 => "vtxz",
        pub quality: f64 => "quality",
        pub delta_pt: f64 => "deltapt",
        pub n_mvtx_layers: u32 => "nmvtxlayers",
        pub n_intt_layers: u32 => "ninttlayers",
        pub n_tpc_layers: u32 => "ntpclayers",
        pub n_mvtx_clusts: u32 => "nmvtxclusts",
        pub n_intt_clusts: u32 => "ninttclusts",
        pub n_tpc_clusts: u32 => "ntpcclusts",
        pub n_clust_key: u32 => "nclustkey",
    }
}

impl PairedTrack {
    pub fn new(track: &Track, info: &TrackInfo) -> Self {
        Self {
            id: info.id,
            pt: info.pt,
            eta: info.eta,
            phi: info.phi,
            ene: info.ene,
            dca_xy: info.dca_xy,
            dca_z: info.dca_z,
            vtx_x: info.vtx_x,
            vtx_y: info.vtx_y,
            vtx_z: info.vtx_z,
            quality: info.quality,
            delta_pt: info.pt_err,
            n_mvtx_layers: info.n_mvtx_layer,
            n_intt_layers: info.n_intt_layer,
            n_tpc_layers: info.n_tpc_layer,
            n_mvtx_clusts: info.n_mvtx_clust,
            n_intt_clusts: info.n_intt_clust,
            n_tpc_clusts: info.n_tpc_clust,
            n_clust_key: track.cluster_keys.len() as u32,
        }
    }
}

/// One ordered pair of accepted tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackPair {
    pub a: PairedTrack,
    pub b: PairedTrack,
    /// Cluster keys of `a` also found on `b`.
    pub n_same_clust_key: u32,
    pub delta_r: f64,
    pub delta_eta: f64,
    pub delta_phi: f64,
    /// $`p_T^b / p_T^a`$
    pub pt_frac: f64,
}

impl Leaves for TrackPair {
    fn leaf_names() -> Vec<String> {
        let mut names = interleaved_leaf_names::<PairedTrack>();
        names.extend(
            ["nsameclustkey", "deltartrack", "deltaeta", "deltaphi", "ptfrac"]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }
    fn leaf_values(&self) -> Vec<f64> {
        let mut values = interleaved_leaf_values(&self.a, &self.b);
        values.extend([
            self.n_same_clust_key as f64,
            self.delta_r,
            self.delta_eta,
            self.delta_phi,
            self.pt_frac,
        ]);
        values
    }
}

struct Candidate<'a> {
    track: &'a Track,
    side: PairedTrack,
    keys: HashSet<ClusterKey>,
}

pub fn make_track_pairs(event: &Event, selection: &TrackSelection) -> Vec<TrackPair> {
    //! Every ordered pair `(a, b)` of distinct tracks in `event` passing `selection`.
    //!
    //! Both `(a, b)` and `(b, a)` are returned; pairs of a track with itself never are.
    let candidates: Vec<Candidate> = event
        .tracks
        .iter()
        .filter_map(|track| {
            let info = TrackInfo::new(track, event);
            selection
                .is_good_track(track, &info, event)
                .then(|| Candidate {
                    track,
                    side: PairedTrack::new(track, &info),
                    keys: track.cluster_keys.iter().copied().collect(),
                })
        })
        .collect();
    candidates
        .iter()
        .cartesian_product(candidates.iter())
        .filter(|(a, b)| a.track.id != b.track.id)
        .map(|(a, b)| {
            let delta_eta = a.side.eta - b.side.eta;
            let delta_phi = delta_phi(a.side.phi, b.side.phi);
            TrackPair {
                a: a.side,
                b: b.side,
                n_same_clust_key: a.track.cluster_keys.iter().filter(|k| b.keys.contains(k)).count()
                    as u32,
                delta_r: delta_r(delta_eta, delta_phi),
                delta_eta,
                delta_phi,
                pt_frac: b.side.pt / a.side.pt,
            }
        })
        .collect()
}

struct Output {
    tuple: Tuple,
    h_delta_r: Hist1D,
    h_n_same_vs_delta_r: Hist2D,
    h_pt_frac_vs_delta_r: Hist2D,
}

/// Compares every ordered pair of accepted tracks, looking for split or duplicated tracks.
pub struct TrackPairs {
    base: PluginBase,
    config: TrackPairsConfig,
    output: Option<Output>,
}

impl TrackPairs {
    pub fn new(name: &str, config: TrackPairsConfig) -> Self {
        Self {
            base: PluginBase::new(name),
            config,
            output: None,
        }
    }
    pub fn config(&self) -> &TrackPairsConfig {
        &self.config
    }
    pub fn tuple(&self) -> Option<&Tuple> {
        self.output.as_ref().map(|output| &output.tuple)
    }
}

impl PluginConfig for TrackPairsConfig {
    type Plugin = TrackPairs;
    fn build(self, name: &str) -> TrackPairs {
        TrackPairs::new(name, self)
    }
}

impl QaPlugin for TrackPairs {
    fn base(&self) -> &PluginBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }
    fn init(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.init_output(store)?;
        self.base.trace("initializing output tuple");
        let dr = Axis::new(500, 0.0, 5.0);
        self.output = Some(Output {
            tuple: Tuple::for_row::<TrackPair>("ntTrackPairs", "Pairs of tracks"),
            h_delta_r: Hist1D::new("hDeltaR", ";#Deltar;counts", dr),
            h_n_same_vs_delta_r: Hist2D::new(
                "hNSameClustVsDeltaR",
                ";#Deltar;N_{same clust};counts",
                dr,
                Axis::new(100, 0.0, 100.0),
            ),
            h_pt_frac_vs_delta_r: Hist2D::new(
                "hPtFracVsDeltaR",
                ";#Deltar;p_{T}^{b}/p_{T}^{a};counts",
                dr,
                Axis::new(500, 0.0, 5.0),
            ),
        });
        Ok(())
    }
    fn process(&mut self, event: &Event) -> Result<(), QaError> {
        self.base.begin_event()?;
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| self.base.lifecycle_error("process an event"))?;
        for pair in make_track_pairs(event, &self.config.selection) {
            output.tuple.fill_row(&pair)?;
            output.h_delta_r.fill(pair.delta_r);
            output
                .h_n_same_vs_delta_r
                .fill(pair.delta_r, pair.n_same_clust_key as f64);
            output.h_pt_frac_vs_delta_r.fill(pair.delta_r, pair.pt_frac);
        }
        Ok(())
    }
    fn finalize(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.trace("saving output");
        let output = self
            .output
            .take()
            .ok_or_else(|| self.base.lifecycle_error("finalize"))?;
        self.base.close_output(
            store,
            vec![
                output.tuple.into(),
                output.h_delta_r.into(),
                output.h_n_same_vs_delta_r.into(),
                output.h_pt_frac_vs_delta_r.into(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_leaves_interleave_sides() {
        let names = TrackPair::leaf_names();
        assert_eq!(names[..4], ["trkid_a", "trkid_b", "pt_a", "pt_b"]);
        assert_eq!(names[36..38], ["nclustkey_a", "nclustkey_b"]);
        assert_eq!(names[38], "nsameclustkey");
        assert_eq!(names[39], "deltartrack");
        assert_eq!(names.len(), TrackPair::default().leaf_values().len());
    }
}
