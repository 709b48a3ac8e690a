use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::event::{Calorimeter, CaloCluster, Detector, Event, GenParticle, Track, Vertex};
use crate::four_momentum::pseudorapidity;
use crate::leaves;
use crate::tuple::Leaves;

/// PYTHIA status code of outgoing hard-process partons.
pub const STATUS_HARD_PARTON: i32 = 23;
/// Status code of stable final-state particles.
pub const STATUS_FINAL_STATE: i32 = 1;

leaves! {
    /// Kinematic and quality summary of one reconstructed track.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct TrackInfo {
        pub id: u32 => "id",
        pub n_mvtx_layer: u32 => "nmvtxlayer",
        pub n_intt_layer: u32 => "ninttlayer",
        pub n_tpc_layer: u32 => "ntpclayer",
        pub n_mvtx_clust: u32 => "nmvtxclust",
        pub n_intt_clust: u32 => "ninttclust",
        pub n_tpc_clust: u32 => "ntpcclust",
        pub eta: f64 => "eta",
        pub phi: f64 => "phi",
        pub px: f64 => "px",
        pub py: f64 => "py",
        pub pz: f64 => "pz",
        pub pt: f64 => "pt",
        pub ene: f64 => "ene",
        pub dca_xy: f64 => "dcaxy",
        pub dca_z: f64 => "dcaz",
        pub pt_err: f64 => "pterr",
        pub quality: f64 => "quality",
        pub vtx_x: f64 => "vtxx",
        pub vtx_y: f64 => "vtxy",
        pub vtx_z: f64 => "vtxz",
    }
}

impl TrackInfo {
    pub fn new(track: &Track, event: &Event) -> Self {
        //! Builds the record for `track`, resolving its vertex in `event`.
        //!
        //! Impact parameters are taken from a straight-line extrapolation of the
        //! reference point along the momentum: `dca_xy` is the signed transverse
        //! distance to the vertex and `dca_z` the longitudinal offset at that point of
        //! closest transverse approach. A track whose vertex is missing is measured
        //! against the origin.
        let vertex = event.vertex(track.vertex_id).copied().unwrap_or(Vertex {
            id: track.vertex_id,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        });
        let p4 = track.four_momentum();
        let pt = p4.pt();
        let (dx, dy, dz) = (track.x - vertex.x, track.y - vertex.y, track.z - vertex.z);
        let (dca_xy, dca_z) = if pt > 0.0 {
            let along = (dx * track.px + dy * track.py) / (pt * pt);
            ((dx * track.py - dy * track.px) / pt, dz - along * track.pz)
        } else {
            (dx.hypot(dy), dz)
        };
        let cov = &track.momentum_cov;
        let pt_err = if pt > 0.0 {
            (track.px * track.px * cov[(0, 0)]
                + track.py * track.py * cov[(1, 1)]
                + 2.0 * track.px * track.py * cov[(0, 1)])
                .max(0.0)
                .sqrt()
                / pt
        } else {
            0.0
        };
        let quality = if track.ndf > 0.0 {
            track.chisq / track.ndf
        } else {
            f64::INFINITY
        };
        let count_layers = |detector: Detector| {
            track
                .cluster_keys
                .iter()
                .filter(|key| key.detector() == Some(detector))
                .map(|key| key.layer())
                .unique()
                .count() as u32
        };
        let count_clusters = |detector: Detector| {
            track
                .cluster_keys
                .iter()
                .filter(|key| key.detector() == Some(detector))
                .count() as u32
        };
        Self {
            id: track.id,
            n_mvtx_layer: count_layers(Detector::Mvtx),
            n_intt_layer: count_layers(Detector::Intt),
            n_tpc_layer: count_layers(Detector::Tpc),
            n_mvtx_clust: count_clusters(Detector::Mvtx),
            n_intt_clust: count_clusters(Detector::Intt),
            n_tpc_clust: count_clusters(Detector::Tpc),
            eta: p4.eta(),
            phi: p4.phi(),
            px: track.px,
            py: track.py,
            pz: track.pz,
            pt,
            ene: p4.e,
            dca_xy,
            dca_z,
            pt_err,
            quality,
            vtx_x: vertex.x,
            vtx_y: vertex.y,
            vtx_z: vertex.z,
        }
    }
}

leaves! {
    /// Summary of one calorimeter cluster, with angles measured from the primary vertex.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct ClusterInfo {
        pub system: i32 => "system",
        pub id: u32 => "id",
        pub n_twr: u32 => "ntwr",
        pub ene: f64 => "ene",
        pub rho: f64 => "rho",
        pub eta: f64 => "eta",
        pub phi: f64 => "phi",
        pub rx: f64 => "rx",
        pub ry: f64 => "ry",
        pub rz: f64 => "rz",
    }
}

impl ClusterInfo {
    pub fn new(cluster: &CaloCluster, calo: Calorimeter, vertex: Option<&Vertex>) -> Self {
        let (vx, vy, vz) = vertex.map_or((0.0, 0.0, 0.0), |v| (v.x, v.y, v.z));
        let (dx, dy, dz) = (cluster.x - vx, cluster.y - vy, cluster.z - vz);
        Self {
            system: calo.id(),
            id: cluster.id,
            n_twr: cluster.n_towers,
            ene: cluster.energy,
            rho: cluster.x.hypot(cluster.y),
            eta: pseudorapidity(dx, dy, dz),
            phi: dy.atan2(dx),
            rx: cluster.x,
            ry: cluster.y,
            rz: cluster.z,
        }
    }
}

leaves! {
    /// Event-level reconstructed multiplicity and energy sums.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct RecoInfo {
        pub n_trks: u32 => "ntrks",
        pub p_sum_trks: f64 => "psumtrks",
        pub e_sum_emcal: f64 => "esumemcal",
        pub e_sum_ihcal: f64 => "esumihcal",
        pub e_sum_ohcal: f64 => "esumohcal",
        pub vx: f64 => "vx",
        pub vy: f64 => "vy",
        pub vz: f64 => "vz",
    }
}

impl RecoInfo {
    pub fn new(event: &Event) -> Self {
        let e_sum = |calo: Calorimeter| event.clusters(calo).iter().map(|c| c.energy).sum::<f64>();
        let (vx, vy, vz) = event
            .primary_vertex()
            .map_or((0.0, 0.0, 0.0), |v| (v.x, v.y, v.z));
        Self {
            n_trks: event.tracks.len() as u32,
            p_sum_trks: event.tracks.iter().map(|t| t.four_momentum().p()).sum(),
            e_sum_emcal: e_sum(Calorimeter::EmCal),
            e_sum_ihcal: e_sum(Calorimeter::IHCal),
            e_sum_ohcal: e_sum(Calorimeter::OHCal),
            vx,
            vy,
            vz,
        }
    }
}

leaves! {
    /// Generator-level record of one hard-process parton.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct PartonInfo {
        pub pid: i32 => "pid",
        pub status: i32 => "status",
        pub barcode: i32 => "barcode",
        pub embed_id: i32 => "embedid",
        pub charge: f64 => "charge",
        pub mass: f64 => "mass",
        pub eta: f64 => "eta",
        pub phi: f64 => "phi",
        pub ene: f64 => "ene",
        pub px: f64 => "px",
        pub py: f64 => "py",
        pub pz: f64 => "pz",
        pub pt: f64 => "pt",
        pub vx: f64 => "vx",
        pub vy: f64 => "vy",
        pub vz: f64 => "vz",
    }
}

impl From<&GenParticle> for PartonInfo {
    fn from(particle: &GenParticle) -> Self {
        let p4 = particle.four_momentum();
        Self {
            pid: particle.pid,
            status: particle.status,
            barcode: particle.barcode,
            embed_id: particle.embed_id,
            charge: particle.charge,
            mass: particle.mass,
            eta: p4.eta(),
            phi: p4.phi(),
            ene: particle.e,
            px: particle.px,
            py: particle.py,
            pz: particle.pz,
            pt: p4.pt(),
            vx: particle.vx,
            vy: particle.vy,
            vz: particle.vz,
        }
    }
}

/// Generator-level multiplicities, energy sums and the two leading hard-process partons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenInfo {
    pub n_chrg_par: u32,
    pub n_neu_par: u32,
    pub is_embed: bool,
    pub e_sum_chrg: f64,
    pub e_sum_neu: f64,
    pub partons: (PartonInfo, PartonInfo),
}

impl GenInfo {
    pub fn new(event: &Event, is_embed: bool, embed_ids: &[i32]) -> Self {
        //! Summarizes the generator record of `event`.
        //!
        //! When `is_embed` is set only particles from the sub-events listed in `embed_ids`
        //! are considered; otherwise every particle is.
        let selected = event
            .particles
            .iter()
            .filter(|p| !is_embed || embed_ids.contains(&p.embed_id))
            .collect::<Vec<_>>();
        let mut hard = selected
            .iter()
            .filter(|p| p.status == STATUS_HARD_PARTON)
            .map(|p| PartonInfo::from(*p));
        let partons = (
            hard.next().unwrap_or_default(),
            hard.next().unwrap_or_default(),
        );
        let (charged, neutral): (Vec<&GenParticle>, Vec<&GenParticle>) = selected
            .iter()
            .copied()
            .filter(|p| p.status == STATUS_FINAL_STATE)
            .partition(|p| p.charge != 0.0);
        Self {
            n_chrg_par: charged.len() as u32,
            n_neu_par: neutral.len() as u32,
            is_embed,
            e_sum_chrg: charged.iter().map(|p| p.e).sum(),
            e_sum_neu: neutral.iter().map(|p| p.e).sum(),
            partons,
        }
    }
}

impl Leaves for GenInfo {
    fn leaf_names() -> Vec<String> {
        ["nchrgpar", "nneupar", "isembed", "esumchrg", "esumneu"]
            .iter()
            .map(|s| s.to_string())
            .chain(PartonInfo::prefixed_leaf_names("partona_"))
            .chain(PartonInfo::prefixed_leaf_names("partonb_"))
            .collect()
    }
    fn leaf_values(&self) -> Vec<f64> {
        let mut values = vec![
            self.n_chrg_par as f64,
            self.n_neu_par as f64,
            if self.is_embed { 1.0 } else { 0.0 },
            self.e_sum_chrg,
            self.e_sum_neu,
        ];
        values.extend(self.partons.0.leaf_values());
        values.extend(self.partons.1.leaf_values());
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ClusterKey;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn particle(barcode: i32, status: i32, charge: f64, e: f64, embed_id: i32) -> GenParticle {
        GenParticle {
            barcode,
            pid: 211,
            status,
            embed_id,
            charge,
            mass: 0.0,
            px: e,
            py: 0.0,
            pz: 0.0,
            e,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
        }
    }

    #[test]
    fn track_info_counts_layers_and_clusters() {
        let track = Track {
            id: 3,
            charge: 1,
            px: 1.0,
            py: 0.0,
            pz: 0.0,
            x: 0.0,
            y: 0.02,
            z: 0.5,
            momentum_cov: Matrix3::from_diagonal_element(0.0004),
            chisq: 20.0,
            ndf: 10.0,
            vertex_id: 0,
            silicon_seed: Some(0),
            tpc_seed: Some(0),
            cluster_keys: vec![
                ClusterKey::new(Detector::Mvtx, 0, 0),
                ClusterKey::new(Detector::Mvtx, 0, 1),
                ClusterKey::new(Detector::Mvtx, 1, 0),
                ClusterKey::new(Detector::Tpc, 7, 0),
            ],
        };
        let event = Event {
            vertices: vec![Vertex {
                id: 0,
                x: 0.0,
                y: 0.0,
                z: 0.1,
            }],
            ..Default::default()
        };
        let info = TrackInfo::new(&track, &event);
        assert_eq!(info.n_mvtx_layer, 2);
        assert_eq!(info.n_mvtx_clust, 3);
        assert_eq!(info.n_intt_layer, 0);
        assert_eq!(info.n_tpc_clust, 1);
        assert_relative_eq!(info.dca_xy, -0.02, epsilon = 1e-12);
        assert_relative_eq!(info.dca_z, 0.4, epsilon = 1e-12);
        assert_relative_eq!(info.pt_err, 0.02, epsilon = 1e-12);
        assert_relative_eq!(info.quality, 2.0);
        assert_relative_eq!(info.vtx_z, 0.1);
    }

    #[test]
    fn gen_info_selects_embedded_subevents() {
        let event = Event {
            particles: vec![
                particle(5, STATUS_HARD_PARTON, 0.0, 50.0, 2),
                particle(6, STATUS_HARD_PARTON, 0.0, 40.0, 2),
                particle(7, STATUS_FINAL_STATE, 1.0, 3.0, 2),
                particle(8, STATUS_FINAL_STATE, 0.0, 2.0, 2),
                particle(9, STATUS_FINAL_STATE, -1.0, 9.0, 0),
            ],
            ..Default::default()
        };
        let embedded = GenInfo::new(&event, true, &[2]);
        assert_eq!(embedded.n_chrg_par, 1);
        assert_eq!(embedded.n_neu_par, 1);
        assert_relative_eq!(embedded.e_sum_chrg, 3.0);
        assert_eq!(embedded.partons.0.barcode, 5);
        assert_eq!(embedded.partons.1.barcode, 6);
        let everything = GenInfo::new(&event, false, &[2]);
        assert_eq!(everything.n_chrg_par, 2);
        assert_eq!(GenInfo::leaf_names().len(), embedded.leaf_values().len());
    }
}
