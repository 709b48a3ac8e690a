use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::four_momentum::{FourMomentum, MASS_PION};

/// Tracking subsystems a cluster key can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Detector {
    Mvtx = 1,
    Intt = 2,
    Tpc = 3,
    Tpot = 4,
}

impl Detector {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Mvtx),
            2 => Some(Self::Intt),
            3 => Some(Self::Tpc),
            4 => Some(Self::Tpot),
            _ => None,
        }
    }
}

/// Packed identifier of a tracker cluster.
///
/// Bits 56..64 hold the detector id, bits 48..56 the layer and the low 32 bits the cluster
/// index within its hit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterKey(pub u64);

impl ClusterKey {
    const DETECTOR_SHIFT: u64 = 56;
    const LAYER_SHIFT: u64 = 48;

    pub fn new(detector: Detector, layer: u8, index: u32) -> Self {
        Self(
            ((detector as u64) << Self::DETECTOR_SHIFT)
                | ((layer as u64) << Self::LAYER_SHIFT)
                | index as u64,
        )
    }
    pub fn detector(&self) -> Option<Detector> {
        Detector::from_id((self.0 >> Self::DETECTOR_SHIFT) as u8)
    }
    pub fn layer(&self) -> u8 {
        ((self.0 >> Self::LAYER_SHIFT) & 0xff) as u8
    }
    pub fn index(&self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u32,
    pub charge: i32,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    /// Point of closest approach reported by the track fit.
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Momentum covariance in $`(p_x, p_y, p_z)`$.
    #[serde(default = "zero_covariance")]
    pub momentum_cov: Matrix3<f64>,
    pub chisq: f64,
    pub ndf: f64,
    pub vertex_id: u32,
    #[serde(default)]
    pub silicon_seed: Option<u32>,
    #[serde(default)]
    pub tpc_seed: Option<u32>,
    #[serde(default)]
    pub cluster_keys: Vec<ClusterKey>,
}

fn zero_covariance() -> Matrix3<f64> {
    Matrix3::zeros()
}

impl Track {
    pub fn four_momentum(&self) -> FourMomentum {
        FourMomentum::from_mass(self.px, self.py, self.pz, MASS_PION)
    }
}

/// Calorimeters whose cluster containers the plugins read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calorimeter {
    EmCal,
    IHCal,
    OHCal,
}

impl Calorimeter {
    pub const ALL: [Calorimeter; 3] = [Self::EmCal, Self::IHCal, Self::OHCal];

    pub fn node_name(&self) -> &'static str {
        match self {
            Self::EmCal => "CLUSTER_CEMC",
            Self::IHCal => "CLUSTER_HCALIN",
            Self::OHCal => "CLUSTER_HCALOUT",
        }
    }
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::EmCal => "emcal",
            Self::IHCal => "ihcal",
            Self::OHCal => "ohcal",
        }
    }
    pub fn id(&self) -> i32 {
        match self {
            Self::EmCal => 0,
            Self::IHCal => 1,
            Self::OHCal => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaloCluster {
    pub id: u32,
    pub energy: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub n_towers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenParticle {
    pub barcode: i32,
    pub pid: i32,
    pub status: i32,
    #[serde(default)]
    pub embed_id: i32,
    pub charge: f64,
    pub mass: f64,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
}

impl GenParticle {
    pub fn four_momentum(&self) -> FourMomentum {
        FourMomentum::new(self.e, self.px, self.py, self.pz)
    }
}

/// A jet constituent of any type, as stored on the correlator jet tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub id: i32,
    #[serde(default)]
    pub pid: i32,
    #[serde(default)]
    pub embed_id: i32,
    /// Momentum fraction of the parent jet.
    pub z: f64,
    /// Angular distance to the jet axis.
    pub dr: f64,
    pub energy: f64,
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jet {
    pub id: u64,
    pub energy: f64,
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub constituents: Vec<Constituent>,
}

/// Everything a plugin may read for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub tracks: Vec<Track>,
    pub emcal_clusters: Vec<CaloCluster>,
    pub ihcal_clusters: Vec<CaloCluster>,
    pub ohcal_clusters: Vec<CaloCluster>,
    pub vertices: Vec<Vertex>,
    pub primary_vertex_id: u32,
    pub particles: Vec<GenParticle>,
    pub jets: Vec<Jet>,
}

impl Event {
    pub fn clusters(&self, calo: Calorimeter) -> &[CaloCluster] {
        match calo {
            Calorimeter::EmCal => &self.emcal_clusters,
            Calorimeter::IHCal => &self.ihcal_clusters,
            Calorimeter::OHCal => &self.ohcal_clusters,
        }
    }
    pub fn vertex(&self, id: u32) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.id == id)
    }
    pub fn primary_vertex(&self) -> Option<&Vertex> {
        self.vertex(self.primary_vertex_id)
    }
}
