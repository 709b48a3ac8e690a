use itertools::Itertools;

use crate::config::CstPairsConfig;
use crate::error::QaError;
use crate::event::{Constituent, Event, Jet};
use crate::four_momentum::{delta_phi, delta_r};
use crate::hist::{Axis, Hist1D, Hist2D};
use crate::leaves;
use crate::plugin::{PluginBase, PluginConfig, QaPlugin};
use crate::store::OutputStore;
use crate::tuple::{interleaved_leaf_names, interleaved_leaf_values, Leaves, Tuple};

leaves! {
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct PairedCst {
        pub id: i32 => "cstid",
        pub pt: f64 => "pt",
        pub eta: f64 => "eta",
        pub phi: f64 => "phi",
        pub z: f64 => "z",
        pub dr: f64 => "dr",
    }
}

impl From<&Constituent> for PairedCst {
    fn from(cst: &Constituent) -> Self {
        Self {
            id: cst.id,
            pt: cst.pt,
            eta: cst.eta,
            phi: cst.phi,
            z: cst.z,
            dr: cst.dr,
        }
    }
}

/// One ordered pair of accepted constituents of the same jet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CstPair {
    pub jet_id: u64,
    pub a: PairedCst,
    pub b: PairedCst,
    pub delta_eta: f64,
    pub delta_phi: f64,
    pub delta_r: f64,
    /// $`p_T^b / p_T^a`$
    pub pt_frac: f64,
    /// Energy-energy correlator weight $`z_a z_b`$.
    pub weight: f64,
}

impl Leaves for CstPair {
    fn leaf_names() -> Vec<String> {
        let mut names = vec!["jetid".to_string()];
        names.extend(interleaved_leaf_names::<PairedCst>());
        names.extend(
            ["deltaeta", "deltaphi", "deltarcst", "ptfrac", "weight"]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }
    fn leaf_values(&self) -> Vec<f64> {
        let mut values = vec![self.jet_id as f64];
        values.extend(interleaved_leaf_values(&self.a, &self.b));
        values.extend([
            self.delta_eta,
            self.delta_phi,
            self.delta_r,
            self.pt_frac,
            self.weight,
        ]);
        values
    }
}

pub fn make_cst_pairs(jet: &Jet, config: &CstPairsConfig) -> Vec<CstPair> {
    //! Every ordered pair of distinct accepted constituents of `jet`, or nothing if the jet
    //! itself fails acceptance.
    if !config.jet_accept.accepts(jet.pt, jet.eta) {
        return Vec::new();
    }
    let accepted: Vec<&Constituent> = jet
        .constituents
        .iter()
        .filter(|cst| config.cst_accept.accepts(cst.pt, cst.eta))
        .collect();
    accepted
        .iter()
        .cartesian_product(accepted.iter())
        .filter(|(a, b)| a.id != b.id)
        .map(|(a, b)| {
            let delta_eta = a.eta - b.eta;
            let delta_phi = delta_phi(a.phi, b.phi);
            CstPair {
                jet_id: jet.id,
                a: PairedCst::from(*a),
                b: PairedCst::from(*b),
                delta_eta,
                delta_phi,
                delta_r: delta_r(delta_eta, delta_phi),
                pt_frac: b.pt / a.pt,
                weight: a.z * b.z,
            }
        })
        .collect()
}

struct Output {
    tuple: Tuple,
    h_delta_r: Hist1D,
    h_weight_vs_delta_r: Hist2D,
}

/// Compares every ordered pair of accepted constituents within each accepted jet.
pub struct CstPairs {
    base: PluginBase,
    config: CstPairsConfig,
    output: Option<Output>,
}

impl CstPairs {
    pub fn new(name: &str, config: CstPairsConfig) -> Self {
        Self {
            base: PluginBase::new(name),
            config,
            output: None,
        }
    }
    pub fn tuple(&self) -> Option<&Tuple> {
        self.output.as_ref().map(|output| &output.tuple)
    }
}

impl PluginConfig for CstPairsConfig {
    type Plugin = CstPairs;
    fn build(self, name: &str) -> CstPairs {
        CstPairs::new(name, self)
    }
}

impl QaPlugin for CstPairs {
    fn base(&self) -> &PluginBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }
    fn init(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.init_output(store)?;
        let dr = Axis::new(500, 0.0, 5.0);
        self.output = Some(Output {
            tuple: Tuple::for_row::<CstPair>("ntCstPairs", "Pairs of constituents"),
            h_delta_r: Hist1D::new("hDeltaR", ";#Deltar;counts", dr),
            h_weight_vs_delta_r: Hist2D::new(
                "hWeightVsDeltaR",
                ";#Deltar;z_{a}z_{b};counts",
                dr,
                Axis::new(100, 0.0, 1.0),
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
        for jet in &event.jets {
            for pair in make_cst_pairs(jet, &self.config) {
                output.tuple.fill_row(&pair)?;
                output.h_delta_r.fill(pair.delta_r);
                output.h_weight_vs_delta_r.fill(pair.delta_r, pair.weight);
            }
        }
        Ok(())
    }
    fn finalize(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        let output = self
            .output
            .take()
            .ok_or_else(|| self.base.lifecycle_error("finalize"))?;
        self.base.close_output(
            store,
            vec![
                output.tuple.into(),
                output.h_delta_r.into(),
                output.h_weight_vs_delta_r.into(),
            ],
        )
    }
}
