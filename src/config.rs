//! Configuration for the plugins and batch jobs.
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON file only has to name the
//! options it changes. The `Default` impls are the stock analysis options.
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::acceptance::{ClusterAccept, KinematicAccept, Range, TrackSelection};
use crate::error::QaError;
use crate::fit::CurveForm;
use crate::hist::Axis;

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, QaError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackPairsConfig {
    pub selection: TrackSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CstPairsConfig {
    pub jet_accept: KinematicAccept,
    pub cst_accept: KinematicAccept,
}

impl Default for CstPairsConfig {
    fn default() -> Self {
        Self {
            jet_accept: KinematicAccept {
                pt: Some(Range::new(0.1, 100.0)),
                eta: Some(Range::new(-0.7, 0.7)),
            },
            cst_accept: KinematicAccept {
                pt: Some(Range::new(0.1, 100.0)),
                eta: Some(Range::new(-1.1, 1.1)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackQaConfig {
    /// Restrict generator-level sums to the sub-events in `embed_ids`.
    pub is_embed: bool,
    pub embed_ids: Vec<i32>,
    pub selection: TrackSelection,
}

impl Default for TrackQaConfig {
    fn default() -> Self {
        Self {
            is_embed: true,
            embed_ids: vec![2],
            selection: TrackSelection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClustQaConfig {
    pub is_embed: bool,
    pub embed_ids: Vec<i32>,
    pub accept: ClusterAccept,
}

impl Default for ClustQaConfig {
    fn default() -> Self {
        Self {
            is_embed: true,
            embed_ids: vec![2],
            accept: ClusterAccept::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaJetConfig {
    pub input: PathBuf,
    pub tree: String,
    pub output: PathBuf,
    pub out_dir: String,
    pub pt_jet_min: f64,
    pub pt_lam_min: f64,
    pub eta_jet_max: f64,
    pub eta_lam_max: f64,
    /// Lambdas carrying more than this fraction of their jet's momentum are leading.
    pub z_lead_min: f64,
}

impl Default for LambdaJetConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("lambda_jet_tree.root"),
            tree: "LambdaJetTree".to_string(),
            output: PathBuf::from("lambda_jet_qa.root"),
            out_dir: "LambdaJetTreeReader".to_string(),
            pt_jet_min: 10.0,
            pt_lam_min: 0.1,
            eta_jet_max: 0.7,
            eta_lam_max: 1.1,
            z_lead_min: 0.3,
        }
    }
}

/// Track-quality preselection for the sigma-DCA calculator. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityCuts {
    pub n_mvtx_layer_min: f64,
    pub n_intt_layer_min: f64,
    pub n_tpc_layer_min: f64,
    pub quality_max: f64,
    pub eta_max: f64,
    pub pt_min: f64,
}

impl Default for QualityCuts {
    fn default() -> Self {
        Self {
            n_mvtx_layer_min: 2.0,
            n_intt_layer_min: 1.0,
            n_tpc_layer_min: 24.0,
            quality_max: 10.0,
            eta_max: 1.1,
            pt_min: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaDcaConfig {
    pub input: PathBuf,
    pub tuple: String,
    pub output: PathBuf,
    /// Directory for the PNG summaries. Nothing is drawn when unset.
    pub plot_dir: Option<PathBuf>,
    pub n_cut: f64,
    pub dca_axis: Axis,
    pub pt_axis: Axis,
    pub fit_range: (f64, f64),
    pub form: CurveForm,
    pub quality_cuts: Option<QualityCuts>,
    pub min_slice_entries: u64,
    pub pt_plot_range: (f64, f64),
    pub dca_plot_range: (f64, f64),
    pub width_plot_range: (f64, f64),
}

impl Default for SigmaDcaConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("track_qa.root"),
            tuple: "TrackQATuple_ntTrackQA".to_string(),
            output: PathBuf::from("sigma_dca.root"),
            plot_dir: None,
            n_cut: 3.0,
            dca_axis: Axis::new(2000, -5.0, 5.0),
            pt_axis: Axis::new(100, 0.0, 100.0),
            fit_range: (1.0, 15.0),
            form: CurveForm::Quadratic,
            quality_cuts: None,
            min_slice_entries: 0,
            pt_plot_range: (0.0, 25.0),
            dca_plot_range: (-0.5, 0.5),
            width_plot_range: (0.001, 0.05),
        }
    }
}

/// Which plugins a replay job registers, and how.
///
/// A plugin left as `None` is not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub out_file: PathBuf,
    pub debug: bool,
    pub verbosity: u8,
    pub track_pairs: Option<TrackPairsConfig>,
    pub cst_pairs: Option<CstPairsConfig>,
    pub track_qa: Option<TrackQaConfig>,
    pub clust_qa: Option<ClustQaConfig>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            out_file: PathBuf::from("correlator_qa.root"),
            debug: false,
            verbosity: 0,
            track_pairs: Some(TrackPairsConfig::default()),
            cst_pairs: Some(CstPairsConfig::default()),
            track_qa: Some(TrackQaConfig::default()),
            clust_qa: Some(ClustQaConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SigmaDcaConfig =
            serde_json::from_str(r#"{"n_cut": 2.5, "form": "cubic"}"#).unwrap();
        assert_eq!(config.n_cut, 2.5);
        assert_eq!(config.form, CurveForm::Cubic);
        assert_eq!(config.dca_axis, Axis::new(2000, -5.0, 5.0));

        let job: JobConfig = serde_json::from_str(r#"{"cst_pairs": null}"#).unwrap();
        assert!(job.cst_pairs.is_none());
        assert_eq!(job.track_qa.unwrap().embed_ids, vec![2]);
    }

    #[test]
    fn load_json_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_json::<LambdaJetConfig>(&path),
            Err(QaError::ConfigParse(_))
        ));
        assert!(matches!(
            load_json::<LambdaJetConfig>(dir.path().join("missing.json")),
            Err(QaError::Io(_))
        ));
    }
}
