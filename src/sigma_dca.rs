//! Two-pass calculation of the momentum-dependent DCA width.
//!
//! The first pass fills DCA against $`p_T`$ for every accepted track, fits a Gaussian to each
//! $`p_T`$ slice and fits the slice widths with a [`WidthCurve`]. The second pass keeps the
//! tracks whose $`|DCA_{xy}|`$ and $`|DCA_z|`$ both lie within `n_cut` widths of zero.
use tracing::info;

use crate::config::{QualityCuts, SigmaDcaConfig};
use crate::error::QaError;
use crate::fit::{fit_slices_y, fit_width_curve, WidthCurve};
use crate::hist::{Hist1D, Hist2D};
use crate::store::{for_each_entry, EntrySource, Object, OutputStore, RootInput};
use crate::tuple::Tuple;

/// The fields of one track-QA row the calculator looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DcaEntry {
    pub pt: f64,
    pub eta: f64,
    pub dca_xy: f64,
    pub dca_z: f64,
    pub quality: f64,
    pub n_mvtx_layer: f64,
    pub n_intt_layer: f64,
    pub n_tpc_layer: f64,
}

impl QualityCuts {
    pub fn passes(&self, entry: &DcaEntry) -> bool {
        entry.n_mvtx_layer > self.n_mvtx_layer_min
            && entry.n_intt_layer > self.n_intt_layer_min
            && entry.n_tpc_layer > self.n_tpc_layer_min
            && entry.quality < self.quality_max
            && entry.eta.abs() < self.eta_max
            && entry.pt > self.pt_min
    }
}

/// Input leaves in the order of the [`DcaEntry`] fields.
pub const DCA_LEAVES: [&str; 8] = [
    "pt",
    "eta",
    "dcaxy",
    "dcaz",
    "quality",
    "nmvtxlayer",
    "ninttlayer",
    "ntpclayer",
];

/// Single-precision columns of the input tuple, in [`DCA_LEAVES`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct DcaColumns([Vec<f32>; 8]);

impl DcaColumns {
    pub fn read(input: &RootInput) -> Result<Self, QaError> {
        let mut columns: [Vec<f32>; 8] = Default::default();
        for (column, leaf) in columns.iter_mut().zip(DCA_LEAVES) {
            *column = input.column(leaf)?;
        }
        Ok(Self(columns))
    }
    pub fn from_tuple(tuple: &Tuple) -> Result<Self, QaError> {
        let mut columns: [Vec<f32>; 8] = Default::default();
        for (column, leaf) in columns.iter_mut().zip(DCA_LEAVES) {
            *column = tuple.column(leaf).ok_or_else(|| QaError::MissingObject {
                kind: "leaf",
                name: leaf.to_string(),
                path: tuple.name().to_string(),
            })?;
        }
        Ok(Self(columns))
    }
}

impl EntrySource for DcaColumns {
    type Entry = DcaEntry;
    fn n_entries(&self) -> usize {
        self.0[0].len()
    }
    fn entry(&self, index: usize) -> Option<DcaEntry> {
        let mut values = [0.0; 8];
        for (value, column) in values.iter_mut().zip(&self.0) {
            *value = *column.get(index)? as f64;
        }
        let [pt, eta, dca_xy, dca_z, quality, n_mvtx_layer, n_intt_layer, n_tpc_layer] = values;
        Some(DcaEntry {
            pt,
            eta,
            dca_xy,
            dca_z,
            quality,
            n_mvtx_layer,
            n_intt_layer,
            n_tpc_layer,
        })
    }
}

/// The three DCA distributions filled in each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DcaHists {
    pub xy_vs_pt: Hist2D,
    pub z_vs_pt: Hist2D,
    pub xy_vs_z: Hist2D,
}

impl DcaHists {
    fn new(suffix: &str, label: &str, config: &SigmaDcaConfig) -> Self {
        let (pt, dca) = (config.pt_axis, config.dca_axis);
        Self {
            xy_vs_pt: Hist2D::new(
                &format!("hDcaXYvsPt{suffix}"),
                &format!("{label};p_{{T}} [GeV/c];DCA_{{xy}} [cm]"),
                pt,
                dca,
            ),
            z_vs_pt: Hist2D::new(
                &format!("hDcaZvsPt{suffix}"),
                &format!("{label};p_{{T}} [GeV/c];DCA_{{z}} [cm]"),
                pt,
                dca,
            ),
            xy_vs_z: Hist2D::new(
                &format!("hDcaXYvsZ{suffix}"),
                &format!("{label};DCA_{{z}} [cm];DCA_{{xy}} [cm]"),
                dca,
                dca,
            ),
        }
    }
    fn fill(&mut self, entry: &DcaEntry) {
        self.xy_vs_pt.fill(entry.pt, entry.dca_xy);
        self.z_vs_pt.fill(entry.pt, entry.dca_z);
        self.xy_vs_z.fill(entry.dca_z, entry.dca_xy);
    }
}

/// A fitted width curve and its `±n_cut` boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct WidthFit {
    pub widths: Hist1D,
    pub curve: WidthCurve,
    pub neg: WidthCurve,
    pub pos: WidthCurve,
}

impl WidthFit {
    fn new(name: &str, widths: Hist1D, config: &SigmaDcaConfig) -> Result<Self, QaError> {
        let curve = fit_width_curve(name, &widths, config.form, config.fit_range)?;
        info!("{name}: {} with {:?}", curve.formula(), curve.params);
        Ok(Self {
            neg: curve.scaled(&format!("{name}_Neg"), -config.n_cut),
            pos: curve.scaled(&format!("{name}_Pos"), config.n_cut),
            widths,
            curve,
        })
    }
    pub fn max_dca(&self, pt: f64) -> f64 {
        //! Upper `|DCA|` bound at `pt`; momenta above the fit range use its upper edge.
        self.pos.eval(pt.min(self.pos.range.1))
    }
}

fn width_fit(
    hist: &Hist2D,
    hist_name: &str,
    curve_name: &str,
    config: &SigmaDcaConfig,
) -> Result<WidthFit, QaError> {
    let no_entries = || QaError::Fit {
        name: curve_name.to_string(),
        reason: format!("{} has no entries to slice", hist.name()),
    };
    let first = hist.find_first_x_bin_above(0.0).ok_or_else(no_entries)?;
    let last = hist.find_last_x_bin_above(0.0).ok_or_else(no_entries)?;
    let mut widths = fit_slices_y(hist, first, last, config.min_slice_entries).sigma;
    widths.set_name(hist_name);
    WidthFit::new(curve_name, widths, config)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigmaDcaResult {
    pub all: DcaHists,
    pub selected: DcaHists,
    pub xy: WidthFit,
    pub z: WidthFit,
    pub n_processed: usize,
    pub n_selected: usize,
}

impl SigmaDcaResult {
    pub fn into_objects(self) -> Vec<Object> {
        let mut objects = Vec::new();
        for hists in [self.all, self.selected] {
            objects.extend([
                Object::from(hists.xy_vs_pt),
                hists.z_vs_pt.into(),
                hists.xy_vs_z.into(),
            ]);
        }
        for fit in [self.xy, self.z] {
            objects.extend([
                Object::from(fit.widths),
                fit.curve.into(),
                fit.neg.into(),
                fit.pos.into(),
            ]);
        }
        objects
    }
    pub fn save(self, store: &mut OutputStore) -> Result<(), QaError> {
        for object in self.into_objects() {
            store.put(OutputStore::TOP, object)?;
        }
        Ok(())
    }
}

pub fn calculate<S>(source: &S, config: &SigmaDcaConfig) -> Result<SigmaDcaResult, QaError>
where
    S: EntrySource<Entry = DcaEntry> + ?Sized,
{
    //! Runs both passes over `source`.
    //!
    //! Fails if no track survives the quality cuts or a width curve cannot be fitted.
    let passes_quality = |entry: &DcaEntry| {
        config
            .quality_cuts
            .as_ref()
            .map_or(true, |cuts| cuts.passes(entry))
    };

    let mut all = DcaHists::new("All", "all tracks", config);
    let n_processed = for_each_entry(source, "first entry loop", |entry| {
        if passes_quality(&entry) {
            all.fill(&entry);
        }
    });
    let xy = width_fit(&all.xy_vs_pt, "hWidthDcaXY", "fFitWidthXY", config)?;
    let z = width_fit(&all.z_vs_pt, "hWidthDcaZ", "fFitWidthZ", config)?;

    let mut selected = DcaHists::new("Sel", "selected tracks", config);
    let mut n_selected = 0;
    for_each_entry(source, "second entry loop", |entry| {
        if !passes_quality(&entry) {
            return;
        }
        let is_in_xy = entry.dca_xy.abs() <= xy.max_dca(entry.pt);
        let is_in_z = entry.dca_z.abs() <= z.max_dca(entry.pt);
        if is_in_xy && is_in_z {
            selected.fill(&entry);
            n_selected += 1;
        }
    });
    info!("{n_selected} of {n_processed} entries within {} sigma", config.n_cut);
    Ok(SigmaDcaResult {
        all,
        selected,
        xy,
        z,
        n_processed,
        n_selected,
    })
}

pub fn run_sigma_dca(config: &SigmaDcaConfig) -> Result<(), QaError> {
    //! Reads `config.tuple` from `config.input`, writes every result to `config.output`
    //! and, if `config.plot_dir` is set, draws the summary plots there.
    let input = RootInput::open(&config.input, &config.tuple)?;
    let columns = DcaColumns::read(&input)?;
    let result = calculate(&columns, config)?;
    if let Some(dir) = &config.plot_dir {
        crate::plot::draw_sigma_dca(&result, config, dir)?;
    }
    let mut store = OutputStore::new(&config.output);
    result.save(&mut store)?;
    store.write()?;
    info!("finished calculating sigma dca");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quality_cuts_are_strict() {
        let cuts = QualityCuts::default();
        let good = DcaEntry {
            pt: 1.0,
            eta: 0.0,
            quality: 1.0,
            n_mvtx_layer: 3.0,
            n_intt_layer: 2.0,
            n_tpc_layer: 30.0,
            ..Default::default()
        };
        assert!(cuts.passes(&good));
        assert!(!cuts.passes(&DcaEntry {
            n_mvtx_layer: 2.0,
            ..good
        }));
        assert!(!cuts.passes(&DcaEntry { eta: 1.1, ..good }));
        assert!(!cuts.passes(&DcaEntry { pt: 0.1, ..good }));
    }

    #[test]
    fn max_dca_is_frozen_above_the_fit_range() {
        let curve = WidthCurve::new("fFitWidthXY", vec![0.002, 0.01], (0.5, 5.0));
        let fit = WidthFit {
            widths: Hist1D::new("hWidthDcaXY", "", crate::hist::Axis::new(10, 0.0, 10.0)),
            neg: curve.scaled("fFitWidthXY_Neg", -3.0),
            pos: curve.scaled("fFitWidthXY_Pos", 3.0),
            curve,
        };
        assert_eq!(fit.max_dca(50.0), fit.max_dca(5.0));
        assert!(fit.max_dca(1.0) > fit.max_dca(5.0));
        assert_relative_eq!(fit.max_dca(5.0), 0.012, epsilon = 1e-12);
    }

    #[test]
    fn columns_come_from_named_leaves() {
        let leaves = ["ntrks", "pt", "eta", "dcaxy", "dcaz", "quality"]
            .iter()
            .chain(&["nmvtxlayer", "ninttlayer", "ntpclayer"])
            .map(|s| s.to_string())
            .collect();
        let mut tuple = Tuple::new("ntTrackQA", "", leaves);
        tuple
            .fill(&[7.0, 2.0, 0.5, 0.01, -0.02, 1.5, 3.0, 2.0, 40.0])
            .unwrap();
        let columns = DcaColumns::from_tuple(&tuple).unwrap();
        assert_eq!(columns.n_entries(), 1);
        let entry = columns.entry(0).unwrap();
        assert_eq!(entry.pt, 2.0);
        assert_eq!(entry.n_tpc_layer, 40.0);
        assert!(columns.entry(1).is_none());

        let short = Tuple::new("ntShort", "", vec!["pt".to_string()]);
        assert!(matches!(
            DcaColumns::from_tuple(&short),
            Err(QaError::MissingObject { kind: "leaf", .. })
        ));
    }
}
