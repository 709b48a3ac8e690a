use approx::assert_relative_eq;
use correlator_qa::prelude::*;

fn good_keys(shared: u32, offset: u32) -> Vec<ClusterKey> {
    //! Enough tracker layers to pass the stock acceptance. The first `shared` MVTX keys are
    //! the same for every track.
    let mut keys: Vec<ClusterKey> = (0..3)
        .map(|layer| {
            let index = if layer < shared { layer } else { offset + layer };
            ClusterKey::new(Detector::Mvtx, layer as u8, index)
        })
        .collect();
    keys.push(ClusterKey::new(Detector::Intt, 3, offset));
    keys.extend((7..35).map(|layer| ClusterKey::new(Detector::Tpc, layer, offset + layer as u32)));
    keys
}

fn track(id: u32, px: f64, py: f64, pz: f64) -> Track {
    Track {
        id,
        charge: 1,
        px,
        py,
        pz,
        x: 0.0,
        y: 0.0,
        z: 0.0,
        momentum_cov: Default::default(),
        chisq: 20.0,
        ndf: 20.0,
        vertex_id: 0,
        silicon_seed: Some(id),
        tpc_seed: Some(id),
        cluster_keys: good_keys(2, 100 * (id + 1)),
    }
}

fn three_track_event() -> Event {
    Event {
        tracks: vec![
            track(0, 1.0, 0.0, 0.2),
            track(1, 0.0, 2.0, -0.3),
            // below the transverse-momentum threshold
            track(2, 0.1, 0.0, 0.0),
        ],
        vertices: vec![Vertex {
            id: 0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }],
        ..Default::default()
    }
}

#[test]
fn two_accepted_tracks_give_two_pairs_and_two_rows() {
    let event = three_track_event();
    let selection = TrackSelection::default();
    let pairs = make_track_pairs(&event, &selection);
    assert_eq!(pairs.len(), 2);
    assert_eq!((pairs[0].a.id, pairs[0].b.id), (0, 1));
    assert_eq!((pairs[1].a.id, pairs[1].b.id), (1, 0));
    assert_eq!(pairs[0].n_same_clust_key, 2);

    let rows = make_track_qa_rows(&event, &TrackQaConfig::default());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].reco.n_trks, 3);
    assert_eq!(rows[1].track.id, 1);
}

#[test]
fn pairs_never_pair_a_track_with_itself() {
    let mut event = three_track_event();
    event.tracks.extend((3..8).map(|id| track(id, 0.5 + id as f64, 0.3, 0.1)));
    let pairs = make_track_pairs(&event, &TrackSelection::default());
    assert_eq!(pairs.len(), 7 * 6);
    assert!(pairs.iter().all(|pair| pair.a.id != pair.b.id));
}

#[test]
fn swapped_pairs_mirror_each_other() {
    let pairs = make_track_pairs(&three_track_event(), &TrackSelection::default());
    let (ab, ba) = (&pairs[0], &pairs[1]);
    assert_eq!(ab.a, ba.b);
    assert_eq!(ab.b, ba.a);
    assert_relative_eq!(ab.delta_r, ba.delta_r);
    assert_relative_eq!(ab.delta_eta, -ba.delta_eta);
    assert_relative_eq!(
        ab.delta_r,
        (ab.delta_eta.powi(2) + ab.delta_phi.powi(2)).sqrt(),
        epsilon = 1e-12
    );
    assert_relative_eq!(ab.pt_frac * ba.pt_frac, 1.0, epsilon = 1e-6);
}

#[test]
fn significance_cut_accepts_its_boundary() {
    let cut = SigmaDcaCut {
        n_sigma: (2.0, 2.0),
        pt_fit_max: (10.0, 10.0),
        width_xy: WidthCurve::new("fFitWidthXY", vec![0.25], (1.0, 10.0)),
        width_z: WidthCurve::new("fFitWidthZ", vec![0.25, 2.0], (1.0, 10.0)),
    };
    let info = |pt: f64, dca_xy: f64, dca_z: f64| TrackInfo {
        pt,
        dca_xy,
        dca_z,
        ..Default::default()
    };
    assert!(cut.accepts(&info(4.0, 0.5, 0.0)));
    assert!(cut.accepts(&info(4.0, -0.5, 0.0)));
    assert!(!cut.accepts(&info(4.0, 0.500001, 0.0)));
    // above the fit window the width is frozen at its upper edge: 2 * (0.25 + 2/10)
    assert!(cut.accepts(&info(20.0, 0.0, 0.89)));
    assert!(!cut.accepts(&info(20.0, 0.0, 0.91)));
}

struct Lcg(u64);

impl Lcg {
    fn uniform(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
    fn normal(&mut self) -> f64 {
        (0..12).map(|_| self.uniform()).sum::<f64>() - 6.0
    }
}

fn true_width(pt: f64) -> f64 {
    0.01 + 0.02 / pt
}

fn dca_sample() -> Vec<DcaEntry> {
    let mut rng = Lcg(42);
    (1..15)
        .flat_map(|bin| {
            let pt = bin as f64 + 0.5;
            (0..2000)
                .map(|_| (pt, true_width(pt)))
                .collect::<Vec<_>>()
        })
        .map(|(pt, width)| DcaEntry {
            pt,
            eta: 0.2,
            dca_xy: width * rng.normal(),
            dca_z: width * rng.normal(),
            quality: 1.0,
            n_mvtx_layer: 3.0,
            n_intt_layer: 2.0,
            n_tpc_layer: 40.0,
        })
        .collect()
}

fn dca_config() -> SigmaDcaConfig {
    SigmaDcaConfig {
        dca_axis: Axis::new(200, -0.2, 0.2),
        pt_axis: Axis::new(15, 0.0, 15.0),
        ..Default::default()
    }
}

#[test]
fn sigma_dca_is_reproducible() {
    let sample = dca_sample();
    let config = dca_config();
    let first = calculate(&sample[..], &config).unwrap();
    let second = calculate(&sample[..], &config).unwrap();
    assert_eq!(first, second);

    assert_eq!(first.n_processed, sample.len());
    assert!(first.n_selected < first.n_processed);
    assert!(first.n_selected > first.n_processed * 9 / 10);
    assert_eq!(first.all.xy_vs_pt.entries(), sample.len() as u64);
    assert_eq!(first.selected.z_vs_pt.entries(), first.n_selected as u64);
    for pt in [2.0, 5.0, 12.0] {
        let fitted = first.xy.curve.eval(pt);
        assert!(fitted > 0.5 * true_width(pt) && fitted < 1.5 * true_width(pt));
    }
    assert_relative_eq!(
        first.xy.pos.eval(5.0),
        3.0 * first.xy.curve.eval(5.0),
        max_relative = 1e-12
    );
    assert_eq!(first.xy.neg.name, "fFitWidthXY_Neg");
    assert_eq!(first.z.widths.name(), "hWidthDcaZ");

    let mut store = OutputStore::new("unused.root");
    first.save(&mut store).unwrap();
    assert!(store.get(OutputStore::TOP, "hDcaXYvsZSel").is_some());
    assert!(store.get(OutputStore::TOP, "fFitWidthZ_Pos").is_some());
    assert_eq!(store.n_objects(), 14);
}

#[test]
fn sigma_dca_without_surviving_tracks_fails() {
    let sample: Vec<DcaEntry> = dca_sample()
        .into_iter()
        .map(|entry| DcaEntry {
            n_tpc_layer: 20.0,
            ..entry
        })
        .collect();
    let config = SigmaDcaConfig {
        quality_cuts: Some(QualityCuts::default()),
        ..dca_config()
    };
    assert!(matches!(
        calculate(&sample[..], &config),
        Err(QaError::Fit { .. })
    ));
}

fn lambda_scenario() -> Vec<LambdaJetEntry> {
    use correlator_qa::plugins::lambda_jets::{LambdaCandidate, TaggedJet};
    let lambda = LambdaCandidate {
        jet_id: 1,
        z: 0.5,
        dr: 0.1,
        energy: 10.5,
        pt: 10.0,
        eta: 0.3,
        phi: 0.6,
    };
    vec![
        LambdaJetEntry {
            jets: vec![
                TaggedJet {
                    id: 1,
                    has_lambda: true,
                    energy: 21.0,
                    pt: 20.0,
                    eta: 0.2,
                    phi: 0.5,
                },
                TaggedJet {
                    id: 2,
                    has_lambda: false,
                    energy: 5.5,
                    pt: 5.0,
                    eta: -0.45,
                    phi: 2.0,
                },
            ],
            lambdas: vec![lambda.clone()],
        },
        LambdaJetEntry {
            jets: Vec::new(),
            lambdas: vec![LambdaCandidate {
                jet_id: 7,
                z: 0.1,
                ..lambda
            }],
        },
    ]
}

#[test]
fn lambda_reader_counts_and_classifies() {
    let mut store = OutputStore::new("unused.root");
    let mut reader = LambdaJetReader::new(LambdaJetConfig::default());
    reader.init(&mut store).unwrap();
    let totals = reader.analyze(&lambda_scenario()[..]).unwrap();
    assert_eq!(
        totals,
        LambdaTotals {
            n_lambda: 2,
            n_lead_lambda: 1,
            n_jet: 1,
            n_tagged_jet: 1,
            n_lead_tagged_jet: 1,
        }
    );

    let hist = |var, ty| reader.hist_1d(var, ty).unwrap();
    let top_pt = hist(Variable::Pt, ObjectType::HighestPtJet);
    assert_eq!(top_pt.entries(), 1);
    assert_eq!(top_pt.bin_content(top_pt.axis().find_bin(20.0)), 1.0);
    let top_frac = hist(Variable::Frac, ObjectType::HighestPtJet);
    assert_eq!(top_frac.bin_content(top_frac.axis().find_bin(1.0)), 1.0);

    // the jet failing the cuts shows up nowhere
    for ty in ObjectType::ALL {
        let eta = hist(Variable::Eta, ty);
        assert_eq!(eta.bin_content(eta.axis().find_bin(-0.45)), 0.0);
    }
    assert_eq!(hist(Variable::Eta, ObjectType::Jet).entries(), 1);
    assert_eq!(hist(Variable::Eta, ObjectType::LeadLamJet).entries(), 1);

    // without a leading jet the relative angles of a lambda are undefined
    assert_eq!(hist(Variable::Eta, ObjectType::Lam).entries(), 2);
    assert_eq!(hist(Variable::DeltaPhi, ObjectType::Lam).entries(), 1);
    let lead_dphi = hist(Variable::DeltaPhi, ObjectType::LeadLam);
    assert_eq!(lead_dphi.entries(), 1);
    assert_relative_eq!(lead_dphi.mean(), 0.1, epsilon = 0.05);

    let in_jet = reader.event_hist(EventCount::LambdasInJet).unwrap();
    assert_eq!(in_jet.entries(), 1);
    assert_eq!(in_jet.bin_content(in_jet.axis().find_bin(1.0)), 1.0);
    assert_eq!(reader.event_hist(EventCount::Jets).unwrap().entries(), 2);
    let frac_vs_pt = reader
        .hist_2d(Variable::Frac, Variable::Pt, ObjectType::LeadLam)
        .unwrap();
    assert_eq!(frac_vs_pt.name(), "hFracVsPt_LeadLam");
    assert_eq!(frac_vs_pt.entries(), 1);
    assert!(reader
        .hist_2d(Variable::Eta, Variable::Frac, ObjectType::Lam)
        .is_none());

    reader.end(&mut store).unwrap();
    assert!(store
        .get("LambdaJetTreeReader", "hPt_HighestPtJet")
        .is_some());
    assert_eq!(store.objects("LambdaJetTreeReader").count(), 6 + 6 * 7 + 6 * 7 * 5);
}

#[test]
fn plugins_reject_out_of_order_calls() {
    let mut store = OutputStore::new("unused.root");
    let event = three_track_event();
    let mut plugin = TrackQaTuple::new(TrackQaTuple::DEFAULT_NAME, TrackQaConfig::default());
    assert!(matches!(
        plugin.process(&event),
        Err(QaError::Lifecycle {
            state: Lifecycle::Uninitialized,
            ..
        })
    ));
    assert!(plugin.finalize(&mut store).is_err());
    plugin.init(&mut store).unwrap();
    assert!(plugin.init(&mut store).is_err());
    plugin.process(&event).unwrap();
    plugin.process(&event).unwrap();
    assert_eq!(plugin.tuple().unwrap().n_entries(), 4);
    plugin.finalize(&mut store).unwrap();
    assert_eq!(plugin.state(), Lifecycle::Finalized);
    assert!(plugin.process(&event).is_err());
    assert!(plugin.finalize(&mut store).is_err());
    assert!(store.get("TrackQATuple", "ntTrackQA").is_some());
}

#[test]
fn maker_writes_one_file_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qa").join("correlator_qa.root");
    let mut maker = CorrelatorQaMaker::default();
    maker.set_global_out_file(&path);
    maker
        .init_plugin(TrackPairsConfig::default(), "TrackPairs")
        .unwrap();
    maker
        .init_plugin(TrackQaConfig::default(), TrackQaTuple::DEFAULT_NAME)
        .unwrap();
    maker.init().unwrap();
    for _ in 0..3 {
        maker.process_event(&three_track_event()).unwrap();
    }
    maker.end().unwrap();
    assert_eq!(maker.n_events(), 3);
    assert!(path.exists());

    let store = maker.store().unwrap();
    match store.get("TrackPairs", "ntTrackPairs") {
        Some(Object::Tuple(tuple)) => assert_eq!(tuple.n_entries(), 6),
        other => panic!("expected the pair tuple, found {other:?}"),
    }
    let input = RootInput::open(&path, "TrackQATuple_ntTrackQA").unwrap();
    let pt: Vec<f32> = input.column("pt").unwrap();
    assert_eq!(pt.len(), 6);
    assert_relative_eq!(pt[1], 2.0, epsilon = 1e-5);
    assert!(matches!(
        input.column::<f32>("nope"),
        Err(QaError::MissingObject { kind: "branch", .. })
    ));
}
