pub mod acceptance;
pub mod config;
pub mod error;
pub mod event;
pub mod fit;
pub mod four_momentum;
pub mod hist;
pub mod info;
pub mod maker;
pub mod plot;
pub mod plugin;
pub mod plugins;
pub mod sigma_dca;
pub mod store;
pub mod tuple;
pub mod prelude {
    pub use crate::acceptance::{
        ClusterAccept, KinematicAccept, Range, SigmaDcaCut, TrackAccept, TrackSelection,
    };
    pub use crate::config::{
        load_json, ClustQaConfig, CstPairsConfig, JobConfig, LambdaJetConfig, QualityCuts,
        SigmaDcaConfig, TrackPairsConfig, TrackQaConfig,
    };
    pub use crate::error::QaError;
    pub use crate::event::{
        CaloCluster, Calorimeter, ClusterKey, Constituent, Detector, Event, GenParticle, Jet,
        Track, Vertex,
    };
    pub use crate::fit::{CurveForm, WidthCurve};
    pub use crate::four_momentum::{delta_phi, delta_r, FourMomentum};
    pub use crate::hist::{Axis, Hist1D, Hist2D};
    pub use crate::info::{ClusterInfo, GenInfo, PartonInfo, RecoInfo, TrackInfo};
    pub use crate::leaves;
    pub use crate::maker::CorrelatorQaMaker;
    pub use crate::plugin::{Lifecycle, PluginBase, PluginConfig, QaPlugin};
    pub use crate::plugins::clust_qa::{ClustQaEntry, ClustQaTree};
    pub use crate::plugins::cst_pairs::{make_cst_pairs, CstPair, CstPairs};
    pub use crate::plugins::lambda_jets::{
        run_lambda_jets, EventCount, LambdaJetEntry, LambdaJetReader, LambdaTotals, ObjectType,
        Variable,
    };
    pub use crate::plugins::track_pairs::{make_track_pairs, TrackPair, TrackPairs};
    pub use crate::plugins::track_qa::{make_track_qa_rows, TrackQaRow, TrackQaTuple};
    pub use crate::sigma_dca::{calculate, run_sigma_dca, DcaColumns, DcaEntry, SigmaDcaResult};
    pub use crate::store::{EntrySource, Object, OutputStore, RootInput};
    pub use crate::tuple::{Column, Leaves, Tree, Tuple};
}
