//! The QA plugins driven by [`CorrelatorQaMaker`](crate::maker::CorrelatorQaMaker), plus the
//! stand-alone lambda-jet tree reader.
pub mod clust_qa;
pub mod cst_pairs;
pub mod lambda_jets;
pub mod track_pairs;
pub mod track_qa;
