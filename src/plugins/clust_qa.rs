use crate::config::ClustQaConfig;
use crate::error::QaError;
use crate::event::{Calorimeter, Event};
use crate::info::{ClusterInfo, GenInfo, RecoInfo};
use crate::plugin::{PluginBase, PluginConfig, QaPlugin};
use crate::store::OutputStore;
use crate::tuple::{Leaves, Tree};

/// Everything recorded for one event: event context and the accepted clusters of each
/// calorimeter, in [`Calorimeter::ALL`] order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClustQaEntry {
    pub reco: RecoInfo,
    pub gen: GenInfo,
    pub clusters: [Vec<ClusterInfo>; 3],
}

impl ClustQaEntry {
    pub fn new(event: &Event, config: &ClustQaConfig) -> Self {
        let vertex = event.primary_vertex();
        let clusters: [Vec<ClusterInfo>; 3] = Calorimeter::ALL.map(|calo| {
            event
                .clusters(calo)
                .iter()
                .map(|cluster| ClusterInfo::new(cluster, calo, vertex))
                .filter(|info| config.accept.accepts(info))
                .collect()
        });
        Self {
            reco: RecoInfo::new(event),
            gen: GenInfo::new(event, config.is_embed, &config.embed_ids),
            clusters,
        }
    }
    pub fn clusters(&self, calo: Calorimeter) -> &[ClusterInfo] {
        &self.clusters[calo.id() as usize]
    }
    pub fn scalar_names() -> Vec<String> {
        let mut names = RecoInfo::leaf_names();
        names.extend(GenInfo::leaf_names());
        names
    }
    pub fn vector_names() -> Vec<String> {
        //! `{calorimeter}_{leaf}` for every calorimeter and [`ClusterInfo`] leaf.
        Calorimeter::ALL
            .iter()
            .flat_map(|calo| ClusterInfo::prefixed_leaf_names(&format!("{}_", calo.prefix())))
            .collect()
    }
    pub fn scalars(&self) -> Vec<f64> {
        let mut values = self.reco.leaf_values();
        values.extend(self.gen.leaf_values());
        values
    }
    pub fn vectors(&self) -> Vec<Vec<f64>> {
        let n_leaves = ClusterInfo::n_leaves();
        self.clusters
            .iter()
            .flat_map(|infos| {
                let rows: Vec<Vec<f64>> = infos.iter().map(|info| info.leaf_values()).collect();
                (0..n_leaves).map(move |leaf| rows.iter().map(|row| row[leaf]).collect())
            })
            .collect()
    }
}

/// Fills `tClustQA` with one entry per event holding the accepted calorimeter clusters.
pub struct ClustQaTree {
    base: PluginBase,
    config: ClustQaConfig,
    tree: Option<Tree>,
}

impl ClustQaTree {
    pub const DEFAULT_NAME: &'static str = "ClustQATree";

    pub fn new(name: &str, config: ClustQaConfig) -> Self {
        Self {
            base: PluginBase::new(name),
            config,
            tree: None,
        }
    }
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }
}

impl PluginConfig for ClustQaConfig {
    type Plugin = ClustQaTree;
    fn build(self, name: &str) -> ClustQaTree {
        ClustQaTree::new(name, self)
    }
}

impl QaPlugin for ClustQaTree {
    fn base(&self) -> &PluginBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }
    fn init(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.init_output(store)?;
        self.base.trace("initializing output tree");
        self.tree = Some(Tree::new(
            "tClustQA",
            "Cluster QA",
            ClustQaEntry::scalar_names(),
            ClustQaEntry::vector_names(),
        ));
        Ok(())
    }
    fn process(&mut self, event: &Event) -> Result<(), QaError> {
        self.base.begin_event()?;
        self.base.trace("looping over clusters");
        let tree = self
            .tree
            .as_mut()
            .ok_or_else(|| self.base.lifecycle_error("process an event"))?;
        let entry = ClustQaEntry::new(event, &self.config);
        tree.fill(&entry.scalars(), entry.vectors())
    }
    fn finalize(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.trace("saving output");
        let tree = self
            .tree
            .take()
            .ok_or_else(|| self.base.lifecycle_error("finalize"))?;
        self.base.close_output(store, vec![tree.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CaloCluster, Vertex};
    use crate::tuple::Column;

    fn cluster(id: u32, energy: f64, z: f64) -> CaloCluster {
        CaloCluster {
            id,
            energy,
            x: 100.0,
            y: 0.0,
            z,
            n_towers: 4,
        }
    }

    #[test]
    fn entries_split_clusters_by_calorimeter() {
        let event = Event {
            emcal_clusters: vec![cluster(0, 2.0, 0.0), cluster(1, 0.05, 0.0)],
            ohcal_clusters: vec![cluster(7, 3.0, 10.0), cluster(8, 3.0, 1e4)],
            vertices: vec![Vertex {
                id: 0,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            }],
            ..Default::default()
        };
        let entry = ClustQaEntry::new(&event, &ClustQaConfig::default());
        assert_eq!(entry.clusters(Calorimeter::EmCal).len(), 1);
        assert!(entry.clusters(Calorimeter::IHCal).is_empty());
        assert_eq!(entry.clusters(Calorimeter::OHCal)[0].id, 7);
        assert_eq!(entry.reco.e_sum_ohcal, 6.0);

        let mut tree = Tree::new(
            "tClustQA",
            "",
            ClustQaEntry::scalar_names(),
            ClustQaEntry::vector_names(),
        );
        tree.fill(&entry.scalars(), entry.vectors()).unwrap();
        assert_eq!(
            tree.column("emcal_ene"),
            Some(&Column::Vector(vec![vec![2.0]]))
        );
        assert_eq!(tree.column("ihcal_id"), Some(&Column::Vector(vec![vec![]])));
        assert_eq!(tree.column("ohcal_system"), Some(&Column::Vector(vec![vec![2.0]])));
    }
}
