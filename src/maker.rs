use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::QaError;
use crate::event::Event;
use crate::plugin::{PluginConfig, QaPlugin};
use crate::store::OutputStore;

/// Owns a set of QA plugins and drives them through one job.
///
/// All plugins share a single [`OutputStore`], created on the first [`init`](Self::init) and
/// written once by [`end`](Self::end).
pub struct CorrelatorQaMaker {
    out_file: PathBuf,
    debug: bool,
    verbosity: u8,
    plugins: Vec<Box<dyn QaPlugin>>,
    store: Option<OutputStore>,
    n_events: u64,
}

impl Default for CorrelatorQaMaker {
    fn default() -> Self {
        Self::new("correlator_qa.root")
    }
}

impl CorrelatorQaMaker {
    pub fn new(out_file: impl AsRef<Path>) -> Self {
        Self {
            out_file: out_file.as_ref().to_path_buf(),
            debug: false,
            verbosity: 0,
            plugins: Vec::new(),
            store: None,
            n_events: 0,
        }
    }
    pub fn out_file(&self) -> &Path {
        &self.out_file
    }
    pub fn plugins(&self) -> impl Iterator<Item = &dyn QaPlugin> {
        self.plugins.iter().map(|plugin| plugin.as_ref())
    }
    pub fn store(&self) -> Option<&OutputStore> {
        self.store.as_ref()
    }
    pub fn n_events(&self) -> u64 {
        self.n_events
    }

    pub fn set_global_debug(&mut self, debug: bool) {
        self.debug = debug;
        for plugin in &mut self.plugins {
            plugin.base_mut().set_debug(debug);
        }
    }
    pub fn set_global_verbosity(&mut self, verbosity: u8) {
        self.verbosity = verbosity;
        for plugin in &mut self.plugins {
            plugin.base_mut().set_verbosity(verbosity);
        }
    }
    pub fn set_global_out_file(&mut self, out_file: impl AsRef<Path>) {
        self.out_file = out_file.as_ref().to_path_buf();
        if let Some(store) = self.store.as_mut() {
            store.set_path(&self.out_file);
        }
    }

    pub fn init_plugin<C: PluginConfig>(&mut self, config: C, name: &str) -> Result<(), QaError> {
        //! Builds the plugin described by `config` under `name`, applying the global debug and
        //! verbosity settings.
        if name.is_empty() {
            return Err(QaError::Config(
                "plugins must be registered with a non-empty name".to_string(),
            ));
        }
        if self.plugins.iter().any(|plugin| plugin.name() == name) {
            return Err(QaError::Config(format!(
                "a plugin named {name:?} is already registered"
            )));
        }
        let mut plugin = config.build(name);
        plugin.base_mut().set_debug(self.debug);
        plugin.base_mut().set_verbosity(self.verbosity);
        self.plugins.push(Box::new(plugin));
        Ok(())
    }

    pub fn init(&mut self) -> Result<(), QaError> {
        let store = self
            .store
            .get_or_insert_with(|| OutputStore::new(&self.out_file));
        for plugin in &mut self.plugins {
            plugin.init(store)?;
        }
        info!("initialized {} plugins", self.plugins.len());
        Ok(())
    }
    pub fn process_event(&mut self, event: &Event) -> Result<(), QaError> {
        for plugin in &mut self.plugins {
            plugin.process(event)?;
        }
        self.n_events += 1;
        Ok(())
    }
    pub fn end(&mut self) -> Result<(), QaError> {
        //! Finalizes every plugin and writes the output file.
        //!
        //! A plugin that fails to finalize does not stop the others or the write; the first
        //! such error is returned afterwards.
        let store = self.store.as_mut().ok_or_else(|| {
            QaError::Config("the maker must be initialized before it can end".to_string())
        })?;
        let mut first_error = None;
        for plugin in &mut self.plugins {
            if let Err(err) = plugin.finalize(store) {
                warn!("{}: {err}", plugin.name());
                first_error.get_or_insert(err);
            }
        }
        store.write()?;
        info!("processed {} events", self.n_events);
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrackPairsConfig, TrackQaConfig};
    use crate::plugin::Lifecycle;

    #[test]
    fn global_settings_reach_every_plugin() {
        let mut maker = CorrelatorQaMaker::default();
        maker.set_global_debug(true);
        maker
            .init_plugin(TrackPairsConfig::default(), "TrackPairs")
            .unwrap();
        maker.set_global_verbosity(3);
        maker
            .init_plugin(TrackQaConfig::default(), "TrackQATuple")
            .unwrap();
        assert!(maker.plugins().all(|p| p.base().is_tracing()));
        assert!(matches!(
            maker.init_plugin(TrackQaConfig::default(), ""),
            Err(QaError::Config(_))
        ));
        assert!(maker
            .init_plugin(TrackQaConfig::default(), "TrackQATuple")
            .is_err());
        assert_eq!(maker.plugins().count(), 2);
    }

    #[test]
    fn events_need_initialized_plugins() {
        let mut maker = CorrelatorQaMaker::default();
        maker
            .init_plugin(TrackPairsConfig::default(), "TrackPairs")
            .unwrap();
        assert!(matches!(
            maker.process_event(&Event::default()),
            Err(QaError::Lifecycle { .. })
        ));
        assert!(maker.end().is_err());
        maker.init().unwrap();
        maker.process_event(&Event::default()).unwrap();
        assert!(maker.plugins().all(|p| p.state() == Lifecycle::Running));
        assert!(maker.store().unwrap().has_dir("TrackPairs"));
    }

    #[test]
    fn one_failing_plugin_does_not_lose_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.root");
        let mut maker = CorrelatorQaMaker::new(&path);
        for name in ["TrackQA_A", "TrackQA_B", "TrackQA_C"] {
            maker.init_plugin(TrackQaConfig::default(), name).unwrap();
        }
        // B files its tuple where A already put one
        maker.plugins[1].base_mut().set_out_dir("TrackQA_A");
        maker.init().unwrap();
        maker.process_event(&Event::default()).unwrap();
        assert!(matches!(maker.end(), Err(QaError::ObjectExists { .. })));
        let states: Vec<Lifecycle> = maker.plugins().map(|p| p.state()).collect();
        assert_eq!(
            states,
            [Lifecycle::Finalized, Lifecycle::Running, Lifecycle::Finalized]
        );
        assert!(maker.store().unwrap().get("TrackQA_C", "ntTrackQA").is_some());
        assert!(path.exists());
    }
}
