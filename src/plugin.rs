use tracing::{debug, info};

use crate::error::QaError;
use crate::event::Event;
use crate::store::{Object, OutputStore};

/// Where a plugin is in its run.
///
/// Plugins move strictly forward: `Uninitialized → Initialized → Running → Finalized`.
/// `Running` may be re-entered any number of times; nothing leaves `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Running,
    Finalized,
}

/// State shared by every plugin: its name, output directory, debugging knobs and lifecycle.
#[derive(Debug, Clone)]
pub struct PluginBase {
    name: String,
    out_dir: String,
    debug: bool,
    verbosity: u8,
    state: Lifecycle,
}

impl PluginBase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            out_dir: name.to_string(),
            debug: false,
            verbosity: 0,
            state: Lifecycle::Uninitialized,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn out_dir(&self) -> &str {
        &self.out_dir
    }
    pub fn set_out_dir(&mut self, dir: &str) {
        self.out_dir = dir.to_string();
    }
    pub fn debug(&self) -> bool {
        self.debug
    }
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }
    pub fn set_verbosity(&mut self, verbosity: u8) {
        self.verbosity = verbosity;
    }
    pub fn state(&self) -> Lifecycle {
        self.state
    }
    pub fn is_tracing(&self) -> bool {
        //! Per-step traces are emitted only in debug mode above verbosity 2.
        self.debug && self.verbosity > 2
    }
    pub fn trace(&self, step: &str) {
        if self.is_tracing() {
            debug!("{}: {step}", self.name);
        }
    }

    pub fn lifecycle_error(&self, action: &'static str) -> QaError {
        QaError::Lifecycle {
            plugin: self.name.clone(),
            action,
            state: self.state,
        }
    }

    pub fn init_output(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        //! Creates the plugin's directory in `store` if missing and marks it initialized.
        if self.state != Lifecycle::Uninitialized {
            return Err(self.lifecycle_error("initialize"));
        }
        if store.mkdir(&self.out_dir) {
            self.trace("created output directory");
        }
        self.state = Lifecycle::Initialized;
        Ok(())
    }
    pub fn begin_event(&mut self) -> Result<(), QaError> {
        match self.state {
            Lifecycle::Initialized | Lifecycle::Running => {
                self.state = Lifecycle::Running;
                Ok(())
            }
            _ => Err(self.lifecycle_error("process an event")),
        }
    }
    pub fn close_output(
        &mut self,
        store: &mut OutputStore,
        objects: Vec<Object>,
    ) -> Result<(), QaError> {
        //! Files `objects` under the plugin's directory and marks it finalized.
        match self.state {
            Lifecycle::Initialized | Lifecycle::Running => {}
            _ => return Err(self.lifecycle_error("finalize")),
        }
        let n_objects = objects.len();
        for object in objects {
            store.put(&self.out_dir, object)?;
        }
        self.state = Lifecycle::Finalized;
        info!("{}: saved {n_objects} objects to {}", self.name, self.out_dir);
        Ok(())
    }
}

/// An event-driven QA plugin.
///
/// The driver calls [`init`](QaPlugin::init) once, [`process`](QaPlugin::process) for every
/// event, and [`finalize`](QaPlugin::finalize) once at the end of the job.
pub trait QaPlugin {
    fn base(&self) -> &PluginBase;
    fn base_mut(&mut self) -> &mut PluginBase;
    fn init(&mut self, store: &mut OutputStore) -> Result<(), QaError>;
    fn process(&mut self, event: &Event) -> Result<(), QaError>;
    fn finalize(&mut self, store: &mut OutputStore) -> Result<(), QaError>;

    fn name(&self) -> &str {
        self.base().name()
    }
    fn state(&self) -> Lifecycle {
        self.base().state()
    }
}

/// Configuration that knows which plugin it builds.
pub trait PluginConfig {
    type Plugin: QaPlugin + 'static;
    fn build(self, name: &str) -> Self::Plugin;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist::{Axis, Hist1D};

    #[test]
    fn lifecycle_only_moves_forward() {
        let mut store = OutputStore::new("unused.root");
        let mut base = PluginBase::new("Probe");
        assert!(matches!(
            base.begin_event(),
            Err(QaError::Lifecycle {
                state: Lifecycle::Uninitialized,
                ..
            })
        ));
        base.init_output(&mut store).unwrap();
        assert!(store.has_dir("Probe"));
        assert!(base.init_output(&mut store).is_err());
        base.begin_event().unwrap();
        base.begin_event().unwrap();
        assert_eq!(base.state(), Lifecycle::Running);
        let hist = Hist1D::new("hProbe", "", Axis::new(1, 0.0, 1.0));
        base.close_output(&mut store, vec![hist.into()]).unwrap();
        assert_eq!(base.state(), Lifecycle::Finalized);
        assert!(base.begin_event().is_err());
        assert!(base.close_output(&mut store, Vec::new()).is_err());
        assert!(store.get("Probe", "hProbe").is_some());
    }

    #[test]
    fn tracing_needs_debug_and_verbosity() {
        let mut base = PluginBase::new("Probe");
        base.set_verbosity(5);
        assert!(!base.is_tracing());
        base.set_debug(true);
        assert!(base.is_tracing());
        base.set_verbosity(2);
        assert!(!base.is_tracing());
    }
}
