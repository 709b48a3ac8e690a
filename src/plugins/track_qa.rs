use crate::config::TrackQaConfig;
use crate::error::QaError;
use crate::event::Event;
use crate::info::{GenInfo, RecoInfo, TrackInfo};
use crate::plugin::{PluginBase, PluginConfig, QaPlugin};
use crate::store::OutputStore;
use crate::tuple::{Leaves, Tuple};

/// Event context followed by the track's own record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackQaRow {
    pub reco: RecoInfo,
    pub gen: GenInfo,
    pub track: TrackInfo,
}

impl Leaves for TrackQaRow {
    fn leaf_names() -> Vec<String> {
        let mut names = RecoInfo::leaf_names();
        names.extend(GenInfo::leaf_names());
        names.extend(TrackInfo::leaf_names());
        names
    }
    fn leaf_values(&self) -> Vec<f64> {
        let mut values = self.reco.leaf_values();
        values.extend(self.gen.leaf_values());
        values.extend(self.track.leaf_values());
        values
    }
}

pub fn make_track_qa_rows(event: &Event, config: &TrackQaConfig) -> Vec<TrackQaRow> {
    //! One row per track of `event` passing the configured selection.
    let reco = RecoInfo::new(event);
    let gen = GenInfo::new(event, config.is_embed, &config.embed_ids);
    event
        .tracks
        .iter()
        .filter_map(|track| {
            let info = TrackInfo::new(track, event);
            config
                .selection
                .is_good_track(track, &info, event)
                .then_some(TrackQaRow {
                    reco,
                    gen,
                    track: info,
                })
        })
        .collect()
}

/// Fills `ntTrackQA` with one row per accepted track.
pub struct TrackQaTuple {
    base: PluginBase,
    config: TrackQaConfig,
    tuple: Option<Tuple>,
}

impl TrackQaTuple {
    pub const DEFAULT_NAME: &'static str = "TrackQATuple";

    pub fn new(name: &str, config: TrackQaConfig) -> Self {
        Self {
            base: PluginBase::new(name),
            config,
            tuple: None,
        }
    }
    pub fn tuple(&self) -> Option<&Tuple> {
        self.tuple.as_ref()
    }
}

impl PluginConfig for TrackQaConfig {
    type Plugin = TrackQaTuple;
    fn build(self, name: &str) -> TrackQaTuple {
        TrackQaTuple::new(name, self)
    }
}

impl QaPlugin for TrackQaTuple {
    fn base(&self) -> &PluginBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }
    fn init(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.init_output(store)?;
        self.base.trace("initializing output tuple");
        self.tuple = Some(Tuple::for_row::<TrackQaRow>("ntTrackQA", "Track QA"));
        Ok(())
    }
    fn process(&mut self, event: &Event) -> Result<(), QaError> {
        self.base.begin_event()?;
        self.base.trace("looping over tracks");
        let tuple = self
            .tuple
            .as_mut()
            .ok_or_else(|| self.base.lifecycle_error("process an event"))?;
        for row in make_track_qa_rows(event, &self.config) {
            tuple.fill_row(&row)?;
        }
        Ok(())
    }
    fn finalize(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.trace("saving output");
        let tuple = self
            .tuple
            .take()
            .ok_or_else(|| self.base.lifecycle_error("finalize"))?;
        self.base.close_output(store, vec![tuple.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_concatenates_event_gen_and_track_leaves() {
        let names = TrackQaRow::leaf_names();
        assert_eq!(names.len(), 66);
        assert_eq!(names[0], "ntrks");
        assert_eq!(names[8], "nchrgpar");
        assert_eq!(names[13], "partona_pid");
        assert_eq!(names[29], "partonb_pid");
        assert_eq!(names[45], "id");
        assert_eq!(names[65], "vtxz");
        assert_eq!(TrackQaRow::default().leaf_values().len(), 66);
    }
}
