//! Reader for the lambda-tagged jet tree.
//!
//! Each entry holds the jets and lambda candidates of one event. Jets and lambdas are
//! classified by their own kinematic cuts, by whether a lambda is leading (carries more than
//! `z_lead_min` of its jet's momentum) and by whether a jet is lambda-tagged. Every class
//! fills its own set of histograms for seven kinematic variables, alone and against five
//! others.
use itertools::izip;
use tracing::info;

use crate::config::LambdaJetConfig;
use crate::error::QaError;
use crate::four_momentum::delta_phi;
use crate::hist::{Axis, Hist1D, Hist2D};
use crate::plugin::PluginBase;
use crate::store::{for_each_entry, EntrySource, Object, OutputStore, RootInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Eta,
    Ene,
    Pt,
    DeltaPhi,
    DeltaEta,
    DeltaR,
    Frac,
}

impl Variable {
    pub const ALL: [Variable; 7] = [
        Self::Eta,
        Self::Ene,
        Self::Pt,
        Self::DeltaPhi,
        Self::DeltaEta,
        Self::DeltaR,
        Self::Frac,
    ];
    /// The variables histograms are also filled against.
    pub const VS: [Variable; 5] = [
        Self::Eta,
        Self::Ene,
        Self::Pt,
        Self::DeltaPhi,
        Self::DeltaEta,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Eta => "Eta",
            Self::Ene => "Ene",
            Self::Pt => "Pt",
            Self::DeltaPhi => "DeltaPhi",
            Self::DeltaEta => "DeltaEta",
            Self::DeltaR => "DeltaR",
            Self::Frac => "Frac",
        }
    }
    pub fn title(&self) -> &'static str {
        match self {
            Self::Eta => "#eta",
            Self::Ene => "E [GeV/c]",
            Self::Pt => "p_{T} [GeV/c]",
            Self::DeltaPhi => "#Delta#varphi",
            Self::DeltaEta => "#Delta#eta",
            Self::DeltaR => "#Deltar",
            Self::Frac => "z = p / p^{jet}",
        }
    }
    pub fn axis(&self) -> Axis {
        match self {
            Self::Eta => Axis::new(80, -2.0, 2.0),
            Self::Ene | Self::Pt => Axis::new(100, 0.0, 100.0),
            Self::DeltaPhi => Axis::new(180, -3.15, 3.15),
            Self::DeltaEta => Axis::new(160, -4.0, 4.0),
            Self::DeltaR => Axis::new(500, 0.0, 5.0),
            Self::Frac => Axis::new(500, 0.0, 5.0),
        }
    }
    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Lam,
    LeadLam,
    Jet,
    LamJet,
    LeadLamJet,
    HighestPtJet,
}

impl ObjectType {
    pub const ALL: [ObjectType; 6] = [
        Self::Lam,
        Self::LeadLam,
        Self::Jet,
        Self::LamJet,
        Self::LeadLamJet,
        Self::HighestPtJet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lam => "Lam",
            Self::LeadLam => "LeadLam",
            Self::Jet => "Jet",
            Self::LamJet => "LamJet",
            Self::LeadLamJet => "LeadLamJet",
            Self::HighestPtJet => "HighestPtJet",
        }
    }
    fn index(&self) -> usize {
        *self as usize
    }
}

/// Per-event multiplicity histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCount {
    Jets,
    TaggedJets,
    LeadLambdaJets,
    Lambdas,
    LambdasInJet,
    LeadLambdas,
}

impl EventCount {
    pub const ALL: [EventCount; 6] = [
        Self::Jets,
        Self::TaggedJets,
        Self::LeadLambdaJets,
        Self::Lambdas,
        Self::LambdasInJet,
        Self::LeadLambdas,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jets => "hNumJet",
            Self::TaggedJets => "hNumTagJet",
            Self::LeadLambdaJets => "hNumLeadLamJet",
            Self::Lambdas => "hNumLambda",
            Self::LambdasInJet => "hNumLambdaInJet",
            Self::LeadLambdas => "hNumLeadLambda",
        }
    }
    fn title(&self) -> &'static str {
        match self {
            Self::Jets | Self::TaggedJets | Self::LeadLambdaJets => ";N_{jet};counts",
            _ => ";N_{#Lambda};counts",
        }
    }
}

/// Values of every [`Variable`] for one object, in [`Variable::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics([f64; 7]);

impl Kinematics {
    pub fn new(eta: f64, ene: f64, pt: f64, df: f64, dh: f64, dr: f64, z: f64) -> Self {
        Self([eta, ene, pt, df, dh, dr, z])
    }
    pub fn get(&self, var: Variable) -> f64 {
        self.0[var.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaCandidate {
    pub jet_id: i32,
    pub z: f64,
    pub dr: f64,
    pub energy: f64,
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedJet {
    pub id: u64,
    pub has_lambda: bool,
    pub energy: f64,
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
}

/// Jets and lambda candidates of one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LambdaJetEntry {
    pub jets: Vec<TaggedJet>,
    pub lambdas: Vec<LambdaCandidate>,
}

/// The per-event vector branches of the input tree.
pub struct LambdaJetColumns {
    lambda_jet_id: Vec<Vec<i32>>,
    lambda_z: Vec<Vec<f64>>,
    lambda_dr: Vec<Vec<f64>>,
    lambda_energy: Vec<Vec<f64>>,
    lambda_pt: Vec<Vec<f64>>,
    lambda_eta: Vec<Vec<f64>>,
    lambda_phi: Vec<Vec<f64>>,
    jet_has_lambda: Vec<Vec<bool>>,
    jet_id: Vec<Vec<u64>>,
    jet_energy: Vec<Vec<f64>>,
    jet_pt: Vec<Vec<f64>>,
    jet_eta: Vec<Vec<f64>>,
    jet_phi: Vec<Vec<f64>>,
}

impl LambdaJetColumns {
    pub fn read(input: &RootInput) -> Result<Self, QaError> {
        Ok(Self {
            lambda_jet_id: input.column("LambdaJetID")?,
            lambda_z: input.column("LambdaZ")?,
            lambda_dr: input.column("LambdaDr")?,
            lambda_energy: input.column("LambdaEnergy")?,
            lambda_pt: input.column("LambdaPt")?,
            lambda_eta: input.column("LambdaEta")?,
            lambda_phi: input.column("LambdaPhi")?,
            jet_has_lambda: input.column("JetHasLambda")?,
            jet_id: input.column("JetID")?,
            jet_energy: input.column("JetE")?,
            jet_pt: input.column("JetPt")?,
            jet_eta: input.column("JetEta")?,
            jet_phi: input.column("JetPhi")?,
        })
    }
}

fn same_len<T>(expected: usize, column: &[T]) -> Option<&[T]> {
    (column.len() == expected).then_some(column)
}

impl EntrySource for LambdaJetColumns {
    type Entry = LambdaJetEntry;
    fn n_entries(&self) -> usize {
        self.jet_pt.len()
    }
    fn entry(&self, index: usize) -> Option<LambdaJetEntry> {
        //! `None` if any branch is shorter than the tree or the jet or lambda vectors of
        //! the entry disagree in length.
        let n_lam = self.lambda_pt.get(index)?.len();
        let n_jet = self.jet_pt.get(index)?.len();
        let lambdas = izip!(
            same_len(n_lam, self.lambda_jet_id.get(index)?)?,
            same_len(n_lam, self.lambda_z.get(index)?)?,
            same_len(n_lam, self.lambda_dr.get(index)?)?,
            same_len(n_lam, self.lambda_energy.get(index)?)?,
            &self.lambda_pt[index],
            same_len(n_lam, self.lambda_eta.get(index)?)?,
            same_len(n_lam, self.lambda_phi.get(index)?)?,
        )
        .map(|(&jet_id, &z, &dr, &energy, &pt, &eta, &phi)| LambdaCandidate {
            jet_id,
            z,
            dr,
            energy,
            pt,
            eta,
            phi,
        })
        .collect();
        let jets = izip!(
            same_len(n_jet, self.jet_id.get(index)?)?,
            same_len(n_jet, self.jet_has_lambda.get(index)?)?,
            same_len(n_jet, self.jet_energy.get(index)?)?,
            &self.jet_pt[index],
            same_len(n_jet, self.jet_eta.get(index)?)?,
            same_len(n_jet, self.jet_phi.get(index)?)?,
        )
        .map(|(&id, &has_lambda, &energy, &pt, &eta, &phi)| TaggedJet {
            id,
            has_lambda,
            energy,
            pt,
            eta,
            phi,
        })
        .collect();
        Some(LambdaJetEntry { jets, lambdas })
    }
}

/// Running totals over the whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LambdaTotals {
    pub n_lambda: u64,
    pub n_lead_lambda: u64,
    pub n_jet: u64,
    pub n_tagged_jet: u64,
    pub n_lead_tagged_jet: u64,
}

struct HistBank {
    events: Vec<Hist1D>,
    /// `[type][variable]`
    hists_1d: Vec<Vec<Hist1D>>,
    /// `[type][variable][versus]`
    hists_2d: Vec<Vec<Vec<Hist2D>>>,
}

impl HistBank {
    fn new() -> Self {
        let count = Axis::new(100, 0.0, 100.0);
        let events = EventCount::ALL
            .iter()
            .map(|h| Hist1D::new(h.name(), h.title(), count))
            .collect();
        let hists_1d = ObjectType::ALL
            .iter()
            .map(|ty| {
                Variable::ALL
                    .iter()
                    .map(|var| {
                        Hist1D::new(
                            &format!("h{}_{}", var.name(), ty.name()),
                            &format!(";{};counts", var.title()),
                            var.axis(),
                        )
                    })
                    .collect()
            })
            .collect();
        let hists_2d = ObjectType::ALL
            .iter()
            .map(|ty| {
                Variable::ALL
                    .iter()
                    .map(|var| {
                        Variable::VS
                            .iter()
                            .map(|vs| {
                                Hist2D::new(
                                    &format!("h{}Vs{}_{}", var.name(), vs.name(), ty.name()),
                                    &format!(";{};{};counts", vs.title(), var.title()),
                                    vs.axis(),
                                    var.axis(),
                                )
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Self {
            events,
            hists_1d,
            hists_2d,
        }
    }

    fn fill(&mut self, ty: ObjectType, kin: &Kinematics) {
        for var in Variable::ALL {
            self.hists_1d[ty.index()][var.index()].fill(kin.get(var));
            for (iv, vs) in Variable::VS.iter().enumerate() {
                self.hists_2d[ty.index()][var.index()][iv].fill(kin.get(*vs), kin.get(var));
            }
        }
    }

    fn fill_count(&mut self, count: EventCount, n: u64) {
        self.events[count as usize].fill(n as f64);
    }

    fn into_objects(self) -> Vec<Object> {
        let mut objects: Vec<Object> = self.events.into_iter().map(Object::from).collect();
        objects.extend(self.hists_1d.into_iter().flatten().map(Object::from));
        objects.extend(
            self.hists_2d
                .into_iter()
                .flatten()
                .flatten()
                .map(Object::from),
        );
        objects
    }
}

/// Reads the lambda-jet tree and fills the histogram bank.
pub struct LambdaJetReader {
    base: PluginBase,
    config: LambdaJetConfig,
    bank: Option<HistBank>,
    totals: LambdaTotals,
}

impl LambdaJetReader {
    pub fn new(config: LambdaJetConfig) -> Self {
        let mut base = PluginBase::new("LambdaJetTreeReader");
        base.set_out_dir(&config.out_dir);
        Self {
            base,
            config,
            bank: None,
            totals: LambdaTotals::default(),
        }
    }
    pub fn base(&self) -> &PluginBase {
        &self.base
    }
    pub fn base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }
    pub fn totals(&self) -> LambdaTotals {
        self.totals
    }
    pub fn hist_1d(&self, var: Variable, ty: ObjectType) -> Option<&Hist1D> {
        Some(&self.bank.as_ref()?.hists_1d[ty.index()][var.index()])
    }
    pub fn hist_2d(&self, var: Variable, vs: Variable, ty: ObjectType) -> Option<&Hist2D> {
        let iv = Variable::VS.iter().position(|v| *v == vs)?;
        Some(&self.bank.as_ref()?.hists_2d[ty.index()][var.index()][iv])
    }
    pub fn event_hist(&self, count: EventCount) -> Option<&Hist1D> {
        Some(&self.bank.as_ref()?.events[count as usize])
    }

    fn is_good_jet(&self, jet: &TaggedJet) -> bool {
        jet.pt > self.config.pt_jet_min && jet.eta.abs() < self.config.eta_jet_max
    }
    fn is_good_lambda(&self, lambda: &LambdaCandidate) -> bool {
        lambda.pt > self.config.pt_lam_min && lambda.eta.abs() < self.config.eta_lam_max
    }
    fn is_leading_lambda(&self, lambda: &LambdaCandidate) -> bool {
        lambda.z > self.config.z_lead_min
    }

    pub fn init(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        self.base.init_output(store)?;
        self.bank = Some(HistBank::new());
        info!("initialized histograms");
        Ok(())
    }

    pub fn analyze<S>(&mut self, source: &S) -> Result<LambdaTotals, QaError>
    where
        S: EntrySource<Entry = LambdaJetEntry> + ?Sized,
    {
        self.base.begin_event()?;
        let mut bank = self
            .bank
            .take()
            .ok_or_else(|| self.base.lifecycle_error("process an event"))?;
        for_each_entry(source, "event loop", |entry| self.fill_event(&mut bank, &entry));
        self.bank = Some(bank);
        let totals = self.totals;
        info!(
            "nLambda = {}, nLeadLambda = {}, nJet = {}, nTaggedJets = {}, nLeadTagJets = {}",
            totals.n_lambda,
            totals.n_lead_lambda,
            totals.n_jet,
            totals.n_tagged_jet,
            totals.n_lead_tagged_jet
        );
        Ok(totals)
    }

    fn fill_event(&mut self, bank: &mut HistBank, entry: &LambdaJetEntry) {
        let top = entry
            .jets
            .iter()
            .filter(|jet| self.is_good_jet(jet))
            .fold(None, |top: Option<&TaggedJet>, jet| match top {
                Some(t) if t.pt >= jet.pt => Some(t),
                _ => Some(jet),
            });
        if let Some(top) = top {
            bank.fill(
                ObjectType::HighestPtJet,
                &Kinematics::new(top.eta, top.energy, top.pt, 0.0, 0.0, 0.0, 1.0),
            );
        }
        let relative_to_top = |eta: f64, phi: f64| {
            top.map_or((f64::NAN, f64::NAN), |t| (delta_phi(phi, t.phi), eta - t.eta))
        };

        let (mut n_lam, mut n_lead_lam) = (0, 0);
        for lambda in entry.lambdas.iter().filter(|l| self.is_good_lambda(l)) {
            let (df, dh) = relative_to_top(lambda.eta, lambda.phi);
            let kin = Kinematics::new(
                lambda.eta,
                lambda.energy,
                lambda.pt,
                df,
                dh,
                lambda.dr,
                lambda.z,
            );
            bank.fill(ObjectType::Lam, &kin);
            n_lam += 1;
            if self.is_leading_lambda(lambda) {
                bank.fill(ObjectType::LeadLam, &kin);
                n_lead_lam += 1;
            }
        }

        let (mut n_jet, mut n_tag_jet, mut n_lead_jet) = (0, 0, 0);
        for jet in entry.jets.iter().filter(|j| self.is_good_jet(j)) {
            let (df, dh) = relative_to_top(jet.eta, jet.phi);
            let kin = Kinematics::new(jet.eta, jet.energy, jet.pt, df, dh, 0.0, 1.0);
            bank.fill(ObjectType::Jet, &kin);
            n_jet += 1;
            if !jet.has_lambda {
                continue;
            }
            let associated: Vec<&LambdaCandidate> = entry
                .lambdas
                .iter()
                .filter(|l| i64::try_from(jet.id).is_ok_and(|id| id == i64::from(l.jet_id)))
                .collect();
            bank.fill_count(EventCount::LambdasInJet, associated.len() as u64);
            bank.fill(ObjectType::LamJet, &kin);
            n_tag_jet += 1;
            if associated.iter().any(|l| self.is_leading_lambda(l)) {
                bank.fill(ObjectType::LeadLamJet, &kin);
                n_lead_jet += 1;
            }
        }

        bank.fill_count(EventCount::Jets, n_jet);
        bank.fill_count(EventCount::TaggedJets, n_tag_jet);
        bank.fill_count(EventCount::LeadLambdaJets, n_lead_jet);
        bank.fill_count(EventCount::Lambdas, n_lam);
        bank.fill_count(EventCount::LeadLambdas, n_lead_lam);
        self.totals.n_lambda += n_lam;
        self.totals.n_lead_lambda += n_lead_lam;
        self.totals.n_jet += n_jet;
        self.totals.n_tagged_jet += n_tag_jet;
        self.totals.n_lead_tagged_jet += n_lead_jet;
        self.base.trace("filled event");
    }

    pub fn end(&mut self, store: &mut OutputStore) -> Result<(), QaError> {
        let bank = self
            .bank
            .take()
            .ok_or_else(|| self.base.lifecycle_error("finalize"))?;
        self.base.close_output(store, bank.into_objects())?;
        info!("finished lambda jet tree reader");
        Ok(())
    }
}

pub fn run_lambda_jets(config: LambdaJetConfig) -> Result<LambdaTotals, QaError> {
    //! Reads `config.input`, fills the bank and writes it to `config.output`.
    let input = RootInput::open(&config.input, &config.tree)?;
    let columns = LambdaJetColumns::read(&input)?;
    let mut store = OutputStore::new(&config.output);
    let mut reader = LambdaJetReader::new(config);
    reader.init(&mut store)?;
    let totals = reader.analyze(&columns)?;
    reader.end(&mut store)?;
    store.write()?;
    Ok(totals)
}
