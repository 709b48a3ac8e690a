use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use oxyroot::{Branch, ReaderTree, RootFile, WriterTree};
use tracing::{debug, info, warn};

use crate::error::QaError;
use crate::fit::WidthCurve;
use crate::hist::{Hist1D, Hist2D};
use crate::tuple::{Column, Tree, Tuple};

/// Anything a plugin can persist.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Hist1D(Hist1D),
    Hist2D(Hist2D),
    Tuple(Tuple),
    Tree(Tree),
    Function(WidthCurve),
}

impl Object {
    pub fn name(&self) -> &str {
        match self {
            Object::Hist1D(h) => h.name(),
            Object::Hist2D(h) => h.name(),
            Object::Tuple(t) => t.name(),
            Object::Tree(t) => t.name(),
            Object::Function(f) => &f.name,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Hist1D(_) => "TH1D",
            Object::Hist2D(_) => "TH2D",
            Object::Tuple(_) => "TNtuple",
            Object::Tree(_) => "TTree",
            Object::Function(_) => "TF1",
        }
    }
}

macro_rules! impl_into_object {
    ($($variant:ident => $t:ty),*) => {
        $(impl From<$t> for Object {
            fn from(value: $t) -> Self {
                Object::$variant(value)
            }
        })*
    };
}

impl_into_object!(Hist1D => Hist1D, Hist2D => Hist2D, Tuple => Tuple, Tree => Tree, Function => WidthCurve);

/// The single output file of a job, organized into one directory per plugin.
///
/// Objects are held in memory until [`OutputStore::write`], which persists every object as a
/// tree named `{directory}_{object}` (or just `{object}` at the top level):
///
/// - tuples and trees keep their own branches;
/// - 1-D histograms store every bin, including under/overflow, as `bin:low:up:content:sumw2`;
/// - 2-D histograms store their non-empty cells as `ix:iy:xlow:xup:ylow:yup:content:sumw2`;
/// - functions store `param:value:error:xmin:xmax`, one entry per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStore {
    path: PathBuf,
    dirs: IndexMap<String, IndexMap<String, Object>>,
}

impl OutputStore {
    pub const TOP: &'static str = "";

    pub fn new(path: impl AsRef<Path>) -> Self {
        let mut dirs = IndexMap::new();
        dirs.insert(Self::TOP.to_string(), IndexMap::new());
        Self {
            path: path.as_ref().to_path_buf(),
            dirs,
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn set_path(&mut self, path: impl AsRef<Path>) {
        self.path = path.as_ref().to_path_buf();
    }
    pub fn mkdir(&mut self, dir: &str) -> bool {
        //! Creates `dir` if it is missing. Returns whether it was created.
        if self.dirs.contains_key(dir) {
            return false;
        }
        self.dirs.insert(dir.to_string(), IndexMap::new());
        true
    }
    pub fn has_dir(&self, dir: &str) -> bool {
        self.dirs.contains_key(dir)
    }
    pub fn put(&mut self, dir: &str, object: impl Into<Object>) -> Result<(), QaError> {
        let object = object.into();
        self.mkdir(dir);
        let objects = self.dirs.entry(dir.to_string()).or_default();
        if objects.contains_key(object.name()) {
            return Err(QaError::ObjectExists {
                dir: dir.to_string(),
                object: object.name().to_string(),
            });
        }
        objects.insert(object.name().to_string(), object);
        Ok(())
    }
    pub fn get(&self, dir: &str, name: &str) -> Option<&Object> {
        self.dirs.get(dir)?.get(name)
    }
    pub fn objects(&self, dir: &str) -> impl Iterator<Item = &Object> {
        self.dirs.get(dir).into_iter().flat_map(|objects| objects.values())
    }
    pub fn n_objects(&self) -> usize {
        self.dirs.values().map(IndexMap::len).sum()
    }
    pub fn key(dir: &str, name: &str) -> String {
        if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}_{name}")
        }
    }

    pub fn write(&self) -> Result<(), QaError> {
        let path = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = RootFile::create(&self.path).map_err(|err| QaError::Write {
            object: path.clone(),
            path: path.clone(),
            reason: err.to_string(),
        })?;
        for (dir, objects) in &self.dirs {
            for object in objects.values() {
                let key = Self::key(dir, object.name());
                debug!("writing {} {key}", object.kind());
                write_object(&mut file, &key, object).map_err(|reason| QaError::Write {
                    object: key.clone(),
                    path: path.clone(),
                    reason,
                })?;
            }
        }
        file.close().map_err(|err| QaError::Write {
            object: path.clone(),
            path: path.clone(),
            reason: err.to_string(),
        })?;
        info!("wrote {} objects to {path}", self.n_objects());
        Ok(())
    }
}

fn write_object(file: &mut RootFile, key: &str, object: &Object) -> Result<(), String> {
    let mut tree = WriterTree::new(key);
    match object {
        Object::Tuple(tuple) => {
            for (leaf, values) in tuple.columns() {
                tree.new_branch(leaf.to_string(), values.into_iter());
            }
        }
        Object::Tree(source) => {
            for (branch, column) in source.columns() {
                match column {
                    Column::Scalar(values) => {
                        tree.new_branch(branch.to_string(), values.clone().into_iter())
                    }
                    Column::Vector(values) => {
                        tree.new_branch(branch.to_string(), values.clone().into_iter())
                    }
                }
            }
        }
        Object::Hist1D(hist) => {
            let axis = *hist.axis();
            let bins: Vec<(usize, f64, f64)> = hist.iter_bins().collect();
            let low = |bin: usize| match bin {
                0 => f64::NEG_INFINITY,
                _ => axis.bin_low_edge(bin),
            };
            let up = |bin: usize| match bin {
                b if b > axis.n_bins => f64::INFINITY,
                _ => axis.bin_up_edge(bin),
            };
            tree.new_branch("bin".to_string(), column(&bins, |b| b.0 as i32));
            tree.new_branch("low".to_string(), column(&bins, |b| low(b.0)));
            tree.new_branch("up".to_string(), column(&bins, |b| up(b.0)));
            tree.new_branch("content".to_string(), column(&bins, |b| b.1));
            tree.new_branch("sumw2".to_string(), column(&bins, |b| b.2));
        }
        Object::Hist2D(hist) => {
            let (x, y) = (*hist.x_axis(), *hist.y_axis());
            let cells: Vec<(usize, usize, f64, f64)> =
                hist.iter_bins().filter(|cell| cell.2 != 0.0).collect();
            tree.new_branch("ix".to_string(), column(&cells, |c| c.0 as i32));
            tree.new_branch("iy".to_string(), column(&cells, |c| c.1 as i32));
            tree.new_branch("xlow".to_string(), column(&cells, |c| x.bin_low_edge(c.0)));
            tree.new_branch("xup".to_string(), column(&cells, |c| x.bin_up_edge(c.0)));
            tree.new_branch("ylow".to_string(), column(&cells, |c| y.bin_low_edge(c.1)));
            tree.new_branch("yup".to_string(), column(&cells, |c| y.bin_up_edge(c.1)));
            tree.new_branch("content".to_string(), column(&cells, |c| c.2));
            tree.new_branch("sumw2".to_string(), column(&cells, |c| c.3));
        }
        Object::Function(curve) => {
            let n = curve.params.len();
            tree.new_branch("param".to_string(), (0..n as i32).collect::<Vec<_>>().into_iter());
            tree.new_branch("value".to_string(), curve.params.clone().into_iter());
            tree.new_branch("error".to_string(), curve.errors.clone().into_iter());
            tree.new_branch("xmin".to_string(), vec![curve.range.0; n].into_iter());
            tree.new_branch("xmax".to_string(), vec![curve.range.1; n].into_iter());
        }
    }
    tree.write(file).map_err(|err| err.to_string())
}

fn column<R, T>(rows: &[R], f: impl Fn(&R) -> T) -> std::vec::IntoIter<T> {
    rows.iter().map(f).collect::<Vec<T>>().into_iter()
}

/// Branch types the input readers know how to load.
pub trait ReadColumn: Sized {
    const TYPE_NAME: &'static str;
    fn read_column(branch: &Branch) -> Result<Vec<Self>, String>;
}

macro_rules! impl_read_column {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(impl ReadColumn for $t {
            const TYPE_NAME: &'static str = $name;
            fn read_column(branch: &Branch) -> Result<Vec<Self>, String> {
                branch
                    .as_iter::<$t>()
                    .map(|values| values.collect())
                    .map_err(|err| err.to_string())
            }
        })*
    };
}

impl_read_column!(
    f32 => "float",
    f64 => "double",
    i32 => "int",
    Vec<i32> => "vector<int>",
    Vec<u64> => "vector<uint64_t>",
    Vec<bool> => "vector<bool>",
    Vec<f64> => "vector<double>",
    Vec<Vec<i32>> => "vector<vector<int>>",
    Vec<Vec<f64>> => "vector<vector<double>>",
);

/// A named tree in an input file, read column by column.
pub struct RootInput {
    path: String,
    name: String,
    tree: ReaderTree,
}

impl RootInput {
    pub fn open(path: impl AsRef<Path>, tree_name: &str) -> Result<Self, QaError> {
        let path = path.as_ref().display().to_string();
        let mut file = RootFile::open(&path).map_err(|err| QaError::OpenInput {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let tree = file
            .get_tree(tree_name)
            .map_err(|_| QaError::MissingObject {
                kind: "tree",
                name: tree_name.to_string(),
                path: path.clone(),
            })?;
        info!("opened tree {tree_name} in {path}");
        Ok(Self {
            path,
            name: tree_name.to_string(),
            tree,
        })
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn column<T: ReadColumn>(&self, branch: &str) -> Result<Vec<T>, QaError> {
        let found = self
            .tree
            .branch(branch)
            .ok_or_else(|| QaError::MissingObject {
                kind: "branch",
                name: branch.to_string(),
                path: format!("{}:{}", self.path, self.name),
            })?;
        T::read_column(found).map_err(|reason| QaError::BranchType {
            branch: branch.to_string(),
            expected: T::TYPE_NAME,
            reason,
        })
    }
}

/// Random access to the entries of an input, however they are stored.
pub trait EntrySource {
    type Entry;
    fn n_entries(&self) -> usize;
    /// Entry `index`, or `None` if it cannot be read.
    fn entry(&self, index: usize) -> Option<Self::Entry>;
}

impl<E: Clone> EntrySource for [E] {
    type Entry = E;
    fn n_entries(&self) -> usize {
        self.len()
    }
    fn entry(&self, index: usize) -> Option<E> {
        self.get(index).cloned()
    }
}

pub fn for_each_entry<S: EntrySource + ?Sized>(
    source: &S,
    label: &str,
    mut f: impl FnMut(S::Entry),
) -> usize {
    //! Feeds every entry of `source` to `f` in order and returns how many were processed.
    //!
    //! The loop stops at the first entry that cannot be read; what was processed before it
    //! stays processed.
    let n_entries = source.n_entries();
    info!("starting {label}: {n_entries} entries to process");
    for index in 0..n_entries {
        match source.entry(index) {
            Some(entry) => f(entry),
            None => {
                warn!("issue with entry {index}, aborting {label}");
                return index;
            }
        }
    }
    info!("finished {label}");
    n_entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist::Axis;

    struct Ragged(Vec<Option<u32>>);

    impl EntrySource for Ragged {
        type Entry = u32;
        fn n_entries(&self) -> usize {
            self.0.len()
        }
        fn entry(&self, index: usize) -> Option<u32> {
            self.0[index]
        }
    }

    #[test]
    fn entry_loop_stops_at_first_bad_entry() {
        let mut seen = Vec::new();
        let source = Ragged(vec![Some(1), Some(2), None, Some(4)]);
        assert_eq!(for_each_entry(&source, "test loop", |e| seen.push(e)), 2);
        assert_eq!(seen, vec![1, 2]);
        let entries = [5, 6];
        assert_eq!(for_each_entry(&entries[..], "test loop", |_| ()), 2);
    }

    #[test]
    fn objects_are_filed_per_directory() {
        let mut store = OutputStore::new("unused.root");
        assert!(store.mkdir("TrackQA"));
        assert!(!store.mkdir("TrackQA"));
        store
            .put("TrackQA", Hist1D::new("hPt", "", Axis::new(10, 0.0, 10.0)))
            .unwrap();
        assert!(matches!(
            store.put("TrackQA", Hist1D::new("hPt", "", Axis::new(1, 0.0, 1.0))),
            Err(QaError::ObjectExists { .. })
        ));
        store
            .put(OutputStore::TOP, Hist1D::new("hPt", "", Axis::new(1, 0.0, 1.0)))
            .unwrap();
        assert_eq!(store.n_objects(), 2);
        assert_eq!(store.objects("TrackQA").count(), 1);
        assert_eq!(OutputStore::key("TrackQA", "hPt"), "TrackQA_hPt");
        assert_eq!(OutputStore::key(OutputStore::TOP, "hPt"), "hPt");
    }
}
