use indexmap::IndexMap;
use itertools::Itertools;

use crate::error::QaError;

/// Conversion of a record field into a tuple leaf value.
pub trait LeafValue {
    fn leaf_value(&self) -> f64;
}

macro_rules! impl_leaf_value {
    ($($t:ty),*) => {
        $(impl LeafValue for $t {
            fn leaf_value(&self) -> f64 {
                *self as f64
            }
        })*
    };
}

impl_leaf_value!(f64, f32, i32, i64, u8, u32, u64, usize);

impl LeafValue for bool {
    fn leaf_value(&self) -> f64 {
        if *self {
            1.0
        } else {
            0.0
        }
    }
}

/// A record that flattens into one row of named tuple leaves.
///
/// Names and values must come out in the same order. The [`leaves!`](crate::leaves) macro
/// generates both from a single field list, which is the preferred way to implement this.
pub trait Leaves {
    fn leaf_names() -> Vec<String>;
    fn leaf_values(&self) -> Vec<f64>;

    fn prefixed_leaf_names(prefix: &str) -> Vec<String> {
        Self::leaf_names()
            .into_iter()
            .map(|name| format!("{prefix}{name}"))
            .collect()
    }
    fn n_leaves() -> usize {
        Self::leaf_names().len()
    }
}

/// Declares a plain record and its [`Leaves`] implementation from one field list.
///
/// ```
/// use correlator_qa::leaves;
/// use correlator_qa::tuple::Leaves;
///
/// leaves! {
///     #[derive(Debug, Default)]
///     pub struct Point {
///         pub x: f64 => "x",
///         pub n: u32 => "nhit",
///     }
/// }
///
/// assert_eq!(Point::leaf_names(), vec!["x", "nhit"]);
/// assert_eq!(Point { x: 1.5, n: 2 }.leaf_values(), vec![1.5, 2.0]);
/// ```
#[macro_export]
macro_rules! leaves {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty => $leaf:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($(#[$fmeta])* $fvis $field: $ty),*
        }

        impl $crate::tuple::Leaves for $name {
            fn leaf_names() -> Vec<String> {
                vec![$($leaf.to_string()),*]
            }
            fn leaf_values(&self) -> Vec<f64> {
                vec![$($crate::tuple::LeafValue::leaf_value(&self.$field)),*]
            }
        }
    };
}

/// Joins leaf names into the colon-separated list form.
pub fn flatten_leaf_list(leaves: &[String]) -> String {
    leaves.join(":")
}

/// Leaf names of a pair of `R` records, interleaved as `x_a, x_b, y_a, y_b, ...`.
pub fn interleaved_leaf_names<R: Leaves>() -> Vec<String> {
    R::leaf_names()
        .into_iter()
        .flat_map(|name| [format!("{name}_a"), format!("{name}_b")])
        .collect()
}

pub fn interleaved_leaf_values<R: Leaves>(a: &R, b: &R) -> Vec<f64> {
    a.leaf_values()
        .into_iter()
        .interleave(b.leaf_values())
        .collect()
}

/// A flat n-tuple: fixed, ordered leaves of single-precision values, one row per fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    name: String,
    title: String,
    leaves: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl Tuple {
    pub fn new(name: &str, title: &str, leaves: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            leaves,
            rows: Vec::new(),
        }
    }
    pub fn for_row<R: Leaves>(name: &str, title: &str) -> Self {
        //! Creates a tuple whose leaves are those of the record type `R`.
        Self::new(name, title, R::leaf_names())
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }
    pub fn leaf_list(&self) -> String {
        flatten_leaf_list(&self.leaves)
    }
    pub fn n_entries(&self) -> usize {
        self.rows.len()
    }
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }
    pub fn fill(&mut self, values: &[f64]) -> Result<(), QaError> {
        if values.len() != self.leaves.len() {
            return Err(QaError::RowWidth {
                tuple: self.name.clone(),
                n_leaves: self.leaves.len(),
                row_width: values.len(),
            });
        }
        self.rows.push(values.iter().map(|v| *v as f32).collect());
        Ok(())
    }
    pub fn fill_row<R: Leaves>(&mut self, row: &R) -> Result<(), QaError> {
        self.fill(&row.leaf_values())
    }
    pub fn column(&self, leaf: &str) -> Option<Vec<f32>> {
        let index = self.leaves.iter().position(|l| l == leaf)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
    pub fn columns(&self) -> impl Iterator<Item = (&str, Vec<f32>)> + '_ {
        self.leaves
            .iter()
            .enumerate()
            .map(move |(i, leaf)| (leaf.as_str(), self.rows.iter().map(|r| r[i]).collect()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Scalar(Vec<f64>),
    Vector(Vec<Vec<f64>>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Vector(v) => v.len(),
        }
    }
}

/// A tree with one entry per fill, holding scalar branches and variable-length vector branches.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    name: String,
    title: String,
    columns: IndexMap<String, Column>,
    n_scalars: usize,
}

impl Tree {
    pub fn new(name: &str, title: &str, scalars: Vec<String>, vectors: Vec<String>) -> Self {
        let n_scalars = scalars.len();
        let mut columns = IndexMap::new();
        for branch in scalars {
            columns.insert(branch, Column::Scalar(Vec::new()));
        }
        for branch in vectors {
            columns.insert(branch, Column::Vector(Vec::new()));
        }
        Self {
            name: name.to_string(),
            title: title.to_string(),
            columns,
            n_scalars,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn n_entries(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }
    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
    pub fn column(&self, branch: &str) -> Option<&Column> {
        self.columns.get(branch)
    }
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn fill(&mut self, scalars: &[f64], vectors: Vec<Vec<f64>>) -> Result<(), QaError> {
        //! Appends one entry. Scalars and vectors are matched to branches in declaration order.
        let n_vectors = self.columns.len() - self.n_scalars;
        if scalars.len() != self.n_scalars || vectors.len() != n_vectors {
            return Err(QaError::RowWidth {
                tuple: self.name.clone(),
                n_leaves: self.columns.len(),
                row_width: scalars.len() + vectors.len(),
            });
        }
        let mut scalars = scalars.iter();
        let mut vectors = vectors.into_iter();
        for column in self.columns.values_mut() {
            match column {
                Column::Scalar(values) => values.extend(scalars.next().copied()),
                Column::Vector(values) => values.extend(vectors.next()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    leaves! {
        #[derive(Debug, Default)]
        struct Probe {
            id: u32 => "id",
            pt: f64 => "pt",
            is_good: bool => "isgood",
        }
    }

    #[test]
    fn leaf_names_and_values_line_up() {
        let probe = Probe {
            id: 7,
            pt: 2.5,
            is_good: true,
        };
        assert_eq!(Probe::leaf_names(), vec!["id", "pt", "isgood"]);
        assert_eq!(probe.leaf_values(), vec![7.0, 2.5, 1.0]);
        assert_eq!(Probe::prefixed_leaf_names("a_")[1], "a_pt");
        assert_eq!(
            interleaved_leaf_names::<Probe>()[..3],
            ["id_a", "id_b", "pt_a"]
        );
        let other = Probe {
            id: 8,
            ..Default::default()
        };
        assert_eq!(
            interleaved_leaf_values(&probe, &other),
            vec![7.0, 8.0, 2.5, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn tuple_rejects_rows_of_the_wrong_width() {
        let mut tuple = Tuple::for_row::<Probe>("ntProbe", "Probe");
        assert_eq!(tuple.leaf_list(), "id:pt:isgood");
        assert!(tuple.fill_row(&Probe::default()).is_ok());
        assert!(matches!(
            tuple.fill(&[1.0, 2.0]),
            Err(QaError::RowWidth { row_width: 2, .. })
        ));
        assert_eq!(tuple.n_entries(), 1);
        assert_eq!(tuple.column("pt"), Some(vec![0.0]));
    }

    #[test]
    fn tree_keeps_jagged_branches_aligned() {
        let mut tree = Tree::new("tProbe", "", vec!["n".into()], vec!["ene".into()]);
        tree.fill(&[2.0], vec![vec![1.0, 2.0]]).unwrap();
        tree.fill(&[0.0], vec![vec![]]).unwrap();
        assert_eq!(tree.n_entries(), 2);
        assert_eq!(
            tree.column("ene"),
            Some(&Column::Vector(vec![vec![1.0, 2.0], vec![]]))
        );
        assert!(tree.fill(&[], vec![]).is_err());
    }
}
