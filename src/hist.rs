use serde::{Deserialize, Serialize};

/// Fixed-width binning. Bin `0` is the underflow and bin `n_bins + 1` the overflow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub n_bins: usize,
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub fn new(n_bins: usize, min: f64, max: f64) -> Self {
        Self { n_bins, min, max }
    }
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.n_bins as f64
    }
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.min {
            0
        } else if x >= self.max {
            self.n_bins + 1
        } else {
            (((x - self.min) / self.bin_width()) as usize + 1).min(self.n_bins)
        }
    }
    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 1.0) * self.bin_width()
    }
    pub fn bin_up_edge(&self, bin: usize) -> f64 {
        self.bin_low_edge(bin + 1)
    }
    pub fn bin_center(&self, bin: usize) -> f64 {
        self.bin_low_edge(bin) + 0.5 * self.bin_width()
    }
    pub fn bins(&self) -> std::ops::RangeInclusive<usize> {
        //! The in-range bins, `1..=n_bins`.
        1..=self.n_bins
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1D {
    name: String,
    title: String,
    axis: Axis,
    content: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
}

impl Hist1D {
    pub fn new(name: &str, title: &str, axis: Axis) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            content: vec![0.0; axis.n_bins + 2],
            sumw2: vec![0.0; axis.n_bins + 2],
            axis,
            entries: 0,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn axis(&self) -> &Axis {
        &self.axis
    }
    pub fn entries(&self) -> u64 {
        self.entries
    }
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }
    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        //! Adds `w` to the bin containing `x`. A non-finite `x` is dropped.
        if !x.is_finite() {
            return;
        }
        let bin = self.axis.find_bin(x);
        self.content[bin] += w;
        self.sumw2[bin] += w * w;
        self.entries += 1;
    }
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.content[bin]
    }
    pub fn bin_error(&self, bin: usize) -> f64 {
        self.sumw2[bin].sqrt()
    }
    pub fn sumw2(&self, bin: usize) -> f64 {
        self.sumw2[bin]
    }
    pub fn set_bin(&mut self, bin: usize, content: f64, error: f64) {
        self.content[bin] = content;
        self.sumw2[bin] = error * error;
    }
    pub fn set_entries(&mut self, entries: u64) {
        self.entries = entries;
    }
    pub fn underflow(&self) -> f64 {
        self.content[0]
    }
    pub fn overflow(&self) -> f64 {
        self.content[self.axis.n_bins + 1]
    }
    pub fn integral(&self) -> f64 {
        self.axis.bins().map(|i| self.content[i]).sum()
    }
    pub fn mean(&self) -> f64 {
        let total = self.integral();
        if total == 0.0 {
            return 0.0;
        }
        self.axis
            .bins()
            .map(|i| self.content[i] * self.axis.bin_center(i))
            .sum::<f64>()
            / total
    }
    pub fn std_dev(&self) -> f64 {
        let total = self.integral();
        if total == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .axis
            .bins()
            .map(|i| self.content[i] * (self.axis.bin_center(i) - mean).powi(2))
            .sum::<f64>()
            / total;
        var.sqrt()
    }
    pub fn maximum(&self) -> f64 {
        self.axis
            .bins()
            .map(|i| self.content[i])
            .fold(f64::NEG_INFINITY, f64::max)
    }
    pub fn find_first_bin_above(&self, threshold: f64) -> Option<usize> {
        self.axis.bins().find(|&i| self.content[i] > threshold)
    }
    pub fn find_last_bin_above(&self, threshold: f64) -> Option<usize> {
        self.axis.bins().rev().find(|&i| self.content[i] > threshold)
    }
    pub fn iter_bins(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        //! Yields `(bin, content, sumw2)` for every bin including under/overflow.
        (0..self.content.len()).map(|i| (i, self.content[i], self.sumw2[i]))
    }
}

/// Two-dimensional histogram.
///
/// Squared weights are only stored once a non-unit weight is filled; until then bin errors
/// are $`\sqrt{N}`$.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    name: String,
    title: String,
    x_axis: Axis,
    y_axis: Axis,
    content: Vec<f64>,
    sumw2: Option<Vec<f64>>,
    entries: u64,
}

impl Hist2D {
    pub fn new(name: &str, title: &str, x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            content: vec![0.0; (x_axis.n_bins + 2) * (y_axis.n_bins + 2)],
            sumw2: None,
            x_axis,
            y_axis,
            entries: 0,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }
    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }
    pub fn entries(&self) -> u64 {
        self.entries
    }
    fn index(&self, ix: usize, iy: usize) -> usize {
        iy * (self.x_axis.n_bins + 2) + ix
    }
    pub fn fill(&mut self, x: f64, y: f64) {
        self.fill_weighted(x, y, 1.0);
    }
    pub fn fill_weighted(&mut self, x: f64, y: f64, w: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let bin = self.index(self.x_axis.find_bin(x), self.y_axis.find_bin(y));
        if w != 1.0 && self.sumw2.is_none() {
            self.sumw2 = Some(self.content.clone());
        }
        self.content[bin] += w;
        if let Some(sumw2) = self.sumw2.as_mut() {
            sumw2[bin] += w * w;
        }
        self.entries += 1;
    }
    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        self.content[self.index(ix, iy)]
    }
    pub fn sumw2(&self, ix: usize, iy: usize) -> f64 {
        let bin = self.index(ix, iy);
        self.sumw2
            .as_ref()
            .map_or(self.content[bin], |sumw2| sumw2[bin])
    }
    pub fn bin_error(&self, ix: usize, iy: usize) -> f64 {
        self.sumw2(ix, iy).sqrt()
    }
    pub fn integral(&self) -> f64 {
        self.x_axis
            .bins()
            .flat_map(|ix| self.y_axis.bins().map(move |iy| (ix, iy)))
            .map(|(ix, iy)| self.bin_content(ix, iy))
            .sum()
    }
    pub fn maximum(&self) -> f64 {
        self.x_axis
            .bins()
            .flat_map(|ix| self.y_axis.bins().map(move |iy| (ix, iy)))
            .map(|(ix, iy)| self.bin_content(ix, iy))
            .fold(f64::NEG_INFINITY, f64::max)
    }
    fn column_above(&self, ix: usize, threshold: f64) -> bool {
        self.y_axis
            .bins()
            .any(|iy| self.bin_content(ix, iy) > threshold)
    }
    pub fn find_first_x_bin_above(&self, threshold: f64) -> Option<usize> {
        //! First x bin holding any in-range cell above `threshold`.
        self.x_axis
            .bins()
            .find(|&ix| self.column_above(ix, threshold))
    }
    pub fn find_last_x_bin_above(&self, threshold: f64) -> Option<usize> {
        self.x_axis
            .bins()
            .rev()
            .find(|&ix| self.column_above(ix, threshold))
    }
    pub fn projection_y(&self, name: &str, ix_first: usize, ix_last: usize) -> Hist1D {
        //! Sums x bins `ix_first..=ix_last` into a histogram along y.
        let mut proj = Hist1D::new(name, &self.title, self.y_axis);
        let mut entries = 0.0;
        for iy in 0..self.y_axis.n_bins + 2 {
            let (content, sumw2) = (ix_first..=ix_last).fold((0.0, 0.0), |(c, s), ix| {
                (c + self.bin_content(ix, iy), s + self.sumw2(ix, iy))
            });
            entries += content;
            proj.set_bin(iy, content, sumw2.sqrt());
        }
        proj.set_entries(entries.round() as u64);
        proj
    }
    pub fn iter_bins(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        //! Yields `(ix, iy, content, sumw2)` for every cell including under/overflow.
        let nx = self.x_axis.n_bins + 2;
        (0..self.content.len()).map(move |i| {
            let (ix, iy) = (i % nx, i / nx);
            (ix, iy, self.content[i], self.sumw2(ix, iy))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn axis_edges_follow_half_open_bins() {
        let axis = Axis::new(10, 0.0, 10.0);
        assert_eq!(axis.find_bin(-0.1), 0);
        assert_eq!(axis.find_bin(0.0), 1);
        assert_eq!(axis.find_bin(9.999), 10);
        assert_eq!(axis.find_bin(10.0), 11);
        assert_relative_eq!(axis.bin_center(1), 0.5);
    }

    #[test]
    fn one_dimensional_moments_and_flows() {
        let mut h = Hist1D::new("h", "", Axis::new(4, 0.0, 4.0));
        for x in [0.5, 1.5, 1.5, 2.5, 7.0, f64::NAN] {
            h.fill(x);
        }
        assert_eq!(h.entries(), 5);
        assert_relative_eq!(h.overflow(), 1.0);
        assert_relative_eq!(h.integral(), 4.0);
        assert_relative_eq!(h.mean(), 1.5);
        assert_eq!(h.find_first_bin_above(0.0), Some(1));
        assert_eq!(h.find_last_bin_above(1.0), Some(2));
    }

    #[test]
    fn infinite_fills_are_dropped() {
        let mut h = Hist1D::new("h", "", Axis::new(10, 0.0, 5.0));
        h.fill(f64::INFINITY);
        h.fill(f64::NEG_INFINITY);
        assert_eq!(h.entries(), 0);
        assert_relative_eq!(h.overflow(), 0.0);
        assert_relative_eq!(h.underflow(), 0.0);

        let mut h2 = Hist2D::new("h2", "", Axis::new(2, 0.0, 2.0), Axis::new(2, 0.0, 2.0));
        h2.fill(f64::INFINITY, 0.5);
        h2.fill(0.5, f64::NEG_INFINITY);
        h2.fill(0.5, 0.5);
        assert_eq!(h2.entries(), 1);
        assert_relative_eq!(h2.bin_content(3, 1), 0.0);
        assert_relative_eq!(h2.bin_content(1, 0), 0.0);
    }

    #[test]
    fn projections_keep_errors() {
        let mut h = Hist2D::new("h", "", Axis::new(2, 0.0, 2.0), Axis::new(2, 0.0, 2.0));
        h.fill(0.5, 0.5);
        h.fill(1.5, 0.5);
        h.fill_weighted(1.5, 1.5, 2.0);
        let proj = h.projection_y("p", 1, 2);
        assert_relative_eq!(proj.bin_content(1), 2.0);
        assert_relative_eq!(proj.bin_content(2), 2.0);
        assert_relative_eq!(proj.bin_error(2), 2.0);
        assert_eq!(h.find_first_x_bin_above(0.0), Some(1));
        assert_eq!(h.find_last_x_bin_above(1.0), Some(2));
    }
}
