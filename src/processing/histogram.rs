//! Fixed-binning 1D and 3D histograms.
//!
//! Bin numbering follows the ROOT convention: bin `0` is the underflow, bins `1..=nbins` cover
//! `[low, high)` and bin `nbins + 1` is the overflow. NaN lands in the overflow bin.
//!
//! Filling is commutative and associative, so histograms filled on disjoint row partitions can be
//! combined with [`Hist1D::merge`] / [`Hist3D::merge`] in any order.

use serde::Serialize;

/// A uniformly binned axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Axis {
    pub nbins: usize,
    pub low: f64,
    pub high: f64,
}

impl Axis {
    /// # Panics
    ///
    /// Panics if `nbins == 0` or `low >= high`.
    pub fn new(nbins: usize, low: f64, high: f64) -> Self {
        assert!(nbins > 0, "axis must have at least one bin");
        assert!(low < high, "axis low edge must be below high edge");
        Self { nbins, low, high }
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.nbins as f64
    }

    /// Bin index including the underflow (0) and overflow (`nbins + 1`) bins.
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.low {
            0
        } else if !(x < self.high) {
            self.nbins + 1
        } else {
            let bin = ((x - self.low) / self.bin_width()) as usize + 1;
            // Rounding can push values just below `high` onto the overflow edge.
            bin.min(self.nbins)
        }
    }

    fn in_range(&self, bin: usize) -> bool {
        bin >= 1 && bin <= self.nbins
    }

    /// Number of storage cells, flow bins included.
    fn cells(&self) -> usize {
        self.nbins + 2
    }
}

/// Booking parameters of a 1D histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistModel1D {
    pub name: String,
    /// ROOT-style title: `"title;x label;y label"`.
    pub title: String,
    pub x: Axis,
}

impl HistModel1D {
    pub fn new(name: impl Into<String>, title: impl Into<String>, nbins: usize, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x: Axis::new(nbins, low, high),
        }
    }
}

/// Booking parameters of a 3D histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistModel3D {
    pub name: String,
    pub title: String,
    pub x: Axis,
    pub y: Axis,
    pub z: Axis,
}

impl HistModel3D {
    pub fn new(name: impl Into<String>, title: impl Into<String>, x: Axis, y: Axis, z: Axis) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x,
            y,
            z,
        }
    }
}

/// One-dimensional histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist1D {
    pub name: String,
    pub title: String,
    pub x: Axis,
    /// Bin contents, `nbins + 2` cells with under/overflow.
    pub contents: Vec<f64>,
    /// Number of fill calls, flow bins included.
    pub entries: u64,
    sum_w: f64,
    sum_wx: f64,
    sum_wx2: f64,
}

impl Hist1D {
    pub fn new(model: &HistModel1D) -> Self {
        Self {
            name: model.name.clone(),
            title: model.title.clone(),
            x: model.x,
            contents: vec![0.0; model.x.cells()],
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
            sum_wx2: 0.0,
        }
    }

    pub fn fill(&mut self, x: f64) {
        let bin = self.x.find_bin(x);
        self.contents[bin] += 1.0;
        self.entries += 1;
        if self.x.in_range(bin) {
            self.sum_w += 1.0;
            self.sum_wx += x;
            self.sum_wx2 += x * x;
        }
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    pub fn underflow(&self) -> f64 {
        self.contents[0]
    }

    pub fn overflow(&self) -> f64 {
        self.contents[self.x.nbins + 1]
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.contents[1..=self.x.nbins].iter().sum()
    }

    /// Mean of the in-range fills, `None` when nothing was filled in range.
    pub fn mean(&self) -> Option<f64> {
        (self.sum_w != 0.0).then(|| self.sum_wx / self.sum_w)
    }

    /// Add another histogram's contents into this one.
    ///
    /// # Panics
    ///
    /// Panics if the binning differs.
    pub fn merge(&mut self, other: &Hist1D) {
        assert_eq!(self.x, other.x, "cannot merge histograms with different binning");
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        self.entries += other.entries;
        self.sum_w += other.sum_w;
        self.sum_wx += other.sum_wx;
        self.sum_wx2 += other.sum_wx2;
    }
}

/// Three-dimensional histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist3D {
    pub name: String,
    pub title: String,
    pub x: Axis,
    pub y: Axis,
    pub z: Axis,
    /// Bin contents in x-fastest order, `(nx + 2) * (ny + 2) * (nz + 2)` cells.
    pub contents: Vec<f64>,
    pub entries: u64,
}

impl Hist3D {
    pub fn new(model: &HistModel3D) -> Self {
        let cells = model.x.cells() * model.y.cells() * model.z.cells();
        Self {
            name: model.name.clone(),
            title: model.title.clone(),
            x: model.x,
            y: model.y,
            z: model.z,
            contents: vec![0.0; cells],
            entries: 0,
        }
    }

    /// Global cell index of `(bx, by, bz)`, flow bins included.
    pub fn bin(&self, bx: usize, by: usize, bz: usize) -> usize {
        bx + self.x.cells() * (by + self.y.cells() * bz)
    }

    pub fn fill(&mut self, x: f64, y: f64, z: f64) {
        let idx = self.bin(self.x.find_bin(x), self.y.find_bin(y), self.z.find_bin(z));
        self.contents[idx] += 1.0;
        self.entries += 1;
    }

    pub fn bin_content(&self, bx: usize, by: usize, bz: usize) -> f64 {
        self.contents
            .get(self.bin(bx, by, bz))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sum of cells that are in range on all three axes.
    pub fn integral(&self) -> f64 {
        let mut total = 0.0;
        for bz in 1..=self.z.nbins {
            for by in 1..=self.y.nbins {
                let start = self.bin(1, by, bz);
                total += self.contents[start..start + self.x.nbins].iter().sum::<f64>();
            }
        }
        total
    }

    /// # Panics
    ///
    /// Panics if the binning differs.
    pub fn merge(&mut self, other: &Hist3D) {
        assert!(
            self.x == other.x && self.y == other.y && self.z == other.z,
            "cannot merge histograms with different binning"
        );
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        self.entries += other.entries;
    }
}
