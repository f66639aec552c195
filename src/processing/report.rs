//! Cut-flow report over a chain of named filters.

use std::fmt;

use serde::Serialize;

/// Pass statistics of one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CutInfo {
    pub name: String,
    /// Rows that passed this filter.
    pub pass: u64,
    /// Rows that reached this filter (passed every filter before it).
    pub all: u64,
}

impl CutInfo {
    /// Relative efficiency in percent; zero when no row reached the filter.
    pub fn efficiency(&self) -> f64 {
        percent(self.pass, self.all)
    }
}

/// Filters on the path from the source to a node, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CutFlowReport {
    pub cuts: Vec<CutInfo>,
}

impl CutFlowReport {
    pub fn new(cuts: Vec<CutInfo>) -> Self {
        Self { cuts }
    }

    /// Rows entering the first filter.
    pub fn total(&self) -> u64 {
        self.cuts.first().map(|c| c.all).unwrap_or(0)
    }

    /// Cumulative efficiency (percent) after filter `idx`, relative to the first filter's input.
    pub fn cumulative_efficiency(&self, idx: usize) -> Option<f64> {
        self.cuts.get(idx).map(|c| percent(c.pass, self.total()))
    }

    pub fn cut(&self, name: &str) -> Option<&CutInfo> {
        self.cuts.iter().find(|c| c.name == name)
    }

    /// Rows surviving every filter; zero when there are no filters.
    pub fn selected(&self) -> u64 {
        self.cuts.last().map(|c| c.pass).unwrap_or(0)
    }
}

fn percent(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64 * 100.0
    }
}

impl fmt::Display for CutFlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, cut) in self.cuts.iter().enumerate() {
            writeln!(
                f,
                "{:<10}: pass={:<10} all={:<10} -- eff={:.2} % cumulative eff={:.2} %",
                cut.name,
                cut.pass,
                cut.all,
                cut.efficiency(),
                self.cumulative_efficiency(idx).unwrap_or(0.0)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CutFlowReport, CutInfo};

    fn report() -> CutFlowReport {
        CutFlowReport::new(vec![
            CutInfo {
                name: "At least 1 cluster".to_string(),
                pass: 2,
                all: 4,
            },
            CutInfo {
                name: "At least 1 particle".to_string(),
                pass: 1,
                all: 2,
            },
        ])
    }

    #[test]
    fn efficiencies() {
        let r = report();
        assert_eq!(r.total(), 4);
        assert_eq!(r.selected(), 1);
        assert_eq!(r.cuts[1].efficiency(), 50.0);
        assert_eq!(r.cumulative_efficiency(1), Some(25.0));
        assert_eq!(r.cumulative_efficiency(2), None);
        assert_eq!(r.cut("At least 1 particle").map(|c| c.pass), Some(1));
    }

    #[test]
    fn display_has_one_line_per_cut() {
        let text = report().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("At least 1 cluster: pass=2"));
        assert!(lines[1].contains("eff=50.00 % cumulative eff=25.00 %"));
    }

    #[test]
    fn zero_input_does_not_divide_by_zero() {
        let r = CutFlowReport::new(vec![CutInfo {
            name: "x".to_string(),
            pass: 0,
            all: 0,
        }]);
        assert_eq!(r.cuts[0].efficiency(), 0.0);
        assert_eq!(r.cumulative_efficiency(0), Some(0.0));
        assert_eq!(CutFlowReport::default().selected(), 0);
    }
}
