//! Sex-independent rates.
//!
//! The dataset reports crude rates and standardised incidence ratios separately for females and
//! males. To compare sites that affect one sex much more than the other, we combine the two
//! strata into one value, weighting each by its incidence count:
//!
//! ```text
//! combined = (count_f * rate_f + count_m * rate_m) / (count_f + count_m)
//! ```
//!
//! The `All` rows are not used, since they are zero for single-sex sites. When both counts are
//! zero there is nothing to weight by and the value is missing.
use crate::{ArcStr, Range, SiteRecord, Year};
use noisy_float::prelude::*;
use qu::ick_use::*;
use serde::Serialize;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    fmt,
};
use term_data_table as tdt;

/// The per-sex rates that can be combined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CrudeRate,
    StandardisedIncidenceRatio,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::CrudeRate, Metric::StandardisedIncidenceRatio];

    fn value(self, rec: &crate::IncidenceRecord) -> f64 {
        match self {
            Metric::CrudeRate => rec.crude_rate,
            Metric::StandardisedIncidenceRatio => rec.standardised_incidence_ratio,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Metric::CrudeRate => f.write_str("Crude rate"),
            Metric::StandardisedIncidenceRatio => f.write_str("SIR"),
        }
    }
}

/// Incidence-weighted mean of `(count, rate)` pairs, or `None` if all counts are zero.
pub fn combine(strata: impl IntoIterator<Item = (u32, f64)>) -> Option<f64> {
    let (weight, weighted) = strata
        .into_iter()
        .fold((0u64, 0f64), |(weight, weighted), (count, rate)| {
            (weight + u64::from(count), weighted + f64::from(count) * rate)
        });
    if weight == 0 {
        None
    } else {
        Some(weighted / weight as f64)
    }
}

/// One combined value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustedRate {
    pub year: Year,
    pub site: ArcStr,
    pub metric: Metric,
    /// Missing when neither sex had any cases.
    pub value: Option<f64>,
}

/// Combined rates for every canonical site and year, ordered by site (first appearance), year,
/// then metric.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedRateSeries {
    els: Vec<AdjustedRate>,
}

impl AdjustedRateSeries {
    pub fn from_records(records: &[SiteRecord]) -> Self {
        let mut site_pos: HashMap<ArcStr, usize> = HashMap::new();
        let mut sites: Vec<ArcStr> = vec![];
        let mut cells: BTreeMap<(usize, Year), Vec<&crate::IncidenceRecord>> = BTreeMap::new();
        for rec in records
            .iter()
            .filter(|rec| rec.is_canonical && rec.record.sex.is_stratum())
        {
            let pos = *site_pos.entry(rec.site.clone()).or_insert_with(|| {
                sites.push(rec.site.clone());
                sites.len() - 1
            });
            cells
                .entry((pos, rec.record.year))
                .or_default()
                .push(&rec.record);
        }

        let mut els = Vec::with_capacity(cells.len() * Metric::ALL.len());
        for ((pos, year), strata) in cells {
            for metric in Metric::ALL {
                let value = combine(
                    strata
                        .iter()
                        .map(|rec| (rec.incidence_count, metric.value(rec))),
                );
                if value.is_none() {
                    event!(
                        Level::DEBUG,
                        "no cases for {} in {}, {} is missing",
                        sites[pos],
                        year,
                        metric
                    );
                }
                els.push(AdjustedRate {
                    year,
                    site: sites[pos].clone(),
                    metric,
                    value,
                });
            }
        }
        Self { els }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdjustedRate> + '_ {
        self.els.iter()
    }

    pub fn len(&self) -> usize {
        self.els.len()
    }

    pub fn is_empty(&self) -> bool {
        self.els.is_empty()
    }

    /// The combined value for one cell, `None` if it is missing or absent.
    pub fn get(&self, site: &str, year: Year, metric: Metric) -> Option<f64> {
        self.iter()
            .find(|el| &*el.site == site && el.year == year && el.metric == metric)
            .and_then(|el| el.value)
    }

    /// Only the given sites, in the order given.
    pub fn for_sites(&self, sites: &[ArcStr]) -> Self {
        let mut els: Vec<AdjustedRate> = self
            .iter()
            .filter(|el| sites.contains(&el.site))
            .cloned()
            .collect();
        // stable, so year/metric order within a site is kept
        els.sort_by_key(|el| sites.iter().position(|site| *site == el.site));
        Self { els }
    }

    /// Mean of each site's values for `metric` over the years in `window`.
    ///
    /// Missing years are skipped. A site with no value in the window is left out.
    pub fn window_means(&self, metric: Metric, window: Range<Year>) -> Vec<SiteMean> {
        let mut out: Vec<(ArcStr, f64, usize)> = vec![];
        let mut site_idx: HashMap<ArcStr, usize> = HashMap::new();
        for el in self
            .iter()
            .filter(|el| el.metric == metric && window.contains(&el.year))
        {
            let idx = *site_idx.entry(el.site.clone()).or_insert_with(|| {
                out.push((el.site.clone(), 0., 0));
                out.len() - 1
            });
            if let Some(value) = el.value {
                out[idx].1 += value;
                out[idx].2 += 1;
            }
        }
        out.into_iter()
            .filter(|(_, _, years)| *years > 0)
            .filter_map(|(site, sum, years)| {
                Some(SiteMean {
                    site,
                    mean: R64::try_new(sum / years as f64)?,
                    years,
                })
            })
            .collect()
    }

    /// The `n` sites with the highest mean `metric` in `window`, for which `include` is `true`.
    ///
    /// Equal means keep the order the sites first appear in.
    pub fn top_by_mean(
        &self,
        metric: Metric,
        window: Range<Year>,
        n: usize,
        include: impl Fn(&str) -> bool,
    ) -> Vec<SiteMean> {
        let mut means: Vec<SiteMean> = self
            .window_means(metric, window)
            .into_iter()
            .filter(|el| include(&el.site))
            .collect();
        means.sort_by_key(|el| Reverse(el.mean));
        means.truncate(n);
        means
    }

    pub fn term_table(&self) -> tdt::Table<'static> {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Year"))
                .with_cell(Cell::from("Site"))
                .with_cell(Cell::from("Metric"))
                .with_cell(Cell::from("Value")),
        );
        for el in self.iter() {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(el.year.to_string()))
                    .with_cell(Cell::from(el.site.to_string()))
                    .with_cell(Cell::from(el.metric.to_string()))
                    .with_cell(Cell::from(
                        el.value.map(|v| format!("{:.2}", v)).unwrap_or_default(),
                    )),
            );
        }
        table
    }
}

/// The `years` calendar years ending at `last`, inclusive.
pub fn recent_window(last: Year, years: u16) -> Range<Year> {
    let years = years.max(1);
    Range::new(last.saturating_sub(years - 1), last.checked_add(1))
}

/// A site's mean value over a window of years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMean {
    pub site: ArcStr,
    pub mean: R64,
    /// How many years in the window had a value.
    pub years: usize,
}

pub fn means_term_table(means: &[SiteMean]) -> tdt::Table<'static> {
    use tdt::{Cell, Row, Table};
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Rank"))
            .with_cell(Cell::from("Site"))
            .with_cell(Cell::from("Mean"))
            .with_cell(Cell::from("Years")),
    );
    for (rank, el) in means.iter().enumerate() {
        table.add_row(
            Row::new()
                .with_cell(Cell::from((rank + 1).to_string()))
                .with_cell(Cell::from(el.site.to_string()))
                .with_cell(Cell::from(format!("{:.1}", el.mean.raw())))
                .with_cell(Cell::from(el.years.to_string())),
        );
    }
    table
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{IncidenceRecord, Sex};

    fn rec(year: Year, site: &str, sex: Sex, count: u32, rate: f64, sir: f64) -> SiteRecord {
        SiteRecord {
            record: IncidenceRecord {
                health_board: "S08000016".into(),
                year,
                cancer_site: site.into(),
                cancer_site_code: "C00".into(),
                sex,
                incidence_count: count,
                crude_rate: rate,
                age_standardised_rate: rate,
                standardised_incidence_ratio: sir,
            },
            site: site.into(),
            is_canonical: true,
        }
    }

    #[test]
    fn single_sex_site() {
        let series = AdjustedRateSeries::from_records(&[
            rec(2018, "Breast", Sex::Female, 100, 200., 98.),
            rec(2018, "Breast", Sex::Male, 0, 0., 0.),
        ]);
        assert_eq!(series.get("Breast", 2018, Metric::CrudeRate), Some(200.));
        assert_eq!(
            series.get("Breast", 2018, Metric::StandardisedIncidenceRatio),
            Some(98.)
        );
    }

    #[test]
    fn zero_weight_is_missing() {
        assert_eq!(combine([(0, 10.), (0, 20.)]), None);
        assert_eq!(combine(Vec::new()), None);

        let series = AdjustedRateSeries::from_records(&[
            rec(2018, "Testis", Sex::Female, 0, 0., 0.),
            rec(2018, "Testis", Sex::Male, 0, 0., 0.),
        ]);
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|el| el.value.is_none()));
    }

    #[test]
    fn combined_lies_between_strata() {
        let combined = combine([(10, 50.), (30, 150.)]).unwrap();
        assert_eq!(combined, 125.);
        let cases: [((u32, f64), (u32, f64)); 3] =
            [((1, 3.5), (7, 0.25)), ((12, 80.), (5, 81.)), ((3, 0.), (0, 9.))];
        for (f, m) in cases {
            let combined = combine([f, m]).unwrap();
            let lo = if f.0 == 0 { m.1 } else if m.0 == 0 { f.1 } else { f.1.min(m.1) };
            let hi = if f.0 == 0 { m.1 } else if m.0 == 0 { f.1 } else { f.1.max(m.1) };
            assert!(lo <= combined && combined <= hi, "{combined} not in {lo}..={hi}");
        }
    }

    #[test]
    fn all_rows_and_sub_sites_ignored() {
        let mut sub_site = rec(2018, "Colorectal cancer", Sex::Female, 50, 1000., 1000.);
        sub_site.is_canonical = false;
        let series = AdjustedRateSeries::from_records(&[
            rec(2018, "Colorectal cancer", Sex::Female, 10, 20., 90.),
            rec(2018, "Colorectal cancer", Sex::Male, 10, 40., 110.),
            rec(2018, "Colorectal cancer", Sex::All, 20, 500., 500.),
            sub_site,
        ]);
        assert_eq!(series.get("Colorectal cancer", 2018, Metric::CrudeRate), Some(30.));
        assert_eq!(
            series.get("Colorectal cancer", 2018, Metric::StandardisedIncidenceRatio),
            Some(100.)
        );
    }

    fn sir_series() -> AdjustedRateSeries {
        let mut records = vec![];
        for year in 2010..=2018 {
            // old years are high so they would win if the window were ignored
            let a = if year < 2014 { 500. } else { 100. };
            records.push(rec(year, "A", Sex::Female, 1, 0., a));
            records.push(rec(year, "B", Sex::Male, 1, 0., 120.));
            // no cases in 2018
            let c_count = if year == 2018 { 0 } else { 1 };
            records.push(rec(year, "C", Sex::Male, c_count, 0., 110.));
            records.push(rec(year, "D", Sex::Female, 1, 0., 120.));
        }
        records.push(rec(2005, "E", Sex::Female, 1, 0., 900.));
        AdjustedRateSeries::from_records(&records)
    }

    #[test]
    fn window() {
        assert_eq!(recent_window(2018, 5), Range::new(2014, Some(2019)));
        assert_eq!(recent_window(2018, 1), Range::new(2018, Some(2019)));
        let last = recent_window(u16::MAX, 5);
        assert_eq!(*last.start(), u16::MAX - 4);
        assert!(last.contains(&u16::MAX));
    }

    #[test]
    fn means_use_available_years() {
        let series = sir_series();
        let means = series.window_means(Metric::StandardisedIncidenceRatio, recent_window(2018, 5));
        let c = means.iter().find(|el| &*el.site == "C").unwrap();
        assert_eq!(c.years, 4);
        assert_eq!(c.mean, r64(110.));
        // no value in the window
        assert!(means.iter().all(|el| &*el.site != "E"));
    }

    #[test]
    fn ranking_by_recent_mean() {
        let series = sir_series();
        let top = series.top_by_mean(
            Metric::StandardisedIncidenceRatio,
            recent_window(2018, 5),
            3,
            |site| site != "D",
        );
        let order: Vec<_> = top.iter().map(|el| el.site.to_string()).collect();
        assert_eq!(order, ["B", "C", "A"]);

        let top = series.top_by_mean(
            Metric::StandardisedIncidenceRatio,
            recent_window(2018, 5),
            2,
            |_| true,
        );
        let order: Vec<_> = top.iter().map(|el| el.site.to_string()).collect();
        // B and D tie; B appears first
        assert_eq!(order, ["B", "D"]);
    }

    #[test]
    fn for_sites_keeps_given_order() {
        let series = sir_series().for_sites(&["D".into(), "A".into()]);
        let sites: Vec<_> = series.iter().map(|el| el.site.to_string()).collect();
        assert_eq!(sites.first().map(String::as_str), Some("D"));
        assert_eq!(sites.last().map(String::as_str), Some("A"));
        assert_eq!(series.len(), 2 * 9 * 2);
    }
}
