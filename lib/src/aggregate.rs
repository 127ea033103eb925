//! Incidence totals by site, year and sex.
use crate::{category::Summaries, ArcStr, RangeSet, Sex, SiteRecord, Year};
use serde::Serialize;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
};
use term_data_table as tdt;

/// Total incidence for one canonical site over all years and both sexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteTotal {
    pub site: ArcStr,
    pub total: u64,
}

/// Site totals ranked by total incidence, largest first.
///
/// Sites with equal totals stay in the order they first appear in the data, so ranking the same
/// input twice gives the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTotals {
    els: Vec<SiteTotal>,
}

impl SiteTotals {
    /// Sum the Female and Male rows of every canonical site.
    pub fn from_records(records: &[SiteRecord]) -> Self {
        let mut els: Vec<SiteTotal> = vec![];
        let mut site_idx: HashMap<ArcStr, usize> = HashMap::new();
        for rec in records
            .iter()
            .filter(|rec| rec.is_canonical && rec.record.sex.is_stratum())
        {
            let idx = *site_idx.entry(rec.site.clone()).or_insert_with(|| {
                els.push(SiteTotal {
                    site: rec.site.clone(),
                    total: 0,
                });
                els.len() - 1
            });
            els[idx].total += u64::from(rec.record.incidence_count);
        }
        // stable sort
        els.sort_by_key(|el| Reverse(el.total));
        Self { els }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteTotal> + '_ {
        self.els.iter()
    }

    pub fn get(&self, site: &str) -> Option<u64> {
        self.els
            .iter()
            .find(|el| &*el.site == site)
            .map(|el| el.total)
    }

    /// The `n` highest-ranked sites for which `include` returns `true`.
    pub fn top(&self, n: usize, include: impl Fn(&str) -> bool) -> Vec<SiteTotal> {
        self.els
            .iter()
            .filter(|el| include(&el.site))
            .take(n)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.els.len()
    }

    pub fn is_empty(&self) -> bool {
        self.els.is_empty()
    }

    /// Ranked totals with each site's share of `overall`.
    pub fn term_table(&self, overall: u64) -> tdt::Table<'static> {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Rank"))
                .with_cell(Cell::from("Site"))
                .with_cell(Cell::from("Total"))
                .with_cell(Cell::from("Percentage")),
        );
        for (rank, el) in self.iter().enumerate() {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from((rank + 1).to_string()))
                    .with_cell(Cell::from(el.site.to_string()))
                    .with_cell(Cell::from(el.total.to_string()))
                    .with_cell(Cell::from(format!("{:.1}%", share(el.total, overall)))),
            );
        }
        table
    }
}

/// `part` as a percentage of `whole`, 0 when `whole` is 0.
pub fn share(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.
    } else {
        part as f64 / whole as f64 * 100.
    }
}

/// All cases in the period: all sites excluding non-melanoma skin cancer, plus non-melanoma skin
/// cancer.
pub fn overall_total(records: &[SiteRecord], summaries: &Summaries) -> u64 {
    records
        .iter()
        .filter(|rec| {
            rec.is_canonical
                && rec.record.sex.is_stratum()
                && (rec.site == summaries.all_sites_excluding_nmsc || rec.site == summaries.nmsc)
        })
        .map(|rec| u64::from(rec.record.incidence_count))
        .sum()
}

/// Incidence for one site, year and sex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearlyCount {
    pub year: Year,
    pub site: ArcStr,
    pub sex: Sex,
    pub incidence_count: u64,
}

/// Per-year counts by sex for the given sites, ordered by site (as given), then year, then sex.
pub fn yearly_counts(records: &[SiteRecord], sites: &[ArcStr]) -> Vec<YearlyCount> {
    let mut counts: BTreeMap<(usize, Year, Sex), u64> = BTreeMap::new();
    for rec in records
        .iter()
        .filter(|rec| rec.is_canonical && rec.record.sex.is_stratum())
    {
        if let Some(site_pos) = sites.iter().position(|site| *site == rec.site) {
            *counts
                .entry((site_pos, rec.record.year, rec.record.sex))
                .or_default() += u64::from(rec.record.incidence_count);
        }
    }
    counts
        .into_iter()
        .map(|((site_pos, year, sex), incidence_count)| YearlyCount {
            year,
            site: sites[site_pos].clone(),
            sex,
            incidence_count,
        })
        .collect()
}

/// Incidence summed over a span of years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodTotal {
    /// e.g. `1994-1998`, both ends inclusive.
    pub period: String,
    pub total: u64,
}

/// Overall totals (see [`overall_total`]) per period.
pub fn period_totals(
    records: &[SiteRecord],
    summaries: &Summaries,
    periods: RangeSet<Year>,
) -> Vec<PeriodTotal> {
    let values = records
        .iter()
        .filter(|rec| {
            rec.is_canonical
                && rec.record.sex.is_stratum()
                && (rec.site == summaries.all_sites_excluding_nmsc || rec.site == summaries.nmsc)
        })
        .map(|rec| (rec.record.year, u64::from(rec.record.incidence_count)));
    periods
        .bucket_sums(values)
        .iter()
        .map(|(range, total)| {
            let start = *range.start();
            let period = match range.end() {
                Some(end) if *end - 1 > start => format!("{}-{}", start, *end - 1),
                Some(_) => start.to_string(),
                None => format!("{}+", start),
            };
            PeriodTotal { period, total }
        })
        .collect()
}
