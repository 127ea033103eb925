//! The derived tables, and writing them out.
use crate::{
    aggregate::{self, PeriodTotal, SiteTotal, SiteTotals, YearlyCount},
    rates::{self, AdjustedRate, AdjustedRateSeries, Metric, SiteMean},
    util, ArcStr, CategoryMapping, Config, Incidence, RangeSet, Year,
};
use qu::ick_use::*;
use serde::Serialize;
use std::{fs, io, path::Path};
use term_data_table as tdt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportOptions {
    /// How many sites each ranking keeps.
    pub top_n: usize,
    /// Number of latest years in the standardised incidence ratio ranking.
    pub recent_years: u16,
    /// Width of the periods in the period totals.
    pub period_years: u16,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            top_n: 6,
            recent_years: 5,
            period_years: 5,
        }
    }
}

impl From<&Config> for ReportOptions {
    fn from(config: &Config) -> Self {
        Self {
            top_n: config.top_n,
            recent_years: config.recent_years,
            period_years: config.period_years,
        }
    }
}

/// A site's place in the ranking by total incidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSite {
    pub rank: usize,
    pub site: ArcStr,
    pub total: u64,
    /// Share of the overall total, in percent.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub health_board: ArcStr,
    pub first_year: Year,
    pub last_year: Year,
    pub options: ReportOptions,
    pub overall_total: u64,
    pub site_totals: Vec<RankedSite>,
    pub top_by_total: Vec<SiteTotal>,
    /// First and last year averaged for `top_by_recent_sir`.
    pub recent_years: (Year, Year),
    pub top_by_recent_sir: Vec<SiteMean>,
    pub adjusted_rates_top_by_total: Vec<AdjustedRate>,
    pub adjusted_rates_top_by_recent_sir: Vec<AdjustedRate>,
    pub yearly_counts: Vec<YearlyCount>,
    pub period_totals: Vec<PeriodTotal>,
}

impl Report {
    /// Run the pipeline over loaded records.
    pub fn build(
        incidence: &Incidence,
        mapping: &CategoryMapping,
        options: ReportOptions,
    ) -> Result<Self> {
        let (first_year, last_year) = match incidence.year_span() {
            Some(span) => span,
            None => bail!("no incidence records left after filtering"),
        };
        let health_board = incidence[0].health_board.clone();
        let not_summary = |site: &str| !mapping.is_summary(site);

        let records = mapping.apply(incidence);

        let totals = SiteTotals::from_records(&records);
        let overall_total = aggregate::overall_total(&records, mapping.summaries());
        if overall_total == 0 {
            event!(
                Level::WARN,
                "no \"{}\" or \"{}\" rows, percentages will be 0",
                mapping.summaries().all_sites_excluding_nmsc,
                mapping.summaries().nmsc
            );
        }
        let site_totals = totals
            .iter()
            .enumerate()
            .map(|(idx, el)| RankedSite {
                rank: idx + 1,
                site: el.site.clone(),
                total: el.total,
                percentage: aggregate::share(el.total, overall_total),
            })
            .collect();
        let top_by_total = totals.top(options.top_n, not_summary);

        let series = AdjustedRateSeries::from_records(&records);
        let window = rates::recent_window(last_year, options.recent_years);
        let top_by_recent_sir = series.top_by_mean(
            Metric::StandardisedIncidenceRatio,
            window,
            options.top_n,
            not_summary,
        );

        let total_sites: Vec<ArcStr> = top_by_total.iter().map(|el| el.site.clone()).collect();
        let sir_sites: Vec<ArcStr> = top_by_recent_sir
            .iter()
            .map(|el| el.site.clone())
            .collect();
        let adjusted_rates_top_by_total = series.for_sites(&total_sites).iter().cloned().collect();
        let adjusted_rates_top_by_recent_sir =
            series.for_sites(&sir_sites).iter().cloned().collect();

        let yearly_counts = aggregate::yearly_counts(&records, &total_sites);
        let period_totals = aggregate::period_totals(
            &records,
            mapping.summaries(),
            RangeSet::year_periods(first_year, last_year, options.period_years),
        );

        event!(
            Level::INFO,
            "{} cases in {} sites for {} from {} to {}",
            overall_total,
            totals.len(),
            health_board,
            first_year,
            last_year
        );
        Ok(Self {
            health_board,
            first_year,
            last_year,
            options,
            overall_total,
            site_totals,
            top_by_total,
            recent_years: (*window.start(), last_year),
            top_by_recent_sir,
            adjusted_rates_top_by_total,
            adjusted_rates_top_by_recent_sir,
            yearly_counts,
            period_totals,
        })
    }

    /// Print the tables to stdout.
    pub fn print(&self) {
        util::header(&format!(
            "Cancer incidence for {}, {} - {}",
            self.health_board, self.first_year, self.last_year
        ));
        println!("Overall total: {}", self.overall_total);

        util::header("Sites by total incidence");
        println!("{}", self.site_totals_table());

        util::header(&format!("Top {} by total incidence", self.options.top_n));
        println!("{}", self.top_by_total_table());

        util::header(&format!(
            "Top {} by mean SIR, {} - {}",
            self.options.top_n, self.recent_years.0, self.recent_years.1
        ));
        println!("{}", rates::means_term_table(&self.top_by_recent_sir));

        util::header("Incidence by period");
        println!("{}", self.period_totals_table());
    }

    pub fn site_totals_table(&self) -> tdt::Table<'static> {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Rank"))
                .with_cell(Cell::from("Site"))
                .with_cell(Cell::from("Total"))
                .with_cell(Cell::from("Percentage")),
        );
        for el in self.site_totals.iter() {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(el.rank.to_string()))
                    .with_cell(Cell::from(el.site.to_string()))
                    .with_cell(Cell::from(el.total.to_string()))
                    .with_cell(Cell::from(format!("{:.1}%", el.percentage))),
            );
        }
        table
    }

    pub fn top_by_total_table(&self) -> tdt::Table<'static> {
        use tdt::{Cell, Row, Table};
        let header = Row::new()
            .with_cell(Cell::from("Site"))
            .with_cell(Cell::from("Total"));
        self.top_by_total
            .iter()
            .fold(Table::new().with_row(header), |tbl, el| {
                tbl.with_row(
                    Row::new()
                        .with_cell(Cell::from(el.site.to_string()))
                        .with_cell(Cell::from(el.total.to_string())),
                )
            })
    }

    pub fn period_totals_table(&self) -> tdt::Table<'static> {
        use tdt::{Cell, Row, Table};
        let header = Row::new()
            .with_cell(Cell::from("Period"))
            .with_cell(Cell::from("Total"));
        self.period_totals
            .iter()
            .fold(Table::new().with_row(header), |tbl, el| {
                tbl.with_row(
                    Row::new()
                        .with_cell(Cell::from(el.period.clone()))
                        .with_cell(Cell::from(el.total.to_string())),
                )
            })
    }

    /// Write every table as CSV, and the whole report as JSON, into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result {
        let dir = dir.as_ref();
        crate::save_csv(&self.site_totals, dir.join("site_totals.csv"))?;
        crate::save_csv(&self.top_by_total, dir.join("top_by_total.csv"))?;
        crate::save_csv(&self.top_by_recent_sir, dir.join("top_by_recent_sir.csv"))?;
        crate::save_csv(
            &self.adjusted_rates_top_by_total,
            dir.join("adjusted_rates_top_by_total.csv"),
        )?;
        crate::save_csv(
            &self.adjusted_rates_top_by_recent_sir,
            dir.join("adjusted_rates_top_by_recent_sir.csv"),
        )?;
        crate::save_csv(&self.yearly_counts, dir.join("yearly_counts.csv"))?;
        crate::save_csv(&self.period_totals, dir.join("period_totals.csv"))?;
        self.save_json(dir.join("report.json"))?;
        event!(Level::INFO, "report written to \"{}\"", dir.display());
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result {
        fn inner(report: &Report, path: &Path) -> Result {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("could not create parent")?;
            }
            if util::path_exists(path)? {
                event!(
                    Level::WARN,
                    "overwriting existing file at \"{}\"",
                    path.display()
                );
            }
            let out = io::BufWriter::new(fs::File::create(path)?);
            serde_json::to_writer_pretty(out, report)?;
            Ok(())
        }
        let path = path.as_ref();
        inner(self, path).with_context(|| format!("unable to save report to \"{}\"", path.display()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{IncidenceRecord, Sex};

    fn rec(year: Year, site: &str, code: &str, sex: Sex, count: u32, sir: f64) -> IncidenceRecord {
        IncidenceRecord {
            health_board: "S08000016".into(),
            year,
            cancer_site: site.into(),
            cancer_site_code: code.into(),
            sex,
            incidence_count: count,
            crude_rate: f64::from(count) * 2.,
            age_standardised_rate: f64::from(count),
            standardised_incidence_ratio: sir,
        }
    }

    fn incidence() -> Incidence {
        let all = "All cancer types excl. non-melanoma skin cancer";
        let mut rows = vec![];
        for year in 2013..=2018 {
            rows.extend([
                rec(year, all, "C00-C97, excl. C44", Sex::Female, 60, 100.),
                rec(year, all, "C00-C97, excl. C44", Sex::Male, 40, 100.),
                rec(year, "Non-melanoma skin cancer", "C44", Sex::Female, 10, 90.),
                rec(year, "Non-melanoma skin cancer", "C44", Sex::Male, 15, 95.),
                rec(year, "Breast", "C50", Sex::Female, 30, 105.),
                rec(year, "Breast", "C50", Sex::Male, 0, 0.),
                rec(year, "Prostate", "C61", Sex::Male, 20, 120.),
                rec(year, "Colorectal cancer", "C18-C20", Sex::Female, 5, 80.),
                rec(year, "Colorectal cancer", "C18-C20", Sex::Male, 5, 85.),
                rec(year, "Colon", "C18", Sex::Female, 4, 300.),
            ]);
        }
        rows.into_iter().collect()
    }

    fn options(top_n: usize) -> ReportOptions {
        ReportOptions {
            top_n,
            ..ReportOptions::default()
        }
    }

    #[test]
    fn build() {
        let mapping = CategoryMapping::builtin().unwrap();
        let report = Report::build(&incidence(), &mapping, options(3)).unwrap();
        assert_eq!((report.first_year, report.last_year), (2013, 2018));
        assert_eq!(report.overall_total, 6 * 125);
        assert_eq!(report.recent_years, (2014, 2018));

        let top: Vec<_> = report
            .top_by_total
            .iter()
            .map(|el| (el.site.to_string(), el.total))
            .collect();
        assert_eq!(
            top,
            [
                ("Breast".to_string(), 180),
                ("Non-melanoma skin cancer".to_string(), 150),
                ("Prostate".to_string(), 120)
            ]
        );

        let top: Vec<_> = report
            .top_by_recent_sir
            .iter()
            .map(|el| el.site.to_string())
            .collect();
        assert_eq!(top, ["Prostate", "Breast", "Non-melanoma skin cancer"]);

        // summary row is ranked in the totals table, but not in the top lists
        assert_eq!(report.site_totals[0].rank, 1);
        assert_eq!(report.site_totals[0].total, 600);
        assert!(report.site_totals.iter().all(|el| &*el.site != "Colon"));

        assert_eq!(report.adjusted_rates_top_by_total.len(), 3 * 6 * 2);
        assert_eq!(&*report.adjusted_rates_top_by_total[0].site, "Breast");
        assert_eq!(report.yearly_counts.len(), 6 + 6 * 2 + 6 * 2);
        assert_eq!(
            report
                .period_totals
                .iter()
                .map(|el| (el.period.as_str(), el.total))
                .collect::<Vec<_>>(),
            [("2013-2017", 625), ("2018", 125)]
        );
    }

    #[test]
    fn empty_is_an_error() {
        let mapping = CategoryMapping::builtin().unwrap();
        let empty: Incidence = Vec::new().into_iter().collect();
        assert!(Report::build(&empty, &mapping, ReportOptions::default()).is_err());
    }

    #[test]
    fn save() {
        let mapping = CategoryMapping::builtin().unwrap();
        let report = Report::build(&incidence(), &mapping, options(2)).unwrap();
        let dir = std::env::temp_dir().join(format!("hb-cancer-report-{}", std::process::id()));
        report.save(&dir).unwrap();
        for name in [
            "site_totals.csv",
            "top_by_total.csv",
            "top_by_recent_sir.csv",
            "adjusted_rates_top_by_total.csv",
            "adjusted_rates_top_by_recent_sir.csv",
            "yearly_counts.csv",
            "period_totals.csv",
            "report.json",
        ] {
            assert!(dir.join(name).exists(), "{name} not written");
        }
        let top = fs::read_to_string(dir.join("top_by_total.csv")).unwrap();
        assert_eq!(
            top,
            "site,total\nBreast,180\nNon-melanoma skin cancer,150\n"
        );
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("report.json")).unwrap()).unwrap();
        assert_eq!(json["overall_total"], 750);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_values_are_empty_cells() {
        let mapping = CategoryMapping::builtin().unwrap();
        let incidence: Incidence = [
            rec(2018, "Testis", "C62", Sex::Male, 0, 0.),
            rec(2018, "Breast", "C50", Sex::Female, 3, 100.),
        ]
        .into_iter()
        .collect();
        let report = Report::build(&incidence, &mapping, options(2)).unwrap();
        assert!(report
            .adjusted_rates_top_by_total
            .iter()
            .any(|el| &*el.site == "Testis" && el.value.is_none()));

        let dir = std::env::temp_dir().join(format!("hb-cancer-missing-{}", std::process::id()));
        report.save(&dir).unwrap();
        let rates = fs::read_to_string(dir.join("adjusted_rates_top_by_total.csv")).unwrap();
        assert!(rates.contains("2018,Testis,crude_rate,\n"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("report.json")).unwrap()).unwrap();
        assert!(json["adjusted_rates_top_by_total"]
            .as_array()
            .unwrap()
            .iter()
            .any(|el| el["site"] == "Testis" && el["value"].is_null()));
        fs::remove_dir_all(&dir).unwrap();
    }
}
