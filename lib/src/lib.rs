pub mod aggregate;
pub mod category;
pub mod config;
mod error;
mod range;
pub mod rates;
pub mod report;
mod util;

pub use anyhow::{Context, Error};
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashSet},
    fmt, fs, io,
    ops::Deref,
    path::Path,
    sync::Arc,
};

pub use crate::{
    category::{CategoryMapping, SiteRecord},
    config::Config,
    error::{CategoryError, LoadError},
    range::{Range, RangeSet, RangeSetTotals},
    util::header,
};
use crate::util::{count, normalize_column_name, rate};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
pub type Year = u16;

/// The columns every input file must provide.
///
/// Each entry is the canonical name followed by the other names accepted after header
/// normalization. Order matches the fields of [`IncidenceRecord`].
const SCHEMA: &[(&str, &[&str])] = &[
    ("hb", &["hbr"]),
    ("year", &[]),
    ("cancer_site", &[]),
    (
        "cancer_site_icd10_code",
        &["cancer_site_icd10code", "cancer_site_code"],
    ),
    ("sex", &[]),
    ("incidences_all_ages", &["incidence_count"]),
    ("crude_rate", &[]),
    ("easr", &["age_standardised_rate"]),
    ("standardised_incidence_ratio", &["sir"]),
];

#[derive(Debug, Deserialize)]
struct IncidenceRaw {
    #[serde(rename = "hb", alias = "hbr")]
    health_board: ArcStr,
    year: Year,
    cancer_site: ArcStr,
    #[serde(
        rename = "cancer_site_icd10_code",
        alias = "cancer_site_icd10code",
        alias = "cancer_site_code"
    )]
    cancer_site_code: ArcStr,
    sex: Sex,
    #[serde(
        rename = "incidences_all_ages",
        alias = "incidence_count",
        deserialize_with = "count"
    )]
    incidence_count: u32,
    #[serde(deserialize_with = "rate")]
    crude_rate: f64,
    #[serde(
        rename = "easr",
        alias = "age_standardised_rate",
        deserialize_with = "rate"
    )]
    age_standardised_rate: f64,
    #[serde(alias = "sir", deserialize_with = "rate")]
    standardised_incidence_ratio: f64,
}

/// A row in the incidence dataset.
///
/// Counts and rates are for all ages combined. Rates are per 100,000 population, the
/// standardised incidence ratio is 100 when observed cases match the expected count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidenceRecord {
    pub health_board: ArcStr,
    pub year: Year,
    pub cancer_site: ArcStr,
    /// ICD-10 code or code range, e.g. `C18-C20` or `C44 (M-8090-8098)`.
    pub cancer_site_code: ArcStr,
    pub sex: Sex,
    pub incidence_count: u32,
    pub crude_rate: f64,
    pub age_standardised_rate: f64,
    pub standardised_incidence_ratio: f64,
}

impl From<IncidenceRaw> for IncidenceRecord {
    fn from(from: IncidenceRaw) -> Self {
        Self {
            health_board: from.health_board,
            year: from.year,
            cancer_site: from.cancer_site,
            cancer_site_code: from.cancer_site_code,
            sex: from.sex,
            incidence_count: from.incidence_count,
            crude_rate: from.crude_rate,
            age_standardised_rate: from.age_standardised_rate,
            standardised_incidence_ratio: from.standardised_incidence_ratio,
        }
    }
}

/// Which rows of the source file make it into the analysis.
#[derive(Debug, Clone)]
pub struct LoadFilter {
    pub health_board: ArcStr,
    pub years: Range<Year>,
    /// Sites dropped entirely, e.g. the all-sites aggregate that double counts every other row.
    pub excluded_sites: BTreeSet<ArcStr>,
}

impl LoadFilter {
    pub fn new(config: &Config, mapping: &CategoryMapping) -> Self {
        Self {
            health_board: config.health_board.clone(),
            years: config.years(),
            excluded_sites: BTreeSet::from([mapping.summaries().all_sites.clone()]),
        }
    }

    fn keep(&self, record: &IncidenceRecord) -> bool {
        *record.health_board == *self.health_board
            && self.years.contains(&record.year)
            && !self.excluded_sites.contains(&record.cancer_site)
    }
}

/// The loaded incidence records for one health board.
#[derive(Debug, Clone)]
pub struct Incidence {
    els: Arc<Vec<IncidenceRecord>>,
}

impl Incidence {
    /// Load and filter the source CSV file.
    pub fn load(path: impl AsRef<Path>, filter: &LoadFilter) -> Result<Self> {
        let path = path.as_ref();
        let reader = fs::File::open(path)
            .map_err(LoadError::from)
            .with_context(|| format!("opening \"{}\"", path.display()))?;
        let this = Self::from_reader(io::BufReader::new(reader), filter)
            .with_context(|| format!("while loading \"{}\"", path.display()))?;
        event!(
            Level::INFO,
            "loaded {} records for health board {} from \"{}\"",
            this.len(),
            filter.health_board,
            path.display()
        );
        Ok(this)
    }

    /// Parse CSV data, checking the header against the schema before reading any rows.
    pub fn from_reader(reader: impl io::Read, filter: &LoadFilter) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv::StringRecord::from(
            reader
                .headers()?
                .iter()
                .map(normalize_column_name)
                .collect::<Vec<_>>(),
        );
        check_schema(&headers)?;

        let mut els = vec![];
        let mut dropped = 0usize;
        for (idx, row) in reader.records().enumerate() {
            // line 1 is the header
            let line = idx + 2;
            let row = row?;
            let raw: IncidenceRaw = row
                .deserialize(Some(&headers))
                .map_err(|source| LoadError::InvalidRecord { line, source })?;
            let record = IncidenceRecord::from(raw);
            if filter.keep(&record) {
                els.push(record);
            } else {
                dropped += 1;
            }
        }
        event!(
            Level::DEBUG,
            "kept {} rows, dropped {} (other health boards, years or aggregate sites)",
            els.len(),
            dropped
        );
        Ok(Self::new(els))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncidenceRecord> + '_ {
        self.els.iter()
    }

    /// The first and last year present, if there are any records.
    pub fn year_span(&self) -> Option<(Year, Year)> {
        let first = self.iter().map(|rec| rec.year).min()?;
        let last = self.iter().map(|rec| rec.year).max()?;
        Some((first, last))
    }

    /// Distinct site label/code pairs in order of first appearance.
    pub fn sites(&self) -> Vec<(ArcStr, ArcStr)> {
        let mut seen = HashSet::new();
        let mut out = vec![];
        for rec in self.iter() {
            let key = (rec.cancer_site.clone(), rec.cancer_site_code.clone());
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }

    /// Sum of incidence over the Female and Male rows per sex.
    pub fn count_sexes(&self) -> [(Sex, u64); 2] {
        let mut female = 0;
        let mut male = 0;
        for rec in self.iter() {
            match rec.sex {
                Sex::Female => female += u64::from(rec.incidence_count),
                Sex::Male => male += u64::from(rec.incidence_count),
                Sex::All => (),
            }
        }
        [(Sex::Female, female), (Sex::Male, male)]
    }

    pub fn term_table(&self) -> term_data_table::Table<'static> {
        use term_data_table::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Year"))
                .with_cell(Cell::from("Site"))
                .with_cell(Cell::from("Code"))
                .with_cell(Cell::from("Sex"))
                .with_cell(Cell::from("Count"))
                .with_cell(Cell::from("Crude rate"))
                .with_cell(Cell::from("EASR"))
                .with_cell(Cell::from("SIR")),
        );
        for rec in self.iter() {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(rec.year.to_string()))
                    .with_cell(Cell::from(rec.cancer_site.to_string()))
                    .with_cell(Cell::from(rec.cancer_site_code.to_string()))
                    .with_cell(Cell::from(rec.sex.to_string()))
                    .with_cell(Cell::from(rec.incidence_count.to_string()))
                    .with_cell(Cell::from(format!("{:.1}", rec.crude_rate)))
                    .with_cell(Cell::from(format!("{:.1}", rec.age_standardised_rate)))
                    .with_cell(Cell::from(format!(
                        "{:.1}",
                        rec.standardised_incidence_ratio
                    ))),
            );
        }
        table
    }

    fn new(els: Vec<IncidenceRecord>) -> Self {
        Self { els: Arc::new(els) }
    }
}

impl Deref for Incidence {
    type Target = [IncidenceRecord];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl<'a> IntoIterator for &'a Incidence {
    type IntoIter = <&'a [IncidenceRecord] as IntoIterator>::IntoIter;
    type Item = &'a IncidenceRecord;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

impl FromIterator<IncidenceRecord> for Incidence {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = IncidenceRecord>,
    {
        Self::new(iter.into_iter().collect())
    }
}

/// Make sure every schema column is present in the (normalized) headers.
fn check_schema(headers: &csv::StringRecord) -> Result<(), LoadError> {
    for (column, aliases) in SCHEMA {
        let found = headers
            .iter()
            .any(|h| h == *column || aliases.iter().any(|alias| h == *alias));
        if !found {
            return Err(LoadError::MissingColumn {
                column: (*column).into(),
                found: headers.iter().map(String::from).collect(),
            });
        }
    }
    Ok(())
}

// Sub-types

/// The sex strata reported in the dataset.
///
/// `All` is reported alongside `Female` and `Male` but is structurally zero for single-sex
/// sites, so combined figures are built from the other two.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum Sex {
    #[serde(alias = "female", alias = "F")]
    Female,
    #[serde(alias = "male", alias = "M")]
    Male,
    #[serde(alias = "all")]
    All,
}

impl Sex {
    /// Whether this is one of the strata that partition the population.
    pub fn is_stratum(self) -> bool {
        !matches!(self, Sex::All)
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Female => f.write_str("Female"),
            Sex::Male => f.write_str("Male"),
            Sex::All => f.write_str("All"),
        }
    }
}

/// Write rows to a CSV file, warning if we replace an existing one.
fn save_csv<T: Serialize>(rows: impl IntoIterator<Item = T>, path: impl AsRef<Path>) -> Result {
    fn inner<T: Serialize>(rows: impl IntoIterator<Item = T>, path: &Path) -> Result {
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
        let mut out = csv::Writer::from_path(path)?;
        for row in rows {
            out.serialize(row)?;
        }
        out.flush()?;
        Ok(())
    }
    let path = path.as_ref();
    inner(rows, path).with_context(|| format!("unable to save data to \"{}\"", path.display()))
}
