//! Settings for a report run, read from a TOML file.
use crate::{util, ArcStr, Range, Year};
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The incidence CSV extract.
    pub input: PathBuf,
    /// Directory the derived tables are written to.
    pub output: PathBuf,
    /// Health board code to restrict the data to.
    pub health_board: ArcStr,
    pub first_year: Year,
    pub last_year: Year,
    /// Number of latest years averaged when ranking by standardised incidence ratio.
    pub recent_years: u16,
    /// How many sites each ranking keeps.
    pub top_n: usize,
    /// Width in years of the periods in the period totals table.
    pub period_years: u16,
    /// Replacement for the built-in category table.
    pub category_map: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("../data/incidence/opendata_inc9418_hb.csv"),
            output: PathBuf::from("../data/output"),
            health_board: "S08000016".into(),
            first_year: 1994,
            last_year: 2018,
            recent_years: 5,
            top_n: 6,
            period_years: 5,
            category_map: None,
        }
    }
}

impl Config {
    /// Load settings from `path`, or use the defaults if there is no such file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<Config> {
            if !util::path_exists(path)? {
                event!(
                    Level::INFO,
                    "no config at \"{}\", using defaults",
                    path.display()
                );
                return Ok(Config::default());
            }
            let text = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&text)?;
            config.validate()?;
            Ok(config)
        }

        let path = path.as_ref();
        inner(path).with_context(|| format!("loading config from \"{}\"", path.display()))
    }

    pub fn validate(&self) -> Result {
        ensure!(
            self.first_year <= self.last_year,
            "first_year ({}) is after last_year ({})",
            self.first_year,
            self.last_year
        );
        ensure!(
            self.last_year < Year::MAX,
            "last_year ({}) is out of range",
            self.last_year
        );
        ensure!(self.recent_years >= 1, "recent_years must be at least 1");
        ensure!(self.top_n >= 1, "top_n must be at least 1");
        ensure!(self.period_years >= 1, "period_years must be at least 1");
        ensure!(
            !self.health_board.trim().is_empty(),
            "health_board must not be empty"
        );
        Ok(())
    }

    /// The reporting years as a half-open range.
    pub fn years(&self) -> Range<Year> {
        Range::new(self.first_year, self.last_year.checked_add(1))
    }
}
