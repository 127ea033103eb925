//! Mapping raw cancer-site rows onto canonical categories.
//!
//! The incidence data reports overlapping sites side by side. For example there are rows for
//! "Colorectal cancer" (C18-C20) and, separately, for "Colon" (C18) and "Rectum" (C19-C20). Adding
//! every row together would count each colorectal case twice.
//!
//! ```text
//!        Colorectal cancer
//!          /          \
//!       Colon        Rectum
//! ```
//!
//! We use a hand-curated table of code groups (see `data/category_map.toml`). Each group names a
//! parent site and the codes of the sub-sites it contains. Rows whose code belongs to a group are
//! attributed to the parent and flagged non-canonical, which keeps them out of the totals since
//! the parent row already counts them. Any other row is its own canonical category.
//!
//! The table also names the summary rows. "All cancer types" double counts everything and is
//! dropped when loading; "All cancer types excl. non-melanoma skin cancer" is kept for the overall
//! total but is never ranked against individual sites.
use crate::{util, ArcStr, CategoryError, Incidence, IncidenceRecord};
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, fs, path::Path};
use term_data_table as tdt;

const BUILTIN_TABLE: &str = include_str!("../../data/category_map.toml");

/// Labels of the rows that summarise other rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summaries {
    pub all_sites: ArcStr,
    pub all_sites_excluding_nmsc: ArcStr,
    pub nmsc: ArcStr,
}

/// A parent site and the codes of the sub-sites it already counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub parent: ArcStr,
    pub codes: Vec<ArcStr>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategoryTable {
    summaries: Summaries,
    #[serde(rename = "group", default)]
    groups: Vec<CategoryGroup>,
}

/// The result of normalizing one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub site: ArcStr,
    pub is_canonical: bool,
}

/// An incidence record with its canonical site attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub record: IncidenceRecord,
    /// The parent site for sub-sites, otherwise the record's own site.
    pub site: ArcStr,
    /// `false` if another row already counts these cases.
    pub is_canonical: bool,
}

/// An entry in the table that a dataset never uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unmatched {
    /// No row has this sub-site code.
    Code { code: ArcStr, parent: ArcStr },
    /// No row is labelled with this parent site, so its sub-sites are counted nowhere.
    Parent(ArcStr),
}

impl fmt::Display for Unmatched {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Unmatched::Code { code, parent } => write!(
                f,
                "code \"{}\" (counted in {}) does not appear in the data",
                code, parent
            ),
            Unmatched::Parent(parent) => write!(
                f,
                "parent site \"{}\" does not appear in the data, its sub-sites are not counted",
                parent
            ),
        }
    }
}

/// The code group table, with a pre-built index from code to group.
#[derive(Debug, Clone)]
pub struct CategoryMapping {
    summaries: Summaries,
    groups: Vec<CategoryGroup>,
    code_idx: HashMap<ArcStr, usize>,
}

impl CategoryMapping {
    /// The table compiled into the crate.
    pub fn builtin() -> Result<Self, CategoryError> {
        Self::from_toml(BUILTIN_TABLE)
    }

    /// Load a replacement table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<CategoryMapping> {
            let text = fs::read_to_string(path)?;
            Ok(CategoryMapping::from_toml(&text)?)
        }

        let path = path.as_ref();
        inner(path)
            .with_context(|| format!("loading category table from \"{}\"", path.display()))
    }

    /// Use the table at `path` if given, otherwise the built-in one.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin().context("built-in category table")?),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, CategoryError> {
        let table: CategoryTable = toml::from_str(text)?;
        Self::new(table.summaries, table.groups)
    }

    /// Build the table, checking that no code is claimed by two groups.
    pub fn new(summaries: Summaries, groups: Vec<CategoryGroup>) -> Result<Self, CategoryError> {
        let mut code_idx: HashMap<ArcStr, usize> = HashMap::new();
        for (idx, group) in groups.iter().enumerate() {
            if group.codes.is_empty() {
                return Err(CategoryError::EmptyGroup(group.parent.to_string()));
            }
            for code in group.codes.iter() {
                let code: ArcStr = code.trim().into();
                if let Some(prev) = code_idx.insert(code.clone(), idx) {
                    return Err(CategoryError::DuplicateCode {
                        code: code.to_string(),
                        first: groups[prev].parent.to_string(),
                        second: group.parent.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            summaries,
            groups,
            code_idx,
        })
    }

    pub fn summaries(&self) -> &Summaries {
        &self.summaries
    }

    pub fn groups(&self) -> impl Iterator<Item = &CategoryGroup> + '_ {
        self.groups.iter()
    }

    /// Rows that total other rows and so can't be ranked against single sites.
    pub fn is_summary(&self, site: &str) -> bool {
        site == &*self.summaries.all_sites || site == &*self.summaries.all_sites_excluding_nmsc
    }

    /// Find the canonical category for a row.
    ///
    /// Codes are matched exactly (ignoring surrounding whitespace). A code in no group is its own
    /// canonical category, so normalizing a canonical row gives back its own label.
    pub fn normalize(&self, site: &ArcStr, code: &str) -> Normalized {
        match self.code_idx.get(code.trim()) {
            Some(&idx) => Normalized {
                site: self.groups[idx].parent.clone(),
                is_canonical: false,
            },
            None => Normalized {
                site: site.clone(),
                is_canonical: true,
            },
        }
    }

    /// Attach canonical categories to every loaded record.
    pub fn apply(&self, incidence: &Incidence) -> Vec<SiteRecord> {
        let records: Vec<SiteRecord> = incidence
            .iter()
            .map(|record| {
                let Normalized { site, is_canonical } =
                    self.normalize(&record.cancer_site, &record.cancer_site_code);
                SiteRecord {
                    record: record.clone(),
                    site,
                    is_canonical,
                }
            })
            .collect();
        event!(
            Level::DEBUG,
            "{} of {} rows are sub-sites of another row",
            records.iter().filter(|rec| !rec.is_canonical).count(),
            records.len()
        );
        records
    }

    /// Groups and codes that match nothing in `sites` (label/code pairs, see
    /// [`Incidence::sites`]).
    ///
    /// A new data release may relabel sites or recode sub-sites, and either leaves the table
    /// silently out of date.
    pub fn unmatched(&self, sites: &[(ArcStr, ArcStr)]) -> Vec<Unmatched> {
        let mut out = vec![];
        for group in self.groups.iter() {
            if !sites.iter().any(|(site, _)| site.trim() == group.parent.trim()) {
                out.push(Unmatched::Parent(group.parent.clone()));
            }
            for code in group.codes.iter() {
                if !sites.iter().any(|(_, c)| c.trim() == code.trim()) {
                    out.push(Unmatched::Code {
                        code: code.clone(),
                        parent: group.parent.clone(),
                    });
                }
            }
        }
        out
    }

    /// Write this table back out in the same format it is read in.
    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        #[derive(Serialize)]
        struct Out<'a> {
            summaries: &'a Summaries,
            group: &'a [CategoryGroup],
        }

        let path = path.as_ref();
        if util::path_exists(path)? {
            event!(
                Level::WARN,
                "overwriting existing file at \"{}\"",
                path.display()
            );
        }
        let text = toml::to_string_pretty(&Out {
            summaries: &self.summaries,
            group: &self.groups,
        })
        .context("serializing category table")?;
        fs::write(path, text)
            .with_context(|| format!("writing category table to \"{}\"", path.display()))
    }

    /// To display in the console/terminal.
    pub fn term_table(&self) -> tdt::Table<'static> {
        let header = tdt::Row::new()
            .with_cell(tdt::Cell::from("Code"))
            .with_cell(tdt::Cell::from("Counted in"));
        self.groups
            .iter()
            .flat_map(|group| group.codes.iter().map(move |code| (code, &group.parent)))
            .fold(tdt::Table::new().with_row(header), |tbl, (code, parent)| {
                tbl.with_row(
                    tdt::Row::new()
                        .with_cell(tdt::Cell::from(code.to_string()))
                        .with_cell(tdt::Cell::from(parent.to_string())),
                )
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mapping() -> CategoryMapping {
        CategoryMapping::builtin().unwrap()
    }

    #[test]
    fn builtin_table_parses() {
        let mapping = mapping();
        assert_eq!(mapping.groups().count(), 7);
        assert_eq!(&*mapping.summaries().nmsc, "Non-melanoma skin cancer");
    }

    #[test]
    fn sub_site_maps_to_parent() {
        let out = mapping().normalize(&"Colon".into(), "C18");
        assert_eq!(&*out.site, "Colorectal cancer");
        assert!(!out.is_canonical);

        let out = mapping().normalize(&"Basal cell carcinoma of the skin".into(), " C44 (M-8090-8098) ");
        assert_eq!(&*out.site, "Non-melanoma skin cancer");
        assert!(!out.is_canonical);
    }

    #[test]
    fn unmapped_code_is_its_own_category() {
        let out = mapping().normalize(&"Prostate".into(), "C61");
        assert_eq!(&*out.site, "Prostate");
        assert!(out.is_canonical);
    }

    #[test]
    fn idempotent() {
        let mapping = mapping();
        let first = mapping.normalize(&"Colorectal cancer".into(), "C18-C20");
        assert!(first.is_canonical);
        let second = mapping.normalize(&first.site, "C18-C20");
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_code_rejected() {
        let text = r#"
            [summaries]
            all_sites = "All"
            all_sites_excluding_nmsc = "All excl"
            nmsc = "NMSC"

            [[group]]
            parent = "A"
            codes = ["C01"]

            [[group]]
            parent = "B"
            codes = ["C02", "C01"]
        "#;
        let err = CategoryMapping::from_toml(text).unwrap_err();
        assert!(matches!(err, CategoryError::DuplicateCode { ref code, .. } if code == "C01"));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("category_map-{}.toml", std::process::id()));
        let mapping = mapping();
        mapping.save(&path).unwrap();
        let loaded = CategoryMapping::load_or_builtin(Some(path.as_path())).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded.summaries(), mapping.summaries());
        assert!(loaded.groups().eq(mapping.groups()));
    }

    #[test]
    fn unmatched_parents_and_codes() {
        let text = r#"
            [summaries]
            all_sites = "All"
            all_sites_excluding_nmsc = "All excl"
            nmsc = "NMSC"

            [[group]]
            parent = "Colorectal cancer"
            codes = ["C18", "C19-C20"]

            [[group]]
            parent = "Head and neck"
            codes = ["C00-C14"]
        "#;
        let mapping = CategoryMapping::from_toml(text).unwrap();
        let sites: Vec<(ArcStr, ArcStr)> = vec![
            ("Colorectal cancer".into(), "C18-C20".into()),
            ("Colon".into(), "C18".into()),
            ("Lip, oral cavity and pharynx".into(), "C00-C14".into()),
        ];
        assert_eq!(
            mapping.unmatched(&sites),
            [
                Unmatched::Code {
                    code: "C19-C20".into(),
                    parent: "Colorectal cancer".into()
                },
                Unmatched::Parent("Head and neck".into()),
            ]
        );
    }

    #[test]
    fn summaries_are_not_sites() {
        let mapping = mapping();
        assert!(mapping.is_summary("All cancer types"));
        assert!(mapping.is_summary("All cancer types excl. non-melanoma skin cancer"));
        assert!(!mapping.is_summary("Non-melanoma skin cancer"));
    }
}
