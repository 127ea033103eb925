use clap::Parser;
use hb_cancer_incidence::{
    aggregate::share, header, CategoryMapping, Config, Incidence, LoadFilter,
};
use qu::ick_use::*;
use std::path::PathBuf;
use term_data_table::{Cell, Row, Table};

#[derive(Parser)]
struct Opt {
    #[clap(long, short, default_value = "../report.toml")]
    config: PathBuf,
    /// Also print every loaded record.
    #[clap(long)]
    records: bool,
    /// Write the category table in use to this path, as a starting point for a custom one.
    #[clap(long)]
    write_map: Option<PathBuf>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let mapping = CategoryMapping::load_or_builtin(config.category_map.as_deref())?;
    let incidence = Incidence::load(&config.input, &LoadFilter::new(&config, &mapping))?;

    header("Data stats");
    println!("health board: {}", config.health_board);
    println!("total records: {}", incidence.len());
    if let Some((first, last)) = incidence.year_span() {
        println!("years: {} - {}", first, last);
    }

    header("Sexes");
    let sexes = incidence.count_sexes();
    let total: u64 = sexes.iter().map(|(_, count)| count).sum();
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Sex"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    );
    for (label, count) in sexes {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(label.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!("{:.1}%", share(count, total)))),
        );
    }
    println!("{}", table);

    header("Sites");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Site"))
            .with_cell(Cell::from("Code"))
            .with_cell(Cell::from("Counted in"))
            .with_cell(Cell::from("Canonical")),
    );
    let mut sub_sites = 0;
    for (site, code) in incidence.sites() {
        let normalized = mapping.normalize(&site, &code);
        if !normalized.is_canonical {
            sub_sites += 1;
        }
        let counted_in = if mapping.is_summary(&site) {
            "(summary)".to_string()
        } else {
            normalized.site.to_string()
        };
        table.add_row(
            Row::new()
                .with_cell(Cell::from(site.to_string()))
                .with_cell(Cell::from(code.to_string()))
                .with_cell(Cell::from(counted_in))
                .with_cell(Cell::from(if normalized.is_canonical { "yes" } else { "no" })),
        );
    }
    println!("{}", table);
    println!("{} sub-sites counted in a parent site", sub_sites);

    for unmatched in mapping.unmatched(&incidence.sites()) {
        event!(Level::WARN, "{}", unmatched);
    }

    header("Category table");
    println!("{}", mapping.term_table());

    if opt.records {
        header("Records");
        println!("{}", incidence.term_table());
    }
    if let Some(path) = opt.write_map.as_ref() {
        mapping.save(path)?;
        event!(Level::INFO, "category table written to \"{}\"", path.display());
    }
    Ok(())
}
