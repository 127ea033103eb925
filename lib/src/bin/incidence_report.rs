use clap::Parser;
use hb_cancer_incidence::{
    report::{Report, ReportOptions},
    CategoryMapping, Config, Incidence, LoadFilter,
};
use qu::ick_use::*;
use std::path::PathBuf;

#[derive(Parser)]
struct Opt {
    /// Settings for the run. Defaults are used for anything missing.
    #[clap(long, short, default_value = "../report.toml")]
    config: PathBuf,
    /// Print the tables without writing any files.
    #[clap(long)]
    dry_run: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let mapping = CategoryMapping::load_or_builtin(config.category_map.as_deref())?;
    let incidence = Incidence::load(&config.input, &LoadFilter::new(&config, &mapping))?;

    let report = Report::build(&incidence, &mapping, ReportOptions::from(&config))?;
    report.print();
    if opt.dry_run {
        event!(Level::INFO, "dry run, not writing output");
    } else {
        report.save(&config.output)?;
    }
    Ok(())
}
