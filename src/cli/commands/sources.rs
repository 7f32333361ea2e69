//! `rivapi sources` command - list source capabilities
//!
//! The table is derived from the clients themselves, so it cannot drift
//! from what the download commands accept.

use clap::ValueEnum;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::clients::{make_client, Frequency, Source, Statistic, Variable};

pub fn run() -> Result<()> {
    let mut builder = Builder::default();
    builder.push_record(["Source", "Region", "Variables", "Frequencies", "Statistics"]);

    for source in Source::ALL {
        let client = make_client(source);

        let variables = Variable::value_variants()
            .iter()
            .filter(|v| client.variable_code(**v).is_ok())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let frequencies = Frequency::value_variants()
            .iter()
            .filter(|f| client.frequency_code(**f).is_ok())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let statistics = Statistic::value_variants()
            .iter()
            .filter(|s| client.statistic_code(**s).is_ok())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        builder.push_record([
            source.to_string(),
            region(source).to_string(),
            variables,
            frequencies,
            if statistics.is_empty() {
                "-".to_string()
            } else {
                statistics
            },
        ]);
    }

    println!("{}", builder.build().with(Style::sharp()));
    Ok(())
}

fn region(source: Source) -> &'static str {
    match source {
        Source::Usgs => "United States",
        Source::Bom => "Australia",
        Source::Eaufrance => "France",
    }
}
