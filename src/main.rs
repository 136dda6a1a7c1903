use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use dpresence::io::{read_csv, read_hierarchy, write_csv};
use dpresence::{
    AggregateFunction, AnonymizationConfig, Anonymizer, AttributeRole, DataType, DateFormat,
    DateHierarchyBuilder, DatasetDefinition, Granularity, LossMetric, PresenceBounds,
    SubsetRelation, UnmatchedRowPolicy, View,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Aggregate {
    Mean,
    Geometric,
    Sum,
    Max,
}

impl From<Aggregate> for AggregateFunction {
    fn from(aggregate: Aggregate) -> Self {
        match aggregate {
            Aggregate::Mean => AggregateFunction::ArithmeticMean,
            Aggregate::Geometric => AggregateFunction::GeometricMean,
            Aggregate::Sum => AggregateFunction::Sum,
            Aggregate::Max => AggregateFunction::Maximum,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputView {
    Population,
    Subset,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Population file
    #[arg(short, long)]
    population: PathBuf,
    /// Research subset file, matched to the population on the identifying attributes
    #[arg(short, long)]
    subset: PathBuf,
    /// Output file
    #[arg(short, long)]
    output: PathBuf,
    /// Delimiter for input/output files
    #[arg(short, long, default_value = ";")]
    delimiter: char,
    /// Identifying attributes (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    identifying: Vec<String>,
    /// Quasi-identifying attributes (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    quasi: Vec<String>,
    /// Attributes holding integers (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    integer: Vec<String>,
    /// Date attribute and its strftime format, as NAME=FORMAT
    #[arg(long)]
    date: Vec<String>,
    /// Hierarchy table for an attribute, as NAME=PATH
    #[arg(long)]
    hierarchy: Vec<String>,
    /// Date attributes whose hierarchy is derived from the data (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    date_hierarchy: Vec<String>,
    /// Granularities of derived date hierarchies, finest first
    #[arg(long, value_delimiter = ',', default_value = "day,month,year,decade,century")]
    granularities: Vec<Granularity>,
    /// Lower bound on the share of subset rows in every class
    #[arg(long, default_value = "0.0")]
    delta_min: f64,
    /// Upper bound on the share of subset rows in every class
    #[arg(long, default_value = "0.1")]
    delta_max: f64,
    /// Largest fraction of rows that may be suppressed
    #[arg(long, default_value = "0.1")]
    suppression_limit: f64,
    /// Loss weight of an attribute, as NAME=WEIGHT
    #[arg(long)]
    weight: Vec<String>,
    /// How per-attribute losses are combined
    #[arg(long, value_enum, default_value = "mean")]
    aggregate: Aggregate,
    /// Rows to write
    #[arg(long, value_enum, default_value = "subset")]
    view: OutputView,
    /// Size of the worker pool
    #[arg(long)]
    threads: Option<usize>,
    /// Ignore subset rows that have no match in the population
    #[arg(long)]
    drop_unmatched: bool,
}

fn split_pair(value: &str) -> Result<(&str, &str)> {
    value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got {:?}", value))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let population = read_csv(&args.population, args.delimiter)
        .context("Could not read population file")?;
    let research =
        read_csv(&args.subset, args.delimiter).context("Could not read subset file")?;

    let mut definition = DatasetDefinition::for_dataset(&population);
    for name in &args.identifying {
        definition.set_role(name, AttributeRole::Identifying)?;
    }
    for name in &args.quasi {
        definition.set_role(name, AttributeRole::QuasiIdentifying)?;
    }
    for name in &args.integer {
        definition.set_data_type(name, DataType::Integer)?;
    }
    let mut formats = vec![];
    for entry in &args.date {
        let (name, format) = split_pair(entry)?;
        definition.set_data_type(name, DataType::Date(DateFormat::new(format)))?;
        formats.push((name, format));
    }
    for entry in &args.hierarchy {
        let (name, path) = split_pair(entry)?;
        let hierarchy = read_hierarchy(path.as_ref(), args.delimiter)
            .with_context(|| format!("Could not read hierarchy for {}", name))?;
        definition.set_hierarchy(name, hierarchy)?;
    }
    for name in &args.date_hierarchy {
        let format = formats
            .iter()
            .find(|(date, _)| *date == name.as_str())
            .map(|(_, format)| *format)
            .ok_or_else(|| anyhow!("no --date format given for {}", name))?;
        let builder = DateHierarchyBuilder::new(format, &args.granularities)?;
        definition.set_hierarchy(name, builder)?;
    }

    let policy = if args.drop_unmatched {
        UnmatchedRowPolicy::Drop
    } else {
        UnmatchedRowPolicy::Fail
    };
    let subset = SubsetRelation::build(&population, &definition, &research, policy)
        .context("Could not match the subset to the population")?;
    info!(
        "Subset holds {} of {} population rows",
        subset.len(),
        population.num_rows()
    );

    let mut metric = LossMetric::new(args.aggregate.into());
    for entry in &args.weight {
        let (name, weight) = split_pair(entry)?;
        let weight: f64 = weight
            .parse()
            .with_context(|| format!("Invalid weight for {}", name))?;
        metric.set_attribute_weight(name, weight)?;
    }
    let mut config = AnonymizationConfig::new(PresenceBounds::new(args.delta_min, args.delta_max)?)
        .with_suppression_limit(args.suppression_limit)?
        .with_metric(metric)
        .with_progress(true);
    if let Some(threads) = args.threads {
        config = config.with_threads(threads)?;
    }

    let result = Anonymizer::new(config)
        .anonymize(&population, &definition, &subset)
        .context("Anonymization failed")?;
    println!("{:?}", result.transformation().levels());
    println!("{} {}", result.lowest_score(), result.highest_score());

    let view = match args.view {
        OutputView::Population => View::Population,
        OutputView::Subset => View::Subset,
    };
    write_csv(&args.output, &result.output(view), args.delimiter)
        .context("Could not write output file")?;
    Ok(())
}
