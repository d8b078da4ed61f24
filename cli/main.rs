#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut1, ArrayViewMut2, s};
use std::path::PathBuf;
use std::process;

use mnmg_glm::data::{Table, load_table, write_predictions};
use mnmg_glm::model::{Estimator, LinearModel};
use mnmg_glm::{
    Algorithm, GlmError, Handle, OlsParams, PartitionDescriptor, RidgeParams, ols, ridge,
    run_local_group,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum EstimatorCli {
    Ols,
    Ridge,
}

#[derive(Args)]
pub struct LayoutArgs {
    /// Number of ranks simulated in this process
    #[arg(long, default_value_t = 2)]
    pub ranks: usize,

    /// Row blocks owned by each rank
    #[arg(long, default_value_t = 1)]
    pub blocks_per_rank: usize,

    /// Log the partition layout and per-call stages at info level
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct FitArgs {
    /// Path to a TSV file with a header row; all non-target columns are features
    pub data: PathBuf,

    /// Name of the label column
    #[arg(long, default_value = "y")]
    pub target: String,

    #[arg(long, value_enum, default_value_t = EstimatorCli::Ols)]
    pub estimator: EstimatorCli,

    /// Ridge shrinkage
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,

    /// Fit without an intercept (no centering)
    #[arg(long)]
    pub no_intercept: bool,

    /// Scale centered features to unit norm before solving
    #[arg(long)]
    pub normalize: bool,

    /// Solver id; only the eigendecomposition solver (1) is available
    #[arg(long, default_value_t = Algorithm::EIG_ID)]
    pub algo: u32,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Where to write the fitted model
    #[arg(long, default_value = "model.toml")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Path to a TSV file with the model's feature columns
    pub data: PathBuf,

    /// Path to a fitted model (.toml)
    #[arg(long)]
    pub model: PathBuf,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Where to write predictions
    #[arg(long, default_value = "predictions.tsv")]
    pub out: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "mnmg-glm",
    about = "Closed-form OLS and ridge regression over row-partitioned data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a linear model across simulated ranks
    #[command(about = "Fit an OLS or ridge model (outputs: model.toml)")]
    Fit(FitArgs),

    /// Apply a fitted model to new data
    #[command(about = "Predict with a fitted model (outputs: predictions.tsv)")]
    Predict(PredictArgs),
}

/// Copies the blocks `desc` assigns to this rank out of the shared table.
fn local_rows(x: ArrayView2<f64>, desc: &PartitionDescriptor) -> Vec<(usize, Array2<f64>)> {
    desc.local_blocks()
        .into_iter()
        .map(|block| {
            let rows = block.start_row..block.start_row + block.size;
            (block.start_row, x.slice(s![rows, ..]).to_owned())
        })
        .collect()
}

fn fit_rank(
    handle: &mut Handle,
    table: &Table,
    y: &Array1<f64>,
    args: &FitArgs,
) -> Result<(Array1<f64>, f64), GlmError> {
    let (m, n) = table.features.dim();
    let desc = PartitionDescriptor::even(
        m,
        n,
        handle.n_ranks(),
        args.layout.blocks_per_rank,
        handle.rank(),
    )?;
    let mut x_blocks: Vec<Array2<f64>> = local_rows(table.features.view(), &desc)
        .into_iter()
        .map(|(_, block)| block)
        .collect();
    let mut y_blocks: Vec<Array1<f64>> = desc
        .local_blocks()
        .iter()
        .map(|block| y.slice(s![block.start_row..block.start_row + block.size]).to_owned())
        .collect();
    let mut input: Vec<ArrayViewMut2<f64>> = x_blocks.iter_mut().map(|b| b.view_mut()).collect();
    let mut labels: Vec<ArrayViewMut1<f64>> = y_blocks.iter_mut().map(|b| b.view_mut()).collect();

    let mut coef = Array1::zeros(n);
    let mut intercept = 0.0;
    match args.estimator {
        EstimatorCli::Ols => ols::fit(
            handle,
            &mut input,
            &desc,
            &mut labels,
            coef.view_mut(),
            &mut intercept,
            &OlsParams {
                fit_intercept: !args.no_intercept,
                normalize: args.normalize,
                algo: args.algo,
                verbose: args.layout.verbose,
            },
        )?,
        EstimatorCli::Ridge => ridge::fit(
            handle,
            &mut input,
            &desc,
            &mut labels,
            &[args.alpha],
            coef.view_mut(),
            &mut intercept,
            &RidgeParams {
                fit_intercept: !args.no_intercept,
                normalize: args.normalize,
                algo: args.algo,
                verbose: args.layout.verbose,
            },
        )?,
    }
    Ok((coef, intercept))
}

fn check_layout(layout: &LayoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    if layout.ranks == 0 || layout.blocks_per_rank == 0 {
        return Err("--ranks and --blocks-per-rank must both be at least 1".into());
    }
    Ok(())
}

pub fn fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    check_layout(&args.layout)?;
    println!("Loading training data from: {}", args.data.display());
    let table = load_table(&args.data, Some(&args.target))?;
    let Some(y) = table.target.as_ref() else {
        return Err(format!("no target column '{}'", args.target).into());
    };
    println!(
        "Loaded {} rows with {} features",
        table.n_rows(),
        table.feature_names.len()
    );

    println!(
        "Fitting across {} rank(s) with {} block(s) each",
        args.layout.ranks, args.layout.blocks_per_rank
    );
    let results = run_local_group(args.layout.ranks, |mut handle| {
        fit_rank(&mut handle, &table, y, &args)
    });
    let mut fitted = None;
    for result in results {
        let solution = result?;
        if fitted.is_none() {
            fitted = Some(solution);
        }
    }
    let Some((coef, intercept)) = fitted else {
        return Err("no rank produced a model".into());
    };

    let (estimator, alpha) = match args.estimator {
        EstimatorCli::Ols => (Estimator::Ols, None),
        EstimatorCli::Ridge => (Estimator::Ridge, Some(args.alpha)),
    };
    let model = LinearModel {
        estimator,
        alpha,
        fit_intercept: !args.no_intercept,
        normalize: args.normalize,
        intercept,
        feature_names: table.feature_names.clone(),
        coefficients: coef.to_vec(),
    };
    model.save(&args.out)?;
    println!("Model saved to: {}", args.out.display());
    Ok(())
}

fn predict_rank(
    handle: &mut Handle,
    table: &Table,
    model: &LinearModel,
    layout: &LayoutArgs,
) -> Result<Vec<(usize, Array1<f64>)>, GlmError> {
    let (m, n) = table.features.dim();
    let desc = PartitionDescriptor::even(
        m,
        n,
        handle.n_ranks(),
        layout.blocks_per_rank,
        handle.rank(),
    )?;
    let blocks = local_rows(table.features.view(), &desc);
    let input: Vec<ArrayView2<f64>> = blocks.iter().map(|(_, block)| block.view()).collect();
    let mut outputs: Vec<Array1<f64>> = blocks
        .iter()
        .map(|(_, block)| Array1::zeros(block.nrows()))
        .collect();
    let mut preds: Vec<ArrayViewMut1<f64>> = outputs.iter_mut().map(|o| o.view_mut()).collect();

    let coef = model.coef();
    ols::predict(
        handle,
        desc.parts(),
        m,
        n,
        &input,
        coef.view(),
        model.intercept,
        &mut preds,
        layout.verbose,
    )?;
    drop(preds);
    Ok(blocks
        .iter()
        .map(|(start, _)| *start)
        .zip(outputs)
        .collect())
}

pub fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    check_layout(&args.layout)?;
    let model = LinearModel::load(&args.model)?;
    println!("Loaded {:?} model with {} features", model.estimator, model.n_features());
    let table = load_table(&args.data, None)?;
    model.check_features(&table.feature_names)?;

    let results = run_local_group(args.layout.ranks, |mut handle| {
        predict_rank(&mut handle, &table, &model, &args.layout)
    });
    let mut predictions = Array1::zeros(table.n_rows());
    for result in results {
        for (start, block) in result? {
            predictions
                .slice_mut(s![start..start + block.len()])
                .assign(&block);
        }
    }

    write_predictions(&args.out, predictions.view())?;
    println!(
        "Wrote {} predictions to: {}",
        predictions.len(),
        args.out.display()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Fit(args)) => fit(args),
        Some(Commands::Predict(args)) => predict(args),
        None => Cli::command()
            .print_help()
            .map(|_| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
