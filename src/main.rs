use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use burn::backend::{NdArray, Wgpu};
use burn::module::Module;
use burn::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ic50_mca::batch::PredictionBatch;
use ic50_mca::model::{Ic50McaConfig, DEFAULT_NUM_GENES};
use ic50_mca::{ensure_finite, weights, Result};

#[derive(Parser)]
#[command(
    name = "ic50-mca",
    version,
    about = "IC50 prediction with gene-conditioned attention over compound encodings"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a model configuration with default hyperparameters
    Config {
        /// Token vocabulary size (id 0 is padding)
        #[arg(long)]
        vocab_size: usize,
        /// Padded token sequence length
        #[arg(long)]
        max_len: usize,
        /// Gene panel size
        #[arg(long, default_value_t = DEFAULT_NUM_GENES)]
        num_genes: usize,
        /// Features per gene (1 = expression only)
        #[arg(long, default_value_t = 1)]
        gene_features: usize,
        /// Also compute gene × molecule score-matrix attention
        #[arg(long)]
        score_matrix: bool,
        /// Output JSON file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the parameter count of a configured model
    Params {
        /// Model configuration JSON
        #[arg(long)]
        config: PathBuf,
    },
    /// Predict IC50 for a batch of (tokens, genes) pairs
    Predict(PredictArgs),
}

#[derive(Args)]
struct PredictArgs {
    /// Model configuration JSON
    #[arg(long)]
    config: PathBuf,
    /// Batch JSON: {"tokens": [[..]], "genes": [[..]] or [[[..]]]}
    #[arg(long)]
    input: PathBuf,
    /// Trained weights (.mpk); without it the model is randomly initialized
    #[arg(long)]
    weights: Option<PathBuf>,
    /// Run on the wgpu backend instead of the CPU
    #[arg(long)]
    gpu: bool,
    /// Include attention weights in the output
    #[arg(long)]
    alphas: bool,
}

#[derive(Serialize)]
struct PredictionReport {
    predictions: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gene_alphas: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_alphas: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_matrix: Option<ScoreMatrixReport>,
}

#[derive(Serialize)]
struct ScoreMatrixReport {
    gene_alphas: Vec<Vec<f32>>,
    molecule_alphas: Vec<Vec<f32>>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Config {
            vocab_size,
            max_len,
            num_genes,
            gene_features,
            score_matrix,
            output,
        } => cmd_config(vocab_size, max_len, num_genes, gene_features, score_matrix, output),
        Command::Params { config } => cmd_params(config),
        Command::Predict(args) => cmd_predict(args),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn cmd_config(
    vocab_size: usize,
    max_len: usize,
    num_genes: usize,
    gene_features: usize,
    score_matrix: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = Ic50McaConfig::new(vocab_size, max_len)
        .with_num_genes(num_genes)
        .with_gene_feature_count(gene_features)
        .with_score_matrix(score_matrix);
    config.validate()?;

    match output {
        Some(path) => {
            config.save(&path)?;
            tracing::info!(path = %path.display(), "wrote configuration");
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn cmd_params(config: PathBuf) -> Result<()> {
    let config = Ic50McaConfig::from_file(&config)?;
    let model = config.init::<NdArray>(&Default::default())?;
    println!("{}", model.num_params());
    Ok(())
}

fn cmd_predict(args: PredictArgs) -> Result<()> {
    if args.gpu {
        let device = burn::backend::wgpu::WgpuDevice::default();
        predict_with_device::<Wgpu>(&args, &device)
    } else {
        predict_with_device::<NdArray>(&args, &Default::default())
    }
}

fn predict_with_device<B: Backend>(args: &PredictArgs, device: &B::Device) -> Result<()> {
    let config = Ic50McaConfig::from_file(&args.config)?;
    let batch: PredictionBatch = serde_json::from_str(&std::fs::read_to_string(&args.input)?)?;

    let model = config.init::<B>(device)?;
    let model = match &args.weights {
        Some(path) => weights::load(model, path, device)?,
        None => {
            tracing::warn!("no --weights given, predicting with untrained parameters");
            model
        }
    };

    let (tokens, genes) = batch.to_tensors::<B>(&config, device)?;
    tracing::info!(pairs = batch.tokens.len(), "running forward pass");

    let out = model.forward(tokens, &genes)?;
    ensure_finite(&out.prediction, "prediction")?;

    let score_matrix = match (args.alphas, out.score_matrix) {
        (true, Some(matrix)) => Some(ScoreMatrixReport {
            gene_alphas: rows(matrix.gene_alphas),
            molecule_alphas: rows(matrix.molecule_alphas),
        }),
        _ => None,
    };

    let report = PredictionReport {
        predictions: out.prediction.into_data().iter::<f32>().collect(),
        gene_alphas: args.alphas.then(|| rows(out.gene_alphas)),
        context_alphas: args.alphas.then(|| rows(out.context_alphas)),
        score_matrix,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn rows<B: Backend>(t: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, width] = t.dims();
    let values: Vec<f32> = t.into_data().iter::<f32>().collect();
    values.chunks(width.max(1)).map(|c| c.to_vec()).collect()
}
