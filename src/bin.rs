use clap::Parser;
use log::info;
use rand::{rngs::StdRng, SeedableRng};
use scalargrad::{
    config,
    train::{Dataset, Session},
    ComputationGraph, GraphError,
};
use std::{error::Error, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "sg", about = "Try out a scalar autodiff engine")]
struct Cli {
    /// Train a simple NN
    #[arg(long)]
    micrograd: bool,

    /// Write the computation graph in Graphviz DOT format
    #[arg(long, value_name = "PATH")]
    dot: Option<PathBuf>,
}

fn show_output(output: &[f64]) {
    let formatted: Vec<String> = output.iter().map(|y| format!("{:.4}", y)).collect();
    println!(" >  {:?}", formatted);
}

fn train_nn(cfg: &config::Config) -> Result<ComputationGraph<f64>, Box<dyn Error>> {
    let dataset = Dataset::demo();
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut session = Session::new(&dataset, &cfg.dims, &mut rng)?;

    println!("Goal:     ");
    show_output(dataset.targets());
    println!("Untrained:");
    show_output(&session.predictions()?);
    println!("Loss before training: {}", session.loss()?);
    println!("training...");
    let report = session.train(cfg.num_steps, cfg.learning_rate, cfg.log_every)?;
    println!("Loss after training: {}", report.final_loss);
    println!("Trained:  ");
    show_output(&session.predictions()?);

    Ok(session.into_graph())
}

// (a*d - b*c) with tanh on top, backpropagated once
fn worked_example() -> Result<ComputationGraph<f64>, GraphError> {
    let mut cg = ComputationGraph::new();
    let a = cg.new_labeled_value(1.0, "a");
    let b = cg.new_labeled_value(2.0, "b");
    let c = cg.new_labeled_value(3.0, "c");
    let d = cg.new_labeled_value(4.0, "d");

    let ad = cg.mul(a, d)?;
    let bc = cg.mul(b, c)?;
    let ad_bc = cg.sub(ad, bc)?;
    let out = cg.tanh(ad_bc)?;
    cg.set_label(out, "out")?;

    cg.set_grad(out, 1.0)?;
    cg.backward(out)?;
    Ok(cg)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = config::from_env()?;
    cfg.validate()?;

    let graph = if cli.micrograd {
        Some(train_nn(&cfg)?)
    } else if cli.dot.is_some() {
        Some(worked_example()?)
    } else {
        None
    };

    if let (Some(path), Some(graph)) = (cli.dot, graph) {
        graph.write_dot_file(&path)?;
        info!("wrote graph to {}", path.display());
    }
    Ok(())
}
