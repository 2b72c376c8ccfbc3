use crate::engine::{ComputationGraph, Operand};
use crate::error::{GraphError, TrainError};
use crate::nn::{Network, Output};
use daggy::NodeIndex;
use log::{debug, info};
use num_traits::Float;
use rand::Rng;
use std::fmt;

pub struct Dataset<T> {
    inputs: Vec<Vec<T>>,
    targets: Vec<T>,
}

impl<T> Dataset<T>
where
    T: Float,
{
    pub fn new(inputs: Vec<Vec<T>>, targets: Vec<T>) -> Result<Self, TrainError> {
        if inputs.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        if inputs.len() != targets.len() {
            return Err(TrainError::TargetCountMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        Ok(Self { inputs, targets })
    }

    pub fn inputs(&self) -> &[Vec<T>] {
        &self.inputs
    }

    pub fn targets(&self) -> &[T] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input_dim(&self) -> usize {
        self.inputs.first().map_or(0, Vec::len)
    }
}

impl Dataset<f64> {
    pub fn demo() -> Self {
        Self {
            inputs: vec![
                vec![2.0, 3.0, -1.0],
                vec![3.0, -1.0, 0.5],
                vec![0.5, 1.0, 1.0],
                vec![1.0, 1.0, -1.0],
            ],
            targets: vec![1.0, -1.0, -1.0, 1.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainReport<T> {
    pub initial_loss: T,
    pub final_loss: T,
    /// Loss after each step.
    pub history: Vec<T>,
}

pub struct Session<T>
where
    T: Float + fmt::Display,
{
    graph: ComputationGraph<T>,
    network: Network,
    parameters: Vec<NodeIndex>,
    outputs: Vec<NodeIndex>,
    loss: NodeIndex,
}

impl<T> Session<T>
where
    T: Float + fmt::Display,
{
    pub fn new<R>(dataset: &Dataset<T>, dims: &[usize], rng: &mut R) -> Result<Self, TrainError>
    where
        R: Rng + ?Sized,
    {
        let mut graph = ComputationGraph::new();
        let network = Network::new(&mut graph, dims, rng)?;
        let parameters: Vec<NodeIndex> = network.parameters().collect();

        let mut outputs = Vec::with_capacity(dataset.len());
        let mut loss = None;
        for (row, &target) in dataset.inputs().iter().zip(dataset.targets()) {
            let inputs: Vec<NodeIndex> = row.iter().map(|&x| graph.new_value(x)).collect();
            let output = match network.call(&mut graph, &inputs)? {
                Output::Scalar(node) => node,
                other => return Err(TrainError::NonScalarOutput(other.len())),
            };
            let error = graph.sub(output, Operand::Constant(target))?;
            let squared = graph.pow(error, 2)?;
            loss = Some(match loss {
                Some(acc) => graph.add(acc, squared)?,
                None => squared,
            });
            outputs.push(output);
        }
        let loss = loss.ok_or(TrainError::EmptyDataset)?;
        graph.set_label(loss, "loss")?;

        debug!(
            "built loss over {} examples: {} nodes, {} parameters",
            outputs.len(),
            graph.node_count(),
            parameters.len()
        );

        Ok(Self {
            graph,
            network,
            parameters,
            outputs,
            loss,
        })
    }

    pub fn graph(&self) -> &ComputationGraph<T> {
        &self.graph
    }

    pub fn into_graph(self) -> ComputationGraph<T> {
        self.graph
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn parameters(&self) -> &[NodeIndex] {
        &self.parameters
    }

    pub fn loss_node(&self) -> NodeIndex {
        self.loss
    }

    pub fn loss(&self) -> Result<T, GraphError> {
        self.graph.data(self.loss)
    }

    pub fn predictions(&self) -> Result<Vec<T>, GraphError> {
        self.outputs
            .iter()
            .map(|&node| self.graph.data(node))
            .collect()
    }

    // returns the loss after the update
    pub fn step(&mut self, rate: T) -> Result<T, TrainError> {
        self.graph.set_grad(self.loss, T::one())?;
        self.graph.backward(self.loss)?;
        for &p in &self.parameters {
            self.graph.descend(p, rate)?;
        }
        for &p in &self.parameters {
            self.graph.forward(p)?;
        }
        Ok(self.loss()?)
    }

    pub fn train(
        &mut self,
        steps: usize,
        rate: T,
        log_every: usize,
    ) -> Result<TrainReport<T>, TrainError> {
        let initial_loss = self.loss()?;
        info!("training {} steps at rate {}, loss {:.6}", steps, rate, initial_loss);

        let mut history = Vec::with_capacity(steps);
        for step in 1..=steps {
            let loss = self.step(rate)?;
            history.push(loss);
            if log_every > 0 && step % log_every == 0 {
                info!("step {}/{}: loss {:.6}", step, steps, loss);
            }
        }

        let final_loss = history.last().copied().unwrap_or(initial_loss);
        Ok(TrainReport {
            initial_loss,
            final_loss,
            history,
        })
    }
}
