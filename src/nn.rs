use crate::engine::ComputationGraph;
use crate::error::GraphError;
use daggy::NodeIndex;
use num_traits::Float;
use rand::{distributions::Uniform, prelude::Distribution, Rng};
use std::{fmt, iter};

fn random_leaf<T, R>(
    cg: &mut ComputationGraph<T>,
    between: &Uniform<f64>,
    rng: &mut R,
    label: &'static str,
) -> Result<NodeIndex, GraphError>
where
    T: Float + fmt::Display,
    R: Rng + ?Sized,
{
    let sample = between.sample(rng);
    let data = T::from(sample).ok_or_else(|| GraphError::unrepresentable(sample))?;
    Ok(cg.new_labeled_value(data, label))
}

// W = dim_in = # of weights
pub struct Neuron {
    weights: Vec<NodeIndex>,
    bias: NodeIndex,
}

impl Neuron {
    pub fn new<T, R>(
        cg: &mut ComputationGraph<T>,
        dim_in: usize,
        rng: &mut R,
    ) -> Result<Self, GraphError>
    where
        T: Float + fmt::Display,
        R: Rng + ?Sized,
    {
        let between = Uniform::new_inclusive(-1.0, 1.0);

        let mut weights = Vec::with_capacity(dim_in);
        for _ in 0..dim_in {
            weights.push(random_leaf(cg, &between, rng, "w")?);
        }
        let bias = random_leaf(cg, &between, rng, "b")?;

        Ok(Self { weights, bias })
    }

    pub fn dim_in(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[NodeIndex] {
        &self.weights
    }

    pub fn bias(&self) -> NodeIndex {
        self.bias
    }

    // tanh(b + x_0 * w_0 + x_1 * w_1 + ...). Unlike a zip, a short or long
    // input is an error rather than silently truncated.
    pub fn call<T>(
        &self,
        cg: &mut ComputationGraph<T>,
        inputs: &[NodeIndex],
    ) -> Result<NodeIndex, GraphError>
    where
        T: Float + fmt::Display,
    {
        if inputs.len() != self.weights.len() {
            return Err(GraphError::DimensionMismatch {
                expected: self.weights.len(),
                actual: inputs.len(),
            });
        }

        let mut activation = self.bias;
        for (&x, &w) in inputs.iter().zip(&self.weights) {
            let xw = cg.mul(x, w)?;
            activation = cg.add(activation, xw)?;
        }
        cg.tanh(activation)
    }

    // bias first
    pub fn parameters(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        iter::once(self.bias).chain(self.weights.iter().copied())
    }
}

// N = dim_out = # of neurons
pub struct Layer {
    neurons: Vec<Neuron>,
}

impl Layer {
    pub fn new<T, R>(
        cg: &mut ComputationGraph<T>,
        dim_in: usize,
        dim_out: usize,
        rng: &mut R,
    ) -> Result<Self, GraphError>
    where
        T: Float + fmt::Display,
        R: Rng + ?Sized,
    {
        let neurons = (0..dim_out)
            .map(|_| Neuron::new(cg, dim_in, rng))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { neurons })
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn dim_out(&self) -> usize {
        self.neurons.len()
    }

    pub fn call<T>(
        &self,
        cg: &mut ComputationGraph<T>,
        inputs: &[NodeIndex],
    ) -> Result<Vec<NodeIndex>, GraphError>
    where
        T: Float + fmt::Display,
    {
        self.neurons
            .iter()
            .map(|neuron| neuron.call(cg, inputs))
            .collect()
    }

    pub fn parameters(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.neurons.iter().flat_map(Neuron::parameters)
    }
}

// a final layer of width one collapses to Scalar
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Scalar(NodeIndex),
    Vector(Vec<NodeIndex>),
}

impl Output {
    pub fn scalar(&self) -> Option<NodeIndex> {
        match self {
            Output::Scalar(node) => Some(*node),
            Output::Vector(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Output::Scalar(_) => 1,
            Output::Vector(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<NodeIndex> {
        match self {
            Output::Scalar(node) => vec![node],
            Output::Vector(nodes) => nodes,
        }
    }
}

// L = dims.len() - 1 = # of layers, layer i maps dims[i] -> dims[i + 1]
pub struct Network {
    layers: Vec<Layer>,
    dims: Vec<usize>,
}

impl Network {
    pub fn new<T, R>(
        cg: &mut ComputationGraph<T>,
        dims: &[usize],
        rng: &mut R,
    ) -> Result<Self, GraphError>
    where
        T: Float + fmt::Display,
        R: Rng + ?Sized,
    {
        if dims.len() < 2 {
            return Err(GraphError::TooFewDimensions(dims.len()));
        }

        let layers = dims
            .windows(2)
            .map(|pair| Layer::new(cg, pair[0], pair[1], rng))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            layers,
            dims: dims.to_vec(),
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn call<T>(
        &self,
        cg: &mut ComputationGraph<T>,
        inputs: &[NodeIndex],
    ) -> Result<Output, GraphError>
    where
        T: Float + fmt::Display,
    {
        let mut axon = inputs.to_vec();
        for layer in &self.layers {
            axon = layer.call(cg, &axon)?;
        }

        if axon.len() == 1 {
            Ok(Output::Scalar(axon[0]))
        } else {
            Ok(Output::Vector(axon))
        }
    }

    pub fn parameters(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.layers.iter().flat_map(Layer::parameters)
    }

    pub fn parameter_count(&self) -> usize {
        self.dims.windows(2).map(|pair| (pair[0] + 1) * pair[1]).sum()
    }
}
