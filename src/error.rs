use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node {0} does not belong to this graph")]
    UnknownNode(usize),

    #[error("exponent {0} is not an integer")]
    NonIntegerExponent(String),

    #[error("value {0} cannot be represented in the graph's scalar type")]
    Unrepresentable(String),

    #[error("expected {expected} inputs, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("a network needs at least two dimensions, got {0}")]
    TooFewDimensions(usize),

    #[error("edge from node {from} to node {to} would create a cycle")]
    WouldCycle { from: usize, to: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("dataset has no examples")]
    EmptyDataset,

    #[error("dataset has {inputs} input rows but {targets} targets")]
    TargetCountMismatch { inputs: usize, targets: usize },

    #[error("network output must be a single scalar, got {0} values")]
    NonScalarOutput(usize),
}

impl GraphError {
    pub fn unrepresentable(value: impl ToString) -> Self {
        GraphError::Unrepresentable(value.to_string())
    }
}
