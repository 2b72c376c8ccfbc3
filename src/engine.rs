use crate::error::GraphError;
use daggy::petgraph::visit::{DfsPostOrder, Reversed};
use daggy::{Dag, NodeIndex, Walker};
use log::{debug, trace};
use num_traits::Float;
use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

pub struct Value<T>
where
    T: Float + fmt::Display,
{
    data: T,
    grad: T,
    op: Op,
    label: Option<&'static str>,
}

impl<T> Value<T>
where
    T: Float + fmt::Display,
{
    fn new(data: T, op: Op) -> Self {
        Self {
            data,
            grad: T::zero(),
            op,
            label: None,
        }
    }

    pub fn data(&self) -> T {
        self.data
    }

    pub fn grad(&self) -> T {
        self.grad
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn label(&self) -> Option<&'static str> {
        self.label
    }
}

impl<T> fmt::Display for Value<T>
where
    T: Float + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Value {} {{ data: {:.4}, grad: {:.4} }}",
            self.label.unwrap_or("_"),
            self.data,
            self.grad
        )
    }
}

// Subtraction, negation and division are built from Sum, Product and Pow
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Leaf,
    Sum {
        addend_1: NodeIndex,
        addend_2: NodeIndex,
    },
    Product {
        factor_1: NodeIndex,
        factor_2: NodeIndex,
    },
    Tanh {
        operand: NodeIndex,
    },
    Pow {
        operand: NodeIndex,
        k: i32,
    },
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Leaf => "",
            Op::Sum { .. } => "+",
            Op::Product { .. } => "*",
            Op::Tanh { .. } => "tanh",
            Op::Pow { .. } => "^",
        }
    }

    pub fn operands(&self) -> Vec<NodeIndex> {
        match *self {
            Op::Leaf => Vec::new(),
            Op::Sum { addend_1, addend_2 } => vec![addend_1, addend_2],
            Op::Product { factor_1, factor_2 } => vec![factor_1, factor_2],
            Op::Tanh { operand } | Op::Pow { operand, .. } => vec![operand],
        }
    }
}

// operand slot of the consumer the edge feeds
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot(pub u8);

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Operand<T> {
    Node(NodeIndex),
    Constant(T),
}

impl<T> From<NodeIndex> for Operand<T> {
    fn from(node: NodeIndex) -> Self {
        Operand::Node(node)
    }
}

impl From<f64> for Operand<f64> {
    fn from(constant: f64) -> Self {
        Operand::Constant(constant)
    }
}

impl From<f32> for Operand<f32> {
    fn from(constant: f32) -> Self {
        Operand::Constant(constant)
    }
}

pub struct ComputationGraph<T>
where
    T: Float + fmt::Display,
{
    graph: Dag<Value<T>, Slot>,
}

impl<T> ComputationGraph<T>
where
    T: Float + fmt::Display,
{
    pub fn new() -> Self {
        Self { graph: Dag::new() }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    // Adds a leaf to the DAG and returns its NodeIndex
    pub fn new_value(&mut self, data: T) -> NodeIndex {
        self.graph.add_node(Value::new(data, Op::Leaf))
    }

    pub fn new_labeled_value(&mut self, data: T, label: &'static str) -> NodeIndex {
        let node = self.new_value(data);
        self.graph[node].label = Some(label);
        node
    }

    pub fn set_label(&mut self, node: NodeIndex, label: &'static str) -> Result<(), GraphError> {
        self.value_mut(node)?.label = Some(label);
        Ok(())
    }

    pub fn value(&self, node: NodeIndex) -> Result<&Value<T>, GraphError> {
        self.graph
            .node_weight(node)
            .ok_or(GraphError::UnknownNode(node.index()))
    }

    fn value_mut(&mut self, node: NodeIndex) -> Result<&mut Value<T>, GraphError> {
        self.graph
            .node_weight_mut(node)
            .ok_or(GraphError::UnknownNode(node.index()))
    }

    pub fn data(&self, node: NodeIndex) -> Result<T, GraphError> {
        Ok(self.value(node)?.data)
    }

    pub fn grad(&self, node: NodeIndex) -> Result<T, GraphError> {
        Ok(self.value(node)?.grad)
    }

    // consumers stay stale until the next forward
    pub fn set_data(&mut self, node: NodeIndex, data: T) -> Result<(), GraphError> {
        self.value_mut(node)?.data = data;
        Ok(())
    }

    pub fn set_grad(&mut self, node: NodeIndex, grad: T) -> Result<(), GraphError> {
        self.value_mut(node)?.grad = grad;
        Ok(())
    }

    pub fn op(&self, node: NodeIndex) -> Result<Op, GraphError> {
        Ok(self.value(node)?.op)
    }

    pub fn operands(&self, node: NodeIndex) -> Result<Vec<NodeIndex>, GraphError> {
        Ok(self.value(node)?.op.operands())
    }

    // Construction order; `a + a` lists its consumer twice.
    pub fn consumers(&self, node: NodeIndex) -> Result<Vec<NodeIndex>, GraphError> {
        self.value(node)?;
        let mut consumers = Vec::new();
        let mut children = self.graph.children(node);
        while let Some((_, consumer)) = children.walk_next(&self.graph) {
            consumers.push(consumer);
        }
        // petgraph walks the newest edge first
        consumers.reverse();
        Ok(consumers)
    }

    pub fn zero_grad(&mut self) {
        let nodes: Vec<NodeIndex> = self.graph.graph().node_indices().collect();
        for node in nodes {
            self.graph[node].grad = T::zero();
        }
    }

    pub fn add(
        &mut self,
        lhs: impl Into<Operand<T>>,
        rhs: impl Into<Operand<T>>,
    ) -> Result<NodeIndex, GraphError> {
        let (addend_1, addend_2) = self.resolve_pair(lhs.into(), rhs.into())?;
        let data = self.graph[addend_1].data + self.graph[addend_2].data;
        self.new_computation(data, Op::Sum { addend_1, addend_2 })
    }

    pub fn mul(
        &mut self,
        lhs: impl Into<Operand<T>>,
        rhs: impl Into<Operand<T>>,
    ) -> Result<NodeIndex, GraphError> {
        let (factor_1, factor_2) = self.resolve_pair(lhs.into(), rhs.into())?;
        let data = self.graph[factor_1].data * self.graph[factor_2].data;
        self.new_computation(data, Op::Product { factor_1, factor_2 })
    }

    pub fn neg(&mut self, x: impl Into<Operand<T>>) -> Result<NodeIndex, GraphError> {
        self.mul(x, Operand::Constant(-T::one()))
    }

    pub fn sub(
        &mut self,
        lhs: impl Into<Operand<T>>,
        rhs: impl Into<Operand<T>>,
    ) -> Result<NodeIndex, GraphError> {
        let (lhs, rhs) = self.resolve_pair(lhs.into(), rhs.into())?;
        let negated = self.neg(rhs)?;
        self.add(lhs, negated)
    }

    pub fn div(
        &mut self,
        lhs: impl Into<Operand<T>>,
        rhs: impl Into<Operand<T>>,
    ) -> Result<NodeIndex, GraphError> {
        let (lhs, rhs) = self.resolve_pair(lhs.into(), rhs.into())?;
        let inverse = self.pow(rhs, -1)?;
        self.mul(lhs, inverse)
    }

    pub fn tanh(&mut self, x: impl Into<Operand<T>>) -> Result<NodeIndex, GraphError> {
        let operand = self.resolve(x.into())?;
        let data = self.graph[operand].data.tanh();
        self.new_computation(data, Op::Tanh { operand })
    }

    pub fn pow(&mut self, x: impl Into<Operand<T>>, k: i32) -> Result<NodeIndex, GraphError> {
        T::from(k).ok_or_else(|| GraphError::unrepresentable(k))?;
        let operand = self.resolve(x.into())?;
        let data = self.graph[operand].data.powi(k);
        self.new_computation(data, Op::Pow { operand, k })
    }

    pub fn try_pow(
        &mut self,
        x: impl Into<Operand<T>>,
        exponent: T,
    ) -> Result<NodeIndex, GraphError> {
        if exponent.fract() != T::zero() {
            return Err(GraphError::NonIntegerExponent(exponent.to_string()));
        }
        let k = exponent
            .to_i32()
            .ok_or_else(|| GraphError::NonIntegerExponent(exponent.to_string()))?;
        self.pow(x, k)
    }

    pub fn evaluate(&self, node: NodeIndex) -> Result<T, GraphError> {
        let value = self.value(node)?;
        Ok(self.recompute(value.op).unwrap_or(value.data))
    }

    /// Pushes gradient from `root` into every node it depends on. The caller
    /// seeds the root's gradient first. Gradients are never reset here.
    pub fn backward(&mut self, root: NodeIndex) -> Result<(), GraphError> {
        self.value(root)?;
        let order = self.operand_closure(root);
        debug!("backward from node {} over {} nodes", root.index(), order.len());
        for node in order {
            for (operand, delta) in self.local_gradients(node).into_iter().flatten() {
                trace!("node {} -> node {}: {}", node.index(), operand.index(), delta);
                let operand = &mut self.graph[operand];
                operand.grad = operand.grad + delta;
            }
        }
        Ok(())
    }

    // zeroes the gradient of every node it touches, `leaf` included
    pub fn forward(&mut self, leaf: NodeIndex) -> Result<(), GraphError> {
        self.value(leaf)?;
        let order = self.consumer_closure(leaf);
        debug!("forward from node {} over {} nodes", leaf.index(), order.len());
        for node in order {
            let value = &self.graph[node];
            let data = self.recompute(value.op).unwrap_or(value.data);
            let value = &mut self.graph[node];
            value.data = data;
            value.grad = T::zero();
        }
        Ok(())
    }

    pub fn descend(&mut self, node: NodeIndex, rate: T) -> Result<(), GraphError> {
        let value = self.value_mut(node)?;
        value.data = value.data - value.grad * rate;
        Ok(())
    }

    fn resolve(&mut self, operand: Operand<T>) -> Result<NodeIndex, GraphError> {
        match operand {
            Operand::Node(node) => self.value(node).map(|_| node),
            Operand::Constant(data) => Ok(self.new_value(data)),
        }
    }

    // Both handles are checked before any constant is promoted, so a bad
    // handle leaves the graph untouched.
    fn resolve_pair(
        &mut self,
        lhs: Operand<T>,
        rhs: Operand<T>,
    ) -> Result<(NodeIndex, NodeIndex), GraphError> {
        for operand in [lhs, rhs] {
            if let Operand::Node(node) = operand {
                self.value(node)?;
            }
        }
        Ok((self.resolve(lhs)?, self.resolve(rhs)?))
    }

    // Stores the result as a new node whose incoming edges come from its
    // operands. Return the NodeIndex of the newly created node.
    fn new_computation(&mut self, data: T, op: Op) -> Result<NodeIndex, GraphError> {
        let out = self.graph.add_node(Value::new(data, op));
        for (slot, operand) in op.operands().into_iter().enumerate() {
            self.graph
                .add_edge(operand, out, Slot(slot as u8))
                .map_err(|_| GraphError::WouldCycle {
                    from: operand.index(),
                    to: out.index(),
                })?;
        }
        Ok(out)
    }

    fn recompute(&self, op: Op) -> Option<T> {
        let data = |node: NodeIndex| self.graph[node].data;
        match op {
            Op::Leaf => None,
            Op::Sum { addend_1, addend_2 } => Some(data(addend_1) + data(addend_2)),
            Op::Product { factor_1, factor_2 } => Some(data(factor_1) * data(factor_2)),
            Op::Tanh { operand } => Some(data(operand).tanh()),
            Op::Pow { operand, k } => Some(data(operand).powi(k)),
        }
    }

    // Contributions `node` pushes into its operands given its current grad.
    fn local_gradients(&self, node: NodeIndex) -> [Option<(NodeIndex, T)>; 2] {
        let value = &self.graph[node];
        let grad = value.grad;
        let data = |node: NodeIndex| self.graph[node].data;
        match value.op {
            Op::Leaf => [None, None],
            Op::Sum { addend_1, addend_2 } => [Some((addend_1, grad)), Some((addend_2, grad))],
            Op::Product { factor_1, factor_2 } => [
                Some((factor_1, grad * data(factor_2))),
                Some((factor_2, grad * data(factor_1))),
            ],
            Op::Tanh { operand } => [
                Some((operand, grad * (T::one() - value.data * value.data))),
                None,
            ],
            Op::Pow { operand, k } => {
                // castability is checked when the node is built
                let k_t = T::from(k).unwrap_or_else(T::nan);
                let local = k_t * data(operand).powi(k.saturating_sub(1));
                [Some((operand, grad * local)), None]
            }
        }
    }

    // Nodes `root` depends on, root first, every node after all of its
    // consumers inside the closure.
    fn operand_closure(&self, root: NodeIndex) -> Vec<NodeIndex> {
        let graph = Reversed(self.graph.graph());
        let mut dfs = DfsPostOrder::new(graph, root);
        let mut order = Vec::new();
        while let Some(node) = dfs.next(graph) {
            order.push(node);
        }
        order.reverse();
        order
    }

    // Nodes depending on `leaf`, leaf first, every node after all of its
    // operands inside the closure.
    fn consumer_closure(&self, leaf: NodeIndex) -> Vec<NodeIndex> {
        let graph = self.graph.graph();
        let mut dfs = DfsPostOrder::new(graph, leaf);
        let mut order = Vec::new();
        while let Some(node) = dfs.next(graph) {
            order.push(node);
        }
        order.reverse();
        order
    }

    pub fn write_dot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "digraph {{")?;
        writeln!(out, r#"    rankdir="LR""#)?;
        writeln!(out, "    node [shape=record]")?;

        for (index, node) in self.graph.raw_nodes().iter().enumerate() {
            let value = &node.weight;
            writeln!(
                out,
                r#"    {} [label="{{ {} | data: {:.4} | grad: {:.4} }}"]"#,
                index,
                value.label.unwrap_or(""),
                value.data,
                value.grad
            )?;
            if value.op != Op::Leaf {
                writeln!(
                    out,
                    r#"    op{} [label="{}" shape=circle]"#,
                    index,
                    value.op.as_str()
                )?;
                writeln!(out, "    op{} -> {}", index, index)?;
            }
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                out,
                "    {} -> op{}",
                edge.source().index(),
                edge.target().index()
            )?;
        }
        writeln!(out, "}}")
    }

    pub fn write_dot_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut file = BufWriter::new(File::create(path)?);
        self.write_dot(&mut file)?;
        file.flush()?;
        debug!("wrote {} nodes to {}", self.node_count(), path.display());
        Ok(())
    }
}

impl<T> Default for ComputationGraph<T>
where
    T: Float + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}
