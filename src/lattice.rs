use std::fmt;

use crate::error::{config_error, Result};

/// A transformation: one generalization level per quasi-identifier.
///
/// `Ord` is the lexicographic order of the level vectors, used to break ties.
/// The lattice order is [`Node::precedes`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(Vec<usize>);

impl Node {
    pub fn new(levels: Vec<usize>) -> Self {
        Self(levels)
    }

    pub fn levels(&self) -> &[usize] {
        &self.0
    }

    /// Sum of the levels; the height of the node in the lattice.
    pub fn rank(&self) -> usize {
        self.0.iter().sum()
    }

    /// `true` iff every level of `self` is at most the matching level of `other`.
    pub fn precedes(&self, other: &Node) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a <= b)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<Vec<usize>> for Node {
    fn from(levels: Vec<usize>) -> Self {
        Node(levels)
    }
}

/// All transformations for the given hierarchy heights.
///
/// Nodes are addressed by a dense index (mixed radix, last attribute fastest),
/// so per-node data can live in flat vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lattice {
    heights: Vec<usize>,
    strides: Vec<usize>,
    size: usize,
}

impl Lattice {
    pub fn new(heights: Vec<usize>) -> Result<Self> {
        let mut strides = vec![0; heights.len()];
        let mut size: usize = 1;
        for (i, height) in heights.iter().enumerate().rev() {
            strides[i] = size;
            size = height
                .checked_add(1)
                .and_then(|levels| size.checked_mul(levels))
                .ok_or_else(|| {
                    config_error(format!("lattice over heights {:?} is too large", heights))
                })?;
        }
        Ok(Self {
            heights,
            strides,
            size,
        })
    }

    pub fn heights(&self) -> &[usize] {
        &self.heights
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bottom(&self) -> Node {
        Node(vec![0; self.heights.len()])
    }

    pub fn top(&self) -> Node {
        Node(self.heights.clone())
    }

    pub fn max_rank(&self) -> usize {
        self.heights.iter().sum()
    }

    pub fn contains(&self, node: &Node) -> bool {
        node.0.len() == self.heights.len() && node.0.iter().zip(&self.heights).all(|(l, h)| l <= h)
    }

    pub fn index(&self, node: &Node) -> usize {
        node.0
            .iter()
            .zip(&self.strides)
            .map(|(level, stride)| level * stride)
            .sum()
    }

    pub fn node(&self, index: usize) -> Node {
        let levels = self
            .strides
            .iter()
            .zip(&self.heights)
            .map(|(stride, height)| (index / stride) % (height + 1))
            .collect();
        Node(levels)
    }

    /// Node indices grouped by rank, each group in lexicographic order.
    pub fn ranks(&self) -> Vec<Vec<usize>> {
        let mut ranks = vec![vec![]; self.max_rank() + 1];
        for index in 0..self.size {
            ranks[self.node(index).rank()].push(index);
        }
        ranks
    }

    /// Nodes one level above `node` in a single attribute.
    pub fn successors(&self, node: &Node) -> Vec<Node> {
        (0..self.heights.len())
            .filter(|&i| node.0[i] < self.heights[i])
            .map(|i| {
                let mut levels = node.0.clone();
                levels[i] += 1;
                Node(levels)
            })
            .collect()
    }

    /// Nodes one level below `node` in a single attribute.
    pub fn predecessors(&self, node: &Node) -> Vec<Node> {
        (0..self.heights.len())
            .filter(|&i| node.0[i] > 0)
            .map(|i| {
                let mut levels = node.0.clone();
                levels[i] -= 1;
                Node(levels)
            })
            .collect()
    }
}
