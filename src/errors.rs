use std::error::Error;
use std::fmt::{Display, Formatter};
use petgraph::algo::Cycle;

#[derive(Debug)]
pub enum VargraphError {
    /// An edge or path referred to a node that is not present in the graph
    UnknownNode(u64),

    /// A path cursor or mapping referred to a path that does not exist
    UnknownPath(String),

    /// The graph could not be topologically ordered (possibly a cycle)
    GraphNotSorted,
}

impl Error for VargraphError {}

impl<N> From<Cycle<N>> for VargraphError {
    fn from(_: Cycle<N>) -> Self {
        Self::GraphNotSorted
    }
}

impl Display for VargraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UnknownNode(id) =>
                write!(f, "The graph does not contain a node with ID {id}!"),
            Self::UnknownPath(ref name) =>
                write!(f, "The graph does not contain an embedded path named {name:?}!"),
            Self::GraphNotSorted =>
                write!(f, "The graph could not be sorted topologically (possibly a cycle?)."),
        }
    }
}
