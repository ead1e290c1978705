use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use arbor_types::NodeHandle;

use crate::error::TreeResult;
use crate::node::{AnyNodeRef, DecodeNode, TreeNode};
use crate::reader::TreeReader;

enum RefState<T> {
    Materialized(Arc<T>),
    Located {
        handle: NodeHandle,
        cell: Arc<OnceCell<Arc<T>>>,
    },
}

/// A reference from one node to another.
///
/// A ref is either *materialized*, holding the target in memory, or
/// *located*, holding the handle of a stored node. Expanding a located ref
/// fetches and decodes the target at most once; clones of the ref share
/// the expanded value.
pub struct TreeNodeRef<T> {
    state: RefState<T>,
}

impl<T> TreeNodeRef<T> {
    pub fn new(node: T) -> Self {
        Self::from_arc(Arc::new(node))
    }

    pub fn from_arc(node: Arc<T>) -> Self {
        Self {
            state: RefState::Materialized(node),
        }
    }

    /// A ref to a stored node that has not been read yet.
    pub fn located(handle: NodeHandle) -> Self {
        Self {
            state: RefState::Located {
                handle,
                cell: Arc::new(OnceCell::new()),
            },
        }
    }

    /// Where the target is stored, if the ref is located.
    pub fn handle(&self) -> Option<&NodeHandle> {
        match &self.state {
            RefState::Materialized(_) => None,
            RefState::Located { handle, .. } => Some(handle),
        }
    }

    /// The target if it is available without I/O.
    pub fn get(&self) -> Option<Arc<T>> {
        match &self.state {
            RefState::Materialized(node) => Some(Arc::clone(node)),
            RefState::Located { cell, .. } => cell.get().cloned(),
        }
    }
}

impl<T: DecodeNode> TreeNodeRef<T> {
    /// Return the target, reading it through `reader` the first time.
    pub async fn expand(&self, reader: &TreeReader) -> TreeResult<Arc<T>> {
        match &self.state {
            RefState::Materialized(node) => Ok(Arc::clone(node)),
            RefState::Located { handle, cell } => cell
                .get_or_try_init(|| reader.read_node::<T>(handle))
                .await
                .cloned(),
        }
    }
}

impl<T: TreeNode> AnyNodeRef for TreeNodeRef<T> {
    fn handle(&self) -> Option<&NodeHandle> {
        TreeNodeRef::handle(self)
    }

    fn target(&self) -> Option<Arc<dyn TreeNode>> {
        self.get().map(|node| node as Arc<dyn TreeNode>)
    }
}

impl<T> From<T> for TreeNodeRef<T> {
    fn from(node: T) -> Self {
        Self::new(node)
    }
}

impl<T> Clone for TreeNodeRef<T> {
    fn clone(&self) -> Self {
        let state = match &self.state {
            RefState::Materialized(node) => RefState::Materialized(Arc::clone(node)),
            RefState::Located { handle, cell } => RefState::Located {
                handle: handle.clone(),
                cell: Arc::clone(cell),
            },
        };
        Self { state }
    }
}

impl<T> fmt::Debug for TreeNodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            RefState::Materialized(_) => f.write_str("TreeNodeRef(materialized)"),
            RefState::Located { handle, cell } => f
                .debug_struct("TreeNodeRef")
                .field("handle", handle)
                .field("expanded", &cell.initialized())
                .finish(),
        }
    }
}
