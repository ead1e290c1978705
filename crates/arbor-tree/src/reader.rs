use std::any::type_name;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use arbor_bundle::Bundle;
use arbor_store::{BlobStore, RefStore, StorageBackend, StoreError};
use arbor_types::{BlobLocator, NodeHandle, NodeLocator, NodeType, RefName};

use crate::cache::{CachedNode, NodeCache};
use crate::error::{TreeError, TreeResult};
use crate::node::{node_hash, DecodeNode, NodeReader, TreeNode};
use crate::registry::NodeRegistry;

/// One export pulled out of its bundle, references resolved to handles.
struct LoadedExport {
    node_type: NodeType,
    data: Bytes,
    refs: Vec<NodeHandle>,
}

/// Reads trees back from a backend.
///
/// Nodes come back with their references *located*: children are only
/// fetched when a ref is expanded. Every decoded node is checked against
/// the content hash in its handle before it is returned.
#[derive(Clone)]
pub struct TreeReader {
    store: Arc<dyn StorageBackend>,
    cache: Option<Arc<dyn NodeCache>>,
    registry: Arc<NodeRegistry>,
}

impl TreeReader {
    /// A reader without a node cache that knows the built-in node kinds.
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self {
            store,
            cache: None,
            registry: Arc::new(NodeRegistry::with_defaults()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn NodeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_registry(mut self, registry: NodeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Resolve a ref to the handle of its root node.
    pub async fn read_ref(&self, name: &RefName) -> TreeResult<NodeHandle> {
        self.store
            .read_ref(name)
            .await?
            .ok_or_else(|| TreeError::Store(StoreError::RefNotFound(name.clone())))
    }

    /// Read the root node of a ref.
    pub async fn read<T: DecodeNode>(&self, name: &RefName) -> TreeResult<Arc<T>> {
        let handle = self.read_ref(name).await?;
        self.read_node(&handle).await
    }

    /// Read and decode a node as `T`.
    pub async fn read_node<T: DecodeNode>(&self, handle: &NodeHandle) -> TreeResult<Arc<T>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(handle) {
                if let Ok(node) = hit.downcast::<T>() {
                    return Ok(node);
                }
            }
        }

        let loaded = self.load(handle).await?;
        if !T::accepts(&loaded.node_type) {
            return Err(TreeError::UnexpectedType {
                locator: handle.locator.clone(),
                expected: type_name::<T>(),
                actual: loaded.node_type,
            });
        }
        let mut reader = NodeReader::new(loaded.node_type, loaded.data, loaded.refs);
        let node = Arc::new(T::decode(&mut reader)?);

        if let Some(cache) = &self.cache {
            cache.insert(handle.clone(), Arc::clone(&node) as CachedNode);
        }
        Ok(node)
    }

    /// Read a node of any registered kind.
    pub async fn read_any(&self, handle: &NodeHandle) -> TreeResult<Arc<dyn TreeNode>> {
        let loaded = self.load(handle).await?;
        let mut reader = NodeReader::new(loaded.node_type, loaded.data, loaded.refs);
        self.registry.decode(&mut reader)
    }

    /// Every blob holding a node reachable from `root`, root included.
    ///
    /// Walks the export reference lists only; nodes are not decoded.
    pub async fn reachable_blobs(&self, root: &NodeHandle) -> TreeResult<BTreeSet<BlobLocator>> {
        let mut bundles: HashMap<BlobLocator, Bundle> = HashMap::new();
        let mut visited: HashSet<NodeLocator> = HashSet::new();
        let mut pending = vec![root.locator.clone()];

        while let Some(locator) = pending.pop() {
            if !visited.insert(locator.clone()) {
                continue;
            }
            if !bundles.contains_key(&locator.blob) {
                let bundle = self.fetch_bundle(&locator.blob).await?;
                bundles.insert(locator.blob.clone(), bundle);
            }
            let Some(bundle) = bundles.get(&locator.blob) else {
                continue;
            };
            check_index(bundle, &locator)?;
            for handle in resolve_refs(bundle, &locator)? {
                pending.push(handle.locator);
            }
        }

        Ok(bundles.into_keys().collect())
    }

    async fn fetch_bundle(&self, blob: &BlobLocator) -> TreeResult<Bundle> {
        let data = self.store.get_blob(blob).await?;
        debug!(%blob, bytes = data.len(), "fetched bundle");
        Ok(Bundle::parse(data)?)
    }

    async fn load(&self, handle: &NodeHandle) -> TreeResult<LoadedExport> {
        let locator = &handle.locator;
        let bundle = self.fetch_bundle(&locator.blob).await?;
        check_index(&bundle, locator)?;

        let node_type = bundle.node_type(locator.export_index)?;
        let data = bundle.export_data(locator.export_index)?;
        let refs = resolve_refs(&bundle, locator)?;

        let actual = node_hash(&node_type, &data, refs.iter().map(|r| &r.hash));
        if actual != handle.hash {
            warn!(%locator, expected = %handle.hash, %actual, "node hash mismatch");
            return Err(TreeError::HashMismatch {
                locator: locator.clone(),
                expected: handle.hash,
                actual,
            });
        }

        Ok(LoadedExport {
            node_type,
            data,
            refs,
        })
    }
}

fn check_index(bundle: &Bundle, locator: &NodeLocator) -> TreeResult<()> {
    if locator.export_index as usize >= bundle.export_count() {
        return Err(TreeError::ExportOutOfRange {
            locator: locator.clone(),
            count: bundle.export_count(),
        });
    }
    Ok(())
}

fn resolve_refs(bundle: &Bundle, locator: &NodeLocator) -> TreeResult<Vec<NodeHandle>> {
    bundle
        .references(locator.export_index)?
        .iter()
        .map(|target| {
            target
                .to_handle(&locator.blob, &bundle.header().exports)
                .ok_or_else(|| {
                    TreeError::UnresolvedReference(format!("{target:?} from {locator}"))
                })
        })
        .collect()
}

impl std::fmt::Debug for TreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeReader")
            .field("cached", &self.cache.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}
