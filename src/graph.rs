//! Two-level live object graph (managers → managees).
//!
//! The manager list is fetched once per `load`/`refresh`. Each manager's
//! managees are fetched on its first expansion and then cached for the
//! lifetime of the node, so collapsing and re-expanding never goes back to
//! the server.

use async_trait::async_trait;
use tracing::debug;

use crate::api::MemoryApi;
use crate::ipc::IpcError;
use crate::models::{Managee, Manager};

// =============================================================================
// Service Trait for Dependency Injection
// =============================================================================

/// Source of the live manager/managee structure.
///
/// Both queries are idempotent and side-effect free. The trait exists so the
/// graph can be driven by an in-memory source in tests.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn managers(&self) -> Result<Vec<Manager>, IpcError>;
    async fn managees(&self, manager_addr: u32) -> Result<Vec<Managee>, IpcError>;
}

#[async_trait]
impl ObjectSource for MemoryApi {
    async fn managers(&self) -> Result<Vec<Manager>, IpcError> {
        self.get_managers().await
    }

    async fn managees(&self, manager_addr: u32) -> Result<Vec<Managee>, IpcError> {
        self.get_managees(manager_addr).await
    }
}

/// One manager row and its lazily loaded children.
#[derive(Debug, Clone)]
pub struct ManagerNode {
    pub manager: Manager,
    managees: Option<Vec<Managee>>,
    expanded: bool,
}

impl ManagerNode {
    fn new(manager: Manager) -> Self {
        Self {
            manager,
            managees: None,
            expanded: false,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Whether the managee list has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.managees.is_some()
    }

    /// Cached managees, if loaded (regardless of expansion).
    pub fn managees(&self) -> Option<&[Managee]> {
        self.managees.as_deref()
    }

    /// Managees to display: only when expanded.
    pub fn visible_managees(&self) -> &[Managee] {
        match (&self.managees, self.expanded) {
            (Some(managees), true) => managees,
            _ => &[],
        }
    }
}

/// The manager tree as the inspector shows it.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    nodes: Vec<ManagerNode>,
}

impl ObjectGraph {
    /// Fetch the manager list and build a collapsed graph.
    pub async fn load<S: ObjectSource + ?Sized>(source: &S) -> Result<Self, IpcError> {
        let managers = source.managers().await?;
        debug!(count = managers.len(), "Loaded managers");
        Ok(Self {
            nodes: managers.into_iter().map(ManagerNode::new).collect(),
        })
    }

    /// Replace the graph with a fresh manager list, dropping cached managees.
    pub async fn refresh<S: ObjectSource + ?Sized>(&mut self, source: &S) -> Result<(), IpcError> {
        *self = Self::load(source).await?;
        Ok(())
    }

    pub fn nodes(&self) -> &[ManagerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Expand node `index`, fetching its managees on first expansion.
    ///
    /// Returns `Ok(None)` if `index` is out of range. A failed fetch leaves
    /// the node collapsed and unloaded so it can be retried.
    pub async fn expand<S: ObjectSource + ?Sized>(
        &mut self,
        index: usize,
        source: &S,
    ) -> Result<Option<&[Managee]>, IpcError> {
        let Some(node) = self.nodes.get_mut(index) else {
            return Ok(None);
        };

        if node.managees.is_none() {
            let managees = source.managees(node.manager.addr).await?;
            debug!(
                manager = %node.manager.name,
                count = managees.len(),
                "Loaded managees"
            );
            node.managees = Some(managees);
        }
        node.expanded = true;
        Ok(node.managees.as_deref())
    }

    /// Collapse node `index`, keeping its cached managees.
    pub fn collapse(&mut self, index: usize) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.expanded = false;
        }
    }

    /// Toggle node `index`. Returns the new expansion state.
    pub async fn toggle<S: ObjectSource + ?Sized>(
        &mut self,
        index: usize,
        source: &S,
    ) -> Result<bool, IpcError> {
        let Some(expanded) = self.nodes.get(index).map(|node| node.expanded) else {
            return Ok(false);
        };
        if expanded {
            self.collapse(index);
            Ok(false)
        } else {
            self.expand(index, source).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that counts managee fetches.
    struct FakeSource {
        managers: Vec<Manager>,
        managees: HashMap<u32, Vec<Managee>>,
        managee_calls: AtomicUsize,
    }

    #[async_trait]
    impl ObjectSource for FakeSource {
        async fn managers(&self) -> Result<Vec<Manager>, IpcError> {
            Ok(self.managers.clone())
        }

        async fn managees(&self, manager_addr: u32) -> Result<Vec<Managee>, IpcError> {
            self.managee_calls.fetch_add(1, Ordering::SeqCst);
            self.managees
                .get(&manager_addr)
                .cloned()
                .ok_or_else(|| IpcError::Remote(serde_json::json!("bad address")))
        }
    }

    fn manager(addr: u32, name: &str, count: u32) -> Manager {
        Manager {
            addr,
            type_name: "TLiveManager".into(),
            name: name.into(),
            count: Some(count),
        }
    }

    fn managee(addr: u32, index: usize) -> Managee {
        Managee {
            addr,
            type_name: Some("TLiveActor".into()),
            name: format!("actor{}", index),
            index: Some(index),
        }
    }

    fn source() -> FakeSource {
        FakeSource {
            managers: vec![manager(0x8100_0000, "Enemies", 2), manager(0x8200_0000, "Broken", 1)],
            managees: HashMap::from([(
                0x8100_0000,
                vec![managee(0x8110_0000, 0), managee(0x8110_0100, 1)],
            )]),
            managee_calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_load_starts_collapsed() {
        let graph = ObjectGraph::load(&source()).await.unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.nodes().iter().all(|n| !n.is_expanded() && !n.is_loaded()));
    }

    #[tokio::test]
    async fn test_managees_fetched_once_across_toggles() {
        let source = source();
        let mut graph = ObjectGraph::load(&source).await.unwrap();

        let managees = graph.expand(0, &source).await.unwrap().unwrap();
        assert_eq!(managees.len(), 2);
        assert_eq!(managees[1].index, Some(1));

        assert!(!graph.toggle(0, &source).await.unwrap());
        assert!(graph.nodes()[0].visible_managees().is_empty());
        assert!(graph.nodes()[0].is_loaded());

        assert!(graph.toggle(0, &source).await.unwrap());
        assert_eq!(graph.nodes()[0].visible_managees().len(), 2);
        assert_eq!(source.managee_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_expand_can_be_retried() {
        let source = source();
        let mut graph = ObjectGraph::load(&source).await.unwrap();

        assert!(graph.expand(1, &source).await.is_err());
        assert!(!graph.nodes()[1].is_expanded());
        assert!(!graph.nodes()[1].is_loaded());

        assert!(graph.expand(1, &source).await.is_err());
        assert_eq!(source.managee_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_index() {
        let source = source();
        let mut graph = ObjectGraph::load(&source).await.unwrap();
        assert!(graph.expand(9, &source).await.unwrap().is_none());
        assert!(!graph.toggle(9, &source).await.unwrap());
        graph.collapse(9);
    }

    #[tokio::test]
    async fn test_refresh_drops_cache() {
        let source = source();
        let mut graph = ObjectGraph::load(&source).await.unwrap();
        graph.expand(0, &source).await.unwrap();

        graph.refresh(&source).await.unwrap();
        assert!(!graph.nodes()[0].is_loaded());
    }
}
