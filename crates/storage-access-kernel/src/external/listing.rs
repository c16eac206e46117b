//! Depth-bounded directory listing over a document provider.
//!
//! `includes` is materialized down to the requested depth while size and
//! count aggregation always walks the whole subtree. Child directories at
//! each level are walked concurrently on the worker pool and joined in
//! enumeration order before their parent is finished. Dropping the join set
//! on the first failure aborts the remaining siblings, so no task outlives
//! the listing call.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use storage_access_types::{DirectoryEntry, ListDepth, Location, StorageError, StorageResult};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use super::{ExternalBackend, provider_error};
use crate::pool::join_error;
use crate::provider::{DocumentInfo, DocumentProvider};
use crate::uri::DocumentUri;

type WalkFuture<T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'static>>;

/// Aggregated size and entry count of a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    size: u64,
    count: u32,
}

impl Totals {
    fn file(size: u64) -> Self {
        Self { size, count: 1 }
    }

    /// A child directory counts itself plus everything below it.
    fn directory(inner: Totals) -> Self {
        Self {
            size: inner.size,
            count: inner.count.saturating_add(1),
        }
    }

    fn add(&mut self, other: Totals) {
        self.size = self.size.saturating_add(other.size);
        self.count = self.count.saturating_add(other.count);
    }
}

/// Shared state of one listing call.
struct TreeWalker {
    provider: Arc<dyn DocumentProvider>,
    handle: Handle,
    depth: ListDepth,
    aggregate: bool,
}

impl ExternalBackend {
    /// List the tree rooted at `root`.
    ///
    /// The root must exist and be a directory.
    pub async fn list(
        &self,
        root: &str,
        depth: ListDepth,
        include_size_and_count: bool,
    ) -> StorageResult<DirectoryEntry> {
        let (_, info) = self.directory(root, "directory").await?;
        let walker = Arc::new(TreeWalker {
            provider: self.provider.clone(),
            handle: self.handle.clone(),
            depth,
            aggregate: include_size_and_count,
        });
        tracing::debug!(%root, ?depth, include_size_and_count, "listing");
        let (entry, _) = walker.walk(info, 0).await?;
        Ok(entry)
    }
}

impl TreeWalker {
    fn entry_for(info: &DocumentInfo) -> DirectoryEntry {
        let uri = info.uri.to_string();
        let location = Location::external(uri.as_str());
        if info.is_directory() {
            DirectoryEntry::directory(info.display_name.as_str(), location, uri)
        } else {
            DirectoryEntry::file(info.display_name.as_str(), location, uri, info.size)
        }
    }

    /// Children of a directory; one that vanished since it was enumerated
    /// lists as empty.
    async fn children(&self, uri: &DocumentUri) -> StorageResult<Vec<DocumentInfo>> {
        match self.provider.children(uri).await {
            Ok(children) => Ok(children),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(%uri, "directory vanished during listing");
                Ok(Vec::new())
            }
            Err(e) => Err(provider_error(uri, e)),
        }
    }

    /// Build the entry for directory `info` at relative `depth`.
    fn walk(self: Arc<Self>, info: DocumentInfo, depth: u32) -> WalkFuture<(DirectoryEntry, Totals)> {
        Box::pin(async move {
            let children = self.children(&info.uri).await?;
            let mut entry = Self::entry_for(&info);
            let mut totals = Totals::default();

            if self.depth.materializes(depth) {
                let mut pending = Vec::new();
                let mut slots: Vec<Option<DirectoryEntry>> = Vec::with_capacity(children.len());
                for child in children {
                    if child.is_directory() {
                        pending.push((slots.len(), self.clone().walk(child, depth + 1)));
                        slots.push(None);
                    } else {
                        totals.add(Totals::file(child.size));
                        slots.push(Some(Self::entry_for(&child)));
                    }
                }

                let (indices, tasks): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
                for (index, (child_entry, child_totals)) in indices.into_iter().zip(fork_join(&self.handle, tasks).await?) {
                    totals.add(Totals::directory(child_totals));
                    slots[index] = Some(child_entry);
                }

                let includes = slots
                    .into_iter()
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| StorageError::Io("listing lost a child entry".into()))?;
                entry = entry.with_includes(includes);
            } else if children.is_empty() {
                // Nothing deeper to load.
                entry = entry.with_includes(Vec::new());
            } else if self.aggregate {
                totals = self.clone().measure_children(children).await?;
            }

            if self.aggregate {
                entry = entry.with_totals(totals.size, totals.count);
            }
            Ok((entry, totals))
        })
    }

    /// Totals of a directory below the materialized depth.
    fn measure(self: Arc<Self>, uri: DocumentUri) -> WalkFuture<Totals> {
        Box::pin(async move {
            let children = self.children(&uri).await?;
            self.measure_children(children).await
        })
    }

    async fn measure_children(self: Arc<Self>, children: Vec<DocumentInfo>) -> StorageResult<Totals> {
        let mut totals = Totals::default();
        let mut tasks = Vec::new();
        for child in children {
            if child.is_directory() {
                tasks.push(self.clone().measure(child.uri));
            } else {
                totals.add(Totals::file(child.size));
            }
        }
        for inner in fork_join(&self.handle, tasks).await? {
            totals.add(Totals::directory(inner));
        }
        Ok(totals)
    }
}

/// Run `tasks` concurrently on `handle` and return their results in input
/// order. The first failure aborts the rest.
async fn fork_join<T: Send + 'static>(handle: &Handle, tasks: Vec<WalkFuture<T>>) -> StorageResult<Vec<T>> {
    let len = tasks.len();
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        set.spawn_on(async move { (index, task.await) }, handle);
    }

    let mut slots: Vec<Option<T>> = (0..len).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(join_error)?;
        slots[index] = Some(result?);
    }
    slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| StorageError::Io("listing task vanished".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::UnavailableCodec;
    use crate::external::tests::backend;
    use crate::provider::MemoryProvider;
    use async_trait::async_trait;
    use std::time::Duration;

    /// docs/
    ///   a.txt (3)
    ///   sub/
    ///     b.txt (5)
    ///     deep/
    ///       c.txt (7)
    ///       deeper/
    ///         d.txt (11)
    ///   empty/
    fn seeded() -> (Arc<MemoryProvider>, String) {
        let provider = Arc::new(MemoryProvider::new());
        provider.put_file("docs/a.txt", b"aaa").unwrap();
        provider.put_file("docs/sub/b.txt", b"bbbbb").unwrap();
        provider.put_file("docs/sub/deep/c.txt", b"ccccccc").unwrap();
        provider.put_file("docs/sub/deep/deeper/d.txt", b"ddddddddddd").unwrap();
        provider.mkdir_all("docs/empty").unwrap();
        let root = provider.tree_uri("docs").to_string();
        (provider, root)
    }

    fn file_sizes(entry: &DirectoryEntry) -> u64 {
        let mut total = 0;
        entry.visit(&mut |e, _| {
            if e.is_file {
                total += e.size.unwrap_or(0);
            }
        });
        total
    }

    #[tokio::test]
    async fn test_unbounded_reaches_leaves() {
        let (provider, root) = seeded();
        let tree = backend(provider).list(&root, ListDepth::Unbounded, false).await.unwrap();

        assert_eq!(tree.name, "docs");
        assert_eq!(tree.child_names(), vec!["a.txt", "sub", "empty"]);
        let mut dirs = 0;
        tree.visit(&mut |e, _| {
            if e.is_directory {
                dirs += 1;
                assert!(e.children_loaded, "{} not loaded", e.name);
                assert!(e.includes.is_some());
            }
        });
        assert_eq!(dirs, 5);
        assert_eq!(file_sizes(&tree), 26);
        assert!(tree.size.is_none());
        assert!(tree.total_count.is_none());
    }

    #[tokio::test]
    async fn test_depth_one_stops_at_children() {
        let (provider, root) = seeded();
        let tree = backend(provider).list(&root, ListDepth::Limited(1), false).await.unwrap();

        assert!(tree.children_loaded);
        let sub = tree.child("sub").unwrap();
        assert!(!sub.children_loaded);
        assert!(sub.includes.is_none());

        // An empty directory at the boundary has nothing left to load.
        let empty = tree.child("empty").unwrap();
        assert!(empty.children_loaded);
        assert_eq!(empty.includes.as_deref(), Some(&[][..]));

        assert!(tree.child("a.txt").unwrap().children_loaded);
    }

    #[tokio::test]
    async fn test_depth_zero_returns_bare_root() {
        let (provider, root) = seeded();
        let tree = backend(provider).list(&root, ListDepth::Limited(0), false).await.unwrap();
        assert!(!tree.children_loaded);
        assert!(tree.includes.is_none());
    }

    #[tokio::test]
    async fn test_children_loaded_at_boundary() {
        let (provider, root) = seeded();
        let tree = backend(provider).list(&root, ListDepth::Limited(2), false).await.unwrap();
        tree.visit(&mut |e, depth| {
            if !e.is_directory {
                return;
            }
            let has_children = e.name != "empty";
            if depth < 2 {
                assert!(e.children_loaded, "{} at depth {depth}", e.name);
            } else {
                assert_eq!(e.children_loaded, !has_children, "{} at depth {depth}", e.name);
            }
        });
        let deep = tree.child("sub").unwrap().child("deep").unwrap();
        assert!(!deep.children_loaded);
    }

    #[tokio::test]
    async fn test_aggregation_ignores_depth() {
        let (provider, root) = seeded();
        let ext = backend(provider);
        for depth in [ListDepth::Limited(0), ListDepth::Limited(1), ListDepth::Limited(3), ListDepth::Unbounded] {
            let tree = ext.list(&root, depth, true).await.unwrap();
            assert_eq!(tree.size, Some(26), "{depth:?}");
            // a.txt, sub, b.txt, deep, c.txt, deeper, d.txt, empty
            assert_eq!(tree.total_count, Some(8), "{depth:?}");
        }

        let tree = ext.list(&root, ListDepth::Limited(1), true).await.unwrap();
        let sub = tree.child("sub").unwrap();
        assert_eq!(sub.size, Some(23));
        assert_eq!(sub.total_count, Some(5));
        let empty = tree.child("empty").unwrap();
        assert_eq!(empty.size, Some(0));
        assert_eq!(empty.total_count, Some(0));
        assert_eq!(tree.child("a.txt").unwrap().size, Some(3));
    }

    #[tokio::test]
    async fn test_root_must_be_directory() {
        let (provider, _) = seeded();
        let file = provider
            .tree_uri("docs")
            .child_in_tree(provider.document_id_for("docs/a.txt"))
            .to_string();
        let ext = backend(provider.clone());
        assert!(matches!(
            ext.list(&file, ListDepth::Unbounded, false).await,
            Err(StorageError::Unsupported(_))
        ));
        let missing = provider.tree_uri("nope").to_string();
        assert!(matches!(
            ext.list(&missing, ListDepth::Unbounded, false).await,
            Err(StorageError::NotFound(_))
        ));
    }

    /// Answers `children` slowly for names listed in `slow`, so later
    /// siblings finish first.
    struct SlowProvider {
        inner: MemoryProvider,
        slow: Vec<&'static str>,
        vanish: Option<&'static str>,
    }

    #[async_trait]
    impl DocumentProvider for SlowProvider {
        fn authority(&self) -> &str {
            self.inner.authority()
        }
        async fn query(&self, uri: &DocumentUri) -> io::Result<DocumentInfo> {
            self.inner.query(uri).await
        }
        async fn children(&self, uri: &DocumentUri) -> io::Result<Vec<DocumentInfo>> {
            let id = uri.document_id();
            if self.vanish.is_some_and(|v| id.ends_with(v)) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
            }
            if self.slow.iter().any(|s| id.ends_with(s)) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.children(uri).await
        }
        async fn read(&self, uri: &DocumentUri) -> io::Result<Vec<u8>> {
            self.inner.read(uri).await
        }
        async fn write(&self, uri: &DocumentUri, data: &[u8]) -> io::Result<()> {
            self.inner.write(uri, data).await
        }
        async fn create(&self, parent: &DocumentUri, mime: &str, name: &str) -> io::Result<DocumentUri> {
            self.inner.create(parent, mime, name).await
        }
        async fn delete(&self, uri: &DocumentUri) -> io::Result<()> {
            self.inner.delete(uri).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_order_follows_enumeration_not_completion() {
        let inner = MemoryProvider::new();
        for name in ["first", "second", "third"] {
            inner.put_file(&format!("root/{name}/x.txt"), b"x").unwrap();
        }
        let root = inner.tree_uri("root").to_string();
        let provider = Arc::new(SlowProvider {
            inner,
            slow: vec!["first", "second"],
            vanish: None,
        });
        let ext = ExternalBackend::new(provider, Arc::new(UnavailableCodec), Handle::current());

        let tree = ext.list(&root, ListDepth::Unbounded, true).await.unwrap();
        assert_eq!(tree.child_names(), vec!["first", "second", "third"]);
        assert_eq!(tree.total_count, Some(6));
    }

    #[tokio::test]
    async fn test_vanished_directory_is_empty() {
        let inner = MemoryProvider::new();
        inner.put_file("root/keep/a.txt", b"aa").unwrap();
        inner.put_file("root/gone/b.txt", b"bbb").unwrap();
        let root = inner.tree_uri("root").to_string();
        let provider = Arc::new(SlowProvider {
            inner,
            slow: Vec::new(),
            vanish: Some("gone"),
        });
        let ext = ExternalBackend::new(provider, Arc::new(UnavailableCodec), Handle::current());

        let tree = ext.list(&root, ListDepth::Unbounded, true).await.unwrap();
        let gone = tree.child("gone").unwrap();
        assert_eq!(gone.includes.as_deref(), Some(&[][..]));
        assert_eq!(tree.size, Some(2));
        assert_eq!(tree.total_count, Some(3));
    }

    #[tokio::test]
    async fn test_entries_carry_external_locations() {
        let (provider, root) = seeded();
        let tree = backend(provider).list(&root, ListDepth::Limited(1), false).await.unwrap();
        let a = tree.child("a.txt").unwrap();
        assert_eq!(a.location, Location::External(a.uri.clone()));
        let parsed = DocumentUri::parse(&a.uri).unwrap();
        assert_eq!(parsed.document_id(), "primary:docs/a.txt");
    }
}
