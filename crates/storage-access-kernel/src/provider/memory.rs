//! In-memory document provider.
//!
//! Used for tests and demos. All documents are ephemeral.

use super::{
    DocumentInfo, DocumentProvider, EXTERNAL_STORAGE_AUTHORITY, MIME_TYPE_DIR, MIME_WILDCARD,
    check_authority, check_display_name, mime_for_name, scoped_document_id, unique_name,
};
use crate::uri::{DocumentUri, child_document_id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::RwLock;

#[derive(Debug, Clone)]
enum Content {
    File(Vec<u8>),
    /// Child document IDs in creation order.
    Directory(Vec<String>),
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    mime_type: String,
    parent: Option<String>,
    content: Content,
}

/// In-memory document tree.
///
/// Thread-safe via internal `RwLock`. Children enumerate in creation order.
#[derive(Debug)]
pub struct MemoryProvider {
    authority: String,
    root_id: String,
    nodes: RwLock<HashMap<String, Node>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Create an empty provider with the external-storage authority and a
    /// `primary` root.
    pub fn new() -> Self {
        Self::with_authority(EXTERNAL_STORAGE_AUTHORITY, "primary")
    }

    pub fn with_authority(authority: impl Into<String>, root: &str) -> Self {
        let root_id = format!("{root}:");
        let mut nodes = HashMap::new();
        // Root directory always exists
        nodes.insert(
            root_id.clone(),
            Node {
                name: root.to_string(),
                mime_type: MIME_TYPE_DIR.to_string(),
                parent: None,
                content: Content::Directory(Vec::new()),
            },
        );
        Self {
            authority: authority.into(),
            root_id,
            nodes: RwLock::new(nodes),
        }
    }

    /// Document ID for a `/`-separated path below the root.
    pub fn document_id_for(&self, path: &str) -> String {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root_id.clone(), |id, name| child_document_id(&id, name))
    }

    /// Tree URI granting access to `path` (empty for the whole volume).
    pub fn tree_uri(&self, path: &str) -> DocumentUri {
        DocumentUri::tree(self.authority.clone(), self.document_id_for(path))
    }

    /// Create every missing directory along `path`.
    pub fn mkdir_all(&self, path: &str) -> io::Result<DocumentUri> {
        let mut nodes = self.write_nodes()?;
        let mut current = self.root_id.clone();
        for name in path.split('/').filter(|s| !s.is_empty()) {
            check_display_name(name)?;
            let id = child_document_id(&current, name);
            match nodes.get(&id) {
                Some(node) if matches!(node.content, Content::Directory(_)) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("not a directory: {id}"),
                    ));
                }
                None => {
                    insert_child(&mut nodes, &current, &id, name, MIME_TYPE_DIR, Content::Directory(Vec::new()))?;
                }
            }
            current = id;
        }
        Ok(DocumentUri::tree(self.authority.clone(), current))
    }

    /// Create or replace a file at `path`, creating parent directories.
    pub fn put_file(&self, path: &str, data: &[u8]) -> io::Result<DocumentUri> {
        let (dir, name) = match path.trim_matches('/').rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path.trim_matches('/')),
        };
        check_display_name(name)?;
        let parent = self.mkdir_all(dir)?;
        let parent_id = parent.document_id().to_string();
        let id = child_document_id(&parent_id, name);

        let mut nodes = self.write_nodes()?;
        match nodes.get_mut(&id) {
            Some(Node { content: Content::File(existing), .. }) => *existing = data.to_vec(),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("is a directory: {id}"),
                ));
            }
            None => insert_child(&mut nodes, &parent_id, &id, name, mime_for_name(name), Content::File(data.to_vec()))?,
        }
        Ok(DocumentUri::document(self.authority.clone(), id))
    }

    /// Whether a node exists, bypassing tree scoping.
    pub fn contains(&self, path: &str) -> bool {
        let id = self.document_id_for(path);
        self.nodes.read().map(|n| n.contains_key(&id)).unwrap_or(false)
    }

    fn read_nodes(&self) -> io::Result<std::sync::RwLockReadGuard<'_, HashMap<String, Node>>> {
        self.nodes.read().map_err(|_| io::Error::other("lock poisoned"))
    }

    fn write_nodes(&self) -> io::Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Node>>> {
        self.nodes.write().map_err(|_| io::Error::other("lock poisoned"))
    }

    fn info(&self, reached_through: &DocumentUri, id: &str, node: &Node) -> DocumentInfo {
        let size = match &node.content {
            Content::File(data) => data.len() as u64,
            Content::Directory(_) => 0,
        };
        DocumentInfo {
            uri: reached_through.child_in_tree(id),
            display_name: node.name.clone(),
            mime_type: node.mime_type.clone(),
            size,
        }
    }
}

fn not_found(id: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("document not found: {id}"))
}

fn insert_child(
    nodes: &mut HashMap<String, Node>,
    parent_id: &str,
    id: &str,
    name: &str,
    mime_type: &str,
    content: Content,
) -> io::Result<()> {
    match nodes.get_mut(parent_id).map(|p| &mut p.content) {
        Some(Content::Directory(children)) => children.push(id.to_string()),
        Some(Content::File(_)) => {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {parent_id}"),
            ));
        }
        None => return Err(not_found(parent_id)),
    }
    nodes.insert(
        id.to_string(),
        Node {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parent: Some(parent_id.to_string()),
            content,
        },
    );
    Ok(())
}

fn remove_subtree(nodes: &mut HashMap<String, Node>, id: &str) {
    if let Some(node) = nodes.remove(id)
        && let Content::Directory(children) = node.content
    {
        for child in children {
            remove_subtree(nodes, &child);
        }
    }
}

#[async_trait]
impl DocumentProvider for MemoryProvider {
    fn authority(&self) -> &str {
        &self.authority
    }

    async fn query(&self, uri: &DocumentUri) -> io::Result<DocumentInfo> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        let nodes = self.read_nodes()?;
        let node = nodes.get(id).ok_or_else(|| not_found(id))?;
        Ok(self.info(uri, id, node))
    }

    async fn children(&self, uri: &DocumentUri) -> io::Result<Vec<DocumentInfo>> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        let nodes = self.read_nodes()?;
        match nodes.get(id).map(|n| &n.content) {
            Some(Content::Directory(children)) => Ok(children
                .iter()
                .filter_map(|child| nodes.get(child).map(|node| self.info(uri, child, node)))
                .collect()),
            Some(Content::File(_)) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {id}"),
            )),
            None => Err(not_found(id)),
        }
    }

    async fn read(&self, uri: &DocumentUri) -> io::Result<Vec<u8>> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        let nodes = self.read_nodes()?;
        match nodes.get(id).map(|n| &n.content) {
            Some(Content::File(data)) => Ok(data.clone()),
            Some(Content::Directory(_)) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {id}"),
            )),
            None => Err(not_found(id)),
        }
    }

    async fn write(&self, uri: &DocumentUri, data: &[u8]) -> io::Result<()> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        let mut nodes = self.write_nodes()?;
        match nodes.get_mut(id).map(|n| &mut n.content) {
            Some(Content::File(existing)) => {
                *existing = data.to_vec();
                Ok(())
            }
            Some(Content::Directory(_)) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {id}"),
            )),
            None => Err(not_found(id)),
        }
    }

    async fn create(
        &self,
        parent: &DocumentUri,
        mime_type: &str,
        display_name: &str,
    ) -> io::Result<DocumentUri> {
        check_authority(&self.authority, parent)?;
        check_display_name(display_name)?;
        let parent_id = scoped_document_id(parent)?;
        let mut nodes = self.write_nodes()?;

        let siblings: Vec<String> = match nodes.get(parent_id).map(|n| &n.content) {
            Some(Content::Directory(children)) => children
                .iter()
                .filter_map(|c| nodes.get(c).map(|n| n.name.clone()))
                .collect(),
            Some(Content::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {parent_id}"),
                ));
            }
            None => return Err(not_found(parent_id)),
        };

        let is_directory = mime_type == MIME_TYPE_DIR;
        let name = unique_name(display_name, is_directory, |n| siblings.iter().any(|s| s == n));
        let mime = if mime_type == MIME_WILDCARD {
            mime_for_name(&name)
        } else {
            mime_type
        };
        let content = if is_directory {
            Content::Directory(Vec::new())
        } else {
            Content::File(Vec::new())
        };

        let id = child_document_id(parent_id, &name);
        insert_child(&mut nodes, parent_id, &id, &name, mime, content)?;
        Ok(parent.child_in_tree(id))
    }

    async fn delete(&self, uri: &DocumentUri) -> io::Result<()> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        if id == self.root_id {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot delete the volume root",
            ));
        }
        let mut nodes = self.write_nodes()?;
        let parent = nodes.get(id).ok_or_else(|| not_found(id))?.parent.clone();
        if let Some(parent) = parent
            && let Some(Node { content: Content::Directory(children), .. }) = nodes.get_mut(&parent)
        {
            children.retain(|c| c != id);
        }
        remove_subtree(&mut nodes, id);
        Ok(())
    }
}
