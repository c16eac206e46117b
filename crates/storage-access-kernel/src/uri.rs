//! Document-provider URIs.
//!
//! Two shapes are recognized:
//!
//! ```text
//! content://<authority>/tree/<treeId>[/document/<docId>]
//! content://<authority>/document/<docId>
//! ```
//!
//! Document IDs are opaque to the core except for the lexical convention the
//! external-storage provider uses: `<root>:<relative/path>`. Children of a
//! root ID (`primary:`) are `primary:<name>`; children of anything else are
//! `<parent>/<name>`.

use std::fmt;

use storage_access_types::{StorageError, StorageResult};
use url::Url;

/// Scheme of every document-provider URI.
pub const CONTENT_SCHEME: &str = "content";

/// A parsed document-provider URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentUri {
    authority: String,
    tree_id: Option<String>,
    document_id: Option<String>,
}

impl DocumentUri {
    /// A bare tree URI, as returned by a directory grant.
    pub fn tree(authority: impl Into<String>, tree_id: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            tree_id: Some(tree_id.into()),
            document_id: None,
        }
    }

    /// A single-document URI outside any tree.
    pub fn document(authority: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            tree_id: None,
            document_id: Some(document_id.into()),
        }
    }

    /// A document inside the same tree grant as `self`.
    ///
    /// Without a tree part the result is a plain document URI.
    pub fn child_in_tree(&self, document_id: impl Into<String>) -> Self {
        Self {
            authority: self.authority.clone(),
            tree_id: self.tree_id.clone(),
            document_id: Some(document_id.into()),
        }
    }

    /// Parse a `content://` URI.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let invalid = |why: &str| StorageError::InvalidLocation(format!("{why}: {raw}"));

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !url.scheme().eq_ignore_ascii_case(CONTENT_SCHEME) {
            return Err(invalid("not a content URI"));
        }
        let authority = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(invalid("missing authority")),
        };

        let segments: Vec<String> = url
            .path_segments()
            .map(|segs| {
                segs.filter(|s| !s.is_empty())
                    .map(decode_segment)
                    .collect::<StorageResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        match segments.as_slice() {
            [kind, tree] if kind == "tree" => Ok(Self::tree(authority, tree.clone())),
            [kind, tree, doc_kind, doc] if kind == "tree" && doc_kind == "document" => {
                Ok(Self {
                    authority,
                    tree_id: Some(tree.clone()),
                    document_id: Some(doc.clone()),
                })
            }
            [kind, doc] if kind == "document" => Ok(Self::document(authority, doc.clone())),
            _ => Err(invalid("unrecognized document path")),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// True when the URI carries a tree grant and can enumerate children.
    pub fn is_tree(&self) -> bool {
        self.tree_id.is_some()
    }

    /// True when the URI names a document explicitly.
    pub fn has_document(&self) -> bool {
        self.document_id.is_some()
    }

    /// The tree grant's document ID, if any.
    pub fn tree_document_id(&self) -> Option<&str> {
        self.tree_id.as_deref()
    }

    /// The document this URI addresses: the explicit document part, or the
    /// tree root for a bare tree URI.
    pub fn document_id(&self) -> &str {
        self.document_id
            .as_deref()
            .or(self.tree_id.as_deref())
            .unwrap_or_default()
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CONTENT_SCHEME}://{}", self.authority)?;
        if let Some(tree) = &self.tree_id {
            write!(f, "/tree/{}", urlencoding::encode(tree))?;
        }
        if let Some(doc) = &self.document_id {
            write!(f, "/document/{}", urlencoding::encode(doc))?;
        }
        Ok(())
    }
}

fn decode_segment(segment: &str) -> StorageResult<String> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|e| StorageError::InvalidLocation(format!("bad document id '{segment}': {e}")))
}

/// Cheap syntactic check used by the classifier.
pub fn is_content_uri(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            url.scheme().eq_ignore_ascii_case(CONTENT_SCHEME)
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Document ID of `name` under `parent_id`.
pub fn child_document_id(parent_id: &str, name: &str) -> String {
    if parent_id.ends_with(':') {
        format!("{parent_id}{name}")
    } else {
        format!("{parent_id}/{name}")
    }
}

/// Whether `document_id` is `ancestor_id` or lies below it.
pub fn is_within(ancestor_id: &str, document_id: &str) -> bool {
    if document_id == ancestor_id {
        return true;
    }
    if ancestor_id.ends_with(':') {
        return document_id.starts_with(ancestor_id);
    }
    document_id
        .strip_prefix(ancestor_id)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const AUTH: &str = "com.android.externalstorage.documents";

    #[test]
    fn test_parse_tree_uri() {
        let uri = DocumentUri::parse(&format!("content://{AUTH}/tree/primary%3ADocs")).unwrap();
        assert_eq!(uri.authority(), AUTH);
        assert!(uri.is_tree());
        assert!(!uri.has_document());
        assert_eq!(uri.tree_document_id(), Some("primary:Docs"));
        assert_eq!(uri.document_id(), "primary:Docs");
    }

    #[test]
    fn test_parse_tree_document_uri() {
        let raw = format!("content://{AUTH}/tree/primary%3ADocs/document/primary%3ADocs%2Fa.txt");
        let uri = DocumentUri::parse(&raw).unwrap();
        assert!(uri.is_tree());
        assert!(uri.has_document());
        assert_eq!(uri.document_id(), "primary:Docs/a.txt");
        assert_eq!(uri.to_string(), raw);
    }

    #[test]
    fn test_parse_document_uri() {
        let uri = DocumentUri::parse(&format!("content://{AUTH}/document/primary%3Aa.txt")).unwrap();
        assert!(!uri.is_tree());
        assert_eq!(uri.document_id(), "primary:a.txt");
    }

    #[rstest]
    #[case("file:///sdcard/a.txt")]
    #[case("content:///tree/primary%3A")]
    #[case("content://auth/somewhere/else")]
    #[case("content://auth/tree/a/document")]
    #[case("not a uri")]
    fn test_parse_rejects(#[case] raw: &str) {
        let err = DocumentUri::parse(raw).unwrap_err();
        assert!(matches!(err, StorageError::InvalidLocation(_)), "{raw}: {err}");
    }

    #[test]
    fn test_display_encodes_ids() {
        let uri = DocumentUri::tree(AUTH, "primary:My Docs").child_in_tree("primary:My Docs/x");
        assert_eq!(
            uri.to_string(),
            format!("content://{AUTH}/tree/primary%3AMy%20Docs/document/primary%3AMy%20Docs%2Fx")
        );
        assert_eq!(DocumentUri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[rstest]
    #[case("primary:", "Docs", "primary:Docs")]
    #[case("primary:Docs", "a.txt", "primary:Docs/a.txt")]
    fn test_child_document_id(#[case] parent: &str, #[case] name: &str, #[case] expected: &str) {
        assert_eq!(child_document_id(parent, name), expected);
    }

    #[rstest]
    #[case("primary:", "primary:Docs", true)]
    #[case("primary:Docs", "primary:Docs", true)]
    #[case("primary:Docs", "primary:Docs/a", true)]
    #[case("primary:Docs", "primary:Docs2", false)]
    #[case("primary:Docs/a", "primary:Docs", false)]
    fn test_is_within(#[case] ancestor: &str, #[case] doc: &str, #[case] expected: bool) {
        assert_eq!(is_within(ancestor, doc), expected);
    }

    #[test]
    fn test_is_content_uri() {
        assert!(is_content_uri(&format!("content://{AUTH}/tree/primary%3A")));
        assert!(is_content_uri("CONTENT://media/external"));
        assert!(!is_content_uri("content:///nothing"));
        assert!(!is_content_uri("/data/files/a.txt"));
    }
}
