//! Breadth-first tree listing with bounded concurrency.
//!
//! Deep remote trees must not translate into deep call stacks, so directories
//! are tracked in an explicit queue and the finished tree is assembled from a
//! flat arena.

use super::StorageAdapter;
use crate::error::{ErrorKind, Result};
use crate::models::TreeNode;
use crate::path;
use exn::OptionExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::VecDeque;

/// Arena slot: index of the parent slot (if any) and the node itself.
type Slot = (Option<usize>, TreeNode);

pub(crate) async fn walk<A: StorageAdapter + ?Sized>(adapter: &A, root: &str) -> Result<TreeNode> {
    let root = path::directory(root)?;
    let concurrency = adapter.listing_concurrency().max(1);
    let mut arena: Vec<Slot> = vec![(None, TreeNode::directory(path::file_name(&root), root.clone()))];
    let mut pending = VecDeque::from([0usize]);
    let mut listing = FuturesUnordered::new();

    loop {
        while listing.len() < concurrency
            && let Some(index) = pending.pop_front()
        {
            let dir = arena[index].1.full_path.clone();
            listing.push(async move {
                let entries = adapter.list_directory(&dir).await;
                (index, dir, entries)
            });
        }
        let Some((index, dir, entries)) = listing.next().await else {
            break;
        };
        let entries = entries?;
        tracing::trace!(directory = %dir, entries = entries.len(), "Listed directory");
        for entry in entries {
            let is_directory = entry.is_directory();
            arena.push((Some(index), entry));
            if is_directory {
                pending.push_back(arena.len() - 1);
            }
        }
    }

    assemble(arena).ok_or_raise(|| ErrorKind::Listing {
        path: root.clone(),
        reason: "listing produced no root".to_string(),
    })
}

/// Fold the arena back into a tree.
///
/// Children always occupy later slots than their parent, so popping from the
/// back attaches every subtree before its parent is moved. Children arrive in
/// reverse and are flipped once when their parent is popped.
fn assemble(mut arena: Vec<Slot>) -> Option<TreeNode> {
    while let Some((parent, mut node)) = arena.pop() {
        node.children.reverse();
        match parent {
            Some(parent) => arena[parent].1.children.push(node),
            None => return Some(node),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockAdapter;
    use crate::models::{NodeKind, Protocol};
    use rstest::rstest;

    /// A root with `width` directories, each holding one file.
    fn wide(width: usize) -> MockAdapter {
        (0..width).fold(MockAdapter::new(Protocol::Http), |adapter, i| {
            adapter.with_file(&format!("/dir{i}/tile.tif"), b"tile", "v1")
        })
    }

    #[test]
    fn test_assemble_preserves_sibling_order() {
        let arena = vec![
            (None, TreeNode::directory("", "/")),
            (Some(0), TreeNode::directory("a", "/a/")),
            (Some(0), TreeNode::file("b.txt", "/b.txt", Some(1), None)),
            (Some(1), TreeNode::file("x.tif", "/a/x.tif", Some(2), None)),
            (Some(1), TreeNode::file("y.tif", "/a/y.tif", Some(3), None)),
        ];
        let root = assemble(arena).unwrap();
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b.txt"]);
        let nested: Vec<_> = root.children[0].children.iter().map(|c| c.full_path.as_str()).collect();
        assert_eq!(nested, ["/a/x.tif", "/a/y.tif"]);
        assert_eq!(root.children[1].kind, NodeKind::File);
    }

    #[test]
    fn test_assemble_deep_chain() {
        // Deep enough that a recursive build would be a real stack risk.
        let mut arena = vec![(None, TreeNode::directory("", "/"))];
        for depth in 1..50_000usize {
            arena.push((Some(depth - 1), TreeNode::directory("d", format!("/d{depth}/"))));
        }
        let mut node = assemble(arena).unwrap();
        let mut depth = 0;
        // Unwind iteratively so dropping the tree stays shallow too.
        while let Some(child) = node.children.pop() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 49_999);
    }

    #[rstest]
    #[case::serialized(None, 1)]
    #[case::bounded(Some(4), 4)]
    #[case::wider_than_tree(Some(32), 10)]
    #[tokio::test]
    async fn test_listing_concurrency_bound(#[case] limit: Option<usize>, #[case] peak: usize) {
        let adapter = match limit {
            Some(limit) => wide(10).with_listing_concurrency(limit),
            None => wide(10),
        };
        let root = walk(&adapter, "/").await.unwrap();
        assert_eq!(root.children.len(), 10);
        assert!(root.children.iter().all(|dir| dir.children.len() == 1));
        assert_eq!(adapter.listing_count(), 11);
        assert_eq!(adapter.listing_peak(), peak);
    }
}
