//! Flattening a listed tree into storable items.

use geocrawl_cache::{DataFormat, NewTreeItem};
use geocrawl_storage::{ModifiedMarker, NodeKind, TreeNode};

/// Length of a fingerprint, in hex characters.
const FINGERPRINT_LEN: usize = 16;

/// Every node below `root`, depth-first, each directory before its
/// descendants and siblings in listing order. The root itself is not an item.
///
/// Files get a fingerprint and, when their extension names a raster format,
/// a data format.
pub fn flatten(root: &TreeNode) -> Vec<NewTreeItem> {
    let mut items = Vec::new();
    let mut stack: Vec<&TreeNode> = root.children.iter().rev().collect();
    while let Some(node) = stack.pop() {
        items.push(item(node));
        stack.extend(node.children.iter().rev());
    }
    items
}

fn item(node: &TreeNode) -> NewTreeItem {
    let (fingerprint, data_format) = match node.kind {
        NodeKind::File => (
            Some(fingerprint(&node.full_path, node.modified.as_ref(), node.size)),
            classify(&node.name),
        ),
        NodeKind::Directory => (None, None),
    };
    NewTreeItem {
        kind: node.kind,
        name: node.name.clone(),
        full_path: node.full_path.clone(),
        parent_directory: parent_directory(&node.full_path, &node.name),
        size: node.size,
        modified: node.modified.clone(),
        fingerprint,
        data_format,
    }
}

/// `full_path` without its last segment, keeping the trailing `/`.
pub fn parent_directory(full_path: &str, name: &str) -> String {
    let trimmed = full_path.strip_suffix('/').unwrap_or(full_path);
    match trimmed.strip_suffix(name) {
        Some(parent) if parent.ends_with('/') => parent.to_string(),
        _ => match trimmed.rfind('/') {
            Some(slash) => trimmed[..=slash].to_string(),
            None => "/".to_string(),
        },
    }
}

/// Short, stable hash identifying one version of a file.
///
/// Each component is length-prefixed so that moving bytes between them
/// always changes the result.
pub fn fingerprint(full_path: &str, modified: Option<&ModifiedMarker>, size: Option<u64>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(full_path.len() as u64).to_le_bytes());
    hasher.update(full_path.as_bytes());
    match modified {
        Some(marker) => {
            let marker = marker.to_string();
            hasher.update(&[1]);
            hasher.update(&(marker.len() as u64).to_le_bytes());
            hasher.update(marker.as_bytes());
        },
        None => {
            hasher.update(&[0]);
        },
    }
    match size {
        Some(size) => {
            hasher.update(&[1]);
            hasher.update(&size.to_le_bytes());
        },
        None => {
            hasher.update(&[0]);
        },
    }
    hasher.finalize().to_hex()[..FINGERPRINT_LEN].to_string()
}

/// Raster format by (case-insensitive) file extension.
pub fn classify(name: &str) -> Option<DataFormat> {
    let (_, extension) = name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "jp2" => Some(DataFormat::Jpeg2000),
        "tif" | "tiff" | "geotif" | "geotiff" => Some(DataFormat::GeoTiff),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn marker(value: &str) -> Option<ModifiedMarker> {
        Some(ModifiedMarker::Timestamp(value.to_string()))
    }

    #[rstest]
    #[case("a.JP2", Some(DataFormat::Jpeg2000))]
    #[case("b.GeoTiff", Some(DataFormat::GeoTiff))]
    #[case("c.tif", Some(DataFormat::GeoTiff))]
    #[case("c.TIFF", Some(DataFormat::GeoTiff))]
    #[case("c.geotif", Some(DataFormat::GeoTiff))]
    #[case("d.txt", None)]
    #[case("jp2", None)]
    #[case("archive.jp2.zip", None)]
    fn test_classify(#[case] name: &str, #[case] expected: Option<DataFormat>) {
        assert_eq!(classify(name), expected);
    }

    #[rstest]
    #[case("/data/a.jp2", "a.jp2", "/data/")]
    #[case("/b.txt", "b.txt", "/")]
    #[case("/data/", "data", "/")]
    #[case("/pub/data/deeper/", "deeper", "/pub/data/")]
    fn test_parent_directory(#[case] full_path: &str, #[case] name: &str, #[case] expected: &str) {
        assert_eq!(parent_directory(full_path, name), expected);
    }

    #[test]
    fn test_fingerprint_is_pure() {
        let a = fingerprint("/data/a.jp2", marker("v1").as_ref(), Some(100));
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert_eq!(a, fingerprint("/data/a.jp2", marker("v1").as_ref(), Some(100)));
        assert_ne!(a, fingerprint("/data/b.jp2", marker("v1").as_ref(), Some(100)));
        assert_ne!(a, fingerprint("/data/a.jp2", marker("v2").as_ref(), Some(100)));
        assert_ne!(a, fingerprint("/data/a.jp2", marker("v1").as_ref(), Some(101)));
        assert_ne!(a, fingerprint("/data/a.jp2", None, Some(100)));
        assert_ne!(a, fingerprint("/data/a.jp2", marker("v1").as_ref(), None));
        let etag = Some(ModifiedMarker::ETag("v1".to_string()));
        assert_ne!(a, fingerprint("/data/a.jp2", etag.as_ref(), Some(100)));
    }

    #[test]
    fn test_flatten_end_to_end_shape() {
        let mut data = TreeNode::directory("data", "/data/");
        data.children.push(TreeNode::file("a.jp2", "/data/a.jp2", Some(100), marker("v1")));
        let mut root = TreeNode::directory("", "/");
        root.children.push(data);
        root.children.push(TreeNode::file("b.txt", "/b.txt", Some(5), marker("v1")));

        let items = flatten(&root);
        let summary: Vec<_> = items.iter().map(|i| (i.kind, i.full_path.as_str(), i.data_format)).collect();
        assert_eq!(
            summary,
            [
                (NodeKind::Directory, "/data/", None),
                (NodeKind::File, "/data/a.jp2", Some(DataFormat::Jpeg2000)),
                (NodeKind::File, "/b.txt", None),
            ]
        );
        assert!(items[0].fingerprint.is_none());
        assert!(items[1].fingerprint.is_some());
        assert!(items[2].fingerprint.is_some());
        assert_eq!(items[1].parent_directory, "/data/");
    }

    #[test]
    fn test_flatten_deep_tree() {
        let mut node = TreeNode::file("leaf.tif", "/leaf.tif", Some(1), None);
        for depth in 0..2_000 {
            let mut dir = TreeNode::directory(format!("d{depth}"), format!("/d{depth}/"));
            dir.children.push(node);
            node = dir;
        }
        let mut root = TreeNode::directory("", "/");
        root.children.push(node);
        let items = flatten(&root);
        assert_eq!(items.len(), 2_001);
        assert_eq!(items.last().unwrap().data_format, Some(DataFormat::GeoTiff));
    }
}
