//! The vault file tree: directories and files as shown in the explorer.
//!
//! The tree is built from listings supplied by the external file-system
//! adapter. Construction normalizes it: children sorted directories-first
//! then case-insensitively by name, and directories holding no file with an
//! allowed extension (at any depth) pruned away.

use serde::{Deserialize, Serialize};

use crate::ids::{DirHandle, FileHandle};

/// A file entry in the vault tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name including extension.
    pub name: String,
    /// Extension, lowercased, without the dot. Empty when the name has none.
    pub extension: String,
    /// Opaque handle from the file-system adapter.
    pub handle: FileHandle,
    /// Canonical vault-relative path.
    pub path: String,
}

impl FileEntry {
    /// Create an entry, deriving the lowercased extension from the name.
    pub fn new(name: impl Into<String>, handle: FileHandle, path: impl Into<String>) -> Self {
        let name = name.into();
        let extension = name
            .rsplit_once('.')
            .map(|(stem, ext)| if stem.is_empty() { "" } else { ext })
            .unwrap_or("")
            .to_lowercase();
        Self {
            name,
            extension,
            handle,
            path: path.into(),
        }
    }
}

/// A directory entry in the vault tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Directory name.
    pub name: String,
    /// Children, sorted directories-first then lexicographic.
    pub children: Vec<TreeNode>,
    /// Whether the directory is expanded in the explorer.
    pub expanded: bool,
    /// Opaque handle from the file-system adapter.
    pub handle: DirHandle,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, handle: DirHandle) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            expanded: false,
            handle,
        }
    }
}

/// A node of the vault tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Dir(DirEntry),
    File(FileEntry),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Dir(d) => &d.name,
            TreeNode::File(f) => &f.name,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, TreeNode::Dir(_))
    }
}

/// Normalize a directory in place: prune empty subtrees, sort children.
///
/// A directory survives only if some descendant file's extension is in
/// `allowed`. Returns whether `dir` itself still has any allowed descendant.
pub fn normalize(dir: &mut DirEntry, allowed: &[&str]) -> bool {
    dir.children.retain_mut(|child| match child {
        TreeNode::File(f) => allowed.contains(&f.extension.as_str()),
        TreeNode::Dir(d) => normalize(d, allowed),
    });
    dir.children.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
    });
    !dir.children.is_empty()
}

/// Build a normalized tree from a flat adapter listing.
///
/// `paths` are vault-relative `/`-separated file paths with their handles,
/// in any order. The result is pruned to `allowed` extensions and sorted.
pub fn build_tree(
    root_name: impl Into<String>,
    paths: &[(String, FileHandle)],
    allowed: &[&str],
) -> DirEntry {
    let mut root = DirEntry::new(root_name, DirHandle::new());
    root.expanded = true;
    for (path, handle) in paths {
        insert_path(&mut root, path, path, *handle);
    }
    normalize(&mut root, allowed);
    root
}

fn insert_path(dir: &mut DirEntry, rest: &str, full: &str, handle: FileHandle) {
    match rest.split_once('/') {
        None => {
            dir.children.push(TreeNode::File(FileEntry::new(rest, handle, full)));
        }
        Some((segment, tail)) => {
            let idx = dir
                .children
                .iter()
                .position(|c| matches!(c, TreeNode::Dir(d) if d.name == segment));
            let idx = match idx {
                Some(i) => i,
                None => {
                    dir.children
                        .push(TreeNode::Dir(DirEntry::new(segment, DirHandle::new())));
                    dir.children.len() - 1
                }
            };
            if let TreeNode::Dir(d) = &mut dir.children[idx] {
                insert_path(d, tail, full, handle);
            }
        }
    }
}

/// Find a file entry by its canonical path, depth-first.
pub fn find_file<'a>(dir: &'a DirEntry, path: &str) -> Option<&'a FileEntry> {
    for child in &dir.children {
        match child {
            TreeNode::File(f) if f.path == path => return Some(f),
            TreeNode::Dir(d) => {
                if let Some(found) = find_file(d, path) {
                    return Some(found);
                }
            }
            TreeNode::File(_) => {}
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, path: &str) -> TreeNode {
        TreeNode::File(FileEntry::new(name, FileHandle::new(), path))
    }

    fn dir(name: &str, children: Vec<TreeNode>) -> TreeNode {
        let mut d = DirEntry::new(name, DirHandle::new());
        d.children = children;
        TreeNode::Dir(d)
    }

    #[test]
    fn test_extension_lowercased() {
        let f = FileEntry::new("Report.PDF", FileHandle::new(), "Report.PDF");
        assert_eq!(f.extension, "pdf");
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        let f = FileEntry::new(".gitignore", FileHandle::new(), ".gitignore");
        assert_eq!(f.extension, "");
    }

    #[test]
    fn test_normalize_prunes_disallowed_and_empty() {
        let mut root = DirEntry::new("vault", DirHandle::new());
        root.children = vec![
            file("a.md", "a.md"),
            file("junk.tmp", "junk.tmp"),
            dir("empty", vec![file("x.bin", "empty/x.bin")]),
            dir("keep", vec![file("b.ipynb", "keep/b.ipynb")]),
        ];
        assert!(normalize(&mut root, &["md", "ipynb"]));
        let names: Vec<&str> = root.children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["keep", "a.md"]);
    }

    #[test]
    fn test_normalize_sorts_dirs_first_case_insensitive() {
        let mut root = DirEntry::new("vault", DirHandle::new());
        root.children = vec![
            file("Zeta.md", "Zeta.md"),
            file("alpha.md", "alpha.md"),
            dir("src", vec![file("n.md", "src/n.md")]),
            dir("Docs", vec![file("d.md", "Docs/d.md")]),
        ];
        normalize(&mut root, &["md"]);
        let names: Vec<&str> = root.children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Docs", "src", "alpha.md", "Zeta.md"]);
    }

    #[test]
    fn test_find_file_nested() {
        let mut root = DirEntry::new("vault", DirHandle::new());
        root.children = vec![dir("a", vec![dir("b", vec![file("c.md", "a/b/c.md")])])];
        assert_eq!(find_file(&root, "a/b/c.md").unwrap().name, "c.md");
        assert!(find_file(&root, "a/b/missing.md").is_none());
    }

    #[test]
    fn test_build_tree_from_listing() {
        let paths = vec![
            ("readme.md".to_string(), FileHandle::new()),
            ("notes/deep/idea.md".to_string(), FileHandle::new()),
            ("notes/todo.md".to_string(), FileHandle::new()),
            ("bin/blob.dat".to_string(), FileHandle::new()),
        ];
        let root = build_tree("vault", &paths, &["md"]);

        let names: Vec<&str> = root.children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["notes", "readme.md"]);

        let found = find_file(&root, "notes/deep/idea.md").unwrap();
        assert_eq!(found.name, "idea.md");
        assert_eq!(found.path, "notes/deep/idea.md");
        // The binary-only directory was pruned away.
        assert!(find_file(&root, "bin/blob.dat").is_none());
    }

    #[test]
    fn test_build_tree_merges_shared_directories() {
        let paths = vec![
            ("notes/a.md".to_string(), FileHandle::new()),
            ("notes/b.md".to_string(), FileHandle::new()),
        ];
        let root = build_tree("vault", &paths, &["md"]);
        assert_eq!(root.children.len(), 1);
        let TreeNode::Dir(notes) = &root.children[0] else {
            panic!("expected a directory");
        };
        assert_eq!(notes.children.len(), 2);
    }
}
