//! Lazy depth-first traversal

use super::{FileNode, FileSystem};

type IgnorePredicate<'a> = Box<dyn Fn(&FileNode) -> bool + Send + 'a>;

/// Pre-order depth-first iterator over one or more roots
///
/// Children are listed only when their parent is reached, so a consumer that
/// stops early never pays for the rest of the tree. Nodes matching the ignore
/// predicate are skipped together with their whole subtree.
pub struct DepthFirst<'a> {
    fs: &'a dyn FileSystem,
    roots: Vec<FileNode>,
    stack: Vec<FileNode>,
    ignore: IgnorePredicate<'a>,
}

impl<'a> DepthFirst<'a> {
    /// Walk `roots` in order
    pub fn new(fs: &'a dyn FileSystem, roots: impl IntoIterator<Item = FileNode>) -> Self {
        let roots: Vec<FileNode> = roots.into_iter().collect();
        let stack = roots.iter().rev().cloned().collect();
        Self {
            fs,
            roots,
            stack,
            ignore: Box::new(|_| false),
        }
    }

    /// Prune nodes (and their subtrees) for which `ignore` returns true
    #[must_use]
    pub fn with_ignore(mut self, ignore: impl Fn(&FileNode) -> bool + Send + 'a) -> Self {
        self.ignore = Box::new(ignore);
        self
    }

    /// Start over from the roots
    pub fn restart(&mut self) {
        self.stack = self.roots.iter().rev().cloned().collect();
    }
}

impl Iterator for DepthFirst<'_> {
    type Item = FileNode;

    fn next(&mut self) -> Option<FileNode> {
        while let Some(node) = self.stack.pop() {
            if (self.ignore)(&node) {
                continue;
            }
            if node.is_dir {
                let children = self.fs.children(&node);
                self.stack.extend(children.into_iter().rev());
            }
            return Some(node);
        }
        None
    }
}
