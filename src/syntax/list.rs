//! Structure-sharing list of syntax trees.
//!
//! The dominant edit in an incremental build loop is "replace the one tree the user is
//! typing in". [`SyntaxTreeList`] stores its trees as three segments, `before`, an
//! optional `middle` and `after`, so that replacing the middle tree copies nothing but
//! two reference counts.
//!
//! Invariant: `middle` is `None` implies `after` is empty.

use std::{ops::Index, sync::Arc};

use crate::{syntax::SyntaxTree, Error, Result};

/// An immutable ordered list of syntax trees.
///
/// # Examples
///
/// ```rust
/// use dotcompile::lang::MiniLanguage;
/// use dotcompile::syntax::SyntaxTreeList;
///
/// let a = MiniLanguage::parse("class A {}", "a.mini");
/// let b = MiniLanguage::parse("class B {}", "b.mini");
/// let list = SyntaxTreeList::from_trees(vec![a.clone(), b.clone()]);
///
/// let b2 = MiniLanguage::parse("class B2 {}", "b.mini");
/// let edited = list.set_item(1, b2.clone())?;
/// assert_eq!(edited[1], b2);
/// assert_eq!(list[1], b);
/// # Ok::<(), dotcompile::Error>(())
/// ```
#[derive(Clone)]
pub struct SyntaxTreeList {
    before: Arc<[SyntaxTree]>,
    middle: Option<SyntaxTree>,
    after: Arc<[SyntaxTree]>,
}

impl SyntaxTreeList {
    /// An empty list.
    #[must_use]
    pub fn empty() -> Self {
        SyntaxTreeList {
            before: Arc::from(Vec::new()),
            middle: None,
            after: Arc::from(Vec::new()),
        }
    }

    /// Builds a `before`-only list from `trees`.
    #[must_use]
    pub fn from_trees(trees: impl IntoIterator<Item = SyntaxTree>) -> Self {
        let mut builder = SyntaxTreeListBuilder::new();
        builder.add_range(trees);
        builder.build()
    }

    /// Returns a new builder.
    #[must_use]
    pub fn builder() -> SyntaxTreeListBuilder {
        SyntaxTreeListBuilder::new()
    }

    /// Number of trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.before.len() + usize::from(self.middle.is_some()) + self.after.len()
    }

    /// `true` if the list holds no trees.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tree at `index`, `None` if out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SyntaxTree> {
        if index < self.before.len() {
            return self.before.get(index);
        }
        let index = index - self.before.len();
        match &self.middle {
            Some(middle) if index == 0 => Some(middle),
            Some(_) => self.after.get(index - 1),
            None => None,
        }
    }

    /// Tree at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentOutOfRange`] if `index >= len()`.
    pub fn try_get(&self, index: usize) -> Result<&SyntaxTree> {
        self.get(index).ok_or(Error::ArgumentOutOfRange {
            param: "index",
            index,
            len: self.len(),
        })
    }

    /// Iterates over the trees in order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SyntaxTree> + '_ {
        self.before
            .iter()
            .chain(self.middle.iter())
            .chain(self.after.iter())
    }

    /// Position of `tree` (by identity).
    #[must_use]
    pub fn index_of(&self, tree: &SyntaxTree) -> Option<usize> {
        self.iter().position(|t| t == tree)
    }

    /// `true` if `tree` (by identity) is in the list.
    #[must_use]
    pub fn contains(&self, tree: &SyntaxTree) -> bool {
        self.index_of(tree).is_some()
    }

    /// The only tree, or `None` if the list is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the list holds more than one tree.
    pub fn single_or_default(&self) -> Result<Option<&SyntaxTree>> {
        match self.len() {
            0 => Ok(None),
            1 => Ok(self.get(0)),
            n => Err(Error::InvalidOperation(format!(
                "sequence contains {n} elements, expected at most one"
            ))),
        }
    }

    /// Appends `trees`. With a middle present they go to `after`, otherwise to `before`.
    #[must_use]
    pub fn add_range(&self, trees: impl IntoIterator<Item = SyntaxTree>) -> Self {
        let added: Vec<SyntaxTree> = trees.into_iter().collect();
        if added.is_empty() {
            return self.clone();
        }
        if self.middle.is_some() {
            SyntaxTreeList {
                before: Arc::clone(&self.before),
                middle: self.middle.clone(),
                after: concat(&self.after, added),
            }
        } else {
            SyntaxTreeList {
                before: concat(&self.before, added),
                middle: None,
                after: Arc::clone(&self.after),
            }
        }
    }

    /// Replaces the tree at `index`.
    ///
    /// O(1) when `index` is the position of the current middle. Any other index rebuilds
    /// the segments around it, which makes `index` the new middle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentOutOfRange`] if `index >= len()`.
    pub fn set_item(&self, index: usize, tree: SyntaxTree) -> Result<Self> {
        let len = self.len();
        if index >= len {
            return Err(Error::ArgumentOutOfRange {
                param: "index",
                index,
                len,
            });
        }

        if self.middle.is_some() && index == self.before.len() {
            return Ok(SyntaxTreeList {
                before: Arc::clone(&self.before),
                middle: Some(tree),
                after: Arc::clone(&self.after),
            });
        }

        let before: Vec<SyntaxTree> = self.iter().take(index).cloned().collect();
        let after: Vec<SyntaxTree> = self.iter().skip(index + 1).cloned().collect();
        Ok(SyntaxTreeList {
            before: Arc::from(before),
            middle: Some(tree),
            after: Arc::from(after),
        })
    }

    /// Replaces `old` (by identity) with `new`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `old` is not in the list.
    pub fn replace(&self, old: &SyntaxTree, new: SyntaxTree) -> Result<Self> {
        let index = self
            .index_of(old)
            .ok_or_else(|| argument_error!("old_tree", "syntax tree is not part of the list"))?;
        self.set_item(index, new)
    }

    /// Removes every tree matching `predicate`. The result is a fresh `before`-only list.
    #[must_use]
    pub fn remove_all(&self, mut predicate: impl FnMut(&SyntaxTree) -> bool) -> Self {
        let mut builder = SyntaxTreeListBuilder::new();
        for tree in self.iter() {
            if !predicate(tree) {
                builder.add(tree.clone());
            }
        }
        builder.build()
    }

    /// Backing segments, exposed for structure-sharing checks.
    #[must_use]
    pub fn segments(&self) -> (&Arc<[SyntaxTree]>, Option<&SyntaxTree>, &Arc<[SyntaxTree]>) {
        (&self.before, self.middle.as_ref(), &self.after)
    }
}

impl Default for SyntaxTreeList {
    fn default() -> Self {
        Self::empty()
    }
}

fn concat(existing: &Arc<[SyntaxTree]>, added: Vec<SyntaxTree>) -> Arc<[SyntaxTree]> {
    let mut merged = Vec::with_capacity(existing.len() + added.len());
    merged.extend(existing.iter().cloned());
    merged.extend(added);
    Arc::from(merged)
}

impl Index<usize> for SyntaxTreeList {
    type Output = SyntaxTree;

    fn index(&self, index: usize) -> &SyntaxTree {
        match self.get(index) {
            Some(tree) => tree,
            None => panic!(
                "index out of range: the len is {} but the index is {}",
                self.len(),
                index
            ),
        }
    }
}

impl std::fmt::Debug for SyntaxTreeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Append-only builder for [`SyntaxTreeList`].
#[derive(Default)]
pub struct SyntaxTreeListBuilder {
    trees: Vec<SyntaxTree>,
}

impl SyntaxTreeListBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        SyntaxTreeListBuilder { trees: Vec::new() }
    }

    /// Appends one tree.
    pub fn add(&mut self, tree: SyntaxTree) -> &mut Self {
        self.trees.push(tree);
        self
    }

    /// Appends several trees.
    pub fn add_range(&mut self, trees: impl IntoIterator<Item = SyntaxTree>) -> &mut Self {
        self.trees.extend(trees);
        self
    }

    /// Finishes the list; all trees land in `before`.
    #[must_use]
    pub fn build(self) -> SyntaxTreeList {
        SyntaxTreeList {
            before: Arc::from(self.trees),
            middle: None,
            after: Arc::from(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::ParseOptions,
        syntax::{RawSyntaxKind, SourceText, SyntaxNode, TextSpan},
    };

    fn tree(name: &str) -> SyntaxTree {
        SyntaxTree::new(
            "Test",
            name,
            SourceText::new(name),
            ParseOptions::default(),
            SyntaxNode::new(RawSyntaxKind(0), TextSpan::default(), Vec::new()),
            Vec::new(),
        )
    }

    fn trees(n: usize) -> Vec<SyntaxTree> {
        (0..n).map(|i| tree(&format!("t{i}"))).collect()
    }

    #[test]
    fn test_builder_produces_before_only() {
        let list = SyntaxTreeList::from_trees(trees(3));
        let (before, middle, after) = list.segments();
        assert_eq!(before.len(), 3);
        assert!(middle.is_none());
        assert!(after.is_empty());
    }

    #[test]
    fn test_set_item_at_middle_shares_segments() {
        let list = SyntaxTreeList::from_trees(trees(10));
        let first = list.set_item(4, tree("edit1")).unwrap();
        let second = first.set_item(4, tree("edit2")).unwrap();

        let (b1, _, a1) = first.segments();
        let (b2, m2, a2) = second.segments();
        assert!(Arc::ptr_eq(b1, b2));
        assert!(Arc::ptr_eq(a1, a2));
        assert_eq!(m2.unwrap().file_path(), "edit2");
        assert_eq!(second.len(), 10);
    }

    #[test]
    fn test_set_item_elsewhere_moves_middle() {
        let original = trees(5);
        let list = SyntaxTreeList::from_trees(original.clone())
            .set_item(1, tree("x"))
            .unwrap()
            .set_item(3, tree("y"))
            .unwrap();

        let names: Vec<_> = list.iter().map(|t| t.file_path().to_string()).collect();
        assert_eq!(names, ["t0", "x", "t2", "y", "t4"]);
        assert_eq!(list.segments().0.len(), 3);
        assert_eq!(list.segments().2.len(), 1);
    }

    #[test]
    fn test_add_range_goes_after_middle() {
        let list = SyntaxTreeList::from_trees(trees(3)).set_item(1, tree("m")).unwrap();
        let extended = list.add_range(vec![tree("n")]);
        assert_eq!(extended.segments().2.len(), 2);
        assert_eq!(extended[3].file_path(), "n");
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_add_range_without_middle_goes_before() {
        let list = SyntaxTreeList::from_trees(trees(2)).add_range(trees(2));
        assert_eq!(list.segments().0.len(), 4);
        assert!(list.segments().2.is_empty());
    }

    #[test]
    fn test_replace_and_missing_tree() {
        let original = trees(3);
        let list = SyntaxTreeList::from_trees(original.clone());
        let replaced = list.replace(&original[2], tree("z")).unwrap();
        assert_eq!(replaced[2].file_path(), "z");
        assert!(matches!(
            list.replace(&tree("nope"), tree("z")),
            Err(Error::Argument { .. })
        ));
    }

    #[test]
    fn test_out_of_range() {
        let list = SyntaxTreeList::from_trees(trees(2));
        assert!(list.get(2).is_none());
        assert!(matches!(
            list.set_item(2, tree("x")),
            Err(Error::ArgumentOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "index out of range")]
    fn test_index_panics() {
        let list = SyntaxTreeList::empty();
        let _ = &list[0];
    }

    #[test]
    fn test_single_or_default() {
        assert!(SyntaxTreeList::empty().single_or_default().unwrap().is_none());
        assert!(SyntaxTreeList::from_trees(trees(1))
            .single_or_default()
            .unwrap()
            .is_some());
        assert!(SyntaxTreeList::from_trees(trees(2))
            .single_or_default()
            .is_err());
    }

    #[test]
    fn test_remove_all() {
        let list = SyntaxTreeList::from_trees(trees(4)).set_item(2, tree("m")).unwrap();
        let removed = list.remove_all(|t| t.file_path().starts_with('t'));
        assert_eq!(removed.len(), 1);
        assert!(removed.segments().1.is_none());
    }
}
