//! Self-referencing row hierarchies (id / parent-id columns).
//!
//! The tree is an arena: nodes live in one `Vec` and refer to each other by
//! [`NodeId`]. It is built fresh for every hierarchical render and dropped
//! afterwards.

use std::collections::HashMap;

use crate::data::DataSourceCursor;
use crate::error::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
pub struct HierarchyItem {
    pub key: String,
    /// Source row; `None` for the synthetic root and for parent keys that
    /// never appear as a row.
    pub row_no: Option<usize>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct HierarchyTree {
    nodes: Vec<HierarchyItem>,
}

impl HierarchyTree {
    const ROOT: NodeId = NodeId(0);

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    pub fn node(&self, id: NodeId) -> &HierarchyItem {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Find the node printed for `row`.
    pub fn find_row(&self, row: usize) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.row_no == Some(row))
            .map(NodeId)
    }

    /// Number of row nodes reachable from the root.
    pub fn reachable_rows(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            for &child in self.children(id) {
                if self.node(child).row_no.is_some() {
                    count += 1;
                }
                stack.push(child);
            }
        }
        count
    }
}

pub struct HierarchyBuilder {
    nodes: Vec<HierarchyItem>,
    by_key: HashMap<String, NodeId>,
}

impl HierarchyBuilder {
    /// Build the tree over `rows` of `source`.
    ///
    /// Returns `Ok(None)` when either column cannot be resolved; data access
    /// failures propagate. Rows on a parent-id cycle are never reachable from
    /// the root and are therefore not printed.
    pub fn build(
        source: &mut dyn DataSourceCursor,
        rows: &[usize],
        id_column: &str,
        parent_id_column: &str,
    ) -> Result<Option<HierarchyTree>, DataError> {
        let (Some(id_index), Some(parent_index)) = (
            source.resolve_column(id_column),
            source.resolve_column(parent_id_column),
        ) else {
            log::warn!(
                "hierarchy columns '{id_column}'/'{parent_id_column}' not found in '{}'; skipping",
                source.name()
            );
            return Ok(None);
        };

        let mut builder = Self {
            nodes: vec![HierarchyItem::default()],
            by_key: HashMap::new(),
        };

        for &row in rows {
            source.set_current_row_no(row);
            let key = source.value_at(id_index)?.as_key();
            let parent_key = source.value_at(parent_index)?.as_key();

            let node = builder.node_for(&key);
            if builder.nodes[node.0].row_no.is_some() {
                log::warn!("duplicate hierarchy id '{key}' at row {row}; row skipped");
                continue;
            }
            builder.nodes[node.0].row_no = Some(row);

            let parent = builder.node_for(&parent_key);
            builder.nodes[node.0].parent = Some(parent);
            builder.nodes[parent.0].children.push(node);
        }

        let tree = builder.finish();
        let total = tree.nodes.iter().filter(|n| n.row_no.is_some()).count();
        let reachable = tree.reachable_rows();
        if reachable < total {
            log::warn!(
                "{} hierarchy row(s) form a parent-id cycle and are not printed",
                total - reachable
            );
        }
        Ok(Some(tree))
    }

    fn node_for(&mut self, key: &str) -> NodeId {
        if let Some(&id) = self.by_key.get(key) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(HierarchyItem {
            key: key.to_string(),
            ..HierarchyItem::default()
        });
        self.by_key.insert(key.to_string(), id);
        id
    }

    /// Hang every unparented node off the synthetic root. Parent keys that
    /// never had a row of their own are skipped; their children move up.
    fn finish(mut self) -> HierarchyTree {
        let root = HierarchyTree::ROOT;
        let mut top = Vec::new();
        for index in 1..self.nodes.len() {
            if self.nodes[index].parent.is_some() {
                continue;
            }
            if self.nodes[index].row_no.is_some() {
                top.push(NodeId(index));
            } else {
                top.extend(std::mem::take(&mut self.nodes[index].children));
            }
        }
        top.sort_by_key(|id| self.nodes[id.0].row_no);
        for &id in &top {
            self.nodes[id.0].parent = Some(root);
        }
        self.nodes[root.0].children = top;
        HierarchyTree { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryDataSource, Value};

    fn source(rows: &[(&str, &str)]) -> MemoryDataSource {
        let mut source = MemoryDataSource::new("tree", &["id", "parent"]);
        for (id, parent) in rows {
            let parent = if parent.is_empty() {
                Value::Null
            } else {
                Value::Text(parent.to_string())
            };
            source.push_row(vec![Value::Text(id.to_string()), parent]);
        }
        source
    }

    fn keys(tree: &HierarchyTree, id: NodeId) -> Vec<String> {
        tree.children(id)
            .iter()
            .map(|&c| tree.node(c).key.clone())
            .collect()
    }

    #[test]
    fn builds_root_with_nested_children() {
        let mut src = source(&[("1", ""), ("2", "1"), ("3", "1")]);
        let tree = HierarchyBuilder::build(&mut src, &[0, 1, 2], "id", "parent")
            .unwrap()
            .unwrap();

        assert_eq!(keys(&tree, tree.root()), vec!["1"]);
        let one = tree.children(tree.root())[0];
        assert_eq!(tree.node(one).row_no, Some(0));
        assert_eq!(keys(&tree, one), vec!["2", "3"]);
        let rows: Vec<_> = tree
            .children(one)
            .iter()
            .map(|&c| tree.node(c).row_no)
            .collect();
        assert_eq!(rows, vec![Some(1), Some(2)]);
        assert_eq!(tree.node(tree.children(one)[0]).parent, Some(one));
    }

    #[test]
    fn unresolved_column_yields_no_tree() {
        let mut src = source(&[("1", "")]);
        let tree = HierarchyBuilder::build(&mut src, &[0], "id", "missing").unwrap();
        assert!(tree.is_none());
    }

    #[test]
    fn rows_with_unknown_parent_become_top_level() {
        let mut src = source(&[("5", "99"), ("1", ""), ("6", "5")]);
        let tree = HierarchyBuilder::build(&mut src, &[0, 1, 2], "id", "parent")
            .unwrap()
            .unwrap();
        assert_eq!(keys(&tree, tree.root()), vec!["5", "1"]);
        let five = tree.children(tree.root())[0];
        assert_eq!(keys(&tree, five), vec!["6"]);
    }

    #[test]
    fn cycles_are_unreachable() {
        let mut src = source(&[("1", ""), ("2", "3"), ("3", "2")]);
        let tree = HierarchyBuilder::build(&mut src, &[0, 1, 2], "id", "parent")
            .unwrap()
            .unwrap();
        assert_eq!(keys(&tree, tree.root()), vec!["1"]);
        assert_eq!(tree.reachable_rows(), 1);
    }

    #[test]
    fn builds_over_a_row_subset() {
        let mut src = source(&[("1", ""), ("2", "1"), ("3", "1")]);
        let tree = HierarchyBuilder::build(&mut src, &[0, 2], "id", "parent")
            .unwrap()
            .unwrap();
        let one = tree.children(tree.root())[0];
        assert_eq!(keys(&tree, one), vec!["3"]);
        assert_eq!(tree.find_row(2), Some(tree.children(one)[0]));
    }
}
