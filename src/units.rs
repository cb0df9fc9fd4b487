//! The unit instance tree of a process.
//!
//! A composite process instantiates models which instantiate further
//! models; this module records that hierarchy as a tree, without flattening
//! anything.  The tree powers the `--dump-units` console output and, with
//! the `dot` feature, a Graphviz export of the same structure.  It is a
//! debugging aid; the flattener does not use it.

use crate::flatten::RECURSION_MAX;
use crate::model::Model;
use crate::model::Repository;
use std::io;

/// One instantiated unit: the instance name inside its parent, the model
/// it instantiates, and the units of that model in turn.
#[derive(Debug, Default, Clone)]
pub struct UnitNode {
    /// Instance name; the process name at the root.
    pub instance: String,
    /// Name of the instantiated model.
    pub model: String,
    /// True if the model definition was not found in the repository.
    pub missing: bool,
    /// Instances declared by the instantiated model.
    pub children: Vec<UnitNode>,
}

/// Builds the instance tree of one process.
///
/// Unknown model types become leaves marked `missing`; recursion stops at
/// the same nesting depth as the flattener, so circular definitions
/// produce a truncated tree instead of running away.
pub fn build_unit_tree(repo: &Repository, process: &Model) -> UnitNode {
    let mut root = UnitNode {
        instance: process.name.clone(),
        model: process.name.clone(),
        missing: false,
        children: vec![],
    };
    add_children(repo, process, &mut root, 0);
    root
}

fn add_children(repo: &Repository, model: &Model, node: &mut UnitNode, level: u32) {
    if level > RECURSION_MAX {
        return;
    }
    for unit in &model.units {
        let mut child = UnitNode {
            instance: unit.name.clone(),
            model: unit.model_type.clone(),
            missing: false,
            children: vec![],
        };
        match repo.find_model(&unit.model_type) {
            Some(sub_model) => add_children(repo, sub_model, &mut child, level + 1),
            None => child.missing = true,
        }
        node.children.push(child);
    }
}

impl UnitNode {
    /// Writes the tree in indented form, one instance per line.
    pub fn write_tree(&self, out: &mut impl io::Write) -> io::Result<()> {
        self.write_node(out, 0)
    }

    fn write_node(&self, out: &mut impl io::Write, indent: usize) -> io::Result<()> {
        let note = if self.missing { "  (model not found)" } else { "" };
        writeln!(
            out,
            "{:indent$}{} : {}{}",
            "",
            self.instance,
            self.model,
            note,
            indent = indent
        )?;
        for child in &self.children {
            child.write_node(out, indent + 4)?;
        }
        Ok(())
    }

    /// Exports the tree as a Graphviz digraph.
    #[cfg(feature = "dot")]
    pub fn export_dot(&self, out: &mut impl io::Write) -> io::Result<()> {
        let mut bytes = Vec::new();
        {
            let mut writer = dot_writer::DotWriter::from(&mut bytes);
            writer.set_pretty_print(true);
            let mut graph = writer.digraph();
            self.write_dot_node(&mut graph, "u0");
        }
        out.write_all(&bytes)
    }

    #[cfg(feature = "dot")]
    fn write_dot_node(&self, graph: &mut dot_writer::Scope, id: &str) {
        use dot_writer::Attributes;
        {
            let mut node = graph.node_named(id);
            node.set_label(&format!("{} : {}", self.instance, self.model));
        }
        for (i, child) in self.children.iter().enumerate() {
            let child_id = format!("{}_{}", id, i);
            child.write_dot_node(graph, &child_id);
            graph.edge(id, child_id.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagnosticSink;
    use crate::model::UnitDescriptor;

    fn unit(name: &str, model_type: &str) -> UnitDescriptor {
        UnitDescriptor {
            name: name.to_string(),
            model_type: model_type.to_string(),
            ..UnitDescriptor::default()
        }
    }

    #[test]
    fn builds_nested_tree() {
        let mut diags = DiagnosticSink::new();
        let mut repo = Repository::new();

        repo.add(Model::new("Inner", false), &mut diags);
        let mut outer = Model::new("Outer", false);
        outer.add_unit(unit("i1", "Inner"), &mut diags);
        outer.add_unit(unit("i2", "Missing"), &mut diags);
        repo.add(outer, &mut diags);

        let mut process = Model::new("Plant", true);
        process.add_unit(unit("o", "Outer"), &mut diags);

        let tree = build_unit_tree(&repo, &process);
        assert_eq!(tree.instance, "Plant");
        assert_eq!(tree.children.len(), 1);
        let outer_node = &tree.children[0];
        assert_eq!(outer_node.instance, "o");
        assert_eq!(outer_node.children.len(), 2);
        assert!(!outer_node.children[0].missing);
        assert!(outer_node.children[1].missing);
    }

    #[test]
    fn circular_definitions_terminate() {
        let mut diags = DiagnosticSink::new();
        let mut repo = Repository::new();
        let mut cyclic = Model::new("A", false);
        cyclic.add_unit(unit("again", "A"), &mut diags);
        repo.add(cyclic, &mut diags);

        let mut process = Model::new("P", true);
        process.add_unit(unit("a", "A"), &mut diags);
        let tree = build_unit_tree(&repo, &process);

        // the tree is bounded by the nesting limit
        let mut depth = 0;
        let mut node = &tree;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert!(depth <= RECURSION_MAX as usize + 2);
    }
}
