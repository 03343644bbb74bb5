//! Post-parse analysis pass.
//!
//! Walks the finished tree once, in document order, and fills the
//! [`TemplateAst`] metadata: setup fragments, their import lines, and the
//! component and slot indexes.

use std::collections::BTreeMap;

use crate::ast::{Node, TemplateAst};

pub(crate) fn analyze(root: Node) -> TemplateAst {
    let mut collector = Collector::default();
    collector.visit(&root);

    let imports = collector
        .setup_blocks
        .iter()
        .flat_map(|block| block.lines())
        .map(str::trim)
        .filter(|line| is_import_line(line))
        .map(str::to_string)
        .collect();

    TemplateAst {
        root,
        setup_blocks: collector.setup_blocks,
        imports,
        components: collector.components,
        slots: collector.slots,
    }
}

/// `import x` and `from x import y` lines.
pub fn is_import_line(line: &str) -> bool {
    line.starts_with("import ") || line.starts_with("from ")
}

#[derive(Default)]
struct Collector {
    setup_blocks: Vec<String>,
    components: BTreeMap<String, Node>,
    slots: BTreeMap<String, Node>,
}

impl Collector {
    fn visit(&mut self, node: &Node) {
        match node {
            Node::SetupCode { content, .. } => self.setup_blocks.push(content.clone()),
            Node::Component { name, .. } => {
                self.components.insert(name.clone(), node.clone());
            }
            Node::Slot { name, .. } => {
                self.slots.insert(name.clone(), node.clone());
            }
            _ => {}
        }

        for child in node.children() {
            self.visit(child);
        }
        if let Node::If(cond) | Node::Elif(cond) = node {
            if let Some(alt) = &cond.alternative {
                self.visit(alt);
            }
        }
    }
}
