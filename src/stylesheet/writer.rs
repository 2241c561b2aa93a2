//! CSS serialization for [`Stylesheet`] trees

use super::{NodeId, NodeKind, Stylesheet};

const INDENT: &str = "  ";

/// Serialize a stylesheet. Top-level nodes are separated by a blank line.
pub(super) fn write(sheet: &Stylesheet) -> String {
    let mut blocks = vec![];
    for child in sheet.children(sheet.root()) {
        let mut out = String::new();
        write_node(sheet, *child, 0, &mut out);
        blocks.push(out);
    }
    blocks.join("\n")
}

fn write_node(sheet: &Stylesheet, id: NodeId, depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    match sheet.kind(id) {
        NodeKind::Root => {
            for child in sheet.children(id) {
                write_node(sheet, *child, depth, out);
            }
        }
        NodeKind::Rule { selectors } => {
            out.push_str(&format!("{}{} {{\n", indent, selectors.join(", ")));
            write_children(sheet, id, depth, out);
            out.push_str(&format!("{}}}\n", indent));
        }
        NodeKind::AtRule { name, params, has_block } => {
            let head = if params.is_empty() {
                format!("{}@{}", indent, name)
            } else {
                format!("{}@{} {}", indent, name, params)
            };
            if *has_block {
                out.push_str(&format!("{} {{\n", head));
                write_children(sheet, id, depth, out);
                out.push_str(&format!("{}}}\n", indent));
            } else {
                out.push_str(&format!("{};\n", head));
            }
        }
        NodeKind::Decl(decl) => {
            let important = if decl.important { " !important" } else { "" };
            out.push_str(&format!("{}{}: {}{};\n", indent, decl.prop, decl.value, important));
        }
        NodeKind::Comment(body) => {
            out.push_str(&format!("{}/*{}*/\n", indent, body));
        }
    }
}

fn write_children(sheet: &Stylesheet, id: NodeId, depth: usize, out: &mut String) {
    for child in sheet.children(id) {
        write_node(sheet, *child, depth + 1, out);
    }
}
