//! Background rule merging
//!
//! Background declarations generated for different selectors are identical as long as the
//! selectors share a structural root (the stylesheet or an enclosing at-rule) and density.
//! Each such group becomes one synthesized rule listing every selector.

use crate::pipeline::SpriteError;
use crate::stylesheet::{Declaration, NodeId, Stylesheet};
use std::collections::HashMap;

/// Background declarations waiting to be merged
#[derive(Debug, Clone)]
pub struct DeferredBackground {
    pub declarations: Vec<Declaration>,
    /// The directive node the declarations were generated for
    pub node: NodeId,
    pub normal: bool,
}

/// Identifier handed to each structural root the first time it is seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

#[derive(Debug)]
struct Entry {
    context: Option<ContextId>,
    root: Option<NodeId>,
    background: DeferredBackground,
}

/// Collects deferred background declarations and emits the merged rules.
#[derive(Debug, Default)]
pub struct RuleMerger {
    contexts: HashMap<NodeId, ContextId>,
    entries: Vec<Entry>,
}

impl RuleMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a background for merging. Order of calls is the order of emission.
    ///
    /// The directive must sit directly inside a rule: its selectors are what the merged
    /// rule is built from.
    pub fn defer(
        &mut self,
        sheet: &Stylesheet,
        background: DeferredBackground,
    ) -> Result<(), SpriteError> {
        let in_rule =
            sheet.parent(background.node).is_some_and(|parent| sheet.selectors(parent).is_some());
        if !in_rule {
            return Err(SpriteError::OutsideRule { location: sheet.location(background.node) });
        }

        let root = sheet.grandparent(background.node);
        let context = root.map(|root| {
            let next = ContextId(self.contexts.len());
            *self.contexts.entry(root).or_insert(next)
        });
        self.entries.push(Entry { context, root, background });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emit one rule per (structural root, density) group and remove the original nodes.
    ///
    /// Returns the number of rules created.
    pub fn merge(self, sheet: &mut Stylesheet) -> usize {
        let mut remaining = self.entries;
        // Last rule inserted into each container, so groups keep first-occurrence order
        let mut inserted: HashMap<NodeId, NodeId> = HashMap::new();
        let mut created = 0;

        while !remaining.is_empty() {
            let first = remaining.remove(0);
            let (group, rest): (Vec<Entry>, Vec<Entry>) = remaining.into_iter().partition(|e| {
                e.context == first.context && e.background.normal == first.background.normal
            });
            remaining = rest;

            let mut members = vec![first];
            members.extend(group);
            if emit_group(sheet, &members, &mut inserted) {
                created += 1;
            }
            for member in &members {
                sheet.remove(member.background.node);
            }
        }
        created
    }
}

fn emit_group(
    sheet: &mut Stylesheet,
    members: &[Entry],
    inserted: &mut HashMap<NodeId, NodeId>,
) -> bool {
    let first = &members[0];
    let (Some(rule), Some(root)) = (sheet.parent(first.background.node), first.root) else {
        return false;
    };

    let mut selectors: Vec<String> = vec![];
    for member in members {
        let Some(member_rule) = sheet.parent(member.background.node) else {
            continue;
        };
        for selector in sheet.selectors(member_rule).unwrap_or_default() {
            if !selectors.contains(selector) {
                selectors.push(selector.clone());
            }
        }
    }

    let clone = sheet.clone_rule_empty(rule, selectors);
    for decl in &first.background.declarations {
        let node = sheet.create_decl(decl.clone());
        sheet.append(clone, node);
    }

    let (container, node) = if sheet.is_at_rule(root) {
        let wrapper = sheet.clone_empty(root);
        sheet.append(wrapper, clone);
        (sheet.parent(root).unwrap_or_else(|| sheet.root()), wrapper)
    } else {
        (root, clone)
    };

    match inserted.get(&container) {
        Some(previous) if sheet.parent(*previous) == Some(container) => {
            sheet.insert_after(*previous, node)
        }
        _ => sheet.prepend(container, node),
    }
    inserted.insert(container, node);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::parse;

    fn directives(sheet: &Stylesheet) -> Vec<NodeId> {
        sheet.walk_decls(|d| d.prop == "sprite-prop")
    }

    fn background(node: NodeId, normal: bool) -> DeferredBackground {
        DeferredBackground {
            declarations: vec![
                Declaration::new("background-image", "url(s.png)"),
                Declaration::new("background-repeat", "no-repeat"),
            ],
            node,
            normal,
        }
    }

    #[test]
    fn test_merges_same_context_into_one_rule() {
        let mut sheet = parse(
            ".a { sprite-prop: el(x) background; }\n.b { sprite-prop: el(y) background; }",
            None,
        )
        .expect("should parse");
        let mut merger = RuleMerger::new();
        for node in directives(&sheet) {
            merger.defer(&sheet, background(node, false)).expect("should defer");
        }

        assert_eq!(merger.merge(&mut sheet), 1);
        assert!(directives(&sheet).is_empty());

        let first = sheet.children(sheet.root())[0];
        assert_eq!(sheet.selector(first).as_deref(), Some(".a, .b"));
        let props: Vec<_> = sheet
            .children(first)
            .iter()
            .filter_map(|c| sheet.declaration(*c))
            .map(|d| d.prop.as_str())
            .collect();
        assert_eq!(props, vec!["background-image", "background-repeat"]);
    }

    #[test]
    fn test_density_splits_groups() {
        let mut sheet = parse(
            ".a { sprite-prop: el(x) background; }\n.b { sprite-prop: el(y) background normal; }",
            None,
        )
        .expect("should parse");
        let nodes = directives(&sheet);
        let mut merger = RuleMerger::new();
        merger.defer(&sheet, background(nodes[0], false)).expect("should defer");
        merger.defer(&sheet, background(nodes[1], true)).expect("should defer");

        assert_eq!(merger.merge(&mut sheet), 2);
        let children = sheet.children(sheet.root()).to_vec();
        assert_eq!(sheet.selector(children[0]).as_deref(), Some(".a"));
        assert_eq!(sheet.selector(children[1]).as_deref(), Some(".b"));
    }

    #[test]
    fn test_media_context_is_wrapped_and_prepended() {
        let css = ".a { sprite-prop: el(x) background; }\n\
                   @media (min-width: 10px) { .b { sprite-prop: el(x) background; } }\n\
                   @media print { .c { color: red; } }";
        let mut sheet = parse(css, None).expect("should parse");
        let mut merger = RuleMerger::new();
        for node in directives(&sheet) {
            merger.defer(&sheet, background(node, false)).expect("should defer");
        }

        assert_eq!(merger.merge(&mut sheet), 2);
        let children = sheet.children(sheet.root()).to_vec();
        assert_eq!(sheet.selector(children[0]).as_deref(), Some(".a"));
        match sheet.kind(children[1]) {
            crate::stylesheet::NodeKind::AtRule { name, params, .. } => {
                assert_eq!(name, "media");
                assert_eq!(params, "(min-width: 10px)");
            }
            other => panic!("expected media wrapper, got {:?}", other),
        }
        let inner = sheet.children(children[1])[0];
        assert_eq!(sheet.selector(inner).as_deref(), Some(".b"));

        let output = sheet.to_css();
        let merged = output.find(".a {").expect("merged rule");
        assert!(merged < output.find("@media print").expect("print block"));
    }

    #[test]
    fn test_duplicate_selectors_listed_once() {
        let mut sheet = parse(
            ".a { sprite-prop: el(x) background; }\n.a:hover, .b { sprite-prop: el(y) background; }\n.a { sprite-prop: el(z) background; }",
            None,
        )
        .expect("should parse");
        let mut merger = RuleMerger::new();
        for node in directives(&sheet) {
            merger.defer(&sheet, background(node, false)).expect("should defer");
        }
        merger.merge(&mut sheet);

        let first = sheet.children(sheet.root())[0];
        assert_eq!(sheet.selector(first).as_deref(), Some(".a, .a:hover, .b"));
    }

    #[test]
    fn test_directive_outside_rule_is_rejected() {
        for css in [
            "sprite-prop: el(x) background;",
            "@media print {\n  sprite-prop: el(x) background;\n}",
        ] {
            let sheet = parse(css, None).expect("should parse");
            let node = directives(&sheet)[0];
            let mut merger = RuleMerger::new();
            match merger.defer(&sheet, background(node, false)) {
                Err(SpriteError::OutsideRule { location }) => {
                    assert_eq!(location, sheet.location(node));
                    assert!(location.is_some());
                }
                other => panic!("expected outside-rule error for {:?}, got {:?}", css, other),
            }
            assert!(merger.is_empty());
        }
    }

    #[test]
    fn test_context_ids_follow_first_visit() {
        let sheet = parse(
            "@media a { .x { sprite-prop: el(x) background; } }\n.y { sprite-prop: el(y) background; }",
            None,
        )
        .expect("should parse");
        let nodes = directives(&sheet);
        let mut merger = RuleMerger::new();
        merger.defer(&sheet, background(nodes[0], false)).expect("should defer");
        merger.defer(&sheet, background(nodes[1], false)).expect("should defer");
        assert_eq!(merger.entries[0].context, Some(ContextId(0)));
        assert_eq!(merger.entries[1].context, Some(ContextId(1)));
    }
}
