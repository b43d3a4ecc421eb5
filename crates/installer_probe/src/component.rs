use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ProbeError;

/// Index of a [`ComponentNode`] inside a [`ComponentTree`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

/// Index of a [`SubGroupNode`] inside a [`ComponentTree`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubGroupId(usize);

/// Index of a [`GroupNode`] inside a [`ComponentTree`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

/// A single installable unit of a mod.
#[derive(Debug, Clone)]
pub struct ComponentNode {
    /// Position in the installer's flat JSON listing.
    pub index: u32,
    /// The mod-unique numeric identifier (`number` in the installer's JSON).
    pub id: u32,
    pub name: String,
    pub forced: bool,
    pub labels: Vec<String>,
    pub metadata: Vec<String>,
    pub group_refs: Vec<GroupId>,
    pub subgroup: Option<SubGroupId>,
}

/// A multiple-choice wrapper over a set of components; at most one of
/// `children` may be installed.
#[derive(Debug, Clone)]
pub struct SubGroupNode {
    pub name: String,
    pub children: Vec<ComponentId>,
}

/// A flat tag attached to zero or more components.
#[derive(Debug, Clone)]
pub struct GroupNode {
    pub name: String,
}

/// A direct child of the tree's root: either a bare component or a subgroup
/// wrapping several components.
#[derive(Debug, Clone, Copy)]
pub enum RootChild {
    Component(ComponentId),
    SubGroup(SubGroupId),
}

/// The parsed component tree for one mod/language pair.
///
/// Modeled as an arena rather than an owning tree: components hold
/// back-references to their subgroup and groups as small integer IDs, and
/// the root holds forward references to both, so the graph (components can
/// be reached from both their subgroup and their tagging groups) never needs
/// `Rc`/`RefCell` cycles.
#[derive(Debug, Clone)]
pub struct ComponentTree {
    mod_name: String,
    components: Vec<ComponentNode>,
    subgroups: Vec<SubGroupNode>,
    groups: Vec<GroupNode>,
    root_children: Vec<RootChild>,
}

impl ComponentTree {
    pub fn mod_name(&self) -> &str {
        &self.mod_name
    }

    pub fn root_children(&self) -> &[RootChild] {
        &self.root_children
    }

    pub fn component(&self, id: ComponentId) -> &ComponentNode {
        &self.components[id.0]
    }

    pub fn subgroup(&self, id: SubGroupId) -> &SubGroupNode {
        &self.subgroups[id.0]
    }

    pub fn group(&self, id: GroupId) -> &GroupNode {
        &self.groups[id.0]
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &str)> {
        self.groups
            .iter()
            .enumerate()
            .map(|(i, g)| (GroupId(i), g.name.as_str()))
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &ComponentNode)> {
        self.components
            .iter()
            .enumerate()
            .map(|(i, c)| (ComponentId(i), c))
    }
}

/// One element of the installer's `--list-components-json` array, exactly as
/// the installer emits it.
#[derive(Debug, Deserialize)]
struct RawComponent {
    index: u32,
    number: u32,
    name: String,
    forced: bool,
    #[serde(default)]
    subgroup: Option<String>,
    #[serde(default)]
    group: Vec<String>,
    #[serde(default)]
    label: Vec<String>,
    #[serde(default)]
    metadata: Vec<String>,
}

/// Parses the installer's `[{"index":...}]` JSON array into a [`ComponentTree`].
///
/// Components sharing a non-empty `subgroup` name become siblings under one
/// `SubGroup` root child, in the order they first appear. A `group` name is a
/// flat tag collected into the root's group list, not a tree parent. A
/// component with no subgroup (absent or empty string) attaches directly
/// under the root.
pub fn build_component_tree(mod_name: &str, json: &str) -> Result<ComponentTree, ProbeError> {
    let raw: Vec<RawComponent> = serde_json::from_str(json).map_err(ProbeError::ComponentJson)?;

    let mut tree = ComponentTree {
        mod_name: mod_name.to_string(),
        components: Vec::with_capacity(raw.len()),
        subgroups: Vec::new(),
        groups: Vec::new(),
        root_children: Vec::new(),
    };
    let mut group_index: HashMap<String, GroupId> = HashMap::new();
    let mut subgroup_index: HashMap<String, SubGroupId> = HashMap::new();
    let mut seen_numbers: HashMap<u32, ()> = HashMap::new();

    for item in raw {
        if seen_numbers.insert(item.number, ()).is_some() {
            return Err(ProbeError::DuplicateComponentId(item.number));
        }

        let group_refs = item
            .group
            .iter()
            .map(|name| {
                *group_index.entry(name.clone()).or_insert_with(|| {
                    let id = GroupId(tree.groups.len());
                    tree.groups.push(GroupNode { name: name.clone() });
                    id
                })
            })
            .collect();

        let subgroup_name = item.subgroup.filter(|s| !s.is_empty());
        let component_id = ComponentId(tree.components.len());

        let subgroup_id = subgroup_name.as_ref().map(|name| {
            if let Some(&id) = subgroup_index.get(name) {
                id
            } else {
                let id = SubGroupId(tree.subgroups.len());
                tree.subgroups.push(SubGroupNode {
                    name: name.clone(),
                    children: Vec::new(),
                });
                subgroup_index.insert(name.clone(), id);
                tree.root_children.push(RootChild::SubGroup(id));
                id
            }
        });

        tree.components.push(ComponentNode {
            index: item.index,
            id: item.number,
            name: item.name,
            forced: item.forced,
            labels: item.label,
            metadata: item.metadata,
            group_refs,
            subgroup: subgroup_id,
        });

        match subgroup_id {
            Some(id) => tree.subgroups[id.0].children.push(component_id),
            None => tree.root_children.push(RootChild::Component(component_id)),
        }
    }

    Ok(tree)
}
