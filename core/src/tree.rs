//! `TreeModel` — the N-ary aggregation tree behind each of a combat's four
//! per-direction trees (damage-out, damage-in, heal-out, heal-in; spec.md
//! §4.5).
//!
//! Grounded in the design note in spec.md §9: represented as a flat arena of
//! nodes addressed by integer index rather than parent/child back-references,
//! since Rust has no cheap equivalent of Python's reference-cycle tree. Each
//! node's payload is a tagged variant (label-only vs. a leaf row); the
//! roll-up pass mutates a label payload into an aggregate row payload in
//! place, which is why the payload is modeled as an enum rather than an
//! `Option<Row>` bolted onto a fixed struct.

use crate::error::TreeError;
use crate::rows::{DamageTableRow, HealTableRow};
use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum NodePayload {
    /// Root / "Player" / "NPC" header nodes; never carry a row.
    Header(String),
    /// Actor, pet-group, pet, ability, target, or source-actor label before
    /// roll-up has produced an aggregate for it.
    Label(String),
    Damage(DamageTableRow),
    Heal(HealTableRow),
}

impl NodePayload {
    pub fn label(&self) -> &str {
        match self {
            NodePayload::Header(s) | NodePayload::Label(s) => s,
            NodePayload::Damage(r) => &r.name,
            NodePayload::Heal(r) => &r.name,
        }
    }

    pub fn as_damage(&self) -> Option<&DamageTableRow> {
        match self {
            NodePayload::Damage(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_heal(&self) -> Option<&HealTableRow> {
        match self {
            NodePayload::Heal(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub payload: NodePayload,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Per-bucket series; leaves accumulate directly, non-leaves sum
    /// children element-wise during roll-up (spec.md §4.5).
    pub graph_data: Vec<f64>,
    /// Set only on actor nodes (`add_actor`), so roll-up can carry the
    /// original id/handle into the aggregate row it produces in place —
    /// a `Label` payload otherwise has no field to hold them.
    actor_key: Option<(String, String)>,
}

/// Whether a `TreeModel` accumulates [`DamageTableRow`]s or [`HealTableRow`]s
/// at its leaves (spec.md §3: damage_out/damage_in use damage rows,
/// heal_out/heal_in use heal rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Damage,
    Heal,
}

/// Idempotent-by-key child index: tracks which parent a key was first
/// inserted under so a later insert under a different parent can be
/// rejected (spec.md §4.5 "DuplicateIdForDifferentParent").
#[derive(Debug, Default)]
struct ChildIndex {
    by_parent_key: HashMap<(NodeId, String), NodeId>,
    parent_of_key: HashMap<String, NodeId>,
}

impl ChildIndex {
    fn existing(&self, parent: NodeId, key: &str) -> Result<Option<NodeId>, TreeError> {
        if let Some(&node) = self.by_parent_key.get(&(parent, key.to_string())) {
            return Ok(Some(node));
        }
        if let Some(&prev_parent) = self.parent_of_key.get(key) {
            if prev_parent != parent {
                return Err(TreeError::DuplicateIdForDifferentParent);
            }
        }
        Ok(None)
    }

    fn insert(&mut self, parent: NodeId, key: &str, node: NodeId) {
        self.parent_of_key.insert(key.to_string(), parent);
        self.by_parent_key.insert((parent, key.to_string()), node);
    }
}

pub struct TreeModel {
    kind: RowKind,
    nodes: Vec<Node>,
    pub root: NodeId,
    pub player_root: NodeId,
    pub npc_root: NodeId,

    actor_index: ChildIndex,
    pet_group_index: ChildIndex,
    pet_index: ChildIndex,
    ability_index: ChildIndex,
    target_index: ChildIndex,
    source_actor_index: ChildIndex,
}

/// Resolves or inserts a label-only child of `parent`. Free function (not a
/// `&mut self` method) so callers can pass a disjoint `&mut ChildIndex` field
/// alongside `&mut Vec<Node>` without fighting the borrow checker.
fn get_or_insert_label(
    nodes: &mut Vec<Node>,
    index: &mut ChildIndex,
    parent: NodeId,
    key: &str,
    label: &str,
) -> Result<NodeId, TreeError> {
    if let Some(existing) = index.existing(parent, key)? {
        return Ok(existing);
    }
    let node = push(nodes, NodePayload::Label(label.to_string()), Some(parent));
    nodes[parent].children.push(node);
    index.insert(parent, key, node);
    Ok(node)
}

fn get_or_insert_leaf(
    nodes: &mut Vec<Node>,
    index: &mut ChildIndex,
    parent: NodeId,
    key: &str,
    name: &str,
    handle: &str,
    kind: RowKind,
) -> Result<NodeId, TreeError> {
    if let Some(existing) = index.existing(parent, key)? {
        return Ok(existing);
    }
    let payload = match kind {
        RowKind::Damage => NodePayload::Damage(DamageTableRow::new(name, handle, key)),
        RowKind::Heal => NodePayload::Heal(HealTableRow::new(name, handle, key)),
    };
    let node = push(nodes, payload, Some(parent));
    nodes[parent].children.push(node);
    index.insert(parent, key, node);
    Ok(node)
}

impl TreeModel {
    pub fn new(kind: RowKind) -> Self {
        let mut nodes = Vec::new();
        let root = push(&mut nodes, NodePayload::Header("Combat".to_string()), None);
        let player_root = push(&mut nodes, NodePayload::Header("Player".to_string()), Some(root));
        let npc_root = push(&mut nodes, NodePayload::Header("NPC".to_string()), Some(root));
        nodes[root].children = vec![player_root, npc_root];

        TreeModel {
            kind,
            nodes,
            root,
            player_root,
            npc_root,
            actor_index: ChildIndex::default(),
            pet_group_index: ChildIndex::default(),
            pet_index: ChildIndex::default(),
            ability_index: ChildIndex::default(),
            target_index: ChildIndex::default(),
            source_actor_index: ChildIndex::default(),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn root_for(&self, is_player: bool) -> NodeId {
        if is_player {
            self.player_root
        } else {
            self.npc_root
        }
    }

    /// Resolves or inserts the top-level actor/target node for `id`
    /// (spec.md §4.5 "add_actor").
    pub fn add_actor(&mut self, id: &str, name: &str, is_player: bool) -> Result<NodeId, TreeError> {
        let parent = self.root_for(is_player);
        let node = get_or_insert_label(&mut self.nodes, &mut self.actor_index, parent, id, name)?;
        let handle = crate::line::player_handle(id).unwrap_or("").to_string();
        self.nodes[node].actor_key = Some((id.to_string(), handle));
        Ok(node)
    }

    pub fn add_pet_group(&mut self, actor: NodeId, name: &str) -> Result<NodeId, TreeError> {
        get_or_insert_label(&mut self.nodes, &mut self.pet_group_index, actor, name, name)
    }

    pub fn add_pet(&mut self, pet_group: NodeId, name: &str) -> Result<NodeId, TreeError> {
        get_or_insert_label(&mut self.nodes, &mut self.pet_index, pet_group, name, name)
    }

    pub fn add_ability(&mut self, parent: NodeId, name: &str) -> Result<NodeId, TreeError> {
        get_or_insert_label(&mut self.nodes, &mut self.ability_index, parent, name, name)
    }

    /// Inserts the leaf target node under `ability` and returns it, creating
    /// an empty [`DamageTableRow`]/[`HealTableRow`] on first insert per
    /// `self.kind` (spec.md §4.5 "add_target").
    pub fn add_target(&mut self, ability: NodeId, id: &str, name: &str, handle: &str) -> Result<NodeId, TreeError> {
        get_or_insert_leaf(&mut self.nodes, &mut self.target_index, ability, id, name, handle, self.kind)
    }

    pub fn add_source_actor(&mut self, target: NodeId, id: &str, name: &str) -> Result<NodeId, TreeError> {
        get_or_insert_label(&mut self.nodes, &mut self.source_actor_index, target, id, name)
    }

    /// Inserts the leaf source-ability node under `source_actor`
    /// (spec.md §4.5 "add_source_ability").
    pub fn add_source_ability(&mut self, source_actor: NodeId, name: &str, handle: &str) -> Result<NodeId, TreeError> {
        get_or_insert_leaf(&mut self.nodes, &mut self.ability_index, source_actor, name, name, handle, self.kind)
    }

    pub fn mutate(&mut self, id: NodeId, f: impl FnOnce(&mut NodePayload)) {
        f(&mut self.nodes[id].payload);
    }

    pub fn graph_data_mut(&mut self, id: NodeId) -> &mut Vec<f64> {
        &mut self.nodes[id].graph_data
    }

    /// Bottom-up roll-up: for every non-leaf node, sums children's rows into
    /// a fresh aggregate row and mutates the node's payload variant from
    /// `Label` to `Damage`/`Heal` in place (spec.md §4.5, §4.6, §8 roll-up
    /// invariant).
    pub fn roll_up(&mut self) {
        let order = self.post_order(self.root);
        for id in order {
            if self.nodes[id].children.is_empty() {
                continue;
            }
            let (key, handle) = self.nodes[id].actor_key.clone().unwrap_or_default();
            match self.kind {
                RowKind::Damage => {
                    let mut agg = DamageTableRow::new(self.nodes[id].payload.label(), &handle, &key);
                    for &child in &self.nodes[id].children.clone() {
                        if let Some(row) = self.nodes[child].payload.as_damage() {
                            agg.merge_child(row);
                        }
                    }
                    agg.recompute_combat_time();
                    agg.derive_ratios();
                    self.nodes[id].payload = NodePayload::Damage(agg);
                    self.rollup_graph_data(id);
                }
                RowKind::Heal => {
                    let mut agg = HealTableRow::new(self.nodes[id].payload.label(), &handle, &key);
                    for &child in &self.nodes[id].children.clone() {
                        if let Some(row) = self.nodes[child].payload.as_heal() {
                            agg.merge_child(row);
                        }
                    }
                    agg.recompute_combat_time();
                    agg.derive_ratios();
                    self.nodes[id].payload = NodePayload::Heal(agg);
                    self.rollup_graph_data(id);
                }
            }
        }
    }

    fn rollup_graph_data(&mut self, id: NodeId) {
        let children = self.nodes[id].children.clone();
        let width = children.iter().map(|&c| self.nodes[c].graph_data.len()).max().unwrap_or(0);
        let mut sum = vec![0.0; width];
        for &child in &children {
            for (i, v) in self.nodes[child].graph_data.iter().enumerate() {
                sum[i] += v;
            }
        }
        self.nodes[id].graph_data = sum;
    }

    /// Derives ratios on every leaf row, then rolls those absolutes up
    /// through the tree (spec.md §4.6 "After the pass"). Call once per tree
    /// after all lines have been accumulated and (for damage_out) after
    /// [`TreeModel::collapse_single_pet_groups`].
    pub fn finalize(&mut self) {
        for id in 0..self.nodes.len() {
            if !self.nodes[id].children.is_empty() {
                continue;
            }
            match &mut self.nodes[id].payload {
                NodePayload::Damage(row) => {
                    row.recompute_combat_time();
                    row.derive_ratios();
                }
                NodePayload::Heal(row) => {
                    row.recompute_combat_time();
                    row.derive_ratios();
                }
                _ => {}
            }
        }
        self.roll_up();
    }

    /// Single-pet collapse (spec.md §4.6): within each player's outgoing
    /// subtree, a pet-group whose every pet has exactly one, identically
    /// named ability is rewritten so the pet-group's children become the
    /// pets directly (the ability layer is removed) and the group is
    /// relabeled `"<group> – <ability>"` (or just `<group>` when the ability
    /// name already matches the group name). Purely structural; must run
    /// before [`TreeModel::finalize`].
    pub fn collapse_single_pet_groups(&mut self) {
        let player_actors = self.nodes[self.player_root].children.clone();
        for actor in player_actors {
            let candidates = self.nodes[actor].children.clone();
            for pet_group in candidates {
                let pets = self.nodes[pet_group].children.clone();
                let is_pet_group = !pets.is_empty()
                    && pets.iter().all(|&pet| {
                        !self.nodes[pet].children.is_empty()
                            && self.nodes[pet]
                                .children
                                .iter()
                                .all(|&ab| matches!(self.nodes[ab].payload, NodePayload::Label(_)))
                    });
                if !is_pet_group {
                    continue;
                }
                if !pets.iter().all(|&pet| self.nodes[pet].children.len() == 1) {
                    continue;
                }
                let ability_names: Vec<String> = pets
                    .iter()
                    .map(|&pet| self.nodes[self.nodes[pet].children[0]].payload.label().to_string())
                    .collect();
                if ability_names.windows(2).any(|w| w[0] != w[1]) {
                    continue;
                }
                let ability_name = ability_names[0].clone();
                let group_name = self.nodes[pet_group].payload.label().to_string();
                let new_label = if ability_name == group_name {
                    group_name
                } else {
                    format!("{group_name} \u{2013} {ability_name}")
                };

                for &pet in &pets {
                    let ability_node = self.nodes[pet].children[0];
                    let targets = self.nodes[ability_node].children.clone();
                    for &t in &targets {
                        self.nodes[t].parent = Some(pet);
                    }
                    self.nodes[pet].children = targets;
                    self.nodes[pet].graph_data = self.nodes[ability_node].graph_data.clone();
                }
                self.nodes[pet_group].payload = NodePayload::Label(new_label);
            }
        }
    }

    fn post_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.post_order_into(from, &mut out);
        out
    }

    fn post_order_into(&self, node: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[node].children.clone() {
            self.post_order_into(child, out);
        }
        out.push(node);
    }
}

fn push(nodes: &mut Vec<Node>, payload: NodePayload, parent: Option<NodeId>) -> NodeId {
    nodes.push(Node {
        payload,
        parent,
        children: Vec::new(),
        graph_data: Vec::new(),
        actor_key: None,
    });
    nodes.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_actor_is_idempotent() {
        let mut tree = TreeModel::new(RowKind::Damage);
        let a1 = tree.add_actor("P[1@2@@Kirk]", "Kirk", true).unwrap();
        let a2 = tree.add_actor("P[1@2@@Kirk]", "Kirk", true).unwrap();
        assert_eq!(a1, a2);
    }

    #[test]
    fn duplicate_id_under_different_parent_errors() {
        let mut tree = TreeModel::new(RowKind::Damage);
        let actor = tree.add_actor("P[1@2@@Kirk]", "Kirk", true).unwrap();
        let ability = tree.add_ability(actor, "Torpedo").unwrap();
        tree.add_target(ability, "C[1 Borg]", "Borg", "").unwrap();

        let other_ability = tree.add_ability(actor, "Phaser").unwrap();
        let err = tree.add_target(other_ability, "C[1 Borg]", "Borg", "");
        assert_eq!(err, Err(TreeError::DuplicateIdForDifferentParent));
    }

    #[test]
    fn roll_up_sums_leaf_rows_into_parents() {
        let mut tree = TreeModel::new(RowKind::Damage);
        let actor = tree.add_actor("P[1@2@@Kirk]", "Kirk", true).unwrap();
        let ability = tree.add_ability(actor, "Torpedo").unwrap();
        let target = tree.add_target(ability, "C[1 Borg]", "Borg", "").unwrap();
        tree.mutate(target, |p| {
            if let NodePayload::Damage(row) = p {
                row.total_damage = 100.0;
                row.max_one_hit = 100.0;
            }
        });

        tree.roll_up();
        let ability_row = tree.node(ability).payload.as_damage().unwrap();
        assert_eq!(ability_row.total_damage, 100.0);
        let actor_row = tree.node(actor).payload.as_damage().unwrap();
        assert_eq!(actor_row.total_damage, 100.0);
    }

    /// Roll-up must keep the actor's original id/handle on its aggregate row
    /// (not blank it out), or two players collapse onto the same `id` once
    /// rolled up and cross-tree correlation in `build_overview` breaks.
    #[test]
    fn roll_up_preserves_actor_id_and_handle() {
        let mut tree = TreeModel::new(RowKind::Damage);
        let kirk = tree.add_actor("P[1@2@@Kirk]", "Kirk", true).unwrap();
        let spock = tree.add_actor("P[3@4@@Spock]", "Spock", true).unwrap();
        tree.add_ability(kirk, "Torpedo").unwrap();
        tree.add_ability(spock, "Phaser").unwrap();

        tree.roll_up();
        let kirk_row = tree.node(kirk).payload.as_damage().unwrap();
        let spock_row = tree.node(spock).payload.as_damage().unwrap();
        assert_eq!(kirk_row.id, "P[1@2@@Kirk]");
        assert_eq!(kirk_row.handle, "@Kirk");
        assert_eq!(spock_row.id, "P[3@4@@Spock]");
        assert_eq!(spock_row.handle, "@Spock");
    }

    #[test]
    fn single_pet_collapse_removes_ability_layer_when_uniform() {
        let mut tree = TreeModel::new(RowKind::Damage);
        let actor = tree.add_actor("P[1@2@@Kirk]", "Kirk", true).unwrap();
        let group = tree.add_pet_group(actor, "Torpedo Turret").unwrap();
        let pet_a = tree.add_pet(group, "Torpedo Turret 1").unwrap();
        let pet_b = tree.add_pet(group, "Torpedo Turret 2").unwrap();
        let ability_a = tree.add_ability(pet_a, "Torpedo Turret").unwrap();
        let ability_b = tree.add_ability(pet_b, "Torpedo Turret").unwrap();
        tree.add_target(ability_a, "C[1 Borg]", "Borg", "").unwrap();
        tree.add_target(ability_b, "C[1 Borg]", "Borg", "").unwrap();

        tree.collapse_single_pet_groups();

        assert_eq!(tree.node(group).payload.label(), "Torpedo Turret");
        assert_eq!(tree.node(pet_a).children.len(), 1);
        assert!(matches!(tree.node(tree.node(pet_a).children[0]).payload, NodePayload::Damage(_)));
    }
}
