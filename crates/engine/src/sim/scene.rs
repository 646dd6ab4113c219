use std::cmp::Ordering;
use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

/// Draw-layer tag; only used to bias draw order, never for simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DrawLayer {
    Ground,
    #[default]
    Base,
    Floor,
    Hud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy)]
pub struct NodeSpec {
    pub position: Vec2,
    pub layer: DrawLayer,
    pub solid: bool,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            position: Vec2::default(),
            layer: DrawLayer::Base,
            solid: false,
        }
    }
}

impl NodeSpec {
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_layer(mut self, layer: DrawLayer) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_solid(mut self, solid: bool) -> Self {
        self.solid = solid;
        self
    }
}

#[derive(Debug)]
pub struct SceneNode {
    id: EntityId,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    position: Vec2,
    layer: DrawLayer,
    solid: bool,
    ready_fired: bool,
}

impl SceneNode {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn layer(&self) -> DrawLayer {
        self.layer
    }

    pub fn solid(&self) -> bool {
        self.solid
    }

    pub fn ready_fired(&self) -> bool {
        self.ready_fired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("parent entity {0:?} does not exist")]
    MissingParent(EntityId),
    #[error("entity {0:?} does not exist")]
    MissingNode(EntityId),
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    AttachCycle { parent: EntityId, child: EntityId },
}

/// Receives draw calls in final draw order; rendering itself is external.
pub trait DrawSink {
    fn draw_entity(&mut self, id: EntityId, layer: DrawLayer, absolute: Vec2);
}

/// Sink that records what would have been drawn, for headless runs and tests.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub drawn: Vec<(EntityId, DrawLayer, Vec2)>,
}

impl DrawSink for CountingSink {
    fn draw_entity(&mut self, id: EntityId, layer: DrawLayer, absolute: Vec2) {
        self.drawn.push((id, layer, absolute));
    }
}

/// Tree of simulation entities. The graph owns every node exclusively;
/// children hold the non-owning back-reference through `parent`.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: HashMap<EntityId, SceneNode>,
    root: EntityId,
    next_id: u64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            root: EntityId(0),
            next_id: 0,
        };
        graph.root = graph.insert_root();
        graph
    }

    fn insert_root(&mut self) -> EntityId {
        let id = self.allocate_id();
        self.nodes.insert(
            id,
            SceneNode {
                id,
                parent: None,
                children: Vec::new(),
                position: Vec2::default(),
                layer: DrawLayer::Base,
                solid: false,
                ready_fired: true,
            },
        );
        id
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: EntityId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: EntityId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    /// Constructs a node and attaches it under `parent` in one step.
    pub fn attach_new(&mut self, parent: EntityId, spec: NodeSpec) -> Result<EntityId, SceneError> {
        if !self.nodes.contains_key(&parent) {
            return Err(SceneError::MissingParent(parent));
        }
        let id = self.allocate_id();
        self.nodes.insert(
            id,
            SceneNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                position: spec.position,
                layer: spec.layer,
                solid: spec.solid,
                ready_fired: false,
            },
        );
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        Ok(id)
    }

    /// Sets the back-reference and appends `child` to `parent`'s child list,
    /// detaching it from its previous parent first.
    pub fn attach(&mut self, parent: EntityId, child: EntityId) -> Result<(), SceneError> {
        if !self.nodes.contains_key(&parent) {
            return Err(SceneError::MissingParent(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(SceneError::MissingNode(child));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(SceneError::AttachCycle { parent, child });
        }

        if let Some(previous) = self.nodes.get(&child).and_then(|node| node.parent) {
            if let Some(previous_node) = self.nodes.get_mut(&previous) {
                previous_node.children.retain(|entry| *entry != child);
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
        }
        Ok(())
    }

    fn is_ancestor(&self, candidate: EntityId, of: EntityId) -> bool {
        let mut cursor = self.nodes.get(&of).and_then(|node| node.parent);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        false
    }

    /// Detaches `child` from `parent` by identity. The subtree stays alive
    /// and can be re-attached; it is simply no longer reachable from the
    /// root until then.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        let is_child = self
            .nodes
            .get(&child)
            .is_some_and(|node| node.parent == Some(parent));
        if !is_child {
            return false;
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|entry| *entry != child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = None;
        }
        true
    }

    /// Depth-first destruction: children are destroyed before the node
    /// detaches from its parent. Returns every destroyed id exactly once, in
    /// destruction order, so the caller can cascade subscription removal.
    /// Destroying the root resets the graph to a fresh empty root.
    pub fn destroy(&mut self, id: EntityId) -> Vec<EntityId> {
        if !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        let mut destroyed = Vec::new();
        self.destroy_subtree(id, &mut destroyed);
        if id == self.root {
            self.root = self.insert_root();
        }
        destroyed
    }

    fn destroy_subtree(&mut self, id: EntityId, destroyed: &mut Vec<EntityId>) {
        // Destruction removes entries from the live child list mid-traversal;
        // iterate a defensive copy or children get skipped.
        let children = match self.nodes.get(&id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.destroy_subtree(child, destroyed);
        }
        if let Some(parent) = self.nodes.get(&id).and_then(|node| node.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|entry| *entry != id);
            }
        }
        self.nodes.remove(&id);
        destroyed.push(id);
    }

    /// One-shot ready marker: returns true only on the call that fires it.
    pub fn fire_ready(&mut self, id: EntityId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if !node.ready_fired => {
                node.ready_fired = true;
                true
            }
            _ => false,
        }
    }

    /// Pre-order traversal snapshot: parents before children, siblings in
    /// attachment order. Entities spawned during a step run on the next one.
    pub fn step_order(&self) -> Vec<EntityId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        self.collect_step_order(self.root, &mut order);
        order
    }

    fn collect_step_order(&self, id: EntityId, order: &mut Vec<EntityId>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        order.push(id);
        for child in &node.children {
            self.collect_step_order(*child, order);
        }
    }

    /// Absolute position = parent offset + local position, composed up to
    /// the root.
    pub fn absolute_position(&self, id: EntityId) -> Option<Vec2> {
        let mut node = self.nodes.get(&id)?;
        let mut absolute = node.position;
        while let Some(parent) = node.parent {
            node = self.nodes.get(&parent)?;
            absolute = node.position.offset(absolute);
        }
        Some(absolute)
    }

    /// Draws each node at its absolute position, then recurses into children
    /// ordered floor-first, then by ascending vertical coordinate. This
    /// approximates depth in a top-down world without a real z-buffer.
    pub fn draw(&self, sink: &mut dyn DrawSink) {
        self.draw_node(self.root, Vec2::default(), sink);
    }

    fn draw_node(&self, id: EntityId, offset: Vec2, sink: &mut dyn DrawSink) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let absolute = offset.offset(node.position);
        sink.draw_entity(id, node.layer, absolute);

        let mut order: Vec<(EntityId, DrawLayer, f32)> = node
            .children
            .iter()
            .filter_map(|child| {
                self.nodes
                    .get(child)
                    .map(|child_node| (*child, child_node.layer, absolute.y + child_node.position.y))
            })
            .collect();
        order.sort_by(|a, b| compare_draw((a.1, a.2), (b.1, b.2)));
        for (child, _, _) in order {
            self.draw_node(child, absolute, sink);
        }
    }
}

fn compare_draw(a: (DrawLayer, f32), b: (DrawLayer, f32)) -> Ordering {
    let a_floor = a.0 == DrawLayer::Floor;
    let b_floor = b.0 == DrawLayer::Floor;
    match (a_floor, b_floor) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.1.total_cmp(&b.1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_at(x: f32, y: f32) -> NodeSpec {
        NodeSpec::default().with_position(Vec2::new(x, y))
    }

    #[test]
    fn attach_new_appends_child_and_sets_back_reference() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let child = scene.attach_new(root, spec_at(1.0, 2.0)).expect("child");

        assert_eq!(scene.node(root).expect("root").children(), &[child]);
        assert_eq!(scene.node(child).expect("child").parent(), Some(root));
    }

    #[test]
    fn attach_new_rejects_missing_parent() {
        let mut scene = SceneGraph::new();
        let missing = EntityId(999);
        assert_eq!(
            scene.attach_new(missing, NodeSpec::default()),
            Err(SceneError::MissingParent(missing))
        );
    }

    #[test]
    fn entity_ids_are_never_reused() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let first = scene.attach_new(root, NodeSpec::default()).expect("first");
        scene.destroy(first);
        let second = scene.attach_new(root, NodeSpec::default()).expect("second");
        assert_ne!(first, second);
    }

    #[test]
    fn attach_moves_child_between_parents() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let a = scene.attach_new(root, NodeSpec::default()).expect("a");
        let b = scene.attach_new(root, NodeSpec::default()).expect("b");
        let child = scene.attach_new(a, NodeSpec::default()).expect("child");

        scene.attach(b, child).expect("reattach");

        assert!(scene.node(a).expect("a").children().is_empty());
        assert_eq!(scene.node(b).expect("b").children(), &[child]);
        assert_eq!(scene.node(child).expect("child").parent(), Some(b));
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let parent = scene.attach_new(root, NodeSpec::default()).expect("parent");
        let child = scene.attach_new(parent, NodeSpec::default()).expect("child");

        assert_eq!(
            scene.attach(child, parent),
            Err(SceneError::AttachCycle {
                parent: child,
                child: parent
            })
        );
        assert_eq!(
            scene.attach(parent, parent),
            Err(SceneError::AttachCycle { parent, child: parent })
        );
    }

    #[test]
    fn remove_child_detaches_by_identity() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let child = scene.attach_new(root, NodeSpec::default()).expect("child");

        assert!(scene.remove_child(root, child));
        assert!(scene.node(root).expect("root").children().is_empty());
        assert_eq!(scene.node(child).expect("child").parent(), None);

        // Detaching again is a no-op.
        assert!(!scene.remove_child(root, child));
    }

    #[test]
    fn destroy_cascades_depth_first_exactly_once() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let parent = scene.attach_new(root, NodeSpec::default()).expect("parent");
        let child_a = scene.attach_new(parent, NodeSpec::default()).expect("a");
        let child_b = scene.attach_new(parent, NodeSpec::default()).expect("b");
        let grandchild = scene.attach_new(child_a, NodeSpec::default()).expect("gc");

        let destroyed = scene.destroy(parent);

        assert_eq!(destroyed, vec![grandchild, child_a, child_b, parent]);
        for id in [parent, child_a, child_b, grandchild] {
            assert!(!scene.contains(id));
        }
        assert!(scene.node(root).expect("root").children().is_empty());
    }

    #[test]
    fn destroy_missing_node_is_a_silent_no_op() {
        let mut scene = SceneGraph::new();
        assert!(scene.destroy(EntityId(42)).is_empty());
    }

    #[test]
    fn destroy_root_resets_to_fresh_empty_root() {
        let mut scene = SceneGraph::new();
        let old_root = scene.root();
        scene.attach_new(old_root, NodeSpec::default()).expect("child");

        let destroyed = scene.destroy(old_root);

        assert_eq!(destroyed.len(), 2);
        assert_ne!(scene.root(), old_root);
        assert_eq!(scene.len(), 1);
        assert!(scene.node(scene.root()).expect("root").children().is_empty());
    }

    #[test]
    fn fire_ready_is_one_shot() {
        let mut scene = SceneGraph::new();
        let child = scene
            .attach_new(scene.root(), NodeSpec::default())
            .expect("child");

        assert!(scene.fire_ready(child));
        assert!(!scene.fire_ready(child));
        assert!(!scene.fire_ready(EntityId(77)));
    }

    #[test]
    fn step_order_is_pre_order_with_siblings_in_attachment_order() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let a = scene.attach_new(root, NodeSpec::default()).expect("a");
        let b = scene.attach_new(root, NodeSpec::default()).expect("b");
        let a_child = scene.attach_new(a, NodeSpec::default()).expect("a_child");

        assert_eq!(scene.step_order(), vec![root, a, a_child, b]);
    }

    #[test]
    fn absolute_position_composes_parent_offsets() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let parent = scene.attach_new(root, spec_at(2.0, 3.0)).expect("parent");
        let child = scene.attach_new(parent, spec_at(-1.0, 4.0)).expect("child");

        assert_eq!(scene.absolute_position(child), Some(Vec2::new(1.0, 7.0)));
        assert_eq!(scene.absolute_position(EntityId(99)), None);
    }

    #[test]
    fn draw_renders_floor_children_before_everything_else() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let high = scene
            .attach_new(root, spec_at(0.0, -5.0))
            .expect("high");
        let floor = scene
            .attach_new(
                root,
                spec_at(0.0, 9.0).with_layer(DrawLayer::Floor),
            )
            .expect("floor");
        let low = scene.attach_new(root, spec_at(0.0, 3.0)).expect("low");

        let mut sink = CountingSink::default();
        scene.draw(&mut sink);

        let order: Vec<EntityId> = sink.drawn.iter().map(|entry| entry.0).collect();
        assert_eq!(order, vec![root, floor, high, low]);
    }

    #[test]
    fn draw_orders_non_floor_children_by_ascending_vertical_coordinate() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let south = scene.attach_new(root, spec_at(1.0, 8.0)).expect("south");
        let north = scene.attach_new(root, spec_at(1.0, -2.0)).expect("north");
        let middle = scene.attach_new(root, spec_at(1.0, 3.0)).expect("middle");

        let mut sink = CountingSink::default();
        scene.draw(&mut sink);

        let order: Vec<EntityId> = sink.drawn.iter().map(|entry| entry.0).collect();
        assert_eq!(order, vec![root, north, middle, south]);
    }

    #[test]
    fn draw_reports_absolute_positions() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let parent = scene.attach_new(root, spec_at(10.0, 0.0)).expect("parent");
        let child = scene.attach_new(parent, spec_at(0.5, 0.5)).expect("child");

        let mut sink = CountingSink::default();
        scene.draw(&mut sink);

        let child_draw = sink
            .drawn
            .iter()
            .find(|entry| entry.0 == child)
            .expect("child drawn");
        assert_eq!(child_draw.2, Vec2::new(10.5, 0.5));
    }
}
