//! Dependency resolution over module specs.
//!
//! Builds a directed graph from declared dependencies, rejects modules with
//! missing dependencies or on a cycle (and everything downstream of them),
//! and orders the rest so every module follows its dependencies. Independent
//! modules are grouped into tiers that may be built in parallel.
//!
//! All iteration runs in [`ModuleId`] order, so the same spec set always
//! yields the same order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use relink_core::{ModuleId, ModuleSpec};

use crate::error::{CycleError, ReloadError};

/// Direct dependency edges for one reload cycle.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<ModuleId, Vec<ModuleId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of the given specs' declared dependencies.
    pub fn from_specs<'a>(specs: impl IntoIterator<Item = &'a ModuleSpec>) -> Self {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_module(spec.id().clone(), spec.dependencies().to_vec());
        }
        graph
    }

    /// Add or replace a module and its direct dependencies.
    pub fn add_module(&mut self, id: ModuleId, dependencies: Vec<ModuleId>) {
        self.edges.insert(id, dependencies);
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.edges.contains_key(id)
    }

    /// Direct dependencies of `id`, as declared.
    pub fn dependencies(&self, id: &ModuleId) -> &[ModuleId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules that directly depend on `id`.
    pub fn dependents(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(module, _)| module)
            .collect()
    }

    /// Every module that depends on any of `roots`, directly or not.
    /// Roots themselves are only included when they depend on another root.
    pub fn transitive_dependents<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a ModuleId>,
    ) -> BTreeSet<ModuleId> {
        let mut found = BTreeSet::new();
        let mut queue: Vec<&ModuleId> = roots.into_iter().collect();
        while let Some(current) = queue.pop() {
            for dependent in self.dependents(current) {
                if found.insert(dependent.clone()) {
                    queue.push(dependent);
                }
            }
        }
        found
    }

    /// All module ids in order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.edges.keys()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Outcome of resolving a [`DependencyGraph`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Buildable modules, dependencies first.
    pub order: Vec<ModuleId>,
    /// The same modules grouped by depth. Modules in one tier never depend
    /// on each other.
    pub tiers: Vec<Vec<ModuleId>>,
    /// Modules that cannot be built this cycle, with the reason.
    pub rejected: BTreeMap<ModuleId, ReloadError>,
}

impl Resolution {
    pub fn is_rejected(&self, id: &ModuleId) -> bool {
        self.rejected.contains_key(id)
    }

    /// Every distinct cycle found.
    pub fn cycles(&self) -> Vec<&CycleError> {
        let mut seen: Vec<&CycleError> = Vec::new();
        for error in self.rejected.values() {
            if let ReloadError::Cycle(cycle) = error {
                if !seen.contains(&cycle) {
                    seen.push(cycle);
                }
            }
        }
        seen
    }
}

/// Resolve build order for every module in `graph`.
///
/// Never fails as a whole: missing dependencies and cycles reject only the
/// modules involved and their dependents.
pub fn resolve(graph: &DependencyGraph) -> Resolution {
    let mut rejected: BTreeMap<ModuleId, ReloadError> = BTreeMap::new();

    for (module, deps) in &graph.edges {
        if let Some(missing) = sorted(deps).into_iter().find(|d| !graph.contains(d)) {
            rejected.insert(
                module.clone(),
                ReloadError::UnresolvedDependency {
                    module: module.clone(),
                    missing: missing.clone(),
                },
            );
        }
    }

    for cycle in find_cycles(graph) {
        for member in &cycle.members {
            rejected.insert(member.clone(), ReloadError::Cycle(cycle.clone()));
        }
    }

    propagate_rejections(graph, &mut rejected);

    let order = post_order(graph, &rejected);
    let tiers = tiers(graph, &order);
    Resolution {
        order,
        tiers,
        rejected,
    }
}

fn sorted(ids: &[ModuleId]) -> Vec<&ModuleId> {
    let mut ids: Vec<&ModuleId> = ids.iter().collect();
    ids.sort();
    ids
}

/// Strongly connected components by Tarjan's algorithm: the same
/// depth-first walk with a recursion stack, where a back edge pulls a node's
/// low-link down to an ancestor. Every component with more than one member,
/// or a self edge, is one cycle error naming the whole component.
fn find_cycles(graph: &DependencyGraph) -> Vec<CycleError> {
    let mut tarjan = Tarjan {
        graph,
        next_index: 0,
        index: BTreeMap::new(),
        low: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };
    for start in graph.modules() {
        if !tarjan.index.contains_key(start) {
            tarjan.visit(start);
        }
    }

    let mut cycles = Vec::new();
    for mut component in tarjan.components {
        component.sort();
        let looped = component.len() > 1
            || component
                .first()
                .is_some_and(|only| graph.dependencies(only).contains(only));
        if !looped {
            continue;
        }
        let path = cycle_path(graph, &component);
        cycles.push(CycleError {
            path,
            members: component.into_iter().cloned().collect(),
        });
    }
    cycles
}

struct Tarjan<'a> {
    graph: &'a DependencyGraph,
    next_index: usize,
    index: BTreeMap<&'a ModuleId, usize>,
    low: BTreeMap<&'a ModuleId, usize>,
    stack: Vec<&'a ModuleId>,
    on_stack: BTreeSet<&'a ModuleId>,
    components: Vec<Vec<&'a ModuleId>>,
}

impl<'a> Tarjan<'a> {
    fn visit(&mut self, node: &'a ModuleId) {
        let graph = self.graph;
        self.index.insert(node, self.next_index);
        self.low.insert(node, self.next_index);
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);

        for dep in sorted(graph.dependencies(node)) {
            if !graph.contains(dep) {
                continue;
            }
            if !self.index.contains_key(dep) {
                self.visit(dep);
                let reached = self.low[dep];
                self.lower(node, reached);
            } else if self.on_stack.contains(dep) {
                let reached = self.index[dep];
                self.lower(node, reached);
            }
        }

        if self.low[node] == self.index[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                component.push(member);
                if member == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }

    fn lower(&mut self, node: &'a ModuleId, candidate: usize) {
        if let Some(low) = self.low.get_mut(node) {
            *low = (*low).min(candidate);
        }
    }
}

/// Shortest loop through the smallest member of a component, staying inside
/// the component.
fn cycle_path(graph: &DependencyGraph, component: &[&ModuleId]) -> Vec<ModuleId> {
    let Some(&start) = component.first() else {
        return Vec::new();
    };
    let inside: BTreeSet<&ModuleId> = component.iter().copied().collect();
    let mut came_from: BTreeMap<&ModuleId, &ModuleId> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for dep in sorted(graph.dependencies(current)) {
            if dep == start {
                let mut path = vec![current.clone()];
                let mut at = current;
                while at != start {
                    at = came_from[at];
                    path.push(at.clone());
                }
                path.reverse();
                return path;
            }
            if inside.contains(dep) && !came_from.contains_key(dep) {
                came_from.insert(dep, current);
                queue.push_back(dep);
            }
        }
    }
    component.iter().map(|id| (*id).clone()).collect()
}

/// Reject every module with a rejected direct dependency, until nothing
/// changes.
fn propagate_rejections(graph: &DependencyGraph, rejected: &mut BTreeMap<ModuleId, ReloadError>) {
    loop {
        let mut newly = Vec::new();
        for (module, deps) in &graph.edges {
            if rejected.contains_key(module) {
                continue;
            }
            if let Some(dep) = sorted(deps).into_iter().find(|d| rejected.contains_key(*d)) {
                newly.push((module.clone(), dep.clone()));
            }
        }
        if newly.is_empty() {
            return;
        }
        for (module, dependency) in newly {
            rejected.insert(
                module.clone(),
                ReloadError::DependencyFailed { module, dependency },
            );
        }
    }
}

/// Topological order from post-order finish times over accepted modules.
fn post_order(
    graph: &DependencyGraph,
    rejected: &BTreeMap<ModuleId, ReloadError>,
) -> Vec<ModuleId> {
    let mut done = BTreeSet::new();
    let mut order = Vec::new();
    for start in graph.modules() {
        if !rejected.contains_key(start) {
            finish(graph, start, &mut done, &mut order);
        }
    }
    order
}

fn finish<'a>(
    graph: &'a DependencyGraph,
    node: &'a ModuleId,
    done: &mut BTreeSet<&'a ModuleId>,
    order: &mut Vec<ModuleId>,
) {
    if !done.insert(node) {
        return;
    }
    for dep in sorted(graph.dependencies(node)) {
        finish(graph, dep, done, order);
    }
    order.push(node.clone());
}

/// Group an order into tiers: a module's tier is one past its deepest
/// dependency.
fn tiers(graph: &DependencyGraph, order: &[ModuleId]) -> Vec<Vec<ModuleId>> {
    let mut level: BTreeMap<&ModuleId, usize> = BTreeMap::new();
    let mut tiers: Vec<Vec<ModuleId>> = Vec::new();
    for id in order {
        let depth = graph
            .dependencies(id)
            .iter()
            .filter_map(|dep| level.get(dep).map(|l| l + 1))
            .max()
            .unwrap_or(0);
        level.insert(id, depth);
        if tiers.len() <= depth {
            tiers.resize_with(depth + 1, Vec::new);
        }
        tiers[depth].push(id.clone());
    }
    for tier in &mut tiers {
        tier.sort();
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleId {
        ModuleId::parse(s).unwrap()
    }

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (module, deps) in edges {
            g.add_module(id(module), deps.iter().map(|d| id(d)).collect());
        }
        g
    }

    fn names(ids: &[ModuleId]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn chain_orders_dependencies_first() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        let r = resolve(&g);
        assert_eq!(names(&r.order), ["C", "B", "A"]);
        assert_eq!(r.tiers.len(), 3);
        assert!(r.rejected.is_empty());
    }

    #[test]
    fn order_is_deterministic_across_insertion_orders() {
        let g1 = graph(&[("app", &["lib.b", "lib.a"]), ("lib.a", &[]), ("lib.b", &[])]);
        let g2 = graph(&[("lib.b", &[]), ("lib.a", &[]), ("app", &["lib.a", "lib.b"])]);
        let r1 = resolve(&g1);
        let r2 = resolve(&g2);
        assert_eq!(r1.order, r2.order);
        assert_eq!(names(&r1.order), ["lib.a", "lib.b", "app"]);
        assert_eq!(names(&r1.tiers[0]), ["lib.a", "lib.b"]);
        assert_eq!(names(&r1.tiers[1]), ["app"]);
    }

    #[test]
    fn two_module_cycle_names_both() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        let r = resolve(&g);
        assert!(r.order.is_empty());
        let cycles = r.cycles();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].involves(&id("A")));
        assert!(cycles[0].involves(&id("B")));
        assert!(matches!(r.rejected[&id("A")], ReloadError::Cycle(_)));
        assert!(matches!(r.rejected[&id("B")], ReloadError::Cycle(_)));
    }

    #[test]
    fn whole_component_is_one_cycle() {
        // A -> B -> A closes first; D only reaches A through B but is in the
        // same component because A also depends on D.
        let g = graph(&[("A", &["B", "D"]), ("B", &["A"]), ("D", &["B"]), ("E", &["D"])]);
        let r = resolve(&g);
        let cycles = r.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(names(&cycles[0].members), ["A", "B", "D"]);
        assert_eq!(names(&cycles[0].path), ["A", "B"]);
        for member in ["A", "B", "D"] {
            assert_eq!(r.rejected[&id(member)], ReloadError::Cycle(cycles[0].clone()));
        }
        assert!(matches!(
            &r.rejected[&id("E")],
            ReloadError::DependencyFailed { dependency, .. } if dependency == &id("D")
        ));
        assert_eq!(
            r.rejected[&id("D")].to_string(),
            "dependency cycle: A -> B -> A (component: A, B, D)"
        );
    }

    #[test]
    fn separate_cycles_stay_separate() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("x", &["y"]), ("y", &["x"])]);
        let r = resolve(&g);
        let cycles = r.cycles();
        assert_eq!(cycles.len(), 2);
        assert_eq!(names(&cycles[0].members), ["a", "b"]);
        assert_eq!(names(&cycles[1].members), ["x", "y"]);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let g = graph(&[("solo", &["solo"])]);
        let r = resolve(&g);
        assert!(matches!(r.rejected[&id("solo")], ReloadError::Cycle(_)));
        assert!(r.order.is_empty());
    }

    #[test]
    fn cycle_quarantines_dependents_only() {
        let g = graph(&[
            ("A", &["B"]),
            ("B", &["A"]),
            ("user", &["A"]),
            ("free", &[]),
        ]);
        let r = resolve(&g);
        assert_eq!(names(&r.order), ["free"]);
        assert!(matches!(
            &r.rejected[&id("user")],
            ReloadError::DependencyFailed { dependency, .. } if dependency == &id("A")
        ));
    }

    #[test]
    fn missing_dependency_quarantines_downstream() {
        let g = graph(&[("A", &["B"]), ("B", &["ghost"]), ("C", &[])]);
        let r = resolve(&g);
        assert_eq!(names(&r.order), ["C"]);
        assert!(matches!(
            &r.rejected[&id("B")],
            ReloadError::UnresolvedDependency { missing, .. } if missing == &id("ghost")
        ));
        assert!(matches!(
            &r.rejected[&id("A")],
            ReloadError::DependencyFailed { dependency, .. } if dependency == &id("B")
        ));
    }

    #[test]
    fn diamond_shares_one_build_of_the_base() {
        let g = graph(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let r = resolve(&g);
        assert_eq!(names(&r.order), ["base", "left", "right", "top"]);
        assert_eq!(r.tiers.len(), 3);
        assert_eq!(names(&r.tiers[1]), ["left", "right"]);
    }

    #[test]
    fn transitive_dependents_follow_edges() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[]), ("D", &[])]);
        let deps = g.transitive_dependents([&id("C")]);
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), [id("A"), id("B")]);
        assert_eq!(g.dependents(&id("B")), [&id("A")]);
    }
}
