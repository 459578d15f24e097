//! Offscreen render passes and their dependency graph.

use anyhow::{Result, bail};

/// Identifier of a pass within one `PassGraph`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

/// Pass lifecycle. Transitions happen only through explicit enable/disable
/// calls; there is no implicit reactivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Uninitialized,
    Active,
    Disabled,
}

/// A GPU render target not directly presented to the screen, used as an
/// intermediate computation stage.
#[derive(Clone, Debug)]
pub struct OffscreenRenderPass {
    name: String,
    size: [u32; 2],
    state: PassState,
}

impl OffscreenRenderPass {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            size: [width, height],
            state: PassState::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == PassState::Active
    }

    pub fn enable(&mut self) {
        self.state = PassState::Active;
    }

    pub fn disable(&mut self) {
        self.state = PassState::Disabled;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = [width, height];
    }
}

/// Dependency graph over offscreen passes. Edges must form a DAG; a cycle is
/// rejected by the edge-adding call itself.
#[derive(Debug, Default)]
pub struct PassGraph {
    slots: Vec<Option<OffscreenRenderPass>>,
    // deps[i] lists the passes slot i depends on.
    deps: Vec<Vec<usize>>,
}

impl PassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: OffscreenRenderPass) -> PassId {
        let id = PassId(self.slots.len() as u32);
        self.slots.push(Some(pass));
        self.deps.push(Vec::new());
        id
    }

    pub fn pass(&self, id: PassId) -> Option<&OffscreenRenderPass> {
        self.slots.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn pass_mut(&mut self, id: PassId) -> Option<&mut OffscreenRenderPass> {
        self.slots.get_mut(id.0 as usize).and_then(|slot| slot.as_mut())
    }

    /// Live passes in id order.
    pub fn passes(&self) -> impl Iterator<Item = (PassId, &OffscreenRenderPass)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|p| (PassId(i as u32), p)))
    }

    fn name_of(&self, id: PassId) -> String {
        self.pass(id).map(|p| p.name().to_string()).unwrap_or_default()
    }

    fn check_live(&self, id: PassId) -> Result<()> {
        if self.pass(id).is_none() {
            bail!("unknown or removed pass id {:?}", id);
        }
        Ok(())
    }

    /// Record that `pass` consumes an output produced by `dependency`. Fails
    /// immediately if the edge would close a cycle.
    pub fn depends_on(&mut self, pass: PassId, dependency: PassId) -> Result<()> {
        self.check_live(pass)?;
        self.check_live(dependency)?;
        if pass == dependency || self.reaches(dependency, pass) {
            bail!(
                "cycle detected in pass dependencies: '{}' -> '{}'",
                self.name_of(pass),
                self.name_of(dependency)
            );
        }
        let entry = &mut self.deps[pass.0 as usize];
        if !entry.contains(&(dependency.0 as usize)) {
            entry.push(dependency.0 as usize);
        }
        Ok(())
    }

    // True if `from` (transitively) depends on `to`.
    fn reaches(&self, from: PassId, to: PassId) -> bool {
        let mut stack = vec![from.0 as usize];
        let mut visited = vec![false; self.slots.len()];
        while let Some(i) = stack.pop() {
            if i == to.0 as usize {
                return true;
            }
            if std::mem::replace(&mut visited[i], true) {
                continue;
            }
            stack.extend(self.deps[i].iter().copied());
        }
        false
    }

    /// Topological execution order: every pass appears after all passes it
    /// depends on. Deterministic for identical graphs; independent chains are
    /// ordered by pass id.
    pub fn execution_order(&self) -> Vec<PassId> {
        let mut visited = vec![false; self.slots.len()];
        let mut order = Vec::new();
        for i in 0..self.slots.len() {
            self.visit(i, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, i: usize, visited: &mut [bool], order: &mut Vec<PassId>) {
        if visited[i] || self.slots[i].is_none() {
            return;
        }
        visited[i] = true;
        for dep in &self.deps[i] {
            self.visit(*dep, visited, order);
        }
        order.push(PassId(i as u32));
    }

    /// Teardown: detach a pass and every edge referencing it. Only disabled
    /// passes may be removed; anything else must be disabled first.
    pub fn remove_pass(&mut self, id: PassId) -> Result<()> {
        self.check_live(id)?;
        let pass = self.pass(id).expect("checked live");
        if pass.state() != PassState::Disabled {
            bail!("pass '{}' must be disabled before removal", pass.name());
        }
        self.slots[id.0 as usize] = None;
        self.deps[id.0 as usize].clear();
        for deps in &mut self.deps {
            deps.retain(|d| *d != id.0 as usize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(name: &str) -> OffscreenRenderPass {
        OffscreenRenderPass::new(name, 256, 256)
    }

    #[test]
    fn chains_schedule_in_dependency_order() {
        let mut graph = PassGraph::new();
        let c = graph.add_pass(pass("c"));
        let a = graph.add_pass(pass("a"));
        let b = graph.add_pass(pass("b"));
        graph.depends_on(b, a).unwrap();
        graph.depends_on(c, b).unwrap();

        let order = graph.execution_order();
        let pos = |id| order.iter().position(|o| *o == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn cycle_fails_at_edge_insertion() {
        let mut graph = PassGraph::new();
        let a = graph.add_pass(pass("irradiance"));
        let b = graph.add_pass(pass("reflection"));
        graph.depends_on(b, a).unwrap();
        let err = graph.depends_on(a, b).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cycle detected in pass dependencies"), "{message}");
        assert!(message.contains("irradiance"), "{message}");

        // The failed edge left the graph untouched.
        assert_eq!(graph.execution_order().len(), 2);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = PassGraph::new();
        let a = graph.add_pass(pass("a"));
        assert!(graph.depends_on(a, a).is_err());
    }

    #[test]
    fn removal_requires_disabled_state() {
        let mut graph = PassGraph::new();
        let a = graph.add_pass(pass("a"));
        let b = graph.add_pass(pass("b"));
        graph.depends_on(b, a).unwrap();

        graph.pass_mut(a).unwrap().enable();
        assert!(graph.remove_pass(a).is_err());

        graph.pass_mut(a).unwrap().disable();
        graph.remove_pass(a).unwrap();
        assert!(graph.pass(a).is_none());
        assert_eq!(graph.execution_order(), vec![b]);
    }

    #[test]
    fn states_change_only_through_explicit_calls() {
        let mut p = pass("g_buffer");
        assert_eq!(p.state(), PassState::Uninitialized);
        p.enable();
        assert_eq!(p.state(), PassState::Active);
        p.resize(512, 512);
        assert_eq!(p.state(), PassState::Active);
        p.disable();
        assert_eq!(p.state(), PassState::Disabled);
        p.resize(64, 64);
        assert_eq!(p.state(), PassState::Disabled);
    }
}
