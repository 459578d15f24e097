//! Deferred-pipeline pass grouping.
//!
//! Couples the geometry/material pass with the lighting pass that consumes
//! it, cascades enable/disable across every member, and guards group-wide
//! resizes. Activation observers are plain lists invoked synchronously in
//! registration order.

use anyhow::Result;

use super::pass_graph::{OffscreenRenderPass, PassGraph, PassId};

type PassCallback = Box<dyn FnMut()>;

pub struct DeferredPasses {
    material_pass: PassId,
    lighting_pass: PassId,
    aux_passes: Vec<PassId>,
    enabled: bool,
    on_activate: Vec<PassCallback>,
    on_deactivate: Vec<PassCallback>,
}

impl DeferredPasses {
    /// Create the material and lighting passes in `graph`, with the lighting
    /// pass depending on the material buffers. The group starts disabled and
    /// its passes uninitialized.
    pub fn new(graph: &mut PassGraph, width: u32, height: u32) -> Result<Self> {
        let material_pass = graph.add_pass(OffscreenRenderPass::new("material", width, height));
        let lighting_pass = graph.add_pass(OffscreenRenderPass::new("lighting", width, height));
        graph.depends_on(lighting_pass, material_pass)?;
        Ok(Self {
            material_pass,
            lighting_pass,
            aux_passes: Vec::new(),
            enabled: false,
            on_activate: Vec::new(),
            on_deactivate: Vec::new(),
        })
    }

    pub fn material_pass(&self) -> PassId {
        self.material_pass
    }

    pub fn lighting_pass(&self) -> PassId {
        self.lighting_pass
    }

    /// Attach an extra pass (ambient occlusion, bloom, ...) to the group so
    /// it follows group toggles and resizes.
    pub fn add_aux_pass(&mut self, pass: PassId) {
        if !self.aux_passes.contains(&pass) {
            self.aux_passes.push(pass);
        }
    }

    pub fn member_passes(&self) -> Vec<PassId> {
        let mut out = vec![self.material_pass, self.lighting_pass];
        out.extend(self.aux_passes.iter().copied());
        out
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_activate(&mut self, callback: impl FnMut() + 'static) {
        self.on_activate.push(Box::new(callback));
    }

    pub fn on_deactivate(&mut self, callback: impl FnMut() + 'static) {
        self.on_deactivate.push(Box::new(callback));
    }

    /// Toggle the whole group. Cascades to every member pass and fires the
    /// matching observers in registration order, exactly once per toggle.
    /// Re-applying the current state does nothing.
    pub fn set_enabled(&mut self, graph: &mut PassGraph, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        for id in self.member_passes() {
            if let Some(pass) = graph.pass_mut(id) {
                if enabled {
                    pass.enable();
                } else {
                    pass.disable();
                }
            }
        }
        let callbacks = if enabled { &mut self.on_activate } else { &mut self.on_deactivate };
        for callback in callbacks.iter_mut() {
            callback();
        }
    }

    /// Propagate a viewport size to every member pass. Zero or negative
    /// dimensions are ignored.
    pub fn check_size(&self, graph: &mut PassGraph, width: i32, height: i32) {
        if width <= 0 || height <= 0 {
            return;
        }
        for id in self.member_passes() {
            if let Some(pass) = graph.pass_mut(id) {
                pass.resize(width as u32, height as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::pass::pass_graph::PassState;

    #[test]
    fn disable_cascades_and_fires_observers_in_order() {
        let mut graph = PassGraph::new();
        let mut group = DeferredPasses::new(&mut graph, 1280, 720).unwrap();
        let ao = graph.add_pass(OffscreenRenderPass::new("ao", 1280, 720));
        group.add_aux_pass(ao);

        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let first = log.clone();
        group.on_deactivate(move || first.borrow_mut().push("first"));
        let second = log.clone();
        group.on_deactivate(move || second.borrow_mut().push("second"));

        group.set_enabled(&mut graph, true);
        assert!(graph.pass(ao).unwrap().is_active());
        assert!(log.borrow().is_empty());

        group.set_enabled(&mut graph, false);
        for id in group.member_passes() {
            assert_eq!(graph.pass(id).unwrap().state(), PassState::Disabled);
        }
        assert_eq!(*log.borrow(), vec!["first", "second"]);

        // Disabling an already-disabled group fires nothing further.
        group.set_enabled(&mut graph, false);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn passes_start_uninitialized_until_enabled() {
        let mut graph = PassGraph::new();
        let group = DeferredPasses::new(&mut graph, 64, 64).unwrap();
        assert_eq!(
            graph.pass(group.material_pass()).unwrap().state(),
            PassState::Uninitialized
        );
        assert!(!group.is_enabled());
    }

    #[test]
    fn lighting_depends_on_material() {
        let mut graph = PassGraph::new();
        let group = DeferredPasses::new(&mut graph, 64, 64).unwrap();
        let order = graph.execution_order();
        let pos = |id| order.iter().position(|o| *o == id).unwrap();
        assert!(pos(group.material_pass()) < pos(group.lighting_pass()));
    }

    #[test]
    fn non_positive_resize_is_a_no_op() {
        let mut graph = PassGraph::new();
        let group = DeferredPasses::new(&mut graph, 800, 600).unwrap();

        group.check_size(&mut graph, 0, 400);
        group.check_size(&mut graph, 400, 0);
        group.check_size(&mut graph, -1, -1);
        for id in group.member_passes() {
            assert_eq!(graph.pass(id).unwrap().size(), [800, 600]);
        }

        group.check_size(&mut graph, 1024, 768);
        for id in group.member_passes() {
            assert_eq!(graph.pass(id).unwrap().size(), [1024, 768]);
        }
    }
}
