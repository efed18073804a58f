use crate::{
    graph::Graph,
    runtime::RunError,
    types::{FuncId, MachineId, StageFn, StageId, StageNodeId},
};
use tracing::warn;

/// A stage: a label for diagnostics plus its function graph.
#[must_use]
pub(crate) struct StageGraph {
    pub(crate) label: String,
    pub(crate) graph: Graph<StageFn>,
}

/// A machine: a label plus its stage graph. Node payloads are indices into
/// the stage table.
#[must_use]
pub(crate) struct MachineGraph {
    pub(crate) label: String,
    pub(crate) graph: Graph<u32>,
}

/// Mutable two-level registry, populated during program initialization and
/// frozen into a [`Plan`] when the runtime starts.
#[must_use]
#[derive(Default)]
pub(crate) struct Registry {
    stages: Vec<StageGraph>,
    machines: Vec<MachineGraph>,
}

impl Registry {
    pub(crate) fn add_stage(&mut self, label: String) -> StageId {
        let id = u32::try_from(self.stages.len()).expect("Registry::add_stage: [1]");
        self.stages.push(StageGraph {
            label,
            graph: Graph::default(),
        });
        StageId(id)
    }

    pub(crate) fn add_machine(&mut self, label: String) -> MachineId {
        let id = u32::try_from(self.machines.len()).expect("Registry::add_machine: [1]");
        self.machines.push(MachineGraph {
            label,
            graph: Graph::default(),
        });
        MachineId(id)
    }

    /// Register a function node into `stage`, depending on previously
    /// registered function nodes of the same stage.
    pub(crate) fn add_function(
        &mut self,
        stage: StageId,
        deps: &[FuncId],
        func: StageFn,
    ) -> FuncId {
        for dep in deps {
            assert_eq!(
                dep.stage, stage,
                "function dependencies must belong to the same stage \
                 (dependency is a node of `{}`, registering into `{}`)",
                self.stages[dep.stage.0 as usize].label, self.stages[stage.0 as usize].label,
            );
        }
        let graph = &mut self.stages[stage.0 as usize].graph;
        let index = graph.add_node(func, deps.iter().map(|dep| dep.index));
        FuncId { stage, index }
    }

    /// Register a stage node into `machine`, depending on previously
    /// registered stage nodes of the same machine.
    pub(crate) fn add_stage_node(
        &mut self,
        machine: MachineId,
        stage: StageId,
        deps: &[StageNodeId],
    ) -> StageNodeId {
        assert!(
            (stage.0 as usize) < self.stages.len(),
            "Registry::add_stage_node: unknown stage"
        );
        for dep in deps {
            assert_eq!(
                dep.machine, machine,
                "stage-node dependencies must belong to the same machine \
                 (registering into `{}`)",
                self.machines[machine.0 as usize].label,
            );
        }
        let graph = &mut self.machines[machine.0 as usize].graph;
        let index = graph.add_node(stage.0, deps.iter().map(|dep| dep.index));
        StageNodeId { machine, index }
    }

    /// Freeze the registry: compute the independents of every graph and
    /// validate that no machine references a function-less stage (such a
    /// stage can never drain, so everything downstream of it would be
    /// silently skipped).
    pub(crate) fn finalize(mut self) -> Result<Plan, RunError> {
        for stage in &mut self.stages {
            stage.graph.finalize();
        }
        for machine in &mut self.machines {
            machine.graph.finalize();
        }

        for machine in &self.machines {
            if machine.graph.nodes.is_empty() {
                warn!(
                    machine = %machine.label,
                    "machine has no stage nodes; each of its executions completes immediately"
                );
            }
            for node in &machine.graph.nodes {
                let stage = &self.stages[node.payload as usize];
                if stage.graph.nodes.is_empty() {
                    return Err(RunError::EmptyStage {
                        stage: stage.label.clone(),
                        machine: machine.label.clone(),
                    });
                }
            }
        }

        Ok(Plan {
            stages: self.stages,
            machines: self.machines,
        })
    }
}

/// Immutable snapshot of the registry, shared with the worker pool for the
/// lifetime of the runtime.
#[must_use]
pub(crate) struct Plan {
    pub(crate) stages: Vec<StageGraph>,
    pub(crate) machines: Vec<MachineGraph>,
}

impl Plan {
    pub(crate) fn empty() -> Self {
        Self {
            stages: Vec::new(),
            machines: Vec::new(),
        }
    }

    /// The stage backing stage node `stage_node` of `machine`.
    pub(crate) fn stage_of(&self, machine: u32, stage_node: u32) -> &StageGraph {
        let node = &self.machines[machine as usize].graph.nodes[stage_node as usize];
        &self.stages[node.payload as usize]
    }
}
