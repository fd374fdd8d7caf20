use std::collections::{BTreeSet, HashMap};

use crate::error::SchedulerError;

use super::step::StepDefinition;

/// Steps of one job in declared order. Declared order is also the
/// tie-break whenever several steps are ready at once.
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    steps: Vec<StepDefinition>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn add(&mut self, step: StepDefinition) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn get(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Rejects duplicate names, unknown dependencies, outputs claimed by two
    /// steps, and cycles.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.index().map(|_| ())?;
        self.topological_order().map(|_| ())
    }

    /// Kahn's algorithm; among ready steps the lowest declared index wins.
    pub fn topological_order(&self) -> Result<Vec<usize>, SchedulerError> {
        let (mut in_degree, dependents) = self.dependency_tables()?;

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| index)
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.steps.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(index, _)| self.steps[index].name.as_str())
                .collect();
            return Err(SchedulerError::Cycle(stuck.join(", ")));
        }

        Ok(order)
    }

    /// Per-step count of unmet dependencies, and the reverse edges.
    pub(crate) fn dependency_tables(
        &self,
    ) -> Result<(Vec<usize>, Vec<Vec<usize>>), SchedulerError> {
        let index = self.index()?;
        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents = vec![Vec::new(); self.steps.len()];

        for (position, step) in self.steps.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for dependency in &step.depends_on {
                let dep_index = *index.get(dependency.as_str()).ok_or_else(|| {
                    SchedulerError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                if seen.insert(dep_index) {
                    in_degree[position] += 1;
                    dependents[dep_index].push(position);
                }
            }
        }

        Ok((in_degree, dependents))
    }

    fn index(&self) -> Result<HashMap<&str, usize>, SchedulerError> {
        let mut by_name = HashMap::with_capacity(self.steps.len());
        let mut output_owner: HashMap<&str, &str> = HashMap::new();

        for (position, step) in self.steps.iter().enumerate() {
            if by_name.insert(step.name.as_str(), position).is_some() {
                return Err(SchedulerError::DuplicateStep(step.name.clone()));
            }
            for key in &step.outputs {
                if let Some(first) = output_owner.insert(key.as_str(), step.name.as_str()) {
                    return Err(SchedulerError::DuplicateOutput {
                        key: key.clone(),
                        first: first.to_string(),
                        second: step.name.clone(),
                    });
                }
            }
        }

        Ok(by_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &StepGraph, order: &[usize]) -> Vec<String> {
        order
            .iter()
            .map(|&i| graph.steps()[i].name.clone())
            .collect()
    }

    #[test]
    fn test_declared_order_breaks_ties() {
        let graph = StepGraph::new()
            .with_step(StepDefinition::new("a"))
            .with_step(StepDefinition::new("b").depends_on(["a"]))
            .with_step(StepDefinition::new("c").depends_on(["a"]))
            .with_step(StepDefinition::new("d").depends_on(["b"]))
            .with_step(StepDefinition::new("e").depends_on(["c"]));

        let order = graph.topological_order().unwrap();
        assert_eq!(names(&graph, &order), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_dependency_declared_after_dependent() {
        let graph = StepGraph::new()
            .with_step(StepDefinition::new("late").depends_on(["early"]))
            .with_step(StepDefinition::new("early"));

        let order = graph.topological_order().unwrap();
        assert_eq!(names(&graph, &order), vec!["early", "late"]);
    }

    #[test]
    fn test_cycle_detected() {
        let graph = StepGraph::new()
            .with_step(StepDefinition::new("a").depends_on(["c"]))
            .with_step(StepDefinition::new("b").depends_on(["a"]))
            .with_step(StepDefinition::new("c").depends_on(["b"]));

        assert!(matches!(graph.validate(), Err(SchedulerError::Cycle(_))));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = StepGraph::new().with_step(StepDefinition::new("a").depends_on(["a"]));
        assert!(matches!(graph.validate(), Err(SchedulerError::Cycle(_))));
    }

    #[test]
    fn test_unknown_dependency() {
        let graph = StepGraph::new().with_step(StepDefinition::new("a").depends_on(["ghost"]));
        assert_eq!(
            graph.validate(),
            Err(SchedulerError::UnknownDependency {
                step: "a".to_string(),
                dependency: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_step() {
        let graph = StepGraph::new()
            .with_step(StepDefinition::new("a"))
            .with_step(StepDefinition::new("a"));
        assert_eq!(
            graph.validate(),
            Err(SchedulerError::DuplicateStep("a".to_string()))
        );
    }

    #[test]
    fn test_duplicate_output() {
        let graph = StepGraph::new()
            .with_step(StepDefinition::new("a").outputs(["audio"]))
            .with_step(StepDefinition::new("b").outputs(["audio"]));
        assert!(matches!(
            graph.validate(),
            Err(SchedulerError::DuplicateOutput { key, .. }) if key == "audio"
        ));
    }

    #[test]
    fn test_repeated_dependency_counts_once() {
        let graph = StepGraph::new()
            .with_step(StepDefinition::new("a"))
            .with_step(StepDefinition::new("b").depends_on(["a", "a"]));
        let order = graph.topological_order().unwrap();
        assert_eq!(names(&graph, &order), vec!["a", "b"]);
    }
}
