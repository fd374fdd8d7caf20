use serde::Serialize;

/// Static description of one unit of work in a job's graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub name: String,
    pub depends_on: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Safe to run again over its own previous outputs.
    pub idempotent: bool,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            idempotent: true,
        }
    }

    pub fn depends_on<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn outputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn declares_output(&self, key: &str) -> bool {
        self.outputs.iter().any(|k| k == key)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Succeeded | StepState::Failed | StepState::Cancelled
        )
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Running => write!(f, "running"),
            StepState::Succeeded => write!(f, "succeeded"),
            StepState::Failed => write!(f, "failed"),
            StepState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let step = StepDefinition::new("transcribe_vocal")
            .depends_on(["separate_stems"])
            .inputs(["vocals"])
            .outputs(["transcript_vocal"]);

        assert_eq!(step.name, "transcribe_vocal");
        assert_eq!(step.depends_on, vec!["separate_stems".to_string()]);
        assert!(step.declares_output("transcript_vocal"));
        assert!(!step.declares_output("vocals"));
        assert!(step.idempotent);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StepState::Pending.is_terminal());
        assert!(!StepState::Running.is_terminal());
        assert!(StepState::Succeeded.is_terminal());
        assert!(StepState::Cancelled.is_terminal());
    }
}
