//! Completed steps awaiting possible compensation.

use crate::step::SagaStep;

/// A step whose forward action succeeded.
#[derive(Debug, Clone)]
pub struct CompletedStep<A> {
    pub name: &'static str,
    pub record: SagaStep,
    pub compensation: Option<A>,
}

/// LIFO stack of completed steps.
///
/// Popping yields steps in reverse completion order, which is the order
/// compensations must run in.
#[derive(Debug)]
pub struct CompletedStack<A> {
    steps: Vec<CompletedStep<A>>,
}

impl<A> Default for CompletedStack<A> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<A> CompletedStack<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: CompletedStep<A>) {
        self.steps.push(step);
    }

    pub fn pop(&mut self) -> Option<CompletedStep<A>> {
        self.steps.pop()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step records in completion order.
    pub fn records(&self) -> impl Iterator<Item = &SagaStep> {
        self.steps.iter().map(|step| &step.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(name: &'static str) -> CompletedStep<&'static str> {
        CompletedStep {
            name,
            record: SagaStep::default(),
            compensation: Some(name),
        }
    }

    #[test]
    fn test_pops_in_reverse_order() {
        let mut stack = CompletedStack::new();
        stack.push(completed("create_user"));
        stack.push(completed("create_credential"));
        stack.push(completed("create_organization"));
        assert_eq!(stack.len(), 3);

        let order: Vec<&str> = std::iter::from_fn(|| stack.pop()).map(|s| s.name).collect();
        assert_eq!(
            order,
            vec!["create_organization", "create_credential", "create_user"]
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn test_empty_stack() {
        let mut stack: CompletedStack<()> = CompletedStack::new();
        assert!(stack.pop().is_none());
        assert_eq!(stack.records().count(), 0);
    }
}
