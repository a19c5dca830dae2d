//! Traversal budget: deadline, cancellation and node limit

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::GraphConfig;
use crate::error::{LineageError, Result};

/// Limits checked before every document visit
///
/// Exhausting any of them aborts the whole traversal with an error; no
/// partial graph is returned.
#[derive(Debug, Clone)]
pub struct TraversalBudget {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
    max_nodes: usize,
}

impl Default for TraversalBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl TraversalBudget {
    pub fn unlimited() -> Self {
        Self {
            deadline: None,
            cancel: None,
            max_nodes: usize::MAX,
        }
    }

    /// Budget from configured limits, deadline counted from now
    pub fn from_config(config: &GraphConfig) -> Self {
        let budget = Self::unlimited().with_max_nodes(config.max_nodes);
        match config.timeout() {
            Some(timeout) => budget.with_timeout(timeout),
            None => budget,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Fail if cancelled, past the deadline, or over the node limit
    pub fn check(&self, nodes_reached: usize) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(LineageError::cancelled(format!(
                "Traversal cancelled after {} nodes",
                nodes_reached
            )));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LineageError::deadline_exceeded(format!(
                "Traversal deadline exceeded after {} nodes",
                nodes_reached
            )));
        }
        if nodes_reached > self.max_nodes {
            return Err(LineageError::deadline_exceeded(format!(
                "Traversal reached {} nodes, limit is {}",
                nodes_reached, self.max_nodes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_unlimited_never_fails() {
        assert!(TraversalBudget::unlimited().check(1_000_000).is_ok());
    }

    #[test]
    fn test_cancelled_token() {
        let token = CancellationToken::new();
        let budget = TraversalBudget::unlimited().with_cancellation(token.clone());
        assert!(budget.check(0).is_ok());

        token.cancel();
        assert_eq!(budget.check(3).unwrap_err().kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_past_deadline() {
        let budget = TraversalBudget::unlimited().with_deadline(Instant::now());
        assert_eq!(
            budget.check(0).unwrap_err().kind,
            ErrorKind::DeadlineExceeded
        );
    }

    #[test]
    fn test_node_limit() {
        let budget = TraversalBudget::unlimited().with_max_nodes(2);
        assert!(budget.check(2).is_ok());
        assert_eq!(
            budget.check(3).unwrap_err().kind,
            ErrorKind::DeadlineExceeded
        );
    }

    #[test]
    fn test_from_config_without_timeout() {
        let config = GraphConfig::default().timeout_ms(0).max_nodes(7);
        let budget = TraversalBudget::from_config(&config);
        assert_eq!(budget.max_nodes(), 7);
        assert!(budget.check(7).is_ok());
    }
}
