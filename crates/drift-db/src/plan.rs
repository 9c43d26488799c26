//! Executable migration plans.
//!
//! A [`Plan`] is the dialect-rendered form of a change list: an ordered
//! sequence of SQL commands, each optionally paired with a reverse command
//! for down-migrations and a human annotation. Plans are produced by
//! [`Driver::plan_changes`](crate::driver::Driver::plan_changes) and
//! serialized to disk by a formatter.

use serde::{Deserialize, Serialize};

/// An ordered collection of SQL commands plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Caller-supplied label; may be empty.
    pub name: String,
    /// Explicit version. When `None`, formatters derive one from the
    /// current UTC timestamp.
    pub version: Option<String>,
    /// Whether every change carries a reverse command.
    pub reversible: bool,
    /// Whether the plan can run inside a single transaction.
    pub transactional: bool,
    /// The commands, in execution order.
    pub changes: Vec<PlannedChange>,
}

impl Plan {
    /// Creates an empty, transactional plan with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            reversible: true,
            transactional: true,
            changes: Vec::new(),
        }
    }

    /// Adds a change and updates the reversibility hint.
    pub fn push(&mut self, change: PlannedChange) {
        if change.reverse.is_none() {
            self.reversible = false;
        }
        self.changes.push(change);
    }
}

/// A single executable command within a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
    /// The SQL to execute.
    pub cmd: String,
    /// SQL reversing `cmd`, when derivable.
    pub reverse: Option<String>,
    /// A human annotation rendered as a comment.
    pub comment: Option<String>,
}

impl PlannedChange {
    /// Creates a change with no reverse command.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            reverse: None,
            comment: None,
        }
    }

    /// Sets the reverse command.
    #[must_use]
    pub fn with_reverse(mut self, reverse: impl Into<String>) -> Self {
        self.reverse = Some(reverse.into());
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
