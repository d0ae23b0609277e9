use std::fmt;
use std::str::FromStr;

use typed_builder::TypedBuilder;

/// What `GlobalHandle::submit` does when the submission queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmitPolicy {
    /// Wait for room (backpressure on the producer).
    #[default]
    Block,
    /// Fail immediately with `InterpretError::QueueFull`.
    Reject,
}

impl FromStr for SubmitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(SubmitPolicy::Block),
            "reject" => Ok(SubmitPolicy::Reject),
            other => Err(format!("unknown submit policy '{other}' (expected block or reject)")),
        }
    }
}

impl fmt::Display for SubmitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitPolicy::Block => write!(f, "block"),
            SubmitPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Channel sizing and policies for one engine instance.
///
/// Capacities of zero are clamped to one when channels are created.
#[derive(Debug, Clone, TypedBuilder)]
pub struct EngineConfig {
    /// Bound of the GlobalInterpreter submission queue.
    #[builder(default = 1024)]
    pub queue_capacity: usize,
    /// Bound of the CommandInterpreter input.
    #[builder(default = 1024)]
    pub command_capacity: usize,
    /// Per-subscriber broadcast buffer. Events beyond it are dropped.
    #[builder(default = 256)]
    pub subscriber_capacity: usize,
    #[builder(default)]
    pub submit_policy: SubmitPolicy,
    /// Log and skip EventRules errors instead of stopping the EventInterpreter.
    #[builder(default = true)]
    pub recover_rules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
