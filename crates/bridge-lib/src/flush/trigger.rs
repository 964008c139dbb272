use crate::models::Priority;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a flush cycle started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    TimeInterval,
    SizeLimit,
    Priority,
    Manual,
    Shutdown,
    Adaptive,
}

impl FlushTrigger {
    pub const ALL: [FlushTrigger; 6] = [
        FlushTrigger::TimeInterval,
        FlushTrigger::SizeLimit,
        FlushTrigger::Priority,
        FlushTrigger::Manual,
        FlushTrigger::Shutdown,
        FlushTrigger::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::TimeInterval => "time_interval",
            FlushTrigger::SizeLimit => "size_limit",
            FlushTrigger::Priority => "priority",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
            FlushTrigger::Adaptive => "adaptive",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            FlushTrigger::TimeInterval => 0,
            FlushTrigger::SizeLimit => 1,
            FlushTrigger::Priority => 2,
            FlushTrigger::Manual => 3,
            FlushTrigger::Shutdown => 4,
            FlushTrigger::Adaptive => 5,
        }
    }

    /// Time-based triggers reset the timer even when nothing was buffered
    pub fn is_timed(&self) -> bool {
        matches!(self, FlushTrigger::TimeInterval | FlushTrigger::Adaptive)
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger plus the tiers the cycle may drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushDecision {
    pub trigger: FlushTrigger,
    pub tiers: Vec<Priority>,
}

impl FlushDecision {
    pub fn all(trigger: FlushTrigger) -> Self {
        Self {
            trigger,
            tiers: Priority::ALL.to_vec(),
        }
    }

    pub fn tiers(trigger: FlushTrigger, tiers: Vec<Priority>) -> Self {
        Self { trigger, tiers }
    }
}

/// Lifecycle of the flush scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Armed = 1,
    Flushing = 2,
    Stopped = 3,
}

impl SchedulerState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => SchedulerState::Armed,
            2 => SchedulerState::Flushing,
            3 => SchedulerState::Stopped,
            _ => SchedulerState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Armed => "armed",
            SchedulerState::Flushing => "flushing",
            SchedulerState::Stopped => "stopped",
        }
    }
}
