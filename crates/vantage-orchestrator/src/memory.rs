//! Working memory for a single agent execution.
//!
//! Memory exists only for the lifetime of one `process` call and is discarded
//! after completion; nothing carries across tasks.

use serde_json::Value;
use std::collections::HashMap;

/// Retention tier for a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryTier {
    /// Scratch values for the current step.
    #[default]
    Short,
    /// Intermediate results shared across steps.
    Medium,
    /// Facts that should survive the whole execution.
    Long,
}

/// Per-execution key→value memory with three retention tiers.
#[derive(Debug, Default)]
pub struct AgentMemory {
    short_term: HashMap<String, Value>,
    medium_term: HashMap<String, Value>,
    long_term: HashMap<String, Value>,
}

/// Entry counts per tier, reported by the status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Short-term entry count.
    pub short_term: usize,
    /// Medium-term entry count.
    pub medium_term: usize,
    /// Long-term entry count.
    pub long_term: usize,
}

impl AgentMemory {
    /// Creates empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_mut(&mut self, tier: MemoryTier) -> &mut HashMap<String, Value> {
        match tier {
            MemoryTier::Short => &mut self.short_term,
            MemoryTier::Medium => &mut self.medium_term,
            MemoryTier::Long => &mut self.long_term,
        }
    }

    fn tier(&self, tier: MemoryTier) -> &HashMap<String, Value> {
        match tier {
            MemoryTier::Short => &self.short_term,
            MemoryTier::Medium => &self.medium_term,
            MemoryTier::Long => &self.long_term,
        }
    }

    /// Stores a value in the given tier.
    pub fn set(&mut self, key: impl Into<String>, value: Value, tier: MemoryTier) {
        self.tier_mut(tier).insert(key.into(), value);
    }

    /// Reads a value from the given tier.
    #[must_use]
    pub fn get(&self, key: &str, tier: MemoryTier) -> Option<&Value> {
        self.tier(tier).get(key)
    }

    /// Reports entry counts per tier.
    #[must_use]
    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            short_term: self.short_term.len(),
            medium_term: self.medium_term.len(),
            long_term: self.long_term.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_tiers_are_independent() {
        let mut memory = AgentMemory::new();
        memory.set("key", json!(1), MemoryTier::Short);
        memory.set("key", json!(2), MemoryTier::Medium);

        assert_eq!(memory.get("key", MemoryTier::Short), Some(&json!(1)));
        assert_eq!(memory.get("key", MemoryTier::Medium), Some(&json!(2)));
        assert_eq!(memory.get("key", MemoryTier::Long), None);
    }

    #[test]
    fn test_memory_usage() {
        let mut memory = AgentMemory::new();
        memory.set("a", json!(1), MemoryTier::Short);
        memory.set("b", json!(2), MemoryTier::Short);
        memory.set("c", json!(3), MemoryTier::Long);

        let usage = memory.usage();
        assert_eq!(usage.short_term, 2);
        assert_eq!(usage.medium_term, 0);
        assert_eq!(usage.long_term, 1);
    }
}
