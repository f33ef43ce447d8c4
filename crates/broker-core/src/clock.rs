// ABOUTME: Clock and identifier generator contracts injected into lifecycle functions
// ABOUTME: Production uses wall-clock UTC and UUID v7; tests substitute deterministic sources
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Source of fresh record identifiers
pub trait IdGenerator: Send + Sync {
    /// Produce a new, never previously returned identifier
    fn next_id(&self) -> String;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time-ordered UUID v7 identifiers, so id order follows creation order
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_v7_ids_are_unique() {
        let ids = UuidV7Generator;
        let first = ids.next_id();
        let second = ids.next_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 36);
    }
}
