//! Logger setup and grouped logs

use std::sync::Once;

use parking_lot::Mutex;

static INIT: Once = Once::new();

/// Install `env_logger` with `filter`; later calls are no-ops.
///
/// A logger installed by the host process wins.
pub fn init(filter: &str) {
    INIT.call_once(|| {
        let result = env_logger::Builder::new()
            .parse_filters(filter)
            .format_timestamp_millis()
            .try_init();
        if result.is_ok() {
            log::debug!("Logging initialized with filter '{}'", filter);
        }
    });
}

/// Numbered in-memory logs the managed side collects and prints as a group.
///
/// A group only records while it is active: `start` activates and clears it,
/// `stop` deactivates it but keeps the text.
#[derive(Debug, Default)]
pub struct GroupedLogs {
    groups: Mutex<Vec<LogGroup>>,
}

#[derive(Debug, Default)]
struct LogGroup {
    text: String,
    active: bool,
}

impl GroupedLogs {
    /// No groups
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate and clear group `index`
    pub fn start(&self, index: usize) {
        let mut groups = self.groups.lock();
        if groups.len() <= index {
            groups.resize_with(index + 1, LogGroup::default);
        }
        let group = &mut groups[index];
        group.text.clear();
        group.active = true;
    }

    /// Deactivate group `index`
    pub fn stop(&self, index: usize) {
        if let Some(group) = self.groups.lock().get_mut(index) {
            group.active = false;
        }
    }

    /// Check whether group `index` is recording
    pub fn is_active(&self, index: usize) -> bool {
        self.groups.lock().get(index).is_some_and(|g| g.active)
    }

    /// Append `message` to group `index` if it is recording
    pub fn append(&self, index: usize, message: &str) {
        if let Some(group) = self.groups.lock().get_mut(index).filter(|g| g.active) {
            group.text.push_str(message);
        }
    }

    /// Text of group `index`; empty for unknown groups
    pub fn text(&self, index: usize) -> String {
        self.groups.lock().get(index).map(|g| g.text.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_records_only_while_active() {
        let logs = GroupedLogs::new();
        logs.append(1, "dropped");
        assert_eq!(logs.text(1), "");
        assert!(!logs.is_active(1));

        logs.start(1);
        logs.append(1, "parse;");
        logs.append(1, "check;");
        logs.append(0, "other");
        logs.stop(1);
        logs.append(1, "late");
        assert_eq!(logs.text(1), "parse;check;");
        assert_eq!(logs.text(0), "");

        logs.start(1);
        assert!(logs.is_active(1));
        assert_eq!(logs.text(1), "");
    }
}
