#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumIs,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    Running,
    Stopped,
    /// Observed dead while policy says restart; the watcher picks it up.
    Pending,
    /// Restart budget exhausted.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DaemonStatus::Running.to_string(), "running");
        assert_eq!(DaemonStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_predicates() {
        assert!(DaemonStatus::Running.is_running());
        assert!(DaemonStatus::Pending.is_pending());
        assert!(!DaemonStatus::Stopped.is_running());
    }
}
