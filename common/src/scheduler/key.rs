// Task keys and the generator that hands them out

use std::fmt;
use uuid::Uuid;

/// Opaque identifier returned by `go` and accepted by `cancel`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for TaskKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of collision-free task keys for one scheduler instance
pub trait KeyGenerator: Send + Sync {
    fn next_key(&self) -> TaskKey;
}

/// Random UUID v4 keys
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn next_key(&self) -> TaskKey {
        TaskKey(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_keys_are_distinct() {
        let generator = UuidKeyGenerator;
        let keys: HashSet<TaskKey> = (0..1000).map(|_| generator.next_key()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_uuid_key_parses_back() {
        let key = UuidKeyGenerator.next_key();
        assert!(Uuid::parse_str(key.as_str()).is_ok());
    }

    #[test]
    fn test_display_is_raw_value() {
        let key = TaskKey::from("job-1");
        assert_eq!(key.to_string(), "job-1");
        assert_eq!(key.as_ref(), "job-1");
    }
}
