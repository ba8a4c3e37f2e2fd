use serde::{Deserialize, Serialize};

/// Where a backup archive came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    environment: String,
    machine: String,
    hostname: String,
    version: String,
}

impl Origin {
    pub fn new(
        environment: impl Into<String>,
        machine: impl Into<String>,
        hostname: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            machine: machine.into(),
            hostname: hostname.into(),
            version: version.into(),
        }
    }

    /// Id of the backed-up environment.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Id of the machine that ran the backup.
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Host the backup ran on.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Software version that produced the backup.
    pub fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compared_by_value() {
        let a = Origin::new("env-uuid", "0", "localhost", "2.0.1");
        let b = Origin::new("env-uuid".to_string(), "0", "localhost", "2.0.1");
        assert_eq!(a, b);
        assert_ne!(a, Origin::new("env-uuid", "1", "localhost", "2.0.1"));
        assert_eq!(a.hostname(), "localhost");
        assert_eq!(a.version(), "2.0.1");
    }
}
