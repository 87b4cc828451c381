//! Shared serde helpers for configuration files

/// Serialize a `Duration` as whole seconds
///
/// Poll intervals and timeouts read better as `poll_interval = 60` than as
/// a nested `{ secs, nanos }` table.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "tv_core::config::serde_utils::duration_secs")]
///     poll_interval: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Schedule {
        #[serde(with = "duration_secs")]
        poll_interval: Duration,
    }

    #[test]
    fn test_duration_secs_serialize() {
        let schedule = Schedule {
            poll_interval: Duration::from_secs(60),
        };
        let json = serde_json::to_string(&schedule).unwrap();
        assert_eq!(json, r#"{"poll_interval":60}"#);
    }

    #[test]
    fn test_duration_secs_deserialize_from_toml() {
        let schedule: Schedule = toml::from_str("poll_interval = 300").unwrap();
        assert_eq!(schedule.poll_interval, Duration::from_secs(300));
    }
}
