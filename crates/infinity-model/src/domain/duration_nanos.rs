//! [`Duration`] on the wire as an integer count of nanoseconds.
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_nanos)
}
