use crate::api::{Sample, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match *self {
            Value::Integer(x) => serializer.serialize_i64(x),
            Value::Gauge(x) => serializer.serialize_f64(x),
            Value::Text(ref x) => serializer.serialize_str(x),
        }
    }
}

/// A sample serializes flat, the way a host writes it into its metric log: extra fields sit
/// alongside the metric name and value.
impl Serialize for Sample {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3 + self.extra_fields.len()))?;
        map.serialize_entry("metric", &self.name)?;
        map.serialize_entry("value", &self.value)?;
        map.serialize_entry("timestamp", &self.time.to_rfc3339())?;
        for (key, value) in &self.extra_fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
