use crate::errors::ConfigError;
use serde_json::Value as JsonValue;

/// A single scalar from a monitor's configuration block.
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigValue<'a> {
    Number(f64),
    Boolean(bool),
    String(&'a str),
}

/// A configuration key with its values. Nested objects are kept as children so monitors can
/// group related options.
#[derive(Debug, PartialEq, Clone)]
pub struct ConfigItem<'a> {
    pub key: &'a str,
    pub values: Vec<ConfigValue<'a>>,
    pub children: Vec<ConfigItem<'a>>,
}

impl<'a> ConfigValue<'a> {
    fn from_json(key: &str, value: &'a JsonValue) -> Result<Option<ConfigValue<'a>>, ConfigError> {
        match *value {
            JsonValue::Null => Ok(None),
            JsonValue::Bool(b) => Ok(Some(ConfigValue::Boolean(b))),
            JsonValue::String(ref s) => Ok(Some(ConfigValue::String(s.as_str()))),
            JsonValue::Number(ref n) => n
                .as_f64()
                .map(|x| Some(ConfigValue::Number(x)))
                .ok_or_else(|| ConfigError::UnsupportedValue(key.to_owned())),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Err(ConfigError::UnsupportedValue(key.to_owned()))
            }
        }
    }
}

impl<'a> ConfigItem<'a> {
    pub fn new(key: &'a str, values: Vec<ConfigValue<'a>>) -> ConfigItem<'a> {
        ConfigItem {
            key,
            values,
            children: Vec::new(),
        }
    }

    /// Converts the JSON object the host keeps for a monitor (`{"module": ..., "base_url": ...}`)
    /// into configuration items. Arrays become multiple values under one key, objects become
    /// children and nulls are treated as if the key was absent.
    pub fn from_json(config: &'a JsonValue) -> Result<Vec<ConfigItem<'a>>, ConfigError> {
        let map = config.as_object().ok_or(ConfigError::NotAnObject)?;
        let mut items = Vec::with_capacity(map.len());
        for (key, value) in map {
            let key = key.as_str();
            let item = match *value {
                JsonValue::Object(_) => ConfigItem {
                    key,
                    values: Vec::new(),
                    children: ConfigItem::from_json(value)?,
                },
                JsonValue::Array(ref arr) => {
                    let mut values = Vec::with_capacity(arr.len());
                    for x in arr {
                        values.extend(ConfigValue::from_json(key, x)?);
                    }
                    ConfigItem::new(key, values)
                }
                _ => ConfigItem::new(key, ConfigValue::from_json(key, value)?.into_iter().collect()),
            };

            if !item.values.is_empty() || !item.children.is_empty() {
                items.push(item);
            }
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        let raw = json!({
            "base_url": "http://octopi.local/",
            "sample_write_interval": 30,
            "enabled": true,
            "label": null,
        });

        let items = ConfigItem::from_json(&raw).unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.contains(&ConfigItem::new(
            "base_url",
            vec![ConfigValue::String("http://octopi.local/")]
        )));
        assert!(items.contains(&ConfigItem::new(
            "sample_write_interval",
            vec![ConfigValue::Number(30.0)]
        )));
        assert!(items.contains(&ConfigItem::new("enabled", vec![ConfigValue::Boolean(true)])));
    }

    #[test]
    fn test_from_json_array_and_object() {
        let raw = json!({
            "hosts": ["a", "b"],
            "auth": { "user": "pi" },
        });

        let items = ConfigItem::from_json(&raw).unwrap();
        let hosts = items.iter().find(|x| x.key == "hosts").unwrap();
        assert_eq!(
            hosts.values,
            vec![ConfigValue::String("a"), ConfigValue::String("b")]
        );

        let auth = items.iter().find(|x| x.key == "auth").unwrap();
        assert!(auth.values.is_empty());
        assert_eq!(
            auth.children,
            vec![ConfigItem::new("user", vec![ConfigValue::String("pi")])]
        );
    }

    #[test]
    fn test_from_json_not_object() {
        let raw = json!(["base_url"]);
        assert!(matches!(
            ConfigItem::from_json(&raw),
            Err(ConfigError::NotAnObject)
        ));
    }

    #[test]
    fn test_from_json_nested_array() {
        let raw = json!({ "matrix": [[1, 2]] });
        assert!(matches!(
            ConfigItem::from_json(&raw),
            Err(ConfigError::UnsupportedValue(ref k)) if k == "matrix"
        ));
    }
}
