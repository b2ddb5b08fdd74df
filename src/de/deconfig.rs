use crate::api::{ConfigItem, ConfigValue};

/// This looks just like `ConfigValue` except it adds in the `Object` association. While the host
/// differentiates between values and children, for simplicity, we don't. It's kinda like JSON this
/// way.
#[derive(Debug, PartialEq, Clone)]
pub enum DeConfig<'a> {
    Number(f64),
    Boolean(bool),
    String(&'a str),
    Object(Vec<(&'a str, Vec<DeConfig<'a>>)>),
}

/// Since a configuration may repeat a key, we aggregate all instances of the same key under a
/// single key, keeping the order in which keys first appeared. Serde likes it this way. Won't run
/// into duplicate key errors.
pub fn from_items<'a>(s: &[ConfigItem<'a>]) -> Vec<(&'a str, Vec<DeConfig<'a>>)> {
    let mut props: Vec<(&'a str, Vec<DeConfig<'a>>)> = Vec::new();
    for item in s {
        let pos = match props.iter().position(|(key, _)| *key == item.key) {
            Some(pos) => pos,
            None => {
                props.push((item.key, Vec::new()));
                props.len() - 1
            }
        };

        let entry = &mut props[pos].1;
        entry.extend(item.values.iter().map(value_to_config));

        if !item.children.is_empty() {
            entry.push(DeConfig::Object(from_items(&item.children)));
        }
    }

    props
}

fn value_to_config<'a>(v: &ConfigValue<'a>) -> DeConfig<'a> {
    match *v {
        ConfigValue::Number(x) => DeConfig::Number(x),
        ConfigValue::Boolean(x) => DeConfig::Boolean(x),
        ConfigValue::String(x) => DeConfig::String(x),
    }
}
