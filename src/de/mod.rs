//! Deserializes a monitor's `ConfigItem`s into a typed configuration struct.
//!
//! Field semantics follow serde: a plain field is required, an `Option` field is optional and
//! `#[serde(default = "...")]` supplies a default. Keys the struct doesn't know about (like the
//! host's `module` key) are ignored.
//!
//! Host configuration files are hand written, so scalar types are coerced the way an operator
//! would expect: a number is accepted where a string is expected (`"port": 8080` into a
//! `String`), a numeric string is accepted where a number is expected (`"interval": "30"` into
//! a `u64`) and `"true"` / `"false"` are accepted as booleans.
mod deconfig;
mod errors;
mod level;
pub use self::errors::*;

use self::deconfig::{from_items, DeConfig};
use crate::api::ConfigItem;
use serde::de::value::{BorrowedStrDeserializer, SeqDeserializer};
use serde::de::{self, Deserialize, DeserializeSeed, IntoDeserializer, MapAccess, Visitor};
use serde::forward_to_deserialize_any;
use std::vec;

/// Serde documentation shadows the std's Result type which can be really confusing for Rust
/// newcomers, so we compromise by creating an alias but prefixing with "De" to make it standout.
pub type DeResult<T> = Result<T, Error>;

pub fn from_config<'a, T>(s: &[ConfigItem<'a>]) -> DeResult<T>
where
    T: Deserialize<'a>,
{
    T::deserialize(StructDeserializer {
        props: from_items(s),
    })
}

/// Deserializes the top level (or a nested) block of keys as a struct or map.
struct StructDeserializer<'de> {
    props: Vec<(&'de str, Vec<DeConfig<'de>>)>,
}

impl<'de> de::Deserializer<'de> for StructDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(FieldSeparated::new(self.props))
    }

    fn deserialize_option<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes byte_buf unit
        unit_struct seq tuple tuple_struct map struct enum identifier ignored_any
    }
}

struct FieldSeparated<'de> {
    fields: vec::IntoIter<(&'de str, Vec<DeConfig<'de>>)>,
    current: Option<(&'de str, Vec<DeConfig<'de>>)>,
}

impl<'de> FieldSeparated<'de> {
    fn new(props: Vec<(&'de str, Vec<DeConfig<'de>>)>) -> Self {
        FieldSeparated {
            fields: props.into_iter(),
            current: None,
        }
    }
}

impl<'de> MapAccess<'de> for FieldSeparated<'de> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> DeResult<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.fields.next() {
            Some((key, values)) => {
                self.current = Some((key, values));
                seed.deserialize(BorrowedStrDeserializer::new(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> DeResult<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        match self.current.take() {
            Some((key, values)) => seed.deserialize(ItemDeserializer { key, values }),
            None => Err(de::Error::custom("value requested before key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.fields.len())
    }
}

/// All the values found for one key. A single value deserializes as a scalar, several values
/// (or a `Vec` field) as a sequence.
struct ItemDeserializer<'de> {
    key: &'de str,
    values: Vec<DeConfig<'de>>,
}

impl<'de> ItemDeserializer<'de> {
    fn single(mut self) -> DeResult<ValueDeserializer<'de>> {
        if self.values.len() != 1 {
            return Err(Error(DeError::ExpectSingleValue(self.key.to_owned())));
        }

        match self.values.pop() {
            Some(v) => Ok(ValueDeserializer(v)),
            None => Err(Error(DeError::ExpectSingleValue(self.key.to_owned()))),
        }
    }
}

macro_rules! forward_to_single {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> DeResult<V::Value>
            where
                V: Visitor<'de>,
            {
                de::Deserializer::$method(self.single()?, visitor)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ItemDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.values.len() == 1 {
            de::Deserializer::deserialize_any(self.single()?, visitor)
        } else {
            self.deserialize_seq(visitor)
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut seq = SeqDeserializer::new(self.values.into_iter());
        let value = visitor.visit_seq(&mut seq)?;
        seq.end()?;
        Ok(value)
    }

    fn deserialize_option<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_struct(self.single()?, name, fields, visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_enum(self.single()?, name, variants, visitor)
    }

    forward_to_single! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_f32
        deserialize_f64 deserialize_char deserialize_str deserialize_string deserialize_map
        deserialize_identifier
    }

    forward_to_deserialize_any! {
        bytes byte_buf unit unit_struct tuple tuple_struct ignored_any
    }
}

/// A single configuration value
pub struct ValueDeserializer<'de>(DeConfig<'de>);

impl<'de> IntoDeserializer<'de, Error> for DeConfig<'de> {
    type Deserializer = ValueDeserializer<'de>;

    fn into_deserializer(self) -> Self::Deserializer {
        ValueDeserializer(self)
    }
}

/// Renders a number the way it was most likely written in the configuration file
fn number_to_string(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

impl<'de> ValueDeserializer<'de> {
    fn grab_number(&self) -> DeResult<f64> {
        match self.0 {
            DeConfig::Number(x) => Ok(x),
            DeConfig::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error(DeError::ExpectNumber)),
            _ => Err(Error(DeError::ExpectNumber)),
        }
    }
}

fn visit_integer<'de, V>(x: f64, visitor: V) -> DeResult<V::Value>
where
    V: Visitor<'de>,
{
    if x.fract() != 0.0 || !x.is_finite() {
        return Err(Error(DeError::ExpectInteger(x)));
    }

    if x < 0.0 {
        visitor.visit_i64(x as i64)
    } else {
        visitor.visit_u64(x as u64)
    }
}

macro_rules! integer_methods {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> DeResult<V::Value>
            where
                V: Visitor<'de>,
            {
                visit_integer(self.grab_number()?, visitor)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            DeConfig::Number(x) if x.fract() == 0.0 && x.abs() < 1e15 => visit_integer(x, visitor),
            DeConfig::Number(x) => visitor.visit_f64(x),
            DeConfig::Boolean(x) => visitor.visit_bool(x),
            DeConfig::String(x) => visitor.visit_borrowed_str(x),
            DeConfig::Object(props) => visitor.visit_map(FieldSeparated::new(props)),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            DeConfig::Boolean(x) => visitor.visit_bool(x),
            DeConfig::String(s) if s.eq_ignore_ascii_case("true") => visitor.visit_bool(true),
            DeConfig::String(s) if s.eq_ignore_ascii_case("false") => visitor.visit_bool(false),
            _ => Err(Error(DeError::ExpectBoolean)),
        }
    }

    integer_methods! {
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
    }

    fn deserialize_f32<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        self.grab_number().and_then(|x| visitor.visit_f32(x as f32))
    }

    fn deserialize_f64<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        self.grab_number().and_then(|x| visitor.visit_f64(x))
    }

    fn deserialize_str<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            DeConfig::String(x) => visitor.visit_borrowed_str(x),
            DeConfig::Number(x) => visitor.visit_string(number_to_string(x)),
            DeConfig::Boolean(x) => visitor.visit_string(x.to_string()),
            DeConfig::Object(_) => Err(Error(DeError::ExpectString)),
        }
    }

    fn deserialize_string<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_char<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        if let DeConfig::String(x) = self.0 {
            let mut chars = x.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => visitor.visit_char(c),
                _ => Err(Error(DeError::ExpectChar(String::from(x)))),
            }
        } else {
            Err(Error(DeError::ExpectString))
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_map<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            DeConfig::Object(props) => visitor.visit_map(FieldSeparated::new(props)),
            _ => Err(Error(DeError::ExpectObject)),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        // Only unit variants can be written in a configuration file, e.g. "log_level": "warn"
        if let DeConfig::String(x) = self.0 {
            visitor.visit_enum(BorrowedStrDeserializer::new(x))
        } else {
            Err(Error(DeError::ExpectString))
        }
    }

    fn deserialize_identifier<V>(self, visitor: V) -> DeResult<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    forward_to_deserialize_any! {
        bytes byte_buf unit unit_struct seq tuple tuple_struct ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ConfigValue, LogLevel};
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_serde_simple_bool() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            my_bool: bool,
        }

        let items = vec![ConfigItem::new("my_bool", vec![ConfigValue::Boolean(true)])];
        let actual = from_config(&items).unwrap();
        assert_eq!(MyStruct { my_bool: true }, actual);
    }

    #[test]
    fn test_serde_empty_bool() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            my_bool: Option<bool>,
        }

        let actual = from_config(Default::default()).unwrap();
        assert_eq!(MyStruct { my_bool: None }, actual);
    }

    #[test]
    fn test_serde_required_missing() {
        #[derive(Deserialize, Debug)]
        #[allow(dead_code)]
        struct MyStruct {
            base_url: String,
        }

        let err = from_config::<MyStruct>(Default::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error from deserialization: missing field `base_url`"
        );
    }

    #[test]
    fn test_serde_default() {
        fn default_path() -> String {
            String::from("/opt/vc/bin/vcgencmd")
        }

        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            #[serde(default = "default_path")]
            vcgencmd_path: String,
        }

        let actual = from_config(Default::default()).unwrap();
        assert_eq!(
            MyStruct {
                vcgencmd_path: String::from("/opt/vc/bin/vcgencmd"),
            },
            actual
        );
    }

    #[test]
    fn test_serde_simple_number() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            my_int: i8,
            my_uint: u64,
        }

        let items = vec![
            ConfigItem::new("my_int", vec![ConfigValue::Number(-1.0)]),
            ConfigItem::new("my_uint", vec![ConfigValue::Number(30.0)]),
        ];
        let actual = from_config(&items).unwrap();
        assert_eq!(
            MyStruct {
                my_int: -1,
                my_uint: 30,
            },
            actual
        );
    }

    #[test]
    fn test_serde_fractional_integer() {
        #[derive(Deserialize, Debug)]
        #[allow(dead_code)]
        struct MyStruct {
            interval: u32,
        }

        let items = vec![ConfigItem::new("interval", vec![ConfigValue::Number(2.5)])];
        let err = from_config::<MyStruct>(&items).unwrap_err();
        assert_eq!(err, Error(DeError::ExpectInteger(2.5)));
    }

    #[test]
    fn test_serde_out_of_range() {
        #[derive(Deserialize, Debug)]
        #[allow(dead_code)]
        struct MyStruct {
            small: u8,
        }

        let items = vec![ConfigItem::new("small", vec![ConfigValue::Number(300.0)])];
        assert!(from_config::<MyStruct>(&items).is_err());
    }

    #[test]
    fn test_serde_coerce_scalars() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            interval: u64,
            ratio: f64,
            port: String,
            enabled: bool,
        }

        let items = vec![
            ConfigItem::new("interval", vec![ConfigValue::String("30")]),
            ConfigItem::new("ratio", vec![ConfigValue::String(" 0.5 ")]),
            ConfigItem::new("port", vec![ConfigValue::Number(8080.0)]),
            ConfigItem::new("enabled", vec![ConfigValue::String("True")]),
        ];
        let actual = from_config(&items).unwrap();
        assert_eq!(
            MyStruct {
                interval: 30,
                ratio: 0.5,
                port: String::from("8080"),
                enabled: true,
            },
            actual
        );
    }

    #[test]
    fn test_serde_not_a_number() {
        #[derive(Deserialize, Debug)]
        #[allow(dead_code)]
        struct MyStruct {
            interval: u64,
        }

        let items = vec![ConfigItem::new("interval", vec![ConfigValue::String("soon")])];
        let err = from_config::<MyStruct>(&items).unwrap_err();
        assert_eq!(err, Error(DeError::ExpectNumber));
    }

    #[test]
    fn test_serde_simple_str() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct<'a> {
            my_string: &'a str,
        }

        let items = vec![ConfigItem::new("my_string", vec![ConfigValue::String("HEY")])];
        let actual = from_config(&items).unwrap();
        assert_eq!(MyStruct { my_string: "HEY" }, actual);
    }

    #[test]
    fn test_serde_char() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            separator: char,
        }

        let items = vec![ConfigItem::new("separator", vec![ConfigValue::String(":")])];
        let actual = from_config(&items).unwrap();
        assert_eq!(MyStruct { separator: ':' }, actual);

        let items = vec![ConfigItem::new("separator", vec![ConfigValue::String("::")])];
        assert!(from_config::<MyStruct>(&items).is_err());
    }

    #[test]
    fn test_serde_vec() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            hosts: Vec<String>,
            single: Vec<String>,
        }

        let items = vec![
            ConfigItem::new(
                "hosts",
                vec![ConfigValue::String("a"), ConfigValue::String("b")],
            ),
            ConfigItem::new("single", vec![ConfigValue::String("c")]),
        ];
        let actual = from_config(&items).unwrap();
        assert_eq!(
            MyStruct {
                hosts: vec![String::from("a"), String::from("b")],
                single: vec![String::from("c")],
            },
            actual
        );
    }

    #[test]
    fn test_value_into_deserializer() {
        let port = u16::deserialize(DeConfig::String("8080").into_deserializer()).unwrap();
        assert_eq!(port, 8080);

        let values = vec![DeConfig::Number(1.0), DeConfig::Number(2.0)];
        let seq = SeqDeserializer::<_, Error>::new(values.into_iter());
        let actual: Vec<u8> = Vec::deserialize(seq).unwrap();
        assert_eq!(actual, vec![1, 2]);
    }

    #[test]
    fn test_serde_multiple_values_for_scalar() {
        #[derive(Deserialize, Debug)]
        #[allow(dead_code)]
        struct MyStruct {
            host: String,
        }

        let items = vec![ConfigItem::new(
            "host",
            vec![ConfigValue::String("a"), ConfigValue::String("b")],
        )];
        let err = from_config::<MyStruct>(&items).unwrap_err();
        assert_eq!(err, Error(DeError::ExpectSingleValue(String::from("host"))));
    }

    #[test]
    fn test_serde_nested_struct() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct Auth {
            user: String,
            password: Option<String>,
        }

        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            auth: Auth,
        }

        let raw = json!({ "auth": { "user": "pi" } });
        let items = ConfigItem::from_json(&raw).unwrap();
        let actual = from_config(&items).unwrap();
        assert_eq!(
            MyStruct {
                auth: Auth {
                    user: String::from("pi"),
                    password: None,
                },
            },
            actual
        );
    }

    #[test]
    fn test_serde_log_level() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            log_level: LogLevel,
        }

        let items = vec![ConfigItem::new("log_level", vec![ConfigValue::String("warn")])];
        let actual = from_config(&items).unwrap();
        assert_eq!(
            MyStruct {
                log_level: LogLevel::Warning,
            },
            actual
        );
    }

    #[test]
    fn test_serde_unit_enum() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        #[serde(rename_all = "lowercase")]
        enum Method {
            Icmp,
            Udp,
        }

        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct MyStruct {
            method: Method,
        }

        let items = vec![ConfigItem::new("method", vec![ConfigValue::String("udp")])];
        let actual = from_config(&items).unwrap();
        assert_eq!(
            MyStruct {
                method: Method::Udp,
            },
            actual
        );
    }

    #[test]
    fn test_serde_host_config_ignores_unknown() {
        #[derive(Deserialize, PartialEq, Eq, Debug)]
        struct OctoConfig {
            base_url: String,
            api_key: String,
        }

        let raw = json!({
            "module": "octoprint_monitor",
            "base_url": "http://octopi.local/",
            "api_key": "valid",
            "sample_interval": 60,
        });
        let items = ConfigItem::from_json(&raw).unwrap();
        let actual = from_config(&items).unwrap();
        assert_eq!(
            OctoConfig {
                base_url: String::from("http://octopi.local/"),
                api_key: String::from("valid"),
            },
            actual
        );
    }

    #[test]
    fn test_serde_map() {
        use std::collections::BTreeMap;

        let items = vec![
            ConfigItem::new("a", vec![ConfigValue::Number(1.0)]),
            ConfigItem::new("b", vec![ConfigValue::Number(2.0)]),
        ];
        let actual: BTreeMap<String, u32> = from_config(&items).unwrap();
        assert_eq!(actual.get("a"), Some(&1));
        assert_eq!(actual.get("b"), Some(&2));
    }
}
