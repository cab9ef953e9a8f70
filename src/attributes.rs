use std::collections::{BTreeMap, btree_map};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{ContextValue, StaticCowStr};

/// An ordered set of context attributes.
///
/// Keys are unique and kept sorted, so serialized output is deterministic.
#[derive(Clone, Default, Debug)]
pub struct Attributes(BTreeMap<StaticCowStr, ContextValue>);

impl Attributes {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts an attribute, returning the value it replaced.
    pub fn insert(
        &mut self,
        key: impl Into<StaticCowStr>,
        value: impl Into<ContextValue>,
    ) -> Option<ContextValue> {
        self.0.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, StaticCowStr, ContextValue> {
        self.0.iter()
    }

    /// Overlays `other` on top of these attributes; keys present in both take
    /// the value from `other`.
    pub fn merge(&mut self, other: impl IntoAttributes) {
        self.0.extend(other.into_attributes().0);
    }

    /// Renders the attributes as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = (&'a StaticCowStr, &'a ContextValue);
    type IntoIter = btree_map::Iter<'a, StaticCowStr, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Attributes {
    type Item = (StaticCowStr, ContextValue);
    type IntoIter = btree_map::IntoIter<StaticCowStr, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K, V> Extend<(K, V)> for Attributes
where
    K: Into<StaticCowStr>,
    V: Into<ContextValue>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<StaticCowStr>,
    V: Into<ContextValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attributes = Self::new();
        attributes.extend(iter);
        attributes
    }
}

impl Serialize for Attributes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(&**key, value)?;
        }
        map.end()
    }
}

impl log::kv::Source for Attributes {
    fn visit<'kvs>(
        &'kvs self,
        visitor: &mut dyn log::kv::VisitSource<'kvs>,
    ) -> Result<(), log::kv::Error> {
        for (key, value) in self {
            visitor.visit_pair(log::kv::Key::from_str(key), value.as_log_value())?;
        }
        Ok(())
    }
}

/// Conversion into a set of attributes.
///
/// Used for call-site extras on the logger and for request extractors, so
/// both accept `()`, an [`Attributes`] value or a list of key/value pairs.
pub trait IntoAttributes {
    fn into_attributes(self) -> Attributes;
}

impl IntoAttributes for Attributes {
    fn into_attributes(self) -> Attributes {
        self
    }
}

impl IntoAttributes for () {
    fn into_attributes(self) -> Attributes {
        Attributes::new()
    }
}

impl<A> IntoAttributes for Option<A>
where
    A: IntoAttributes,
{
    fn into_attributes(self) -> Attributes {
        self.map(IntoAttributes::into_attributes).unwrap_or_default()
    }
}

impl<K, V, const N: usize> IntoAttributes for [(K, V); N]
where
    K: Into<StaticCowStr>,
    V: Into<ContextValue>,
{
    fn into_attributes(self) -> Attributes {
        self.into_iter().collect()
    }
}

impl<K, V> IntoAttributes for Vec<(K, V)>
where
    K: Into<StaticCowStr>,
    V: Into<ContextValue>,
{
    fn into_attributes(self) -> Attributes {
        self.into_iter().collect()
    }
}
