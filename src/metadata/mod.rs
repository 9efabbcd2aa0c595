//! Modelo de datos de la metadata extraída: mapas planos con valores heterogéneos.

mod value;

pub use value::MetadataValue;

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Mapa clave → valor producido por una o varias fuentes.
///
/// Las claves son cadenas opacas con el prefijo de la fuente que las emitió. El orden
/// de presentación siempre es lexicográfico por clave cruda.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataMap {
    entries: BTreeMap<String, MetadataValue>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta o reemplaza una clave dentro de la misma fuente.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Option<MetadataValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Inserta solo cuando hay valor.
    pub fn insert_some<V: Into<MetadataValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Inserta solo cuando el texto no está vacío tras recortar espacios.
    pub fn insert_text(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let trimmed = value.as_ref().trim();
        if !trimmed.is_empty() {
            self.insert(key, trimmed);
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, MetadataValue> {
        self.entries.iter()
    }

    /// Une el resultado de otra fuente.
    ///
    /// Una clave que ya existe no se sobrescribe: el valor entrante se guarda como
    /// `<clave>_2`, `<clave>_3`, … para que ninguna fuente oculte a otra.
    pub fn merge(&mut self, other: MetadataMap) {
        for (key, value) in other.entries {
            if !self.entries.contains_key(&key) {
                self.entries.insert(key, value);
                continue;
            }

            let mut suffix = 2;
            let renamed = loop {
                let candidate = format!("{key}_{suffix}");
                if !self.entries.contains_key(&candidate) {
                    break candidate;
                }
                suffix += 1;
            };
            tracing::debug!(key = %key, renamed = %renamed, "clave duplicada entre fuentes");
            self.entries.insert(renamed, value);
        }
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for MetadataMap {
    type Item = (String, MetadataValue);
    type IntoIter = btree_map::IntoIter<String, MetadataValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a MetadataMap {
    type Item = (&'a String, &'a MetadataValue);
    type IntoIter = btree_map::Iter<'a, String, MetadataValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for MetadataMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_both_values_on_collision() {
        let mut aggregate = MetadataMap::new();
        aggregate.insert("bitrate", 320_u32);

        let mut incoming = MetadataMap::new();
        incoming.insert("bitrate", 318_u32);
        incoming.insert("channels", 2_u32);
        aggregate.merge(incoming);

        assert_eq!(aggregate.get("bitrate"), Some(&MetadataValue::Integer(320)));
        assert_eq!(aggregate.get("bitrate_2"), Some(&MetadataValue::Integer(318)));
        assert_eq!(aggregate.get("channels"), Some(&MetadataValue::Integer(2)));
    }

    #[test]
    fn merge_picks_next_free_suffix() {
        let mut aggregate: MetadataMap =
            [("note", "a"), ("note_2", "b")].into_iter().collect();
        aggregate.merge([("note", "c")].into_iter().collect());

        assert_eq!(aggregate.get("note_3").and_then(MetadataValue::as_text), Some("c"));
        assert_eq!(aggregate.len(), 3);
    }

    #[test]
    fn insert_within_a_source_overwrites() {
        let mut map = MetadataMap::new();
        map.insert("title", "old");
        map.insert("title", "new");
        assert_eq!(map.get("title").and_then(MetadataValue::as_text), Some("new"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_text_skips_blank_values() {
        let mut map = MetadataMap::new();
        map.insert_text("pdf_title", "   ");
        map.insert_text("pdf_author", "  Ana  ");
        assert!(!map.contains_key("pdf_title"));
        assert_eq!(map.get("pdf_author").and_then(MetadataValue::as_text), Some("Ana"));
    }
}
