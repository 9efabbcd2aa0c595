//! Valores heterogéneos que puede producir una fuente de metadata.

use super::MetadataMap;
use serde::ser::{Serialize, Serializer};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Map(MetadataMap),
    List(Vec<MetadataValue>),
    Bytes(Vec<u8>),
    Null,
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MetadataMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Construye una lista de texto a partir de cualquier colección de cadenas.
    pub fn text_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|item| Self::Text(item.into())).collect())
    }
}

/// Forma textual por defecto; el renderizador solo la reemplaza para mapas anidados.
impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{value}"),
            // Los enteros exactos conservan un decimal: `0.0`, no `0`.
            Self::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (index, (key, value)) in map.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Bytes(bytes) => write!(f, "<binary data: {} bytes>", bytes.len()),
            Self::Null => f.write_str("N/A"),
        }
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(value) => serializer.serialize_str(value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Map(map) => map.serialize(serializer),
            Self::List(items) => items.serialize(serializer),
            Self::Bytes(_) => serializer.serialize_str(&self.to_string()),
            Self::Null => serializer.serialize_none(),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&String> for MetadataValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for MetadataValue {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

macro_rules! integer_from {
    ($($kind:ty),*) => {
        $(
            impl From<$kind> for MetadataValue {
                fn from(value: $kind) -> Self {
                    Self::Integer(value as i64)
                }
            }
        )*
    };
}

integer_from!(i8, i16, i32, i64, u8, u16, u32);

// Los enteros sin signo anchos pueden desbordar i64; en ese caso se guardan como texto.
macro_rules! wide_integer_from {
    ($($kind:ty),*) => {
        $(
            impl From<$kind> for MetadataValue {
                fn from(value: $kind) -> Self {
                    match i64::try_from(value) {
                        Ok(value) => Self::Integer(value),
                        Err(_) => Self::Text(value.to_string()),
                    }
                }
            }
        )*
    };
}

wide_integer_from!(u64, usize);

impl From<MetadataMap> for MetadataValue {
    fn from(value: MetadataMap) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}
