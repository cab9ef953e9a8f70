use std::{borrow::Cow, fmt, sync::Arc};

use serde::ser::{Serialize, Serializer};

/// A single attribute value stored in a [`ScopedStore`](crate::ScopedStore).
///
/// Values are reference counted, so cloning one out of a store snapshot does
/// not copy the underlying data.
#[derive(Clone)]
pub struct ContextValue(ContextValueInner);

#[derive(Clone)]
enum ContextValueInner {
    Null,
    String(Cow<'static, str>),
    Debug(Arc<dyn fmt::Debug + Send + Sync + 'static>),
    Display(Arc<dyn fmt::Display + Send + Sync + 'static>),
    Error(Arc<dyn std::error::Error + Send + Sync + 'static>),
    Serde(Arc<dyn erased_serde::Serialize + Send + Sync + 'static>),
}

impl From<ContextValueInner> for ContextValue {
    fn from(inner: ContextValueInner) -> Self {
        Self(inner)
    }
}

impl ContextValue {
    #[must_use]
    pub const fn null() -> Self {
        Self(ContextValueInner::Null)
    }

    pub fn serde<S>(value: S) -> Self
    where
        S: serde::Serialize + Send + Sync + 'static,
    {
        ContextValueInner::Serde(Arc::new(value)).into()
    }

    pub fn display<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        ContextValueInner::Display(Arc::new(value)).into()
    }

    pub fn debug<T>(value: T) -> Self
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        ContextValueInner::Debug(Arc::new(value)).into()
    }

    pub fn error<T>(value: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        ContextValueInner::Error(Arc::new(value)).into()
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self.0, ContextValueInner::Null)
    }

    /// Returns the string slice if this value was recorded as a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            ContextValueInner::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_log_value(&self) -> log::kv::Value<'_> {
        match &self.0 {
            ContextValueInner::Null => log::kv::Value::null(),
            ContextValueInner::String(s) => log::kv::Value::from(&**s),
            ContextValueInner::Display(value) => log::kv::Value::from_dyn_display(&**value),
            ContextValueInner::Debug(value) => log::kv::Value::from_dyn_debug(&**value),
            ContextValueInner::Error(value) => log::kv::Value::from_dyn_error(&**value),
            ContextValueInner::Serde(_) => log::kv::Value::from_serde(self),
        }
    }

    /// Renders the value as JSON.
    ///
    /// Values that fail to serialize become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ContextValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.0 {
            ContextValueInner::Null => serializer.serialize_unit(),
            ContextValueInner::String(s) => serializer.serialize_str(s),
            ContextValueInner::Display(value) => serializer.collect_str(value),
            ContextValueInner::Debug(value) => serializer.collect_str(&format_args!("{value:?}")),
            ContextValueInner::Error(value) => serializer.collect_str(value),
            ContextValueInner::Serde(value) => erased_serde::serialize(&**value, serializer),
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ContextValueInner::Null => f.write_str("null"),
            ContextValueInner::String(s) => f.write_str(s),
            ContextValueInner::Display(value) => fmt::Display::fmt(value, f),
            ContextValueInner::Debug(value) => write!(f, "{value:?}"),
            ContextValueInner::Error(value) => fmt::Display::fmt(value, f),
            ContextValueInner::Serde(_) => match self.to_json() {
                serde_json::Value::String(s) => f.write_str(&s),
                other => fmt::Display::fmt(&other, f),
            },
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ContextValueInner::Null => f.write_str("Null"),
            ContextValueInner::String(s) => f.debug_tuple("String").field(s).finish(),
            ContextValueInner::Debug(value) => f.debug_tuple("Debug").field(value).finish(),
            ContextValueInner::Display(value) => {
                f.debug_tuple("Display").field(&format_args!("{value}")).finish()
            }
            ContextValueInner::Error(value) => {
                f.debug_tuple("Error").field(&format_args!("{value}")).finish()
            }
            ContextValueInner::Serde(_) => f.debug_tuple("Serde").field(&self.to_json()).finish(),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self(ContextValueInner::String(Cow::Owned(value.to_owned())))
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self(ContextValueInner::String(Cow::Owned(value)))
    }
}

impl From<Cow<'static, str>> for ContextValue {
    fn from(value: Cow<'static, str>) -> Self {
        Self(ContextValueInner::String(value))
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::null(),
            serde_json::Value::String(s) => s.into(),
            other => Self::serde(other),
        }
    }
}

impl<T> From<Option<T>> for ContextValue
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ContextValue {
                fn from(value: $ty) -> Self {
                    Self::serde(value)
                }
            }
        )*
    };
}

impl_from_primitive!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);
