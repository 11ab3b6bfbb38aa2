use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Three-way optional: a wire field that is absent, explicitly `null`, or set.
///
/// JSON cannot distinguish "absent" from "null" through `Option` alone, and a
/// handful of chat-completion fields (`seed`, `tool_choice`,
/// `stream_options`) carry meaning in that difference. Pair with
/// `#[serde(default, skip_serializing_if = "Setting::is_unset")]`: an absent
/// field deserializes to `Unset`, a literal `null` to `Null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Setting<T> {
    #[default]
    Unset,
    Null,
    Value(T),
}

impl<T> Setting<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Setting::Unset)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Setting::Null)
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Setting::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Setting::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Setting<U> {
        match self {
            Setting::Unset => Setting::Unset,
            Setting::Null => Setting::Null,
            Setting::Value(v) => Setting::Value(f(v)),
        }
    }
}

impl<T> From<Option<T>> for Setting<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Setting::Value(v),
            None => Setting::Null,
        }
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Unset is normally skipped at the field level; if it does get
            // serialized it degrades to null.
            Setting::Unset | Setting::Null => serializer.serialize_none(),
            Setting::Value(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Setting::Value(v),
            None => Setting::Null,
        })
    }
}
