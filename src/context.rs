//! Error context - the diagnostic envelope attached to every handled error.
//!
//! `ErrorContext` is a plain record, not an entity: it has no identity and is
//! copied freely into queue entries and reports. Every field is optional and
//! an absent field means "not applicable to this error kind", never
//! "unknown".
//!
//! # Freshness
//!
//! `timestamp`, `user_agent` and `url` belong to the handler. They are
//! rewritten by [`ErrorContext::enrich`] whenever an error is created or
//! handled, so caller-supplied values for these three fields never survive.
//!
//! # Wire Shape
//!
//! Serializes with camelCase keys and skips absent fields, so a transport
//! error context renders as
//!
//! ```json
//! {"timestamp":"2026-10-17T09:30:00.000Z","endpoint":"/api/invoices","method":"GET","originalError":"ECONNREFUSED"}
//! ```
//!
//! # Example
//!
//! ```rust
//! use quotefast_errors::ErrorContext;
//! use serde_json::json;
//!
//! let ctx = ErrorContext::new()
//!     .component("InvoiceTable")
//!     .action("export")
//!     .data("rows", json!(120));
//!
//! assert_eq!(ctx.component.as_deref(), Some("InvoiceTable"));
//! assert!(ctx.timestamp.is_none()); // stamped by the handler
//! ```

use crate::environment::Environment;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// User Identifier (Zeroized)
// ============================================================================

/// Identifier of the acting principal.
///
/// Cleared from memory when dropped. Queue snapshots clone contexts freely,
/// and every clone clears its own buffer. `Debug` redacts the value; use
/// [`as_str`](Self::as_str) or serialization to read it deliberately.
#[derive(Clone, PartialEq, Eq, Hash, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a principal identifier.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UserId").field(&"<REDACTED>").finish()
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Validation Errors (Insertion-Ordered)
// ============================================================================

/// Violation messages for a single field, in the order they were reported.
pub type FieldMessages = SmallVec<[String; 2]>;

/// Field name to ordered violation messages, preserving insertion order.
///
/// Forms rarely report more than a handful of fields, so entries live
/// inline up to four fields. Field order and message order are exactly what
/// the caller inserted; nothing here sorts.
///
/// Serializes as a JSON object whose key order follows insertion order.
/// Inserting an existing field appends to its messages instead of creating
/// a duplicate key. A field may carry an empty message list; it is kept as
/// given so the map round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: SmallVec<[(String, FieldMessages); 4]>,
}

impl ValidationErrors {
    /// Empty set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.insert(field, [message.into()]);
    }

    /// Record `field` with `messages`, even when `messages` is empty.
    ///
    /// An existing field keeps its position and gains the new messages.
    pub fn insert<M>(&mut self, field: impl Into<String>, messages: impl IntoIterator<Item = M>)
    where
        M: Into<String>,
    {
        let field = field.into();
        let incoming = messages.into_iter().map(Into::into);
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => existing.extend(incoming),
            None => self.fields.push((field, incoming.collect())),
        }
    }

    /// Builder form of [`add`](Self::add).
    #[inline]
    pub fn with(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add(field, message);
        self
    }

    /// Messages for `field`, if any were reported.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
    }

    /// Iterate `(field, messages)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(name, messages)| (name.as_str(), messages.as_slice()))
    }

    /// Every message across all fields, field by field.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flat_map(|(_, messages)| messages.iter().map(String::as_str))
    }

    /// Number of reported fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no field was reported.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<F, M, I> FromIterator<(F, I)> for ValidationErrors
where
    F: Into<String>,
    M: Into<String>,
    I: IntoIterator<Item = M>,
{
    fn from_iter<T: IntoIterator<Item = (F, I)>>(iter: T) -> Self {
        let mut errors = Self::new();
        for (field, messages) in iter {
            errors.insert(field, messages);
        }
        errors
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages.as_slice())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ValidationErrors {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ValidationErrors;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to lists of messages")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut errors = ValidationErrors::new();
                while let Some((field, messages)) = access.next_entry::<String, Vec<String>>()? {
                    errors.insert(field, messages);
                }
                Ok(errors)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

// ============================================================================
// Error Context
// ============================================================================

/// Structured diagnostic payload attached to every handled error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// UI component or module that observed the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Action in progress when the failure happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Acting principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Processing time, owned by the handler.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso_millis"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Host user agent, when running interactively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Current location, when running interactively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Request target, transport errors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Request method, transport errors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Message of the wrapped transport failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    /// Field violations, validation errors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<ValidationErrors>,
    /// Open-ended caller payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Map<String, Value>>,
}

impl ErrorContext {
    /// Empty context.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the originating component.
    #[inline]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Set the action in progress.
    #[inline]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Set the acting principal.
    #[inline]
    pub fn user(mut self, user: impl Into<UserId>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    /// Insert one key into `additional_data`, creating the map if needed.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Fill fields left empty here from `origin`.
    ///
    /// Values already set win. `additional_data` is merged key by key under
    /// the same rule. Handler-owned fields are not touched.
    pub fn inherit(&mut self, origin: &ErrorContext) {
        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }

        fill(&mut self.component, &origin.component);
        fill(&mut self.action, &origin.action);
        fill(&mut self.user_id, &origin.user_id);
        fill(&mut self.endpoint, &origin.endpoint);
        fill(&mut self.method, &origin.method);
        fill(&mut self.original_error, &origin.original_error);
        fill(&mut self.validation_errors, &origin.validation_errors);

        if let Some(from) = &origin.additional_data {
            let data = self.additional_data.get_or_insert_with(Map::new);
            for (key, value) in from {
                data.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    /// Stamp the handler-owned fields from `env`.
    ///
    /// Always overwrites: a field the environment cannot supply is cleared
    /// rather than left at a caller-supplied value.
    pub fn enrich(&mut self, env: &dyn Environment) {
        self.timestamp = Some(Utc::now());
        self.user_agent = env.user_agent();
        self.url = env.current_url();
    }

    /// Builder form of [`enrich`](Self::enrich).
    #[inline]
    pub fn enriched(mut self, env: &dyn Environment) -> Self {
        self.enrich(env);
        self
    }

    /// ISO-8601 rendering of the timestamp with millisecond precision.
    pub fn timestamp_iso(&self) -> Option<String> {
        self.timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// `Option<DateTime<Utc>>` as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
