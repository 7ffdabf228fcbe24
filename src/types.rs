use std::collections::BTreeMap;

use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::stack::SubjectStack;
use crate::subject::Subject;

/// Versioned metadata describing the subject of a persisted stack.
///
/// `declared_type` is captured from the subject type when the descriptor is
/// built and cannot be changed afterwards. Extras are attached with
/// [`with_extra`](Self::with_extra) before the descriptor is handed to the
/// codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDescriptor {
    id: Option<String>,
    version: i32,
    declared_type: String,
    extras: BTreeMap<String, Value>,
}

impl SubjectDescriptor {
    /// Descriptor for a subject of type `S`.
    ///
    /// # Arguments
    /// * `id` - Logical identity of the subject (a stable key, a qualified
    ///   type name, ...), if any
    /// * `version` - Shape version of the subject, compared by the caller on
    ///   restore to decide whether a migration is needed
    pub fn new<S: Subject>(id: Option<&str>, version: i32) -> Self {
        Self {
            id: id.map(str::to_string),
            version,
            declared_type: S::type_tag().into_owned(),
            extras: BTreeMap::new(),
        }
    }

    /// Descriptor for the subject type of `stack`.
    pub fn for_stack<T: SubjectStack>(_stack: &T, id: Option<&str>, version: i32) -> Self {
        Self::new::<T::Subject>(id, version)
    }

    /// Attach an extra value under `key`, replacing any previous value.
    pub fn with_extra<V: Serialize + ?Sized>(
        mut self,
        key: &str,
        value: &V,
    ) -> Result<Self, DescriptorError> {
        let value = Value::serialized(value).map_err(|e| DescriptorError::Extra {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.extras.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }

    /// Read an extra back as `V`. `Ok(None)` when the key is absent.
    pub fn extra<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, DescriptorError> {
        match self.extras.get(key) {
            None => Ok(None),
            Some(value) => value
                .deserialized()
                .map(Some)
                .map_err(|e| DescriptorError::Extra {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// True when the subject type of this descriptor is `S`.
    pub fn declares<S: Subject>(&self) -> bool {
        self.declared_type == S::type_tag()
    }
}

/// Subject as carried inside the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubjectPayload {
    /// Natively serialized subject, tagged with its runtime type.
    Native { type_tag: String, value: Value },
    /// String produced by the caller's encode hook.
    Encoded(String),
}

impl SubjectPayload {
    /// Type tag of the payload itself.
    pub fn type_tag(&self) -> &str {
        match self {
            SubjectPayload::Native { type_tag, .. } => type_tag,
            SubjectPayload::Encoded(_) => std::any::type_name::<String>(),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, SubjectPayload::Native { .. })
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            SubjectPayload::Native { .. } => "native",
            SubjectPayload::Encoded(_) => "encoded",
        }
    }
}

/// A decoded stack together with the outcome of subject reconciliation.
#[derive(Debug)]
pub struct RestoredResult<T> {
    stack: T,
    descriptor: SubjectDescriptor,
    matched_expected_type: bool,
    unresolved: Option<SubjectPayload>,
}

impl<T> RestoredResult<T> {
    pub(crate) fn new(
        stack: T,
        descriptor: SubjectDescriptor,
        matched_expected_type: bool,
        unresolved: Option<SubjectPayload>,
    ) -> Self {
        Self {
            stack,
            descriptor,
            matched_expected_type,
            unresolved,
        }
    }

    pub fn stack(&self) -> &T {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut T {
        &mut self.stack
    }

    pub fn into_stack(self) -> T {
        self.stack
    }

    pub fn descriptor(&self) -> &SubjectDescriptor {
        &self.descriptor
    }

    /// False when the restored subject is a placeholder because the payload
    /// type diverged from the expected one and no hook resolved it.
    pub fn matched_expected_type(&self) -> bool {
        self.matched_expected_type
    }

    /// Payload kept as the best-effort subject when it could not become the
    /// expected subject type.
    pub fn unresolved_payload(&self) -> Option<&SubjectPayload> {
        self.unresolved.as_ref()
    }

    pub fn into_parts(self) -> (T, SubjectDescriptor, bool) {
        (self.stack, self.descriptor, self.matched_expected_type)
    }
}
