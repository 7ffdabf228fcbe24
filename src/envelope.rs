//! Envelope encode/decode: stack + subject + descriptor as one string.
//!
//! Format: URL-safe Base64 of either a CBOR record or a gzip stream
//! (magic `1F 8B`) wrapping it. The record is a CBOR map:
//!
//! ```text
//! {
//!   format:     u8        envelope format version
//!   stack_type: text      stack type tag
//!   stack:      any       stack state without its subject
//!   payload:    SubjectPayload
//!   descriptor: SubjectDescriptor
//! }
//! ```

use std::borrow::Cow;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::base64url::{base64url_decode, base64url_encode};
use crate::compression::{gunzip, gzip, is_gzip};
use crate::config::CodecConfig;
use crate::error::{DecodingError, EncodingError};
use crate::stack::SubjectStack;
use crate::subject::Subject;
use crate::types::{RestoredResult, SubjectDescriptor, SubjectPayload};

/// Current envelope format version.
pub const ENVELOPE_FORMAT: u8 = 1;

/// Turns a subject without a native form into a string.
pub type EncodeHook<'a, S> = &'a dyn Fn(&S) -> String;

/// Rebuilds a subject from the string an [`EncodeHook`] produced, or from a
/// native string subject written under another type. `None` means the
/// string could not be turned into a subject.
pub type DecodeHook<'a, S> = &'a dyn Fn(&str, &SubjectDescriptor) -> Option<S>;

#[derive(Serialize)]
struct RecordRef<'a, T> {
    format: u8,
    stack_type: &'a str,
    stack: &'a T,
    payload: &'a SubjectPayload,
    descriptor: &'a SubjectDescriptor,
}

#[derive(Deserialize)]
struct RawRecord {
    format: u8,
    stack_type: String,
    stack: Value,
    payload: SubjectPayload,
    descriptor: SubjectDescriptor,
}

/// Outcome of matching a decoded payload against the expected subject type.
struct Reconciled<S> {
    subject: Option<S>,
    matched: bool,
    unresolved: Option<SubjectPayload>,
}

/// Stateless envelope codec carrying only its configuration.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec {
    config: CodecConfig,
}

impl EnvelopeCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode `stack`, its subject and `descriptor` into envelope text.
    ///
    /// The subject is embedded natively when [`Subject::to_native`] gives a
    /// value, otherwise through `hook`.
    ///
    /// # Errors
    /// * `MissingSubject` - the stack has no subject
    /// * `SubjectNotSerializable` - no native form and no hook
    /// * `Serialization` / `IoFailure` - CBOR or gzip writing failed
    pub fn encode<T: SubjectStack>(
        &self,
        stack: &T,
        descriptor: &SubjectDescriptor,
        compress: bool,
        hook: Option<EncodeHook<'_, T::Subject>>,
    ) -> Result<String, EncodingError> {
        let subject = stack.subject().ok_or(EncodingError::MissingSubject)?;
        let payload = subject_payload(subject, hook)?;

        if payload.type_tag() != descriptor.declared_type() {
            tracing::debug!(
                declared = descriptor.declared_type(),
                payload_type = payload.type_tag(),
                "payload type differs from declared subject type"
            );
        }

        let stack_type = T::type_tag();
        let record = RecordRef {
            format: ENVELOPE_FORMAT,
            stack_type: &stack_type,
            stack,
            payload: &payload,
            descriptor,
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(&record, &mut bytes).map_err(|e| match e {
            ciborium::ser::Error::Io(e) => EncodingError::IoFailure(e),
            ciborium::ser::Error::Value(msg) => EncodingError::Serialization(msg),
        })?;

        let record_len = bytes.len();
        if compress {
            bytes = gzip(&bytes, self.config.compression_level)?;
        }

        tracing::debug!(
            payload = payload.kind(),
            record_len,
            stored_len = bytes.len(),
            compress,
            "encoded undo stack envelope"
        );
        Ok(base64url_encode(&bytes))
    }

    /// Decode envelope text into a stack of type `T`.
    ///
    /// A subject whose type diverges from the expected one does not fail the
    /// call: the result reports `matched_expected_type() == false` and keeps
    /// the payload it could not resolve. Any string payload that is not
    /// already the expected type is offered to `hook`.
    ///
    /// # Errors
    /// * `MalformedInput` - `text` is not URL-safe Base64
    /// * `CorruptEnvelope` - the bytes are not a readable record
    /// * `UnknownType` - the envelope was written for another stack type
    pub fn decode<T: SubjectStack>(
        &self,
        text: &str,
        hook: Option<DecodeHook<'_, T::Subject>>,
    ) -> Result<RestoredResult<T>, DecodingError> {
        let data =
            base64url_decode(text).map_err(|e| DecodingError::MalformedInput(e.to_string()))?;

        let compressed = is_gzip(&data);
        let bytes: Cow<'_, [u8]> = if compressed {
            Cow::Owned(gunzip(&data, self.config.max_decoded_len)?)
        } else {
            Cow::Borrowed(&data)
        };

        let record: RawRecord = ciborium::from_reader(&bytes[..])
            .map_err(|e| DecodingError::CorruptEnvelope(format!("{}", e)))?;

        if record.format != ENVELOPE_FORMAT {
            return Err(DecodingError::CorruptEnvelope(format!(
                "unsupported envelope format {}",
                record.format
            )));
        }
        if record.descriptor.declared_type().is_empty() {
            return Err(DecodingError::CorruptEnvelope(
                "descriptor has no declared type".to_string(),
            ));
        }

        let expected = T::type_tag();
        if record.stack_type != expected {
            return Err(DecodingError::UnknownType {
                found: record.stack_type,
                expected: expected.into_owned(),
            });
        }

        let mut stack: T = record
            .stack
            .deserialized()
            .map_err(|e| DecodingError::CorruptEnvelope(format!("stack state: {}", e)))?;

        let reconciled = reconcile::<T::Subject>(record.payload, &record.descriptor, hook)?;
        stack.set_subject(reconciled.subject);

        tracing::debug!(
            stored_len = data.len(),
            record_len = bytes.len(),
            compressed,
            matched = reconciled.matched,
            "decoded undo stack envelope"
        );
        Ok(RestoredResult::new(
            stack,
            record.descriptor,
            reconciled.matched,
            reconciled.unresolved,
        ))
    }
}

/// Encode with the default configuration. See [`EnvelopeCodec::encode`].
pub fn encode<T: SubjectStack>(
    stack: &T,
    descriptor: &SubjectDescriptor,
    compress: bool,
    hook: Option<EncodeHook<'_, T::Subject>>,
) -> Result<String, EncodingError> {
    EnvelopeCodec::default().encode(stack, descriptor, compress, hook)
}

/// Decode with the default configuration. See [`EnvelopeCodec::decode`].
pub fn decode<T: SubjectStack>(
    text: &str,
    hook: Option<DecodeHook<'_, T::Subject>>,
) -> Result<RestoredResult<T>, DecodingError> {
    EnvelopeCodec::default().decode(text, hook)
}

fn subject_payload<S: Subject>(
    subject: &S,
    hook: Option<EncodeHook<'_, S>>,
) -> Result<SubjectPayload, EncodingError> {
    match subject.to_native() {
        Some(value) => Ok(SubjectPayload::Native {
            type_tag: S::type_tag().into_owned(),
            value: value.map_err(|e| EncodingError::Serialization(e.to_string()))?,
        }),
        None => match hook {
            Some(hook) => Ok(SubjectPayload::Encoded(hook(subject))),
            None => Err(EncodingError::SubjectNotSerializable {
                type_tag: S::type_tag().into_owned(),
            }),
        },
    }
}

fn reconcile<S: Subject>(
    payload: SubjectPayload,
    descriptor: &SubjectDescriptor,
    hook: Option<DecodeHook<'_, S>>,
) -> Result<Reconciled<S>, DecodingError> {
    let expected = S::type_tag();
    let declared = descriptor.declared_type();

    if let SubjectPayload::Native { type_tag, value } = &payload {
        if type_tag == declared && declared == expected {
            match S::from_native(value) {
                Some(Ok(subject)) => {
                    return Ok(Reconciled {
                        subject: Some(subject),
                        matched: true,
                        unresolved: None,
                    })
                }
                Some(Err(e)) => {
                    return Err(DecodingError::CorruptEnvelope(format!(
                        "subject {}: {}",
                        type_tag, e
                    )))
                }
                None => {}
            }
        }
    }

    let text = match &payload {
        SubjectPayload::Encoded(text) => Some(text.as_str()),
        SubjectPayload::Native {
            value: Value::Text(text),
            ..
        } => Some(text.as_str()),
        SubjectPayload::Native { .. } => None,
    };
    if let (Some(text), Some(hook)) = (text, hook) {
        let subject = hook(text, descriptor);
        let matched = subject.is_some();
        if !matched {
            tracing::warn!(
                declared,
                "decode hook could not rebuild the subject; using a placeholder"
            );
        }
        return Ok(Reconciled {
            subject,
            matched,
            unresolved: None,
        });
    }

    tracing::warn!(
        declared,
        payload_type = payload.type_tag(),
        expected = %expected,
        "restored subject does not have the expected type"
    );
    Ok(Reconciled {
        subject: None,
        matched: false,
        unresolved: Some(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{UndoCommand, UndoStack};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Add(i64);

    impl UndoCommand<i64> for Add {
        fn redo(&self, total: &mut i64) {
            *total += self.0;
        }

        fn undo(&self, total: &mut i64) {
            *total -= self.0;
        }

        fn caption(&self) -> &str {
            "Add"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rename(String);

    impl UndoCommand<String> for Rename {
        fn redo(&self, name: &mut String) {
            *name = self.0.clone();
        }

        fn undo(&self, _name: &mut String) {}

        fn caption(&self) -> &str {
            "Rename"
        }
    }

    type Counter = UndoStack<i64, Add>;

    fn counter() -> Counter {
        let mut stack = Counter::new(0);
        stack.push(Add(5));
        stack.push(Add(7));
        stack.undo();
        stack
    }

    fn raw_bytes(text: &str) -> Vec<u8> {
        base64url_decode(text).unwrap()
    }

    #[test]
    fn uncompressed_record_is_plain_cbor() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, Some("total"), 1);
        let text = encode(&stack, &descriptor, false, None).unwrap();
        let bytes = raw_bytes(&text);
        assert!(!is_gzip(&bytes));
        let value: Value = ciborium::from_reader(&bytes[..]).unwrap();
        assert!(value.is_map());
    }

    #[test]
    fn compressed_record_has_gzip_magic() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, None, 1);
        let text = encode(&stack, &descriptor, true, None).unwrap();
        assert!(is_gzip(&raw_bytes(&text)));
    }

    #[test]
    fn restores_stack_and_subject() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, Some("total"), 4);
        let text = encode(&stack, &descriptor, true, None).unwrap();

        let restored = decode::<Counter>(&text, None).unwrap();
        assert!(restored.matched_expected_type());
        assert_eq!(restored.descriptor(), &descriptor);
        let stack = restored.stack();
        assert_eq!(stack.subject(), Some(&5));
        assert_eq!(stack.index(), 1);
        assert_eq!(stack.count(), 2);
        assert!(stack.can_redo());
    }

    #[test]
    fn encode_without_subject_fails() {
        let stack = Counter::default();
        let descriptor = SubjectDescriptor::for_stack(&stack, None, 1);
        assert!(matches!(
            encode(&stack, &descriptor, false, None),
            Err(EncodingError::MissingSubject)
        ));
    }

    #[test]
    fn rejects_other_stack_type() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, None, 1);
        let text = encode(&stack, &descriptor, false, None).unwrap();

        let err = decode::<UndoStack<String, Rename>>(&text, None).unwrap_err();
        assert!(matches!(err, DecodingError::UnknownType { .. }));
    }

    #[test]
    fn rejects_unknown_format_version() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, None, 1);
        let payload = SubjectPayload::Native {
            type_tag: <i64 as Subject>::type_tag().into_owned(),
            value: Value::Integer(5.into()),
        };
        let stack_type = Counter::type_tag();
        let record = RecordRef {
            format: ENVELOPE_FORMAT + 1,
            stack_type: &stack_type,
            stack: &stack,
            payload: &payload,
            descriptor: &descriptor,
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&record, &mut bytes).unwrap();

        let err = decode::<Counter>(&base64url_encode(&bytes), None).unwrap_err();
        assert!(matches!(err, DecodingError::CorruptEnvelope(_)));
    }

    #[test]
    fn native_payload_of_wrong_shape_is_corrupt() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, None, 1);
        let payload = SubjectPayload::Native {
            type_tag: <i64 as Subject>::type_tag().into_owned(),
            value: Value::Text("not a number".into()),
        };
        let stack_type = Counter::type_tag();
        let record = RecordRef {
            format: ENVELOPE_FORMAT,
            stack_type: &stack_type,
            stack: &stack,
            payload: &payload,
            descriptor: &descriptor,
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&record, &mut bytes).unwrap();

        let err = decode::<Counter>(&base64url_encode(&bytes), None).unwrap_err();
        assert!(matches!(err, DecodingError::CorruptEnvelope(_)));
    }

    #[test]
    fn honours_decompression_limit() {
        let stack = counter();
        let descriptor = SubjectDescriptor::for_stack(&stack, None, 1)
            .with_extra("padding", &vec![0u8; 4096])
            .unwrap();
        let text = encode(&stack, &descriptor, true, None).unwrap();

        let strict = EnvelopeCodec::new(CodecConfig {
            max_decoded_len: 256,
            ..Default::default()
        });
        assert!(matches!(
            strict.decode::<Counter>(&text, None),
            Err(DecodingError::CorruptEnvelope(_))
        ));
        assert!(EnvelopeCodec::default().decode::<Counter>(&text, None).is_ok());
    }

    #[test]
    fn hook_migrates_native_string_subject() {
        let descriptor = SubjectDescriptor::new::<String>(Some("total"), 1);
        let payload = SubjectPayload::Native {
            type_tag: <String as Subject>::type_tag().into_owned(),
            value: Value::Text("42".into()),
        };
        let parse = |text: &str, _: &SubjectDescriptor| text.parse::<i64>().ok();

        let reconciled = reconcile::<i64>(payload, &descriptor, Some(&parse)).unwrap();
        assert!(reconciled.matched);
        assert_eq!(reconciled.subject, Some(42));
        assert!(reconciled.unresolved.is_none());
    }

    #[test]
    fn structured_native_payload_skips_hook() {
        let descriptor = SubjectDescriptor::new::<i64>(None, 1);
        let payload = SubjectPayload::Native {
            type_tag: <i64 as Subject>::type_tag().into_owned(),
            value: Value::Integer(5.into()),
        };
        let never = |_: &str, _: &SubjectDescriptor| -> Option<String> {
            panic!("hook called for a non-string payload")
        };

        let reconciled = reconcile::<String>(payload.clone(), &descriptor, Some(&never)).unwrap();
        assert!(!reconciled.matched);
        assert!(reconciled.subject.is_none());
        assert_eq!(reconciled.unresolved, Some(payload));
    }
}
