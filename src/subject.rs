//! How a subject type crosses the envelope.
//!
//! Every subject carries a string type tag used to reconcile a restored
//! payload with the type the running program expects. Types that implement
//! [`NativeSubject`] are embedded directly as CBOR; any other [`Subject`]
//! needs an encode hook to turn it into a string.

use std::any;
use std::borrow::Cow;

use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Pointer identity of a subject instance.
///
/// Two subjects are identity-equal only when they are the same instance
/// (or, for handle types, point at the same shared instance). Value
/// equality plays no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId(usize);

impl SubjectId {
    /// Identity of the value behind `value`.
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self(value as *const T as *const () as usize)
    }
}

/// A value an undo stack operates on.
pub trait Subject: Sized + 'static {
    /// Runtime type tag recorded in the descriptor and the payload.
    ///
    /// Defaults to [`std::any::type_name`], which is only stable for a given
    /// compiler and crate layout. Override it with a fixed string when
    /// envelopes must outlive a rebuild.
    fn type_tag() -> Cow<'static, str> {
        Cow::Borrowed(any::type_name::<Self>())
    }

    /// Native CBOR form, or `None` when the type has none.
    fn to_native(&self) -> Option<Result<Value, ciborium::value::Error>> {
        None
    }

    /// Rebuild from a native CBOR form, or `None` when the type has none.
    fn from_native(_value: &Value) -> Option<Result<Self, ciborium::value::Error>> {
        None
    }

    /// Identity used by [`StackGroup`](crate::StackGroup) to refuse two
    /// stacks wrapping the same instance.
    ///
    /// The default is the address of `self`. Handle types (`Arc<Mutex<T>>`
    /// wrappers and the like) should return the identity of the shared
    /// instance instead.
    fn identity(&self) -> SubjectId {
        SubjectId::of(self)
    }
}

/// Marker for subjects that serde can serialize directly.
pub trait NativeSubject: Serialize + DeserializeOwned + 'static {
    fn type_tag() -> Cow<'static, str> {
        Cow::Borrowed(any::type_name::<Self>())
    }
}

impl<T: NativeSubject> Subject for T {
    fn type_tag() -> Cow<'static, str> {
        <T as NativeSubject>::type_tag()
    }

    fn to_native(&self) -> Option<Result<Value, ciborium::value::Error>> {
        Some(Value::serialized(self))
    }

    fn from_native(value: &Value) -> Option<Result<Self, ciborium::value::Error>> {
        Some(value.deserialized())
    }
}

macro_rules! native_subject {
    ($($ty:ty),* $(,)?) => {
        $(impl NativeSubject for $ty {})*
    };
}

native_subject!(String, bool, i32, i64, u32, u64, f64, Vec<u8>, Vec<String>);
