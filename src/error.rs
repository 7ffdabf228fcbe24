use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Subject of type {type_tag} is not natively serializable and no encode hook was supplied")]
    SubjectNotSerializable { type_tag: String },

    #[error("Stack has no subject to encode")]
    MissingSubject,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O failure while encoding: {0}")]
    IoFailure(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("Malformed envelope text: {0}")]
    MalformedInput(String),

    #[error("Corrupt envelope: {0}")]
    CorruptEnvelope(String),

    #[error("Unknown stack type {found} (expected {expected})")]
    UnknownType { found: String, expected: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("Another stack in the group already wraps this subject")]
    DuplicateSubject,

    #[error("Stack is not a member of this group")]
    NotAMember,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackError {
    #[error("Undo limit can only be changed on an empty stack (count: {count})")]
    LimitOnNonEmpty { count: usize },
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Extra {key:?} could not be converted: {reason}")]
    Extra { key: String, reason: String },
}
