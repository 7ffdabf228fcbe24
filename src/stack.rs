//! Undo/redo command stack and the contract the envelope codec needs from it.

use std::any;
use std::borrow::Cow;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StackError;
use crate::group::{GroupLink, GroupMember, StackGroup};
use crate::subject::{Subject, SubjectId};

/// What the codec requires from a stack: serde state of its own plus
/// access to the subject, which is persisted separately.
pub trait SubjectStack: Serialize + DeserializeOwned {
    type Subject: Subject;

    /// Type tag recorded in the envelope to reject envelopes written by a
    /// different stack type. Leave the subject type out of it, otherwise a
    /// subject that changed type fails decoding instead of being reported
    /// as a mismatch.
    fn type_tag() -> Cow<'static, str> {
        Cow::Borrowed(any::type_name::<Self>())
    }

    fn subject(&self) -> Option<&Self::Subject>;

    fn set_subject(&mut self, subject: Option<Self::Subject>);
}

/// A reversible edit applied to a subject of type `S`.
pub trait UndoCommand<S> {
    fn redo(&self, subject: &mut S);

    fn undo(&self, subject: &mut S);

    /// Human-readable caption, e.g. "Insert text".
    fn caption(&self) -> &str;
}

/// Command history over a subject.
///
/// `index` is the number of applied commands: commands `[0, index)` are
/// done and `[index, count)` can be redone. The subject is not part of the
/// stack's serialized state; the envelope carries it separately.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "C: Serialize", deserialize = "C: Deserialize<'de>"))]
pub struct UndoStack<S, C> {
    commands: Vec<C>,
    index: usize,
    clean_index: Option<usize>,
    undo_limit: usize,
    #[serde(skip)]
    subject: Option<S>,
    #[serde(skip)]
    group: Option<GroupLink>,
}

impl<S, C> Default for UndoStack<S, C> {
    /// Empty stack without a subject.
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            index: 0,
            clean_index: Some(0),
            undo_limit: 0,
            subject: None,
            group: None,
        }
    }
}

impl<S, C> UndoStack<S, C>
where
    C: UndoCommand<S>,
{
    pub fn new(subject: S) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    pub fn subject(&self) -> Option<&S> {
        self.subject.as_ref()
    }

    pub fn subject_mut(&mut self) -> Option<&mut S> {
        self.subject.as_mut()
    }

    pub fn set_subject(&mut self, subject: Option<S>) {
        self.subject = subject;
    }

    pub fn take_subject(&mut self) -> Option<S> {
        self.subject.take()
    }

    /// Apply `command` and record it. Commands that could be redone are
    /// discarded. Without a subject the command is recorded but not applied.
    pub fn push(&mut self, command: C) {
        if let Some(subject) = self.subject.as_mut() {
            command.redo(subject);
        }

        self.commands.truncate(self.index);
        if self.clean_index.is_some_and(|clean| clean > self.index) {
            // The clean state was in the discarded redo tail.
            self.clean_index = None;
        }

        self.commands.push(command);
        self.index += 1;

        if self.undo_limit > 0 && self.commands.len() > self.undo_limit {
            let excess = self.commands.len() - self.undo_limit;
            self.commands.drain(..excess);
            self.index -= excess;
            self.clean_index = self
                .clean_index
                .and_then(|clean| clean.checked_sub(excess));
        }
    }

    /// Undo the last applied command. Returns `false` when there is nothing
    /// to undo or no subject to apply it to.
    pub fn undo(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        let Some(subject) = self.subject.as_mut() else {
            return false;
        };
        self.index -= 1;
        self.commands[self.index].undo(subject);
        true
    }

    /// Redo the next command. Returns `false` when there is nothing to redo
    /// or no subject to apply it to.
    pub fn redo(&mut self) -> bool {
        if self.index == self.commands.len() {
            return false;
        }
        let Some(subject) = self.subject.as_mut() else {
            return false;
        };
        self.commands[self.index].redo(subject);
        self.index += 1;
        true
    }

    /// Undo or redo until `index` equals `target` (clamped to `count`).
    pub fn set_index(&mut self, target: usize) {
        let target = target.min(self.commands.len());
        while self.index > target {
            if !self.undo() {
                break;
            }
        }
        while self.index < target {
            if !self.redo() {
                break;
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.commands.len()
    }

    /// Caption of the command `undo` would revert, or an empty string.
    pub fn undo_caption(&self) -> String {
        self.index
            .checked_sub(1)
            .and_then(|i| self.caption(i))
            .unwrap_or_default()
    }

    /// Caption of the command `redo` would apply, or an empty string.
    pub fn redo_caption(&self) -> String {
        self.caption(self.index).unwrap_or_default()
    }

    pub fn caption(&self, index: usize) -> Option<String> {
        self.commands.get(index).map(|c| c.caption().to_string())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Mark the current index as the clean (saved) state.
    pub fn set_clean(&mut self) {
        self.clean_index = Some(self.index);
    }

    /// Forget the clean state; the stack is dirty until `set_clean`.
    pub fn reset_clean(&mut self) {
        self.clean_index = None;
    }

    pub fn clean_index(&self) -> Option<usize> {
        self.clean_index
    }

    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.index)
    }

    pub fn undo_limit(&self) -> usize {
        self.undo_limit
    }

    /// Cap the number of kept commands (0 = unlimited).
    pub fn set_undo_limit(&mut self, limit: usize) -> Result<(), StackError> {
        if !self.commands.is_empty() {
            return Err(StackError::LimitOnNonEmpty {
                count: self.commands.len(),
            });
        }
        self.undo_limit = limit;
        Ok(())
    }

    /// Drop every command. The current state becomes clean.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.index = 0;
        self.clean_index = Some(0);
    }

    /// The group this stack belongs to, if it is still alive.
    pub fn group(&self) -> Option<StackGroup> {
        self.group.as_ref().and_then(GroupLink::upgrade)
    }
}

impl<S, C> SubjectStack for UndoStack<S, C>
where
    S: Subject,
    C: UndoCommand<S> + Serialize + DeserializeOwned,
{
    type Subject = S;

    /// Named after the command type only. The persisted state is the
    /// command history, so a stack whose subject type changed still reads
    /// it and leaves the subject to reconciliation.
    fn type_tag() -> Cow<'static, str> {
        Cow::Owned(format!("UndoStack<{}>", any::type_name::<C>()))
    }

    fn subject(&self) -> Option<&S> {
        self.subject.as_ref()
    }

    fn set_subject(&mut self, subject: Option<S>) {
        self.subject = subject;
    }
}

impl<S, C> GroupMember for UndoStack<S, C>
where
    S: Subject + Send,
    C: UndoCommand<S> + Send,
{
    fn undo(&mut self) -> bool {
        UndoStack::undo(self)
    }

    fn redo(&mut self) -> bool {
        UndoStack::redo(self)
    }

    fn can_undo(&self) -> bool {
        UndoStack::can_undo(self)
    }

    fn can_redo(&self) -> bool {
        UndoStack::can_redo(self)
    }

    fn undo_caption(&self) -> String {
        UndoStack::undo_caption(self)
    }

    fn redo_caption(&self) -> String {
        UndoStack::redo_caption(self)
    }

    fn is_clean(&self) -> bool {
        UndoStack::is_clean(self)
    }

    fn subject_identity(&self) -> Option<SubjectId> {
        self.subject.as_ref().map(Subject::identity)
    }

    fn group_link(&self) -> Option<&GroupLink> {
        self.group.as_ref()
    }

    fn set_group_link(&mut self, link: Option<GroupLink>) {
        self.group = link;
    }
}

impl<S, C> fmt::Debug for UndoStack<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoStack")
            .field("count", &self.commands.len())
            .field("index", &self.index)
            .field("clean_index", &self.clean_index)
            .field("undo_limit", &self.undo_limit)
            .field("has_subject", &self.subject.is_some())
            .field("grouped", &self.group.is_some())
            .finish()
    }
}
