//! A set of undo stacks with at most one active stack.
//!
//! Applications usually keep one stack per subject but expose a single
//! undo/redo action; the group routes those calls to whichever stack is
//! active. Stacks are shared as [`SharedStack`] handles; a stack points
//! back at its group through a weak [`GroupLink`].

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::GroupError;
use crate::subject::SubjectId;

/// The part of a stack the group delegates to.
pub trait GroupMember: Send {
    fn undo(&mut self) -> bool;
    fn redo(&mut self) -> bool;
    fn can_undo(&self) -> bool;
    fn can_redo(&self) -> bool;
    fn undo_caption(&self) -> String;
    fn redo_caption(&self) -> String;
    fn is_clean(&self) -> bool;

    /// Identity of the subject, `None` when the stack has no subject.
    fn subject_identity(&self) -> Option<SubjectId>;

    fn group_link(&self) -> Option<&GroupLink>;
    fn set_group_link(&mut self, link: Option<GroupLink>);
}

/// Stack handle shared between the application and a group.
pub type SharedStack = Arc<Mutex<dyn GroupMember>>;

#[derive(Default)]
struct GroupState {
    stacks: Vec<SharedStack>,
    active: Option<SharedStack>,
}

/// Non-owning back reference from a stack to its group.
#[derive(Clone)]
pub struct GroupLink(Weak<Mutex<GroupState>>);

impl GroupLink {
    pub fn upgrade(&self) -> Option<StackGroup> {
        self.0.upgrade().map(|state| StackGroup { state })
    }

    fn points_to(&self, state: &Arc<Mutex<GroupState>>) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(state))
    }
}

impl fmt::Debug for GroupLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupLink")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

fn stack_key<M: GroupMember + ?Sized>(stack: &Arc<Mutex<M>>) -> *const () {
    Arc::as_ptr(stack).cast::<()>()
}

/// Group of undo stacks, one of which may be active.
///
/// Cloning yields another handle to the same group. A group refuses two
/// stacks whose subjects are the same instance.
///
/// # Locking
/// The group never holds its own lock while calling into the active stack.
/// Callers must not hold a stack's lock while passing that stack, or
/// calling a delegating method, on its group.
#[derive(Clone, Default)]
pub struct StackGroup {
    state: Arc<Mutex<GroupState>>,
}

impl StackGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&self) -> GroupLink {
        GroupLink(Arc::downgrade(&self.state))
    }

    /// Add `stack` to this group, moving it out of any previous group.
    /// Adding a member again does nothing.
    ///
    /// The membership and subject checks and the insertion happen under one
    /// lock of the group, so concurrent adds of stacks sharing a subject
    /// admit at most one of them.
    pub fn add(&self, stack: SharedStack) -> Result<(), GroupError> {
        let key = stack_key(&stack);

        {
            let mut state = self.state.lock();
            if state.stacks.iter().any(|s| stack_key(s) == key) {
                return Ok(());
            }
            let identity = stack.lock().subject_identity();
            if let Some(identity) = identity {
                let duplicate = state
                    .stacks
                    .iter()
                    .any(|s| s.lock().subject_identity() == Some(identity));
                if duplicate {
                    tracing::warn!("rejected stack: subject already owned by a group member");
                    return Err(GroupError::DuplicateSubject);
                }
            }
            state.stacks.push(Arc::clone(&stack));
        }

        let previous = stack.lock().group_link().and_then(GroupLink::upgrade);
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous.state, &self.state) {
                previous.remove(&stack);
            }
        }

        stack.lock().set_group_link(Some(self.link()));
        tracing::trace!(members = self.len(), "stack added to group");
        Ok(())
    }

    /// Remove `stack` from this group. If it was active, no stack is active
    /// afterwards. Returns whether it was a member.
    pub fn remove<M: GroupMember + ?Sized>(&self, stack: &Arc<Mutex<M>>) -> bool {
        let key = stack_key(stack);
        let removed = {
            let mut state = self.state.lock();
            if state.active.as_ref().is_some_and(|a| stack_key(a) == key) {
                state.active = None;
            }
            let before = state.stacks.len();
            state.stacks.retain(|s| stack_key(s) != key);
            before != state.stacks.len()
        };

        let mut guard = stack.lock();
        if guard.group_link().is_some_and(|l| l.points_to(&self.state)) {
            guard.set_group_link(None);
        }
        if removed {
            tracing::trace!("stack removed from group");
        }
        removed
    }

    /// Detach every stack and clear the active stack.
    pub fn clear(&self) {
        let stacks = {
            let mut state = self.state.lock();
            state.active = None;
            std::mem::take(&mut state.stacks)
        };
        for stack in stacks {
            let mut guard = stack.lock();
            if guard.group_link().is_some_and(|l| l.points_to(&self.state)) {
                guard.set_group_link(None);
            }
        }
    }

    pub fn contains<M: GroupMember + ?Sized>(&self, stack: &Arc<Mutex<M>>) -> bool {
        let key = stack_key(stack);
        self.state.lock().stacks.iter().any(|s| stack_key(s) == key)
    }

    /// Make `stack` the active stack. It must be a member.
    pub fn set_active<M: GroupMember + ?Sized>(
        &self,
        stack: &Arc<Mutex<M>>,
    ) -> Result<(), GroupError> {
        let key = stack_key(stack);
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|a| stack_key(a) == key) {
            return Ok(());
        }
        let Some(member) = state.stacks.iter().find(|s| stack_key(s) == key).cloned() else {
            tracing::warn!("set_active called with a stack outside the group");
            return Err(GroupError::NotAMember);
        };
        state.active = Some(member);
        Ok(())
    }

    /// Leave the group without an active stack.
    pub fn clear_active(&self) {
        self.state.lock().active = None;
    }

    pub fn active(&self) -> Option<SharedStack> {
        self.state.lock().active.clone()
    }

    pub fn is_active<M: GroupMember + ?Sized>(&self, stack: &Arc<Mutex<M>>) -> bool {
        let key = stack_key(stack);
        self.state
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| stack_key(a) == key)
    }

    pub fn stacks(&self) -> Vec<SharedStack> {
        self.state.lock().stacks.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().stacks.is_empty()
    }

    fn with_active<R>(&self, default: R, f: impl FnOnce(&mut dyn GroupMember) -> R) -> R {
        let active = self.active();
        match active {
            Some(stack) => f(&mut *stack.lock()),
            None => default,
        }
    }

    /// Undo on the active stack; does nothing without one.
    pub fn undo(&self) {
        self.with_active((), |s| {
            s.undo();
        });
    }

    /// Redo on the active stack; does nothing without one.
    pub fn redo(&self) {
        self.with_active((), |s| {
            s.redo();
        });
    }

    pub fn can_undo(&self) -> bool {
        self.with_active(false, |s| s.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.with_active(false, |s| s.can_redo())
    }

    pub fn undo_caption(&self) -> String {
        self.with_active(String::new(), |s| s.undo_caption())
    }

    pub fn redo_caption(&self) -> String {
        self.with_active(String::new(), |s| s.redo_caption())
    }

    /// `true` when no stack is active.
    pub fn is_clean(&self) -> bool {
        self.with_active(true, |s| s.is_clean())
    }
}

impl fmt::Debug for StackGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StackGroup")
            .field("members", &state.stacks.len())
            .field("has_active", &state.active.is_some())
            .finish()
    }
}
