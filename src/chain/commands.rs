//! The linked list of render commands consumed by a backend.
//!
//! Commands live in an index arena and are threaded into one doubly linked
//! list in tree order. Each element owns a contiguous run of opening
//! commands and, optionally, a contiguous run of closing commands placed
//! after all of its descendants.

use crate::gpu::MeshHandle;
use crate::tree::ElementId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilOp {
    None,
    /// Increments the stencil inside the mesh.
    Register,
    /// Decrements it again once the clipped subtree is drawn.
    Unregister,
}

/// Index range of one draw inside a mesh allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRange {
    /// `None` until the closing mesh is filled.
    pub mesh: Option<MeshHandle>,
    pub first_index: u32,
    pub index_count: u32,
    pub stencil: StencilOp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommandKind {
    Draw(DrawRange),
    /// Push a scissor rectangle; the backend reads the owner's clip bounds.
    PushClip,
    PopClip,
    /// Push the owner's world matrix as view for its group.
    PushView,
    PopView,
    PushRenderTarget,
    BlitToPreviousTarget,
    PopRenderTarget,
}

#[derive(Clone, Debug)]
pub struct Command {
    pub owner: ElementId,
    pub kind: CommandKind,
    pub closing: bool,
    prev: Option<CommandId>,
    next: Option<CommandId>,
}

impl Command {
    pub fn prev(&self) -> Option<CommandId> {
        self.prev
    }

    pub fn next(&self) -> Option<CommandId> {
        self.next
    }
}

#[derive(Default)]
pub struct CommandList {
    slots: Vec<Option<Command>>,
    free: Vec<u32>,
    head: Option<CommandId>,
    len: usize,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unlinked command.
    pub(crate) fn alloc(&mut self, owner: ElementId, kind: CommandKind, closing: bool) -> CommandId {
        let command = Command {
            owner,
            kind,
            closing,
            prev: None,
            next: None,
        };
        self.len += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(command);
                CommandId(slot)
            }
            None => {
                self.slots.push(Some(command));
                CommandId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Splice `id` between `prev` and `next`, which must be adjacent.
    pub(crate) fn link(&mut self, id: CommandId, prev: Option<CommandId>, next: Option<CommandId>) {
        if let Some(cmd) = self.get_mut(id) {
            cmd.prev = prev;
            cmd.next = next;
        }
        match prev {
            Some(p) => {
                if let Some(cmd) = self.get_mut(p) {
                    cmd.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        if let Some(n) = next {
            if let Some(cmd) = self.get_mut(n) {
                cmd.prev = Some(id);
            }
        }
    }

    /// Unlink and free the run `first..=last`.
    pub(crate) fn remove_run(&mut self, first: CommandId, last: CommandId) {
        let before = self.prev(first);
        let after = self.next(last);
        match before {
            Some(b) => {
                if let Some(cmd) = self.get_mut(b) {
                    cmd.next = after;
                }
            }
            None => {
                if self.head == Some(first) {
                    self.head = after;
                }
            }
        }
        if let Some(a) = after {
            if let Some(cmd) = self.get_mut(a) {
                cmd.prev = before;
            }
        }

        let mut current = Some(first);
        while let Some(id) = current {
            current = if id == last { None } else { self.next(id) };
            if let Some(slot) = self.slots.get_mut(id.0 as usize) {
                if slot.take().is_some() {
                    self.free.push(id.0);
                    self.len -= 1;
                }
            }
        }
    }

    pub fn get(&self, id: CommandId) -> Option<&Command> {
        self.slots.get(id.0 as usize).and_then(|c| c.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: CommandId) -> Option<&mut Command> {
        self.slots.get_mut(id.0 as usize).and_then(|c| c.as_mut())
    }

    pub fn prev(&self, id: CommandId) -> Option<CommandId> {
        self.get(id).and_then(|c| c.prev)
    }

    pub fn next(&self, id: CommandId) -> Option<CommandId> {
        self.get(id).and_then(|c| c.next)
    }

    pub fn head(&self) -> Option<CommandId> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Walk the list from the head.
    pub fn iter(&self) -> CommandIter<'_> {
        CommandIter {
            list: self,
            current: self.head,
        }
    }
}

pub struct CommandIter<'a> {
    list: &'a CommandList,
    current: Option<CommandId>,
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = (CommandId, &'a Command);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let command = self.list.get(id)?;
        self.current = command.next;
        Some((id, command))
    }
}
