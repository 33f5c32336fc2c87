//! Emulated command lists.
//!
//! Each command buffer owns a singly linked list of [`RenderCommand`] nodes
//! whose storage lives in one shared [`BlockArena`]. Links are arena indices,
//! so recycling a node never leaves a dangling reference behind.

use std::collections::HashMap;

use ngf_core::arena::{ArenaIndex, BlockArena};
use ngf_core::{Handle, HostAllocator, NgfError, RenderCommand, Result};

struct CmdNode {
    cmd: RenderCommand,
    next: Option<ArenaIndex>,
}

#[derive(Debug, Default, Clone, Copy)]
struct CmdList {
    first: Option<ArenaIndex>,
    last: Option<ArenaIndex>,
    len: usize,
}

pub struct CommandStore {
    arena: BlockArena<CmdNode>,
    lists: HashMap<Handle, CmdList>,
}

impl CommandStore {
    pub fn new(block_len: usize, host: HostAllocator) -> Self {
        Self {
            arena: BlockArena::new(block_len, host),
            lists: HashMap::new(),
        }
    }

    pub fn create_list(&mut self, cmd_buffer: Handle) {
        self.lists.insert(cmd_buffer, CmdList::default());
    }

    pub fn append(&mut self, cmd_buffer: Handle, cmd: RenderCommand) -> Result<()> {
        let list = self
            .lists
            .get_mut(&cmd_buffer)
            .ok_or(NgfError::InvalidHandle(cmd_buffer))?;
        let index = self.arena.alloc(CmdNode { cmd, next: None })?;
        match list.last {
            Some(last) => {
                if let Some(node) = self.arena.get_mut(last) {
                    node.next = Some(index);
                }
            }
            None => list.first = Some(index),
        }
        list.last = Some(index);
        list.len += 1;
        Ok(())
    }

    /// Walk `cmd_buffer`'s commands in recording order.
    pub fn iter(&self, cmd_buffer: Handle) -> Result<CommandIter<'_>> {
        let list = self
            .lists
            .get(&cmd_buffer)
            .ok_or(NgfError::InvalidHandle(cmd_buffer))?;
        Ok(CommandIter {
            arena: &self.arena,
            next: list.first,
        })
    }

    pub fn len(&self, cmd_buffer: Handle) -> usize {
        self.lists.get(&cmd_buffer).map_or(0, |l| l.len)
    }

    /// Return every node of the list to the arena, keeping the (empty) list.
    pub fn clear_list(&mut self, cmd_buffer: Handle) {
        let Some(list) = self.lists.get_mut(&cmd_buffer) else {
            return;
        };
        let mut cursor = list.first.take();
        list.last = None;
        list.len = 0;
        while let Some(index) = cursor {
            cursor = self.arena.free(index).and_then(|node| node.next);
        }
    }

    pub fn remove_list(&mut self, cmd_buffer: Handle) {
        self.clear_list(cmd_buffer);
        self.lists.remove(&cmd_buffer);
    }

    /// Commands currently stored across all lists.
    pub fn live_commands(&self) -> usize {
        self.arena.len()
    }

    pub fn arena_blocks(&self) -> usize {
        self.arena.block_count()
    }
}

pub struct CommandIter<'a> {
    arena: &'a BlockArena<CmdNode>,
    next: Option<ArenaIndex>,
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = &'a RenderCommand;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.arena.get(self.next?)?;
        self.next = node.next;
        Some(&node.cmd)
    }
}
