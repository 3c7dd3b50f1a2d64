//! File-handle collaborator.
//!
//! Open files and inodes live in the file system. The scheduling core only
//! holds opaque handles and asks the file system to take or drop references
//! when units are forked, spawn threads, exit or are reaped.

use crate::config::NOFILE;

/// Opaque handle to an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u32);

/// Opaque handle to an inode (used for the working directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeHandle(pub u32);

/// Reference counting operations on files and inodes.
pub trait FileOps {
    /// Take another reference to an open file.
    fn dup(&self, file: FileHandle) -> FileHandle;

    /// Drop one reference to an open file.
    fn close(&self, file: FileHandle);

    /// Take another reference to an inode.
    fn idup(&self, inode: InodeHandle) -> InodeHandle;

    /// Drop one reference to an inode.
    fn iput(&self, inode: InodeHandle);

    /// The root directory, used as the first unit's working directory.
    fn root(&self) -> InodeHandle;
}

/// Per-unit open-file table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenFiles {
    slots: [Option<FileHandle>; NOFILE],
}

impl OpenFiles {
    pub const fn new() -> Self {
        Self { slots: [None; NOFILE] }
    }

    /// Put `file` in the lowest free descriptor.
    pub fn install(&mut self, file: FileHandle) -> Option<usize> {
        let fd = self.slots.iter().position(Option::is_none)?;
        self.slots[fd] = Some(file);
        Some(fd)
    }

    pub fn get(&self, fd: usize) -> Option<FileHandle> {
        self.slots.get(fd).copied().flatten()
    }

    /// Copy the table for a child, taking a reference on every open file.
    pub fn duplicate<F: FileOps + ?Sized>(&self, fs: &F) -> Self {
        let mut copy = Self::new();
        for (dst, src) in copy.slots.iter_mut().zip(self.slots.iter()) {
            *dst = src.map(|file| fs.dup(file));
        }
        copy
    }

    /// Close every open descriptor.
    pub fn close_all<F: FileOps + ?Sized>(&mut self, fs: &F) {
        for slot in self.slots.iter_mut() {
            if let Some(file) = slot.take() {
                fs.close(file);
            }
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
