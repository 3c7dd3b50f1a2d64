//! Test helper utilities and common functionality.

use crate::arch::NoOpArch;
use crate::errors::MemoryError;
use crate::fs::{FileHandle, FileOps, InodeHandle};
use crate::mem::vm::{pg_round_down, AddressSpace, VirtualMemory};
use crate::sched::HybridScheduler;
use crate::thread::ProcTable;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;

use alloc::collections::{BTreeMap, BTreeSet};
use core::mem::size_of;

/// Table type used throughout the tests.
pub type TestTable = ProcTable<NoOpArch, HybridScheduler>;

/// One address space of the mock platform.
#[derive(Debug, Default)]
struct MockSpace {
    size: usize,
    /// Bytes written through `copy_out`
    bytes: BTreeMap<usize, u8>,
    /// Pages made inaccessible to user mode
    guards: BTreeSet<usize>,
}

/// In-memory stand-in for the virtual-memory and file collaborators.
///
/// Address spaces are plain maps. Every operation can be told to fail so
/// that rollback paths can be exercised.
pub struct MockPlatform {
    spaces: Mutex<BTreeMap<usize, MockSpace>>,
    next_space: AtomicUsize,
    fail_create: AtomicBool,
    fail_duplicate: AtomicBool,
    fail_grow: AtomicBool,
    fail_copy_out: AtomicBool,
    /// Outstanding file references taken through `dup`
    file_refs: AtomicUsize,
    /// Outstanding inode references taken through `idup` and `root`
    inode_refs: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            spaces: Mutex::new(BTreeMap::new()),
            next_space: AtomicUsize::new(0x1000),
            fail_create: AtomicBool::new(false),
            fail_duplicate: AtomicBool::new(false),
            fail_grow: AtomicBool::new(false),
            fail_copy_out: AtomicBool::new(false),
            file_refs: AtomicUsize::new(0),
            inode_refs: AtomicUsize::new(0),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_duplicate(&self, fail: bool) {
        self.fail_duplicate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_grow(&self, fail: bool) {
        self.fail_grow.store(fail, Ordering::SeqCst);
    }

    pub fn fail_copy_out(&self, fail: bool) {
        self.fail_copy_out.store(fail, Ordering::SeqCst);
    }

    /// Number of address spaces created and not yet destroyed.
    pub fn live_spaces(&self) -> usize {
        self.spaces.lock().len()
    }

    pub fn size_of(&self, space: AddressSpace) -> Option<usize> {
        self.spaces.lock().get(&space.raw()).map(|s| s.size)
    }

    /// Read back a word written with `copy_out`.
    pub fn read_word(&self, space: AddressSpace, va: usize) -> Option<usize> {
        let spaces = self.spaces.lock();
        let space = spaces.get(&space.raw())?;
        let mut word = [0u8; size_of::<usize>()];
        for (offset, byte) in word.iter_mut().enumerate() {
            *byte = *space.bytes.get(&(va + offset))?;
        }
        Some(usize::from_ne_bytes(word))
    }

    pub fn is_guard(&self, space: AddressSpace, va: usize) -> bool {
        self.spaces
            .lock()
            .get(&space.raw())
            .map_or(false, |s| s.guards.contains(&pg_round_down(va)))
    }

    pub fn file_refs(&self) -> usize {
        self.file_refs.load(Ordering::SeqCst)
    }

    pub fn inode_refs(&self) -> usize {
        self.inode_refs.load(Ordering::SeqCst)
    }

    fn new_space(&self, size: usize) -> AddressSpace {
        let raw = self.next_space.fetch_add(0x1000, Ordering::SeqCst);
        self.spaces.lock().insert(raw, MockSpace { size, ..MockSpace::default() });
        AddressSpace::new(raw).unwrap()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMemory for MockPlatform {
    fn create(&self) -> Option<AddressSpace> {
        if self.fail_create.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.new_space(0))
    }

    fn load_init(&self, space: AddressSpace, image: &[u8]) {
        let mut spaces = self.spaces.lock();
        let target = spaces.get_mut(&space.raw()).expect("load into unknown space");
        target.size = crate::config::PGSIZE;
        for (offset, byte) in image.iter().enumerate() {
            target.bytes.insert(offset, *byte);
        }
    }

    fn duplicate(&self, space: AddressSpace, size: usize) -> Option<AddressSpace> {
        if self.fail_duplicate.load(Ordering::SeqCst) {
            return None;
        }
        let bytes = self.spaces.lock().get(&space.raw())?.bytes.clone();
        let copy = self.new_space(size);
        self.spaces.lock().get_mut(&copy.raw())?.bytes = bytes;
        Some(copy)
    }

    fn grow(&self, space: AddressSpace, old_size: usize, new_size: usize) -> Option<usize> {
        if self.fail_grow.load(Ordering::SeqCst) {
            return None;
        }
        let mut spaces = self.spaces.lock();
        let target = spaces.get_mut(&space.raw())?;
        assert_eq!(target.size, old_size, "grow from a stale size");
        target.size = new_size;
        Some(new_size)
    }

    fn shrink(&self, space: AddressSpace, old_size: usize, new_size: usize) -> usize {
        let mut spaces = self.spaces.lock();
        let Some(target) = spaces.get_mut(&space.raw()) else {
            return old_size;
        };
        target.size = new_size;
        target.bytes.retain(|va, _| *va < new_size);
        target.guards.retain(|va| *va < new_size);
        new_size
    }

    fn destroy(&self, space: AddressSpace) {
        let removed = self.spaces.lock().remove(&space.raw());
        assert!(removed.is_some(), "destroy of unknown space {:#x}", space.raw());
    }

    fn clear_user(&self, space: AddressSpace, va: usize) {
        if let Some(target) = self.spaces.lock().get_mut(&space.raw()) {
            target.guards.insert(pg_round_down(va));
        }
    }

    fn copy_out(&self, space: AddressSpace, va: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        if self.fail_copy_out.load(Ordering::SeqCst) {
            return Err(MemoryError::CopyOutFailed(va));
        }
        let mut spaces = self.spaces.lock();
        let target = spaces.get_mut(&space.raw()).ok_or(MemoryError::CopyOutFailed(va))?;
        if va + bytes.len() > target.size {
            return Err(MemoryError::CopyOutFailed(va));
        }
        for (offset, byte) in bytes.iter().enumerate() {
            target.bytes.insert(va + offset, *byte);
        }
        Ok(())
    }
}

impl FileOps for MockPlatform {
    fn dup(&self, file: FileHandle) -> FileHandle {
        self.file_refs.fetch_add(1, Ordering::SeqCst);
        file
    }

    fn close(&self, _file: FileHandle) {
        self.file_refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn idup(&self, inode: InodeHandle) -> InodeHandle {
        self.inode_refs.fetch_add(1, Ordering::SeqCst);
        inode
    }

    fn iput(&self, _inode: InodeHandle) {
        self.inode_refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn root(&self) -> InodeHandle {
        self.inode_refs.fetch_add(1, Ordering::SeqCst);
        InodeHandle(1)
    }
}

/// Simple linear congruential generator for property testing.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    pub fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        min + ((self.next_u64() >> 33) % (max - min))
    }

    pub fn gen_bool(&mut self) -> bool {
        (self.next_u64() >> 33) & 1 == 0
    }
}
