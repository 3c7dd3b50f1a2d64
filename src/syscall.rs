//! System call surface of the scheduling core.
//!
//! Arguments arrive already fetched from the trap frame. Every recoverable
//! failure is reported to user space as `-1`.

use crate::arch::Arch;
use crate::errors::{InvalidOperationError, KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::sched::Scheduler;
use crate::thread::Pid;
use crate::time::Ticks;

/// A decoded system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Fork,
    Exit,
    Wait,
    Kill(usize),
    Yield,
    GetPid,
    Sbrk(isize),
    Sleep(Ticks),
    SetCpuShare(u32),
    ThreadCreate { entry: usize, arg: usize },
    /// Join `tid` and store its return value at user address `retval_addr`.
    ThreadJoin { tid: usize, retval_addr: usize },
    ThreadExit(usize),
}

impl Syscall {
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Fork => "fork",
            Syscall::Exit => "exit",
            Syscall::Wait => "wait",
            Syscall::Kill(_) => "kill",
            Syscall::Yield => "yield",
            Syscall::GetPid => "getpid",
            Syscall::Sbrk(_) => "sbrk",
            Syscall::Sleep(_) => "sleep",
            Syscall::SetCpuShare(_) => "set_cpu_share",
            Syscall::ThreadCreate { .. } => "thread_create",
            Syscall::ThreadJoin { .. } => "thread_join",
            Syscall::ThreadExit(_) => "thread_exit",
        }
    }
}

fn pid_arg(raw: usize) -> KernelResult<Pid> {
    Pid::new(raw).ok_or(KernelError::InvalidOperation(InvalidOperationError::InvalidPid(raw)))
}

impl<A: Arch, P: Platform, S: Scheduler> Kernel<A, P, S> {
    /// Execute `call` for the unit running on `cpu`.
    ///
    /// # Returns
    ///
    /// The value placed in the user's return register.
    pub fn syscall(&self, cpu: usize, call: Syscall) -> isize {
        let result = match call {
            Syscall::Fork => self.fork(cpu).map(Pid::get),
            Syscall::Exit => self.exit(cpu),
            Syscall::Wait => self.wait(cpu).map(Pid::get),
            Syscall::Kill(raw) => pid_arg(raw).and_then(|pid| self.kill(pid)).map(|()| 0),
            Syscall::Yield => self.yield_now(cpu).map(|()| 0),
            Syscall::GetPid => self.getpid(cpu).map(Pid::get),
            Syscall::Sbrk(delta) => self.grow(cpu, delta),
            Syscall::Sleep(duration) => self.sleep_ticks(cpu, duration).map(|()| 0),
            Syscall::SetCpuShare(share) => self.set_cpu_share(cpu, share).map(|granted| granted as usize),
            Syscall::ThreadCreate { entry, arg } => self.thread_create(cpu, entry, arg).map(Pid::get),
            Syscall::ThreadJoin { tid, retval_addr } => self.sys_thread_join(cpu, tid, retval_addr),
            Syscall::ThreadExit(retval) => self.thread_exit(cpu, retval),
        };

        match result {
            Ok(value) => value as isize,
            Err(err) => {
                log::debug!("syscall {} on cpu{} failed: {}", call.name(), cpu, err);
                KernelError::SYSCALL_FAILURE
            }
        }
    }

    fn sys_thread_join(&self, cpu: usize, tid: usize, retval_addr: usize) -> KernelResult<usize> {
        let tid = pid_arg(tid)?;
        let retval = self.thread_join(cpu, tid)?;

        let pid = self.getpid(cpu)?;
        let space = self
            .with_table(|table| table.get(pid).and_then(|unit| unit.binding().space()))
            .ok_or(InvalidOperationError::NoAddressSpace(pid))?;
        self.platform().copy_out(space, retval_addr, &retval.to_ne_bytes())?;
        Ok(0)
    }
}
