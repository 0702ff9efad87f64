#![cfg(target_os = "linux")]

//! Grouped perf counter handles over `perf_event_open`.
//!
//! All members of a [`CounterGroup`] share one scheduling group: the
//! first opened member is the leader, and enabling or disabling the
//! leader starts or stops every member at the same instant.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::path::Path;

use perf_event_open_sys as sys;
use thiserror::Error;

use crate::catalog::CounterId;

/// Errors from the perf counter group layer.
#[derive(Error, Debug)]
pub(crate) enum GroupError {
    #[error("failed to open perf event: {0}")]
    Open(io::Error),

    #[error("failed to read perf event: {0}")]
    Read(io::Error),

    #[error("failed to enable perf event group: {0}")]
    Enable(io::Error),
}

/// One read of a counter opened with
/// `PERF_FORMAT_TOTAL_TIME_ENABLED | PERF_FORMAT_TOTAL_TIME_RUNNING`:
/// the raw count plus how long the counter was logically enabled and
/// how long it actually ran on a hardware register.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sample {
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
}

/// Returns whether this kernel exposes perf counters.
///
/// Checking for the paranoid control file is the documented probe.
pub(crate) fn supported() -> bool {
    Path::new("/proc/sys/kernel/perf_event_paranoid").exists()
}

/// A set of counter fds sharing one perf scheduling group.
pub(crate) struct CounterGroup {
    fds: Vec<RawFd>,
}

impl CounterGroup {
    pub fn new() -> Self {
        CounterGroup { fds: Vec::new() }
    }

    /// Number of successfully opened members.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    fn leader(&self) -> RawFd {
        self.fds.first().copied().unwrap_or(-1)
    }

    /// Opens a counting fd for `id` and adds it to the group.
    ///
    /// The first member becomes the group leader and is opened
    /// disabled; later members join via the leader and start gated on
    /// it, so the whole group is enabled atomically at start time.
    pub fn open_member(&mut self, id: CounterId) -> Result<(), GroupError> {
        let mut attr = sys::bindings::perf_event_attr::default();
        attr.size = mem::size_of::<sys::bindings::perf_event_attr>() as u32;
        attr.type_ = id.kind;
        attr.config = id.config;
        // Per-counter enabled/running times are what make extrapolation
        // of multiplexed counters possible. PERF_FORMAT_GROUP would
        // collapse them into one pair, so members are read one by one.
        attr.read_format = u64::from(
            sys::bindings::PERF_FORMAT_TOTAL_TIME_ENABLED
                | sys::bindings::PERF_FORMAT_TOTAL_TIME_RUNNING,
        );
        // Count in children forked or spawned after start.
        attr.set_inherit(1);
        attr.set_exclude_kernel(1); // required when perf_event_paranoid == 1
        attr.set_exclude_hv(1);

        let group_fd = self.leader();
        if group_fd == -1 {
            // Followers are gated on the leader, so only it is opened
            // disabled; enabling happens explicitly at start.
            attr.set_disabled(1);
        }

        let fd = unsafe {
            sys::perf_event_open(
                &mut attr,
                0,  // this process
                -1, // any CPU
                group_fd,
                sys::bindings::PERF_FLAG_FD_CLOEXEC as libc::c_ulong,
            )
        };
        if fd < 0 {
            return Err(GroupError::Open(io::Error::last_os_error()));
        }

        // Start the count from zero to make overflow less likely in
        // long-running processes.
        unsafe { libc::ioctl(fd, sys::bindings::RESET as libc::c_ulong, 0) };

        self.fds.push(fd);
        Ok(())
    }

    /// Enables the leader, atomically starting every member.
    pub fn enable(&self) -> Result<(), GroupError> {
        let ret = unsafe { libc::ioctl(self.leader(), sys::bindings::ENABLE as libc::c_ulong, 0) };
        if ret < 0 {
            return Err(GroupError::Enable(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Disables the leader, atomically stopping every member so they
    /// all cover the identical interval.
    pub fn disable(&self) {
        unsafe { libc::ioctl(self.leader(), sys::bindings::DISABLE as libc::c_ulong, 0) };
    }

    /// Reads the `member`-th opened counter.
    ///
    /// A short read with `EAGAIN` means the counter is momentarily
    /// being rescheduled; it is retried immediately, without bound.
    pub fn read_member(&self, member: usize) -> Result<Sample, GroupError> {
        let fd = self.fds[member];
        let mut sample = Sample::default();
        loop {
            let n = unsafe {
                libc::read(
                    fd,
                    &mut sample as *mut Sample as *mut libc::c_void,
                    mem::size_of::<Sample>(),
                )
            };
            if n == mem::size_of::<Sample>() as isize {
                return Ok(sample);
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                continue;
            }
            return Err(GroupError::Read(err));
        }
    }
}

impl Drop for CounterGroup {
    fn drop(&mut self) {
        for &fd in &self.fds {
            assert!(fd >= 0);
            // A close failure after a successful open means the fd
            // table is corrupt; there is no sane recovery.
            assert_eq!(unsafe { libc::close(fd) }, 0, "failed to close perf fd {fd}");
        }
    }
}
