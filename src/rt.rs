use nix::libc;
use std::io;

/// Moves the calling thread to `SCHED_FIFO` at `priority` and reads the
/// policy back. Nothing changes when the priority is out of range or the
/// process lacks the privilege.
pub(crate) fn promote_to_fifo(priority: i32) -> io::Result<()> {
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    if !(min..=max).contains(&priority) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("SCHED_FIFO priority {priority} outside {min}..={max}"),
        ));
    }

    let thread = unsafe { libc::pthread_self() };
    let mut param = unsafe { std::mem::zeroed::<libc::sched_param>() };
    param.sched_priority = priority;
    let rc = unsafe { libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    let mut policy = 0;
    let rc = unsafe { libc::pthread_getschedparam(thread, &mut policy, &mut param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    if policy != libc::SCHED_FIFO || param.sched_priority != priority {
        return Err(io::Error::other(format!(
            "scheduler reports policy {policy} priority {}",
            param.sched_priority
        )));
    }
    Ok(())
}
