//! Bridges OS signals to the atomic flags the control loop polls at tick
//! boundaries. Signal handlers only ever set an atomic flag — no I/O, no
//! allocation, nothing a signal handler can't safely do.
//!
//! Parks a dedicated thread on `libc::sigwait` rather than installing an
//! async-signal handler. SIGINT/SIGTERM request shutdown; SIGHUP requests a
//! config reload.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::control_loop::SignalFlags;

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Spawns the signal-waiting thread exactly once per process. SIGINT/SIGTERM
/// set `flags.stop`; SIGHUP sets `flags.reload`. Both are plain atomic stores
/// — no I/O, no allocation, nothing the signal-safety rules would forbid.
pub fn install(flags: SignalFlags) {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = std::thread::Builder::new()
        .name("signal".into())
        .spawn(move || wait_loop(flags));
}

#[cfg(unix)]
fn wait_loop(flags: SignalFlags) {
    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        libc::sigaddset(&mut mask, libc::SIGINT);
        libc::sigaddset(&mut mask, libc::SIGTERM);
        libc::sigaddset(&mut mask, libc::SIGHUP);
        libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
        loop {
            let mut sig: libc::c_int = 0;
            let rc = libc::sigwait(&mask, &mut sig);
            if rc != 0 {
                continue;
            }
            match sig {
                libc::SIGHUP => flags.reload.store(true, Ordering::Relaxed),
                _ => {
                    flags.stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
    }
}

#[cfg(not(unix))]
fn wait_loop(flags: SignalFlags) {
    // No portable signal-to-atomic bridge outside unix; the admin-command
    // path (not implemented by this binary) would set the same flags.
    let _ = flags;
}
