//! Minimal SIGINT/SIGTERM handling: block the signals on the main thread
//! and wait for them on a dedicated one, so the main loop can check a flag
//! instead of being interrupted mid-iteration.

use std::sync::atomic::{AtomicBool, Ordering};

static HANDLER_SET: AtomicBool = AtomicBool::new(false);

pub fn on_shutdown(f: impl Fn() + Send + 'static) {
    if HANDLER_SET.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = std::thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            wait_for_signal();
            f();
        });
}

#[cfg(unix)]
fn wait_for_signal() {
    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        libc::sigaddset(&mut mask, libc::SIGINT);
        libc::sigaddset(&mut mask, libc::SIGTERM);
        libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
        let mut sig: libc::c_int = 0;
        libc::sigwait(&mask, &mut sig);
    }
}

#[cfg(not(unix))]
fn wait_for_signal() {
    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
}
