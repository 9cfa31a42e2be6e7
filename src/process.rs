use std::process::{Command, Output};

/// Create a [`std::process::Command`] that does **not** flash a console
/// window on Windows.  On other platforms this is identical to
/// `std::process::Command::new(program)`.
pub fn command(program: &str) -> Command {
    #![allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Run a command and capture its output, treating a missing binary or any
/// spawn failure as "nothing to report" rather than propagating an error.
/// Every subprocess probe in this crate (tmux, port enumeration tools) is
/// best-effort: their absence is a degraded mode, not a fatal error.
pub fn safe_output(cmd: &mut Command) -> std::io::Result<Output> {
    cmd.output()
}
