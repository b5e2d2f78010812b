use anyhow::{Context, Result};
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Manages the interpreter process running inside a PTY.
///
/// Dropping the session kills the interpreter if it is still running.
pub struct PtySession {
    // Never read, but closing the master hangs up the PTY.
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
}

impl PtySession {
    /// Spawn a program in a PTY, returning the session and reader separately.
    ///
    /// The child inherits the caller's environment and working directory.
    pub fn spawn(program: &str, args: &[String]) -> Result<(Self, Box<dyn Read + Send>)> {
        let pty_system = portable_pty::native_pty_system();

        // Wide enough that ordinary command output is not wrapped by the PTY.
        let pty_size = PtySize {
            rows: 50,
            cols: 250,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(pty_size)
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        for arg in args {
            cmd.arg(arg);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn shell: {}", program))?;

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        debug!(program, pid = ?child.process_id(), "spawned in PTY");
        let session = PtySession {
            _master: pair.master,
            child,
            writer,
        };

        Ok((session, reader))
    }

    /// Write data to the interpreter's stdin
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Check if the interpreter is still running
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        match self.child.kill() {
            Ok(()) => {
                // Reap it so no zombie is left behind.
                let _ = self.child.wait();
            }
            Err(err) => warn!(error = %err, "failed to kill interpreter"),
        }
    }
}
