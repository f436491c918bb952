use std::{
    ffi::OsString,
    io::Read,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn max_capture_bytes() -> usize {
    std::env::var("VX_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Execute a program and capture stdout/stderr, optionally bounded by a
/// wall-clock limit. On expiry the child is killed and `timed_out` is set;
/// the captured streams still hold whatever the child produced.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams
/// cannot be read entirely.
pub fn run_command(
    program: &Path,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<RunOutput> {
    let mut command = Command::new(program);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {}", program.display()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {}", program.display()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {}", program.display()))?;
    let limit = max_capture_bytes();
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let (status, timed_out) = wait_with_timeout(&mut child, timeout)
        .with_context(|| format!("failed to wait for {}", program.display()))?;
    let code = status.code().unwrap_or(-1);
    let (mut stdout, stdout_truncated) = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let (mut stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    if stdout_truncated {
        stdout.push_str("\n[...truncated...]\n");
    }
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok(RunOutput {
        code,
        stdout,
        stderr,
        timed_out,
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(limit) = timeout else {
        return Ok((child.wait()?, false));
    };
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            let status = child.wait()?;
            return Ok((status, true));
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> Result<(String, bool)> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sh(script: &str) -> Vec<OsString> {
        vec![OsString::from("-c"), OsString::from(script)]
    }

    #[cfg(unix)]
    #[test]
    fn run_command_captures_output_and_status_unix() -> Result<()> {
        let output = run_command(
            Path::new("/bin/sh"),
            &sh("printf out && printf err >&2; exit 7"),
            None,
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(!output.timed_out);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_truncates_large_output_unix() -> Result<()> {
        let bytes = DEFAULT_MAX_CAPTURE_BYTES + 1024;
        let output = run_command(
            Path::new("/bin/sh"),
            &sh(&format!("head -c {bytes} /dev/zero | tr '\\0' a")),
            None,
        )?;
        assert!(
            output.stdout.contains("[...truncated...]"),
            "stdout should include truncation marker"
        );
        assert!(
            output.stdout.len() <= DEFAULT_MAX_CAPTURE_BYTES + 64,
            "stdout should be bounded"
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_kills_child_on_timeout_unix() -> Result<()> {
        let started = Instant::now();
        let output = run_command(
            Path::new("/bin/sh"),
            &sh("sleep 30"),
            Some(Duration::from_millis(200)),
        )?;
        assert!(output.timed_out);
        assert_ne!(output.code, 0);
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "timeout should not wait for the child's natural exit"
        );
        Ok(())
    }

    #[test]
    fn run_command_reports_missing_program() {
        let err = run_command(Path::new("/nonexistent/definitely-not-here"), &[], None)
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
