use std::{
  io::{self, Read},
  process::{Command, Output, Stdio},
  thread::{self, JoinHandle},
  time::Duration,
};

use wait_timeout::ChildExt as WaitExt;

#[extend::ext]
pub impl Output {
  fn stdout_lossy(&self) -> String {
    String::from_utf8_lossy(&self.stdout).into_owned()
  }
}

#[extend::ext]
pub impl Command {
  /// Runs the command to completion, capturing stdout and stderr. With a
  /// `timeout`, the child is killed once it elapses and `Ok(None)` is
  /// returned. Without one, this blocks until the child exits.
  fn output_timeout(&mut self, timeout: Option<Duration>) -> io::Result<Option<Output>> {
    let Some(timeout) = timeout else {
      return self.output().map(Some);
    };

    let mut child = self
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()?;

    // Both pipes are drained while waiting, a full pipe would stall the child.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(timeout)? else {
      child.kill()?;
      child.wait()?;

      return Ok(None);
    };

    Ok(Some(Output {
      status,
      stdout: join(stdout)?,
      stderr: join(stderr)?,
    }))
  }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
      pipe.read_to_end(&mut buf)?;
    }

    Ok(buf)
  })
}

fn join(handle: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
  handle
    .join()
    .map_err(|_| io::Error::other("pipe reader panicked"))?
}
