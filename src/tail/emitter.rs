use std::io::{self, Write};

use tracing::warn;

use super::TraceSnapshot;

/// Number of trace bytes already written to the sink in this session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitCursor {
    bytes_written: usize,
}

impl EmitCursor {
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// Writes the part of `snapshot` that follows the first `previous_len`
/// bytes and returns the new length.
///
/// A body shorter than `previous_len` means the trace was restarted on the
/// server, so the whole body is written again.
pub fn emit<W: Write + ?Sized>(
    previous_len: usize,
    snapshot: &TraceSnapshot,
    sink: &mut W,
) -> io::Result<usize> {
    let body = &snapshot.body;
    let fresh = if body.len() < previous_len {
        warn!(
            previous_len,
            new_len = body.len(),
            "trace is shorter than before, the job log was restarted"
        );
        &body[..]
    } else {
        &body[previous_len..]
    };

    if !fresh.is_empty() {
        sink.write_all(fresh)?;
        sink.flush()?;
    }

    Ok(body.len())
}

/// Owns the sink and cursor of one tail session.
pub struct Emitter<W> {
    sink: W,
    cursor: EmitCursor,
    restarts: u32,
}

impl<W: Write> Emitter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            cursor: EmitCursor::default(),
            restarts: 0,
        }
    }

    pub fn emit(&mut self, snapshot: &TraceSnapshot) -> io::Result<()> {
        let previous_len = self.cursor.bytes_written;
        let new_len = emit(previous_len, snapshot, &mut self.sink)?;
        if new_len < previous_len {
            self.restarts += 1;
        }
        self.cursor.bytes_written = new_len;
        Ok(())
    }

    pub fn cursor(&self) -> EmitCursor {
        self.cursor
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail::JobStatus;

    /// Records every write separately so tests can check the deltas.
    #[derive(Default)]
    struct Chunks(Vec<Vec<u8>>);

    impl Write for Chunks {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn running(body: &str) -> TraceSnapshot {
        TraceSnapshot::new(body.as_bytes(), JobStatus::Running)
    }

    #[test]
    fn emit_writes_only_the_new_suffix() {
        let mut out = Vec::new();
        let len = emit(0, &running("hello"), &mut out).unwrap();
        assert_eq!(len, 5);
        let len = emit(len, &running("hello world"), &mut out).unwrap();
        assert_eq!(len, 11);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn emit_rewrites_everything_when_body_shrinks() {
        let mut out = Vec::new();
        let len = emit(5, &running("X"), &mut out).unwrap();
        assert_eq!(len, 1);
        assert_eq!(out, b"X");
    }

    #[test]
    fn unchanged_body_writes_nothing() {
        let mut sink = Chunks::default();
        let mut emitter = Emitter::new(&mut sink);
        emitter.emit(&running("abc")).unwrap();
        emitter.emit(&running("abc")).unwrap();
        assert_eq!(emitter.cursor().bytes_written(), 3);
        drop(emitter);
        assert_eq!(sink.0, vec![b"abc".to_vec()]);
    }

    #[test]
    fn growing_bodies_concatenate_to_the_final_body() {
        let bodies = [
            "",
            "Running with gitlab-runner",
            "Running with gitlab-runner\n$ make",
            "Running with gitlab-runner\n$ make\nok\n",
        ];
        let mut out = Vec::new();
        let mut emitter = Emitter::new(&mut out);
        for body in bodies {
            emitter.emit(&running(body)).unwrap();
            assert!(emitter.cursor().bytes_written() <= body.len());
        }
        assert_eq!(emitter.restarts(), 0);
        drop(emitter);
        assert_eq!(out, bodies[3].as_bytes());
    }

    #[test]
    fn restart_then_growth_continues_from_new_body() {
        let mut sink = Chunks::default();
        let mut emitter = Emitter::new(&mut sink);
        for body in ["ABCDE", "X", "XY"] {
            emitter.emit(&running(body)).unwrap();
        }
        assert_eq!(emitter.restarts(), 1);
        assert_eq!(emitter.cursor().bytes_written(), 2);
        drop(emitter);
        assert_eq!(
            sink.0,
            vec![b"ABCDE".to_vec(), b"X".to_vec(), b"Y".to_vec()]
        );
    }

    #[test]
    fn write_errors_propagate() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut emitter = Emitter::new(Broken);
        let err = emitter.emit(&running("data")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(emitter.cursor().bytes_written(), 0);
    }
}
