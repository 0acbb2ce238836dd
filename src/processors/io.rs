//! Processors bridging payloads to `std::io` readers and writers.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Mutex;

use crate::error::PipelineResult;
use crate::payload::{BoxedPayload, JsonPayload};
use crate::processor::{Emitter, KillSwitch, Processor};

/// Source that reads an `io::Read` when triggered and emits its content.
///
/// By default each line becomes one payload; with `whole` the entire input is
/// emitted as a single payload. The reader is consumed by the first trigger;
/// further triggers are no-ops.
pub struct IoReader<R> {
    reader: Mutex<Option<BufReader<R>>>,
    line_by_line: bool,
}

impl<R: Read + Send> IoReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(BufReader::new(reader))),
            line_by_line: true,
        }
    }

    /// Emits the whole input as one payload instead of one per line.
    pub fn whole(mut self) -> Self {
        self.line_by_line = false;
        self
    }
}

impl<R: Read + Send> Processor for IoReader<R> {
    fn name(&self) -> &str {
        "IoReader"
    }

    fn process(&self, _data: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        let Some(mut reader) = self.reader.lock().unwrap().take() else {
            return Ok(());
        };
        if self.line_by_line {
            for line in reader.lines() {
                out.emit(JsonPayload::from(line?).boxed())?;
            }
        } else {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer)?;
            out.emit(JsonPayload::from(buffer).boxed())?;
        }
        Ok(())
    }
}

/// Sink that writes each payload's bytes to an `io::Write`, optionally
/// newline-terminated. Flushes once the input is drained.
pub struct IoWriter<W> {
    writer: Mutex<W>,
    add_newline: bool,
}

impl<W: Write + Send> IoWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            add_newline: false,
        }
    }

    /// Terminates every written payload with a newline.
    pub fn with_newline(mut self) -> Self {
        self.add_newline = true;
        self
    }
}

impl<W: Write + Send> Processor for IoWriter<W> {
    fn name(&self) -> &str {
        "IoWriter"
    }

    fn process(&self, data: BoxedPayload, _out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(data.bytes())?;
        if self.add_newline {
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn finish(&self, _out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        self.writer.lock().unwrap().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    fn trigger() -> BoxedPayload {
        JsonPayload::from("GO".as_bytes().to_vec()).boxed()
    }

    #[test]
    fn reader_emits_one_payload_per_line() {
        let reader = IoReader::new(Cursor::new("{\"a\":1}\n{\"a\":2}\n"));
        let (out_tx, out_rx) = flume::unbounded();
        let (kill_tx, _kill_rx) = flume::unbounded();
        let out = Emitter::new(out_tx);
        let kill = KillSwitch::new(kill_tx);

        reader.process(trigger(), &out, &kill).unwrap();
        // A second trigger finds the reader consumed.
        reader.process(trigger(), &out, &kill).unwrap();

        let lines: Vec<Vec<u8>> = out_rx.try_iter().map(|p| p.bytes().to_vec()).collect();
        assert_eq!(lines, vec![b"{\"a\":1}".to_vec(), b"{\"a\":2}".to_vec()]);
    }

    #[test]
    fn reader_can_emit_the_whole_input_at_once() {
        let reader = IoReader::new(Cursor::new("[1,2,3]")).whole();
        let (out_tx, out_rx) = flume::unbounded();
        let (kill_tx, _kill_rx) = flume::unbounded();
        reader
            .process(trigger(), &Emitter::new(out_tx), &KillSwitch::new(kill_tx))
            .unwrap();
        assert_eq!(out_rx.try_recv().unwrap().bytes(), b"[1,2,3]");
    }

    /// A cloneable buffer so tests can inspect what the sink wrote.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_appends_payload_bytes_and_newlines() {
        let buf = SharedBuf::default();
        let writer = IoWriter::new(buf.clone()).with_newline();
        let (out_tx, _out_rx) = flume::unbounded();
        let (kill_tx, _kill_rx) = flume::unbounded();
        let out = Emitter::new(out_tx);
        let kill = KillSwitch::new(kill_tx);

        writer
            .process(JsonPayload::from(r#"{"a":1}"#).boxed(), &out, &kill)
            .unwrap();
        writer.finish(&out, &kill).unwrap();

        assert_eq!(&*buf.0.lock().unwrap(), b"{\"a\":1}\n");
    }
}
