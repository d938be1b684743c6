//! Buffered streaming between channels.

use std::io::{self, Read, Write};

use crate::{CancellationToken, OpError, OpResult, Uri};

/// Copy everything from `reader` to `writer` through a buffer of
/// `buffer_size` bytes and flush the writer. Returns the number of bytes
/// copied.
///
/// `cancel` is checked before every chunk; a cancelled copy stops with
/// [`OpError::Interrupted`] for `source`, leaving the bytes already written in
/// place. Read errors are reported against `source`, write errors against
/// `target`.
pub fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    cancel: &CancellationToken,
    source: &Uri,
    target: &Uri,
) -> OpResult<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;
    loop {
        cancel.check(source)?;
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(OpError::io("read", source, e)),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|e| OpError::io("write", target, e))?;
        copied += n as u64;
    }
    writer
        .flush()
        .map_err(|e| OpError::io("write", target, e))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris() -> (Uri, Uri) {
        (
            Uri::parse("mem://h/src").unwrap(),
            Uri::parse("mem://h/dst").unwrap(),
        )
    }

    #[test]
    fn copies_across_chunk_boundaries() {
        let (source, target) = uris();
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut out = Vec::new();
        let copied = pump(
            &mut data.as_slice(),
            &mut out,
            7,
            &CancellationToken::new(),
            &source,
            &target,
        )
        .unwrap();
        assert_eq!(copied, 10_000);
        assert_eq!(out, data);
    }

    #[test]
    fn cancelled_token_stops_before_first_chunk() {
        let (source, target) = uris();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let err = pump(&mut &b"data"[..], &mut out, 2, &cancel, &source, &target).unwrap_err();
        assert!(err.is_interrupted());
        assert!(out.is_empty());
    }

    #[test]
    fn cancellation_between_chunks_keeps_written_bytes() {
        struct CancelAfterFirst<'a> {
            data: &'a [u8],
            cancel: CancellationToken,
        }

        impl Read for CancelAfterFirst<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = self.data.read(buf)?;
                self.cancel.cancel();
                Ok(n)
            }
        }

        let (source, target) = uris();
        let cancel = CancellationToken::new();
        let mut reader = CancelAfterFirst {
            data: b"abcdef",
            cancel: cancel.clone(),
        };
        let mut out = Vec::new();
        let err = pump(&mut reader, &mut out, 2, &cancel, &source, &target).unwrap_err();
        assert!(matches!(err, OpError::Interrupted { uri } if uri == source));
        assert_eq!(out, b"ab");
    }

    #[test]
    fn write_errors_name_the_target() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (source, target) = uris();
        let err = pump(
            &mut &b"x"[..],
            &mut Broken,
            4,
            &CancellationToken::new(),
            &source,
            &target,
        )
        .unwrap_err();
        assert!(matches!(err, OpError::Io { operation: "write", uri, .. } if uri == target));
    }
}
