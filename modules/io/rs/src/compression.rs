use eyre::{ensure, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Input stream with the compression layer removed.
pub enum Decompressed<R: Read> {
    PlainText(BufReader<R>),
    Gzip(BufReader<MultiGzDecoder<BufReader<R>>>),
}

impl<R: Read + Send + 'static> Decompressed<R> {
    /// Sniff the first bytes of the stream and wrap it into a decoder when they carry a gzip
    /// signature. Anything else is assumed to be plain text.
    pub fn new(inner: R) -> Result<Self> {
        let mut reader = BufReader::new(inner);
        let is_gzip = infer::archive::is_gz(reader.fill_buf()?);

        let stream = if is_gzip {
            Decompressed::Gzip(BufReader::new(MultiGzDecoder::new(reader)))
        } else {
            Decompressed::PlainText(reader)
        };
        Ok(stream)
    }

    pub fn boxed(self) -> Box<dyn BufRead + Send + 'static> {
        match self {
            Decompressed::PlainText(reader) => Box::new(reader),
            Decompressed::Gzip(reader) => Box::new(reader),
        }
    }
}

/// Open a plain or gzip-compressed file for buffered reading.
pub fn open(path: impl AsRef<Path>) -> Result<Box<dyn BufRead + Send + 'static>> {
    let path = path.as_ref();
    ensure!(path.exists(), "File {} does not exist", path.display());

    let stream = Decompressed::new(File::open(path)?)?;
    if let Decompressed::Gzip(_) = stream {
        log::debug!("Reading gzip-compressed input from {}", path.display());
    }
    Ok(stream.boxed())
}
