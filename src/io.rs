// io.rs

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// A buffered, possibly decompressing, text input.
pub type BoxedRead = BufReader<Box<dyn Read>>;

/// A text input that is transparently gunzipped when it starts with the
/// gzip magic bytes.
pub struct InputStream {
    filepath: PathBuf,
}

impl InputStream {
    pub fn new(filepath: &Path) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    fn is_gzipped(file: &mut File) -> io::Result<bool> {
        let mut header = [0u8; 2];
        let n = file.read(&mut header)?;
        file.rewind()?;
        Ok(n == 2 && header == GZIP_MAGIC)
    }

    pub fn reader(&self) -> Result<BoxedRead> {
        let mut file = File::open(&self.filepath)?;
        let reader: Box<dyn Read> = if Self::is_gzipped(&mut file)? {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, reader))
    }
}

#[derive(Clone)]
pub struct OutputStreamBuilder {
    filepath: Option<PathBuf>,
    buffer_size: usize,
}

impl Default for OutputStreamBuilder {
    fn default() -> Self {
        Self {
            filepath: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl OutputStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filepath(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.filepath = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn build(self) -> OutputStream {
        OutputStream {
            filepath: self.filepath,
            buffer_size: self.buffer_size,
        }
    }
}

/// A text output: stdout, a plain file, or a gzip file when the path ends in `.gz`.
pub struct OutputStream {
    filepath: Option<PathBuf>,
    buffer_size: usize,
}

impl OutputStream {
    pub fn new(filepath: Option<impl AsRef<Path>>) -> Self {
        OutputStreamBuilder::new().filepath(filepath).build()
    }

    pub fn builder() -> OutputStreamBuilder {
        OutputStreamBuilder::new()
    }

    fn should_compress(&self) -> bool {
        self.filepath
            .as_ref()
            .map_or(false, |p| p.extension().map_or(false, |ext| ext == "gz"))
    }

    pub fn writer(&self) -> Result<Box<dyn Write>> {
        match &self.filepath {
            Some(path) => {
                let file = File::create(path)?;
                let writer: Box<dyn Write> = if self.should_compress() {
                    Box::new(BufWriter::with_capacity(
                        self.buffer_size,
                        GzEncoder::new(file, Compression::default()),
                    ))
                } else {
                    Box::new(BufWriter::with_capacity(self.buffer_size, file))
                };
                Ok(writer)
            }
            None => Ok(Box::new(BufWriter::with_capacity(
                self.buffer_size,
                io::stdout(),
            ))),
        }
    }
}
