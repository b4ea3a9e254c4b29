// test_utils.rs

#[cfg(test)]
pub mod test_utils {
    use std::env;
    use std::path::{Path, PathBuf};
    use tempfile;

    use crate::dtype::{DType, Value};
    use crate::error::Result;
    use crate::header::Header;
    use crate::index::IndexRecord;
    use crate::io::OutputStream;
    use crate::writer::Writer;

    pub struct TestDir {
        dir: PathBuf,
        #[allow(dead_code)]
        temp_dir: Option<tempfile::TempDir>,
    }

    impl TestDir {
        pub fn new(prefix: &str) -> std::io::Result<Self> {
            let keep_output = env::var("KEEP_TEST_OUTPUT").is_ok();
            if keep_output {
                let output_dir = env::current_dir()?.join("test_output").join(prefix);
                std::fs::create_dir_all(&output_dir)?;
                Ok(TestDir {
                    dir: output_dir,
                    temp_dir: None,
                })
            } else {
                let temp_dir = tempfile::tempdir()?;
                let dir = temp_dir.path().to_path_buf();
                Ok(TestDir {
                    dir,
                    temp_dir: Some(temp_dir),
                })
            }
        }

        pub fn path(&self) -> &Path {
            &self.dir
        }
    }

    /// Write a coordinate index, gzipped when `path` ends in `.gz`.
    pub fn write_index(path: &Path, records: &[IndexRecord]) -> Result<()> {
        let stream = OutputStream::new(Some(path)).writer()?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(stream);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write and finalize a file holding `values`.
    pub fn write_values(path: &Path, dtype: DType, values: &[Value]) -> Result<Header> {
        let mut writer = Writer::create(path, dtype, "index.tsv")?;
        for value in values {
            writer.append(value)?;
        }
        writer.finalize()
    }
}
