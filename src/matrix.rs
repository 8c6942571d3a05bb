use crate::error::{GroupError, Result};
use crate::Element;
use bytemuck::Pod;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A `rows x cols` grid of integers stored row-major in one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Element>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<Element>) -> Result<Self> {
        let expected = element_count(rows, cols)?;
        if data.len() != expected {
            return Err(GroupError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// A matrix of zeros, allocated fallibly.
    pub fn zeroed(rows: usize, cols: usize) -> Result<Self> {
        let data = alloc_zeroed(element_count(rows, cols)?)?;
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Element] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<Element> {
        self.data
    }

    /// # Panics
    ///
    /// If `index >= self.rows()`.
    pub fn row(&self, index: usize) -> &[Element] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[Element]> {
        // chunks_exact panics on zero width
        self.data.chunks_exact(self.cols.max(1))
    }

    /// Write one row per line, values separated by single spaces.
    pub fn write_text<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for row in self.iter_rows() {
            let mut first = true;
            for value in row {
                if !first {
                    out.write_all(b" ")?;
                }
                write!(out, "{}", value)?;
                first = false;
            }
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}

fn element_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        GroupError::ConfigError(format!("{}x{} matrix overflows the address space", rows, cols))
    })
}

/// Allocate `len` zeroed values, reporting allocation failure as an error.
pub(crate) fn alloc_zeroed<T: Pod>(len: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|e| {
        GroupError::ResourceError(format!("cannot allocate {} elements: {}", len, e))
    })?;
    buffer.resize(len, T::zeroed());
    Ok(buffer)
}

/// Where the coordinator gets its input matrix from.
pub trait MatrixSource {
    /// Produce exactly `rows * cols` elements in row-major order.
    fn load(&self, rows: usize, cols: usize) -> Result<Matrix>;
}

/// Whitespace-separated decimal integers in a text file.
///
/// Only the first `rows * cols` values are read; anything after them is
/// ignored.
#[derive(Debug, Clone)]
pub struct TextFileSource {
    path: PathBuf,
}

impl TextFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MatrixSource for TextFileSource {
    fn load(&self, rows: usize, cols: usize) -> Result<Matrix> {
        let total = element_count(rows, cols)?;
        debug!("Loading {}x{} matrix from {}", rows, cols, self.path.display());

        let file = File::open(&self.path).map_err(|e| {
            GroupError::LoadError(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(total).map_err(|e| {
            GroupError::ResourceError(format!("cannot allocate {} elements: {}", total, e))
        })?;

        let mut lines = BufReader::new(file).lines();
        while data.len() < total {
            let line = match lines.next() {
                Some(line) => line.map_err(|e| {
                    GroupError::LoadError(format!("reading {}: {}", self.path.display(), e))
                })?,
                None => break,
            };
            for token in line.split_whitespace() {
                if data.len() == total {
                    break;
                }
                let value = token.parse::<Element>().map_err(|e| {
                    GroupError::DataError(format!(
                        "element {} ({:?}) is not an integer: {}",
                        data.len(),
                        token,
                        e
                    ))
                })?;
                data.push(value);
            }
        }

        if data.len() < total {
            return Err(GroupError::DataError(format!(
                "{} holds {} elements, {}x{} needs {}",
                self.path.display(),
                data.len(),
                rows,
                cols,
                total
            )));
        }

        Matrix::new(rows, cols, data)
    }
}
