// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Minimal NPY reader/writer for numeric arrays.

Writes version 1.0 files holding little-endian `f64` (`<f8`) in C order with
the header padded to a 64-byte boundary. Reads versions 1–3 with `<f8`,
`<f4`, `<i4` or `<i8` data, in C or Fortran order, up to two dimensions.
*/

use ndarray::{Array2, ShapeBuilder};
use std::fs;
use std::path::Path;

use crate::types::{PipelineError, PipelineResult};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Decoded array: shape plus row-major values
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

fn shape_repr(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Encode `data` with the given shape as an NPY v1.0 byte buffer
pub fn encode(shape: &[usize], data: &[f64]) -> PipelineResult<Vec<u8>> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(PipelineError::Npy(format!(
            "shape {:?} needs {} values, got {}",
            shape,
            expected,
            data.len()
        )));
    }

    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
        shape_repr(shape)
    );
    // magic(6) + version(2) + length(2) + header + '\n' aligned to 64
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');
    let header_len = u16::try_from(header.len())
        .map_err(|_| PipelineError::Npy(format!("header too long for shape {:?}", shape)))?;

    let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + header.len() + data.len() * 8);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[0x01, 0x00]);
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    Ok(bytes)
}

fn header_value<'h>(header: &'h str, key: &str) -> PipelineResult<&'h str> {
    let needle = format!("'{}':", key);
    let start = header
        .find(&needle)
        .map(|i| i + needle.len())
        .ok_or_else(|| PipelineError::Npy(format!("header lacks '{}'", key)))?;
    Ok(header[start..].trim_start())
}

fn parse_header(header: &str) -> PipelineResult<(String, bool, Vec<usize>)> {
    let descr_field = header_value(header, "descr")?;
    let descr = descr_field
        .strip_prefix('\'')
        .and_then(|rest| rest.split('\'').next())
        .ok_or_else(|| PipelineError::Npy("malformed 'descr'".to_string()))?
        .to_string();

    let fortran_order = header_value(header, "fortran_order")?.starts_with("True");

    let shape_field = header_value(header, "shape")?;
    let close = shape_field
        .find(')')
        .ok_or_else(|| PipelineError::Npy("malformed 'shape'".to_string()))?;
    let shape = shape_field[..close]
        .trim_start_matches('(')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| PipelineError::Npy(format!("bad dimension '{}'", s)))
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok((descr, fortran_order, shape))
}

fn decode_values(descr: &str, body: &[u8], count: usize) -> PipelineResult<Vec<f64>> {
    let itemsize = match descr {
        "<f8" | "<i8" => 8,
        "<f4" | "<i4" => 4,
        other => {
            return Err(PipelineError::Npy(format!(
                "unsupported dtype '{}' (expected little-endian float or int)",
                other
            )))
        }
    };
    if body.len() != count * itemsize {
        return Err(PipelineError::Npy(format!(
            "expected {} bytes of data, found {}",
            count * itemsize,
            body.len()
        )));
    }
    let values = body.chunks_exact(itemsize).map(|chunk| match descr {
        "<f8" => f64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]),
        "<i8" => i64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]) as f64,
        "<f4" => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
        _ => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
    });
    Ok(values.collect())
}

/// Decode an NPY byte buffer
pub fn decode(bytes: &[u8]) -> PipelineResult<NpyArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(PipelineError::Npy("not an NPY file".to_string()));
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => return Err(PipelineError::Npy(format!("unsupported NPY version {}", v))),
    };
    let body_start = header_start + header_len;
    if bytes.len() < body_start {
        return Err(PipelineError::Npy("truncated header".to_string()));
    }
    let header = std::str::from_utf8(&bytes[header_start..body_start])
        .map_err(|_| PipelineError::Npy("header is not valid text".to_string()))?;

    let (descr, fortran_order, shape) = parse_header(header)?;
    if shape.len() > 2 {
        return Err(PipelineError::Npy(format!(
            "{}-dimensional arrays are not supported",
            shape.len()
        )));
    }
    let count = shape.iter().product();
    let mut data = decode_values(&descr, &bytes[body_start..], count)?;

    if fortran_order && shape.len() == 2 {
        let column_major = Array2::from_shape_vec((shape[0], shape[1]).f(), data)
            .map_err(|e| PipelineError::Npy(e.to_string()))?;
        data = column_major.as_standard_layout().iter().copied().collect();
    }
    Ok(NpyArray { shape, data })
}

pub fn write_vector(path: &Path, values: &[f64]) -> PipelineResult<()> {
    fs::write(path, encode(&[values.len()], values)?)?;
    Ok(())
}

pub fn write_matrix(path: &Path, matrix: &Array2<f64>) -> PipelineResult<()> {
    let data: Vec<f64> = matrix.iter().copied().collect();
    fs::write(path, encode(&[matrix.nrows(), matrix.ncols()], &data)?)?;
    Ok(())
}

pub fn read(path: &Path) -> PipelineResult<NpyArray> {
    let bytes = fs::read(path)?;
    decode(&bytes).map_err(|e| match e {
        PipelineError::Npy(msg) => PipelineError::Npy(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Read a 1-D array; degenerate `(n, 1)` / `(1, n)` shapes are flattened
pub fn read_vector(path: &Path) -> PipelineResult<Vec<f64>> {
    let array = read(path)?;
    match array.shape.as_slice() {
        [_] => Ok(array.data),
        [1, _] | [_, 1] => Ok(array.data),
        shape => Err(PipelineError::Npy(format!(
            "{}: expected a vector, found shape {:?}",
            path.display(),
            shape
        ))),
    }
}

pub fn read_matrix(path: &Path) -> PipelineResult<Array2<f64>> {
    let array = read(path)?;
    match array.shape.as_slice() {
        &[rows, cols] => Array2::from_shape_vec((rows, cols), array.data)
            .map_err(|e| PipelineError::Npy(e.to_string())),
        shape => Err(PipelineError::Npy(format!(
            "{}: expected a matrix, found shape {:?}",
            path.display(),
            shape
        ))),
    }
}
