//! NPY / NPZ voice archives.
//!
//! Reads the subset of the NumPy format the voice stack uses (v1/v2 NPY,
//! float32, C-contiguous) and writes v1 NPY members into a deflated ZIP so
//! acoustic-model loaders that expect one combined archive keep working.
//! NPZ files are plain ZIP archives whose members are `.npy` files; the
//! member name without its extension is the array name.

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    io::{Read, Write},
    path::Path,
};
use zip::{write::SimpleFileOptions, ZipArchive, ZipWriter};

/// A loaded array: shape + flat f32 data in row-major (C) order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl NpyArray {
    pub fn nrows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn ncols(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(1)
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f32] {
        let ncols = self.ncols();
        &self.data[i * ncols..(i + 1) * ncols]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NPY parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a raw `.npy` buffer into shape + f32 data.
pub fn parse_npy(data: &[u8]) -> Result<(Vec<usize>, Vec<f32>)> {
    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        bail!("not a valid NPY file (bad magic)");
    }

    let (major, minor) = (data[6], data[7]);
    let (header_len, header_start) = match (major, minor) {
        (1, _) => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        (2, _) => {
            if data.len() < 12 {
                bail!("NPY v2 file too short");
            }
            (u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize, 12)
        }
        _ => bail!("unsupported NPY version {major}.{minor}"),
    };

    let header_end = header_start + header_len;
    if data.len() < header_end {
        bail!("NPY file truncated in header");
    }
    let header = std::str::from_utf8(&data[header_start..header_end])
        .context("NPY header is not valid UTF-8")?;

    let dtype = header_field(header, "descr").context("NPY header missing 'descr'")?;
    let dtype = dtype.trim().trim_matches('\'').trim_matches('"');
    if !matches!(dtype, "<f4" | "=f4" | "|f4" | ">f4") {
        bail!("unsupported dtype '{dtype}' (only float32 voices are supported)");
    }
    let big_endian = dtype.starts_with('>');

    let fortran = header_field(header, "fortran_order").unwrap_or("False").trim().to_ascii_lowercase();
    if fortran == "true" {
        bail!("Fortran-order arrays are not supported");
    }

    let shape_str = header_field(header, "shape").context("NPY header missing 'shape'")?;
    let shape = parse_shape(shape_str.trim())?;
    let n_elements: usize = shape.iter().product();

    let payload = &data[header_end..];
    if payload.len() < n_elements * 4 {
        bail!("NPY data too short: expected {} bytes, got {}", n_elements * 4, payload.len());
    }

    let values: Vec<f32> = payload[..n_elements * 4]
        .chunks_exact(4)
        .map(|b| {
            let arr = [b[0], b[1], b[2], b[3]];
            if big_endian {
                f32::from_be_bytes(arr)
            } else {
                f32::from_le_bytes(arr)
            }
        })
        .collect();

    Ok((shape, values))
}

/// Extract one field's value from the Python-literal header dict.
fn header_field<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    let key_sq = format!("'{field}':");
    let key_dq = format!("\"{field}\":");
    let start = header
        .find(key_sq.as_str())
        .map(|p| p + key_sq.len())
        .or_else(|| header.find(key_dq.as_str()).map(|p| p + key_dq.len()))?;
    let rest = header[start..].trim_start();

    if rest.starts_with('(') {
        let end = rest.find(')')?;
        Some(&rest[..end + 1])
    } else if rest.starts_with('\'') || rest.starts_with('"') {
        let quote = rest.chars().next()?;
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        Some(&inner[..end])
    } else {
        let end = rest.find([',', '}']).unwrap_or(rest.len());
        Some(rest[..end].trim())
    }
}

/// Parse a shape tuple like `(510, 256)` or `(256,)` or `()`.
fn parse_shape(s: &str) -> Result<Vec<usize>> {
    let inner = s.trim_start_matches('(').trim_end_matches(')');
    if inner.trim().is_empty() {
        return Ok(vec![]);
    }
    inner
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().with_context(|| format!("bad shape dim '{t}'")))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// NPY serialization
// ─────────────────────────────────────────────────────────────────────────────

/// Serialize shape + f32 data as a v1.0 NPY buffer.
pub fn write_npy(shape: &[usize], values: &[f32]) -> Vec<u8> {
    let shape_str = match shape.len() {
        1 => format!("({},)", shape[0]),
        _ => format!("({})", shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")),
    };
    let header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape_str}, }}");

    // Total header block (magic + version + len + dict) pads to 64 bytes,
    // spaces then a trailing newline.
    let unpadded = 10 + header.len() + 1;
    let padded = unpadded.div_ceil(64) * 64;
    let pad = padded - unpadded;

    let mut dict = header;
    dict.extend(std::iter::repeat_n(' ', pad));
    dict.push('\n');

    let mut buf = Vec::with_capacity(padded + values.len() * 4);
    buf.extend_from_slice(b"\x93NUMPY");
    buf.push(1);
    buf.push(0);
    buf.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    buf.extend_from_slice(dict.as_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

// ─────────────────────────────────────────────────────────────────────────────
// NPZ archives
// ─────────────────────────────────────────────────────────────────────────────

/// Load every array from an NPZ archive, keyed by member name.
pub fn load_npz(path: &Path) -> Result<HashMap<String, NpyArray>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open NPZ file: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("cannot open ZIP archive: {}", path.display()))?;

    let mut arrays = HashMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("failed to read ZIP entry")?;
        let name = entry.name().trim_end_matches(".npy").to_string();

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).context("failed to read NPY entry")?;

        let (shape, data) =
            parse_npy(&buf).with_context(|| format!("failed to parse NPY entry '{name}'"))?;
        arrays.insert(name, NpyArray { shape, data });
    }
    Ok(arrays)
}

/// Write named arrays into a deflated NPZ archive at `path`.
pub fn save_npz(path: &Path, arrays: &[(String, &NpyArray)]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create NPZ file: {}", path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, array) in arrays {
        writer
            .start_file(format!("{name}.npy"), options)
            .with_context(|| format!("cannot start NPZ member '{name}'"))?;
        let buf = write_npy(&array.shape, &array.data);
        writer.write_all(&buf).with_context(|| format!("cannot write NPZ member '{name}'"))?;
    }
    writer.finish().context("cannot finalize NPZ archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npy_roundtrip_1d() {
        let values = vec![1.0f32, 2.0, 3.0];
        let buf = write_npy(&[3], &values);
        let (shape, data) = parse_npy(&buf).expect("parse");
        assert_eq!(shape, vec![3]);
        assert_eq!(data, values);
    }

    #[test]
    fn npy_roundtrip_2d() {
        let values: Vec<f32> = (0..512).map(|x| x as f32 * 0.5).collect();
        let buf = write_npy(&[2, 256], &values);
        let (shape, data) = parse_npy(&buf).expect("parse");
        assert_eq!(shape, vec![2, 256]);
        assert_eq!(data, values);
    }

    #[test]
    fn npy_header_is_64_aligned() {
        let buf = write_npy(&[1, 256], &vec![0.0; 256]);
        // magic(6) + version(2) + len(2) + dict — dict length makes the
        // data offset a multiple of 64.
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
    }

    #[test]
    fn row_access() {
        let values: Vec<f32> = (0..6).map(|x| x as f32).collect();
        let arr = NpyArray { shape: vec![2, 3], data: values };
        assert_eq!(arr.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(arr.row(1), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn bad_magic_rejected() {
        assert!(parse_npy(b"NOTANPY").is_err());
    }

    #[test]
    fn npz_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("voices.npz");

        let a = NpyArray { shape: vec![2, 3], data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0] };
        let b = NpyArray { shape: vec![3], data: vec![7.0, 8.0, 9.0] };
        save_npz(&path, &[("af_heart".into(), &a), ("am_puck".into(), &b)]).expect("save");

        let loaded = load_npz(&path).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["af_heart"], a);
        assert_eq!(loaded["am_puck"], b);
    }
}
