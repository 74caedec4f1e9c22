//! Loading of feature and return matrices from CSV files.
//!
//! Each row is one timestep and each column one feature (or one asset's
//! return). A leading header row is skipped when every field in it is
//! non-numeric text; any other unparsable row is an error.

use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;
use ndarray::Array2;
use tracing::debug;

use crate::error::{PortfolioError, Result};

pub fn load_matrix<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut values = Vec::new();
    let mut width: Option<usize> = None;
    let mut rows = 0usize;

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let parsed: std::result::Result<Vec<f32>, _> =
            record.iter().map(|field| field.parse::<f32>()).collect();

        let row = match parsed {
            Ok(row) => row,
            Err(_) if index == 0 && is_header(&record) => continue,
            Err(err) => {
                return Err(PortfolioError::InvalidData {
                    path: path.to_path_buf(),
                    message: format!("line {}: {err}", index + 1),
                })
            }
        };

        match width {
            None => width = Some(row.len()),
            Some(w) if w != row.len() => {
                return Err(PortfolioError::InvalidData {
                    path: path.to_path_buf(),
                    message: format!("line {} has {} columns, expected {w}", index + 1, row.len()),
                })
            }
            Some(_) => {}
        }

        values.extend(row);
        rows += 1;
    }

    let width = width.ok_or_else(|| PortfolioError::InvalidData {
        path: path.to_path_buf(),
        message: "no numeric rows".into(),
    })?;

    debug!(path = %path.display(), rows, columns = width, "loaded matrix");
    Ok(Array2::from_shape_vec((rows, width), values)?)
}

fn is_header(record: &csv::StringRecord) -> bool {
    record
        .iter()
        .all(|field| !field.is_empty() && field.parse::<f32>().is_err())
}
