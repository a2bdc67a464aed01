//! Plain-text sample files.
//!
//! One sample per line, fields separated by commas and/or whitespace. When
//! labels are present they are the last field and must be integers. Blank
//! lines and lines starting with `#` are skipped.

use crate::error::{RbfError, Result};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Feature matrix with optional labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// One sample per row.
    pub features: Array2<f64>,
    /// Label of every row, when the file carries labels.
    pub labels: Option<Vec<i32>>,
}

impl Dataset {
    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// True if there are no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    /// Dimensionality of the samples.
    #[inline]
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }
}

/// How the label column is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelColumn {
    /// The last field of every line is a label.
    Required,
    /// Lines with `dim + 1` fields carry a label, lines with `dim` do not.
    Detect {
        /// Expected feature dimensionality.
        dim: usize,
    },
}

/// Reads a sample file.
pub fn read_dataset<P: AsRef<Path>>(path: P, labels: LabelColumn) -> Result<Dataset> {
    let file = File::open(path)?;
    parse_dataset(BufReader::new(file), labels)
}

/// Parses samples from any buffered reader.
pub fn parse_dataset<R: BufRead>(reader: R, column: LabelColumn) -> Result<Dataset> {
    let mut values: Vec<f64> = Vec::new();
    let mut labels: Vec<i32> = Vec::new();
    let mut dim: Option<usize> = None;
    let mut labeled: Option<bool> = None;
    let mut rows = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();

        let has_label = match column {
            LabelColumn::Required => true,
            LabelColumn::Detect { dim } => {
                if fields.len() == dim + 1 {
                    true
                } else if fields.len() == dim {
                    false
                } else {
                    return Err(RbfError::Parse(format!(
                        "line {}: expected {} or {} fields, found {}",
                        line_no + 1,
                        dim,
                        dim + 1,
                        fields.len()
                    )));
                }
            }
        };
        if *labeled.get_or_insert(has_label) != has_label {
            return Err(RbfError::Parse(format!(
                "line {}: labeled and unlabeled lines are mixed",
                line_no + 1
            )));
        }

        let (feature_fields, label_field) = if has_label {
            match fields.split_last() {
                Some((last, rest)) => (rest, Some(*last)),
                None => (&fields[..], None),
            }
        } else {
            (&fields[..], None)
        };

        if feature_fields.is_empty() {
            return Err(RbfError::Parse(format!("line {}: no feature values", line_no + 1)));
        }
        if *dim.get_or_insert(feature_fields.len()) != feature_fields.len() {
            return Err(RbfError::Parse(format!(
                "line {}: {} features, previous lines had {}",
                line_no + 1,
                feature_fields.len(),
                dim.unwrap_or(0)
            )));
        }

        for field in feature_fields {
            let v: f64 = field.parse().map_err(|_| {
                RbfError::Parse(format!("line {}: invalid number '{}'", line_no + 1, field))
            })?;
            values.push(v);
        }
        if let Some(field) = label_field {
            let label: i32 = field.parse().map_err(|_| {
                RbfError::Parse(format!("line {}: invalid label '{}'", line_no + 1, field))
            })?;
            labels.push(label);
        }
        rows += 1;
    }

    let dim = match (dim, column) {
        (Some(d), _) => d,
        (None, LabelColumn::Detect { dim }) => dim,
        (None, LabelColumn::Required) => 0,
    };
    let features = Array2::from_shape_vec((rows, dim), values)
        .map_err(|e| RbfError::Parse(e.to_string()))?;

    Ok(Dataset {
        features,
        labels: if labeled.unwrap_or(column == LabelColumn::Required) {
            Some(labels)
        } else {
            None
        },
    })
}
