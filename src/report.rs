use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;

use crate::ga::candidate::WeightVector;
use crate::ga::evaluator::EvaluationResult;

/// Consumer of evaluated-candidate batches. The cache guarantees each weight
/// vector reaches the sink at most once per run.
pub trait ReportSink {
    fn flush(&mut self, batch: &[(WeightVector, EvaluationResult)]) -> Result<()>;
}

/// Appends one row per (candidate, image) pair to a CSV file.
pub struct CsvReport {
    writer: Writer<File>,
}

impl CsvReport {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file `{}`", path.display()))?;
        let mut writer = Writer::from_writer(file);
        writer.write_record(["weights", "image", "size_bytes", "mae"])?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn flush_inner(&mut self, batch: &[(WeightVector, EvaluationResult)]) -> Result<()> {
        for (vector, result) in batch {
            // Failed candidates have no per-image rows to report
            for image in &result.images {
                self.writer.write_record([
                    vector.tag(),
                    image.image.clone(),
                    image.size.to_string(),
                    image.mae.map(|m| m.to_string()).unwrap_or_default(),
                ])?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl ReportSink for CsvReport {
    fn flush(&mut self, batch: &[(WeightVector, EvaluationResult)]) -> Result<()> {
        self.flush_inner(batch)
    }
}

/// Discards all batches. For tests.
pub struct NullReport;

impl ReportSink for NullReport {
    fn flush(&mut self, _batch: &[(WeightVector, EvaluationResult)]) -> Result<()> {
        Ok(())
    }
}
