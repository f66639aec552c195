//! Histogram output container and snapshot writer.
//!
//! The container is a JSON document holding one object per stored histogram, tagged with its
//! kind (`TH1D` / `TH3D`) and carrying its exact name, title, binning, contents and entries.
//! The file is created (truncated) when the container is opened and filled on [`OutputContainer::close`].
//!
//! It stands in for the ROOT file `analysis_output.root` of the production job: object names,
//! titles and bin numbering are ROOT's, the container format is not.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{AnalysisError, AnalysisResult};
use crate::processing::{Hist1D, Hist3D};
use crate::types::DataSet;

/// Format identifier written at the top of every container.
pub const CONTAINER_FORMAT: &str = "calo-response-histograms/1";

/// A histogram as stored in the container.
#[derive(Debug, Serialize)]
#[serde(tag = "kind")]
pub enum StoredObject<'a> {
    TH1D(&'a Hist1D),
    TH3D(&'a Hist3D),
}

impl StoredObject<'_> {
    pub fn name(&self) -> &str {
        match self {
            StoredObject::TH1D(h) => &h.name,
            StoredObject::TH3D(h) => &h.name,
        }
    }
}

#[derive(Serialize)]
struct Document<'a> {
    format: &'a str,
    objects: &'a [serde_json::Value],
}

/// Output file opened in overwrite mode.
#[derive(Debug)]
pub struct OutputContainer {
    path: PathBuf,
    writer: BufWriter<File>,
    objects: Vec<(String, serde_json::Value)>,
}

impl OutputContainer {
    /// Create or truncate `path`.
    ///
    /// Fails with [`AnalysisError::OutputCreation`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| AnalysisError::OutputCreation {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            objects: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the objects written so far, in write order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|(n, _)| n.as_str())
    }

    /// Store `object`, replacing an earlier object of the same name.
    pub fn write(&mut self, object: StoredObject<'_>) -> AnalysisResult<()> {
        let name = object.name().to_string();
        let value = serde_json::to_value(&object)?;
        match self.objects.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.objects.push((name, value)),
        }
        Ok(())
    }

    pub fn write_hist1d(&mut self, h: &Hist1D) -> AnalysisResult<()> {
        self.write(StoredObject::TH1D(h))
    }

    pub fn write_hist3d(&mut self, h: &Hist3D) -> AnalysisResult<()> {
        self.write(StoredObject::TH3D(h))
    }

    /// Serialize every stored object and flush the file.
    pub fn close(mut self) -> AnalysisResult<PathBuf> {
        let objects: Vec<serde_json::Value> = self.objects.into_iter().map(|(_, v)| v).collect();
        let doc = Document {
            format: CONTAINER_FORMAT,
            objects: &objects,
        };
        serde_json::to_writer_pretty(&mut self.writer, &doc)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Write `ds` as CSV with a header row. Null cells are left empty.
pub fn write_snapshot_csv(path: impl AsRef<Path>, ds: &DataSet) -> AnalysisResult<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    wtr.write_record(ds.schema.field_names())?;
    for row in &ds.rows {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{write_snapshot_csv, OutputContainer};
    use crate::error::AnalysisError;
    use crate::processing::{Axis, Hist1D, Hist3D, HistModel1D, HistModel3D};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn tmp_file(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("calo_response_output_{nanos}_{name}"))
    }

    #[test]
    fn container_stores_tagged_objects_by_name() {
        let path = tmp_file("container.json");
        let mut h1 = Hist1D::new(&HistModel1D::new("h_nClusters", "Number of Clusters", 20, -0.5, 19.5));
        h1.fill(2.0);
        let h3 = Hist3D::new(&HistModel3D::new(
            "h_response",
            "",
            Axis::new(2, 0.0, 2.0),
            Axis::new(2, 0.0, 2.0),
            Axis::new(2, 0.0, 2.0),
        ));

        let mut out = OutputContainer::create(&path).unwrap();
        out.write_hist1d(&h1).unwrap();
        out.write_hist3d(&h3).unwrap();
        h1.fill(3.0);
        out.write_hist1d(&h1).unwrap();
        assert_eq!(out.names().collect::<Vec<_>>(), vec!["h_nClusters", "h_response"]);
        out.close().unwrap();

        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let objects = doc["objects"].as_array().unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["kind"], "TH1D");
        assert_eq!(objects[0]["name"], "h_nClusters");
        assert_eq!(objects[0]["entries"], 2);
        assert_eq!(objects[1]["kind"], "TH3D");
        assert_eq!(objects[1]["contents"].as_array().unwrap().len(), 64);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn create_truncates_existing_file() {
        let path = tmp_file("truncate.json");
        std::fs::write(&path, "stale content that is longer than the new document").unwrap();
        let out = OutputContainer::create(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        out.close().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unwritable_output_is_an_output_creation_error() {
        let path = tmp_file("missing_dir").join("out.json");
        let err = OutputContainer::create(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::OutputCreation { .. }));
        assert!(err.to_string().contains("could not open output file"));
    }

    #[test]
    fn snapshot_csv_has_header_and_empty_nulls() {
        let path = tmp_file("snapshot.csv");
        let ds = DataSet::new(
            Schema::new(vec![
                Field::new("eventNumber", DataType::Int64),
                Field::new("response", DataType::Float64),
            ]),
            vec![
                vec![Value::Int64(7), Value::Float64(1.25)],
                vec![Value::Null, Value::Float64(-1.0)],
            ],
        );
        write_snapshot_csv(&path, &ds).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "eventNumber,response\n7,1.25\n,-1\n");
        let _ = std::fs::remove_file(&path);
    }
}
