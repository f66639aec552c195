//! Parquet event reader.
//!
//! The event table is stored struct-of-arrays: each collection is a group whose attributes are
//! repeated columns of equal length per row. Both bare repeated fields and LIST-annotated groups
//! are accepted.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use parquet::file::reader::{ChunkReader, FileReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::{Field, Row};

use crate::error::{AnalysisError, AnalysisResult};
use crate::event::{CLUSTER_COLLECTION, Cluster, Event, PARTICLE_COLLECTION, TruthParticle};

/// Cluster attribute columns, in [`Cluster`] field order.
pub const CLUSTER_ATTRIBUTES: [&str; 6] = ["rawE", "rawM", "rawEta", "rawPhi", "phi", "m"];
/// Truth particle attribute columns, in [`TruthParticle`] field order.
pub const PARTICLE_ATTRIBUTES: [&str; 3] = ["pdgId", "pt", "eta"];
/// Optional scalar event identifier.
pub const EVENT_NUMBER: &str = "eventNumber";
/// Key-value metadata entry naming the table, when it differs from the schema name.
pub const TREE_NAME_KEY: &str = "tree_name";

/// Read every event of `table` from one Parquet file.
///
/// Fails with [`AnalysisError::SourceLoad`] if the file cannot be opened or holds a different
/// table, and with [`AnalysisError::SchemaMismatch`] if a collection column is missing or the
/// attribute lists of a collection disagree in length.
pub fn read_events_from_path(path: impl AsRef<Path>, table: &str) -> AnalysisResult<Vec<Event>> {
    let path = path.as_ref();
    let reader = SerializedFileReader::try_from(path).map_err(|e| AnalysisError::SourceLoad {
        message: format!("cannot open {}: {e}", path.display()),
    })?;

    let names = table_names(&reader);
    if !names.iter().any(|n| n == table) {
        return Err(AnalysisError::SourceLoad {
            message: format!(
                "table '{table}' not found in {} (file holds {})",
                path.display(),
                names.join(", ")
            ),
        });
    }

    let available_columns = parquet_leaf_column_paths(&reader);
    for (collection, attrs) in [
        (CLUSTER_COLLECTION, &CLUSTER_ATTRIBUTES[..]),
        (PARTICLE_COLLECTION, &PARTICLE_ATTRIBUTES[..]),
    ] {
        for attr in attrs {
            let column = format!("{collection}.{attr}");
            if !has_column(&available_columns, &column) {
                return Err(AnalysisError::SchemaMismatch {
                    message: format!("missing required column '{column}' in {}", path.display()),
                });
            }
        }
    }

    let mut events = Vec::new();
    for (idx0, row_res) in reader.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let row = row_res?;
        events.push(convert_event(row_num, &row)?);
    }
    Ok(events)
}

/// Names the file answers to: the root schema name plus the `tree_name` metadata value.
fn table_names<R: ChunkReader + 'static>(reader: &SerializedFileReader<R>) -> Vec<String> {
    let meta = reader.metadata().file_metadata();
    let mut names = vec![meta.schema_descr().name().to_string()];
    if let Some(kv) = meta.key_value_metadata() {
        names.extend(
            kv.iter()
                .filter(|e| e.key == TREE_NAME_KEY)
                .filter_map(|e| e.value.clone()),
        );
    }
    names
}

fn parquet_leaf_column_paths<R: ChunkReader + 'static>(reader: &SerializedFileReader<R>) -> HashSet<String> {
    reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.path().string())
        .collect()
}

/// A bare repeated leaf is `coll.attr`; a LIST-annotated one is `coll.attr.list.element`.
fn has_column(available: &HashSet<String>, column: &str) -> bool {
    let nested = format!("{column}.");
    available
        .iter()
        .any(|c| c == column || c.starts_with(&nested))
}

fn convert_event(row_num: usize, row: &Row) -> AnalysisResult<Event> {
    let top: HashMap<&str, &Field> = row
        .get_column_iter()
        .map(|(name, field)| (name.as_str(), field))
        .collect();

    let clusters = {
        let attrs = collection(row_num, &top, CLUSTER_COLLECTION)?;
        let mut lists = Vec::with_capacity(CLUSTER_ATTRIBUTES.len());
        for attr in CLUSTER_ATTRIBUTES {
            lists.push(float_list(row_num, CLUSTER_COLLECTION, attr, &attrs)?);
        }
        let len = common_length(row_num, CLUSTER_COLLECTION, &CLUSTER_ATTRIBUTES, &lists)?;
        (0..len)
            .map(|i| Cluster {
                raw_e: lists[0][i],
                raw_m: lists[1][i],
                raw_eta: lists[2][i],
                raw_phi: lists[3][i],
                phi: lists[4][i],
                m: lists[5][i],
            })
            .collect()
    };

    let particles = {
        let attrs = collection(row_num, &top, PARTICLE_COLLECTION)?;
        let pdg_ids = int_list(row_num, PARTICLE_COLLECTION, "pdgId", &attrs)?;
        let pt = float_list(row_num, PARTICLE_COLLECTION, "pt", &attrs)?;
        let eta = float_list(row_num, PARTICLE_COLLECTION, "eta", &attrs)?;
        let lengths = [pdg_ids.len(), pt.len(), eta.len()];
        if lengths.iter().any(|&l| l != lengths[0]) {
            return Err(length_mismatch(row_num, PARTICLE_COLLECTION, &PARTICLE_ATTRIBUTES, &lengths));
        }
        pdg_ids
            .into_iter()
            .zip(pt)
            .zip(eta)
            .map(|((pdg_id, pt), eta)| TruthParticle { pdg_id, pt, eta })
            .collect()
    };

    let event_number = match top.get(EVENT_NUMBER) {
        None | Some(Field::Null) => None,
        Some(Field::Long(v)) => Some(*v),
        Some(Field::Int(v)) => Some(i64::from(*v)),
        Some(other) => {
            return Err(AnalysisError::ParseError {
                row: row_num,
                column: EVENT_NUMBER.to_string(),
                raw: other.to_string(),
                message: "expected integer".to_string(),
            });
        }
    };

    Ok(Event {
        event_number,
        clusters,
        particles,
    })
}

fn collection<'a>(
    row_num: usize,
    top: &HashMap<&str, &'a Field>,
    name: &str,
) -> AnalysisResult<HashMap<&'a str, &'a Field>> {
    match top.get(name).copied() {
        Some(Field::Group(group)) => Ok(group
            .get_column_iter()
            .map(|(attr, field)| (attr.as_str(), field))
            .collect()),
        Some(other) => Err(AnalysisError::SchemaMismatch {
            message: format!("row {row_num}: '{name}' is not a group (found {other})"),
        }),
        None => Err(AnalysisError::SchemaMismatch {
            message: format!("row {row_num} missing required collection '{name}'"),
        }),
    }
}

fn list_elements<'a>(
    row_num: usize,
    collection: &str,
    attr: &str,
    attrs: &HashMap<&str, &'a Field>,
) -> AnalysisResult<&'a [Field]> {
    match attrs.get(attr).copied() {
        Some(Field::ListInternal(list)) => Ok(list.elements()),
        // A null LIST group is an empty collection.
        Some(Field::Null) => Ok(&[]),
        Some(other) => Err(AnalysisError::ParseError {
            row: row_num,
            column: format!("{collection}.{attr}"),
            raw: other.to_string(),
            message: "expected a list".to_string(),
        }),
        None => Err(AnalysisError::SchemaMismatch {
            message: format!("row {row_num} missing required column '{collection}.{attr}'"),
        }),
    }
}

fn float_list(
    row_num: usize,
    collection: &str,
    attr: &str,
    attrs: &HashMap<&str, &Field>,
) -> AnalysisResult<Vec<f64>> {
    list_elements(row_num, collection, attr, attrs)?
        .iter()
        .map(|f| match f {
            Field::Float(v) => Ok(f64::from(*v)),
            Field::Double(v) => Ok(*v),
            other => Err(element_error(row_num, collection, attr, other, "expected number")),
        })
        .collect()
}

fn int_list(
    row_num: usize,
    collection: &str,
    attr: &str,
    attrs: &HashMap<&str, &Field>,
) -> AnalysisResult<Vec<i32>> {
    list_elements(row_num, collection, attr, attrs)?
        .iter()
        .map(|f| match f {
            Field::Int(v) => Ok(*v),
            Field::Short(v) => Ok(i32::from(*v)),
            Field::Long(v) => i32::try_from(*v)
                .map_err(|_| element_error(row_num, collection, attr, f, "i64 out of range for i32")),
            other => Err(element_error(row_num, collection, attr, other, "expected integer")),
        })
        .collect()
}

fn element_error(row_num: usize, collection: &str, attr: &str, f: &Field, message: &str) -> AnalysisError {
    AnalysisError::ParseError {
        row: row_num,
        column: format!("{collection}.{attr}"),
        raw: f.to_string(),
        message: message.to_string(),
    }
}

fn common_length(row_num: usize, collection: &str, attrs: &[&str], lists: &[Vec<f64>]) -> AnalysisResult<usize> {
    let lengths: Vec<usize> = lists.iter().map(Vec::len).collect();
    let first = lengths.first().copied().unwrap_or(0);
    if lengths.iter().any(|&l| l != first) {
        return Err(length_mismatch(row_num, collection, attrs, &lengths));
    }
    Ok(first)
}

fn length_mismatch(row_num: usize, collection: &str, attrs: &[&str], lengths: &[usize]) -> AnalysisError {
    let detail: Vec<String> = attrs
        .iter()
        .zip(lengths)
        .map(|(a, l)| format!("{a}={l}"))
        .collect();
    AnalysisError::SchemaMismatch {
        message: format!(
            "row {row_num}: {collection} attribute lists differ in length ({})",
            detail.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::has_column;

    #[test]
    fn bare_and_list_annotated_columns_are_recognized() {
        let available: HashSet<String> = [
            "CaloCalTopoClusters.rawE",
            "TruthParticles.pt.list.element",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert!(has_column(&available, "CaloCalTopoClusters.rawE"));
        assert!(has_column(&available, "TruthParticles.pt"));
        assert!(!has_column(&available, "CaloCalTopoClusters.raw"));
        assert!(!has_column(&available, "TruthParticles.eta"));
    }
}
