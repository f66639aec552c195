#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parquet::column::writer::ColumnWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

use calo_response::event::{Cluster, Event, TruthParticle};

pub fn tmp_path(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("calo-response-{name}-{nanos}.{ext}"))
}

pub fn tmp_dir(name: &str) -> PathBuf {
    let dir = tmp_path(name, "d");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn event_schema(root: &str) -> String {
    format!(
        r#"
        message {root} {{
          REQUIRED GROUP CaloCalTopoClusters {{
            REPEATED FLOAT rawE;
            REPEATED FLOAT rawM;
            REPEATED FLOAT rawEta;
            REPEATED FLOAT rawPhi;
            REPEATED FLOAT phi;
            REPEATED FLOAT m;
          }}
          REQUIRED GROUP TruthParticles {{
            REPEATED INT32 pdgId;
            REPEATED FLOAT pt;
            REPEATED FLOAT eta;
          }}
          OPTIONAL INT64 eventNumber;
        }}
        "#
    )
}

/// Struct-of-arrays columns of an event table, one inner `Vec` per event.
#[derive(Debug, Clone, Default)]
pub struct EventColumns {
    /// rawE, rawM, rawEta, rawPhi, phi, m, pt, eta, in schema order.
    pub floats: [Vec<Vec<f32>>; 8],
    pub pdg_ids: Vec<Vec<i32>>,
    pub event_numbers: Vec<Option<i64>>,
}

impl EventColumns {
    pub fn from_events(events: &[Event]) -> Self {
        let mut cols = EventColumns::default();
        for ev in events {
            cols.floats[0].push(attr(&ev.clusters, |c| c.raw_e));
            cols.floats[1].push(attr(&ev.clusters, |c| c.raw_m));
            cols.floats[2].push(attr(&ev.clusters, |c| c.raw_eta));
            cols.floats[3].push(attr(&ev.clusters, |c| c.raw_phi));
            cols.floats[4].push(attr(&ev.clusters, |c| c.phi));
            cols.floats[5].push(attr(&ev.clusters, |c| c.m));
            cols.floats[6].push(attr(&ev.particles, |p| p.pt));
            cols.floats[7].push(attr(&ev.particles, |p| p.eta));
            cols.pdg_ids.push(ev.particles.iter().map(|p| p.pdg_id).collect());
            cols.event_numbers.push(ev.event_number);
        }
        cols
    }
}

fn attr<T>(items: &[T], f: impl Fn(&T) -> f64) -> Vec<f32> {
    items.iter().map(|x| f(x) as f32).collect()
}

/// Flatten per-event lists into values plus definition/repetition levels of a repeated leaf.
fn levels<T: Copy>(lists: &[Vec<T>]) -> (Vec<T>, Vec<i16>, Vec<i16>) {
    let mut values = Vec::new();
    let mut def = Vec::new();
    let mut rep = Vec::new();
    for list in lists {
        if list.is_empty() {
            def.push(0);
            rep.push(0);
        }
        for (i, v) in list.iter().enumerate() {
            values.push(*v);
            def.push(1);
            rep.push(if i == 0 { 0 } else { 1 });
        }
    }
    (values, def, rep)
}

pub fn write_columns(path: &Path, cols: &EventColumns, root: &str, tree_name: Option<&str>) {
    let schema = Arc::new(parse_message_type(&event_schema(root)).unwrap());
    let kv = tree_name.map(|t| vec![KeyValue::new("tree_name".to_string(), t.to_string())]);
    let props = Arc::new(WriterProperties::builder().set_key_value_metadata(kv).build());
    let file = File::create(path).unwrap();
    let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();

    if !cols.event_numbers.is_empty() {
        let mut rg = writer.next_row_group().unwrap();
        let mut float_idx = 0usize;
        while let Some(mut col) = rg.next_column().unwrap() {
            match col.untyped() {
                ColumnWriter::FloatColumnWriter(w) => {
                    let (values, def, rep) = levels(&cols.floats[float_idx]);
                    w.write_batch(&values, Some(&def[..]), Some(&rep[..])).unwrap();
                    float_idx += 1;
                }
                ColumnWriter::Int32ColumnWriter(w) => {
                    let (values, def, rep) = levels(&cols.pdg_ids);
                    w.write_batch(&values, Some(&def[..]), Some(&rep[..])).unwrap();
                }
                ColumnWriter::Int64ColumnWriter(w) => {
                    let values: Vec<i64> = cols.event_numbers.iter().flatten().copied().collect();
                    let def: Vec<i16> = cols
                        .event_numbers
                        .iter()
                        .map(|n| i16::from(n.is_some()))
                        .collect();
                    w.write_batch(&values, Some(&def[..]), None).unwrap();
                }
                _ => panic!("unexpected column writer in test"),
            }
            col.close().unwrap();
        }
        rg.close().unwrap();
    }
    writer.close().unwrap();
}

fn list_field(kind: &str, name: &str) -> String {
    format!("OPTIONAL GROUP {name} (LIST) {{ REPEATED GROUP list {{ OPTIONAL {kind} element; }} }}")
}

fn list_annotated_schema() -> String {
    let clusters: Vec<String> = ["rawE", "rawM", "rawEta", "rawPhi", "phi", "m"]
        .iter()
        .map(|a| list_field("DOUBLE", a))
        .collect();
    format!(
        "message CollectionTree {{ REQUIRED GROUP CaloCalTopoClusters {{ {} }} REQUIRED GROUP TruthParticles {{ {} {} {} }} OPTIONAL INT64 eventNumber; }}",
        clusters.join(" "),
        list_field("INT32", "pdgId"),
        list_field("DOUBLE", "pt"),
        list_field("DOUBLE", "eta"),
    )
}

/// Levels of a three-level LIST leaf: definition 0 null list, 1 empty list, 3 present element.
fn list_levels<T: Copy>(lists: &[Vec<T>], empty_as_null: bool) -> (Vec<T>, Vec<i16>, Vec<i16>) {
    let mut values = Vec::new();
    let mut def = Vec::new();
    let mut rep = Vec::new();
    for list in lists {
        if list.is_empty() {
            def.push(if empty_as_null { 0 } else { 1 });
            rep.push(0);
        }
        for (i, v) in list.iter().enumerate() {
            values.push(*v);
            def.push(3);
            rep.push(if i == 0 { 0 } else { 1 });
        }
    }
    (values, def, rep)
}

/// Write `cols` with every attribute as a LIST-annotated group of DOUBLE (INT32 for pdgId)
/// elements. Empty collections are written as empty lists, or as null lists if `empty_as_null`.
pub fn write_list_annotated(path: &Path, cols: &EventColumns, empty_as_null: bool) {
    let schema = Arc::new(parse_message_type(&list_annotated_schema()).unwrap());
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path).unwrap();
    let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();

    let mut rg = writer.next_row_group().unwrap();
    let mut float_idx = 0usize;
    while let Some(mut col) = rg.next_column().unwrap() {
        match col.untyped() {
            ColumnWriter::DoubleColumnWriter(w) => {
                let lists: Vec<Vec<f64>> = cols.floats[float_idx]
                    .iter()
                    .map(|l| l.iter().map(|&v| f64::from(v)).collect())
                    .collect();
                let (values, def, rep) = list_levels(&lists, empty_as_null);
                w.write_batch(&values, Some(&def[..]), Some(&rep[..])).unwrap();
                float_idx += 1;
            }
            ColumnWriter::Int32ColumnWriter(w) => {
                let (values, def, rep) = list_levels(&cols.pdg_ids, empty_as_null);
                w.write_batch(&values, Some(&def[..]), Some(&rep[..])).unwrap();
            }
            ColumnWriter::Int64ColumnWriter(w) => {
                let values: Vec<i64> = cols.event_numbers.iter().flatten().copied().collect();
                let def: Vec<i16> = cols
                    .event_numbers
                    .iter()
                    .map(|n| i16::from(n.is_some()))
                    .collect();
                w.write_batch(&values, Some(&def[..]), None).unwrap();
            }
            _ => panic!("unexpected column writer in test"),
        }
        col.close().unwrap();
    }
    rg.close().unwrap();
    writer.close().unwrap();
}

/// Write `events` as a `CollectionTree` table.
pub fn write_events(path: &Path, events: &[Event]) {
    write_columns(path, &EventColumns::from_events(events), "CollectionTree", None);
}

/// A file whose only column is `eventNumber`.
pub fn write_scalar_only(path: &Path) {
    let schema = Arc::new(
        parse_message_type(
            r#"
            message CollectionTree {
              REQUIRED INT64 eventNumber;
            }
            "#,
        )
        .unwrap(),
    );
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path).unwrap();
    let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();
    let mut rg = writer.next_row_group().unwrap();
    while let Some(mut col) = rg.next_column().unwrap() {
        match col.untyped() {
            ColumnWriter::Int64ColumnWriter(w) => {
                w.write_batch(&[1_i64, 2_i64], None, None).unwrap();
            }
            _ => panic!("unexpected column writer in test"),
        }
        col.close().unwrap();
    }
    rg.close().unwrap();
    writer.close().unwrap();
}

pub fn cluster(raw_e: f64, raw_m: f64, raw_eta: f64) -> Cluster {
    Cluster {
        raw_e,
        raw_m,
        raw_eta,
        raw_phi: 0.0,
        phi: 0.0,
        m: 0.0,
    }
}

pub fn particle(pdg_id: i32, pt: f64, eta: f64) -> TruthParticle {
    TruthParticle { pdg_id, pt, eta }
}

/// Three events:
/// - A: no cluster, one pion
/// - B: two clusters (leading rawE 50000 MeV, massless, central), one 40000 MeV pion
/// - C: one cluster, no particle
pub fn scenario_events() -> Vec<Event> {
    vec![
        Event {
            event_number: Some(100),
            clusters: vec![],
            particles: vec![particle(211, 30_000.0, 0.5)],
        },
        Event {
            event_number: Some(101),
            clusters: vec![cluster(50_000.0, 0.0, 0.0), cluster(10_000.0, 0.0, 0.0)],
            particles: vec![particle(211, 40_000.0, 0.0)],
        },
        Event {
            event_number: Some(102),
            clusters: vec![cluster(20_000.0, 0.0, 0.0)],
            particles: vec![],
        },
    ]
}
