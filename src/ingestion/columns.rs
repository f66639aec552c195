//! Columnar view of loaded events.
//!
//! Each collection attribute becomes one polars list column named `<collection>.<attribute>`
//! (for example `CaloCalTopoClusters.rawE`), holding one list per event. `eventNumber` is a
//! nullable `Int64` column.

use polars::prelude::*;

use crate::error::AnalysisResult;
use crate::event::{CLUSTER_COLLECTION, Cluster, Event, PARTICLE_COLLECTION, TruthParticle};

use super::parquet::EVENT_NUMBER;

/// Column name of a collection attribute, e.g. `CaloCalTopoClusters.rawE`.
pub fn column_name(collection: &str, attribute: &str) -> String {
    format!("{collection}.{attribute}")
}

type ClusterAttr = fn(&Cluster) -> f64;
type ParticleAttr = fn(&TruthParticle) -> f64;

const CLUSTER_COLUMNS: [(&str, ClusterAttr); 6] = [
    ("rawE", |c| c.raw_e),
    ("rawM", |c| c.raw_m),
    ("rawEta", |c| c.raw_eta),
    ("rawPhi", |c| c.raw_phi),
    ("phi", |c| c.phi),
    ("m", |c| c.m),
];

const PARTICLE_COLUMNS: [(&str, ParticleAttr); 2] = [("pt", |p| p.pt), ("eta", |p| p.eta)];

/// Build the event frame: one row per event, in load order.
pub fn events_to_dataframe(events: &[Event]) -> AnalysisResult<DataFrame> {
    let n_clusters: usize = events.iter().map(|e| e.clusters.len()).sum();
    let n_particles: usize = events.iter().map(|e| e.particles.len()).sum();

    let mut columns = Vec::with_capacity(1 + CLUSTER_COLUMNS.len() + PARTICLE_COLUMNS.len() + 1);
    columns.push(Column::new(
        EVENT_NUMBER.into(),
        events.iter().map(|e| e.event_number).collect::<Vec<Option<i64>>>(),
    ));

    for (attr, get) in CLUSTER_COLUMNS {
        let mut builder = ListPrimitiveChunkedBuilder::<Float64Type>::new(
            column_name(CLUSTER_COLLECTION, attr).into(),
            events.len(),
            n_clusters,
            DataType::Float64,
        );
        for ev in events {
            let values: Vec<f64> = ev.clusters.iter().map(get).collect();
            builder.append_slice(&values);
        }
        columns.push(Column::from(builder.finish().into_series()));
    }

    let mut pdg = ListPrimitiveChunkedBuilder::<Int32Type>::new(
        column_name(PARTICLE_COLLECTION, "pdgId").into(),
        events.len(),
        n_particles,
        DataType::Int32,
    );
    for ev in events {
        let ids: Vec<i32> = ev.particles.iter().map(|p| p.pdg_id).collect();
        pdg.append_slice(&ids);
    }
    columns.push(Column::from(pdg.finish().into_series()));

    for (attr, get) in PARTICLE_COLUMNS {
        let mut builder = ListPrimitiveChunkedBuilder::<Float64Type>::new(
            column_name(PARTICLE_COLLECTION, attr).into(),
            events.len(),
            n_particles,
            DataType::Float64,
        );
        for ev in events {
            let values: Vec<f64> = ev.particles.iter().map(get).collect();
            builder.append_slice(&values);
        }
        columns.push(Column::from(builder.finish().into_series()));
    }

    Ok(DataFrame::new(events.len(), columns)?)
}

#[cfg(test)]
mod tests {
    use polars::prelude::*;

    use super::{column_name, events_to_dataframe};
    use crate::event::{Cluster, Event, TruthParticle};

    #[test]
    fn one_row_per_event_with_list_columns() {
        let events = vec![
            Event {
                event_number: Some(5),
                clusters: vec![
                    Cluster {
                        raw_e: 2.0,
                        ..Default::default()
                    },
                    Cluster {
                        raw_e: 1.0,
                        ..Default::default()
                    },
                ],
                particles: vec![TruthParticle {
                    pdg_id: 211,
                    pt: 3.0,
                    eta: 0.1,
                }],
            },
            Event::default(),
        ];
        let df = events_to_dataframe(&events).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 10);

        let out = df
            .lazy()
            .select([
                col(column_name("CaloCalTopoClusters", "rawE").as_str())
                    .list()
                    .len()
                    .cast(DataType::Int64)
                    .alias("n"),
                col(column_name("TruthParticles", "pdgId").as_str())
                    .list()
                    .first()
                    .cast(DataType::Int64)
                    .alias("pdg"),
                col("eventNumber"),
            ])
            .collect()
            .unwrap();
        let n: Vec<Option<i64>> = out.column("n").unwrap().i64().unwrap().into_iter().collect();
        let pdg: Vec<Option<i64>> = out.column("pdg").unwrap().i64().unwrap().into_iter().collect();
        let num: Vec<Option<i64>> = out.column("eventNumber").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(n, vec![Some(2), Some(0)]);
        assert_eq!(pdg, vec![Some(211), None]);
        assert_eq!(num, vec![Some(5), None]);
    }
}
