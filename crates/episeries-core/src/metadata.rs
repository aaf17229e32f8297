//! Response metadata: data provenance and split reference lookups.
//!
//! Metadata is informational. A failed lookup is logged and its section is
//! left out; only cancellation aborts the request.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::warn;

use episeries_store::Storage;
use episeries_types::{Filter, Granularity, ReferenceEntity};

use crate::error::{Error, Result};
use crate::guard::CallGuard;
use crate::query::QuerySpec;

/// Metadata attached to a series response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// Granularity the data was actually retrieved at.
    pub granularity: Granularity,
    /// Distinct data-source ids of the contributing records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Reference entities for the split values seen, when the split
    /// dimension is a reference id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_references: Option<Vec<ReferenceEntity>>,
}

impl Metadata {
    /// Metadata with the granularity only.
    pub fn bare(granularity: Granularity) -> Self {
        Self {
            granularity,
            ..Default::default()
        }
    }
}

/// Keep a lookup result, or log and drop it. Cancellation propagates.
fn optional<T>(section: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            warn!("Omitting {} from metadata: {}", section, e);
            Ok(None)
        }
    }
}

/// Look up sources and split references concurrently.
///
/// `filter` is the one the series rows were fetched with.
pub async fn assemble_metadata<S>(
    storage: &S,
    guard: &CallGuard,
    spec: &QuerySpec,
    filter: &Filter,
    granularity: Granularity,
    split_values: &BTreeSet<String>,
) -> Result<Metadata>
where
    S: Storage + ?Sized,
{
    let sources = guard.run(
        "find_distinct_sources",
        storage.find_distinct_sources(spec.indicator.collection, filter),
    );

    let wants_references = spec.split.is_some()
        && spec.split.as_deref() == spec.indicator.reference_split
        && !split_values.is_empty();
    let ids: Vec<String> = split_values.iter().cloned().collect();
    let references = async {
        if wants_references {
            Some(guard.run("find_by_ids", storage.find_by_ids(&ids)).await)
        } else {
            None
        }
    };

    let (sources, references) = tokio::join!(sources, references);

    Ok(Metadata {
        granularity,
        sources: optional("sources", sources)?,
        split_references: match references {
            Some(result) => optional("split references", result)?,
            None => None,
        },
    })
}
