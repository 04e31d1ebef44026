#[cfg(test)]
mod tests;

use super::{
    CollectionInfo, DistanceMetric, PointFilter, PointPayload, SearchHit, SearchParams,
    StoreOutcome, VectorPoint, rerank,
};
use crate::chunking::Chunk;
use crate::config::Config;
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Vector collection backed by one LanceDB table.
///
/// The vector dimension is fixed by the first insert and never changes
/// afterwards. All methods take `&self`; share it as `Arc<VectorStore>`.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: RwLock<Option<usize>>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("dimension", &self.cached_dimension())
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Connect to the LanceDB database at `uri` and use `collection` as table.
    ///
    /// Local paths are created if missing. An existing table's dimension is
    /// picked up from its schema.
    #[inline]
    pub async fn connect(uri: &str, collection: &str) -> Result<Self> {
        if !uri.contains("://") {
            std::fs::create_dir_all(Path::new(uri)).map_err(|e| {
                RagError::StoreUnavailable(format!(
                    "Failed to create vector database directory {}: {}",
                    uri, e
                ))
            })?;
        }

        debug!("Connecting to LanceDB at {}", uri);
        let connection = lancedb::connect(uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            RagError::StoreUnavailable(format!("Failed to connect to LanceDB: {}", e))
        })?;

        let store = Self {
            connection,
            table_name: collection.to_string(),
            dimension: RwLock::new(None),
        };

        if let Some(table) = store.open_table_if_exists().await? {
            let dimension = vector_dimension(&table).await?;
            store.set_cached_dimension(dimension);
            info!(
                "Opened collection {} with {} dimensions",
                store.table_name, dimension
            );
        }

        Ok(store)
    }

    /// Connect using the `[vector_store]` section of `config`
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect(&config.vector_store_uri(), &config.vector_store.collection).await
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.table_name
    }

    /// Dimension of the collection, once known
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.cached_dimension()
    }

    /// Create the collection with `dimension` if it does not exist yet.
    ///
    /// Never drops or rewrites an existing table. Fails with
    /// `DimensionMismatch` when the collection already has another dimension.
    #[inline]
    pub async fn ensure_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<()> {
        let DistanceMetric::Cosine = metric;

        if dimension == 0 {
            return Err(RagError::InvalidInput(
                "vector dimension must be greater than zero".to_string(),
            ));
        }

        if let Some(existing) = self.cached_dimension() {
            return check_dimension(existing, dimension);
        }

        let schema = create_schema(dimension)?;
        match self
            .connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
        {
            Ok(_) => {
                info!(
                    "Created collection {} with {} dimensions ({} distance)",
                    self.table_name, dimension, metric
                );
                self.set_cached_dimension(dimension);
                Ok(())
            }
            Err(lancedb::Error::TableAlreadyExists { .. }) => {
                debug!(
                    "Collection {} already exists, checking its dimension",
                    self.table_name
                );
                let table = self.open_table().await?;
                let existing = vector_dimension(&table).await?;
                self.set_cached_dimension(existing);
                check_dimension(existing, dimension)
            }
            Err(e) => Err(classify_error(
                &e,
                "Failed to create collection",
                RagError::Database,
            )),
        }
    }

    /// Store one point per chunk in a single commit.
    ///
    /// Returns the number of points written. Nothing is written when the
    /// arguments are inconsistent.
    #[inline]
    pub async fn insert(
        &self,
        kb_id: Uuid,
        doc_id: Uuid,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::ArityMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let Some(first) = embeddings.first() else {
            debug!("No vectors to insert for document {}", doc_id);
            return Ok(0);
        };

        let dimension = first.len();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.ensure_collection(dimension, DistanceMetric::Cosine)
            .await?;

        let created_at = Utc::now();
        let points = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                Ok(VectorPoint {
                    id: Uuid::new_v4(),
                    vector: vector.clone(),
                    payload: PointPayload {
                        kb_id,
                        doc_id,
                        chunk_index: to_u32(chunk.index, "chunk index")?,
                        text: chunk.text.clone(),
                        text_length: to_u32(chunk.text.chars().count(), "chunk length")?,
                        created_at,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let record_batch = create_record_batch(&points, dimension)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table.add(reader).execute().await.map_err(|e| {
            error!("Failed to insert vectors for document {}: {}", doc_id, e);
            classify_error(&e, "Failed to insert vectors", RagError::InsertFailed)
        })?;

        info!(
            "Inserted {} vectors for document {} in knowledge base {}",
            points.len(),
            doc_id,
            kb_id
        );
        Ok(points.len())
    }

    /// Nearest chunks to `query`, re-ranked by exact cosine similarity.
    ///
    /// Store failures come back as a degraded empty result.
    #[inline]
    pub async fn search(&self, query: &[f32], params: &SearchParams) -> StoreOutcome<Vec<SearchHit>> {
        if params.limit == 0 {
            return StoreOutcome::Complete(Vec::new());
        }

        match self.fetch_candidates(query, params).await {
            Ok(None) => {
                debug!("Collection {} does not exist yet", self.table_name);
                StoreOutcome::Complete(Vec::new())
            }
            Ok(Some(candidates)) => {
                let fetched = candidates.len();
                let hits = rerank(query, candidates, params.limit, params.score_threshold);
                debug!(
                    "Re-ranked {} candidates into {} hits (threshold {})",
                    fetched,
                    hits.len(),
                    params.score_threshold
                );
                StoreOutcome::Complete(hits)
            }
            Err(e) => {
                warn!("Vector search degraded: {}", e);
                StoreOutcome::degraded(Vec::new(), e.to_string())
            }
        }
    }

    async fn fetch_candidates(
        &self,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Option<Vec<VectorPoint>>> {
        let Some(table) = self.open_table_if_exists().await? else {
            return Ok(None);
        };

        if let Some(dimension) = self.cached_dimension() {
            check_dimension(dimension, query.len())?;
        }

        let mut search = table
            .vector_search(query)
            .map_err(|e| classify_error(&e, "Failed to create vector search", RagError::Database))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(params.candidate_count());

        if let Some(kb_id) = params.kb_id {
            search = search.only_if(PointFilter::KnowledgeBase(kb_id).predicate());
        }

        let mut results = search
            .execute()
            .await
            .map_err(|e| classify_error(&e, "Failed to execute search", RagError::Database))?;

        let mut candidates = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| classify_error(&e, "Failed to read result stream", RagError::Database))?
        {
            candidates.extend(parse_points(&batch)?);
        }

        Ok(Some(candidates))
    }

    /// Remove every point of `doc_id`.
    ///
    /// A missing collection or a document without points counts as success.
    #[inline]
    pub async fn delete_by_document(&self, doc_id: Uuid) -> StoreOutcome<bool> {
        let table = match self.open_table_if_exists().await {
            Ok(Some(table)) => table,
            Ok(None) => return StoreOutcome::Complete(true),
            Err(e) => {
                warn!("Failed to delete vectors for document {}: {}", doc_id, e);
                return StoreOutcome::degraded(false, e.to_string());
            }
        };

        let predicate = PointFilter::Document(doc_id).predicate();
        match table.delete(&predicate).await {
            Ok(_) => {
                info!("Deleted vectors for document {}", doc_id);
                StoreOutcome::Complete(true)
            }
            Err(e) => {
                let e = classify_error(&e, "Failed to delete vectors", RagError::Database);
                warn!("Failed to delete vectors for document {}: {}", doc_id, e);
                StoreOutcome::degraded(false, e.to_string())
            }
        }
    }

    /// Number of points, optionally restricted by payload
    #[inline]
    pub async fn count_points(&self, filter: Option<PointFilter>) -> Result<usize> {
        let Some(table) = self.open_table_if_exists().await? else {
            return Ok(0);
        };

        table
            .count_rows(filter.map(|f| f.predicate()))
            .await
            .map_err(|e| classify_error(&e, "Failed to count rows", RagError::Database))
    }

    /// Name, dimension and size of the collection; `None` before the first insert
    #[inline]
    pub async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let Some(table) = self.open_table_if_exists().await? else {
            return Ok(None);
        };

        let dimension = vector_dimension(&table).await?;
        let points_count = table
            .count_rows(None)
            .await
            .map_err(|e| classify_error(&e, "Failed to count rows", RagError::Database))?;

        Ok(Some(CollectionInfo {
            name: self.table_name.clone(),
            dimension,
            points_count,
            metric: DistanceMetric::Cosine,
        }))
    }

    /// Whether the database answers at all
    #[inline]
    pub async fn check_connection(&self) -> bool {
        match self.connection.table_names().execute().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Vector store connection check failed: {}", e);
                false
            }
        }
    }

    /// Compact data files and prune old versions
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        let Some(table) = self.open_table_if_exists().await? else {
            return Ok(());
        };

        debug!("Optimizing collection {}", self.table_name);
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| classify_error(&e, "Failed to optimize table", RagError::Database))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| classify_error(&e, "Failed to open table", RagError::Database))
    }

    async fn open_table_if_exists(&self) -> Result<Option<Table>> {
        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(classify_error(
                &e,
                "Failed to open table",
                RagError::Database,
            )),
        }
    }

    fn cached_dimension(&self) -> Option<usize> {
        *self
            .dimension
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_cached_dimension(&self, dimension: usize) {
        *self
            .dimension
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(dimension);
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RagError::DimensionMismatch { expected, actual })
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RagError::InvalidInput(format!("{} {} does not fit in u32", what, value)))
}

/// Map a LanceDB error, treating storage and connectivity failures as
/// `StoreUnavailable`
fn classify_error<E: std::fmt::Display>(
    error: &E,
    context: &str,
    fallback: fn(String) -> RagError,
) -> RagError {
    let message = format!("{}: {}", context, error);
    let lowered = message.to_lowercase();
    if lowered.contains("object store")
        || lowered.contains("connection")
        || lowered.contains("timed out")
        || lowered.contains("permission denied")
        || lowered.contains("no space left")
    {
        RagError::StoreUnavailable(message)
    } else {
        fallback(message)
    }
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    let list_size = i32::try_from(dimension).map_err(|_| {
        RagError::InvalidInput(format!("vector dimension {} is too large", dimension))
    })?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                list_size,
            ),
            false,
        ),
        Field::new("kb_id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("text_length", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

async fn vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| classify_error(&e, "Failed to get table schema", RagError::Database))?;

    let field = schema
        .field_with_name("vector")
        .map_err(|_| RagError::Database("Collection has no vector column".to_string()))?;

    match field.data_type() {
        DataType::FixedSizeList(_, size) => usize::try_from(*size)
            .map_err(|_| RagError::Database(format!("Invalid vector dimension {}", size))),
        other => Err(RagError::Database(format!(
            "Vector column has unexpected type {}",
            other
        ))),
    }
}

fn create_record_batch(points: &[VectorPoint], dimension: usize) -> Result<RecordBatch> {
    let schema = create_schema(dimension)?;
    let list_size = i32::try_from(dimension).map_err(|_| {
        RagError::InvalidInput(format!("vector dimension {} is too large", dimension))
    })?;

    let len = points.len();
    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut kb_ids = Vec::with_capacity(len);
    let mut doc_ids = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut text_lengths = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for point in points {
        ids.push(point.id.to_string());
        flat_values.extend_from_slice(&point.vector);
        kb_ids.push(point.payload.kb_id.to_string());
        doc_ids.push(point.payload.doc_id.to_string());
        chunk_indices.push(point.payload.chunk_index);
        texts.push(point.payload.text.as_str());
        text_lengths.push(point.payload.text_length);
        created_ats.push(point.payload.created_at.to_rfc3339());
    }

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        field,
        list_size,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::InsertFailed(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(kb_ids)),
        Arc::new(StringArray::from(doc_ids)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(texts)),
        Arc::new(UInt32Array::from(text_lengths)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::InsertFailed(format!("Failed to create record batch: {}", e)))
}

fn typed_column<'a, A: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| RagError::Database(format!("Invalid {} value {:?}: {}", column, value, e)))
}

/// Decode a result batch into points, skipping rows without a vector
fn parse_points(batch: &RecordBatch) -> Result<Vec<VectorPoint>> {
    let ids = typed_column::<StringArray>(batch, "id")?;
    let vectors = typed_column::<FixedSizeListArray>(batch, "vector")?;
    let kb_ids = typed_column::<StringArray>(batch, "kb_id")?;
    let doc_ids = typed_column::<StringArray>(batch, "doc_id")?;
    let chunk_indices = typed_column::<UInt32Array>(batch, "chunk_index")?;
    let texts = typed_column::<StringArray>(batch, "text")?;
    let text_lengths = typed_column::<UInt32Array>(batch, "text_length")?;
    let created_ats = typed_column::<StringArray>(batch, "created_at")?;

    let mut points = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if vectors.is_null(row) {
            warn!("Skipping point {} without a stored vector", ids.value(row));
            continue;
        }

        let values = vectors.value(row);
        let Some(values) = values.as_any().downcast_ref::<Float32Array>() else {
            warn!("Skipping point {} with a non-f32 vector", ids.value(row));
            continue;
        };

        let created_at = DateTime::parse_from_rfc3339(created_ats.value(row))
            .map_err(|e| RagError::Database(format!("Invalid created_at value: {}", e)))?
            .with_timezone(&Utc);

        points.push(VectorPoint {
            id: parse_uuid(ids.value(row), "id")?,
            vector: values.values().to_vec(),
            payload: PointPayload {
                kb_id: parse_uuid(kb_ids.value(row), "kb_id")?,
                doc_id: parse_uuid(doc_ids.value(row), "doc_id")?,
                chunk_index: chunk_indices.value(row),
                text: texts.value(row).to_string(),
                text_length: text_lengths.value(row),
                created_at,
            },
        });
    }

    Ok(points)
}
