
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, Weak};
use tracing::{debug, info, warn};

use super::{DistanceMetric, IndexEntry, Neighbor, VectorBackend, compare_neighbors};
use crate::embeddings::check_dimension;
use crate::{FaqError, Result};

const TABLE_PREFIX: &str = "faq_vectors";

/// Rows fetched beyond `k` on the first search; widened while the k-th distance is still tied
const TIE_SLACK: usize = 8;

/// `<start millis>_<pid>`, unique per process sharing a database directory
static PROCESS_TAG: LazyLock<String> =
    LazyLock::new(|| format!("{}_{}", Utc::now().timestamp_millis(), std::process::id()));

/// Live leases keyed by lock file path
static LEASES: LazyLock<Mutex<HashMap<PathBuf, Weak<TableLease>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Exclusive lock on `<prefix>_<tag>.lock`, held while any index of that tag is alive.
/// Tables whose tag has no held lock belong to an exited process and may be dropped.
#[derive(Debug)]
struct TableLease {
    file: File,
    path: PathBuf,
}

impl Drop for TableLease {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
        fs::remove_file(&self.path).ok();
    }
}

fn lock_path(db_path: &Path, tag: &str) -> PathBuf {
    db_path.join(format!("{}_{}.lock", TABLE_PREFIX, tag))
}

/// Tag of a table named `<prefix>_<millis>_<pid>_<generation>`
fn table_tag(table_name: &str) -> Option<&str> {
    let rest = table_name.strip_prefix(TABLE_PREFIX)?.strip_prefix('_')?;
    let (tag, generation) = rest.rsplit_once('_')?;
    generation.parse::<u64>().ok()?;
    let (millis, pid) = tag.split_once('_')?;
    (millis.parse::<i64>().is_ok() && pid.parse::<u32>().is_ok()).then_some(tag)
}

/// Returns the live lease for `tag`, taking the lock when this is the first index of the tag.
/// The flag is true when a new lock was taken.
fn acquire_lease(db_path: &Path, tag: &str) -> Result<(Arc<TableLease>, bool)> {
    let path = lock_path(db_path, tag);
    let mut leases = LEASES
        .lock()
        .map_err(|_| FaqError::Database("lease registry is poisoned".to_string()))?;
    if let Some(lease) = leases.get(&path).and_then(Weak::upgrade) {
        return Ok((lease, false));
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| FaqError::Database(format!("Failed to open {}: {}", path.display(), e)))?;
    file.lock_exclusive()
        .map_err(|e| FaqError::Database(format!("Failed to lock {}: {}", path.display(), e)))?;

    let lease = Arc::new(TableLease { file, path: path.clone() });
    leases.insert(path, Arc::downgrade(&lease));
    Ok((lease, true))
}

/// True when no process holds the lock file for `tag`
fn owner_exited(db_path: &Path, tag: &str) -> bool {
    let path = lock_path(db_path, tag);
    let Ok(file) = OpenOptions::new().write(true).open(&path) else {
        return true;
    };
    if file.try_lock_exclusive().is_err() {
        return false;
    }
    fs::remove_file(&path).ok();
    FileExt::unlock(&file).ok();
    true
}

/// LanceDB-backed index; one table per process and snapshot generation
pub struct LanceIndex {
    connection: Connection,
    table_name: String,
    _lease: Arc<TableLease>,
    metric: DistanceMetric,
    dimension: Option<usize>,
    ids: Vec<String>,
    positions: HashMap<String, usize>,
}

impl LanceIndex {
    /// Connect to the database under `db_path`; the table is created on first build.
    /// The first open in a process drops tables left behind by exited processes.
    #[inline]
    pub async fn open(db_path: &Path, generation: u64, metric: DistanceMetric) -> Result<Self> {
        Self::open_tagged(db_path, &PROCESS_TAG, generation, metric).await
    }

    pub(crate) async fn open_tagged(
        db_path: &Path,
        tag: &str,
        generation: u64,
        metric: DistanceMetric,
    ) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            FaqError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let (lease, first_for_tag) = acquire_lease(db_path, tag)?;
        if first_for_tag {
            Self::drop_orphaned_tables(&connection, db_path, tag).await?;
        }

        Ok(Self {
            connection,
            table_name: format!("{}_{}_{}", TABLE_PREFIX, tag, generation),
            _lease: lease,
            metric,
            dimension: None,
            ids: Vec::new(),
            positions: HashMap::new(),
        })
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
        ]))
    }

    fn create_record_batch(
        vector_dim: usize,
        rows: &[(usize, &IndexEntry)],
    ) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(rows.len());
        let mut positions = Vec::with_capacity(rows.len());
        let mut flat_values = Vec::with_capacity(rows.len() * vector_dim);

        for (position, entry) in rows {
            ids.push(entry.id.as_str());
            positions.push(u32::try_from(*position).map_err(|_| {
                FaqError::Database(format!("Position {} exceeds table capacity", position))
            })?);
            flat_values.extend_from_slice(&entry.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    FaqError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(UInt32Array::from(positions)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| FaqError::Database(format!("Failed to create record batch: {}", e)))
    }

    async fn drop_orphaned_tables(
        connection: &Connection,
        db_path: &Path,
        own_tag: &str,
    ) -> Result<()> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to list tables: {}", e)))?;

        let mut verdicts: HashMap<&str, bool> = HashMap::new();
        for table_name in &table_names {
            let Some(tag) = table_tag(table_name).filter(|tag| *tag != own_tag) else {
                continue;
            };
            let orphaned = *verdicts
                .entry(tag)
                .or_insert_with(|| owner_exited(db_path, tag));
            if !orphaned {
                continue;
            }
            info!("Dropping orphaned vector table {}", table_name);
            if let Err(e) = connection.drop_table(table_name).await {
                warn!("Failed to drop orphaned table {}: {}", table_name, e);
            }
        }
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to list tables for drop: {}", e)))?;

        if table_names.contains(&self.table_name) {
            info!("Dropping vector table {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| FaqError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    async fn create_table(&self, vector_dim: usize) -> Result<()> {
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    async fn add_rows(&self, vector_dim: usize, rows: &[(usize, &IndexEntry)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let record_batch = Self::create_record_batch(vector_dim, rows)?;
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to insert vectors: {}", e)))?;
        Ok(())
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<Neighbor>> {
        let ids = batch
            .column_by_name("id")
            .ok_or_else(|| FaqError::Database("Missing id column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| FaqError::Database("Invalid id column type".to_string()))?;

        let positions = batch
            .column_by_name("position")
            .ok_or_else(|| FaqError::Database("Missing position column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| FaqError::Database("Invalid position column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| FaqError::Database("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| FaqError::Database("Invalid _distance column type".to_string()))?;

        Ok((0..batch.num_rows())
            .map(|row| Neighbor {
                position: positions.value(row) as usize,
                id: ids.value(row).to_string(),
                distance: distances.value(row),
            })
            .collect())
    }

    async fn search_table(
        &self,
        table: &Table,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let mut results = table
            .vector_search(vector)
            .map_err(|e| FaqError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(self.distance_type())
            .limit(limit)
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to execute search: {}", e)))?;

        let mut neighbors = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to read result stream: {}", e)))?
        {
            neighbors.extend(Self::parse_search_batch(&batch)?);
        }
        neighbors.sort_by(compare_neighbors);
        Ok(neighbors)
    }

    fn distance_type(&self) -> DistanceType {
        match self.metric {
            DistanceMetric::Euclidean => DistanceType::L2,
            DistanceMetric::Cosine => DistanceType::Cosine,
        }
    }
}

#[async_trait]
impl VectorBackend for LanceIndex {
    #[inline]
    fn name(&self) -> &'static str {
        "lancedb"
    }

    #[inline]
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    async fn build(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut positions = HashMap::with_capacity(entries.len());
        let dimension = entries.first().map(|entry| entry.vector.len());
        for (position, entry) in entries.iter().enumerate() {
            if let Some(dimension) = dimension {
                check_dimension(&entry.vector, dimension)?;
            }
            if positions.insert(entry.id.clone(), position).is_some() {
                return Err(FaqError::MalformedSource(format!(
                    "duplicate index id '{}'",
                    entry.id
                )));
            }
        }

        self.drop_table_if_exists().await?;
        self.ids.clear();
        self.positions.clear();
        self.dimension = dimension;

        if let Some(dimension) = dimension {
            self.create_table(dimension).await?;
            let rows: Vec<(usize, &IndexEntry)> = entries.iter().enumerate().collect();
            self.add_rows(dimension, &rows).await?;
        }

        self.ids = entries.into_iter().map(|entry| entry.id).collect();
        self.positions = positions;
        info!(
            "Built LanceDB table {} with {} vectors",
            self.table_name,
            self.ids.len()
        );
        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(dimension) = self.dimension.filter(|_| !self.ids.is_empty()) else {
            return Err(FaqError::EmptyIndex);
        };
        check_dimension(vector, dimension)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| FaqError::Database(format!("Failed to open table: {}", e)))?;

        // Rows tied with the k-th distance may sit past the limit with lower positions,
        // so widen until the last fetched row is strictly farther or every row is in
        let total = self.ids.len();
        let mut limit = k.saturating_add(TIE_SLACK).min(total);
        let mut neighbors = loop {
            let neighbors = self.search_table(&table, vector, limit).await?;
            let boundary_tied = match (neighbors.get(k - 1), neighbors.last()) {
                (Some(kth), Some(last)) => {
                    neighbors.len() >= limit && kth.distance.total_cmp(&last.distance).is_eq()
                }
                _ => false,
            };
            if !boundary_tied || limit >= total {
                break neighbors;
            }
            limit = limit.saturating_mul(2).min(total);
            debug!(limit, "Distance tie at k, widening LanceDB search");
        };
        neighbors.truncate(k);
        debug!("LanceDB search returned {} neighbours", neighbors.len());
        Ok(neighbors)
    }

    #[inline]
    async fn upsert(&mut self, entry: IndexEntry) -> Result<usize> {
        let dimension = match self.dimension.filter(|_| !self.ids.is_empty()) {
            Some(dimension) => {
                check_dimension(&entry.vector, dimension)?;
                dimension
            }
            None => {
                let dimension = entry.vector.len();
                self.drop_table_if_exists().await?;
                self.create_table(dimension).await?;
                self.dimension = Some(dimension);
                dimension
            }
        };

        let position = match self.positions.get(&entry.id) {
            Some(&position) => {
                let table = self
                    .connection
                    .open_table(&self.table_name)
                    .execute()
                    .await
                    .map_err(|e| FaqError::Database(format!("Failed to open table: {}", e)))?;
                table
                    .delete(&format!("position = {}", position))
                    .await
                    .map_err(|e| {
                        FaqError::Database(format!("Failed to delete replaced vector: {}", e))
                    })?;
                position
            }
            None => self.ids.len(),
        };

        self.add_rows(dimension, &[(position, &entry)]).await?;

        if position == self.ids.len() {
            self.positions.insert(entry.id.clone(), position);
            self.ids.push(entry.id);
        }
        Ok(position)
    }

    #[inline]
    async fn clear(&mut self) -> Result<()> {
        self.drop_table_if_exists().await?;
        self.ids.clear();
        self.positions.clear();
        self.dimension = None;
        Ok(())
    }
}
