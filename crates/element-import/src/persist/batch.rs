//! Transactional persistence of decoded element types.
//!
//! One transaction per batch, one savepoint per element type. The probe runs
//! before every insert; the persisted job status is read at the start of the
//! batch and again right before commit.

use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures_util::FutureExt;
use sea_orm::{
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, Set, TransactionTrait,
};
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use super::probe::{CancelProbe, CancelReason};
use crate::db::catalog_repo;
use crate::db::entities::{
    drawing, drawing_revision, element, element_type, element_type_bom, element_type_path,
    element_type_quantity, element_type_revision, hierarchy_quantity, Drawing, DrawingRevision,
    Element, ElementType, ElementTypeBom, ElementTypePath, ElementTypeQuantity,
    ElementTypeRevision, HierarchyQuantity,
};
use crate::db::DatabaseError;
use crate::sanitize::identifier_fragment;
use crate::workbook::ElementTypeDraft;

/// Elements are inserted in chunks of this size.
const ELEMENT_CHUNK: usize = 100;

/// A row that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub row: usize,
    pub element_type: String,
    pub message: String,
}

/// Why a batch was rolled back.
#[derive(Error, Debug)]
pub enum BatchFailure {
    #[error("Batch cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("{} row(s) failed", .0.len())]
    Rows(Vec<ItemError>),

    #[error("Transaction panic: {0}")]
    Panicked(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<DbErr> for BatchFailure {
    fn from(err: DbErr) -> Self {
        BatchFailure::Database(DatabaseError::from(err))
    }
}

impl BatchFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchFailure::Cancelled(_))
    }
}

/// Rows written by one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub element_types: usize,
    pub drawings: usize,
    pub hierarchy_quantities: usize,
    pub element_type_quantities: usize,
    pub elements: usize,
    pub stage_paths: usize,
    pub bom_lines: usize,
}

impl BatchReport {
    pub fn absorb(&mut self, other: BatchReport) {
        self.element_types += other.element_types;
        self.drawings += other.drawings;
        self.hierarchy_quantities += other.hierarchy_quantities;
        self.element_type_quantities += other.element_type_quantities;
        self.elements += other.elements;
        self.stage_paths += other.stage_paths;
        self.bom_lines += other.bom_lines;
    }
}

/// Failure of a single element type inside its savepoint.
enum ElementFailure {
    Cancelled(CancelReason),
    Invalid(String),
    Database(DbErr),
}

impl From<DbErr> for ElementFailure {
    fn from(err: DbErr) -> Self {
        ElementFailure::Database(err)
    }
}

impl From<DatabaseError> for ElementFailure {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Orm(err) => ElementFailure::Database(err),
            other => ElementFailure::Invalid(other.to_string()),
        }
    }
}

/// Writes batches of one job.
pub struct BatchPersister {
    project_id: i32,
    job_id: i32,
    probe: CancelProbe,
}

impl BatchPersister {
    pub fn new(project_id: i32, probe: CancelProbe) -> Self {
        Self {
            project_id,
            job_id: probe.job_id(),
            probe,
        }
    }

    pub fn probe(&self) -> &CancelProbe {
        &self.probe
    }

    /// Persists `batch` atomically. Nothing is written unless every row
    /// succeeds and no cancellation is observed up to the commit.
    pub async fn persist(
        &self,
        db: &DatabaseConnection,
        batch: &[ElementTypeDraft],
    ) -> Result<BatchReport, BatchFailure> {
        let span = tracing::info_span!(
            "persist_batch",
            job_id = self.job_id,
            project_id = self.project_id,
            size = batch.len()
        );

        let outcome = AssertUnwindSafe(self.run(db, batch))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(job_id = self.job_id, "Transaction panic: {}", message);
                Err(BatchFailure::Panicked(message))
            }
        }
    }

    async fn run(
        &self,
        db: &DatabaseConnection,
        batch: &[ElementTypeDraft],
    ) -> Result<BatchReport, BatchFailure> {
        if let Some(reason) = self.probe.check() {
            return Err(BatchFailure::Cancelled(reason));
        }

        let txn = db.begin().await?;
        if let Some(reason) = self.probe.check_store(&txn).await? {
            txn.rollback().await?;
            return Err(BatchFailure::Cancelled(reason));
        }

        let mut report = BatchReport::default();
        let mut errors = Vec::new();

        for draft in batch {
            let savepoint = txn.begin().await?;
            match self.persist_element(&savepoint, draft).await {
                Ok(counts) => {
                    savepoint.commit().await?;
                    report.absorb(counts);
                }
                Err(ElementFailure::Cancelled(reason)) => {
                    savepoint.rollback().await?;
                    txn.rollback().await?;
                    tracing::info!(job_id = self.job_id, row = draft.row, %reason, "Batch cancelled");
                    return Err(BatchFailure::Cancelled(reason));
                }
                Err(ElementFailure::Invalid(message)) => {
                    savepoint.rollback().await?;
                    errors.push(self.item_error(draft, message));
                }
                Err(ElementFailure::Database(err)) => {
                    savepoint.rollback().await?;
                    errors.push(self.item_error(draft, err.to_string()));
                }
            }
        }

        if !errors.is_empty() {
            txn.rollback().await?;
            tracing::warn!(
                job_id = self.job_id,
                failed = errors.len(),
                "Batch rolled back after row errors"
            );
            return Err(BatchFailure::Rows(errors));
        }

        if let Some(reason) = self.probe.check_all(&txn).await? {
            txn.rollback().await?;
            tracing::info!(job_id = self.job_id, %reason, "Batch cancelled before commit");
            return Err(BatchFailure::Cancelled(reason));
        }

        txn.commit().await?;
        tracing::debug!(
            job_id = self.job_id,
            element_types = report.element_types,
            elements = report.elements,
            "Batch committed"
        );
        Ok(report)
    }

    fn item_error(&self, draft: &ElementTypeDraft, message: String) -> ItemError {
        ItemError {
            row: draft.row,
            element_type: draft.element_type.clone(),
            message,
        }
    }

    fn checkpoint(&self) -> Result<(), ElementFailure> {
        match self.probe.check() {
            Some(reason) => Err(ElementFailure::Cancelled(reason)),
            None => Ok(()),
        }
    }

    async fn persist_element(
        &self,
        conn: &DatabaseTransaction,
        draft: &ElementTypeDraft,
    ) -> Result<BatchReport, ElementFailure> {
        let now = Utc::now();
        let mut counts = BatchReport::default();

        let total_count = draft.total_count().ok_or_else(|| {
            ElementFailure::Invalid(format!(
                "element type {} has more elements than can be stored",
                draft.element_type
            ))
        })?;

        self.checkpoint()?;
        let geometry = &draft.geometry;
        let element_type_id = ElementType::insert(element_type::ActiveModel {
            project_id: Set(self.project_id),
            job_id: Set(Some(self.job_id)),
            element_type: Set(draft.element_type.clone()),
            element_type_name: Set(draft.name.clone()),
            thickness: Set(geometry.thickness),
            length: Set(geometry.length),
            height: Set(geometry.height),
            width: Set(geometry.width),
            volume: Set(geometry.volume),
            area: Set(geometry.area),
            mass: Set(geometry.mass),
            density: Set(geometry.density()),
            version: Set(draft.version.clone()),
            total_count_element: Set(total_count),
            created_by: Set(draft.created_by.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .exec(conn)
        .await?
        .last_insert_id;
        counts.element_types = 1;

        self.checkpoint()?;
        ElementTypeRevision::insert(element_type_revision::ActiveModel {
            element_type_id: Set(element_type_id),
            revision: Set(draft.version.clone()),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(conn)
        .await?;

        for drawing in &draft.drawings {
            self.checkpoint()?;
            Drawing::insert(drawing::ActiveModel {
                drawings_id: Set(drawing.drawings_id.clone()),
                project_id: Set(self.project_id),
                element_type_id: Set(element_type_id),
                drawing_type_id: Set(drawing.drawing_type_id),
                file: Set(drawing.file.clone()),
                version: Set(draft.version.clone()),
                created_by: Set(draft.created_by.clone()),
                created_at: Set(now),
            })
            .exec_without_returning(conn)
            .await?;

            self.checkpoint()?;
            DrawingRevision::insert(drawing_revision::ActiveModel {
                drawings_id: Set(drawing.drawings_id.clone()),
                element_type_id: Set(element_type_id),
                project_id: Set(self.project_id),
                version: Set(draft.version.clone()),
                file: Set(drawing.file.clone()),
                created_at: Set(now),
                ..Default::default()
            })
            .exec(conn)
            .await?;
            counts.drawings += 1;
        }

        for position in &draft.hierarchy {
            self.checkpoint()?;
            let node = catalog_repo::find_precast(conn, self.project_id, position.hierarchy_id)
                .await?
                .ok_or_else(|| {
                    ElementFailure::Invalid(format!(
                        "hierarchy {} ({}) does not exist in project {}",
                        position.hierarchy_id, position.naming_convention, self.project_id
                    ))
                })?;

            self.checkpoint()?;
            HierarchyQuantity::insert(hierarchy_quantity::ActiveModel {
                element_type_id: Set(element_type_id),
                hierarchy_id: Set(position.hierarchy_id),
                project_id: Set(self.project_id),
                quantity: Set(position.quantity),
                naming_convention: Set(position.naming_convention.clone()),
                ..Default::default()
            })
            .exec(conn)
            .await?;
            counts.hierarchy_quantities += 1;

            if let Some(tower_id) = node.real_parent() {
                self.checkpoint()?;
                ElementTypeQuantity::insert(element_type_quantity::ActiveModel {
                    element_type_id: Set(element_type_id),
                    project_id: Set(self.project_id),
                    tower_id: Set(tower_id),
                    floor_id: Set(node.id),
                    total_quantity: Set(position.quantity),
                    left_quantity: Set(position.quantity),
                    ..Default::default()
                })
                .exec(conn)
                .await?;
                counts.element_type_quantities += 1;
            }
        }

        let type_fragment = identifier_fragment(&draft.element_type);
        let mut sequence = 0usize;
        for position in &draft.hierarchy {
            let location_fragment = identifier_fragment(&position.naming_convention);
            let quantity = usize::try_from(position.quantity).unwrap_or(0);
            for start in (0..quantity).step_by(ELEMENT_CHUNK) {
                let len = ELEMENT_CHUNK.min(quantity - start);
                self.checkpoint()?;
                let chunk = (sequence + 1..=sequence + len).map(|seq| element::ActiveModel {
                    element_type_id: Set(element_type_id),
                    element_id: Set(element_id(&type_fragment, &location_fragment, seq)),
                    target_location: Set(position.hierarchy_id),
                    project_id: Set(self.project_id),
                    status: Set(element::STATUS_PLANNED.to_string()),
                    instage: Set(false),
                    created_by: Set(draft.created_by.clone()),
                    created_at: Set(now),
                    ..Default::default()
                });
                Element::insert_many(chunk)
                    .exec_without_returning(conn)
                    .await?;
                sequence += len;
                counts.elements += len;
            }
        }

        if !draft.stage_path.is_empty() {
            self.checkpoint()?;
            ElementTypePath::insert(element_type_path::ActiveModel {
                element_type_id: Set(element_type_id),
                stage_path: Set(serde_json::json!(draft.stage_path)),
                ..Default::default()
            })
            .exec(conn)
            .await?;
            counts.stage_paths = 1;
        }

        for line in &draft.bom {
            self.checkpoint()?;
            ElementTypeBom::insert(element_type_bom::ActiveModel {
                element_type_id: Set(element_type_id),
                project_id: Set(self.project_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                ..Default::default()
            })
            .exec(conn)
            .await?;
            counts.bom_lines += 1;
        }

        Ok(counts)
    }
}

/// `<TYPE>-<LOCATION>-<seq>`, seq zero-padded to three digits.
pub fn element_id(type_fragment: &str, location_fragment: &str, sequence: usize) -> String {
    format!("{}-{}-{:03}", type_fragment, location_fragment, sequence)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sea_orm::{ActiveModelTrait, ColumnTrait, PaginatorTrait, QueryFilter};

    use crate::db::connect_in_memory;
    use crate::db::entities::{precast, JobStatus};
    use crate::db::job_repo::{self, NewJob};
    use crate::lifecycle::JobRegistry;
    use crate::workbook::{BomDraft, DrawingDraft, Geometry, HierarchyDraft};

    const PROJECT: i32 = 7;

    async fn seed_precast(db: &DatabaseConnection, id: i32, path: &str, parent_id: Option<i32>) {
        precast::ActiveModel {
            id: Set(id),
            project_id: Set(PROJECT),
            path: Set(path.to_string()),
            naming_convention: Set(path.replace('.', " ")),
            parent_id: Set(parent_id),
        }
        .insert(db)
        .await
        .unwrap();
    }

    async fn setup() -> (DatabaseConnection, Arc<JobRegistry>, i32) {
        let db = connect_in_memory().await.unwrap();
        seed_precast(&db, 1, "tower_g6", None).await;
        seed_precast(&db, 2, "tower_g6.floor_1", Some(1)).await;
        seed_precast(&db, 3, "tower_g6.floor_2", Some(1)).await;

        let job = job_repo::create(
            &db,
            NewJob {
                project_id: PROJECT,
                file_path: "elements.xlsx".to_string(),
                created_by: Some("planner".to_string()),
                rollback_enabled: true,
            },
        )
        .await
        .unwrap();
        job_repo::mark_processing(&db, job.id, 2).await.unwrap();

        (db, Arc::new(JobRegistry::new()), job.id)
    }

    fn persister(registry: &Arc<JobRegistry>, job_id: i32) -> BatchPersister {
        let token = registry.register(job_id).unwrap();
        BatchPersister::new(PROJECT, CancelProbe::new(job_id, token, Arc::clone(registry)))
    }

    fn draft(row: usize, element_type: &str, hierarchy: Vec<(i32, i32, &str)>) -> ElementTypeDraft {
        ElementTypeDraft {
            row,
            element_type: element_type.to_string(),
            name: format!("{} panel", element_type),
            geometry: Geometry {
                mass: 500.0,
                volume: 0.25,
                ..Default::default()
            },
            version: "1".to_string(),
            drawings: vec![DrawingDraft {
                drawings_id: format!("drawing-{}", row),
                drawing_type_id: 11,
                file: format!("{}.pdf", element_type),
            }],
            hierarchy: hierarchy
                .into_iter()
                .map(|(hierarchy_id, quantity, name)| HierarchyDraft {
                    hierarchy_id,
                    quantity,
                    naming_convention: name.to_string(),
                })
                .collect(),
            stage_path: vec![21, 22],
            bom: vec![BomDraft {
                product_id: 31,
                product_name: "Cement".to_string(),
                quantity: 1.5,
            }],
            created_by: "planner".to_string(),
        }
    }

    #[tokio::test]
    async fn test_persist_batch_writes_all_dependents() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        let batch = vec![
            draft(4, "W1", vec![(2, 2, "Tower G6 Floor 1"), (3, 1, "Tower G6 Floor 2")]),
            draft(5, "W2", vec![(1, 3, "Tower G6")]),
        ];

        let report = persister.persist(&db, &batch).await.unwrap();
        assert_eq!(report.element_types, 2);
        assert_eq!(report.drawings, 2);
        assert_eq!(report.hierarchy_quantities, 3);
        // Only floors have a parent.
        assert_eq!(report.element_type_quantities, 2);
        assert_eq!(report.elements, 6);
        assert_eq!(report.stage_paths, 2);
        assert_eq!(report.bom_lines, 2);

        let types = ElementType::find()
            .filter(element_type::Column::JobId.eq(job_id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(types.len(), 2);
        let w1 = types.iter().find(|t| t.element_type == "W1").unwrap();
        assert_eq!(w1.total_count_element, 3);
        assert_eq!(w1.density, 2000.0);

        let w1_elements = Element::find()
            .filter(element::Column::ElementTypeId.eq(w1.element_type_id))
            .all(&db)
            .await
            .unwrap();
        let mut ids: Vec<String> = w1_elements.into_iter().map(|e| e.element_id).collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "W1-TOWER-G6-FLOOR-1-001",
                "W1-TOWER-G6-FLOOR-1-002",
                "W1-TOWER-G6-FLOOR-2-003"
            ]
        );

        let quantities = ElementTypeQuantity::find()
            .filter(element_type_quantity::Column::ElementTypeId.eq(w1.element_type_id))
            .all(&db)
            .await
            .unwrap();
        assert!(quantities.iter().all(|q| q.tower_id == 1));
        assert_eq!(DrawingRevision::find().count(&db).await.unwrap(), 2);
        assert_eq!(ElementTypeRevision::find().count(&db).await.unwrap(), 2);

        let path = ElementTypePath::find().one(&db).await.unwrap().unwrap();
        assert_eq!(path.stage_ids(), vec![21, 22]);
    }

    #[tokio::test]
    async fn test_unknown_hierarchy_rolls_back_whole_batch() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        let batch = vec![
            draft(4, "W1", vec![(2, 1, "Tower G6 Floor 1")]),
            draft(5, "W2", vec![(99, 1, "Nowhere")]),
        ];

        match persister.persist(&db, &batch).await {
            Err(BatchFailure::Rows(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].row, 5);
                assert!(errors[0].message.contains("99"));
            }
            other => panic!("expected row errors, got {:?}", other),
        }
        assert_eq!(ElementType::find().count(&db).await.unwrap(), 0);
        assert_eq!(Element::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_elements_span_several_chunks() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        let batch = vec![draft(4, "W1", vec![(2, 150, "F1"), (3, 60, "F2")])];

        let report = persister.persist(&db, &batch).await.unwrap();
        assert_eq!(report.elements, 210);
        assert_eq!(Element::find().count(&db).await.unwrap(), 210);

        for (id, floor) in [("W1-F1-001", 2), ("W1-F1-150", 2), ("W1-F2-151", 3), ("W1-F2-210", 3)] {
            let element = Element::find()
                .filter(element::Column::ElementId.eq(id))
                .one(&db)
                .await
                .unwrap()
                .unwrap_or_else(|| panic!("missing {}", id));
            assert_eq!(element.target_location, floor);
        }
    }

    #[tokio::test]
    async fn test_overflowing_total_is_a_row_error() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        let batch = vec![draft(
            4,
            "W1",
            vec![(2, 2_000_000_000, "F1"), (3, 2_000_000_000, "F2")],
        )];

        match persister.persist(&db, &batch).await {
            Err(BatchFailure::Rows(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].message.contains("more elements"));
            }
            other => panic!("expected row errors, got {:?}", other),
        }
        assert_eq!(ElementType::find().count(&db).await.unwrap(), 0);
        assert_eq!(Element::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_writes_nothing() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        registry.cancel(job_id);

        let result = persister
            .persist(&db, &[draft(4, "W1", vec![(2, 1, "Tower G6 Floor 1")])])
            .await;
        assert!(matches!(
            result,
            Err(BatchFailure::Cancelled(CancelReason::Token))
        ));
        assert_eq!(ElementType::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_store_status_writes_nothing() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        job_repo::force_cancelled(&db, job_id).await.unwrap();

        let result = persister
            .persist(&db, &[draft(4, "W1", vec![(2, 1, "Tower G6 Floor 1")])])
            .await;
        assert!(matches!(
            result,
            Err(BatchFailure::Cancelled(CancelReason::StoreStatus(
                JobStatus::Cancelled
            )))
        ));
        assert_eq!(ElementType::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_element_type_without_positions() {
        let (db, registry, job_id) = setup().await;
        let persister = persister(&registry, job_id);
        let mut bare = draft(4, "W9", Vec::new());
        bare.drawings.clear();
        bare.bom.clear();
        bare.stage_path.clear();

        let report = persister.persist(&db, &[bare]).await.unwrap();
        assert_eq!(
            report,
            BatchReport {
                element_types: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_element_id_format() {
        assert_eq!(element_id("W1", "TOWER-G6", 7), "W1-TOWER-G6-007");
        assert_eq!(element_id("W1", "F1", 1234), "W1-F1-1234");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
