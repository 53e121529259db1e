//! Isolated import environment for integration tests.
//!
//! Every harness owns its own in-memory SQLite database, seeded with the
//! reference data of project [`PROJECT_ID`], and an [`ImportService`] that
//! reads workbooks from a [`MemoryLoader`] instead of the filesystem.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use element_import::config::Config;
use element_import::db::entities::{
    activity, drawing_type, element, element_type, import_job, inv_bom, precast, precast_stock,
    project_stage, Element, ElementType,
};
use element_import::db::{self, job_repo};
use element_import::workbook::{Workbook, WorkbookError, WorkbookLoader};
use element_import::{ImportService, ImportProgressEvent, StartImport};

use super::builders::ConfigBuilder;

pub const PROJECT_ID: i32 = 7;

/// Upper bound for a job to finish in tests.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves prebuilt workbooks by path.
#[derive(Default)]
pub struct MemoryLoader {
    workbooks: RwLock<HashMap<PathBuf, Workbook>>,
}

impl MemoryLoader {
    pub fn insert(&self, path: PathBuf, workbook: Workbook) {
        self.workbooks.write().unwrap().insert(path, workbook);
    }
}

impl WorkbookLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Workbook, WorkbookError> {
        self.workbooks
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| WorkbookError::Open {
                path: path.to_path_buf(),
                message: "no such workbook".to_string(),
            })
    }
}

/// Test harness providing an isolated import engine.
pub struct TestHarness {
    pub db: DatabaseConnection,
    pub service: ImportService,
    pub loader: Arc<MemoryLoader>,
}

impl TestHarness {
    /// Harness with the default test config.
    pub async fn new() -> Self {
        Self::with_config(ConfigBuilder::new().build()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let db = db::connect_in_memory()
            .await
            .expect("Failed to open in-memory database");
        seed_reference_data(&db).await;

        let loader = Arc::new(MemoryLoader::default());
        let service = ImportService::new(db.clone(), config).with_loader(loader.clone());
        Self {
            db,
            service,
            loader,
        }
    }

    /// Registers `workbook` under an upload path and returns the path.
    pub fn add_workbook(&self, name: &str, workbook: Workbook) -> PathBuf {
        let path = PathBuf::from(format!("/uploads/project-{}/{}", PROJECT_ID, name));
        self.loader.insert(path.clone(), workbook);
        path
    }

    pub fn request(&self, name: &str, workbook: Workbook) -> StartImport {
        StartImport::new(PROJECT_ID, self.add_workbook(name, workbook), "tester")
    }

    /// Starts an import of `workbook` and returns the job id.
    pub async fn start(&self, workbook: Workbook) -> i32 {
        self.service
            .start_import(self.request("elements.xlsx", workbook))
            .await
            .expect("import should be accepted")
    }

    /// Starts an import and waits for it to finish.
    pub async fn run(&self, workbook: Workbook) -> import_job::Model {
        let job_id = self.start(workbook).await;
        self.wait(job_id).await
    }

    pub async fn wait(&self, job_id: i32) -> import_job::Model {
        self.service
            .wait_for_job(job_id, JOB_TIMEOUT)
            .await
            .expect("job row should exist")
    }

    pub async fn job(&self, job_id: i32) -> import_job::Model {
        job_repo::find_by_id(&self.db, job_id)
            .await
            .unwrap()
            .expect("job row should exist")
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub async fn count<E>(&self) -> u64
    where
        E: EntityTrait,
        E::Model: Sync,
    {
        E::find().count(&self.db).await.unwrap()
    }

    pub async fn job_count(&self) -> u64 {
        self.count::<import_job::Entity>().await
    }

    pub async fn element_types_of(&self, job_id: i32) -> Vec<element_type::Model> {
        ElementType::find()
            .filter(element_type::Column::JobId.eq(job_id))
            .order_by_asc(element_type::Column::ElementTypeId)
            .all(&self.db)
            .await
            .unwrap()
    }

    pub async fn element_ids(&self) -> Vec<String> {
        Element::find()
            .order_by_asc(element::Column::Id)
            .all(&self.db)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.element_id)
            .collect()
    }

    // ─── Fixtures ───────────────────────────────────────────────────────────

    pub async fn add_precast(&self, id: i32, path: &str, naming: &str, parent_id: Option<i32>) {
        insert_precast(&self.db, id, path, naming, parent_id).await;
    }

    pub async fn add_activity(&self, element_type_id: i32, status: &str) {
        activity::ActiveModel {
            project_id: Set(PROJECT_ID),
            element_type_id: Set(element_type_id),
            element_id: Set(None),
            name: Set("Casting".to_string()),
            status: Set(status.to_string()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap();
    }

    pub async fn add_stock(&self, element_type_id: i32, stockyard: bool) {
        precast_stock::ActiveModel {
            project_id: Set(PROJECT_ID),
            element_type_id: Set(element_type_id),
            element_id: Set(None),
            stockyard: Set(stockyard),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap();
    }

    /// Puts every element of `element_type_id` into production.
    pub async fn start_production(&self, element_type_id: i32) {
        Element::update_many()
            .col_expr(element::Column::Instage, Expr::value(true))
            .filter(element::Column::ElementTypeId.eq(element_type_id))
            .exec(&self.db)
            .await
            .unwrap();
    }

    pub async fn clear_activities(&self) {
        activity::Entity::delete_many().exec(&self.db).await.unwrap();
    }
}

/// Waits for the first persisted batch of `job_id`.
pub async fn first_progress(
    events: &mut tokio::sync::broadcast::Receiver<ImportProgressEvent>,
    job_id: i32,
) {
    use tokio::sync::broadcast::error::RecvError;

    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if event.job_id == job_id && event.processed_items >= 1 => return,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("progress channel closed"),
            }
        }
    };
    tokio::time::timeout(JOB_TIMEOUT, wait)
        .await
        .expect("no progress event received");
}

/// Tower G6 with two floors, two drawing types, two stages and two BOM
/// products for [`PROJECT_ID`].
async fn seed_reference_data(db: &DatabaseConnection) {
    insert_precast(db, 1, "tower_g6", "Tower G6", None).await;
    insert_precast(db, 2, "tower_g6.floor_1", "TG6-F1", Some(1)).await;
    insert_precast(db, 3, "tower_g6.floor_2", "TG6-F2", Some(1)).await;

    for (id, name) in [(1, "Drawings_GA"), (2, "Drawings_Shop")] {
        drawing_type::ActiveModel {
            drawing_type_id: Set(id),
            project_id: Set(PROJECT_ID),
            drawing_type_name: Set(name.to_string()),
        }
        .insert(db)
        .await
        .unwrap();
    }

    for (id, name, sequence) in [(10, "Casting", 1), (11, "Curing", 2)] {
        project_stage::ActiveModel {
            id: Set(id),
            project_id: Set(PROJECT_ID),
            name: Set(name.to_string()),
            sequence: Set(sequence),
        }
        .insert(db)
        .await
        .unwrap();
    }

    for (id, name) in [(20, "Cement"), (21, "Steel")] {
        inv_bom::ActiveModel {
            id: Set(id),
            project_id: Set(PROJECT_ID),
            product_name: Set(name.to_string()),
            unit: Set(Some("kg".to_string())),
        }
        .insert(db)
        .await
        .unwrap();
    }
}

async fn insert_precast(
    db: &DatabaseConnection,
    id: i32,
    path: &str,
    naming: &str,
    parent_id: Option<i32>,
) {
    precast::ActiveModel {
        id: Set(id),
        project_id: Set(PROJECT_ID),
        path: Set(path.to_string()),
        naming_convention: Set(naming.to_string()),
        parent_id: Set(parent_id),
    }
    .insert(db)
    .await
    .unwrap();
}

/// Creates a pending job row that no driver will ever pick up.
pub async fn pending_job(db: &DatabaseConnection, rollback_enabled: bool) -> i32 {
    job_repo::create(
        db,
        job_repo::NewJob {
            project_id: PROJECT_ID,
            file_path: "/uploads/stale.xlsx".to_string(),
            created_by: Some("tester".to_string()),
            rollback_enabled,
        },
    )
    .await
    .unwrap()
    .id
}
