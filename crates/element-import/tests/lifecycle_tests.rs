//! Cancellation, rollback and shutdown of running and finished imports.

mod common;

use futures_util::future::join_all;

use common::*;
use element_import::db::entities::{Element, ElementType};
use element_import::lifecycle::CancelOutcome;
use element_import::{
    GateKind, ImportError, JobStatus, LifecycleError, RollbackError, RollbackReport,
};

/// Rows enough that a job is still persisting when a test reacts to its first
/// progress event.
const LONG_IMPORT_ROWS: usize = 800;

async fn finished_import(harness: &TestHarness) -> i32 {
    let sheet = ElementSheetBuilder::standard()
        .element("W1", "3", "2")
        .element("W2", "1", "");
    let job = harness.run(workbook(sheet)).await;
    assert_eq!(job.status, JobStatus::Completed);
    job.id
}

fn rollback_harness_config() -> element_import::Config {
    ConfigBuilder::new().rollback_by_default().build()
}

// ─── Cancellation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_mid_run_stops_persisting() {
    let harness = TestHarness::new().await;
    let mut events = harness.service.subscribe();
    let request = harness
        .request(
            "long.xlsx",
            workbook(ElementSheetBuilder::standard().elements(LONG_IMPORT_ROWS)),
        )
        .batch_size(1);
    let job_id = harness.service.start_import(request).await.unwrap();

    first_progress(&mut events, job_id).await;
    let accepted = harness.service.cancel_and_rollback(job_id).await.unwrap();
    assert_eq!(accepted.outcome, CancelOutcome::Cancelled);
    assert!(!accepted.rollback_scheduled);

    let job = harness.wait(job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 0);
    assert_eq!(job.error.as_deref(), Some("Import cancelled by user"));

    let persisted = harness.element_types_of(job_id).await.len();
    assert!(persisted >= 1);
    assert!(persisted < LONG_IMPORT_ROWS, "{} rows persisted", persisted);
    // Nothing is written once the driver is gone.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(harness.element_types_of(job_id).await.len(), persisted);
    assert!(!harness.service.registry().is_registered(job_id));
}

#[tokio::test]
async fn test_cancel_then_rollback_removes_partial_rows() {
    let harness = TestHarness::with_config(rollback_harness_config()).await;
    let mut events = harness.service.subscribe();
    let request = harness
        .request(
            "long.xlsx",
            workbook(ElementSheetBuilder::standard().elements(LONG_IMPORT_ROWS)),
        )
        .batch_size(2);
    let job_id = harness.service.start_import(request).await.unwrap();

    first_progress(&mut events, job_id).await;
    let (accepted, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    assert!(accepted.rollback_scheduled);

    let report = task.unwrap().await.unwrap().unwrap();
    assert!(report.element_types >= 1);
    assert_eq!(report.elements, report.element_types);

    assert!(harness.element_types_of(job_id).await.is_empty());
    assert_eq!(harness.count::<Element>().await, 0);
    let job = harness.job(job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(!job.rollback_enabled);
}

#[tokio::test]
async fn test_cancel_pending_job_without_driver() {
    let harness = TestHarness::new().await;
    let job_id = pending_job(&harness.db, false).await;

    let accepted = harness.service.cancel_and_rollback(job_id).await.unwrap();

    assert_eq!(accepted.outcome, CancelOutcome::NotFound);
    assert!(!accepted.rollback_scheduled);
    assert_eq!(harness.job(job_id).await.status, JobStatus::Cancelled);
    let registry = harness.service.registry();
    assert!(registry.is_terminated(job_id));
    assert!(registry.is_global_termination_set());
    assert!(!registry.is_creation_blocked());

    // Nothing drains, so the next import starts right away.
    let next = harness
        .run(workbook(ElementSheetBuilder::standard().element("W1", "1", "")))
        .await;
    assert_eq!(next.status, JobStatus::Completed);
    assert!(!registry.is_global_termination_set());
}

#[tokio::test]
async fn test_cancel_halts_every_running_job() {
    let harness = TestHarness::new().await;
    let mut events = harness.service.subscribe();
    let long = || workbook(ElementSheetBuilder::standard().elements(LONG_IMPORT_ROWS));
    let cancelled = harness
        .service
        .start_import(harness.request("first.xlsx", long()).batch_size(1))
        .await
        .unwrap();
    let bystander = harness
        .service
        .start_import(harness.request("second.xlsx", long()).batch_size(1))
        .await
        .unwrap();

    first_progress(&mut events, cancelled).await;
    harness.service.cancel_and_rollback(cancelled).await.unwrap();
    let registry = harness.service.registry();
    assert!(registry.is_global_termination_set());

    let job = harness.wait(bystander).await;
    assert!(job.status.is_cancellation(), "{}", job.status);
    assert!(harness.element_types_of(bystander).await.len() < LONG_IMPORT_ROWS);
    assert!(!registry.is_terminated(bystander));

    assert!(registry.wait_unregistered(cancelled, JOB_TIMEOUT).await);
    assert!(registry.wait_unregistered(bystander, JOB_TIMEOUT).await);
    let next = harness
        .run(workbook(ElementSheetBuilder::standard().element("W9", "1", "")))
        .await;
    assert_eq!(next.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_force_cancel_stuck_registration() {
    let harness = TestHarness::new().await;
    let job_id = pending_job(&harness.db, false).await;
    let registry = harness.service.registry();
    // Registered with no driver behind it, so it never unregisters.
    let token = registry.register(job_id).unwrap();

    let outcome = harness.service.force_cancel(job_id).await.unwrap();

    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert!(token.is_cancelled());
    assert!(registry.is_terminated(job_id));
    let job = harness.job(job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 0);
    assert_eq!(job.error.as_deref(), Some("Import cancelled by user"));

    // Repeating it changes nothing.
    let again = harness.service.force_cancel(job_id).await.unwrap();
    assert_eq!(again, CancelOutcome::AlreadyTerminal);
    assert_eq!(harness.job(job_id).await.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_force_cancel_running_import() {
    let harness = TestHarness::new().await;
    let mut events = harness.service.subscribe();
    let request = harness
        .request(
            "long.xlsx",
            workbook(ElementSheetBuilder::standard().elements(LONG_IMPORT_ROWS)),
        )
        .batch_size(1);
    let job_id = harness.service.start_import(request).await.unwrap();

    first_progress(&mut events, job_id).await;
    harness.service.force_cancel(job_id).await.unwrap();

    let registry = harness.service.registry();
    assert!(registry.wait_unregistered(job_id, JOB_TIMEOUT).await);
    let job = harness.job(job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(harness.element_types_of(job_id).await.len() < LONG_IMPORT_ROWS);
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let harness = TestHarness::new().await;

    assert!(matches!(
        harness.service.cancel_and_rollback(4242).await,
        Err(ImportError::JobNotFound(4242))
    ));
    assert!(matches!(
        harness.service.enable_rollback(4242).await,
        Err(ImportError::JobNotFound(4242))
    ));
}

#[tokio::test]
async fn test_creation_blocked_while_cancelled_job_drains() {
    let harness = TestHarness::new().await;
    let registry = harness.service.registry();
    registry.register(900).unwrap();
    assert_eq!(registry.cancel(900), CancelOutcome::Cancelled);

    let sheet = || workbook(ElementSheetBuilder::standard().element("W1", "1", ""));
    let err = harness
        .service
        .start_import(harness.request("a.xlsx", sheet()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::Lifecycle(LifecycleError::CreationBlocked)
    ));
    assert_eq!(harness.job_count().await, 0);

    registry.unregister(900);
    let job = harness.run(sheet()).await;
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_halt_all_terminates_running_jobs() {
    let harness = TestHarness::new().await;
    let mut events = harness.service.subscribe();
    let request = harness
        .request(
            "long.xlsx",
            workbook(ElementSheetBuilder::standard().elements(LONG_IMPORT_ROWS)),
        )
        .batch_size(1);
    let job_id = harness.service.start_import(request).await.unwrap();

    first_progress(&mut events, job_id).await;
    harness.service.registry().halt_all();

    let job = harness.wait(job_id).await;
    assert!(job.status.is_cancellation(), "{}", job.status);
    assert!(harness.element_types_of(job_id).await.len() < LONG_IMPORT_ROWS);

    // The next registration starts with a fresh fleet token.
    let next = harness
        .run(workbook(ElementSheetBuilder::standard().element("W9", "1", "")))
        .await;
    assert_eq!(next.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_shutdown_rejects_new_imports() {
    let harness = TestHarness::new().await;
    finished_import(&harness).await;

    harness.service.graceful_shutdown().await.unwrap();

    let err = harness
        .service
        .start_import(harness.request(
            "late.xlsx",
            workbook(ElementSheetBuilder::standard().element("W1", "1", "")),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Lifecycle(LifecycleError::ShuttingDown)));
    assert!(harness.service.list_running().shutting_down);
}

// ─── Rollback ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rollback_requires_opt_in() {
    let harness = TestHarness::new().await;
    let job_id = finished_import(&harness).await;

    let (accepted, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    assert!(!accepted.rollback_scheduled);
    assert!(task.is_none());
    assert_eq!(harness.element_types_of(job_id).await.len(), 2);

    harness.service.enable_rollback(job_id).await.unwrap();
    let (accepted, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    assert!(accepted.rollback_scheduled);
    let report = task.unwrap().await.unwrap().unwrap();

    assert_eq!(report.element_types, 2);
    assert_eq!(report.elements, 6);
    assert_eq!(report.drawings, 2);
    assert_eq!(report.drawings_revision, 2);
    assert_eq!(report.hierarchy_quantities, 3);
    assert_eq!(report.element_type_quantities, 3);
    assert_eq!(report.stage_paths, 2);
    assert_eq!(report.bom_lines, 2);
    assert_eq!(report.element_type_revisions, 2);
    assert_eq!(harness.count::<ElementType>().await, 0);
}

#[tokio::test]
async fn test_concurrent_cancels_roll_back_once() {
    let harness = TestHarness::with_config(rollback_harness_config()).await;
    let job_id = finished_import(&harness).await;

    let attempts = (0..8).map(|_| {
        let service = harness.service.clone();
        tokio::spawn(async move {
            let (_, task) = service.cancel_and_schedule_rollback(job_id).await.unwrap();
            match task {
                Some(task) => Some(task.await.unwrap()),
                None => None,
            }
        })
    });
    let results: Vec<Option<Result<RollbackReport, RollbackError>>> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results
        .iter()
        .filter(|r| matches!(r, Some(Ok(_))))
        .count();
    assert_eq!(successes, 1);
    assert!(results.iter().all(|r| matches!(
        r,
        None | Some(Ok(_)) | Some(Err(RollbackError::Disabled { .. }))
    )));
    assert_eq!(harness.count::<ElementType>().await, 0);
    assert!(!harness.job(job_id).await.rollback_enabled);
}

#[tokio::test]
async fn test_activity_gate_denies_until_cleared() {
    let harness = TestHarness::with_config(rollback_harness_config()).await;
    let job_id = finished_import(&harness).await;
    let types = harness.element_types_of(job_id).await;
    harness.add_activity(types[1].element_type_id, "in_progress").await;
    harness.add_activity(types[1].element_type_id, "done").await;

    let (_, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    let err = task.unwrap().await.unwrap().unwrap_err();

    let RollbackError::Denied(denial) = err else {
        panic!("expected a denial, got {:?}", err);
    };
    assert_eq!(denial.gate, GateKind::Activity);
    assert_eq!(denial.count, 1);
    assert_eq!(harness.element_types_of(job_id).await.len(), 2);
    assert!(harness.job(job_id).await.rollback_enabled);

    harness.clear_activities().await;
    let (_, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    task.unwrap().await.unwrap().unwrap();
    assert!(harness.element_types_of(job_id).await.is_empty());
}

#[tokio::test]
async fn test_production_gate_denies_rollback() {
    let harness = TestHarness::with_config(rollback_harness_config()).await;
    let job_id = finished_import(&harness).await;
    let types = harness.element_types_of(job_id).await;
    harness.start_production(types[0].element_type_id).await;

    let (_, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    let err = task.unwrap().await.unwrap().unwrap_err();

    assert!(matches!(
        err,
        RollbackError::Denied(ref d) if d.gate == GateKind::Production && d.count == 5
    ));
    assert_eq!(harness.count::<Element>().await, 6);
}

#[tokio::test]
async fn test_stockyard_gate_denies_rollback() {
    let harness = TestHarness::with_config(rollback_harness_config()).await;
    let job_id = finished_import(&harness).await;
    let types = harness.element_types_of(job_id).await;
    harness.add_stock(types[0].element_type_id, false).await;
    harness.add_stock(types[0].element_type_id, true).await;

    let (_, task) = harness
        .service
        .cancel_and_schedule_rollback(job_id)
        .await
        .unwrap();
    let err = task.unwrap().await.unwrap().unwrap_err();

    assert!(matches!(
        err,
        RollbackError::Denied(ref d) if d.gate == GateKind::Stockyard && d.count == 1
    ));
    assert!(harness.job(job_id).await.rollback_enabled);
}

#[tokio::test]
async fn test_rollback_leaves_other_jobs_alone() {
    let harness = TestHarness::with_config(rollback_harness_config()).await;
    let first = finished_import(&harness).await;
    let second = finished_import(&harness).await;

    let (_, task) = harness
        .service
        .cancel_and_schedule_rollback(first)
        .await
        .unwrap();
    task.unwrap().await.unwrap().unwrap();

    assert!(harness.element_types_of(first).await.is_empty());
    assert_eq!(harness.element_types_of(second).await.len(), 2);
    assert_eq!(harness.count::<Element>().await, 6);
    assert_eq!(harness.job(second).await.status, JobStatus::Completed);
}
