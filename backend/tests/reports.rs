//! Report lifecycle and CSV export over stored predictions.

mod support;

use std::sync::Arc;
use std::time::Duration;

use hmpi_backend::api::{
    DateRange, OwnerId, PredictionId, ReportConfig, ReportFormat, ReportId, ReportStatus,
};
use hmpi_backend::db::{FullRepository, LocalRepository, PredictionRepository};
use hmpi_backend::services::{ErrorKind, ReportLifecycleManager, CSV_COLUMNS};
use support::{owner, prediction};

fn config(format: ReportFormat) -> ReportConfig {
    ReportConfig {
        title: "January survey".to_string(),
        description: None,
        date_range: DateRange {
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
        },
        location: None,
        include_charts: true,
        include_map: false,
        include_raw_data: true,
        format,
        prediction_ids: None,
    }
}

async fn seeded() -> (Arc<LocalRepository>, ReportLifecycleManager) {
    let repo = Arc::new(LocalRepository::new());
    repo.store_predictions(
        &owner(),
        vec![
            prediction(3, 0.0, 12.5),
            prediction(9, 0.0, 75.25),
            prediction(20, 5.0, 140.0),
        ],
    )
    .await
    .unwrap();
    let manager = ReportLifecycleManager::new(repo.clone() as Arc<dyn FullRepository>);
    (repo, manager)
}

async fn wait_terminal(manager: &ReportLifecycleManager, id: ReportId) -> ReportStatus {
    for _ in 0..200 {
        let status = manager.status(&owner(), id).await.unwrap().status;
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("report {} did not finish", id);
}

#[tokio::test]
async fn test_generate_twice_yields_two_completed_reports() {
    let (_, manager) = seeded().await;

    let first = manager.generate(&owner(), config(ReportFormat::Pdf)).await.unwrap();
    let second = manager.generate(&owner(), config(ReportFormat::Pdf)).await.unwrap();
    assert_ne!(first, second);

    assert_eq!(wait_terminal(&manager, first).await, ReportStatus::Completed);
    assert_eq!(wait_terminal(&manager, second).await, ReportStatus::Completed);

    for id in [first, second] {
        let report = manager.get(&owner(), id).await.unwrap();
        assert_eq!(report.samples_count, 3);
        assert_eq!(
            report.download_url.as_deref(),
            Some(format!("/v1/reports/{}/download", id).as_str())
        );

        let artifact = manager.download(&owner(), id).await.unwrap();
        assert_eq!(artifact.content_type, "application/pdf");
        assert!(artifact.bytes.starts_with(b"%PDF-"));
        assert_eq!(report.file_size, Some(artifact.bytes.len()));
    }

    let page = manager.list(&owner(), None, None).await.unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_excel_report_downloads_as_csv() {
    let (_, manager) = seeded().await;
    let id = manager.generate(&owner(), config(ReportFormat::Excel)).await.unwrap();
    assert_eq!(wait_terminal(&manager, id).await, ReportStatus::Completed);

    let artifact = manager.download(&owner(), id).await.unwrap();
    assert!(artifact.content_type.starts_with("text/csv"));
    assert!(artifact.file_name.ends_with(".csv"));
    let text = String::from_utf8(artifact.bytes).unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[tokio::test]
async fn test_reports_are_invisible_to_other_owners() {
    let (_, manager) = seeded().await;
    let id = manager.generate(&owner(), config(ReportFormat::Pdf)).await.unwrap();
    wait_terminal(&manager, id).await;

    let mallory = OwnerId::new("mallory");
    let err = manager.download(&mallory, id).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotFound | ErrorKind::Forbidden));
    assert_eq!(manager.list(&mallory, None, None).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_csv_export_round_trips_ids_and_scores() {
    let (repo, manager) = seeded().await;
    let (stored, _) = repo.list_predictions(&owner(), 0, 100).await.unwrap();
    let ids: Vec<PredictionId> = stored.iter().map(|p| p.id).collect();

    let bytes = manager.export_csv(&owner(), &ids).await.unwrap();

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, CSV_COLUMNS);

    let mut recovered: Vec<(PredictionId, f64)> = reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            (record[0].parse().unwrap(), record[2].parse().unwrap())
        })
        .collect();
    recovered.sort_by_key(|(id, _)| *id);

    let mut expected: Vec<(PredictionId, f64)> =
        stored.iter().map(|p| (p.id, p.hmpi_score)).collect();
    expected.sort_by_key(|(id, _)| *id);

    assert_eq!(recovered.len(), expected.len());
    for ((got_id, got_score), (want_id, want_score)) in recovered.iter().zip(&expected) {
        assert_eq!(got_id, want_id);
        assert!((got_score - want_score).abs() <= 0.01);
    }
}

#[tokio::test]
async fn test_csv_export_rejects_foreign_ids() {
    let (_, manager) = seeded().await;
    let err = manager
        .export_csv(&owner(), &[PredictionId::new()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = manager.export_csv(&owner(), &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}
