use super::*;

#[test]
fn euclidean_is_squared_l2() {
    let distance = DistanceMetric::Euclidean.distance(&[0.0, 0.0], &[3.0, 4.0]);
    assert_eq!(distance, 25.0);
}

#[test]
fn cosine_distance_range() {
    let metric = DistanceMetric::Cosine;
    assert!(metric.distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
    assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    assert!((metric.distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    assert_eq!(metric.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
}

#[test]
fn neighbors_tie_break_on_position() {
    let mut neighbors = vec![
        Neighbor {
            position: 2,
            id: "c".to_string(),
            distance: 0.5,
        },
        Neighbor {
            position: 0,
            id: "a".to_string(),
            distance: 0.5,
        },
        Neighbor {
            position: 1,
            id: "b".to_string(),
            distance: 0.1,
        },
    ];
    neighbors.sort_by(compare_neighbors);

    let order: Vec<usize> = neighbors.iter().map(|n| n.position).collect();
    assert_eq!(order, vec![1, 0, 2]);
}

#[test]
fn metric_serializes_lowercase() {
    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        metric: DistanceMetric,
    }

    let encoded = toml::to_string(&Wrapper {
        metric: DistanceMetric::Cosine,
    })
    .expect("serializes");
    assert!(encoded.contains("\"cosine\""));
}

#[tokio::test]
async fn config_selects_backend() {
    let mut config = Config::default();
    let backend = factory_from_config(&config)
        .create(0)
        .await
        .expect("flat backend creates");
    assert_eq!(backend.name(), "flat");
    assert_eq!(backend.metric(), DistanceMetric::Euclidean);

    let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
    config.base_dir = temp_dir.path().to_path_buf();
    config.retrieval.backend = RetrievalBackendKind::Lancedb;
    config.retrieval.metric = DistanceMetric::Cosine;
    let backend = factory_from_config(&config)
        .create(3)
        .await
        .expect("lancedb backend creates");
    assert_eq!(backend.name(), "lancedb");
    assert_eq!(backend.metric(), DistanceMetric::Cosine);
}
