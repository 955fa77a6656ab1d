//! End-to-end dataset assembly: sources through pipeline and cache into
//! (features, label) pairs plus the failure report.

use kinomer_cache::{CacheConfig, FeatureCache};
use kinomer_core::{ActivityValue, AssayType, Ligand, Measurement, Protein};
use kinomer_datasets::{
    BuildError, CsvActivitySource, DatasetProvider, DedupPolicy, MeasurementSource,
    ProviderConfig, VecSource,
};
use kinomer_featurizers::{
    Featurizer, MorganFingerprintFeaturizer, PdbDirResolver, Pipeline, StructureContactFeaturizer,
};
use kinomer_test_data::TestFile;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fingerprint_pipeline(nbits: usize) -> Arc<Pipeline> {
    Arc::new(
        Pipeline::new(vec![
            Arc::new(MorganFingerprintFeaturizer::new(2, nbits)) as Arc<dyn Featurizer>
        ])
        .unwrap(),
    )
}

fn measurement(protein: &str, smiles: &str, nanomolar: f64) -> Measurement {
    Measurement::new(
        vec![
            Protein::new(protein, "MGSNKSKPKDAS").into(),
            Ligand::from_smiles(smiles).into(),
        ],
        AssayType::IC50,
        ActivityValue::nanomolar(nanomolar),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_excluded_and_reported() {
    init_tracing();
    let good_a = measurement("ABL1", "CC(=O)Oc1ccccc1C(=O)O", 50.0);
    let bad = measurement("ABL1", "C1CC", 70.0); // unclosed ring
    let good_b = measurement("LCK", "c1ccc(O)cc1", 250.0);
    let source = VecSource::new(vec![good_a.clone(), bad.clone(), good_b.clone()]);

    let provider = DatasetProvider::new(
        fingerprint_pipeline(1024),
        Arc::new(FeatureCache::new(CacheConfig::default())),
    );
    let build = provider
        .build(&source, &CancellationToken::new())
        .await
        .unwrap();

    // exactly the failing measurement is excluded, in source order
    assert_eq!(build.dataset.len(), 2);
    assert_eq!(build.dataset.ids()[0], good_a.id());
    assert_eq!(build.dataset.ids()[1], good_b.id());

    // and it is the only entry in the failure report, with its reason
    assert_eq!(build.report.succeeded, 2);
    assert_eq!(build.report.failed.len(), 1);
    let failed = &build.report.failed[0];
    assert_eq!(failed.id, bad.id());
    assert_eq!(failed.stage, 0);
    assert!(failed.reason.contains("morgan_fingerprint"));

    // labels are normalized onto the pIC50 scale
    assert!((build.dataset.labels()[0] - 7.30103).abs() < 1e-5);

    // feature rows stack into a [2, nbits] tensor
    assert_eq!(build.dataset.stacked_features().unwrap().dims(), &[2, 1024]);
}

#[tokio::test]
async fn test_determinism_across_builds() {
    let source = VecSource::new(vec![measurement("ABL1", "CCN(CC)C(=O)c1ccccc1", 10.0)]);
    let provider = DatasetProvider::new(
        fingerprint_pipeline(2048),
        Arc::new(FeatureCache::new(CacheConfig::default())),
    );

    let first = provider
        .build(&source, &CancellationToken::new())
        .await
        .unwrap();
    let second = provider
        .build(&source, &CancellationToken::new())
        .await
        .unwrap();
    let a: Vec<f32> = first.dataset.features()[0].to_vec1().unwrap();
    let b: Vec<f32> = second.dataset.features()[0].to_vec1().unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_strict_mode_escalates() {
    let source = VecSource::new(vec![measurement("ABL1", "C1CC", 70.0)]);
    let provider = DatasetProvider::with_config(
        fingerprint_pipeline(512),
        Arc::new(FeatureCache::new(CacheConfig::default())),
        ProviderConfig {
            strict: true,
            ..Default::default()
        },
    );
    let error = provider
        .build(&source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(error, BuildError::Strict(_)));
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let source = VecSource::new(vec![
        measurement("ABL1", "CCO", 1.0),
        measurement("LCK", "CCN", 2.0),
    ]);
    let cache = Arc::new(FeatureCache::new(CacheConfig::default()));
    let provider = DatasetProvider::new(fingerprint_pipeline(512), Arc::clone(&cache));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let build = provider.build(&source, &cancel).await.unwrap();
    assert!(build.dataset.is_empty());
    assert_eq!(build.report.not_started, 2);
    assert_eq!(cache.metrics().misses, 0);
}

#[tokio::test]
async fn test_dedup_policy_controls_cache_identity() {
    let base = measurement("ABL1", "CCOC(=O)c1ccccc1", 30.0);
    let from_chembl = base.clone().with_metadata("source", "chembl");
    let from_pkis2 = base.clone().with_metadata("source", "pkis2");
    let source = VecSource::new(vec![from_chembl, from_pkis2]);

    // same identity: the second row is a cache hit
    let cache = Arc::new(FeatureCache::new(CacheConfig::default()));
    let provider = DatasetProvider::with_config(
        fingerprint_pipeline(512),
        Arc::clone(&cache),
        ProviderConfig {
            workers: 1,
            ..Default::default()
        },
    );
    let build = provider
        .build(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(build.dataset.len(), 2);
    assert_eq!(cache.metrics().misses, 1);
    assert_eq!(cache.metrics().hits, 1);

    // provenance-aware identity: both rows compute
    let cache = Arc::new(FeatureCache::new(CacheConfig::default()));
    let provider = DatasetProvider::with_config(
        fingerprint_pipeline(512),
        Arc::clone(&cache),
        ProviderConfig {
            workers: 1,
            dedup: DedupPolicy::BySource,
            ..Default::default()
        },
    );
    let source = VecSource::new(vec![
        base.clone().with_metadata("source", "chembl"),
        base.with_metadata("source", "pkis2"),
    ]);
    let build = provider
        .build(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(build.dataset.len(), 2);
    assert_eq!(cache.metrics().misses, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_structure_excluded_but_reported() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("ABL1.pdb"),
        TestFile::structure_01().bytes(),
    )?;

    let pipeline = Arc::new(Pipeline::new(vec![Arc::new(StructureContactFeaturizer::new(
        16,
        12.0,
        Arc::new(PdbDirResolver::new(dir.path())),
    )) as Arc<dyn Featurizer>])?);
    let provider = DatasetProvider::new(
        pipeline,
        Arc::new(FeatureCache::new(CacheConfig::default())),
    );

    let resolved = measurement("ABL1", "CCO", 50.0);
    let unresolved = measurement("ORPHAN", "CCO", 80.0);
    let source = VecSource::new(vec![resolved.clone(), unresolved.clone()]);
    let build = provider.build(&source, &CancellationToken::new()).await?;

    assert_eq!(build.dataset.len(), 1);
    assert_eq!(build.dataset.ids()[0], resolved.id());
    assert_eq!(build.report.failed.len(), 1);
    assert_eq!(build.report.failed[0].id, unresolved.id());
    assert!(build.report.failed[0].reason.contains("ORPHAN"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_csv_source_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let (csv_file, _temp) = TestFile::activity_01().create_temp()?;
    let source = CsvActivitySource::new(&csv_file);
    assert_eq!(source.measurements()?.len(), 4);

    let provider = DatasetProvider::new(
        fingerprint_pipeline(2048),
        Arc::new(FeatureCache::new(CacheConfig::default())),
    );
    let build = provider.build(&source, &CancellationToken::new()).await?;

    // the malformed-SMILES row is excluded, the rest survive
    assert_eq!(build.dataset.len(), 3);
    assert_eq!(build.report.failed.len(), 1);
    assert_eq!(build.report.to_string(), "3 succeeded, 1 failed");

    // percent displacement rows normalize to a fraction
    let labels = build.dataset.labels();
    assert!(labels.iter().any(|&l| (l - 0.85).abs() < 1e-9));
    Ok(())
}
