//! Integration tests for snowdrift

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use snowdrift::config::Config;
use snowdrift::error::TableError;
use snowdrift::pipeline::{Step, SyncStats, run_with_context};
use snowdrift::queue::{MemoryQueue, PendingWriteQueue};
use snowdrift::record::{MetaRecord, RecordKey, TargetRecord};
use snowdrift::schema::PseudoSchema;
use snowdrift::source::{MemorySource, SourceDocument};
use snowdrift::table::{MemoryTable, TargetTable};
use snowdrift::value::{Fields, Value};
use snowdrift::SyncContext;

fn fields(json: serde_json::Value) -> Fields {
    match Value::from(json) {
        Value::Map(fields) => fields,
        other => panic!("expected an object, got {}", other.kind()),
    }
}

fn order(i: usize) -> SourceDocument {
    SourceDocument::new(
        format!("doc-o{i}"),
        fields(serde_json::json!({
            "ordersId": format!("o-{i}"),
            "updatedAt": format!("2024-01-{:02}T00:00:00Z", i + 1),
            "total": i as i64 * 10,
            "shipping": {"city": "Oslo", "zip": "0150"},
        })),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

fn customer(i: usize) -> SourceDocument {
    SourceDocument::new(
        format!("c-{i}"),
        fields(serde_json::json!({"name": format!("customer {i}"), "vip": i % 2 == 0})),
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
    )
}

fn source() -> MemorySource {
    MemorySource::new()
        .with_collection("orders", (0..12).map(order))
        .with_collection("customers", (0..3).map(customer))
}

fn config() -> Config {
    let mut config = Config::for_source("memory://");
    config.orchestrator.drain_interval_ms = 5;
    config.writer.concurrency = 3;
    config
}

async fn sync(
    source: Arc<MemorySource>,
    table: Arc<dyn TargetTable>,
    queue: Arc<MemoryQueue>,
) -> SyncStats {
    let context = SyncContext::new(source, table, queue);
    run_with_context(context, &config(), Step::Prime, CancellationToken::new())
        .await
        .unwrap()
}

mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_two_collections_end_to_end() {
        let table = Arc::new(MemoryTable::new());
        let queue = Arc::new(MemoryQueue::new(3));
        let stats = sync(Arc::new(source()), table.clone(), queue.clone()).await;

        assert!(!stats.run.cancelled);
        assert_eq!(stats.run.documents_read, 15);
        // customers: one page of 3; orders: 5 + 5 + 2.
        assert_eq!(stats.run.batches_enqueued, 4);
        assert_eq!(stats.writers.batches_applied, 4);
        assert_eq!(queue.approximate_depth().await.unwrap(), 0);
        assert_eq!(table.len().await, 15);

        let stored = table
            .get(&RecordKey::new("o-3", "2024-01-04T00:00:00Z"))
            .await
            .unwrap()
            .expect("order keyed by its natural id and updatedAt");
        assert_eq!(stored.source_id, "doc-o3");
        assert!(!stored.fields.contains_key("ordersId"));
        assert_eq!(stored.fields["total"], Value::Int(30));

        let customer = table.find_by_source_id("c-1").await.unwrap();
        assert_eq!(customer.len(), 1);
        assert_eq!(customer[0].pk, "c-1");
        assert_eq!(customer[0].sk, "2024-02-01T00:00:00.000Z");

        let meta = table.meta().await.unwrap();
        assert_eq!(
            meta.facets,
            BTreeSet::from(["customers".to_string(), "orders".to_string()])
        );
        assert_eq!(meta.facet_item_attribute_name, "__facet");

        let orders = &meta.pseudo_schema["orders"];
        assert_eq!(orders.root_read_type.name, "Order");
        assert_eq!(orders.root_input_type.name, "OrderInput");
        assert_eq!(orders.auxiliary_type_pairs.len(), 1);
        assert_eq!(
            orders.auxiliary_type_pairs[0].read_type.name,
            "OrderShipping"
        );
        let sdl = orders.to_sdl();
        assert!(sdl.contains("type Order {"));
        assert!(sdl.contains("total: Int!"));
        assert!(sdl.contains("shipping: OrderShipping!"));

        let customers = &meta.pseudo_schema["customers"];
        assert_eq!(customers.root_read_type.name, "Customer");
        assert!(customers.to_sdl().contains("vip: Boolean!"));

        let report = stats.run.introspection.unwrap();
        assert_eq!(report.persisted, vec!["customers", "orders"]);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let source = Arc::new(source());
        let table = Arc::new(MemoryTable::new());

        sync(source.clone(), table.clone(), Arc::new(MemoryQueue::new(3))).await;
        let first = table.snapshot().await;
        sync(source, table.clone(), Arc::new(MemoryQueue::new(3))).await;
        let second = table.snapshot().await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_merges_into_existing_record() {
        let source = Arc::new(source());
        let table = Arc::new(MemoryTable::new());
        sync(source.clone(), table.clone(), Arc::new(MemoryQueue::new(3))).await;

        // The document lost its natural key fields and changed one value.
        source
            .insert(
                "orders",
                SourceDocument::new(
                    "doc-o3",
                    fields(serde_json::json!({"ordersId": "o-3", "total": 31})),
                    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                ),
            )
            .await;
        sync(source, table.clone(), Arc::new(MemoryQueue::new(3))).await;

        assert_eq!(table.len().await, 15);
        let stored = table.find_by_source_id("doc-o3").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].pk, "o-3");
        assert_eq!(stored[0].fields["total"], Value::Int(31));
        assert!(stored[0].fields.contains_key("shipping"));
    }

    #[tokio::test]
    async fn test_facet_registry_only_grows() {
        let table = Arc::new(MemoryTable::new());
        sync(
            Arc::new(MemorySource::new().with_collection("orders", (0..2).map(order))),
            table.clone(),
            Arc::new(MemoryQueue::new(3)),
        )
        .await;
        sync(
            Arc::new(MemorySource::new().with_collection("customers", (0..2).map(customer))),
            table.clone(),
            Arc::new(MemoryQueue::new(3)),
        )
        .await;

        let meta = table.meta().await.unwrap();
        assert_eq!(meta.facets.len(), 2);
        assert!(meta.pseudo_schema.contains_key("orders"));
        assert!(meta.pseudo_schema.contains_key("customers"));
    }

    fn product(i: usize) -> SourceDocument {
        SourceDocument::new(
            format!("p-{i}"),
            fields(serde_json::json!({"sku": format!("sku-{i}"), "price": 9.5})),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        )
    }

    fn run_source(facets: &[&str]) -> MemorySource {
        facets.iter().fold(MemorySource::new(), |source, facet| match *facet {
            "orders" => source.with_collection("orders", (0..2).map(order)),
            "customers" => source.with_collection("customers", (0..2).map(customer)),
            "products" => source.with_collection("products", (0..2).map(product)),
            other => panic!("unknown facet {other}"),
        })
    }

    #[tokio::test]
    async fn test_facet_registry_union_in_any_order() {
        let runs: [&[&str]; 3] = [&["orders"], &["customers"], &["orders", "products"]];
        let permutations = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        let expected: BTreeSet<String> = ["customers", "orders", "products"]
            .into_iter()
            .map(String::from)
            .collect();

        for order_of_runs in permutations {
            let table = Arc::new(MemoryTable::new());
            let mut previous = BTreeSet::new();
            for run in order_of_runs {
                sync(
                    Arc::new(run_source(runs[run])),
                    table.clone(),
                    Arc::new(MemoryQueue::new(3)),
                )
                .await;
                let facets = table.meta().await.unwrap().facets;
                assert!(facets.is_superset(&previous), "registry shrank in {order_of_runs:?}");
                previous = facets;
            }
            assert_eq!(previous, expected, "runs in order {order_of_runs:?}");
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let table = Arc::new(MemoryTable::new());
        let context = SyncContext::new(
            Arc::new(source()),
            table.clone(),
            Arc::new(MemoryQueue::new(3)),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let stats = run_with_context(context, &config(), Step::Prime, shutdown)
            .await
            .unwrap();

        assert!(stats.run.cancelled);
        assert!(table.is_empty().await);
    }
}

mod failure_tests {
    use super::*;

    /// Rejects every write for one facet.
    struct PoisonedTable {
        inner: MemoryTable,
        poisoned: &'static str,
    }

    #[async_trait]
    impl TargetTable for PoisonedTable {
        async fn find_by_source_id(&self, id: &str) -> Result<Vec<TargetRecord>, TableError> {
            self.inner.find_by_source_id(id).await
        }
        async fn get(&self, key: &RecordKey) -> Result<Option<TargetRecord>, TableError> {
            self.inner.get(key).await
        }
        async fn put_batch(&self, records: Vec<TargetRecord>) -> Result<(), TableError> {
            if records.iter().any(|r| r.facet == self.poisoned) {
                return Err(TableError::TableUnavailable {
                    message: "provisioned throughput exceeded".to_string(),
                });
            }
            self.inner.put_batch(records).await
        }
        async fn query_facet(&self, facet: &str, limit: usize) -> Result<Vec<TargetRecord>, TableError> {
            self.inner.query_facet(facet, limit).await
        }
        async fn meta(&self) -> Result<MetaRecord, TableError> {
            self.inner.meta().await
        }
        async fn add_facets(&self, facets: &BTreeSet<String>) -> Result<(), TableError> {
            self.inner.add_facets(facets).await
        }
        async fn put_pseudo_schema(&self, facet: &str, schema: PseudoSchema) -> Result<(), TableError> {
            self.inner.put_pseudo_schema(facet, schema).await
        }
    }

    #[tokio::test]
    async fn test_failing_batch_is_dead_lettered_and_run_finishes() {
        let table = Arc::new(PoisonedTable {
            inner: MemoryTable::new(),
            poisoned: "customers",
        });
        let queue = Arc::new(MemoryQueue::new(3));

        let stats = sync(Arc::new(source()), table.clone(), queue.clone()).await;

        assert!(!stats.run.cancelled);
        assert_eq!(stats.writers.nacks, 3);
        assert_eq!(table.inner.len().await, 12);

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].receive_count, 3);
        assert!(dead[0].error.contains("throughput"));

        let meta = table.meta().await.unwrap();
        assert_eq!(meta.facets, BTreeSet::from(["orders".to_string()]));
    }
}

mod object_store_tests {
    use super::*;
    use snowdrift::run_sync;
    use snowdrift::table::SNAPSHOT_FILE;
    use tempfile::TempDir;

    fn write_doc(root: &std::path::Path, collection: &str, id: &str, json: serde_json::Value) {
        let dir = root.join(collection);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{id}.json")), json.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_run_sync_from_yaml_config() {
        let source_dir = TempDir::new().unwrap();
        let table_dir = TempDir::new().unwrap();
        let dlq_dir = TempDir::new().unwrap();

        for i in 0..7 {
            write_doc(
                source_dir.path(),
                "orders",
                &format!("o{i}"),
                serde_json::json!({"ordersId": format!("o-{i}"), "total": 1.5}),
            );
        }
        write_doc(
            source_dir.path(),
            "customers",
            "c1",
            serde_json::json!({"name": "Ada", "tags": ["a", "b"]}),
        );

        let yaml = format!(
            r#"
source:
  url: "{}"
target:
  snapshot_url: "{}"
queue:
  dlq_path: "{}"
orchestrator:
  page_size: 3
  drain_interval_ms: 5
metrics:
  enabled: false
"#,
            source_dir.path().display(),
            table_dir.path().display(),
            dlq_dir.path().display(),
        );
        let config = Config::from_yaml(&yaml).unwrap();

        let stats = run_sync(config.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.run.documents_read, 8);
        assert_eq!(stats.failures.total(), 0);
        assert!(table_dir.path().join(SNAPSHOT_FILE).exists());

        // A second run starts from the saved snapshot and changes nothing.
        let snapshot_before = std::fs::read(table_dir.path().join(SNAPSHOT_FILE)).unwrap();
        let stats = run_sync(config, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.writers.records_written, 8);
        let snapshot_after = std::fs::read(table_dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert_eq!(snapshot_before, snapshot_after);

        let snapshot: serde_json::Value = serde_json::from_slice(&snapshot_after).unwrap();
        let schemas = &snapshot["meta"]["pseudoSchema"];
        assert_eq!(schemas["orders"]["rootReadType"]["name"], "Order");
        assert_eq!(schemas["customers"]["rootReadType"]["name"], "Customer");
    }
}
