use bson::{DateTime, doc, oid::ObjectId};
use docscope::{Contract, ContractEnum, memory::MemoryStore, prelude::*};
use serde_json::json;

#[derive(ContractEnum)]
#[contract(rename_all = "lowercase")]
#[allow(dead_code)]
enum Status {
    Open,
    Shipped,
    #[contract(rename = "cancelled-by-user")]
    Cancelled,
}

#[derive(Contract)]
#[contract(name = "Order")]
#[allow(dead_code)]
struct Order {
    #[contract(kind = "identifier", readonly)]
    id: String,
    /// Free-form note from the customer.
    note: Option<String>,
    #[contract(exclusive_min = 0, example = 12.5)]
    total: f64,
    #[contract(enumeration)]
    status: Status,
    #[contract(min_items = 1)]
    tags: Vec<String>,
    placed_at: DateTime,
    owner: Option<ObjectId>,
    #[contract(skip)]
    internal: u8,
}

fn order_registry() -> SchemaRegistry {
    SchemaRegistry::new().with_schema(
        "Order",
        json!({
            "type": "object",
            "required": ["total"],
            "properties": {
                "total": { "type": "number", "minimum": 0 },
                "coupon": { "type": "string" },
            },
        }),
    )
}

async fn sampled_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert(
            "orders",
            [
                doc! { "total": 10, "status": "open" },
                doc! { "total": 12.5, "status": "shipped", "coupon": "SPRING" },
            ],
        )
        .await;
    store
}

#[test]
fn derived_optional_string_is_a_nullable_string() {
    let report = ContractModel::of::<Order>().to_report().unwrap();
    let note = report.field("note").unwrap();

    assert_eq!(note.field_type, FieldType::String);
    assert!(note.nullable);
}

#[test]
fn derived_contract_maps_types_and_attributes() {
    let model = ContractModel::of::<Order>();
    assert_eq!(model.name, "Order");
    assert!(model.field("internal").is_none());
    assert_eq!(
        model.field("note").unwrap().description.as_deref(),
        Some("Free-form note from the customer.")
    );

    let report = model.to_report().unwrap();
    assert_eq!(report.source, SchemaSource::Contract);
    assert_eq!(
        report.fields.keys().map(String::as_str).collect::<Vec<_>>(),
        ["id", "note", "total", "status", "tags", "placed_at", "owner"]
    );

    let id = report.field("id").unwrap();
    assert_eq!(id.field_type, FieldType::Identifier);
    assert_eq!(id.readonly, Some(true));

    let total = report.field("total").unwrap();
    assert_eq!(total.field_type, FieldType::Float);
    assert_eq!(total.example, json!(12.5));
    assert_eq!(
        total.constraints.as_ref().and_then(|c| c.exclusive_minimum),
        Some(0.0)
    );

    let status = report.field("status").unwrap();
    assert_eq!(status.field_type, FieldType::String);
    assert_eq!(
        status.enum_values,
        Some(vec![json!("open"), json!("shipped"), json!("cancelled-by-user")])
    );
    assert_eq!(status.example, json!("open"));

    assert_eq!(report.field("tags").unwrap().field_type, FieldType::List);
    assert_eq!(report.field("placed_at").unwrap().field_type, FieldType::Datetime);

    let owner = report.field("owner").unwrap();
    assert_eq!(owner.field_type, FieldType::Identifier);
    assert!(owner.nullable);
}

#[tokio::test]
async fn contract_wins_over_registry_and_sampling() {
    let config = BrowseConfig {
        allow_sampling: true,
        ..Default::default()
    };
    let browser = CollectionBrowser::with_config(sampled_store().await, config).unwrap();
    let model = ContractModel::of::<Order>();
    let registry = order_registry();

    let report = browser
        .infer_schema(
            "orders",
            InferRequest {
                contract: Some(&model),
                registry: Some(&registry),
                schema_name: None,
            },
            &CallContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.source, SchemaSource::Contract);
    assert!(report.field("coupon").is_none());
}

#[tokio::test]
async fn registry_is_matched_by_singular_name() {
    let browser = CollectionBrowser::new(sampled_store().await);
    let registry = order_registry();

    let report = browser
        .infer_schema(
            "orders",
            InferRequest {
                registry: Some(&registry),
                ..Default::default()
            },
            &CallContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.source, SchemaSource::Registry);
    assert!(!report.field("total").unwrap().nullable);
    assert!(report.field("coupon").unwrap().nullable);
}

#[tokio::test]
async fn malformed_contract_falls_through_to_sampling() {
    let config = BrowseConfig {
        allow_sampling: true,
        ..Default::default()
    };
    let browser = CollectionBrowser::with_config(sampled_store().await, config).unwrap();
    let broken = ContractModel::builder("orders")
        .field(ContractField::new("total", DeclaredType::RealNumber).min(10.0).max(1.0))
        .build();

    let report = browser
        .infer_schema(
            "orders",
            InferRequest {
                contract: Some(&broken),
                ..Default::default()
            },
            &CallContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.source, SchemaSource::Sampling);
    assert_eq!(report.sample_count, 2);
    assert_eq!(report.field("total").unwrap().field_type, FieldType::Integer);
    assert!(report.field("coupon").unwrap().nullable);
}

#[tokio::test]
async fn sampling_is_off_unless_allowed() {
    let browser = CollectionBrowser::new(sampled_store().await);

    let report = browser
        .infer_schema("orders", InferRequest::default(), &CallContext::new())
        .await
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(report.source, SchemaSource::None);
}
