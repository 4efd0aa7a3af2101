use bigdecimal::BigDecimal;
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;

use jewel_quote::db::quotations::{DIAMOND_ITEMS, METAL_SUMMARY};
use jewel_quote::db::{
    DocumentStore, MemoryBlobStore, MemoryDocumentStore, PriceRepository, QuotationRepository, StorageMode,
};
use jewel_quote::models::{
    round2, DiamondInput, DiamondItem, DiamondVariant, Identification, MetalItem, MetalPriceTable, MetalSummaryRow,
    Millimeters, Quotation, Summary,
};
use jewel_quote::service::{PriceEngine, ALL_QUOTATIONS};

mod common;
use common::QuotationListingDown;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

struct Fixture {
    store: Arc<MemoryDocumentStore>,
    repo: QuotationRepository,
    prices: PriceRepository,
    engine: PriceEngine,
}

fn fixture(inline_limit_bytes: usize) -> Fixture {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = QuotationRepository::new(store.clone(), Arc::new(MemoryBlobStore::new()), inline_limit_bytes);
    let prices = PriceRepository::new(store.clone());
    let engine = PriceEngine::new(repo.clone(), prices.clone());
    Fixture {
        store,
        repo,
        prices,
        engine,
    }
}

fn diamond(shape: &str, mm: Millimeters, ct: &str, price: &str) -> DiamondItem {
    let total_weight_ct = dec(ct);
    let price_per_ct = dec(price);
    DiamondItem {
        shape: shape.into(),
        mm,
        pcs: dec("1"),
        weight_per_piece: total_weight_ct.clone(),
        total: round2(&(&total_weight_ct * &price_per_ct)),
        total_weight_ct,
        price_per_ct,
    }
}

fn metal(purity: &str, grams: &str, rate: &str) -> MetalItem {
    let grams = dec(grams);
    let rate_per_gram = dec(rate);
    let total_metal = round2(&(&grams * &rate_per_gram));
    let making_charges = dec("900.00");
    MetalItem {
        purity: purity.into(),
        total: round2(&(&total_metal + &making_charges)),
        grams,
        rate_per_gram,
        total_metal,
        making_charges,
    }
}

fn summary_row(item: &MetalItem, diamond_amount: &BigDecimal) -> MetalSummaryRow {
    MetalSummaryRow {
        purity: item.purity.clone(),
        grams: item.grams.clone(),
        rate_per_gram: item.rate_per_gram.clone(),
        total_metal: item.total_metal.clone(),
        making_charges: item.making_charges.clone(),
        total_diamond_amount: diamond_amount.clone(),
        total: round2(&(&item.total_metal + &item.making_charges + diamond_amount)),
        updated_at: None,
    }
}

fn quotation(id: &str, metals: Vec<MetalItem>, diamonds: Vec<DiamondItem>) -> Quotation {
    let amount = jewel_quote::models::diamond_total(&diamonds);
    let rows = metals.iter().map(|m| summary_row(m, &amount)).collect();
    Quotation {
        quotation_id: id.to_string(),
        identification: Identification {
            id_sku: format!("SKU-{}", id),
            category: "Ring".into(),
            images: Vec::new(),
        },
        metal_items: metals,
        diamond_items: diamonds,
        summary: Summary {
            id_sku: None,
            category: None,
            total_diamond_amount: amount,
            metal_summary: rows,
        },
        quotation_date: Utc::now(),
    }
}

fn round_six(price: &str) -> DiamondVariant {
    DiamondVariant::new(
        1,
        DiamondInput {
            shape: "ROUND".into(),
            mm: Millimeters::Number(6.0),
            price_per_carat: dec(price),
        },
    )
}

fn assert_invariants(q: &Quotation) {
    let sum = round2(&q.diamond_items.iter().fold(BigDecimal::from(0), |acc, d| acc + &d.total));
    assert_eq!(q.summary.total_diamond_amount, sum, "{} diamond sum", q.quotation_id);
    for row in &q.summary.metal_summary {
        assert_eq!(row.total_diamond_amount, sum);
        assert_eq!(
            row.total,
            round2(&(&row.total_metal + &row.making_charges + &row.total_diamond_amount)),
            "{} row total",
            q.quotation_id
        );
    }
}

#[tokio::test]
async fn round_six_price_change_updates_totals() {
    let f = fixture(1_000_000);
    let q = quotation(
        "Q-00001",
        vec![metal("18KT", "3", "5000")],
        vec![
            diamond("ROUND", Millimeters::Text("6.00".into()), "2.0", "4000"),
            diamond("OVAL", Millimeters::Text("6x4".into()), "1.0", "1000"),
        ],
    );
    assert_eq!(q.summary.total_diamond_amount.to_string(), "9000.00");
    f.repo.save(&q).await.unwrap();

    let report = f.engine.on_diamond_price_changed(&round_six("5000")).await;
    assert_eq!(report.updated_quotations, vec!["Q-00001"]);
    assert_eq!(report.touched_items, 1);
    assert!(report.failed.is_empty());

    let stored = f.repo.get("Q-00001").await.unwrap().unwrap();
    assert_eq!(stored.diamond_items[0].price_per_ct.to_string(), "5000.00");
    assert_eq!(stored.diamond_items[0].total.to_string(), "10000.00");
    assert_eq!(stored.diamond_items[1], q.diamond_items[1]);
    assert_eq!(stored.summary.total_diamond_amount.to_string(), "11000.00");
    assert_invariants(&stored);

    // 头文档镜像同步
    let header = f.repo.header("Q-00001").await.unwrap().unwrap();
    assert_eq!(header.summary.total_diamond_amount.to_string(), "11000.00");
    assert_eq!(header.summary.metal_summary, stored.summary.metal_summary);
}

#[tokio::test]
async fn diamond_propagation_is_idempotent() {
    let f = fixture(1_000_000);
    f.repo
        .save(&quotation(
            "Q-00001",
            vec![metal("18KT", "3", "5000")],
            vec![diamond("ROUND", Millimeters::Number(6.0), "2.0", "4000")],
        ))
        .await
        .unwrap();

    f.engine.on_diamond_price_changed(&round_six("5000")).await;
    let after_first = f.repo.get("Q-00001").await.unwrap().unwrap();

    let report = f.engine.on_diamond_price_changed(&round_six("5000")).await;
    assert!(report.updated_quotations.is_empty());
    assert_eq!(report.touched_items, 0);
    assert_eq!(f.repo.get("Q-00001").await.unwrap().unwrap(), after_first);
}

#[tokio::test]
async fn other_shapes_and_sizes_are_never_touched() {
    let f = fixture(1_000_000);
    let q = quotation(
        "Q-00001",
        vec![metal("18KT", "3", "5000")],
        vec![
            diamond("OTHER", Millimeters::Number(6.0), "1.0", "4000"),
            diamond("ROUND", Millimeters::Text("other".into()), "1.0", "4000"),
            diamond("ROUND", Millimeters::Text("6.5".into()), "1.0", "4000"),
        ],
    );
    f.repo.save(&q).await.unwrap();

    let report = f.engine.on_diamond_price_changed(&round_six("9999")).await;
    assert!(report.updated_quotations.is_empty());

    let lines = f.repo.lines::<DiamondItem>("Q-00001", DIAMOND_ITEMS).await.unwrap();
    let items: Vec<DiamondItem> = lines.into_iter().map(|l| l.item).collect();
    assert_eq!(items, q.diamond_items);
    let rows = f.repo.lines::<MetalSummaryRow>("Q-00001", METAL_SUMMARY).await.unwrap();
    assert!(rows.iter().all(|r| r.item.updated_at.is_none()));
}

#[tokio::test]
async fn missing_purity_fails_only_that_quotation() {
    let f = fixture(1_000_000);
    let plain = quotation("Q-00001", vec![metal("18KT", "3", "5000")], Vec::new());
    let palladium = quotation(
        "Q-00002",
        vec![metal("18KT", "2", "5000"), metal("Palladium", "1", "2500")],
        Vec::new(),
    );
    f.repo.save(&plain).await.unwrap();
    f.repo.save(&palladium).await.unwrap();

    let table: MetalPriceTable = [("18KT".to_string(), dec("5200"))].into_iter().collect();
    let report = f.engine.on_metal_price_table_changed(&table).await.unwrap();

    assert_eq!(report.updated_quotations, vec!["Q-00001"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].quotation_id, "Q-00002");
    assert!(report.failed[0].error.contains("Palladium"));

    let updated = f.repo.get("Q-00001").await.unwrap().unwrap();
    assert_eq!(updated.metal_items[0].rate_per_gram.to_string(), "5200.00");
    assert_eq!(updated.metal_items[0].total_metal.to_string(), "15600.00");
    assert_invariants(&updated);
    assert!(updated.summary.metal_summary[0].updated_at.is_some());

    let untouched = f.repo.get("Q-00002").await.unwrap().unwrap();
    assert_eq!(untouched.metal_items, palladium.metal_items);
    assert_eq!(untouched.summary.metal_summary, palladium.summary.metal_summary);

    // 价格表本身已整表替换
    assert_eq!(f.prices.current().await.unwrap().unwrap(), table);
}

#[tokio::test]
async fn unrelated_table_skips_quotations() {
    let f = fixture(1_000_000);
    let q = quotation("Q-00001", vec![metal("18KT", "3", "5000")], Vec::new());
    f.repo.save(&q).await.unwrap();

    let table: MetalPriceTable = [("Platinum".to_string(), dec("3000"))].into_iter().collect();
    let report = f.engine.on_metal_price_table_changed(&table).await.unwrap();
    assert!(report.updated_quotations.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(f.repo.get("Q-00001").await.unwrap().unwrap().metal_items, q.metal_items);
}

#[tokio::test]
async fn blob_quotations_follow_the_same_rules() {
    let f = fixture(256);
    let q = quotation(
        "Q-00001",
        vec![metal("18KT", "3", "5000")],
        vec![diamond("round", Millimeters::Text("6".into()), "2.0", "4000")],
    );
    assert_eq!(f.repo.save(&q).await.unwrap(), StorageMode::Blob);

    let report = f.engine.on_diamond_price_changed(&round_six("5000")).await;
    assert!(report.updated_quotations.is_empty());
    assert_eq!(report.updated_blob_quotations, vec!["Q-00001"]);

    let stored = f.repo.get("Q-00001").await.unwrap().unwrap();
    assert_eq!(stored.diamond_items[0].total.to_string(), "10000.00");
    assert_invariants(&stored);
    let header = f.repo.header("Q-00001").await.unwrap().unwrap();
    assert_eq!(header.summary.total_diamond_amount.to_string(), "10000.00");

    // 没有任何相关成色: 跳过
    let table: MetalPriceTable = [("14KT".to_string(), dec("4000")), ("Silver".to_string(), dec("80"))]
        .into_iter()
        .collect();
    let report = f.engine.on_metal_price_table_changed(&table).await.unwrap();
    assert!(report.failed.is_empty(), "no relevant purity means skip, not failure");

    let table: MetalPriceTable = [("14KT".to_string(), dec("4000")), ("18KT".to_string(), dec("5100"))]
        .into_iter()
        .collect();
    let report = f.engine.on_metal_price_table_changed(&table).await.unwrap();
    assert_eq!(report.updated_blob_quotations, vec!["Q-00001"]);
    let stored = f.repo.get("Q-00001").await.unwrap().unwrap();
    assert_eq!(stored.metal_items[0].total_metal.to_string(), "15300.00");
    assert_invariants(&stored);
}

#[tokio::test]
async fn blob_header_without_path_is_skipped() {
    let f = fixture(1_000_000);
    f.store
        .put(
            "quotations",
            "Q-00009",
            serde_json::json!({"quotationId": "Q-00009", "storedInCloudStorage": true}),
        )
        .await
        .unwrap();

    let report = f.engine.on_diamond_price_changed(&round_six("5000")).await;
    assert!(report.updated_blob_quotations.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn blob_quotation_with_missing_purity_is_left_untouched() {
    let f = fixture(256);
    let q = quotation(
        "Q-00001",
        vec![metal("18KT", "2", "5000"), metal("Palladium", "1", "2500")],
        vec![diamond("ROUND", Millimeters::Number(6.0), "1.0", "4000")],
    );
    assert_eq!(f.repo.save(&q).await.unwrap(), StorageMode::Blob);

    let table: MetalPriceTable = [("18KT".to_string(), dec("5200"))].into_iter().collect();
    let report = f.engine.on_metal_price_table_changed(&table).await.unwrap();

    assert!(report.updated_blob_quotations.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].quotation_id, "Q-00001");
    assert!(report.failed[0].error.contains("Palladium"));

    let stored = f.repo.get("Q-00001").await.unwrap().unwrap();
    assert_eq!(stored.metal_items, q.metal_items);
    assert_eq!(stored.summary.metal_summary, q.summary.metal_summary);
}

#[tokio::test]
async fn one_broken_quotation_does_not_stop_the_others() {
    let f = fixture(1_000_000);
    f.repo
        .save(&quotation(
            "Q-00001",
            vec![metal("18KT", "3", "5000")],
            vec![diamond("ROUND", Millimeters::Number(6.0), "2.0", "4000")],
        ))
        .await
        .unwrap();
    // 头文档指向一个不存在的对象
    f.store
        .put(
            "quotations",
            "Q-00002",
            serde_json::json!({
                "quotationId": "Q-00002",
                "storedInCloudStorage": true,
                "storagePath": "quotations/Q-00002.json"
            }),
        )
        .await
        .unwrap();

    let report = f.engine.on_diamond_price_changed(&round_six("5000")).await;
    assert_eq!(report.updated_quotations, vec!["Q-00001"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].quotation_id, "Q-00002");

    let table: MetalPriceTable = [("18KT".to_string(), dec("5100"))].into_iter().collect();
    let report = f.engine.on_metal_price_table_changed(&table).await.unwrap();
    assert_eq!(report.updated_quotations, vec!["Q-00001"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].quotation_id, "Q-00002");

    let stored = f.repo.get("Q-00001").await.unwrap().unwrap();
    assert_eq!(stored.summary.total_diamond_amount.to_string(), "10000.00");
    assert_eq!(stored.metal_items[0].total_metal.to_string(), "15300.00");
    assert_invariants(&stored);
}

#[tokio::test]
async fn listing_failure_is_reported_not_raised() {
    let store = Arc::new(QuotationListingDown(MemoryDocumentStore::new()));
    let repo = QuotationRepository::new(store.clone(), Arc::new(MemoryBlobStore::new()), 1_000_000);
    let prices = PriceRepository::new(store.clone());
    let engine = PriceEngine::new(repo, prices.clone());

    let report = engine.on_diamond_price_changed(&round_six("5000")).await;
    assert!(report.updated_quotations.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.quotation_id == ALL_QUOTATIONS));

    // 价格表照常替换
    let table: MetalPriceTable = [("18KT".to_string(), dec("5100"))].into_iter().collect();
    let report = engine.on_metal_price_table_changed(&table).await.unwrap();
    assert_eq!(report.failed.len(), 2);
    assert_eq!(prices.current().await.unwrap().unwrap(), table);
}
