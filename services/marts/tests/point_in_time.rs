//! Dimension and fact tests over a pipeline-built vault
//!
//! Tests include:
//! - Customer tier change reconstructs two contiguous intervals
//! - Current-state view holds only the open interval
//! - Transaction facts carry the customer state as of the transaction
//! - Facts wait for deferred links and are never rewritten
//! - Every price observation becomes a fact, late ones included

use chrono::{DateTime, TimeZone, Utc};
use marts::dimension::{self, check_intervals};
use marts::fact::FactTable;
use marts::tables::{
    dim_asset, dim_customer, dim_customer_history, fct_asset_prices, fct_news_events,
    fct_transactions, FCT_ASSET_PRICES, FCT_NEWS_EVENTS, FCT_TRANSACTIONS,
};
use raw_vault::feed::MemoryFeed;
use raw_vault::model::customer_key;
use raw_vault::{EngineConfig, LoadMode, Pipeline, RunRequest, Vault};
use rust_decimal::Decimal;
use vault_types::ids::EntityKind;
use vault_types::records::{
    AssetPriceRecord, CompanyRecord, CustomerRecord, NewsRecord, SourceRecord, TransactionRecord,
};
use vault_types::time::open_end;

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, day, 9, 30, 0).unwrap()
}

fn customer(id: &str, tier: &str, day: u32) -> SourceRecord {
    SourceRecord::Customer(CustomerRecord {
        customer_id: Some(id.to_string()),
        first_name: Some("Grace".to_string()),
        customer_tier: Some(tier.to_string()),
        risk_tolerance: Some("medium".to_string()),
        company_id: Some("CO-1".to_string()),
        load_timestamp: Some(ts(day)),
        record_source: Some("crm".to_string()),
        ..Default::default()
    })
}

fn company(name: &str, day: u32) -> SourceRecord {
    SourceRecord::Company(CompanyRecord {
        company_id: Some("CO-1".to_string()),
        company_name: Some(name.to_string()),
        load_timestamp: Some(ts(day)),
        record_source: Some("registry".to_string()),
        ..Default::default()
    })
}

fn price(symbol: &str, asset_type: &str, day: u32, value: i64) -> SourceRecord {
    SourceRecord::Asset(AssetPriceRecord {
        symbol: Some(symbol.to_string()),
        asset_type: Some(asset_type.to_string()),
        price: Some(Decimal::from(value)),
        observed_at: Some(ts(day)),
        load_timestamp: Some(ts(day)),
        record_source: Some("prices".to_string()),
        ..Default::default()
    })
}

fn trade(id: &str, symbol: &str, day: u32) -> SourceRecord {
    SourceRecord::Transaction(TransactionRecord {
        transaction_id: Some(id.to_string()),
        customer_id: Some("C100".to_string()),
        asset_symbol: Some(symbol.to_string()),
        asset_type: Some("stock".to_string()),
        transaction_type: Some("buy".to_string()),
        quantity: Some(Decimal::from(3)),
        transaction_amount: Some(Decimal::new(57_000, 2)),
        transaction_timestamp: Some(ts(day)),
        load_timestamp: Some(ts(day)),
        record_source: Some("tx".to_string()),
        ..Default::default()
    })
}

fn news(url: &str, coin: &str, day: u32) -> SourceRecord {
    SourceRecord::News(NewsRecord {
        url: Some(url.to_string()),
        cryptocurrency: Some(coin.to_string()),
        title: Some("Halving".to_string()),
        published_at: Some(ts(day)),
        load_timestamp: Some(ts(day)),
        record_source: Some("newsapi".to_string()),
        ..Default::default()
    })
}

fn run(feed: &MemoryFeed, vault: &mut Vault) {
    Pipeline::new(feed, EngineConfig::default()).run(vault, &RunRequest::all(LoadMode::Incremental));
}

/// Test 1: Scenario B reconstructs [T1,T2) Gold and [T2,open) Platinum.
#[test]
fn test_tier_change_reconstructs_two_intervals() {
    let mut feed = MemoryFeed::new();
    feed.push(customer("C100", "Gold", 1));
    let mut vault = Vault::new();
    run(&feed, &mut vault);
    feed.push(customer("C100", "Platinum", 2));
    run(&feed, &mut vault);

    let history = dim_customer_history(&vault);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].customer_id, "C100");
    assert_eq!(history[0].customer_tier.as_deref(), Some("Gold"));
    assert_eq!(history[0].effective_from, ts(1));
    assert_eq!(history[0].effective_to, ts(2));
    assert_eq!(history[1].customer_tier.as_deref(), Some("Platinum"));
    assert_eq!(history[1].effective_from, ts(2));
    assert_eq!(history[1].effective_to, open_end());

    let sat = vault.satellite(EntityKind::Customer).unwrap();
    assert!(check_intervals(&dimension::history(sat)).is_ok());

    let current = dim_customer(&vault);
    assert_eq!(current.len(), 1);
    assert!(current[0].is_current);
    assert_eq!(current[0].customer_tier.as_deref(), Some("Platinum"));
}

/// Test 2: Company name resolves through the customer's company id.
#[test]
fn test_customer_dimension_resolves_company() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![customer("C100", "Gold", 1), company("Acme", 1)]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);
    feed.push(company("Acme Holdings", 3));
    run(&feed, &mut vault);

    let current = dim_customer(&vault);
    assert_eq!(current[0].company_id.as_deref(), Some("CO-1"));
    assert_eq!(current[0].company_name.as_deref(), Some("Acme Holdings"));
}

/// Test 3: Transaction facts read the customer tier in force at trade time.
#[test]
fn test_transaction_fact_uses_point_in_time_state() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![
        customer("C100", "Gold", 1),
        price("AAPL", "stock", 1, 190),
        trade("T-1", "aapl", 3),
        customer("C100", "Platinum", 5),
        trade("T-2", "AAPL", 7),
    ]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);

    let mut table = FactTable::new(FCT_TRANSACTIONS);
    let report = fct_transactions(&vault, &mut table);
    assert_eq!(report.emitted, 2);
    assert_eq!(report.pending, 0);

    let facts: Vec<_> = table.rows().collect();
    let t1 = facts.iter().find(|f| f.transaction_id == "T-1").unwrap();
    let t2 = facts.iter().find(|f| f.transaction_id == "T-2").unwrap();
    assert_eq!(t1.customer_tier.as_deref(), Some("Gold"));
    assert_eq!(t2.customer_tier.as_deref(), Some("Platinum"));
    assert_eq!(t1.transaction_type.as_deref(), Some("BUY"));
    assert_eq!(t1.data_date, ts(3).date_naive());
    assert_eq!(t1.customer_key, customer_key(&Some("C100".to_string())).unwrap().hub_key);
    assert_eq!(t1.asset_key, t2.asset_key);
    assert_eq!(t1.transaction_amount, Some(Decimal::new(570, 0)));
}

/// Test 4: A fact waits for its deferred link, then appears once.
#[test]
fn test_fact_pending_until_link_resolves() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![customer("C100", "Gold", 1), trade("T-1", "NVDA", 2)]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);

    let mut table = FactTable::new(FCT_TRANSACTIONS);
    let first = fct_transactions(&vault, &mut table);
    assert_eq!(first.pending, 1);
    assert!(table.is_empty());

    feed.push(price("NVDA", "stock", 3, 480));
    run(&feed, &mut vault);
    let second = fct_transactions(&vault, &mut table);
    assert_eq!(second.emitted, 1);
    assert_eq!(table.len(), 1);

    let third = fct_transactions(&vault, &mut table);
    assert_eq!(third.emitted, 0);
    assert_eq!(third.existing, 1);
}

/// Test 5: Existing fact rows are not rewritten by later vault changes.
#[test]
fn test_existing_facts_are_immutable() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![price("AAPL", "stock", 1, 190), trade("T-1", "AAPL", 4)]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);
    feed.push(customer("C100", "Gold", 5));
    run(&feed, &mut vault);

    let mut table = FactTable::new(FCT_TRANSACTIONS);
    fct_transactions(&vault, &mut table);
    let before = table.clone();
    // the customer existed only after the trade
    assert!(table.rows().all(|f| f.customer_tier.is_none()));

    // a late record now puts the customer in place before the trade
    feed.push(customer("C100", "Silver", 2));
    Pipeline::new(&feed, EngineConfig::default()).run(&mut vault, &RunRequest::all(LoadMode::Full));
    fct_transactions(&vault, &mut table);
    assert_eq!(table, before);
}

/// Test 6: One price fact per observation; the asset dimension follows state changes.
#[test]
fn test_price_facts_and_asset_dimension() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![
        price("BTC", "crypto", 1, 42_000),
        price("BTC", "crypto", 2, 42_000),
        price("BTC", "crypto", 3, 43_500),
        price("ETH", "crypto", 1, 2_300),
    ]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);

    let mut prices = FactTable::new(FCT_ASSET_PRICES);
    let report = fct_asset_prices(&vault, &mut prices);
    assert_eq!(report.emitted, 4);
    // the repeated quote is its own event
    let repeat = prices
        .rows()
        .find(|f| f.symbol == "BTC" && f.observed_at == ts(2))
        .unwrap();
    assert_eq!(repeat.price, Some(Decimal::from(42_000)));
    assert_eq!(repeat.price_date, ts(2).date_naive());
    assert_eq!(vault.satellite(EntityKind::Asset).unwrap().len(), 3);

    let assets = dim_asset(&vault);
    assert_eq!(assets.len(), 2);
    let btc = assets.iter().find(|a| a.symbol == "BTC").unwrap();
    assert_eq!(btc.asset_type, "crypto");
    assert_eq!(btc.last_price, Some(Decimal::from(43_500)));
    assert_eq!(btc.observed_at, ts(3));
}

/// Test 7: News facts link to the crypto asset named by the article.
#[test]
fn test_news_facts_link_to_crypto_asset() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![
        price("BTC", "crypto", 1, 42_000),
        news("https://news.example/btc-halving", "btc", 2),
        news("https://news.example/doge", "DOGE", 2),
    ]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);

    let mut table = FactTable::new(FCT_NEWS_EVENTS);
    let report = fct_news_events(&vault, &mut table);
    assert_eq!(report.emitted, 1);
    assert_eq!(report.pending, 1);
    let fact = table.rows().next().unwrap();
    assert_eq!(fact.url, "https://news.example/btc-halving");
    assert_eq!(fact.record_source, "newsapi");
    assert_eq!(fact.published_at, Some(ts(2)));
}

/// Test 8: A late observation repeating the next state keeps its own price.
#[test]
fn test_late_price_observation_keeps_observed_price() {
    let mut feed = MemoryFeed::new();
    feed.extend(vec![price("BTC", "crypto", 1, 100), price("BTC", "crypto", 10, 200)]);
    let mut vault = Vault::new();
    run(&feed, &mut vault);

    // observed on day 5, delivered on day 11
    let mut late = price("BTC", "crypto", 5, 200);
    if let SourceRecord::Asset(record) = &mut late {
        record.load_timestamp = Some(ts(11));
    }
    feed.push(late);
    run(&feed, &mut vault);

    let sat = vault.satellite(EntityKind::Asset).unwrap();
    assert_eq!(sat.len(), 2);
    assert!(check_intervals(&dimension::history(sat)).is_ok());

    let mut prices = FactTable::new(FCT_ASSET_PRICES);
    assert_eq!(fct_asset_prices(&vault, &mut prices).emitted, 3);
    let day5 = prices.rows().find(|f| f.observed_at == ts(5)).unwrap();
    assert_eq!(day5.price, Some(Decimal::from(200)));
}
