use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use bookd::config::EngineConfig;
use bookd::tenant::TenantManager;
use bookd::wire;

const H: i64 = 3_600_000;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("bookd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, EngineConfig::default()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "bookd".to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, db: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(db)
        .user("bookd")
        .password("bookd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn register_service(client: &Client, minutes: u32) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO services (id, name, duration_minutes, price_cents) VALUES ('{id}', 'Cut', {minutes}, 2500)"
        ))
        .await
        .unwrap();
    id
}

fn book_sql(id: Ulid, resource: Ulid, service: Ulid, start: i64) -> String {
    format!(
        "INSERT INTO appointments (id, resource_id, service_id, customer_id, start) \
         VALUES ('{id}', '{resource}', '{service}', '{}', {start})",
        Ulid::new()
    )
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(SqlState::code)
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_and_read_back() {
    let addr = start_test_server().await;
    let client = connect(addr, "salon").await;
    let service = register_service(&client, 30).await;
    let resource = Ulid::new();
    let id = Ulid::new();

    client.batch_execute(&book_sql(id, resource, service, 10 * H)).await.unwrap();

    let got = rows(&client, &format!("SELECT * FROM appointments WHERE id = '{id}'")).await;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].get("id"), Some(id.to_string().as_str()));
    assert_eq!(got[0].get("start"), Some((10 * H).to_string().as_str()));
    assert_eq!(got[0].get("end"), Some((10 * H + 30 * 60_000).to_string().as_str()));
    assert_eq!(got[0].get("status"), Some("scheduled"));

    let services = rows(&client, "SELECT * FROM services").await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].get("duration_minutes"), Some("30"));
}

#[tokio::test]
async fn conflicting_booking_reports_exclusion_violation() {
    let addr = start_test_server().await;
    let client = connect(addr, "salon").await;
    let service = register_service(&client, 30).await;
    let resource = Ulid::new();

    client
        .batch_execute(&book_sql(Ulid::new(), resource, service, 10 * H))
        .await
        .unwrap();
    let err = client
        .batch_execute(&book_sql(Ulid::new(), resource, service, 10 * H + 15 * 60_000))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("23P01"));

    // Adjacent is fine.
    client
        .batch_execute(&book_sql(Ulid::new(), resource, service, 10 * H + 30 * 60_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn lifecycle_over_the_wire() {
    let addr = start_test_server().await;
    let client = connect(addr, "salon").await;
    let service = register_service(&client, 60).await;
    let resource = Ulid::new();
    let id = Ulid::new();
    client.batch_execute(&book_sql(id, resource, service, 9 * H)).await.unwrap();

    let err = client
        .batch_execute(&format!("UPDATE appointments SET status = 'completed' WHERE id = '{id}'"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("55000"));

    client
        .batch_execute(&format!("UPDATE appointments SET start = {} WHERE id = '{id}'", 13 * H))
        .await
        .unwrap();
    client
        .batch_execute(&format!("UPDATE appointments SET status = 'confirmed' WHERE id = '{id}'"))
        .await
        .unwrap();
    client
        .batch_execute(&format!("DELETE FROM appointments WHERE id = '{id}'"))
        .await
        .unwrap();

    let got = rows(
        &client,
        &format!(
            "SELECT * FROM appointments WHERE resource_id = '{resource}' AND start >= 0 AND \"end\" <= {}",
            24 * H
        ),
    )
    .await;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].get("start"), Some((13 * H).to_string().as_str()));
    assert_eq!(got[0].get("status"), Some("cancelled"));

    let active = rows(
        &client,
        &format!(
            "SELECT * FROM appointments WHERE resource_id = '{resource}' AND start >= 0 AND \"end\" <= {} AND status = 'scheduled'",
            24 * H
        ),
    )
    .await;
    assert!(active.is_empty());
}

#[tokio::test]
async fn availability_and_conflict_tables() {
    let addr = start_test_server().await;
    let client = connect(addr, "salon").await;
    let service = register_service(&client, 60).await;
    let resource = Ulid::new();
    let booked = Ulid::new();
    client.batch_execute(&book_sql(booked, resource, service, 12 * H)).await.unwrap();

    let free = rows(
        &client,
        &format!(
            "SELECT * FROM availability WHERE resource_id = '{resource}' AND service_id = '{service}' \
             AND start >= {} AND \"end\" <= {}",
            9 * H,
            17 * H
        ),
    )
    .await;
    let spans: Vec<(String, String)> = free
        .iter()
        .map(|r| (r.get("start").unwrap().to_string(), r.get("end").unwrap().to_string()))
        .collect();
    assert_eq!(
        spans,
        vec![
            ((9 * H).to_string(), (12 * H).to_string()),
            ((13 * H).to_string(), (17 * H).to_string()),
        ]
    );

    let conflict = rows(
        &client,
        &format!(
            "SELECT * FROM conflicts WHERE resource_id = '{resource}' AND service_id = '{service}' AND start = {}",
            11 * H + 30 * 60_000
        ),
    )
    .await;
    assert_eq!(conflict.len(), 1);
    assert_eq!(conflict[0].get("id"), Some(booked.to_string().as_str()));

    let clear = rows(
        &client,
        &format!(
            "SELECT * FROM conflicts WHERE resource_id = '{resource}' AND service_id = '{service}' AND start = {}",
            13 * H
        ),
    )
    .await;
    assert!(clear.is_empty());
}

#[tokio::test]
async fn extended_protocol_with_parameters() {
    let addr = start_test_server().await;
    let client = connect(addr, "salon").await;
    let service = register_service(&client, 30).await;
    let resource = Ulid::new();
    let id = Ulid::new();
    let customer = Ulid::new();

    let inserted = client
        .execute(
            "INSERT INTO appointments (id, resource_id, service_id, customer_id, start) VALUES ($1, $2, $3, $4, $5)",
            &[
                &id.to_string(),
                &resource.to_string(),
                &service.to_string(),
                &customer.to_string(),
                &(10 * H).to_string(),
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let got = rows(&client, &format!("SELECT * FROM appointments WHERE id = '{id}'")).await;
    assert_eq!(got[0].get("customer_id"), Some(customer.to_string().as_str()));
}

#[tokio::test]
async fn inactive_service_and_bad_sql() {
    let addr = start_test_server().await;
    let client = connect(addr, "salon").await;
    let service = register_service(&client, 30).await;
    client
        .batch_execute(&format!("DELETE FROM services WHERE id = '{service}'"))
        .await
        .unwrap();

    let err = client
        .batch_execute(&book_sql(Ulid::new(), Ulid::new(), service, 10 * H))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("22023"));

    let err = client.batch_execute("INSERT INTO rooms (id) VALUES ('x')").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));

    let services = rows(&client, "SELECT * FROM services").await;
    assert_eq!(services[0].get("active"), Some("f"));
}

#[tokio::test]
async fn tenants_are_isolated_by_database() {
    let addr = start_test_server().await;
    let a = connect(addr, "shop_a").await;
    let b = connect(addr, "shop_b").await;

    register_service(&a, 30).await;
    assert_eq!(rows(&a, "SELECT * FROM services").await.len(), 1);
    assert!(rows(&b, "SELECT * FROM services").await.is_empty());
}
