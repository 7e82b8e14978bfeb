//! MySQL export tests using testcontainers.

#![cfg(feature = "mysql")]

use schemaport_core::{
    ConnectorRegistry, ExportOptions, FieldType, ExportPipeline, FieldRef, PipelineState,
    RelationInferenceConfig, RelationMethod, parse_connection_url,
};
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) {
    for _ in 0..max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            let ready = sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok();
            pool.close().await;
            if ready {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("MySQL failed to become ready after {} attempts", max_attempts);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mysql_export_scoped_database() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await;

    let pool = MySqlPool::connect(&database_url).await.unwrap();
    for statement in [
        "CREATE TABLE customers (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(64), joined DATE)",
        "CREATE TABLE invoices (id INT AUTO_INCREMENT PRIMARY KEY, customer_id INT, \
         amount DOUBLE, total DECIMAL(10,2) NOT NULL, due_at TIME NOT NULL, \
         FOREIGN KEY (customer_id) REFERENCES customers(id))",
        "INSERT INTO customers (name, joined) VALUES ('Ada', '2024-01-02'), ('Grace', NULL)",
        "INSERT INTO invoices (customer_id, amount, total, due_at) VALUES \
         (1, 10.5, 10.50, '09:30:00'), (1, 3.0, 3.00, '12:00:00'), (2, 7.25, 7.25, '17:45:00')",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let options = ExportOptions::new()
        .with_relations(RelationInferenceConfig::default().with_enabled(true));
    let descriptor = parse_connection_url(&database_url, None).unwrap();
    let outcome = ExportPipeline::new(Arc::new(ConnectorRegistry::new()), options)
        .run(&descriptor)
        .await;

    assert_eq!(outcome.state, PipelineState::Done, "{:?}", outcome.document.errors);
    let document = &outcome.document;
    let names: Vec<String> = document.entities.iter().map(|e| e.qualified_name()).collect();
    assert_eq!(names, ["test.customers", "test.invoices"]);

    let customers = document.entity("test.customers").unwrap();
    let joined = customers.fields.iter().find(|f| f.name == "joined").unwrap();
    assert!(joined.nullable);

    let invoices = document.entity("test.invoices").unwrap();
    for name in ["total", "due_at"] {
        let field = invoices.fields.iter().find(|f| f.name == name).unwrap();
        assert!(!field.nullable, "{} sampled as null", name);
        assert_eq!(field.stats.nulls, 0);
    }
    let total = invoices.fields.iter().find(|f| f.name == "total").unwrap();
    assert_eq!(total.field_type, FieldType::Float);

    // The declared foreign key replaces the name-match duplicate.
    assert_eq!(document.relations.len(), 1);
    assert_eq!(document.relations[0].method, RelationMethod::Declared);
    assert_eq!(
        document.relations[0].from,
        FieldRef::new("test.invoices", "customer_id")
    );
}
