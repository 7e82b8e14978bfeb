//! MongoDB export tests using testcontainers.

#![cfg(feature = "mongodb")]

use mongodb::bson::{Document, doc};
use schemaport_core::{
    ConnectorRegistry, ExportOptions, ExportPipeline, FieldType, PipelineState, SamplingOptions,
    parse_connection_url,
};
use std::sync::Arc;
use testcontainers_modules::mongo::Mongo;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

async fn seed(connection_string: &str) {
    let client = mongodb::Client::with_uri_str(connection_string)
        .await
        .expect("Failed to connect to MongoDB");
    let pets = client.database("zoo").collection::<Document>("pets");
    pets.insert_many([
        doc! { "type": "cat", "name": "Tom", "indoor": true, "born": mongodb::bson::DateTime::now() },
        doc! { "type": "dog", "name": "Rex", "breed": "collie" },
        doc! { "type": "cat", "name": "Kit", "indoor": false },
        doc! { "name": "Unknown" },
    ])
    .await
    .expect("Failed to insert documents");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mongodb_mixed_collection_export() {
    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container");
    let port = container
        .get_host_port_ipv4(27017)
        .await
        .expect("Failed to get MongoDB port");
    let connection_string = format!("mongodb://localhost:{}/zoo", port);
    seed(&connection_string).await;

    let options = ExportOptions::new().with_sampling(
        SamplingOptions::new()
            .with_sample_size(50)
            .with_mixed_field(Some("type".to_string())),
    );
    let descriptor = parse_connection_url(&connection_string, None).unwrap();
    let outcome = ExportPipeline::new(Arc::new(ConnectorRegistry::new()), options)
        .run(&descriptor)
        .await;

    assert_eq!(outcome.state, PipelineState::Done, "{:?}", outcome.document.errors);
    let pets = outcome.document.entity("zoo.pets").unwrap();
    assert_eq!(pets.discriminator_field.as_deref(), Some("type"));

    let field = |name: &str, tag: Option<&str>| {
        pets.fields
            .iter()
            .find(|f| f.name == name && f.discriminator.as_deref() == tag)
    };
    assert_eq!(field("_id", None).unwrap().field_type, FieldType::String);
    assert!(field("breed", Some("dog")).is_some());
    assert!(field("breed", Some("cat")).is_none());
    assert_eq!(field("indoor", Some("cat")).unwrap().field_type, FieldType::Bool);
    assert_eq!(field("born", Some("cat")).unwrap().field_type, FieldType::Date);
}
