//! Run record written after a remix is published.

use std::collections::HashMap;

use tracing::info;

use remix_models::{AlignmentStatus, Offset};

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::{MapValue, ToFirestoreValue, Value};

/// The only fields a run ever writes.
pub const RECORD_FIELDS: [&str; 3] = ["offset", "alignment_status", "output_uri"];

/// Outcome of one run, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// `None` when alignment was skipped before an offset existed.
    pub offset: Option<Offset>,
    pub alignment_status: AlignmentStatus,
    pub output_uri: String,
}

impl ToFirestoreValue for Offset {
    fn to_firestore_value(&self) -> Value {
        let mut fields = HashMap::new();
        fields.insert("delta".to_string(), self.delta.to_firestore_value());
        fields.insert(
            "direction".to_string(),
            self.direction.as_str().to_firestore_value(),
        );
        Value::MapValue(MapValue {
            fields: Some(fields),
        })
    }
}

impl RunRecord {
    pub fn fields(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("offset".to_string(), self.offset.to_firestore_value()),
            (
                "alignment_status".to_string(),
                self.alignment_status.record_value().to_firestore_value(),
            ),
            ("output_uri".to_string(), self.output_uri.to_firestore_value()),
        ])
    }
}

/// Writes run records into one collection.
#[derive(Clone)]
pub struct RunRecordStore {
    client: FirestoreClient,
    collection: String,
}

impl RunRecordStore {
    pub fn new(client: FirestoreClient) -> Self {
        let collection = client.config().collection.clone();
        Self { client, collection }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Write the record's fields on document `run_id`. Other fields are untouched.
    pub async fn upsert(&self, run_id: &str, record: &RunRecord) -> FirestoreResult<()> {
        self.client
            .upsert(&self.collection, run_id, record.fields())
            .await?;
        info!(
            run_id,
            alignment_status = %record.alignment_status,
            output_uri = %record.output_uri,
            "Run record written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use crate::token_cache::TokenSource;
    use remix_models::{Direction, SkipReason};
    use remix_pool::PoolConfig;
    use wiremock::matchers::{body_partial_json, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_applied_record_fields() {
        let record = RunRecord {
            offset: Some(Offset::between(12.0, 10.5)),
            alignment_status: AlignmentStatus::Applied,
            output_uri: "s3://remixes/run-1.mp4".into(),
        };
        let fields = record.fields();

        let mut keys: Vec<_> = fields.keys().map(String::as_str).collect();
        keys.sort();
        let mut expected = RECORD_FIELDS.to_vec();
        expected.sort();
        assert_eq!(keys, expected);

        let json = serde_json::to_value(&fields["offset"]).unwrap();
        assert_eq!(json["mapValue"]["fields"]["delta"]["doubleValue"], 1.5);
        assert_eq!(
            json["mapValue"]["fields"]["direction"]["stringValue"],
            Direction::DelayAudio.as_str()
        );
    }

    #[test]
    fn test_skipped_record_has_null_offset() {
        let record = RunRecord {
            offset: None,
            alignment_status: AlignmentStatus::Skipped {
                reason: SkipReason::NoDetectableDrop,
            },
            output_uri: "s3://remixes/run-2.mp4".into(),
        };
        let fields = record.fields();
        assert_eq!(fields["offset"], Value::NullValue(()));
        assert_eq!(
            fields["alignment_status"],
            Value::StringValue("skipped:no_detectable_drop".into())
        );
    }

    #[tokio::test]
    async fn test_store_writes_three_field_mask() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("updateMask.fieldPaths", "offset"))
            .and(query_param("updateMask.fieldPaths", "alignment_status"))
            .and(query_param("updateMask.fieldPaths", "output_uri"))
            .and(body_partial_json(serde_json::json!({
                "fields": { "output_uri": { "stringValue": "s3://remixes/run-1.mp4" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = FirestoreClient::with_token_source(
            FirestoreConfig::new("test-project"),
            &server.uri(),
            TokenSource::Static("t".into()),
            PoolConfig::default(),
        )
        .unwrap();
        let store = RunRecordStore::new(client);

        let record = RunRecord {
            offset: Some(Offset::between(12.0, 10.5)),
            alignment_status: AlignmentStatus::Applied,
            output_uri: "s3://remixes/run-1.mp4".into(),
        };
        store.upsert("run-1", &record).await.unwrap();
    }
}
