//! Firestore REST v1 adapter
//!
//! Implements the store capability over:
//! - documents.get / createDocument / patch / delete
//! - documents:runQuery with a structuredQuery
//!
//! Every request carries the API key and, once signed in, the session's id
//! token. Live queries re-run after writes made through this handle.

use std::rc::Rc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Method;
use serde_json::{Value, json};
use url::Url;

use super::{
    CollectionPath, Direction, Document, DocumentPath, DocumentStore, Fields, Query,
    QueryListener, SnapshotListener,
};
use crate::auth::SessionCell;
use crate::backend::{check_status, handle_response};
use crate::config::ConnectionConfig;
use crate::error::{DashboardError, Result};
use crate::listener::{ListenerRegistry, Subscription};

const FIRESTORE_V1_API: &str = "https://firestore.googleapis.com/v1/";

/// Firestore store handle
pub struct FirestoreStore {
    http: reqwest::Client,
    project_id: String,
    api_key: String,
    session: SessionCell,
    listeners: ListenerRegistry<QueryListener>,
}

impl FirestoreStore {
    pub fn new(http: reqwest::Client, config: &ConnectionConfig, session: SessionCell) -> Self {
        Self {
            http,
            project_id: config.project_id().to_string(),
            api_key: config.api_key().to_string(),
            session,
            listeners: ListenerRegistry::new(),
        }
    }

    /// `projects/{project}/databases/(default)/documents/{relative}`, with
    /// `suffix` appended to the last segment and the API key in the query
    fn url(&self, relative: &[String], suffix: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut segments: Vec<String> = ["projects", self.project_id.as_str(), "databases", "(default)", "documents"]
            .iter()
            .map(ToString::to_string)
            .chain(relative.iter().cloned())
            .collect();
        if let Some(last) = segments.last_mut() {
            last.push_str(suffix);
        }

        let mut url = Url::parse(FIRESTORE_V1_API)
            .map_err(|e| DashboardError::Store(format!("invalid Firestore endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| DashboardError::Store("Firestore endpoint cannot take a path".into()))?
            .pop_if_empty()
            .extend(&segments);
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .extend_pairs(params.iter().map(|(name, value)| (*name, value.as_str())));
        Ok(url)
    }

    fn document_url(&self, path: &DocumentPath, params: &[(&str, String)]) -> Result<Url> {
        self.url(path.segments(), "", params)
    }

    /// `runQuery` is addressed on the parent document, or on the root
    fn query_url(&self, query: &Query) -> Result<Url> {
        match query.collection.parent() {
            Some(doc) => self.url(doc.segments(), ":runQuery", &[]),
            None => self.url(&[], ":runQuery", &[]),
        }
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header("Content-Type", "application/json");
        match self.session.borrow().as_ref().and_then(|s| s.id_token.clone()) {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    fn parse_document(&self, value: &Value) -> Result<Document> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| DashboardError::Store("document without name".into()))?;
        let relative = name
            .split_once("/documents/")
            .map(|(_, rest)| rest)
            .ok_or_else(|| DashboardError::Store(format!("unexpected document name: {name}")))?;
        let fields = match value.get("fields") {
            Some(Value::Object(encoded)) => decode_fields(encoded),
            _ => Fields::new(),
        };
        Ok(Document {
            path: DocumentPath::parse(relative)?,
            fields,
        })
    }

    async fn patch(&self, path: &DocumentPath, fields: Fields, params: Vec<(&str, String)>) -> Result<()> {
        let url = self.document_url(path, &params)?;
        let response = self
            .request(Method::PATCH, url)
            .json(&json!({ "fields": encode_fields(&fields) }))
            .send()
            .await?;
        let _: Value = handle_response(response)
            .await
            .map_err(|e| not_found_as(e, path))?;
        Ok(())
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>> {
        let url = self.query_url(query)?;
        let response = self
            .request(Method::POST, url)
            .json(&structured_query(query))
            .send()
            .await?;
        let rows: Vec<Value> = handle_response(response).await?;

        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(|doc| self.parse_document(doc))
            .collect()
    }

    /// Re-run every live query on `collection` concurrently
    async fn notify(&self, collection: &CollectionPath) {
        let refreshes = self
            .listeners
            .snapshot()
            .into_iter()
            .filter(|entry| entry.query.collection == *collection)
            .map(|entry| async move { (self.run_query(&entry.query).await, entry) });

        for (result, entry) in join_all(refreshes).await {
            match result {
                Ok(snapshot) => (entry.listener)(&snapshot),
                Err(e) => tracing::warn!(collection = %collection, error = %e, "live query refresh failed"),
            }
        }
    }
}

#[async_trait(?Send)]
impl DocumentStore for FirestoreStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn add_document(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentPath> {
        let url = self.url(collection.segments(), "", &[])?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "fields": encode_fields(&fields) }))
            .send()
            .await?;
        let created: Value = handle_response(response).await?;
        let doc = self.parse_document(&created)?;
        self.notify(collection).await;
        Ok(doc.path)
    }

    async fn set_document(&self, path: &DocumentPath, fields: Fields, merge: bool) -> Result<()> {
        let params = match patch_params(&fields, merge, false) {
            Some(params) => params,
            // an empty merge only creates the document if it is missing
            None if self.get_document(path).await?.is_some() => return Ok(()),
            None => Vec::new(),
        };
        self.patch(path, fields, params).await?;
        self.notify(&path.parent()).await;
        Ok(())
    }

    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        let Some(params) = patch_params(&fields, true, true) else {
            return match self.get_document(path).await? {
                Some(_) => Ok(()),
                None => Err(DashboardError::NotFound(path.to_string())),
            };
        };
        self.patch(path, fields, params).await?;
        self.notify(&path.parent()).await;
        Ok(())
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<()> {
        let url = self.document_url(path, &[])?;
        let response = self.request(Method::DELETE, url).send().await?;
        check_status(response).await?;
        self.notify(&path.parent()).await;
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>> {
        let url = self.document_url(path, &[])?;
        let response = self.request(Method::GET, url).send().await?;
        match handle_response::<Value>(response).await {
            Ok(value) => self.parse_document(&value).map(Some),
            Err(DashboardError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.run_query(query).await
    }

    async fn subscribe(&self, query: Query, listener: Rc<SnapshotListener>) -> Result<Subscription> {
        let snapshot = self.run_query(&query).await?;
        listener(&snapshot);
        Ok(self.listeners.register(Rc::new(QueryListener { query, listener })))
    }
}

fn not_found_as(err: DashboardError, path: &DocumentPath) -> DashboardError {
    match err {
        DashboardError::NotFound(_) => DashboardError::NotFound(path.to_string()),
        other => other,
    }
}

/// PATCH parameters: an update mask when merging, plus an existence
/// precondition. `None` when a merge has no fields, since an empty mask would
/// replace the whole document.
fn patch_params(fields: &Fields, merge: bool, must_exist: bool) -> Option<Vec<(&'static str, String)>> {
    if !merge {
        return Some(Vec::new());
    }
    if fields.is_empty() {
        return None;
    }
    let mut params = update_mask(fields);
    if must_exist {
        params.push(("currentDocument.exists", "true".to_string()));
    }
    Some(params)
}

fn update_mask(fields: &Fields) -> Vec<(&'static str, String)> {
    fields
        .keys()
        .map(|key| ("updateMask.fieldPaths", quote_field_path(key)))
        .collect()
}

/// Simple identifiers go bare, anything else is backtick-quoted
fn quote_field_path(key: &str) -> String {
    let simple = key
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if simple && !key.is_empty() {
        key.to_string()
    } else {
        format!("`{}`", key.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn structured_query(query: &Query) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": query.collection.id() }],
    });
    if let Some((field, direction)) = &query.order_by {
        structured["orderBy"] = json!([{
            "field": { "fieldPath": quote_field_path(field) },
            "direction": match direction {
                Direction::Ascending => "ASCENDING",
                Direction::Descending => "DESCENDING",
            },
        }]);
    }
    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }
    json!({ "structuredQuery": structured })
}

/// Plain JSON to Firestore typed value
fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Firestore typed value to plain JSON; timestamps and references come
/// back as strings
fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "booleanValue"
        | "geoPointValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .or_else(|| inner.as_i64().map(Value::from))
            .unwrap_or(Value::Null),
        "doubleValue" => inner.as_f64().map(Value::from).unwrap_or(Value::Null),
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => Value::Object(decode_fields(fields)),
            _ => Value::Object(Fields::new()),
        },
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

fn decode_fields(encoded: &serde_json::Map<String, Value>) -> Fields {
    encoded
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}
