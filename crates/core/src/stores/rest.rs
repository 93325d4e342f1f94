use crate::error::StoreError;
use crate::models::{Edge, FileRecord, FileStatus, Node, NodeMetadata, QueryLog};
use crate::traits::{BlobStore, CorpusStore};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

const BACKEND: &str = "rest";
const STORAGE_BACKEND: &str = "storage";
const INSERT_BATCH: usize = 500;
/// Same order as the memory store: by source, strongest edge first, then by target.
const EDGE_ORDER: &str = "source_node_id.asc,weight.desc,target_node_id.asc";

/// Files, nodes, edges and queries tables behind a PostgREST-compatible API.
pub struct RestStore {
    endpoint: Url,
    api_key: String,
    client: Client,
}

impl RestStore {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            endpoint: with_trailing_slash(Url::parse(endpoint)?),
            api_key: api_key.into(),
            client: Client::new(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        Ok(self.endpoint.join(&format!("rest/v1/{table}"))?)
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .client
            .request(method, self.table_url(table)?)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key))
    }

    async fn select<T: for<'de> Deserialize<'de>>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .request(Method::GET, table)?
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;
        Ok(ensure_success(response, BACKEND).await?.json().await?)
    }

    async fn upsert<T: Serialize + Sync>(&self, table: &str, rows: &[T]) -> Result<(), StoreError> {
        for batch in rows.chunks(INSERT_BATCH) {
            let response = self
                .request(Method::POST, table)?
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(batch)
                .send()
                .await?;
            ensure_success(response, BACKEND).await?;
        }
        Ok(())
    }

    async fn delete_where(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, table)?
            .query(filters)
            .send()
            .await?;
        ensure_success(response, BACKEND).await?;
        Ok(())
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

fn in_filter(values: &[String]) -> String {
    let quoted = values
        .iter()
        .map(|value| format!("\"{}\"", value.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({quoted})")
}

fn edge_filters(file_id: &str, source_ids: &[String]) -> [(&'static str, String); 3] {
    [
        ("file_id", eq_filter(file_id)),
        ("source_node_id", in_filter(source_ids)),
        ("order", EDGE_ORDER.to_string()),
    ]
}

async fn ensure_success(response: Response, backend: &str) -> Result<Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::BackendResponse {
        backend: backend.to_string(),
        details: format!("{status}: {body}"),
    })
}

/// pgvector columns come back as `"[0.1,0.2]"` text; inserts accept plain arrays.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VectorColumn {
    Values(Vec<f32>),
    Text(String),
}

impl VectorColumn {
    fn into_values(self) -> Result<Vec<f32>, StoreError> {
        match self {
            Self::Values(values) => Ok(values),
            Self::Text(text) => Ok(serde_json::from_str(&text)?),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    id: String,
    file_id: String,
    #[serde(rename = "type")]
    node_type: String,
    chunk_index: usize,
    content: String,
    embedding: VectorColumn,
    #[serde(default)]
    metadata: Option<NodeMetadata>,
}

impl NodeRow {
    fn into_node(self) -> Result<Node, StoreError> {
        Ok(Node {
            id: self.id,
            file_id: self.file_id,
            node_type: self.node_type,
            chunk_index: self.chunk_index,
            content: self.content,
            embedding: self.embedding.into_values()?,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

fn rows_into_nodes(rows: Vec<NodeRow>) -> Result<Vec<Node>, StoreError> {
    rows.into_iter().map(NodeRow::into_node).collect()
}

#[async_trait]
impl CorpusStore for RestStore {
    async fn insert_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        self.upsert("files", std::slice::from_ref(file)).await
    }

    async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        let files: Vec<FileRecord> = self.select("files", &[("id", eq_filter(file_id))]).await?;
        Ok(files.into_iter().next())
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.select("files", &[("order", "created_at.asc".to_string())])
            .await
    }

    async fn update_file_status(
        &self,
        file_id: &str,
        status: FileStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let response = self
            .request(Method::PATCH, "files")?
            .query(&[("id", eq_filter(file_id))])
            .header("Prefer", "return=representation")
            .json(&json!({ "status": status, "error": error }))
            .send()
            .await?;
        let updated: Vec<serde_json::Value> =
            ensure_success(response, BACKEND).await?.json().await?;
        if updated.is_empty() {
            return Err(StoreError::MissingObject(format!("file {file_id}")));
        }
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), StoreError> {
        self.clear_file_graph(file_id).await?;
        self.delete_where("files", &[("id", eq_filter(file_id))])
            .await
    }

    async fn insert_nodes(&self, nodes: &[Node]) -> Result<(), StoreError> {
        self.upsert("nodes", nodes).await
    }

    async fn list_nodes(&self, file_id: &str) -> Result<Vec<Node>, StoreError> {
        let rows: Vec<NodeRow> = self
            .select(
                "nodes",
                &[
                    ("file_id", eq_filter(file_id)),
                    ("order", "chunk_index.asc".to_string()),
                ],
            )
            .await?;
        rows_into_nodes(rows)
    }

    async fn get_nodes(&self, node_ids: &[String]) -> Result<Vec<Node>, StoreError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<NodeRow> = self.select("nodes", &[("id", in_filter(node_ids))]).await?;
        rows_into_nodes(rows)
    }

    async fn clear_file_graph(&self, file_id: &str) -> Result<(), StoreError> {
        self.delete_where("edges", &[("file_id", eq_filter(file_id))])
            .await?;
        self.delete_where("nodes", &[("file_id", eq_filter(file_id))])
            .await
    }

    async fn insert_edges(&self, edges: &[Edge]) -> Result<(), StoreError> {
        self.upsert("edges", edges).await
    }

    async fn edges_from(
        &self,
        file_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<Edge>, StoreError> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("edges", &edge_filters(file_id, source_ids))
            .await
    }

    async fn insert_query_log(&self, log: &QueryLog) -> Result<(), StoreError> {
        self.upsert("queries", std::slice::from_ref(log)).await
    }
}

/// Object storage bucket addressed as `{endpoint}/storage/v1/object/{bucket}/{path}`.
pub struct RestBlobStore {
    endpoint: Url,
    bucket: String,
    api_key: String,
    client: Client,
}

impl RestBlobStore {
    pub fn new(
        endpoint: &str,
        bucket: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            endpoint: with_trailing_slash(Url::parse(endpoint)?),
            bucket: bucket.into(),
            api_key: api_key.into(),
            client: Client::new(),
        })
    }

    fn object_url(&self, path: &str) -> Result<Url, StoreError> {
        if path.is_empty() || path.starts_with('/') {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self
            .endpoint
            .join(&format!("storage/v1/object/{}/{}", self.bucket, path))?)
    }
}

#[async_trait]
impl BlobStore for RestBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get(self.object_url(path)?)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST
        ) {
            return Err(StoreError::MissingObject(path.to_string()));
        }

        let bytes = ensure_success(response, STORAGE_BACKEND)
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.object_url(path)?)
            .header("apikey", &self.api_key)
            .header("x-upsert", "true")
            .header("content-type", "application/octet-stream")
            .bearer_auth(&self.api_key)
            .body(bytes.to_vec())
            .send()
            .await?;
        ensure_success(response, STORAGE_BACKEND).await?;
        Ok(())
    }
}
