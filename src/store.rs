//! Thin REST adapter over a Qdrant-shaped vector store: collection lifecycle,
//! point upserts (dense + optional sparse vectors), filtered search, and
//! glob/flat-filter translation. Does not assume any particular client
//! library — everything goes over `reqwest`.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::IndexError;
use crate::sparse::SparseVector;

pub struct VectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: u32,
    pub points_count: u64,
    pub hybrid_enabled: bool,
}

/// Distance metric a collection is created with. Maps 1:1 onto the store's
/// wire-level distance names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Euclid,
    Dot,
}

impl Distance {
    fn as_wire_str(self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Euclid => "Euclid",
            Distance::Dot => "Dot",
        }
    }
}

impl Default for Distance {
    fn default() -> Self {
        Distance::Cosine
    }
}

#[derive(Debug, Clone)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub sparse_vector: Option<SparseVector>,
    pub payload: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

impl VectorStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    fn store_error(collection: &str, message: impl Into<String>) -> IndexError {
        IndexError::Store { collection: collection.to_string(), message: message.into() }
    }

    pub async fn collection_exists(&self, collection: &str) -> crate::error::Result<bool> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/collections/{collection}"))
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        Ok(resp.status().is_success())
    }

    pub async fn create_collection(
        &self,
        collection: &str,
        vector_size: u32,
        distance: Distance,
        hybrid: bool,
    ) -> crate::error::Result<()> {
        let mut body = json!({ "vectors": { "size": vector_size, "distance": distance.as_wire_str() } });
        if hybrid {
            body["sparse_vectors"] = json!({ "bm25": {} });
        }
        let resp = self
            .request(reqwest::Method::PUT, &format!("/collections/{collection}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("create_collection failed: {}", resp.status())));
        }
        Ok(())
    }

    pub async fn get_collection_info(&self, collection: &str) -> crate::error::Result<CollectionInfo> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/collections/{collection}"))
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(IndexError::NotIndexed { collection: collection.to_string() });
        }
        let body: Value = resp.json().await.map_err(|e| Self::store_error(collection, e.to_string()))?;
        let result = &body["result"];
        let sparse_vectors = &result["config"]["params"]["sparse_vectors"];
        let hybrid_enabled = sparse_vectors.is_object() && !sparse_vectors.as_object().map(|m| m.is_empty()).unwrap_or(true);
        Ok(CollectionInfo {
            name: collection.to_string(),
            vector_size: result["config"]["params"]["vectors"]["size"].as_u64().unwrap_or(0) as u32,
            points_count: result["points_count"].as_u64().unwrap_or(0),
            hybrid_enabled,
        })
    }

    /// Fetch one point by ID, or `None` if it does not exist in the collection.
    pub async fn get_point(&self, collection: &str, id: &str) -> crate::error::Result<Option<ScoredPoint>> {
        let point_id = crate::ids::reshape_point_id(id);
        let resp = self
            .request(reqwest::Method::GET, &format!("/collections/{collection}/points/{point_id}"))
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("get_point failed: {}", resp.status())));
        }
        let body: Value = resp.json().await.map_err(|e| Self::store_error(collection, e.to_string()))?;
        let result = &body["result"];
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(ScoredPoint {
            id: result["id"].as_str().map(str::to_string).unwrap_or_else(|| result["id"].to_string()),
            score: 0.0,
            payload: result["payload"]
                .as_object()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        }))
    }

    pub async fn delete_collection(&self, collection: &str) -> crate::error::Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/collections/{collection}"))
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("delete_collection failed: {}", resp.status())));
        }
        Ok(())
    }

    /// Upsert points with `wait=true` so the call only returns once the
    /// store has durably applied the change.
    pub async fn add_points(&self, collection: &str, points: Vec<Point>) -> crate::error::Result<()> {
        let payload_points: Vec<Value> = points
            .iter()
            .map(|p| {
                let mut vectors = json!({ "dense": p.vector });
                if let Some(sparse) = &p.sparse_vector {
                    vectors["bm25"] = json!({ "indices": sparse.indices, "values": sparse.values });
                }
                json!({ "id": reshape_id(&p.id), "vector": vectors, "payload": p.payload })
            })
            .collect();

        let resp = self
            .request(reqwest::Method::PUT, &format!("/collections/{collection}/points?wait=true"))
            .json(&json!({ "points": payload_points }))
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("add_points failed: {}", resp.status())));
        }
        Ok(())
    }

    pub async fn delete_points(&self, collection: &str, ids: Vec<String>) -> crate::error::Result<()> {
        let ids: Vec<Value> = ids.iter().map(|id| reshape_id(id)).collect();
        let resp = self
            .request(reqwest::Method::POST, &format!("/collections/{collection}/points/delete?wait=true"))
            .json(&json!({ "points": ids }))
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("delete_points failed: {}", resp.status())));
        }
        Ok(())
    }

    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u32,
        filter: &HashMap<String, Value>,
    ) -> crate::error::Result<Vec<ScoredPoint>> {
        let mut body = json!({ "vector": { "name": "dense", "vector": vector }, "limit": limit, "with_payload": true });
        if !filter.is_empty() {
            body["filter"] = translate_filter(filter);
        }
        let resp = self
            .request(reqwest::Method::POST, &format!("/collections/{collection}/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("search failed: {}", resp.status())));
        }
        let body: Value = resp.json().await.map_err(|e| Self::store_error(collection, e.to_string()))?;
        Ok(parse_scored_points(&body))
    }

    pub async fn hybrid_search(
        &self,
        collection: &str,
        vector: &[f32],
        sparse: &SparseVector,
        limit: u32,
        filter: &HashMap<String, Value>,
    ) -> crate::error::Result<Vec<ScoredPoint>> {
        let info = self.get_collection_info(collection).await?;
        if !info.hybrid_enabled {
            return Err(IndexError::Config(format!(
                "collection '{collection}' was not created with the hybrid flag; hybrid_search requires sparse_vectors to be enabled"
            )));
        }

        let mut body = json!({
            "prefetch": [
                { "query": vector, "using": "dense", "limit": limit * 2 },
                { "query": { "indices": sparse.indices, "values": sparse.values }, "using": "bm25", "limit": limit * 2 },
            ],
            "query": { "fusion": "rrf" },
            "limit": limit,
            "with_payload": true,
        });
        if !filter.is_empty() {
            body["filter"] = translate_filter(filter);
        }
        let resp = self
            .request(reqwest::Method::POST, &format!("/collections/{collection}/points/query"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::store_error(collection, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::store_error(collection, format!("hybrid_search failed: {}", resp.status())));
        }
        let body: Value = resp.json().await.map_err(|e| Self::store_error(collection, e.to_string()))?;
        Ok(parse_scored_points(&body))
    }
}

fn parse_scored_points(body: &Value) -> Vec<ScoredPoint> {
    body["result"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|hit| ScoredPoint {
            id: hit["id"].as_str().map(str::to_string).unwrap_or_else(|| hit["id"].to_string()),
            score: hit["score"].as_f64().unwrap_or(0.0) as f32,
            payload: hit["payload"]
                .as_object()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        })
        .collect()
}

/// Reshape a logical ID into the JSON form the wire API expects: a bare
/// JSON number for numeric IDs, a JSON string for UUIDs.
fn reshape_id(id: &str) -> Value {
    let reshaped = crate::ids::reshape_point_id(id);
    match reshaped.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(reshaped),
    }
}

/// Translate a flat `{field: value}` filter map into the store's native
/// `{must: [{key, match: {value}}]}` shape. Values ending in a glob are
/// translated into a regex match instead of an exact match.
fn translate_filter(filter: &HashMap<String, Value>) -> Value {
    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) if s.contains('*') || s.contains('?') => {
                json!({ "key": key, "match": { "text": glob_to_regex(s) } })
            }
            other => json!({ "key": key, "match": { "value": other } }),
        })
        .collect();
    json!({ "must": must })
}

/// Translate a glob pattern (`*` any run, `?` single char) to an anchored
/// regex, escaping every other regex-special character literally.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '^' | '$' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_translates_star_and_question_mark() {
        assert_eq!(glob_to_regex("*.rs"), r"^.*\.rs$");
        assert_eq!(glob_to_regex("file?.txt"), r"^file.\.txt$");
    }

    #[test]
    fn translate_filter_builds_must_clause() {
        let mut filter = HashMap::new();
        filter.insert("language".to_string(), Value::String("rust".to_string()));
        let translated = translate_filter(&filter);
        let must = translated["must"].as_array().unwrap();
        assert_eq!(must.len(), 1);
        assert_eq!(must[0]["key"], "language");
    }

    #[test]
    fn translate_filter_uses_regex_for_glob_values() {
        let mut filter = HashMap::new();
        filter.insert("path".to_string(), Value::String("src/*.rs".to_string()));
        let translated = translate_filter(&filter);
        let must = translated["must"].as_array().unwrap();
        assert!(must[0]["match"]["text"].as_str().unwrap().starts_with('^'));
    }
}
