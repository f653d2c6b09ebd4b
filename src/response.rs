//! Resource documents: `{"data": resource}` for one, `{"data": [..], "meta": {"count": n}}` for many.

use crate::datastore::Resource;
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct ResourceDocument {
    pub data: Resource,
}

#[derive(Serialize)]
pub struct CollectionDocument {
    pub data: Vec<Resource>,
    pub meta: CollectionMeta,
}

/// Count of resources in this page.
#[derive(Serialize)]
pub struct CollectionMeta {
    pub count: usize,
}

pub type Reply<T> = (StatusCode, Json<T>);

pub fn created(data: Resource) -> Reply<ResourceDocument> {
    (StatusCode::CREATED, Json(ResourceDocument { data }))
}

pub fn found(data: Resource) -> Reply<ResourceDocument> {
    (StatusCode::OK, Json(ResourceDocument { data }))
}

pub fn collection(data: Vec<Resource>) -> Reply<CollectionDocument> {
    let meta = CollectionMeta { count: data.len() };
    (StatusCode::OK, Json(CollectionDocument { data, meta }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn collection_counts_its_page() {
        let rows = vec![Resource::new("profiles", "a", Map::new()), Resource::new("profiles", "b", Map::new())];
        let (status, Json(doc)) = collection(rows);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::to_value(doc).unwrap(),
            json!({"data": [
                {"type": "profiles", "id": "a", "attributes": {}},
                {"type": "profiles", "id": "b", "attributes": {}}
            ], "meta": {"count": 2}})
        );
    }

    #[test]
    fn single_resource_has_no_meta() {
        let (status, Json(doc)) = created(Resource::new("config", "stats", Map::new()));
        assert_eq!(status, StatusCode::CREATED);
        assert!(serde_json::to_value(doc).unwrap().get("meta").is_none());
    }
}
