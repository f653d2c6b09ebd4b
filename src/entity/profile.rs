//! The `Profile` entity: record shape, field catalogue, row and resource mapping.

use crate::datastore::Resource;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::any::AnyRow;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

/// API resource name.
pub const PROFILE_MODEL: &str = "profiles";
/// Physical table.
pub const PROFILE_TABLE: &str = "profile";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
}

/// How one attribute maps to storage and to the search index.
#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    /// Attribute name on the API.
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    /// Analyzed with the case-insensitive n-gram analyzer.
    pub searchable: bool,
    /// Has a sortable index field.
    pub sortable: bool,
}

pub const PROFILE_FIELDS: &[FieldDef] = &[
    FieldDef { name: "name", column: "name", kind: FieldKind::Text, searchable: true, sortable: true },
    FieldDef { name: "email", column: "email", kind: FieldKind::Text, searchable: true, sortable: false },
    FieldDef { name: "experience", column: "experience", kind: FieldKind::Integer, searchable: false, sortable: true },
    FieldDef { name: "github", column: "github", kind: FieldKind::Text, searchable: false, sortable: false },
    FieldDef { name: "linkedIn", column: "linked_in", kind: FieldKind::Text, searchable: false, sortable: false },
    FieldDef { name: "stackOverflow", column: "stack_overflow", kind: FieldKind::Text, searchable: false, sortable: false },
];

pub fn field(name: &str) -> Option<&'static FieldDef> {
    PROFILE_FIELDS.iter().find(|f| f.name == name)
}

/// Physical columns of the profile table in storage order, key first.
pub const PROFILE_COLUMNS: &[&str] = &["id", "name", "email", "experience", "github", "linked_in", "stack_overflow"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub experience: i32,
    pub github: Option<String>,
    pub linked_in: Option<String>,
    pub stack_overflow: Option<String>,
}

/// Attributes accepted on create and update. Absent fields are left unchanged on update.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileAttributes {
    pub name: Option<String>,
    pub email: Option<String>,
    pub experience: Option<i32>,
    pub github: Option<String>,
    pub linked_in: Option<String>,
    pub stack_overflow: Option<String>,
}

impl ProfileAttributes {
    pub fn from_map(attributes: Map<String, Value>) -> Result<Self, AppError> {
        if let Some(id) = attributes.get("id") {
            return Err(AppError::BadRequest(format!("id is generated and immutable (got {})", id)));
        }
        serde_json::from_value(Value::Object(attributes))
            .map_err(|e| AppError::Validation(format!("profiles: {}", e)))
    }
}

impl Profile {
    /// New profile with a generated id.
    pub fn create(attrs: ProfileAttributes) -> Self {
        let mut profile = Profile {
            id: Uuid::new_v4(),
            name: String::new(),
            email: String::new(),
            experience: 0,
            github: None,
            linked_in: None,
            stack_overflow: None,
        };
        profile.apply(attrs);
        profile
    }

    pub fn apply(&mut self, attrs: ProfileAttributes) {
        if let Some(v) = attrs.name {
            self.name = v;
        }
        if let Some(v) = attrs.email {
            self.email = v;
        }
        if let Some(v) = attrs.experience {
            self.experience = v;
        }
        if attrs.github.is_some() {
            self.github = attrs.github;
        }
        if attrs.linked_in.is_some() {
            self.linked_in = attrs.linked_in;
        }
        if attrs.stack_overflow.is_some() {
            self.stack_overflow = attrs.stack_overflow;
        }
    }

    pub fn from_row(row: &AnyRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id).map_err(|e| sqlx::Error::ColumnDecode {
            index: "id".into(),
            source: Box::new(e),
        })?;
        let experience: i64 = row.try_get("experience")?;
        let experience = i32::try_from(experience).map_err(|e| sqlx::Error::ColumnDecode {
            index: "experience".into(),
            source: Box::new(e),
        })?;
        Ok(Profile {
            id,
            name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
            email: row.try_get::<Option<String>, _>("email")?.unwrap_or_default(),
            experience,
            github: row.try_get("github")?,
            linked_in: row.try_get("linked_in")?,
            stack_overflow: row.try_get("stack_overflow")?,
        })
    }

    pub fn into_resource(self) -> Resource {
        let id = self.id.to_string();
        let mut attributes = match serde_json::to_value(self) {
            Ok(Value::Object(m)) => m,
            _ => Map::new(),
        };
        attributes.remove("id");
        Resource::new(PROFILE_MODEL, id, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: Value) -> ProfileAttributes {
        match v {
            Value::Object(m) => ProfileAttributes::from_map(m).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_generates_id_and_defaults() {
        let p = Profile::create(attrs(json!({ "name": "Ada" })));
        assert_eq!(p.name, "Ada");
        assert_eq!(p.email, "");
        assert_eq!(p.experience, 0);
        assert_ne!(p.id, Uuid::nil());
    }

    #[test]
    fn apply_leaves_absent_fields_alone() {
        let mut p = Profile::create(attrs(json!({ "name": "Ada", "github": "ada" })));
        p.apply(attrs(json!({ "experience": 12 })));
        assert_eq!(p.name, "Ada");
        assert_eq!(p.github.as_deref(), Some("ada"));
        assert_eq!(p.experience, 12);
    }

    #[test]
    fn rejects_client_supplied_id() {
        let m = json!({ "id": "x", "name": "Ada" });
        let err = ProfileAttributes::from_map(m.as_object().cloned().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn rejects_unknown_attributes() {
        let m = json!({ "nickname": "ada" });
        let err = ProfileAttributes::from_map(m.as_object().cloned().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn resource_uses_camel_case_attributes() {
        let p = Profile::create(attrs(json!({ "name": "Ada", "linkedIn": "ada-l" })));
        let id = p.id.to_string();
        let r = p.into_resource();
        assert_eq!(r.kind, PROFILE_MODEL);
        assert_eq!(r.id, id);
        assert_eq!(r.attributes["linkedIn"], "ada-l");
        assert!(!r.attributes.contains_key("id"));
    }

    #[test]
    fn field_catalogue_marks_index_fields() {
        assert!(field("name").unwrap().searchable && field("name").unwrap().sortable);
        assert!(field("email").unwrap().searchable && !field("email").unwrap().sortable);
        assert_eq!(field("linkedIn").unwrap().column, "linked_in");
        for f in PROFILE_FIELDS {
            assert!(PROFILE_COLUMNS.contains(&f.column));
        }
    }
}
