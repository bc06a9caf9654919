//! Database schema introspection and title-field discovery.

use serde_json::Value;

use weeklypack_shared::{Result, WeeklyPackError};

/// Field name conventionally used for a database's title column.
pub const CONVENTIONAL_TITLE: &str = "Name";

/// Kind tag of a database field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Title,
    RichText,
    Number,
    Select,
    MultiSelect,
    Status,
    Date,
    Checkbox,
    Url,
    /// Any tag this crate never writes (formula, relation, people, ...).
    Other(String),
}

impl FieldKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "title" => Self::Title,
            "rich_text" => Self::RichText,
            "number" => Self::Number,
            "select" => Self::Select,
            "multi_select" => Self::MultiSelect,
            "status" => Self::Status,
            "date" => Self::Date,
            "checkbox" => Self::Checkbox,
            "url" => Self::Url,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Field names and kinds in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeBaseSchema {
    fields: Vec<(String, FieldKind)>,
}

impl KnowledgeBaseSchema {
    pub fn new(fields: Vec<(String, FieldKind)>) -> Self {
        Self { fields }
    }

    /// Build from a database object's `properties` map.
    ///
    /// Relies on `serde_json`'s `preserve_order` so iteration follows the
    /// order the API declared the fields in.
    pub fn from_properties(properties: &Value) -> Result<Self> {
        let map = properties.as_object().ok_or_else(|| {
            WeeklyPackError::KnowledgeBase("database has no properties object".into())
        })?;

        let fields = map
            .iter()
            .map(|(name, def)| {
                let tag = def.get("type").and_then(Value::as_str).unwrap_or("");
                (name.clone(), FieldKind::from_tag(tag))
            })
            .collect();

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[(String, FieldKind)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Kind of the named field, if declared.
    pub fn kind_of(&self, name: &str) -> Option<&FieldKind> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, k)| k)
    }

    /// Whether `name` is declared with exactly `kind`.
    pub fn declares(&self, name: &str, kind: &FieldKind) -> bool {
        self.kind_of(name) == Some(kind)
    }
}

/// How the title field was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleResolution {
    /// The one field of title kind.
    ByKind,
    /// No unique title-kind field; a field named `Name` exists.
    ByConventionalName,
    /// Neither of the above; the first declared field.
    FirstDeclared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleField {
    pub name: String,
    pub resolution: TitleResolution,
}

/// Pick the field a record's title is written to.
///
/// Errors only when the schema declares no fields at all.
pub fn find_title_field(schema: &KnowledgeBaseSchema) -> Result<TitleField> {
    let mut titles = schema
        .fields()
        .iter()
        .filter(|(_, kind)| *kind == FieldKind::Title);

    if let (Some((name, _)), None) = (titles.next(), titles.next()) {
        return Ok(TitleField {
            name: name.clone(),
            resolution: TitleResolution::ByKind,
        });
    }

    if schema.kind_of(CONVENTIONAL_TITLE).is_some() {
        return Ok(TitleField {
            name: CONVENTIONAL_TITLE.to_string(),
            resolution: TitleResolution::ByConventionalName,
        });
    }

    schema
        .fields()
        .first()
        .map(|(name, _)| TitleField {
            name: name.clone(),
            resolution: TitleResolution::FirstDeclared,
        })
        .ok_or_else(|| WeeklyPackError::KnowledgeBase("database schema declares no fields".into()))
}
