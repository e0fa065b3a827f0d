//! Input cleaning and tenant-narrowed reference fields.
//!
//! [`clean`] turns submitted JSON into a typed, validated value. [`ScopedForm`]
//! adds the tenant rules on top: the tenant field is not user-editable, and
//! every field that references another record only accepts records the
//! current tenant can see.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::context::TenantContext;
use crate::entity::{TenantOwned, TENANT_FIELD};
use crate::errors::TenancyError;

pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// Field errors keyed by path: `{"title": ["is required"], "_schema": [..]}`.
#[derive(Debug, Default)]
pub struct FieldErrors {
    map: Map<String, Value>,
}

impl FieldErrors {
    pub fn push_schema(&mut self, msg: impl Into<String>) {
        self.push_field("_schema", msg);
    }

    pub fn push_field(&mut self, field: &str, msg: impl Into<String>) {
        let msg = Value::String(msg.into());
        match self.map.get_mut(field) {
            Some(Value::Array(arr)) => arr.push(msg),
            _ => {
                self.map.insert(field.to_string(), Value::Array(vec![msg]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_anyhow(self, message: &str) -> anyhow::Error {
        TenancyError::validation(message, Value::Object(self.map)).into_anyhow()
    }
}

fn friendly_message(code: &str) -> Option<&'static str> {
    match code {
        "required" => Some("is required"),
        "email" => Some("must be a valid email"),
        "length" => Some("has invalid length"),
        "range" => Some("is out of range"),
        "url" => Some("must be a valid URL"),
        _ => None,
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn collect(out: &mut FieldErrors, prefix: &str, errs: &validator::ValidationErrors) {
    for (field, kind) in errs.errors() {
        let path = join_path(prefix, field);
        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                for e in field_errors {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .or_else(|| friendly_message(&e.code).map(str::to_string))
                        .unwrap_or_else(|| e.code.to_string());
                    out.push_field(&path, msg);
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => collect(out, &path, nested),
            validator::ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    collect(out, &format!("{path}[{idx}]"), nested);
                }
            }
        }
    }
}

/// Deserialize and validate `data`, reporting failures as `Unprocessable`
/// with field paths (`profile.name`, `tags[0].email`).
pub fn clean<T>(data: &Value, message: &str) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_value(data.clone()).map_err(|e| {
        TenancyError::validation(message, json!({"_schema": [e.to_string()]})).into_anyhow()
    })?;

    if let Err(errs) = parsed.validate() {
        let mut out = FieldErrors::default();
        collect(&mut out, "", &errs);
        return Err(out.into_anyhow(message));
    }
    Ok(parsed)
}

/// One selectable value of a reference field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Supplies the records a reference field may point at.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self, ctx: &TenantContext) -> Result<Vec<Choice>>;
}

enum Reference<'a> {
    Scoped(&'a dyn CandidateSource),
    Fixed(Vec<Choice>),
}

pub struct ScopedFormBuilder<'a, R> {
    ctx: &'a TenantContext,
    references: Vec<(String, Reference<'a>)>,
    message: Option<String>,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R> ScopedFormBuilder<'a, R>
where
    R: TenantOwned + Validate,
{
    /// A reference to tenant-owned records: narrowed to what the context
    /// tenant can see.
    pub fn reference<S>(mut self, field: impl Into<String>, source: &'a S) -> Self
    where
        S: CandidateSource + 'a,
    {
        self.references.push((field.into(), Reference::Scoped(source)));
        self
    }

    /// A reference to records that are not tenant-owned.
    pub fn reference_unscoped(mut self, field: impl Into<String>, choices: Vec<Choice>) -> Self {
        self.references.push((field.into(), Reference::Fixed(choices)));
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub async fn build(self) -> Result<ScopedForm<R>> {
        let mut choices = BTreeMap::new();
        for (field, reference) in self.references {
            let set = match reference {
                Reference::Scoped(source) => source.candidates(self.ctx).await?,
                Reference::Fixed(set) => set,
            };
            choices.insert(field, set);
        }
        Ok(ScopedForm {
            ctx: self.ctx.clone(),
            choices,
            message: self
                .message
                .unwrap_or_else(|| format!("Invalid {}", R::KIND)),
            _record: PhantomData,
        })
    }
}

/// A form bound to one request's tenant.
pub struct ScopedForm<R> {
    ctx: TenantContext,
    choices: BTreeMap<String, Vec<Choice>>,
    message: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> ScopedForm<R>
where
    R: TenantOwned + Validate,
{
    pub fn builder(ctx: &TenantContext) -> ScopedFormBuilder<'_, R> {
        ScopedFormBuilder {
            ctx,
            references: Vec::new(),
            message: None,
            _record: PhantomData,
        }
    }

    /// The narrowed candidates of a reference field.
    pub fn choices(&self, field: &str) -> Option<&[Choice]> {
        self.choices.get(field).map(Vec::as_slice)
    }

    fn is_choice(&self, field: &str, id: &str) -> bool {
        self.choices
            .get(field)
            .is_some_and(|set| set.iter().any(|c| c.id == id))
    }

    fn check_references(&self, data: &Map<String, Value>) -> FieldErrors {
        let mut errors = FieldErrors::default();
        for field in self.choices.keys() {
            let valid = match data.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(id)) => self.is_choice(field, id),
                Some(Value::Array(ids)) => ids
                    .iter()
                    .all(|v| v.as_str().is_some_and(|id| self.is_choice(field, id))),
                Some(_) => false,
            };
            if !valid {
                errors.push_field(field, INVALID_CHOICE);
            }
        }
        errors
    }

    /// Clean submitted data into a record owned by the right tenant.
    ///
    /// When editing, `instance` is the stored record: its id and tenant are
    /// kept whatever the submission says.
    pub fn validate(&self, data: Value, instance: Option<&R>) -> Result<R> {
        let Value::Object(mut data) = data else {
            let mut errors = FieldErrors::default();
            errors.push_schema("expected a JSON object");
            return Err(errors.into_anyhow(&self.message));
        };
        data.remove(TENANT_FIELD);

        let errors = self.check_references(&data);
        if !errors.is_empty() {
            return Err(errors.into_anyhow(&self.message));
        }

        let mut record: R = clean(&Value::Object(data), &self.message)?;

        let tenant = instance
            .and_then(|i| i.tenant_id())
            .or_else(|| self.ctx.tenant_id())
            .cloned()
            .ok_or_else(|| TenancyError::MissingTenantReference { kind: R::KIND }.into_anyhow())?;
        record.set_tenant_id(tenant);

        match instance {
            Some(existing) => record.set_id(existing.id().to_string()),
            None => record.set_id(String::new()),
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde::Deserialize;

    use super::*;
    use crate::repository::ScopedRepository;
    use crate::tenant::{Tenant, TenantId};

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    struct Folder {
        #[serde(default)]
        id: String,
        #[serde(default)]
        tenant_id: Option<TenantId>,
        #[validate(length(min = 1, message = "name is required"))]
        name: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    struct Doc {
        #[serde(default)]
        id: String,
        #[serde(default)]
        tenant_id: Option<TenantId>,
        #[validate(length(min = 2))]
        title: String,
        #[serde(default)]
        folder_id: Option<String>,
        #[serde(default)]
        language: Option<String>,
    }

    macro_rules! tenant_owned {
        ($ty:ty, $kind:literal) => {
            impl TenantOwned for $ty {
                const KIND: &'static str = $kind;
                fn id(&self) -> &str {
                    &self.id
                }
                fn set_id(&mut self, id: String) {
                    self.id = id;
                }
                fn tenant_id(&self) -> Option<&TenantId> {
                    self.tenant_id.as_ref()
                }
                fn set_tenant_id(&mut self, tenant: TenantId) {
                    self.tenant_id = Some(tenant);
                }
            }
        };
    }

    tenant_owned!(Folder, "folder");
    tenant_owned!(Doc, "doc");

    fn ctx(id: &str) -> TenantContext {
        let now = Utc::now();
        TenantContext::for_tenant(Arc::new(Tenant {
            id: TenantId::new(id),
            name: id.to_string(),
            domain: Some(format!("{id}.example.org")),
            path_key: None,
            aliases: vec![],
            preferred_domain: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            liveness: Default::default(),
        }))
    }

    fn folder(name: &str) -> Folder {
        Folder {
            id: String::new(),
            tenant_id: None,
            name: name.to_string(),
        }
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Profile {
        #[validate(length(min = 2, message = "display_name must be at least 2 chars"))]
        display_name: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Tag {
        #[validate(email(message = "tag email must be valid"))]
        email: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct User {
        #[validate(nested)]
        profile: Profile,
        #[validate(nested)]
        tags: Vec<Tag>,
    }

    #[test]
    fn clean_flattens_nested_and_list_errors() {
        let data = json!({
            "profile": {"display_name": "x"},
            "tags": [{"email": "not-an-email"}]
        });
        let err = clean::<User>(&data, "Invalid user").unwrap_err();
        let TenancyError::Validation { errors, .. } = TenancyError::from_anyhow(&err).unwrap() else {
            panic!("expected a validation error");
        };
        assert_eq!(errors["profile.display_name"][0], "display_name must be at least 2 chars");
        assert_eq!(errors["tags[0].email"][0], "tag email must be valid");
    }

    #[test]
    fn clean_reports_shape_errors_under_schema() {
        let err = clean::<User>(&json!({"profile": 3}), "Invalid user").unwrap_err();
        let found = TenancyError::from_anyhow(&err).unwrap();
        assert_eq!(found.to_json()["errors"]["_schema"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn reference_choices_are_narrowed_to_current_tenant() {
        let folders = ScopedRepository::<Folder>::in_memory();
        let (a, b) = (ctx("a"), ctx("b"));
        let mine = folders.create(&a, folder("mine")).await.unwrap();
        let theirs = folders.create(&b, folder("theirs")).await.unwrap();

        let form = ScopedForm::<Doc>::builder(&a)
            .reference("folder_id", &folders)
            .build()
            .await
            .unwrap();

        let ids: Vec<&str> = form.choices("folder_id").unwrap().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![mine.id.as_str()]);

        let ok = form
            .validate(json!({"title": "Plan", "folder_id": mine.id}), None)
            .unwrap();
        assert_eq!(ok.tenant_id, Some(TenantId::new("a")));

        let err = form
            .validate(json!({"title": "Plan", "folder_id": theirs.id}), None)
            .unwrap_err();
        let body = TenancyError::from_anyhow(&err).unwrap().to_json();
        assert_eq!(body["code"], 422);
        assert_eq!(body["errors"]["folder_id"][0], INVALID_CHOICE);
    }

    #[tokio::test]
    async fn tenant_field_is_not_user_editable() {
        let form = ScopedForm::<Doc>::builder(&ctx("a")).build().await.unwrap();
        let doc = form
            .validate(json!({"title": "Plan", "tenant_id": "b"}), None)
            .unwrap();
        assert_eq!(doc.tenant_id, Some(TenantId::new("a")));
    }

    #[tokio::test]
    async fn editing_keeps_instance_tenant_and_id() {
        let form = ScopedForm::<Doc>::builder(&ctx("a")).build().await.unwrap();
        let stored = Doc {
            id: "doc:1".into(),
            tenant_id: Some(TenantId::new("a")),
            title: "Old".into(),
            folder_id: None,
            language: None,
        };
        let edited = form
            .validate(json!({"id": "doc:other", "title": "New"}), Some(&stored))
            .unwrap();
        assert_eq!(edited.id, "doc:1");
        assert_eq!(edited.tenant_id, Some(TenantId::new("a")));
    }

    #[tokio::test]
    async fn no_tenant_and_no_instance_is_refused() {
        let form = ScopedForm::<Doc>::builder(&TenantContext::none()).build().await.unwrap();
        let err = form.validate(json!({"title": "Plan"}), None).unwrap_err();
        assert!(TenancyError::is(&err, "MissingTenantReference"));
    }

    #[tokio::test]
    async fn unscoped_references_use_fixed_choices() {
        let form = ScopedForm::<Doc>::builder(&ctx("a"))
            .reference_unscoped("language", vec![Choice::new("en", "English"), Choice::new("fr", "French")])
            .build()
            .await
            .unwrap();
        assert!(form.validate(json!({"title": "Plan", "language": "fr"}), None).is_ok());
        assert!(form.validate(json!({"title": "Plan", "language": "xx"}), None).is_err());
        assert!(form.validate(json!({"title": "Plan", "language": null}), None).is_ok());
    }
}
