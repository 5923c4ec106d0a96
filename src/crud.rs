//! Admin create/edit/delete forms over the store, and the public
//! consultation intake.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{
    format_date, normalize_url, Consultation, ConsultationStatus, Notice, NoticeCategory, Record,
    Resource, Schedule,
};
use crate::pagination::{ListOrder, PagedList};
use crate::store::{format_timestamp, Collection, Direction, RecordStore, Write};

lazy_static::lazy_static! {
    /// Digits, spaces, `+`, `-` and parentheses
    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9+\-() ]+$").unwrap();
}

/// Message shown when a save reaches the store and fails there.
pub const SAVE_FAILED: &str = "Failed to save. Please try again.";

fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// A record type with an admin form.
pub trait Editable: Record + Serialize + 'static {
    /// Name used in "does not exist" messages
    const LABEL: &'static str;
    const ORDER: ListOrder;
    /// `None` loads the whole collection.
    const PAGE_SIZE: Option<usize> = None;

    type Input: Default + Clone + DeserializeOwned + Send + Sync + 'static;
    /// Partial edit: every field optional, absent fields stay as stored.
    type Patch: DeserializeOwned + Send + Sync + 'static;

    fn to_input(&self) -> Self::Input;

    /// Overlay the fields present in `patch` onto `input`.
    fn merge(input: &mut Self::Input, patch: Self::Patch);

    /// Date shown next to the record in lists
    fn date_label(&self, _tz: Tz) -> Option<String> {
        None
    }

    fn validate(input: &Self::Input) -> Result<(), ValidationError>;

    /// Field values for a save. Timestamps are added by the caller.
    fn to_write(input: &Self::Input) -> Write;
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoticeInput {
    pub title: String,
    pub content: String,
    pub category: NoticeCategory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<NoticeCategory>,
}

impl Editable for Notice {
    const LABEL: &'static str = "Notice";
    const ORDER: ListOrder = ListOrder::newest_first(Collection::Notices);

    type Input = NoticeInput;
    type Patch = NoticePatch;

    fn to_input(&self) -> NoticeInput {
        NoticeInput {
            title: self.title.clone(),
            content: self.content.clone(),
            category: self.category,
        }
    }

    fn merge(input: &mut NoticeInput, patch: NoticePatch) {
        if let Some(title) = patch.title {
            input.title = title;
        }
        if let Some(content) = patch.content {
            input.content = content;
        }
        if let Some(category) = patch.category {
            input.category = category;
        }
    }

    fn date_label(&self, tz: Tz) -> Option<String> {
        self.created_at.map(|at| format_date(&at, tz))
    }

    fn validate(input: &NoticeInput) -> Result<(), ValidationError> {
        require(&input.title, "title")?;
        require(&input.content, "content")
    }

    fn to_write(input: &NoticeInput) -> Write {
        Write::new()
            .set("title", input.title.trim())
            .set("content", sanitize_html(&input.content))
            .set("category", input.category.as_str())
    }
}

/// Dates are required in a request body. Only a freshly opened form
/// starts them at the current time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub note: Option<String>,
}

impl Default for ScheduleInput {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: String::new(),
            content: String::new(),
            start_date: Some(now),
            end_date: Some(now),
            is_recurring: false,
            note: None,
        }
    }
}

/// `note: ""` clears the note; a missing or null note leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_recurring: Option<bool>,
    pub note: Option<String>,
}

impl Editable for Schedule {
    const LABEL: &'static str = "Schedule";
    const ORDER: ListOrder = ListOrder {
        collection: Collection::Schedules,
        order_by: "startDate",
        direction: Direction::Asc,
    };

    type Input = ScheduleInput;
    type Patch = SchedulePatch;

    fn to_input(&self) -> ScheduleInput {
        ScheduleInput {
            title: self.title.clone(),
            content: self.content.clone(),
            start_date: Some(self.start_date),
            end_date: Some(self.end_date),
            is_recurring: self.is_recurring,
            note: self.note.clone(),
        }
    }

    fn merge(input: &mut ScheduleInput, patch: SchedulePatch) {
        if let Some(title) = patch.title {
            input.title = title;
        }
        if let Some(content) = patch.content {
            input.content = content;
        }
        if patch.start_date.is_some() {
            input.start_date = patch.start_date;
        }
        if patch.end_date.is_some() {
            input.end_date = patch.end_date;
        }
        if let Some(is_recurring) = patch.is_recurring {
            input.is_recurring = is_recurring;
        }
        if patch.note.is_some() {
            input.note = patch.note;
        }
    }

    fn date_label(&self, tz: Tz) -> Option<String> {
        Some(format!(
            "{} - {}",
            format_date(&self.start_date, tz),
            format_date(&self.end_date, tz)
        ))
    }

    // endDate before startDate is accepted.
    fn validate(input: &ScheduleInput) -> Result<(), ValidationError> {
        require(&input.title, "title")?;
        require(&input.content, "content")?;
        if input.start_date.is_none() {
            return Err(ValidationError::Required("startDate"));
        }
        if input.end_date.is_none() {
            return Err(ValidationError::Required("endDate"));
        }
        Ok(())
    }

    fn to_write(input: &ScheduleInput) -> Write {
        let note = input
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        Write::new()
            .set("title", input.title.trim())
            .set("content", sanitize_html(&input.content))
            .set("startDate", input.start_date.as_ref().map(format_timestamp))
            .set("endDate", input.end_date.as_ref().map(format_timestamp))
            .set("isRecurring", input.is_recurring)
            .set("note", note)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceInput {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub url: Option<String>,
}

impl Editable for Resource {
    const LABEL: &'static str = "Resource";
    const ORDER: ListOrder = ListOrder::newest_first(Collection::Resources);

    type Input = ResourceInput;
    type Patch = ResourcePatch;

    fn to_input(&self) -> ResourceInput {
        ResourceInput {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }

    fn merge(input: &mut ResourceInput, patch: ResourcePatch) {
        if let Some(title) = patch.title {
            input.title = title;
        }
        if let Some(url) = patch.url {
            input.url = url;
        }
    }

    fn validate(input: &ResourceInput) -> Result<(), ValidationError> {
        require(&input.title, "title")?;
        require(&input.url, "url")
    }

    fn to_write(input: &ResourceInput) -> Write {
        Write::new()
            .set("title", input.title.trim())
            .set("url", normalize_url(&input.url))
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Validate, then create (`existing_id = None`) or update the record.
/// Returns the record id.
pub async fn create_or_update<E: Editable>(
    store: &dyn RecordStore,
    existing_id: Option<&str>,
    input: &E::Input,
) -> AppResult<String> {
    E::validate(input)?;

    let write = E::to_write(input).server_timestamp("updatedAt");
    let collection = E::ORDER.collection;
    match existing_id {
        Some(id) => {
            store.update(collection, id, write).await?;
            tracing::info!(%collection, id, "record updated");
            Ok(id.to_string())
        }
        None => {
            let id = store
                .create(collection, write.server_timestamp("createdAt"))
                .await?;
            tracing::info!(%collection, id = %id, "record created");
            Ok(id)
        }
    }
}

/// Apply a partial edit to a stored record. The merged record is validated
/// as a whole, so a patch cannot blank out a required field.
pub async fn patch_record<E: Editable>(
    store: &dyn RecordStore,
    id: &str,
    patch: E::Patch,
) -> AppResult<E> {
    let existing = fetch_one::<E>(store, id).await?;
    let mut input = existing.to_input();
    E::merge(&mut input, patch);
    create_or_update::<E>(store, Some(id), &input).await?;
    fetch_one::<E>(store, id).await
}

/// Delete after asking `confirm`. A declined confirmation touches nothing
/// and returns `false`.
pub async fn delete_confirmed(
    store: &dyn RecordStore,
    collection: Collection,
    id: &str,
    confirm: impl FnOnce(&str) -> bool,
) -> AppResult<bool> {
    if !confirm(id) {
        return Ok(false);
    }
    store.delete(collection, id).await?;
    tracing::info!(%collection, id, "record deleted");
    Ok(true)
}

/// Load one record, or `NotFound` with the type's label.
pub async fn fetch_one<E: Editable>(store: &dyn RecordStore, id: &str) -> AppResult<E> {
    match store.get(E::ORDER.collection, id).await? {
        Some(doc) => Ok(doc.decode()?),
        None => Err(AppError::NotFound(E::LABEL)),
    }
}

// ============================================================================
// Admin panel
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FormState<I> {
    /// Id of the record being edited; `None` for a new one.
    pub editing: Option<String>,
    pub input: I,
    /// Last user-facing failure
    pub error: Option<String>,
}

/// One admin collection: its list plus the (optional) open form.
pub struct CrudPanel<E: Editable> {
    list: PagedList<E>,
    form: Option<FormState<E::Input>>,
}

impl<E: Editable> Default for CrudPanel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Editable> CrudPanel<E> {
    pub fn new() -> Self {
        Self {
            list: PagedList::new(E::ORDER, E::PAGE_SIZE),
            form: None,
        }
    }

    pub fn list(&self) -> &PagedList<E> {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut PagedList<E> {
        &mut self.list
    }

    pub fn form(&self) -> Option<&FormState<E::Input>> {
        self.form.as_ref()
    }

    /// Open the form, pre-populated when editing.
    pub fn open(&mut self, existing: Option<&E>) {
        self.form = Some(FormState {
            editing: existing.map(|record| record.id().to_string()),
            input: existing.map(E::to_input).unwrap_or_default(),
            error: None,
        });
    }

    /// Change the open form's fields. Ignored when no form is open.
    pub fn edit(&mut self, f: impl FnOnce(&mut E::Input)) {
        if let Some(form) = self.form.as_mut() {
            f(&mut form.input);
        }
    }

    /// Discard the open form without saving.
    pub fn close(&mut self) {
        self.form = None;
    }

    /// Save the open form. On success the form closes and the list reloads
    /// from the first page; on failure the form stays open with a message.
    pub async fn submit(&mut self, store: &dyn RecordStore) -> AppResult<String> {
        let Some(form) = self.form.as_mut() else {
            return Err(AppError::BadRequest("no form is open".to_string()));
        };

        match create_or_update::<E>(store, form.editing.as_deref(), &form.input).await {
            Ok(id) => {
                self.form = None;
                // A failed reload is logged by the list and keeps its items.
                let _ = self.list.load_first(store).await;
                Ok(id)
            }
            Err(e) => {
                form.error = Some(match &e {
                    AppError::Validation(v) => v.to_string(),
                    _ => SAVE_FAILED.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Confirmed deletes drop the record locally without a reload.
    pub async fn delete(
        &mut self,
        store: &dyn RecordStore,
        id: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> AppResult<bool> {
        let deleted = delete_confirmed(store, E::ORDER.collection, id, confirm).await?;
        if deleted {
            self.list.remove(id);
        }
        Ok(deleted)
    }
}

// ============================================================================
// Consultations
// ============================================================================

pub const CONSULTATIONS: ListOrder = ListOrder::newest_first(Collection::Consultations);

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsultationInput {
    pub name: String,
    pub phone: String,
    pub message: String,
}

impl ConsultationInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        require(&self.phone, "phone")?;
        if !PHONE_REGEX.is_match(self.phone.trim()) {
            return Err(ValidationError::Invalid {
                field: "phone",
                reason: "only digits, spaces, +, - and parentheses are allowed",
            });
        }
        require(&self.message, "message")
    }
}

/// Public intake. New consultations always start as `new`.
pub async fn submit_consultation(
    store: &dyn RecordStore,
    input: &ConsultationInput,
) -> AppResult<Consultation> {
    input.validate()?;

    let write = Write::new()
        .set("name", input.name.trim())
        .set("phone", input.phone.trim())
        .set("message", input.message.trim())
        .set("status", ConsultationStatus::New.as_str())
        .server_timestamp("createdAt");
    let id = store.create(Collection::Consultations, write).await?;
    tracing::info!(id = %id, "consultation received");

    match store.get(Collection::Consultations, &id).await? {
        Some(doc) => Ok(doc.decode()?),
        None => Err(AppError::NotFound("Consultation")),
    }
}

/// Writes `status` and nothing else.
pub async fn set_consultation_status(
    store: &dyn RecordStore,
    id: &str,
    status: ConsultationStatus,
) -> AppResult<()> {
    let write = Write::new().set("status", status.as_str());
    store.update(Collection::Consultations, id, write).await?;
    tracing::info!(id, status = status.as_str(), "consultation status changed");
    Ok(())
}

/// Admin view of consultation requests.
pub struct ConsultationBoard {
    list: PagedList<Consultation>,
}

impl Default for ConsultationBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsultationBoard {
    pub fn new() -> Self {
        Self {
            list: PagedList::new(CONSULTATIONS, None),
        }
    }

    pub fn list(&self) -> &PagedList<Consultation> {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut PagedList<Consultation> {
        &mut self.list
    }

    /// Update the status, then reload the list.
    pub async fn set_status(
        &mut self,
        store: &dyn RecordStore,
        id: &str,
        status: ConsultationStatus,
    ) -> AppResult<()> {
        set_consultation_status(store, id, status).await?;
        let _ = self.list.load_first(store).await;
        Ok(())
    }

    pub async fn delete(
        &mut self,
        store: &dyn RecordStore,
        id: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> AppResult<bool> {
        let deleted = delete_confirmed(store, Collection::Consultations, id, confirm).await?;
        if deleted {
            self.list.remove(id);
        }
        Ok(deleted)
    }
}
