//! Field access for each lifecycle phase
//!
//! Phases read configuration through `FieldSource`; apply additionally asks
//! `ChangeSource` which fields moved since the last recorded apply.

use crate::field::{Field, ResourceInput, Value};
use crate::record::{RemoteState, ResourceRecord};

/// Read access to deployment fields
pub trait FieldSource: Send + Sync {
    /// Current value: explicit, recorded or schema default
    fn value(&self, field: Field) -> Option<Value>;

    /// Whether the value was supplied rather than defaulted
    fn is_explicit(&self, field: Field) -> bool;
}

/// Apply-phase access: also knows what changed
pub trait ChangeSource: FieldSource {
    fn has_change(&self, field: Field) -> bool;
}

fn input_value(input: &ResourceInput, field: Field) -> Option<Value> {
    input.get(field).or_else(|| field.default_value())
}

/// Read-only view used while planning
#[derive(Debug, Clone, Copy)]
pub struct PlanView<'a> {
    input: &'a ResourceInput,
    prior: &'a ResourceRecord,
}

impl<'a> PlanView<'a> {
    #[must_use]
    pub fn new(input: &'a ResourceInput, prior: &'a ResourceRecord) -> Self {
        Self { input, prior }
    }

    /// Configuration fields whose value differs from the record
    #[must_use]
    pub fn changed_fields(&self) -> Vec<Field> {
        Field::CONFIG
            .into_iter()
            .filter(|f| self.value(*f).as_ref() != self.prior.attribute(*f))
            .collect()
    }
}

impl FieldSource for PlanView<'_> {
    fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::NixosSystem => self.prior.attribute(field).cloned(),
            _ => input_value(self.input, field),
        }
    }

    fn is_explicit(&self, field: Field) -> bool {
        self.input.get(field).is_some()
    }
}

/// Mutable view used while applying
///
/// Holds the prior record for change detection and builds the record that
/// will be persisted if the apply succeeds.
#[derive(Debug, Clone)]
pub struct ApplyView {
    input: ResourceInput,
    prior: ResourceRecord,
    system_pending: bool,
    record: ResourceRecord,
}

impl ApplyView {
    /// `system_pending` is the plan's verdict on `nixos_system`
    #[must_use]
    pub fn new(input: ResourceInput, prior: ResourceRecord, system_pending: bool) -> Self {
        let mut record = prior.clone();
        for field in Field::CONFIG {
            record.set_attribute(field, input_value(&input, field));
        }

        Self {
            input,
            prior,
            system_pending,
            record,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.record.id.as_deref()
    }

    /// Identity is immutable once assigned
    pub fn assign_id(&mut self, id: String) {
        if self.record.id.is_none() {
            self.record.id = Some(id);
        }
    }

    pub fn set_remote_state(&mut self, state: &RemoteState) {
        self.record.set_remote_state(state);
    }

    #[must_use]
    pub fn into_record(self) -> ResourceRecord {
        self.record
    }
}

impl FieldSource for ApplyView {
    fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::NixosSystem => self.record.attribute(field).cloned(),
            _ => input_value(&self.input, field),
        }
    }

    fn is_explicit(&self, field: Field) -> bool {
        self.input.get(field).is_some()
    }
}

impl ChangeSource for ApplyView {
    fn has_change(&self, field: Field) -> bool {
        match field {
            Field::NixosSystem => self.system_pending,
            _ => input_value(&self.input, field).as_ref() != self.prior.attribute(field),
        }
    }
}

/// View over a stored record, used by read/refresh
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    record: &'a ResourceRecord,
}

impl<'a> RecordView<'a> {
    #[must_use]
    pub fn new(record: &'a ResourceRecord) -> Self {
        Self { record }
    }
}

impl FieldSource for RecordView<'_> {
    fn value(&self, field: Field) -> Option<Value> {
        self.record
            .attribute(field)
            .cloned()
            .or_else(|| field.default_value())
    }

    fn is_explicit(&self, field: Field) -> bool {
        self.record.attribute(field).is_some()
    }
}
